use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lyric_studio::decoding::{decode_audio_with, DEFAULT_SAMPLE_RATE};
use lyric_studio::encoding::{FfmpegEncoderFactory, FfmpegMode};
use lyric_studio::font_assets::font_search_dirs;
use lyric_studio::settings::{load_settings, SettingsPatch, VisualSettings};
use lyric_studio::studio::{FontSource, StudioConfig, StudioSession};
use lyric_studio::subtitle::{format_timestamp, parse_subtitles};
use lyric_studio::theme::{default_advisor, sample_text, ThemeAdvisor};

#[derive(Debug, Parser)]
#[command(name = "lyric-studio")]
#[command(about = "Audio-reactive lyric video renderer")]
#[command(version = env!("LYRIC_STUDIO_VERSION"))]
struct Cli {
    /// YAML file with visual settings.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Override one setting, e.g. `--set style=FIERY`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,
    #[arg(long, default_value_t = 1280, global = true)]
    width: u32,
    #[arg(long, default_value_t = 720, global = true)]
    height: u32,
    /// Particle RNG seed; equal seeds give identical frames.
    #[arg(long, default_value_t = 0, global = true)]
    seed: u64,
    /// Font file to use instead of resolving `font_family`.
    #[arg(long, global = true)]
    font: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = FfmpegMode::Auto, global = true)]
    ffmpeg: FfmpegMode,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse a subtitle file and validate the settings.
    Check { lyrics: PathBuf },
    /// Render a single frame to PNG.
    Still {
        lyrics: PathBuf,
        #[arg(long, default_value_t = 0.0)]
        time: f64,
        #[arg(long)]
        audio: Option<PathBuf>,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        /// Simulation rate used to warm up particles before `time`.
        #[arg(long, default_value_t = 30)]
        fps: u32,
    },
    /// Record the lyric video for a whole track.
    Render {
        lyrics: PathBuf,
        #[arg(long)]
        audio: PathBuf,
        /// Defaults to a timestamped `.mp4` in the current directory.
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// Ask the theme advisor for colors while rendering.
        #[arg(long)]
        ai_theme: bool,
    },
    /// Print a suggested theme for the lyrics as YAML.
    Theme { lyrics: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Check { lyrics } => run_check(&cli, lyrics),
        Commands::Still {
            lyrics,
            time,
            audio,
            output,
            fps,
        } => run_still(&cli, lyrics, *time, audio.as_deref(), output, *fps),
        Commands::Render {
            lyrics,
            audio,
            output,
            fps,
            ai_theme,
        } => run_render(&cli, lyrics, audio, output.clone(), *fps, *ai_theme),
        Commands::Theme { lyrics } => run_theme(lyrics),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_settings(cli: &Cli) -> Result<VisualSettings> {
    let base = match &cli.settings {
        Some(path) => load_settings(path)?,
        None => VisualSettings::default(),
    };
    let patch = SettingsPatch::from_overrides(&cli.overrides)?;
    let settings = base.patched(&patch);
    settings.validate()?;
    Ok(settings)
}

fn open_studio(cli: &Cli, settings: VisualSettings) -> Result<StudioSession> {
    let project_root = std::env::current_dir().context("failed to read current directory")?;
    let config = StudioConfig {
        width: cli.width,
        height: cli.height,
        seed: cli.seed,
        fonts: FontSource {
            explicit: cli.font.clone(),
            search_dirs: font_search_dirs(&project_root),
        },
    };
    let encoders = FfmpegEncoderFactory { mode: cli.ffmpeg };
    StudioSession::new(config, settings, Box::new(encoders))
}

fn load_audio(cli: &Cli, studio: &mut StudioSession, audio: &Path) -> Result<()> {
    let ffmpeg_path = cli.ffmpeg.ffmpeg_path()?;
    let track = decode_audio_with(&ffmpeg_path, audio, DEFAULT_SAMPLE_RATE)?;
    studio.load_track(track);
    Ok(())
}

fn run_check(cli: &Cli, lyrics_path: &Path) -> Result<()> {
    let settings = resolve_settings(cli)?;
    let document = std::fs::read_to_string(lyrics_path)
        .with_context(|| format!("failed to read subtitles {}", lyrics_path.display()))?;
    let lines = parse_subtitles(&document);
    let (Some(first), Some(last)) = (lines.first(), lines.last()) else {
        bail!("no lyric lines could be parsed from {}", lyrics_path.display());
    };

    println!(
        "OK: {} ({} lines, {} --> {})",
        lyrics_path.display(),
        lines.len(),
        format_timestamp(first.start_time),
        format_timestamp(last.end_time)
    );
    println!(
        "Style: {} / {} at {}x speed",
        settings.style.as_str(),
        settings.animation.as_str(),
        settings.animation_speed
    );
    Ok(())
}

fn run_still(
    cli: &Cli,
    lyrics_path: &Path,
    time: f64,
    audio: Option<&Path>,
    output: &Path,
    fps: u32,
) -> Result<()> {
    let settings = resolve_settings(cli)?;
    let mut studio = open_studio(cli, settings)?;
    studio.load_subtitle_file(lyrics_path)?;
    if let Some(audio) = audio {
        load_audio(cli, &mut studio, audio)?;
    }

    let summary = studio.render_still(time, fps);
    studio.renderer().canvas().save_png(output)?;
    println!(
        "Wrote {} (t={time:.3}s, active line: {})",
        output.display(),
        summary
            .active_index
            .map_or_else(|| "none".to_owned(), |index| studio.lines()[index].id.clone())
    );
    Ok(())
}

fn run_render(
    cli: &Cli,
    lyrics_path: &Path,
    audio: &Path,
    output: Option<PathBuf>,
    fps: u32,
    ai_theme: bool,
) -> Result<()> {
    if fps == 0 {
        bail!("--fps must be > 0");
    }
    let output = output.unwrap_or_else(default_output_name);
    let settings = resolve_settings(cli)?;
    let mut studio = open_studio(cli, settings)?;
    studio.load_subtitle_file(lyrics_path)?;
    load_audio(cli, &mut studio, audio)?;

    if ai_theme {
        if let Err(error) = studio.request_theme(Arc::from(default_advisor())) {
            warn!("theme request skipped: {error:#}");
        }
    }

    studio.start_recording(&output, fps)?;
    let frame_dt = 1.0 / f64::from(fps);
    let duration = studio.playback().duration();
    let mut dt = 0.0;
    let mut frames = 0_u64;
    loop {
        let report = studio.tick(dt);
        dt = frame_dt;
        frames += 1;
        if report.recording_aborted {
            return Err(anyhow!(
                "{}",
                studio.status().unwrap_or("recording aborted")
            ));
        }
        if frames % u64::from(fps.saturating_mul(10)) == 0 {
            info!(
                "rendered {:.1}s / {:.1}s",
                studio.playback().position(),
                duration
            );
        }
        if report.playback_ended {
            break;
        }
    }

    let artifact = studio.stop_recording()?;
    println!(
        "Wrote {} ({} frames, {:.2}s)",
        artifact.path.display(),
        artifact.frames,
        artifact.duration_secs
    );
    Ok(())
}

fn run_theme(lyrics_path: &Path) -> Result<()> {
    let document = std::fs::read_to_string(lyrics_path)
        .with_context(|| format!("failed to read subtitles {}", lyrics_path.display()))?;
    let lines = parse_subtitles(&document);
    if lines.is_empty() {
        bail!("no lyric lines could be parsed from {}", lyrics_path.display());
    }
    let suggestion = default_advisor().suggest_theme(&sample_text(&lines));
    print!(
        "{}",
        serde_yaml::to_string(&suggestion).context("failed to serialize theme")?
    );
    Ok(())
}

fn default_output_name() -> PathBuf {
    PathBuf::from(format!(
        "lyric-video-{}.mp4",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ))
}
