use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::analysis::FrequencyAnalyser;
use crate::decoding::PcmTrack;
use crate::encoding::EncoderFactory;
use crate::font_assets::resolve_font_family;
use crate::particles::MAX_LIFETIME_FRAMES;
use crate::playback::Playback;
use crate::recording::{
    RecordingArtifact, RecordingError, RecordingRequest, RecordingSession, RecordingState,
};
use crate::renderer::{FrameInput, FrameRenderer, FrameSummary};
use crate::settings::{SettingsPatch, VisualSettings};
use crate::subtitle::{parse_subtitles, LyricLine};
use crate::text::LyricPainter;
use crate::theme::{sample_text, ThemeAdvisor, ThemeSuggestion};

/// Most particle steps simulated before a still frame.
pub const WARM_UP_FRAME_LIMIT: u64 = 4 * MAX_LIFETIME_FRAMES as u64;

/// Where lyric fonts come from: an explicit file, else a family lookup.
#[derive(Debug, Clone, Default)]
pub struct FontSource {
    pub explicit: Option<PathBuf>,
    pub search_dirs: Vec<PathBuf>,
}

impl FontSource {
    /// Missing or unreadable fonts yield `None`; text is then skipped.
    pub fn painter_for(&self, family: &str) -> Option<LyricPainter> {
        let path = match &self.explicit {
            Some(path) => path.clone(),
            None => match resolve_font_family(family, &self.search_dirs) {
                Some(path) => path,
                None => {
                    warn!(family, "no font file found for family; lyrics will not be drawn");
                    return None;
                }
            },
        };
        match LyricPainter::from_path(&path) {
            Ok(painter) => {
                debug!(path = %path.display(), "loaded lyric font");
                Some(painter)
            }
            Err(error) => {
                warn!("failed to load font, lyrics will not be drawn: {error:#}");
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    pub fonts: FontSource,
}

/// Results delivered back to the session from background work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StudioEvent {
    ThemeSuggested(ThemeSuggestion),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub frame: FrameSummary,
    /// Set on the tick where playback reached the end of the track.
    pub playback_ended: bool,
    /// Set when this tick's frame made the encoder fail.
    pub recording_aborted: bool,
}

/// Single-owner session state. Every mutation goes through `&mut self`;
/// background work reports back through the event queue drained by `tick`.
pub struct StudioSession {
    settings: VisualSettings,
    lines: Vec<LyricLine>,
    playback: Playback,
    track: Option<PcmTrack>,
    analyser: FrequencyAnalyser,
    renderer: FrameRenderer,
    recording: RecordingSession,
    encoders: Box<dyn EncoderFactory>,
    fonts: FontSource,
    theme_in_progress: bool,
    events_tx: Sender<StudioEvent>,
    events_rx: Receiver<StudioEvent>,
    status: Option<String>,
}

impl StudioSession {
    pub fn new(
        config: StudioConfig,
        settings: VisualSettings,
        encoders: Box<dyn EncoderFactory>,
    ) -> Result<Self> {
        settings.validate()?;
        let painter = config.fonts.painter_for(&settings.font_family);
        let renderer = FrameRenderer::new(config.width, config.height, config.seed, painter)?;
        let (events_tx, events_rx) = mpsc::channel();
        Ok(Self {
            settings,
            lines: Vec::new(),
            playback: Playback::default(),
            track: None,
            analyser: FrequencyAnalyser::new(),
            renderer,
            recording: RecordingSession::new(),
            encoders,
            fonts: config.fonts,
            theme_in_progress: false,
            events_tx,
            events_rx,
            status: None,
        })
    }

    pub fn settings(&self) -> &VisualSettings {
        &self.settings
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn renderer(&self) -> &FrameRenderer {
        &self.renderer
    }

    pub fn frame(&self) -> &[u8] {
        self.renderer.frame()
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recording.state()
    }

    pub fn is_theme_in_progress(&self) -> bool {
        self.theme_in_progress
    }

    /// Latest user-visible notice (load failures, recording aborts, themes).
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Replaces the lyric sequence. A document with no usable blocks is an
    /// error and the current lines stay loaded.
    pub fn load_subtitles(&mut self, document: &str) -> Result<usize> {
        let lines = parse_subtitles(document);
        if lines.is_empty() {
            let message = "Could not parse any lyric lines from the subtitle file.";
            self.status = Some(message.to_owned());
            bail!(message);
        }
        let count = lines.len();
        self.lines = lines;
        self.status = Some(format!("Loaded {count} lyric lines."));
        info!(count, "lyrics loaded");
        Ok(count)
    }

    pub fn load_subtitle_file(&mut self, path: &Path) -> Result<usize> {
        let document = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read subtitles {}", path.display()))?;
        self.load_subtitles(&document)
            .with_context(|| format!("no lyric lines in {}", path.display()))
    }

    /// Swaps in a decoded track; playback returns to the start, paused.
    pub fn load_track(&mut self, track: PcmTrack) {
        if self.recording.is_recording() {
            self.recording.discard();
            warn!("recording discarded because a new track was loaded");
        }
        self.playback = Playback::new(track.duration_secs());
        self.analyser.reset();
        self.track = Some(track);
    }

    /// Folds a partial update into the settings. Invalid results are
    /// rejected and the current settings stay in place.
    pub fn apply_patch(&mut self, patch: &SettingsPatch) -> Result<()> {
        let next = self.settings.patched(patch);
        next.validate()?;
        if next.font_family != self.settings.font_family && self.fonts.explicit.is_none() {
            self.renderer
                .set_painter(self.fonts.painter_for(&next.font_family));
        }
        self.settings = next;
        Ok(())
    }

    pub fn play(&mut self) -> bool {
        self.playback.play()
    }

    pub fn pause(&mut self) {
        self.playback.pause();
    }

    pub fn seek(&mut self, time: f64) {
        self.playback.seek(time);
    }

    /// Reallocates the surface; the particle population starts over.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.renderer.resize(width, height)
    }

    /// Starts a background theme request for the loaded lyrics. Rejected
    /// while another request is outstanding.
    pub fn request_theme(&mut self, advisor: Arc<dyn ThemeAdvisor>) -> Result<()> {
        if self.theme_in_progress {
            bail!("a theme analysis is already in progress");
        }
        if self.lines.is_empty() {
            bail!("load lyrics before requesting a theme");
        }

        let sample = sample_text(&self.lines);
        let events = self.events_tx.clone();
        thread::Builder::new()
            .name("lyric-theme".to_owned())
            .spawn(move || {
                let suggestion =
                    panic::catch_unwind(AssertUnwindSafe(|| advisor.suggest_theme(&sample)))
                        .unwrap_or_else(|_| {
                            warn!("theme advisor panicked; using the fallback theme");
                            ThemeSuggestion::FALLBACK
                        });
                // The session may be gone; nothing to deliver then.
                let _ = events.send(StudioEvent::ThemeSuggested(suggestion));
            })
            .context("failed to spawn theme request thread")?;
        self.theme_in_progress = true;
        self.status = Some("Analyzing lyrics for a theme...".to_owned());
        Ok(())
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                StudioEvent::ThemeSuggested(theme) => {
                    self.settings = self.settings.patched(&theme.to_patch());
                    self.theme_in_progress = false;
                    self.status = Some(format!("Applied {} theme.", theme.style.as_str()));
                    info!(
                        primary = %theme.primary_color,
                        secondary = %theme.secondary_color,
                        background = %theme.background_color,
                        style = theme.style.as_str(),
                        "theme applied"
                    );
                }
            }
        }
    }

    /// One pass of the render loop: merge background results, advance the
    /// playhead by `dt` seconds, analyse, paint and feed the recorder.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn tick(&mut self, dt: f64) -> TickReport {
        self.drain_events();
        let playback_ended = self.playback.advance(dt);
        let time = self.playback.position();

        let spectrum = match &self.track {
            Some(track) if self.playback.is_playing() || playback_ended => {
                Some(self.analyser.sample_track(track, time))
            }
            Some(_) => Some(self.analyser.sample_silence()),
            None => None,
        };
        let frame = self.renderer.render_frame(&FrameInput {
            time,
            lines: &self.lines,
            settings: &self.settings,
            spectrum,
        });

        let mut recording_aborted = false;
        if self.recording.is_recording() {
            if let Err(error) = self.recording.push_frame(self.renderer.frame()) {
                self.status = Some(format!("Recording failed: {error}"));
                recording_aborted = true;
            }
        }

        TickReport {
            frame,
            playback_ended,
            recording_aborted,
        }
    }

    /// Paints the frame at `time` without touching the playhead. Particles
    /// are first simulated at `fps` so the field looks as it would
    /// mid-playback. Only the last [`WARM_UP_FRAME_LIMIT`] frames before
    /// `time` are simulated; older particles would have aged out anyway.
    pub fn render_still(&mut self, time: f64, fps: u32) -> FrameSummary {
        self.drain_events();
        let time = if time.is_finite() { time.max(0.0) } else { 0.0 };
        let fps = f64::from(fps.max(1));
        self.analyser.reset();

        let warm_up_frames = (time * fps).floor() as u64;
        let first_frame = warm_up_frames.saturating_sub(WARM_UP_FRAME_LIMIT);
        for frame in first_frame..warm_up_frames {
            let frame_time = frame as f64 / fps;
            let spectrum = self
                .track
                .as_ref()
                .map(|track| self.analyser.sample_track(track, frame_time));
            self.renderer.warm_up(&self.settings, spectrum);
        }

        let spectrum = self
            .track
            .as_ref()
            .map(|track| self.analyser.sample_track(track, time));
        self.renderer.render_frame(&FrameInput {
            time,
            lines: &self.lines,
            settings: &self.settings,
            spectrum,
        })
    }

    pub fn start_recording(&mut self, output: &Path, fps: u32) -> Result<(), RecordingError> {
        let request = RecordingRequest {
            output,
            fps,
            surface: Some((self.renderer.width(), self.renderer.height())),
            audio: self.track.as_ref().and_then(PcmTrack::source),
        };
        let result = self
            .recording
            .start(self.encoders.as_ref(), request, &mut self.playback);
        match &result {
            Ok(()) => {
                self.analyser.reset();
                self.status = Some("Recording...".to_owned());
            }
            Err(error) => self.status = Some(format!("Could not start recording: {error}")),
        }
        result
    }

    pub fn stop_recording(&mut self) -> Result<RecordingArtifact, RecordingError> {
        let result = self.recording.stop(&mut self.playback);
        match &result {
            Ok(artifact) => {
                self.status = Some(format!("Saved {}", artifact.path.display()));
            }
            Err(RecordingError::NotRecording) => {}
            Err(error) => self.status = Some(format!("Recording failed: {error}")),
        }
        result
    }
}
