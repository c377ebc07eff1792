use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

const LYRICS: &str = "1
00:00:00,000 --> 00:00:01,000
Hold on

2
00:00:01,000 --> 00:00:02,000
Let it go
";

fn write_lyrics(path: &Path, contents: &str) {
    fs::write(path, contents).expect("lyrics should write");
}

fn run_studio(cwd: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_lyric-studio"))
        .current_dir(cwd)
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("lyric-studio command should run")
}

fn command_available(name: &str, version_arg: &str) -> bool {
    Command::new(name)
        .arg(version_arg)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[test]
fn check_reports_line_count_and_span() {
    let dir = tempdir().expect("tempdir should create");
    write_lyrics(&dir.path().join("song.srt"), LYRICS);

    let output = run_studio(dir.path(), &["check", "song.srt"]);
    assert!(output.status.success(), "check should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 lines"), "{stdout}");
    assert!(stdout.contains("00:00:00,000 --> 00:00:02,000"), "{stdout}");
    assert!(stdout.contains("NEON / FADE"), "{stdout}");
}

#[test]
fn check_rejects_unparseable_lyrics() {
    let dir = tempdir().expect("tempdir should create");
    write_lyrics(&dir.path().join("bad.srt"), "no timestamps here\nat all");

    let output = run_studio(dir.path(), &["check", "bad.srt"]);
    assert!(!output.status.success(), "check should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no lyric lines"), "{stderr}");
}

#[test]
fn invalid_overrides_and_settings_files_fail_with_context() {
    let dir = tempdir().expect("tempdir should create");
    write_lyrics(&dir.path().join("song.srt"), LYRICS);

    let output = run_studio(
        dir.path(),
        &["check", "song.srt", "--set", "animation_speed=0"],
    );
    assert!(!output.status.success());

    let output = run_studio(
        dir.path(),
        &["still", "song.srt", "-o", "big.png", "--set", "font_size=50000"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("font_size"));
    assert!(!dir.path().join("big.png").exists());

    let output = run_studio(dir.path(), &["check", "song.srt", "--set", "glitter=1"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown setting"));

    fs::write(dir.path().join("look.yaml"), "style: FIERY\nsparkle: 3\n")
        .expect("settings should write");
    let output = run_studio(dir.path(), &["check", "song.srt", "--settings", "look.yaml"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("sparkle"));
}

#[test]
fn settings_file_and_overrides_combine() {
    let dir = tempdir().expect("tempdir should create");
    write_lyrics(&dir.path().join("song.srt"), LYRICS);
    fs::write(
        dir.path().join("look.yaml"),
        "style: FIERY\nanimation: BOUNCE\nanimation_speed: 2.0\n",
    )
    .expect("settings should write");

    let output = run_studio(
        dir.path(),
        &[
            "check",
            "song.srt",
            "--settings",
            "look.yaml",
            "--set",
            "animation=zoom",
        ],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FIERY / ZOOM at 2x speed"), "{stdout}");
}

#[test]
fn still_writes_png_of_requested_size() {
    let dir = tempdir().expect("tempdir should create");
    write_lyrics(&dir.path().join("song.srt"), LYRICS);

    let output = run_studio(
        dir.path(),
        &[
            "still", "song.srt", "--time", "1.5", "-o", "frame.png", "--width", "64", "--height",
            "36",
        ],
    );
    assert!(
        output.status.success(),
        "still should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("active line: line-1"), "{stdout}");

    let image = image::open(dir.path().join("frame.png")).expect("png should decode");
    assert_eq!((image.width(), image.height()), (64, 36));
}

#[test]
fn theme_without_api_key_prints_fallback_yaml() {
    let dir = tempdir().expect("tempdir should create");
    write_lyrics(&dir.path().join("song.srt"), LYRICS);

    let output = run_studio(dir.path(), &["theme", "song.srt"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("primaryColor"), "{stdout}");
    assert!(stdout.contains("#6366f1"), "{stdout}");
    assert!(stdout.contains("NEON"), "{stdout}");
}

#[test]
fn version_flag_prints_package_version() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_studio(dir.path(), &["--version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn render_muxes_audio_into_requested_container() {
    if !command_available("ffmpeg", "-version") || !command_available("ffprobe", "-version") {
        eprintln!("skipping: ffmpeg/ffprobe not available");
        return;
    }

    let dir = tempdir().expect("tempdir should create");
    write_lyrics(&dir.path().join("song.srt"), LYRICS);
    let tone = Command::new("ffmpeg")
        .current_dir(dir.path())
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=220:duration=1",
            "tone.wav",
        ])
        .status()
        .expect("ffmpeg should run");
    assert!(tone.success());

    let output = run_studio(
        dir.path(),
        &[
            "render", "song.srt", "--audio", "tone.wav", "-o", "clip.mp4", "--fps", "12",
            "--width", "64", "--height", "36",
        ],
    );
    assert!(
        output.status.success(),
        "render should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(dir.path().join("clip.mp4").exists());
    assert!(!dir.path().join("clip.mp4.part").exists());

    let probe = Command::new("ffprobe")
        .current_dir(dir.path())
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=codec_type",
            "-of",
            "csv=p=0",
            "clip.mp4",
        ])
        .output()
        .expect("ffprobe should run");
    let streams = String::from_utf8_lossy(&probe.stdout);
    assert!(streams.contains("video"), "{streams}");
    assert!(streams.contains("audio"), "{streams}");
}
