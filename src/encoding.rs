use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

/// Sink for rendered RGBA frames that produces one audio+video file.
pub trait FrameEncoder: Send {
    fn write_frame(&mut self, rgba_frame: &[u8]) -> Result<()>;
    /// Flushes and closes the output; the file is complete on `Ok`.
    fn finish(self: Box<Self>) -> Result<()>;
    /// Stops encoding without finalizing; the output may be partial.
    fn abort(self: Box<Self>);
}

pub trait EncoderFactory {
    fn open(&self, target: &EncodeTarget) -> Result<Box<dyn FrameEncoder>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Webm,
}

impl Container {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if ext == "webm" {
            Self::Webm
        } else {
            Self::Mp4
        }
    }

    pub fn ffmpeg_format(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeTarget {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio: Option<PathBuf>,
    pub output: PathBuf,
    pub container: Container,
}

impl EncodeTarget {
    pub fn frame_size(&self) -> Result<usize> {
        usize::try_from(self.width)
            .ok()
            .and_then(|w| {
                usize::try_from(self.height)
                    .ok()
                    .map(|h| w.saturating_mul(h).saturating_mul(4))
            })
            .context("encode frame size overflow")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FfmpegMode {
    Auto,
    System,
    Sidecar,
}

impl FfmpegMode {
    /// Executable for this mode; sidecar mode downloads it on first use.
    pub fn ffmpeg_path(self) -> Result<PathBuf> {
        select_backend(self)?.ffmpeg_path()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FfmpegEncoderFactory {
    pub mode: FfmpegMode,
}

impl Default for FfmpegEncoderFactory {
    fn default() -> Self {
        Self {
            mode: FfmpegMode::Auto,
        }
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn open(&self, target: &EncodeTarget) -> Result<Box<dyn FrameEncoder>> {
        Ok(Box::new(FfmpegPipe::spawn_with_mode(target, self.mode)?))
    }
}

/// Streams frames to an ffmpeg process on a dedicated writer thread.
pub struct FfmpegPipe {
    sender: Option<mpsc::SyncSender<Vec<u8>>>,
    worker: Option<JoinHandle<Result<()>>>,
    cancelled: Arc<AtomicBool>,
    frame_size: usize,
}

trait VideoEncoderBackend: Send {
    fn mode_label(&self) -> &'static str;
    fn ffmpeg_path(&self) -> Result<PathBuf>;
}

struct SystemFfmpegBackend;

#[cfg(feature = "sidecar_ffmpeg")]
struct SidecarFfmpegBackend;

impl FfmpegPipe {
    pub fn spawn_with_mode(target: &EncodeTarget, mode: FfmpegMode) -> Result<Self> {
        let frame_size = target.frame_size()?;
        let backend = select_backend(mode)?;
        let worker_name = format!("lyric-ffmpeg-encoder-{}", backend.mode_label());
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);
        let cancelled = Arc::new(AtomicBool::new(false));
        let worker_cancelled = Arc::clone(&cancelled);
        let target = target.clone();

        let worker = thread::Builder::new()
            .name(worker_name)
            .spawn(move || {
                let ffmpeg_path = backend.ffmpeg_path()?;
                run_ffmpeg_process(
                    &ffmpeg_path,
                    receiver,
                    &target,
                    &worker_cancelled,
                    backend.mode_label(),
                )
            })
            .context("failed to spawn ffmpeg writer thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            cancelled,
            frame_size,
        })
    }

    fn join_worker(&mut self) -> Result<()> {
        let handle = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("ffmpeg worker thread missing"))?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("ffmpeg worker thread panicked")),
        }
    }
}

impl FrameEncoder for FfmpegPipe {
    fn write_frame(&mut self, rgba_frame: &[u8]) -> Result<()> {
        if rgba_frame.len() != self.frame_size {
            bail!(
                "frame size mismatch: expected {} bytes, got {}",
                self.frame_size,
                rgba_frame.len()
            );
        }
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("encoder has already been finalized"))?;
        if sender.send(rgba_frame.to_vec()).is_err() {
            drop(self.sender.take());
            // The worker hung up, so it has an error to report.
            return match self.join_worker() {
                Ok(()) => Err(anyhow!("ffmpeg stopped accepting frames")),
                Err(error) => Err(error.context("ffmpeg stopped accepting frames")),
            };
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        drop(self.sender.take());
        self.join_worker()
    }

    fn abort(mut self: Box<Self>) {
        self.cancelled.store(true, Ordering::SeqCst);
        drop(self.sender.take());
        if let Err(error) = self.join_worker() {
            debug!("ffmpeg worker after abort: {error:#}");
        }
    }
}

fn select_backend(mode: FfmpegMode) -> Result<Box<dyn VideoEncoderBackend>> {
    match mode {
        FfmpegMode::Auto | FfmpegMode::System => Ok(Box::new(SystemFfmpegBackend)),
        FfmpegMode::Sidecar => {
            #[cfg(feature = "sidecar_ffmpeg")]
            {
                Ok(Box::new(SidecarFfmpegBackend))
            }
            #[cfg(not(feature = "sidecar_ffmpeg"))]
            {
                Err(anyhow!(
                    "ffmpeg sidecar mode requested but lyric-studio was built without `sidecar_ffmpeg`. Rebuild with `--features sidecar_ffmpeg`."
                ))
            }
        }
    }
}

impl VideoEncoderBackend for SystemFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "system"
    }

    fn ffmpeg_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("ffmpeg"))
    }
}

#[cfg(feature = "sidecar_ffmpeg")]
impl VideoEncoderBackend for SidecarFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "sidecar"
    }

    fn ffmpeg_path(&self) -> Result<PathBuf> {
        let path = ffmpeg_sidecar::paths::ffmpeg_path();
        if !path.exists() {
            ffmpeg_sidecar::download::auto_download()
                .context("failed to auto-download ffmpeg sidecar binary")?;
        }
        Ok(path)
    }
}

fn run_ffmpeg_process(
    ffmpeg_path: &Path,
    receiver: mpsc::Receiver<Vec<u8>>,
    target: &EncodeTarget,
    cancelled: &AtomicBool,
    mode_label: &str,
) -> Result<()> {
    let path_str = target.output.to_string_lossy();
    if path_str.chars().any(|c| c.is_control()) {
        bail!("Output path contains invalid control characters");
    }

    let args = ffmpeg_args(target);
    let mut child = Command::new(ffmpeg_path)
        .args(args.iter().map(String::as_str))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!(
                    "ffmpeg executable not found (mode={mode_label}, resolved_path={}). Install ffmpeg (system mode) or use sidecar mode with `--features sidecar_ffmpeg`.",
                    ffmpeg_path.display()
                )
            } else {
                anyhow!(
                    "failed to spawn ffmpeg process (mode={mode_label}, resolved_path={}, args='{}'): {error}",
                    ffmpeg_path.display(),
                    args.join(" ")
                )
            }
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("failed to capture ffmpeg stdin"))?;
    let mut stderr_pipe = child.stderr.take();

    while let Ok(frame) = receiver.recv() {
        if cancelled.load(Ordering::SeqCst) {
            break;
        }
        if let Err(error) = stdin.write_all(&frame) {
            let _ = child.kill();
            let _ = child.wait();
            let stderr_tail = read_stderr_tail(&mut stderr_pipe)?;
            return Err(anyhow!(error).context(format!(
                "failed to write frame to ffmpeg stdin (stderr_tail='{stderr_tail}')"
            )));
        }
    }

    if cancelled.load(Ordering::SeqCst) {
        drop(stdin);
        let _ = child.kill();
        let _ = child.wait();
        bail!("encoding aborted");
    }

    stdin.flush().context("failed to flush ffmpeg stdin")?;
    drop(stdin);

    let status = child.wait().context("failed waiting for ffmpeg process")?;
    let stderr_tail = read_stderr_tail(&mut stderr_pipe)?;
    if !status.success() {
        return Err(anyhow!(
            "ffmpeg failed with status {status} (mode={mode_label}, resolved_path={}, args='{}', stderr_tail='{}')",
            ffmpeg_path.display(),
            args.join(" "),
            stderr_tail
        ));
    }

    Ok(())
}

pub fn ffmpeg_args(target: &EncodeTarget) -> Vec<String> {
    let size = format!("{}x{}", target.width, target.height);
    let mut args = ffmpeg_rawvideo_input_args(&size, &target.fps.to_string());

    match &target.audio {
        Some(audio) => {
            args.extend([
                "-i".to_owned(),
                audio.to_string_lossy().into_owned(),
                "-map".to_owned(),
                "0:v:0".to_owned(),
                "-map".to_owned(),
                "1:a:0".to_owned(),
            ]);
        }
        None => args.push("-an".to_owned()),
    }

    // yuv420p needs even dimensions
    args.extend([
        "-vf".to_owned(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".to_owned(),
    ]);
    args.extend(ffmpeg_codec_args(target.container, target.audio.is_some()));
    args.extend([
        "-f".to_owned(),
        target.container.ffmpeg_format().to_owned(),
        target.output.to_string_lossy().into_owned(),
    ]);
    args
}

pub fn ffmpeg_rawvideo_input_args(size: &str, fps: &str) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        "rgba".to_owned(),
        "-s:v".to_owned(),
        size.to_owned(),
        "-r".to_owned(),
        fps.to_owned(),
        "-i".to_owned(),
        "-".to_owned(),
    ]
}

pub fn ffmpeg_codec_args(container: Container, with_audio: bool) -> Vec<String> {
    let mut args = match container {
        Container::Mp4 => vec![
            "-c:v", "libx264", "-preset", "medium", "-crf", "18", "-pix_fmt", "yuv420p",
            "-movflags", "+faststart",
        ],
        Container::Webm => vec![
            "-c:v", "libvpx-vp9", "-b:v", "0", "-crf", "32", "-pix_fmt", "yuv420p",
        ],
    };
    if with_audio {
        match container {
            Container::Mp4 => args.extend(["-c:a", "aac", "-b:a", "192k"]),
            Container::Webm => args.extend(["-c:a", "libopus", "-b:a", "128k"]),
        }
        args.push("-shortest");
    }
    args.into_iter().map(str::to_owned).collect()
}

fn read_stderr_tail(stderr: &mut Option<std::process::ChildStderr>) -> Result<String> {
    let Some(mut pipe) = stderr.take() else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .context("failed reading ffmpeg stderr")?;
    let text = String::from_utf8_lossy(&buf).to_string();
    Ok(last_n_chars(&text, 500))
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let chars = s.chars().collect::<Vec<_>>();
    let start = chars.len().saturating_sub(max_chars);
    chars[start..].iter().collect::<String>().trim().to_owned()
}
