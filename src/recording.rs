use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::encoding::{Container, EncodeTarget, EncoderFactory, FrameEncoder};
use crate::playback::Playback;

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("no recording is in progress")]
    NotRecording,
    #[error("no renderable surface to record")]
    NoSurface,
    #[error("no audio is loaded; load a track before recording")]
    NoAudio,
    #[error("encoder failed: {0:#}")]
    Encoder(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

/// What a recording captures and where the finished file goes.
#[derive(Debug, Clone, Copy)]
pub struct RecordingRequest<'a> {
    pub output: &'a Path,
    pub fps: u32,
    /// Surface size, `None` when nothing can be rendered.
    pub surface: Option<(u32, u32)>,
    pub audio: Option<&'a Path>,
}

/// The single file produced by a successful recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingArtifact {
    pub path: PathBuf,
    pub frames: u64,
    pub duration_secs: f64,
}

struct ActiveRecording {
    encoder: Box<dyn FrameEncoder>,
    partial: PathBuf,
    output: PathBuf,
    fps: u32,
    frames: u64,
}

#[derive(Default)]
pub struct RecordingSession {
    active: Option<ActiveRecording>,
    last_error: Option<String>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecordingState {
        if self.active.is_some() {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn frames_written(&self) -> u64 {
        self.active.as_ref().map_or(0, |active| active.frames)
    }

    /// Message of the last encoder failure that ended a recording.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Opens the encoder and restarts playback from zero so the file covers
    /// the whole track.
    pub fn start(
        &mut self,
        factory: &dyn EncoderFactory,
        request: RecordingRequest<'_>,
        playback: &mut Playback,
    ) -> Result<(), RecordingError> {
        if self.active.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }
        let (width, height) = request
            .surface
            .filter(|(w, h)| *w > 0 && *h > 0)
            .ok_or(RecordingError::NoSurface)?;
        let audio = request.audio.ok_or(RecordingError::NoAudio)?;
        if !playback.is_loaded() {
            return Err(RecordingError::NoAudio);
        }

        let partial = partial_path(request.output);
        let target = EncodeTarget {
            width,
            height,
            fps: request.fps.max(1),
            audio: Some(audio.to_path_buf()),
            output: partial.clone(),
            container: Container::from_path(request.output),
        };
        let encoder = factory.open(&target).map_err(RecordingError::Encoder)?;

        playback.seek(0.0);
        playback.play();
        self.last_error = None;
        self.active = Some(ActiveRecording {
            encoder,
            partial,
            output: request.output.to_path_buf(),
            fps: target.fps,
            frames: 0,
        });
        info!(output = %request.output.display(), width, height, fps = target.fps, "recording started");
        Ok(())
    }

    /// Sends one frame. A failure ends the recording and drops the partial file.
    pub fn push_frame(&mut self, rgba_frame: &[u8]) -> Result<(), RecordingError> {
        let active = self.active.as_mut().ok_or(RecordingError::NotRecording)?;
        match active.encoder.write_frame(rgba_frame) {
            Ok(()) => {
                active.frames += 1;
                Ok(())
            }
            Err(error) => {
                if let Some(active) = self.active.take() {
                    active.encoder.abort();
                    remove_partial(&active.partial);
                }
                warn!("recording aborted: {error:#}");
                self.last_error = Some(format!("{error:#}"));
                Err(RecordingError::Encoder(error))
            }
        }
    }

    /// Finalizes the encoder and moves the file to the requested output.
    pub fn stop(&mut self, playback: &mut Playback) -> Result<RecordingArtifact, RecordingError> {
        let active = self.active.take().ok_or(RecordingError::NotRecording)?;
        playback.pause();

        let finished = active.encoder.finish().and_then(|()| {
            fs::rename(&active.partial, &active.output).with_context(|| {
                format!(
                    "failed to move {} to {}",
                    active.partial.display(),
                    active.output.display()
                )
            })
        });
        if let Err(error) = finished {
            remove_partial(&active.partial);
            warn!("recording failed to finalize: {error:#}");
            self.last_error = Some(format!("{error:#}"));
            return Err(RecordingError::Encoder(error));
        }

        let artifact = RecordingArtifact {
            path: active.output,
            frames: active.frames,
            duration_secs: active.frames as f64 / f64::from(active.fps),
        };
        info!(
            path = %artifact.path.display(),
            frames = artifact.frames,
            "recording saved"
        );
        Ok(artifact)
    }

    /// Drops an in-progress recording without producing a file.
    pub fn discard(&mut self) {
        if let Some(active) = self.active.take() {
            active.encoder.abort();
            remove_partial(&active.partial);
            debug!("recording discarded");
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.discard();
    }
}

pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

fn remove_partial(path: &Path) {
    if let Err(error) = fs::remove_file(path) {
        if error.kind() != ErrorKind::NotFound {
            debug!(path = %path.display(), "failed to remove partial recording: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        targets: Vec<EncodeTarget>,
        frames: usize,
        aborted: bool,
    }

    struct FileEncoder {
        output: PathBuf,
        log: Arc<Mutex<Log>>,
        fail_after: Option<usize>,
    }

    impl FrameEncoder for FileEncoder {
        fn write_frame(&mut self, _rgba_frame: &[u8]) -> Result<()> {
            let mut log = self.log.lock().expect("log");
            if self.fail_after.is_some_and(|limit| log.frames >= limit) {
                return Err(anyhow!("disk full"));
            }
            log.frames += 1;
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<()> {
            fs::write(&self.output, b"video")?;
            Ok(())
        }

        fn abort(self: Box<Self>) {
            self.log.lock().expect("log").aborted = true;
        }
    }

    struct FileEncoderFactory {
        log: Arc<Mutex<Log>>,
        fail_after: Option<usize>,
    }

    impl FileEncoderFactory {
        fn new(fail_after: Option<usize>) -> Self {
            Self {
                log: Arc::default(),
                fail_after,
            }
        }
    }

    impl EncoderFactory for FileEncoderFactory {
        fn open(&self, target: &EncodeTarget) -> Result<Box<dyn FrameEncoder>> {
            fs::write(&target.output, b"")?;
            self.log.lock().expect("log").targets.push(target.clone());
            Ok(Box::new(FileEncoder {
                output: target.output.clone(),
                log: Arc::clone(&self.log),
                fail_after: self.fail_after,
            }))
        }
    }

    fn request<'a>(output: &'a Path, audio: &'a Path) -> RecordingRequest<'a> {
        RecordingRequest {
            output,
            fps: 30,
            surface: Some((64, 36)),
            audio: Some(audio),
        }
    }

    #[test]
    fn start_resets_playback_and_stop_produces_one_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("clip.webm");
        let audio = dir.path().join("song.mp3");
        let factory = FileEncoderFactory::new(None);
        let mut playback = Playback::new(10.0);
        playback.seek(6.0);

        let mut session = RecordingSession::new();
        session
            .start(&factory, request(&output, &audio), &mut playback)
            .expect("start");
        assert_eq!(session.state(), RecordingState::Recording);
        assert_eq!(playback.position(), 0.0);
        assert!(playback.is_playing());

        let target = factory.log.lock().expect("log").targets[0].clone();
        assert_eq!(target.output, dir.path().join("clip.webm.part"));
        assert_eq!(target.container, Container::Webm);
        assert_eq!(target.audio.as_deref(), Some(audio.as_path()));

        for _ in 0..3 {
            session.push_frame(&[0; 16]).expect("frame");
        }
        let artifact = session.stop(&mut playback).expect("stop");
        assert_eq!(artifact.path, output);
        assert_eq!(artifact.frames, 3);
        assert!((artifact.duration_secs - 0.1).abs() < 1e-9);
        assert!(output.exists());
        assert!(!partial_path(&output).exists());
        assert!(!playback.is_playing());
        assert_eq!(session.state(), RecordingState::Idle);
    }

    #[test]
    fn stop_from_idle_and_double_start_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("clip.mp4");
        let audio = dir.path().join("song.mp3");
        let factory = FileEncoderFactory::new(None);
        let mut playback = Playback::new(10.0);
        let mut session = RecordingSession::new();

        assert!(matches!(
            session.stop(&mut playback),
            Err(RecordingError::NotRecording)
        ));
        assert!(matches!(
            session.push_frame(&[0; 4]),
            Err(RecordingError::NotRecording)
        ));

        session
            .start(&factory, request(&output, &audio), &mut playback)
            .expect("start");
        assert!(matches!(
            session.start(&factory, request(&output, &audio), &mut playback),
            Err(RecordingError::AlreadyRecording)
        ));
        assert_eq!(factory.log.lock().expect("log").targets.len(), 1);
    }

    #[test]
    fn start_requires_surface_and_audio() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("clip.mp4");
        let audio = dir.path().join("song.mp3");
        let factory = FileEncoderFactory::new(None);
        let mut session = RecordingSession::new();

        let mut loaded = Playback::new(5.0);
        let no_surface = RecordingRequest {
            surface: None,
            ..request(&output, &audio)
        };
        assert!(matches!(
            session.start(&factory, no_surface, &mut loaded),
            Err(RecordingError::NoSurface)
        ));

        let no_audio = RecordingRequest {
            audio: None,
            ..request(&output, &audio)
        };
        assert!(matches!(
            session.start(&factory, no_audio, &mut loaded),
            Err(RecordingError::NoAudio)
        ));

        let mut unloaded = Playback::default();
        assert!(matches!(
            session.start(&factory, request(&output, &audio), &mut unloaded),
            Err(RecordingError::NoAudio)
        ));
        assert_eq!(session.state(), RecordingState::Idle);
    }

    #[test]
    fn encoder_error_returns_to_idle_and_removes_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("clip.mp4");
        let audio = dir.path().join("song.mp3");
        let factory = FileEncoderFactory::new(Some(2));
        let mut playback = Playback::new(10.0);
        let mut session = RecordingSession::new();

        session
            .start(&factory, request(&output, &audio), &mut playback)
            .expect("start");
        assert!(partial_path(&output).exists());
        session.push_frame(&[0; 4]).expect("first");
        session.push_frame(&[0; 4]).expect("second");
        let error = session.push_frame(&[0; 4]).expect_err("third fails");

        assert!(matches!(error, RecordingError::Encoder(_)));
        assert_eq!(session.state(), RecordingState::Idle);
        assert!(factory.log.lock().expect("log").aborted);
        assert!(!partial_path(&output).exists());
        assert!(!output.exists());
        assert!(session.last_error().is_some_and(|msg| msg.contains("disk full")));

        // a fresh recording can start afterwards
        session
            .start(&factory, request(&output, &audio), &mut playback)
            .expect("restart");
        assert!(session.last_error().is_none());
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/tmp/out.mp4")),
            PathBuf::from("/tmp/out.mp4.part")
        );
    }
}
