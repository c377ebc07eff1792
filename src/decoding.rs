use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Decoded mono audio kept in memory for analysis, plus the file it came
/// from so the encoder can mux the original stream.
#[derive(Debug, Clone)]
pub struct PcmTrack {
    sample_rate: u32,
    samples: Vec<f32>,
    source: Option<PathBuf>,
}

impl PcmTrack {
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Result<Self> {
        if sample_rate == 0 {
            bail!("sample rate must be > 0");
        }
        Ok(Self {
            sample_rate,
            samples,
            source: None,
        })
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Index one past the sample playing at `time_secs`, clamped to the track.
    pub fn sample_index(&self, time_secs: f64) -> usize {
        if !time_secs.is_finite() || time_secs <= 0.0 {
            return 0;
        }
        let index = (time_secs * f64::from(self.sample_rate)).round() as usize;
        index.min(self.samples.len())
    }
}

/// Decodes any ffmpeg-readable audio file to mono f32 PCM.
pub fn decode_audio(input_path: &Path, sample_rate: u32) -> Result<PcmTrack> {
    decode_audio_with(Path::new("ffmpeg"), input_path, sample_rate)
}

pub fn decode_audio_with(ffmpeg_path: &Path, input_path: &Path, sample_rate: u32) -> Result<PcmTrack> {
    if !input_path.is_file() {
        bail!("audio file does not exist: {}", input_path.display());
    }

    let mut child = Command::new(ffmpeg_path)
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(input_path)
        .arg("-vn")
        .arg("-ac")
        .arg("1")
        .arg("-ar")
        .arg(sample_rate.to_string())
        .arg("-f")
        .arg("f32le")
        .arg("-")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!(
                    "ffmpeg executable not found (resolved_path={}). Install ffmpeg to decode audio.",
                    ffmpeg_path.display()
                )
            } else {
                anyhow!("failed to spawn ffmpeg decoder: {error}")
            }
        })?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("failed to capture ffmpeg stdout"))?;
    let mut raw = Vec::new();
    stdout
        .read_to_end(&mut raw)
        .context("failed to read decoded audio from ffmpeg")?;

    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        pipe.read_to_string(&mut stderr)
            .context("failed reading ffmpeg stderr")?;
    }
    let status = child.wait().context("failed waiting for ffmpeg decoder")?;
    if !status.success() {
        bail!(
            "ffmpeg failed to decode {} with status {status}: {}",
            input_path.display(),
            stderr.trim()
        );
    }

    let samples = samples_from_f32le(&raw);
    if samples.is_empty() {
        bail!("{} contains no audio samples", input_path.display());
    }

    let track = PcmTrack::new(sample_rate, samples)?.with_source(input_path);
    info!(
        path = %input_path.display(),
        duration_secs = track.duration_secs(),
        "decoded audio"
    );
    Ok(track)
}

fn samples_from_f32le(raw: &[u8]) -> Vec<f32> {
    raw.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
