use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::decoding::PcmTrack;

pub const FFT_SIZE: usize = 256;
pub const BIN_COUNT: usize = FFT_SIZE / 2;
pub const SMOOTHING: f32 = 0.8;
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

/// Byte-valued frequency magnitudes over a short window of audio, smoothed
/// over time the way a browser analyser node reports them.
pub struct FrequencyAnalyser {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    bins: Vec<u8>,
}

impl Default for FrequencyAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyAnalyser {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let window = (0..FFT_SIZE)
            .map(|i| {
                let phase = 2.0 * PI * i as f32 / FFT_SIZE as f32;
                0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
            })
            .collect();

        Self {
            fft,
            window,
            scratch: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            smoothed: vec![0.0; BIN_COUNT],
            bins: vec![0; BIN_COUNT],
        }
    }

    pub fn bin_count(&self) -> usize {
        BIN_COUNT
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
        self.bins.fill(0);
    }

    /// Analyses the `FFT_SIZE` samples of `track` ending at `time_secs`.
    pub fn sample_track(&mut self, track: &PcmTrack, time_secs: f64) -> &[u8] {
        let end = track.sample_index(time_secs);
        self.analyse_window(track.samples(), end)
    }

    /// Feeds one window of silence; bins decay toward zero.
    pub fn sample_silence(&mut self) -> &[u8] {
        self.analyse_window(&[], 0)
    }

    /// Window is `samples[end - FFT_SIZE..end]`, zero-filled where it falls
    /// outside the buffer.
    pub fn analyse_window(&mut self, samples: &[f32], end: usize) -> &[u8] {
        let start = end as isize - FFT_SIZE as isize;
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let index = start + i as isize;
            let sample = usize::try_from(index)
                .ok()
                .and_then(|index| samples.get(index))
                .copied()
                .unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.scratch);

        let range = MAX_DECIBELS - MIN_DECIBELS;
        for k in 0..BIN_COUNT {
            let magnitude = self.scratch[k].norm() / FFT_SIZE as f32;
            let smoothed = SMOOTHING * self.smoothed[k] + (1.0 - SMOOTHING) * magnitude;
            self.smoothed[k] = if smoothed.is_finite() { smoothed } else { 0.0 };

            let decibels = 20.0 * self.smoothed[k].log10();
            let scaled = 255.0 / range * (decibels - MIN_DECIBELS);
            self.bins[k] = if scaled.is_finite() {
                scaled.clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
        &self.bins
    }
}
