use anyhow::Result;

use crate::animation::{self, AnimationFrame};
use crate::canvas::Canvas;
use crate::particles::ParticleField;
use crate::settings::{HexColor, VisualSettings};
use crate::subtitle::LyricLine;
use crate::text::{Glow, LyricPainter, Outline, TextPaint};
use crate::timeline;

/// Number of low-frequency bins averaged into the beat factor.
pub const BEAT_BIN_COUNT: usize = 20;
pub const BAR_WIDTH_FACTOR: f32 = 2.5;
pub const BAR_GAP_PX: f32 = 1.0;
pub const BAR_OPACITY: f32 = 0.5;
pub const GHOST_SIZE_RATIO: f32 = 0.6;
pub const GHOST_OPACITY: f32 = 0.3;
pub const GHOST_OFFSET_FONT_SIZES: f32 = 1.5;
pub const GLOW_RADIUS_PER_BEAT: f32 = 10.0;
pub const OUTLINE_WIDTH_PX: usize = 1;
const TEXT_WIDTH_RATIO: f32 = 0.9;

/// Audio intensity scalar, always finite and `>= 1.0` for non-negative
/// sensitivity. Missing analysis yields exactly 1.0.
pub fn beat_factor(spectrum: Option<&[u8]>, sensitivity: f32) -> f32 {
    let Some(bins) = spectrum.filter(|bins| !bins.is_empty()) else {
        return 1.0;
    };
    let low = &bins[..bins.len().min(BEAT_BIN_COUNT)];
    let average = low.iter().map(|bin| f32::from(*bin)).sum::<f32>() / low.len() as f32;
    let sensitivity = if sensitivity.is_finite() {
        sensitivity.max(0.0)
    } else {
        0.0
    };
    1.0 + (average / 255.0) * sensitivity
}

pub struct FrameInput<'a> {
    pub time: f64,
    pub lines: &'a [LyricLine],
    pub settings: &'a VisualSettings,
    /// Current analyser bins, or `None` when no audio is loaded.
    pub spectrum: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSummary {
    pub beat_factor: f32,
    pub active_index: Option<usize>,
    pub has_previous: bool,
    pub animation: Option<AnimationFrame>,
    pub particle_count: usize,
}

/// Paints one frame of the lyric video per call: background, particles,
/// spectrum bars, the ghost of the previous line and the animated active line.
pub struct FrameRenderer {
    canvas: Canvas,
    particles: ParticleField,
    painter: Option<LyricPainter>,
}

impl FrameRenderer {
    pub fn new(width: u32, height: u32, seed: u64, painter: Option<LyricPainter>) -> Result<Self> {
        Ok(Self {
            canvas: Canvas::new(width, height)?,
            particles: ParticleField::new(seed),
            painter,
        })
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn frame(&self) -> &[u8] {
        self.canvas.data()
    }

    pub fn particles(&self) -> &ParticleField {
        &self.particles
    }

    pub fn has_text(&self) -> bool {
        self.painter.is_some()
    }

    pub fn set_painter(&mut self, painter: Option<LyricPainter>) {
        self.painter = painter;
    }

    /// Reallocates the surface. Particles are dropped on the next frame.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width != self.width() || height != self.height() {
            self.canvas = Canvas::new(width, height)?;
        }
        Ok(())
    }

    /// Simulates one frame of particle motion without painting anything.
    pub fn warm_up(&mut self, settings: &VisualSettings, spectrum: Option<&[u8]>) {
        let beat = beat_factor(spectrum, settings.beat_sensitivity);
        self.step_particles(settings, beat);
    }

    fn step_particles(&mut self, settings: &VisualSettings, beat: f32) {
        let stats = self.particles.step(
            self.canvas.width(),
            self.canvas.height(),
            beat,
            settings.particle_count as usize,
            [settings.primary_color, settings.secondary_color],
        );
        tracing::trace!(spawned = stats.spawned, expired = stats.expired, "particles stepped");
    }

    #[tracing::instrument(level = "trace", skip_all, fields(time = input.time))]
    pub fn render_frame(&mut self, input: &FrameInput<'_>) -> FrameSummary {
        let settings = input.settings;
        let beat = beat_factor(input.spectrum, settings.beat_sensitivity);
        let width = self.canvas.width();
        let height = self.canvas.height();

        self.canvas.clear(settings.background_color);

        self.step_particles(settings, beat);
        self.particles.draw(&mut self.canvas);

        if let Some(bins) = input.spectrum {
            draw_spectrum_bars(&mut self.canvas, bins, beat, settings.secondary_color);
        }

        let resolved = timeline::resolve(input.lines, input.time);
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let max_text_width = width as f32 * TEXT_WIDTH_RATIO;

        if let (Some(previous), Some(painter)) = (resolved.previous, self.painter.as_mut()) {
            let ghost = TextPaint {
                size: settings.font_size * GHOST_SIZE_RATIO,
                fill: HexColor::WHITE,
                opacity: GHOST_OPACITY,
                outline: None,
                glow: None,
            };
            painter.draw_centered(
                &mut self.canvas,
                &previous.text,
                center_x,
                center_y - settings.font_size * GHOST_OFFSET_FONT_SIZES,
                max_text_width,
                &ghost,
            );
        }

        let mut animation_frame = None;
        if let Some(active) = resolved.active(input.lines) {
            let elapsed = (input.time - active.start_time).max(0.0) as f32;
            let frame =
                animation::evaluate(settings.animation, elapsed, settings.animation_speed, beat);
            animation_frame = Some(frame);

            if let Some(painter) = self.painter.as_mut() {
                let paint = TextPaint {
                    size: settings.font_size * frame.render_scale,
                    fill: HexColor::WHITE,
                    opacity: frame.opacity,
                    outline: Some(Outline {
                        color: settings.primary_color,
                        width: OUTLINE_WIDTH_PX,
                    }),
                    glow: settings.style.has_glow().then_some(Glow {
                        color: settings.primary_color,
                        radius: GLOW_RADIUS_PER_BEAT * beat,
                    }),
                };
                painter.draw_centered(
                    &mut self.canvas,
                    &active.text,
                    center_x,
                    center_y + frame.offset_y,
                    max_text_width,
                    &paint,
                );
            }
        }

        FrameSummary {
            beat_factor: beat,
            active_index: resolved.active_index,
            has_previous: resolved.previous.is_some(),
            animation: animation_frame,
            particle_count: self.particles.len(),
        }
    }
}

/// Bars grow up from the bottom edge over at most a third of the height.
fn draw_spectrum_bars(canvas: &mut Canvas, bins: &[u8], beat: f32, color: HexColor) {
    if bins.is_empty() {
        return;
    }
    let width = canvas.width() as f32;
    let height = canvas.height() as f32;
    let bar_width = (width / bins.len() as f32) * BAR_WIDTH_FACTOR;
    let fill = color.with_alpha(BAR_OPACITY);

    let mut x = 0.0;
    for bin in bins {
        if x >= width {
            break;
        }
        let bar_height = (f32::from(*bin) / 255.0) * (height / 3.0) * beat;
        if bar_height > 0.0 {
            canvas.fill_rect(x, height - bar_height, bar_width, bar_height, fill);
        }
        x += bar_width + BAR_GAP_PX;
    }
}
