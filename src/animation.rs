use std::f32::consts::PI;

use crate::settings::AnimationKind;

/// Nominal entrance duration at speed 1.0, in seconds.
pub const BASE_DURATION_SECS: f32 = 0.5;
/// Smallest speed the evaluator accepts; anything lower (including zero,
/// negatives and NaN) is clamped up to it.
pub const MIN_SPEED: f32 = 0.01;
pub const SLIDE_DISTANCE_PX: f32 = 50.0;
const BEAT_PULSE_GAIN: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    OutCubic,
    OutElastic,
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        match self {
            Self::Linear => t,
            Self::OutCubic => ease_out_cubic(t),
            Self::OutElastic => ease_out_elastic(t),
        }
    }
}

pub fn ease_out_cubic(x: f32) -> f32 {
    1.0 - (1.0 - x).powi(3)
}

/// Overshoots above 1.0 before settling, pinned to exactly 0 and 1 at the ends.
pub fn ease_out_elastic(x: f32) -> f32 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let c4 = (2.0 * PI) / 3.0;
    2.0_f32.powf(-10.0 * x) * ((x * 10.0 - 0.75) * c4).sin() + 1.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationFrame {
    pub opacity: f32,
    /// Kind-specific scale before the beat pulse is applied.
    pub scale: f32,
    pub offset_y: f32,
    /// Beat pulse multiplied by `scale`; what the renderer uses.
    pub render_scale: f32,
}

impl AnimationFrame {
    pub const IDENTITY: Self = Self {
        opacity: 1.0,
        scale: 1.0,
        offset_y: 0.0,
        render_scale: 1.0,
    };
}

pub fn beat_pulse_scale(beat_factor: f32) -> f32 {
    let beat = if beat_factor.is_finite() { beat_factor } else { 1.0 };
    1.0 + (beat - 1.0) * BEAT_PULSE_GAIN
}

/// Normalized progress of the entrance animation, in `[0, 1]`.
pub fn progress(elapsed_secs: f32, speed: f32) -> f32 {
    let speed = if speed.is_finite() {
        speed.max(MIN_SPEED)
    } else {
        1.0
    };
    let elapsed = if elapsed_secs.is_finite() {
        elapsed_secs.max(0.0)
    } else {
        0.0
    };
    let duration = BASE_DURATION_SECS / speed;
    (elapsed / duration).clamp(0.0, 1.0)
}

/// Evaluates the entrance animation of the active line.
pub fn evaluate(
    kind: AnimationKind,
    elapsed_secs: f32,
    speed: f32,
    beat_factor: f32,
) -> AnimationFrame {
    let t = progress(elapsed_secs, speed);
    let (opacity, scale, offset_y) = match kind {
        AnimationKind::Fade => (t, 1.0, 0.0),
        AnimationKind::SlideUp => (
            t,
            1.0,
            SLIDE_DISTANCE_PX * (1.0 - Easing::OutCubic.apply(t)),
        ),
        AnimationKind::Zoom => (t, t, 0.0),
        AnimationKind::Bounce => ((2.0 * t).min(1.0), Easing::OutElastic.apply(t), 0.0),
    };

    AnimationFrame {
        opacity,
        scale,
        offset_y,
        render_scale: beat_pulse_scale(beat_factor) * scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn fade_ramps_monotonically_from_zero_to_one() {
        assert_eq!(evaluate(AnimationKind::Fade, 0.0, 1.0, 1.0).opacity, 0.0);
        assert_eq!(evaluate(AnimationKind::Fade, 0.5, 1.0, 1.0).opacity, 1.0);
        assert_eq!(evaluate(AnimationKind::Fade, 30.0, 1.0, 1.0).opacity, 1.0);

        let mut last = 0.0;
        for step in 0..=50 {
            let opacity = evaluate(AnimationKind::Fade, step as f32 * 0.01, 1.0, 1.0).opacity;
            assert!(opacity + EPS >= last, "fade must not decrease");
            last = opacity;
        }
    }

    #[test]
    fn speed_scales_the_duration_inversely() {
        assert!((progress(0.25, 1.0) - 0.5).abs() < EPS);
        assert!((progress(0.25, 2.0) - 1.0).abs() < EPS);
        assert!((progress(0.25, 0.5) - 0.25).abs() < EPS);
    }

    #[test]
    fn degenerate_speed_and_time_stay_finite() {
        for speed in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            for elapsed in [0.0, 0.1, -3.0, f32::NAN] {
                for kind in AnimationKind::ALL {
                    let frame = evaluate(kind, elapsed, speed, f32::NAN);
                    assert!(frame.opacity.is_finite());
                    assert!(frame.render_scale.is_finite());
                    assert!(frame.offset_y.is_finite());
                }
            }
        }
    }

    #[test]
    fn slide_up_starts_low_and_lands_at_rest() {
        let start = evaluate(AnimationKind::SlideUp, 0.0, 1.0, 1.0);
        assert!((start.offset_y - SLIDE_DISTANCE_PX).abs() < EPS);
        let end = evaluate(AnimationKind::SlideUp, 1.0, 1.0, 1.0);
        assert!(end.offset_y.abs() < EPS);
        assert_eq!(end.opacity, 1.0);
    }

    #[test]
    fn zoom_scales_with_progress() {
        let mid = evaluate(AnimationKind::Zoom, 0.25, 1.0, 1.0);
        assert!((mid.scale - 0.5).abs() < EPS);
        assert!((mid.opacity - 0.5).abs() < EPS);
    }

    #[test]
    fn bounce_overshoots_then_settles() {
        let overshoot = (1..100)
            .map(|step| evaluate(AnimationKind::Bounce, step as f32 * 0.005, 1.0, 1.0).scale)
            .fold(f32::MIN, f32::max);
        assert!(overshoot > 1.0, "bounce should overshoot, max {overshoot}");

        let settled = evaluate(AnimationKind::Bounce, 0.499, 1.0, 1.0).scale;
        assert!((settled - 1.0).abs() < 0.01);
        assert_eq!(evaluate(AnimationKind::Bounce, 0.5, 1.0, 1.0).scale, 1.0);
        assert_eq!(evaluate(AnimationKind::Bounce, 0.0, 1.0, 1.0).scale, 0.0);
        assert_eq!(evaluate(AnimationKind::Bounce, 0.125, 1.0, 1.0).opacity, 0.5);
    }

    #[test]
    fn beat_pulse_multiplies_kind_scale() {
        assert!((beat_pulse_scale(1.0) - 1.0).abs() < EPS);
        assert!((beat_pulse_scale(2.0) - 1.2).abs() < EPS);

        let zoom = evaluate(AnimationKind::Zoom, 0.25, 1.0, 2.0);
        assert!((zoom.render_scale - 0.6).abs() < EPS);
        let fade = evaluate(AnimationKind::Fade, 0.0, 1.0, 1.5);
        assert!((fade.render_scale - 1.1).abs() < EPS);
    }
}
