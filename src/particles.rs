use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::canvas::Canvas;
use crate::settings::HexColor;

const MAX_SPEED: f32 = 0.5;
const MIN_RADIUS: f32 = 1.0;
const MAX_RADIUS: f32 = 4.0;
const MIN_LIFETIME_FRAMES: f32 = 100.0;
/// No particle outlives this many steps.
pub const MAX_LIFETIME_FRAMES: f32 = 200.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
    pub color: HexColor,
    pub age: f32,
    pub max_age: f32,
}

impl Particle {
    pub fn is_alive(&self) -> bool {
        self.age < self.max_age
    }

    /// Fades linearly from opaque at birth to transparent at `max_age`.
    pub fn alpha(&self) -> f32 {
        if self.max_age <= 0.0 {
            return 0.0;
        }
        (1.0 - self.age / self.max_age).clamp(0.0, 1.0)
    }

    fn advance(&mut self, width: f32, height: f32, beat_factor: f32) {
        self.x += self.vx * beat_factor;
        self.y += self.vy * beat_factor;
        self.age += 1.0;

        if self.x < 0.0 || self.x > width {
            self.vx = -self.vx;
        }
        if self.y < 0.0 || self.y > height {
            self.vy = -self.vy;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepStats {
    pub spawned: usize,
    pub expired: usize,
}

/// Bounded pool of ambient particles drifting inside the render surface.
///
/// The pool grows by at most one particle per step toward the target, so a
/// fresh or resized surface ramps up rather than filling instantly.
#[derive(Debug, Clone)]
pub struct ParticleField {
    particles: Vec<Particle>,
    bounds: Option<(u32, u32)>,
    rng: StdRng,
}

impl ParticleField {
    pub fn new(seed: u64) -> Self {
        Self {
            particles: Vec::new(),
            bounds: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }

    /// Advances the simulation by one frame.
    ///
    /// A change of surface size drops the whole population; it regrows from
    /// empty instead of being rescaled.
    pub fn step(
        &mut self,
        width: u32,
        height: u32,
        beat_factor: f32,
        target: usize,
        palette: [HexColor; 2],
    ) -> StepStats {
        if self.bounds != Some((width, height)) {
            self.particles.clear();
            self.bounds = Some((width, height));
        }

        let beat_factor = if beat_factor.is_finite() {
            beat_factor
        } else {
            1.0
        };
        let (w, h) = (width as f32, height as f32);

        let mut stats = StepStats::default();
        if self.particles.len() < target && width > 0 && height > 0 {
            let particle = self.spawn(w, h, palette);
            self.particles.push(particle);
            stats.spawned = 1;
        }

        for particle in &mut self.particles {
            particle.advance(w, h, beat_factor);
        }

        let before = self.particles.len();
        self.particles.retain(Particle::is_alive);
        stats.expired = before - self.particles.len();
        stats
    }

    pub fn draw(&self, canvas: &mut Canvas) {
        for particle in &self.particles {
            canvas.fill_circle(
                particle.x,
                particle.y,
                particle.radius,
                particle.color.with_alpha(particle.alpha()),
            );
        }
    }

    fn spawn(&mut self, width: f32, height: f32, palette: [HexColor; 2]) -> Particle {
        let color = if self.rng.gen_bool(0.5) {
            palette[0]
        } else {
            palette[1]
        };
        Particle {
            x: self.rng.gen_range(0.0..width),
            y: self.rng.gen_range(0.0..height),
            vx: self.rng.gen_range(-MAX_SPEED..MAX_SPEED),
            vy: self.rng.gen_range(-MAX_SPEED..MAX_SPEED),
            radius: self.rng.gen_range(MIN_RADIUS..MAX_RADIUS),
            color,
            age: 0.0,
            max_age: self.rng.gen_range(MIN_LIFETIME_FRAMES..MAX_LIFETIME_FRAMES),
        }
    }

    #[cfg(test)]
    fn insert(&mut self, particle: Particle) {
        self.particles.push(particle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PALETTE: [HexColor; 2] = [HexColor::rgb(255, 0, 0), HexColor::rgb(0, 0, 255)];

    fn aged(age: f32, max_age: f32) -> Particle {
        Particle {
            x: 10.0,
            y: 10.0,
            vx: 0.0,
            vy: 0.0,
            radius: 2.0,
            color: PALETTE[0],
            age,
            max_age,
        }
    }

    #[test]
    fn spawns_one_per_step_and_never_exceeds_target() {
        let mut field = ParticleField::new(7);
        for step in 1..=400 {
            field.step(320, 240, 1.0, 50, PALETTE);
            assert!(field.len() <= 50, "population {} over target", field.len());
            if step <= 50 {
                assert_eq!(field.len(), step, "growth must be one per frame");
            }
        }
        assert!(field.len() >= 45, "population should hover near target");
    }

    #[test]
    fn spawned_particles_respect_ranges_and_palette() {
        let mut field = ParticleField::new(3);
        for _ in 0..60 {
            field.step(200, 100, 1.0, 60, PALETTE);
        }
        for particle in field.particles() {
            assert!((MIN_RADIUS..MAX_RADIUS).contains(&particle.radius));
            assert!(particle.vx.abs() <= MAX_SPEED && particle.vy.abs() <= MAX_SPEED);
            assert!(particle.max_age >= MIN_LIFETIME_FRAMES);
            assert!(particle.max_age < MAX_LIFETIME_FRAMES);
            assert!(PALETTE.contains(&particle.color));
            assert!(particle.x > -1.0 && particle.x < 201.0);
        }
    }

    #[test]
    fn expiring_neighbours_are_all_removed_in_one_pass() {
        let mut field = ParticleField::new(1);
        field.step(100, 100, 1.0, 0, PALETTE);
        field.insert(aged(99.0, 100.0));
        field.insert(aged(99.0, 100.0));
        field.insert(aged(10.0, 100.0));
        field.insert(aged(99.5, 100.0));

        let stats = field.step(100, 100, 1.0, 0, PALETTE);
        assert_eq!(stats.expired, 3);
        assert_eq!(field.len(), 1);
        assert_eq!(field.particles()[0].age, 11.0);
    }

    #[test]
    fn walls_reflect_velocity_without_clamping() {
        let mut field = ParticleField::new(1);
        field.step(100, 100, 1.0, 0, PALETTE);
        field.insert(Particle {
            x: 99.8,
            y: 0.2,
            vx: 0.4,
            vy: -0.4,
            ..aged(0.0, 150.0)
        });

        field.step(100, 100, 1.0, 0, PALETTE);
        let particle = &field.particles()[0];
        assert!(particle.x > 100.0, "position is not clamped");
        assert!(particle.vx < 0.0);
        assert!(particle.vy > 0.0);
    }

    #[test]
    fn beat_factor_scales_displacement() {
        let mut field = ParticleField::new(1);
        field.step(100, 100, 1.0, 0, PALETTE);
        field.insert(Particle {
            vx: 0.5,
            ..aged(0.0, 150.0)
        });
        field.step(100, 100, 2.0, 0, PALETTE);
        assert!((field.particles()[0].x - 11.0).abs() < 1e-5);

        field.step(100, 100, f32::NAN, 0, PALETTE);
        assert!((field.particles()[0].x - 11.5).abs() < 1e-5);
    }

    #[test]
    fn resize_clears_population() {
        let mut field = ParticleField::new(9);
        for _ in 0..20 {
            field.step(100, 100, 1.0, 30, PALETTE);
        }
        assert_eq!(field.len(), 20);

        field.step(120, 100, 1.0, 30, PALETTE);
        assert_eq!(field.len(), 1, "resized field regrows from empty");
    }

    #[test]
    fn same_seed_replays_identically() {
        let mut a = ParticleField::new(42);
        let mut b = ParticleField::new(42);
        for _ in 0..30 {
            a.step(64, 64, 1.3, 20, PALETTE);
            b.step(64, 64, 1.3, 20, PALETTE);
        }
        assert_eq!(a.particles(), b.particles());
    }

    #[test]
    fn alpha_fades_with_age() {
        assert_eq!(aged(0.0, 100.0).alpha(), 1.0);
        assert!((aged(25.0, 100.0).alpha() - 0.75).abs() < 1e-6);
        assert_eq!(aged(100.0, 100.0).alpha(), 0.0);
    }
}
