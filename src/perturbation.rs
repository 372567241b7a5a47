//! Bounded random velocity jitter.
//!
//! The generator draws a unit value in `[-1, 1]` from a [`PerturbationSource`]
//! and scales it by the configured magnitude, so a single firing moves the
//! velocity by at most `|velocity| * magnitude`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of unit draws in the closed interval `[-1, 1]`.
pub trait PerturbationSource {
    fn draw_unit(&mut self) -> f64;
}

/// Uniform draws from any `rand` generator.
#[derive(Debug, Clone)]
pub struct RngSource<R> {
    rng: R,
}

impl<R: Rng> RngSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngSource<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Reproducible sequence for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> PerturbationSource for RngSource<R> {
    fn draw_unit(&mut self) -> f64 {
        self.rng.gen_range(-1.0..=1.0)
    }
}

/// Always returns the same draw, clamped to `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedSource(f64);

impl FixedSource {
    pub fn new(draw: f64) -> Self {
        Self(draw.clamp(-1.0, 1.0))
    }

    pub fn zero() -> Self {
        Self(0.0)
    }
}

impl PerturbationSource for FixedSource {
    fn draw_unit(&mut self) -> f64 {
        self.0
    }
}

impl<S: PerturbationSource + ?Sized> PerturbationSource for Box<S> {
    fn draw_unit(&mut self) -> f64 {
        (**self).draw_unit()
    }
}

/// Jitter `velocity` by a fresh draw scaled to `magnitude`.
pub fn perturb<S: PerturbationSource + ?Sized>(velocity: f64, magnitude: f64, source: &mut S) -> f64 {
    let draw = source.draw_unit().clamp(-1.0, 1.0);
    let fraction = draw * magnitude;
    velocity + velocity * fraction
}
