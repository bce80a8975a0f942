//! # Sensor degradation
//!
//! Readings reported to the client are not the exact physics state. They go through one of two
//! pipelines which add clamped Gaussian noise and then quantise the value:
//!
//! - [`low_resolution_sensor`]: a 16 bit sensor with small noise
//! - [`avr_10bit_adc`]: a 10 bit ADC with larger noise
//!
//! Both map a normalised value in `[-1, 1]` onto a signed integer range and back, truncating
//! towards zero.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::StandardNormal;
use util::maths::{clamp, clip};

pub use comms_if::cmd::SensorQuality;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Full scale of the 16 bit sensor
const RES_16BIT: f64 = 32768.0;

/// Full scale of the 10 bit ADC
const RES_10BIT: f64 = 512.0;

/// Scaling applied to the finite difference of positions
const DERIVATIVE_SCALE: f64 = 0.25;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gaussian noise source with optional deterministic seeding.
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    rng: SmallRng,
}

/// Backward finite difference of a sampled signal.
#[derive(Debug, Clone)]
pub struct Derivative {
    inv_dt: f64,
    last: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NoiseGenerator {
    /// Create a new noise generator.
    ///
    /// A seed of `0` seeds from entropy, anything else gives a reproducible sequence.
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        }
        else {
            SmallRng::seed_from_u64(seed)
        };

        Self { rng }
    }

    /// Zero mean Gaussian noise with the given standard deviation.
    pub fn gaussian(&mut self, stddev: f64) -> f64 {
        if stddev == 0.0 {
            return 0.0
        }
        let n: f64 = self.rng.sample(StandardNormal);
        n * stddev
    }
}

impl Derivative {
    /// Create a differentiator for samples taken every `step_length_s` seconds.
    pub fn new(step_length_s: f64) -> Self {
        Self {
            inv_dt: DERIVATIVE_SCALE / step_length_s,
            last: 0.0,
        }
    }

    /// Feed the current sample and get the derivative since the previous one.
    pub fn derive(&mut self, current: f64) -> f64 {
        let velocity = (current - self.last) * self.inv_dt;
        self.last = current;
        velocity
    }

    /// Restart the differentiator at the given sample.
    pub fn reset(&mut self, current: f64) {
        self.last = current;
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Pass a normalised value through the 16 bit sensor.
pub fn low_resolution_sensor(value: f64, noise: &mut NoiseGenerator) -> f64 {
    let n = clip(noise.gaussian(16.0 / RES_16BIT), 64.0 / RES_16BIT);
    quantise(value + n, RES_16BIT)
}

/// Pass a normalised value through the 10 bit ADC.
pub fn avr_10bit_adc(value: f64, noise: &mut NoiseGenerator) -> f64 {
    let n = clip(noise.gaussian(1.0 / 4096.0), 4.0 / 4096.0);
    quantise(value + n, RES_10BIT)
}

/// Pass a value through the pipeline for the given quality.
pub fn degrade(value: f64, quality: SensorQuality, noise: &mut NoiseGenerator) -> f64 {
    match quality {
        SensorQuality::Good => low_resolution_sensor(value, noise),
        SensorQuality::Poor => avr_10bit_adc(value, noise),
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn quantise(value: f64, full_scale: f64) -> f64 {
    let v = clamp(value, -1.0, (full_scale - 1.0) / full_scale);
    ((v * full_scale) as i16) as f64 / full_scale
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_deterministic_seed() {
        let mut a = NoiseGenerator::new(42);
        let mut b = NoiseGenerator::new(42);

        for _ in 0..100 {
            assert_eq!(a.gaussian(1.0), b.gaussian(1.0));
        }
        assert_eq!(a.gaussian(0.0), 0.0);
    }

    #[test]
    fn test_16bit_quantisation() {
        let mut noise = NoiseGenerator::new(7);

        for i in 0..1000 {
            let v = -1.0 + (i as f64) * 0.002;
            let r = low_resolution_sensor(v, &mut noise);

            // On the grid
            assert_eq!((r * RES_16BIT).fract(), 0.0);
            assert!(r >= -1.0 && r <= 32767.0 / RES_16BIT);

            // Noise plus one quantisation step
            assert!((r - v).abs() <= 65.0 / RES_16BIT + 1e-12, "{} -> {}", v, r);
        }

        // Saturation
        assert_eq!(low_resolution_sensor(5.0, &mut noise), 32767.0 / RES_16BIT);
        assert_eq!(low_resolution_sensor(-5.0, &mut noise), -1.0);
    }

    #[test]
    fn test_10bit_quantisation() {
        let mut noise = NoiseGenerator::new(7);

        for i in 0..1000 {
            let v = -1.0 + (i as f64) * 0.002;
            let r = avr_10bit_adc(v, &mut noise);

            assert_eq!((r * RES_10BIT).fract(), 0.0);
            assert!(r >= -1.0 && r <= 511.0 / RES_10BIT);
            assert!((r - v).abs() <= 1.0 / RES_10BIT + 4.0 / 4096.0 + 1e-12);
        }

        assert_eq!(avr_10bit_adc(2.0, &mut noise), 511.0 / RES_10BIT);
        assert_eq!(avr_10bit_adc(-2.0, &mut noise), -1.0);
    }

    #[test]
    fn test_truncates_towards_zero() {
        assert_eq!(quantise(1.9 / RES_10BIT, RES_10BIT), 1.0 / RES_10BIT);
        assert_eq!(quantise(-1.9 / RES_10BIT, RES_10BIT), -1.0 / RES_10BIT);
        assert_eq!(quantise(0.0, RES_16BIT), 0.0);
    }

    #[test]
    fn test_derivative() {
        let mut d = Derivative::new(0.01);
        d.reset(0.5);

        assert!((d.derive(0.51) - 0.25).abs() < 1e-9);
        assert_eq!(d.derive(0.51), 0.0);

        d.reset(0.0);
        assert!((d.derive(-0.02) + 0.5).abs() < 1e-9);
    }
}
