//! # Acceleration sensor
//!
//! A three axis accelerometer attached to a body. The acceleration is the finite difference of
//! the body's linear velocity over one step, with gravity removed, projected onto three body
//! fixed axes. Readings are normalised to a range of 8 g and go through the 16 bit sensor.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use util::maths::clip;

use crate::actuator::{low_resolution_sensor, NoiseGenerator};
use crate::physics::{BodyId, PhysicsBackend, GRAVITY_MS2};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Measurement range of the sensor in multiples of g
const RANGE_G: f64 = 8.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AccelSensor {
    body: BodyId,

    /// Units: seconds
    dt: f64,

    /// Sensor axes in the body frame, `[left, forward, up]`
    axes: [Vector3<f64>; 3],

    /// Units: meters/second^2, Frame: world
    acceleration: Vector3<f64>,

    /// Units: meters/second, Frame: world
    last_velocity: Vector3<f64>,

    noise: NoiseGenerator,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AccelSensor {
    /// Attach a sensor to `body` which is sampled every `dt` seconds.
    pub fn new(body: BodyId, dt: f64, noise_seed: u64, world: &dyn PhysicsBackend) -> Self {
        Self {
            body,
            dt,
            axes: [
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, -1.0, 0.0),
                Vector3::new(0.0, 0.0, 1.0),
            ],
            acceleration: Vector3::zeros(),
            last_velocity: world.body_state(body).linear_velocity,
            noise: NoiseGenerator::new(noise_seed),
        }
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    /// Sample the sensor, returning the normalised `[left, forward, up]` reading.
    ///
    /// Must be called once per step, the acceleration is taken from the velocity change since the
    /// previous call.
    pub fn update(&mut self, world: &dyn PhysicsBackend) -> [f64; 3] {
        let state = world.body_state(self.body);

        self.acceleration = (state.linear_velocity - self.last_velocity) / self.dt;
        self.last_velocity = state.linear_velocity;

        // A body at rest measures 1 g upwards
        self.acceleration -= Vector3::new(0.0, 0.0, -GRAVITY_MS2);

        let mut reading = [0f64; 3];
        for (r, axis) in reading.iter_mut().zip(self.axes.iter()) {
            let projected = self.acceleration.dot(&(state.rotation * axis));
            let norm = clip(projected / (GRAVITY_MS2 * RANGE_G), 1.0);
            *r = low_resolution_sensor(norm, &mut self.noise);
        }

        reading
    }

    /// Restart differentiation at the body's present velocity.
    pub fn reset(&mut self, world: &dyn PhysicsBackend) {
        self.last_velocity = world.body_state(self.body).linear_velocity;
        self.acceleration = Vector3::zeros();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::physics::{BodyDesc, SimpleWorld};

    fn resting_body() -> (SimpleWorld, BodyId) {
        let mut world = SimpleWorld::new(true);
        let body = world.create_body(&BodyDesc {
            name: "box".into(),
            position: Vector3::new(0.0, 0.0, 0.05),
            size: Vector3::new(0.1, 0.1, 0.1),
            mass_kg: 1.0,
            density: 0.0,
            is_static: false,
        });
        (world, body)
    }

    #[test]
    fn test_at_rest_measures_gravity() {
        let (mut world, body) = resting_body();
        let mut accel = AccelSensor::new(body, 0.01, 11, &world);

        world.step(0.01);
        let r = accel.update(&world);

        let tol = 66.0 / 32768.0;
        assert!(r[0].abs() < tol);
        assert!(r[1].abs() < tol);
        assert!((r[2] - 1.0 / RANGE_G).abs() < tol, "{:?}", r);
    }

    #[test]
    fn test_free_fall_and_reset() {
        let (mut world, body) = resting_body();
        let mut state = world.body_state(body);
        state.position.z = 100.0;
        world.set_body_state(body, &state);

        let mut accel = AccelSensor::new(body, 0.01, 11, &world);
        world.step(0.01);

        // Falling freely the sensor measures nothing
        let r = accel.update(&world);
        assert!(r.iter().all(|v| v.abs() < 66.0 / 32768.0), "{:?}", r);

        // Big velocity jump saturates
        state.linear_velocity = Vector3::new(100.0, 0.0, 0.0);
        world.set_body_state(body, &state);
        let r = accel.update(&world);
        assert!(r[0] >= 1.0 - 66.0 / 32768.0);

        // After a reset the jump is forgotten
        world.set_body_state(body, &state);
        accel.reset(&world);
        assert_eq!(accel.acceleration, Vector3::zeros());
    }
}
