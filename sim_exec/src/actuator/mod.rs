//! # Actuator model
//!
//! Everything between a normalised command from the client and the torques applied to a hinge in
//! the physics backend: friction, the DC motor model, the position PID loop and the degraded
//! sensor readings reported back to the client.
//!
//! All client facing quantities are normalised. Angles are divided by pi and velocities by
//! [`MAX_JOINT_VEL_RADS`], both then clipped to `[-1, 1]`.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod friction;
mod joint;
mod motor;
mod params;
mod pid;
mod sensor;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use friction::{bristle_friction, stribeck_friction, StribeckResult};
pub use joint::{
    ActuatorConfig, ControlMode, JointActuator, JointBuildError, JointConfig, JointType
};
pub use motor::motor_model;
pub use params::{ActuatorParameters, ParamsError, NUM_ACTUATOR_PARAMS};
pub use pid::PidController;
pub use sensor::{
    avr_10bit_adc, degrade, low_resolution_sensor, Derivative, NoiseGenerator, SensorQuality
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::f64::consts::PI;
use util::maths::clip;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Joint speed which maps to a normalised velocity of one.
///
/// Units: radians/second
pub const MAX_JOINT_VEL_RADS: f64 = 4.0 * PI;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Normalise an angle in radians into `[-1, 1]`.
pub fn rad_to_norm(angle_rad: f64) -> f64 {
    clip(angle_rad / PI, 1.0)
}

/// Normalise an angular velocity in radians/second into `[-1, 1]`.
pub fn vel_to_norm(vel_rads: f64) -> f64 {
    clip(vel_rads / MAX_JOINT_VEL_RADS, 1.0)
}
