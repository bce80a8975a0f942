//! # DC motor model

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use util::maths::{clip, sgn};

use super::ActuatorParameters;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Gearbox scaling from motor torque to joint torque.
const TORQUE_SCALE: f64 = 0.2;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Torque produced by the motor for a normalised voltage `u` at the normalised joint speed.
///
/// Back EMF only acts while the joint turns in the direction it is driven, a joint driven
/// against its motion is treated as stationary.
pub fn motor_model(
    u: f64,
    joint_speed: f64,
    torque_factor: f64,
    params: &ActuatorParameters
) -> f64 {
    let voltage = params.v_in * u;

    let speed = if sgn(voltage) != sgn(joint_speed) {
        0.0
    }
    else {
        joint_speed
    };

    let current = clip(voltage - params.k_b * speed, params.v_in) * params.r_i_inv;

    params.k_m * current * TORQUE_SCALE * torque_factor
}
