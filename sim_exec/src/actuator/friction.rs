//! # Joint friction models
//!
//! Two models are combined on every joint in voltage control mode. The bristle model gives the
//! velocity the hinge motor is driven towards, so that a joint at rest sticks elastically. The
//! Stribeck curve gives the torque the motor may use to get there.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use util::maths::clip;

use super::ActuatorParameters;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Value of the Stribeck range term above which the joint is considered to be sticking.
const STICKING_THRESHOLD: f64 = 0.1;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StribeckResult {
    /// Magnitude of the friction
    pub friction: f64,

    /// Only for display, has no influence on the dynamics.
    pub is_sticking: bool,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Advance the bristle deflection `z` by one step at the normalised velocity and return the
/// restoring velocity.
///
/// `z` stays within `[-bristle_displ_max, bristle_displ_max]`.
pub fn bristle_friction(z: &mut f64, velocity: f64, params: &ActuatorParameters) -> f64 {
    *z = clip(*z - velocity, params.bristle_displ_max);
    *z * params.bristle_stiffness
}

/// Magnitude of the friction at the normalised velocity.
pub fn stribeck_friction(velocity: f64, params: &ActuatorParameters) -> StribeckResult {
    let ratio = velocity / params.stiction_range;
    let range = (-(ratio * ratio)).exp();

    let friction = params.coulomb_friction
        + (params.sticking_friction - params.coulomb_friction) * range
        + velocity.abs() * params.fluid_friction;

    StribeckResult {
        friction,
        is_sticking: range > STICKING_THRESHOLD,
    }
}
