//! # Joint position controller
//!
//! This module provides the PID controller which turns a joint position setpoint into a target
//! velocity for the hinge motor.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use util::maths::{clamp, wrap_pi};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller acting once per physics step.
#[derive(Debug, Clone)]
pub struct PidController {
    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Derivative gain
    k_d: f64,

    /// Symmetric bound on the integral accumulation
    i_limit: f64,

    /// Error at the previous step
    prev_error: f64,

    /// The integral accumulation
    integral: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {

    /// Create a new controller with the given gains.
    pub fn new(k_p: f64, k_i: f64, k_d: f64, i_limit: f64) -> Self {
        Self {
            k_p, k_i, k_d,
            i_limit: i_limit.abs(),
            prev_error: 0f64,
            integral: 0f64,
        }
    }

    /// Get the target velocity to move from `angle` to `setpoint`, both in radians.
    ///
    /// The setpoint is wrapped into `(-pi, pi]` first. The derivative term acts on the change of
    /// the error between steps.
    pub fn set_position(&mut self, setpoint: f64, angle: f64) -> f64 {
        let error = wrap_pi(setpoint) - angle;

        self.integral = clamp(self.integral + error, -self.i_limit, self.i_limit);

        let out =
            self.k_p * error
            + self.k_i * self.integral
            - self.k_d * (error - self.prev_error);

        self.prev_error = error;

        out
    }

    /// Clear the integral and the previous error.
    pub fn reset(&mut self) {
        self.prev_error = 0f64;
        self.integral = 0f64;
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }
}
