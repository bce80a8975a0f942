//! # Simulation Executable Parameters
//!
//! This module provide parameters for the simulation executable. They are loaded once at
//! startup from `params/sim_exec.toml` and passed by reference to everything that needs them.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExecParams {

    // ---- NETWORK ----

    /// Port the server listens for the client on
    pub tcp_port: u16,

    // ---- WORLD ----

    /// Index of the robot model to build at startup
    pub robot: i32,

    /// Index of the scene to build around the robot
    pub scene: u32,

    /// Whether gravity is enabled when the world is created
    pub initial_gravity: bool,

    // ---- SCHEDULING ----

    /// Length of one physics step.
    ///
    /// Units: seconds
    pub step_length_s: f64,

    /// Pace the simulation to wall clock time
    pub real_time: bool,

    /// Target number of frames per second when frame rate control is on.
    pub fps: f64,

    /// Run as many steps as fit into one frame interval before returning to the caller
    pub use_fps_control: bool,

    // ---- ACTUATORS ----

    /// Initial PID torque limit of every joint, normalised to `[0, 1]`
    pub init_max_torque: f64,

    /// PID proportional gain
    pub pid_p: f64,

    /// PID integral gain
    pub pid_i: f64,

    /// PID derivative gain
    pub pid_d: f64,

    /// Symmetric bound on the PID integrator state
    pub pid_i_limit: f64,

    /// Seed for the sensor noise generators, `0` seeds from entropy
    pub noise_seed: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ExecParamsError {
    #[error("The step length must be positive, got {0} s")]
    InvalidStepLength(f64),

    #[error("The frame rate must be positive when frame rate control is on, got {0} fps")]
    InvalidFps(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimExecParams {
    /// Check the scheduling parameters, everything downstream divides by them.
    pub fn validate(&self) -> Result<(), ExecParamsError> {
        if !(self.step_length_s.is_finite() && self.step_length_s > 0.0) {
            return Err(ExecParamsError::InvalidStepLength(self.step_length_s))
        }

        if self.fps.is_nan() || (self.use_fps_control && self.fps <= 0.0) {
            return Err(ExecParamsError::InvalidFps(self.fps))
        }

        Ok(())
    }
}

impl Default for SimExecParams {
    fn default() -> Self {
        Self {
            tcp_port: 8000,
            robot: 90,
            scene: 0,
            initial_gravity: true,
            step_length_s: 0.01,
            real_time: true,
            fps: 25.0,
            use_fps_control: true,
            init_max_torque: 0.5,
            pid_p: 3.5,
            pid_i: 0.0,
            pid_d: 0.1,
            pid_i_limit: 0.5,
            noise_seed: 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_params_file_matches_defaults() {
        let p: SimExecParams = util::params::from_toml_str(
            include_str!("../../params/sim_exec.toml")
        ).unwrap();
        let d = SimExecParams::default();

        assert_eq!(p.tcp_port, d.tcp_port);
        assert_eq!(p.robot, d.robot);
        assert_eq!(p.step_length_s, d.step_length_s);
        assert_eq!(p.pid_p, d.pid_p);
        assert_eq!(p.pid_i_limit, d.pid_i_limit);
        assert_eq!(p.init_max_torque, d.init_max_torque);
        assert_eq!(p.validate(), Ok(()));
    }

    #[test]
    fn test_validate() {
        let zero_step = SimExecParams { step_length_s: 0.0, ..Default::default() };
        assert_eq!(zero_step.validate(), Err(ExecParamsError::InvalidStepLength(0.0)));

        let negative_step = SimExecParams { step_length_s: -0.01, ..Default::default() };
        assert!(negative_step.validate().is_err());

        let zero_fps = SimExecParams { fps: 0.0, ..Default::default() };
        assert_eq!(zero_fps.validate(), Err(ExecParamsError::InvalidFps(0.0)));

        // Without frame rate control the frame rate is unused
        let no_fps = SimExecParams { fps: 0.0, use_fps_control: false, ..Default::default() };
        assert_eq!(no_fps.validate(), Ok(()));
    }
}
