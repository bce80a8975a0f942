//! # Joint actuator
//!
//! One [`JointActuator`] drives each hinge of the robot. It holds the commanded setpoints, the
//! friction and PID state and the sensor degradation state of the joint, and turns them into
//! motor commands on the physics backend once per step.
//!
//! A joint is in one of two control modes, the latest command wins:
//!
//! - Voltage control: the commanded voltage is turned into a torque by the motor model, and the
//!   hinge motor is used to model friction.
//! - Position control: the PID controller drives the hinge motor towards the position setpoint
//!   with a torque limited by the motor model at zero load.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::f64::consts::PI;
use log::{debug, trace, warn};
use thiserror::Error;
use util::maths::{clamp, clip};

use comms_if::tm::JointDescriptor;
pub use comms_if::tm::JointType;

use crate::params::SimExecParams;
use crate::physics::{JointId, PhysicsBackend};
use super::{
    bristle_friction, motor_model, rad_to_norm, sensor, stribeck_friction, vel_to_norm,
    ActuatorParameters, Derivative, NoiseGenerator, PidController, SensorQuality,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Largest allowed torque factor
const MAX_TORQUE_FACTOR: f64 = 10.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Settings shared by every joint of the robot.
#[derive(Debug, Clone)]
pub struct ActuatorConfig {
    pub pid_p: f64,
    pub pid_i: f64,
    pub pid_d: f64,
    pub pid_i_limit: f64,

    /// Normalised PID torque limit after construction and reset
    pub init_max_torque: f64,

    /// Units: seconds
    pub step_length_s: f64,

    /// Base seed of the joint noise generators, `0` for entropy
    pub noise_seed: u64,
}

/// Per joint construction values, as written in a robot model.
#[derive(Debug, Clone)]
pub struct JointConfig {
    /// Joint name, an empty name is replaced by `joint_<index>`.
    pub name: String,

    pub joint_type: JointType,

    /// Units: degrees
    pub stop_lo_deg: f64,

    /// Units: degrees
    pub stop_hi_deg: f64,

    /// Units: degrees
    pub default_deg: f64,

    /// Scales the motor torque, in `(0, 10]`
    pub torque_factor: f64,

    pub params: ActuatorParameters,
}

/// The actuator of a single joint.
#[derive(Debug, Clone)]
pub struct JointActuator {
    index: usize,
    hinge: JointId,
    name: String,
    joint_type: JointType,
    symmetric_index: usize,

    /// Normalised stops and default position
    stop_lo: f64,
    stop_hi: f64,
    position_default: f64,

    torque_factor: f64,
    params: ActuatorParameters,
    init_max_torque: f64,

    pid: PidController,
    mode: ControlMode,

    /// Normalised to `[0, 1]`
    pid_max_torque: f64,

    /// Units: radians
    pid_setpoint: f64,

    /// Motor torque for voltage control
    voltage_setpoint: f64,

    /// Bristle deflection
    z: f64,
    is_sticking: bool,

    dpdt: Derivative,
    noise: NoiseGenerator,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Voltage,
    Position,
}

#[derive(Debug, Error, PartialEq)]
pub enum JointBuildError {
    #[error("Torque factor of joint {0} must be in (0, 10] but is {1}")]
    InvalidTorqueFactor(usize, f64),

    #[error("Lower stop of joint {0} is greater than the upper stop ({1:.2} > {2:.2} degrees)")]
    InvertedStops(usize, f64, f64),

    #[error("Default position of joint {0} is outside of its stops")]
    DefaultOutOfStops(usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl From<&SimExecParams> for ActuatorConfig {
    fn from(p: &SimExecParams) -> Self {
        Self {
            pid_p: p.pid_p,
            pid_i: p.pid_i,
            pid_d: p.pid_d,
            pid_i_limit: p.pid_i_limit,
            init_max_torque: p.init_max_torque,
            step_length_s: p.step_length_s,
            noise_seed: p.noise_seed,
        }
    }
}

impl JointActuator {
    /// Create the actuator for the hinge `hinge`, which is the `index`th joint of the robot.
    ///
    /// Sets the hinge stops and the initial static friction on the backend.
    pub fn new(
        index: usize,
        hinge: JointId,
        config: JointConfig,
        settings: &ActuatorConfig,
        world: &mut dyn PhysicsBackend
    ) -> Result<Self, JointBuildError> {
        let name = if config.name.is_empty() {
            warn!("No name assigned to joint {}", index);
            format!("joint_{}", index)
        }
        else {
            config.name
        };

        debug!("Creating joint {} '{}'", index, name);

        let stop_lo_rad = config.stop_lo_deg.to_radians();
        let stop_hi_rad = config.stop_hi_deg.to_radians();
        let stop_lo = deg_to_norm(config.stop_lo_deg);
        let stop_hi = deg_to_norm(config.stop_hi_deg);
        let position_default = deg_to_norm(config.default_deg);

        if stop_lo > position_default || position_default > stop_hi {
            return Err(JointBuildError::DefaultOutOfStops(index))
        }

        if !(config.torque_factor > 0.0 && config.torque_factor <= MAX_TORQUE_FACTOR) {
            return Err(JointBuildError::InvalidTorqueFactor(index, config.torque_factor))
        }

        if stop_lo == -1.0 && stop_hi == 1.0 {
            debug!("Joint stops deactivated for joint {}", index);
            world.set_hinge_stops(hinge, None);
        }
        else if stop_lo < stop_hi {
            world.set_hinge_stops(hinge, Some((stop_lo_rad, stop_hi_rad)));
        }
        else {
            return Err(JointBuildError::InvertedStops(
                index,
                config.stop_lo_deg,
                config.stop_hi_deg
            ))
        }

        let noise_seed = match settings.noise_seed {
            0 => 0,
            s => s.wrapping_add(index as u64).max(1)
        };

        let mut joint = Self {
            index,
            hinge,
            name,
            joint_type: config.joint_type,
            symmetric_index: index,
            stop_lo,
            stop_hi,
            position_default,
            torque_factor: config.torque_factor,
            params: config.params,
            init_max_torque: settings.init_max_torque,
            pid: PidController::new(
                settings.pid_p,
                settings.pid_i,
                settings.pid_d,
                settings.pid_i_limit
            ),
            mode: ControlMode::Voltage,
            pid_max_torque: clamp(settings.init_max_torque, 0.0, 1.0),
            pid_setpoint: position_default * PI,
            voltage_setpoint: 0.0,
            z: 0.0,
            is_sticking: false,
            dpdt: Derivative::new(settings.step_length_s),
            noise: NoiseGenerator::new(noise_seed),
        };

        joint.apply_friction(world, 0.0);

        let position = joint.low_resolution_position(world, SensorQuality::Good);
        joint.dpdt.reset(position);

        Ok(joint)
    }

    // ---- ACCESSORS ----

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn hinge(&self) -> JointId {
        self.hinge
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joint_type(&self) -> JointType {
        self.joint_type
    }

    pub fn symmetric_index(&self) -> usize {
        self.symmetric_index
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Torque applied in voltage control mode
    pub fn voltage_setpoint(&self) -> f64 {
        self.voltage_setpoint
    }

    /// Units: radians
    pub fn pid_setpoint(&self) -> f64 {
        self.pid_setpoint
    }

    pub fn pid_max_torque(&self) -> f64 {
        self.pid_max_torque
    }

    pub fn bristle_deflection(&self) -> f64 {
        self.z
    }

    pub fn is_sticking(&self) -> bool {
        self.is_sticking
    }

    pub fn params(&self) -> &ActuatorParameters {
        &self.params
    }

    /// Link this joint to its mirror partner.
    pub fn set_symmetric_partner(&mut self, partner: usize, joint_type: JointType) {
        self.symmetric_index = partner;
        self.joint_type = joint_type;
    }

    /// The configuration line describing this joint.
    pub fn descriptor(&self) -> JointDescriptor {
        JointDescriptor {
            index: self.index,
            joint_type: self.joint_type,
            symmetric_index: self.symmetric_index,
            stop_lo: self.stop_lo,
            stop_hi: self.stop_hi,
            default_position: self.position_default,
            name: self.name.clone(),
        }
    }

    // ---- SENSORS ----

    /// Exact normalised position.
    pub fn position_norm(&self, world: &dyn PhysicsBackend) -> f64 {
        rad_to_norm(world.hinge_angle(self.hinge))
    }

    /// Exact normalised velocity.
    pub fn velocity_norm(&self, world: &dyn PhysicsBackend) -> f64 {
        vel_to_norm(world.hinge_rate(self.hinge))
    }

    /// Position as reported by the joint's sensor.
    pub fn low_resolution_position(
        &mut self,
        world: &dyn PhysicsBackend,
        quality: SensorQuality
    ) -> f64 {
        let position = self.position_norm(world);
        sensor::degrade(position, quality, &mut self.noise)
    }

    /// Velocity as reported by the joint's sensor.
    ///
    /// With good sensors this is the finite difference of the reported positions, with poor
    /// sensors the direct velocity goes through the ADC. The differentiator is fed in both
    /// cases so that switching quality doesn't cause a jump.
    pub fn low_resolution_velocity(
        &mut self,
        world: &dyn PhysicsBackend,
        quality: SensorQuality
    ) -> f64 {
        let position = self.low_resolution_position(world, quality);
        let derived = self.dpdt.derive(position);

        match quality {
            SensorQuality::Good => derived,
            SensorQuality::Poor => {
                let velocity = self.velocity_norm(world);
                sensor::avr_10bit_adc(velocity, &mut self.noise)
            }
        }
    }

    // ---- SETPOINTS ----

    /// Switch to voltage control with the normalised voltage `value`.
    pub fn set_voltage(&mut self, world: &dyn PhysicsBackend, value: f64) {
        self.mode = ControlMode::Voltage;
        self.voltage_setpoint = motor_model(
            clip(value, 1.0),
            self.velocity_norm(world),
            self.torque_factor,
            &self.params
        );
    }

    /// Switch to position control with the normalised position `value`.
    pub fn set_position(&mut self, value: f64) {
        self.mode = ControlMode::Position;
        self.pid_setpoint = clip(value, 1.0) * PI;
    }

    /// Set the normalised torque limit used in position control.
    pub fn set_max_torque(&mut self, value: f64) {
        self.pid_max_torque = clamp(value, 0.0, 1.0);
    }

    /// Replace the actuator parameters.
    pub fn reinit_params(&mut self, params: ActuatorParameters) {
        self.params = params;
    }

    // ---- CONTROL ----

    /// Apply the current setpoints to the hinge motor for the next step.
    pub fn apply_control(&mut self, world: &mut dyn PhysicsBackend) {
        match self.mode {
            ControlMode::Position => {
                let fmax = motor_model(self.pid_max_torque, 0.0, self.torque_factor, &self.params);
                world.set_motor_fmax(self.hinge, fmax);

                let velocity = self.pid.set_position(self.pid_setpoint, world.motor_angle(self.hinge));
                world.set_motor_velocity(self.hinge, velocity);
            },
            ControlMode::Voltage => {
                let velocity = self.velocity_norm(world);
                self.apply_friction(world, velocity);
                world.add_motor_torque(self.hinge, self.voltage_setpoint);
            }
        }
    }

    /// Return the joint to its initial control state.
    pub fn reset(&mut self, world: &mut dyn PhysicsBackend) {
        self.pid.reset();
        world.set_motor_velocity(self.hinge, 0.0);
        self.mode = ControlMode::Voltage;
        self.voltage_setpoint = 0.0;
        self.pid_setpoint = self.position_default * PI;
        self.pid_max_torque = clamp(self.init_max_torque, 0.0, 1.0);
        self.z = 0.0;

        let position = self.low_resolution_position(world, SensorQuality::Good);
        self.dpdt.reset(position);
    }

    /// Drive the hinge motor with the friction model at the normalised velocity.
    fn apply_friction(&mut self, world: &mut dyn PhysicsBackend, velocity: f64) {
        let restore = bristle_friction(&mut self.z, velocity, &self.params);
        let stribeck = stribeck_friction(velocity, &self.params);
        self.is_sticking = stribeck.is_sticking;

        trace!(
            "Joint {} friction: v = {:+.4}, z = {:+.5}, fmax = {:.4}",
            self.index, velocity, self.z, stribeck.friction
        );

        world.set_motor_velocity(self.hinge, restore);
        world.set_motor_fmax(self.hinge, stribeck.friction);
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Same as normalising the angle in radians, but exact for whole fractions of a half turn.
fn deg_to_norm(deg: f64) -> f64 {
    clip(deg / 180.0, 1.0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::physics::{BodyDesc, HingeDesc, SimpleWorld};
    use nalgebra::Vector3;

    const DT: f64 = 0.01;

    fn settings() -> ActuatorConfig {
        ActuatorConfig::from(&SimExecParams {
            noise_seed: 3,
            ..Default::default()
        })
    }

    fn joint_config(lo: f64, hi: f64, default: f64) -> JointConfig {
        JointConfig {
            name: "joint0".into(),
            joint_type: JointType::Normal,
            stop_lo_deg: lo,
            stop_hi_deg: hi,
            default_deg: default,
            torque_factor: 5.0,
            params: ActuatorParameters::SENSORIMOTOR,
        }
    }

    /// A lever hanging from a static base on a hinge about y.
    fn world() -> (SimpleWorld, JointId) {
        let mut world = SimpleWorld::new(false);
        let base = world.create_body(&BodyDesc {
            name: "base".into(),
            position: Vector3::new(0.0, 0.0, 1.0),
            size: Vector3::new(0.5, 0.5, 0.5),
            mass_kg: 0.0,
            density: 1500.0,
            is_static: true,
        });
        let lever = world.create_body(&BodyDesc {
            name: "lever".into(),
            position: Vector3::new(0.0, -0.3, 0.6),
            size: Vector3::new(0.02, 0.015, 0.52),
            mass_kg: 0.133,
            density: 0.0,
            is_static: false,
        });
        let hinge = world.create_hinge(&HingeDesc {
            body1: base,
            body2: lever,
            anchor_offset: Vector3::new(0.0, 0.0, 0.23),
            axis: Vector3::y(),
        });
        (world, hinge)
    }

    fn joint(world: &mut SimpleWorld, hinge: JointId) -> JointActuator {
        JointActuator::new(0, hinge, joint_config(-180.0, 180.0, 0.0), &settings(), world).unwrap()
    }

    #[test]
    fn test_construction_checks() {
        let (mut world, hinge) = world();

        let err = JointActuator::new(0, hinge, joint_config(90.0, -90.0, 0.0), &settings(), &mut world);
        assert_eq!(err.unwrap_err(), JointBuildError::DefaultOutOfStops(0));

        let err = JointActuator::new(1, hinge, joint_config(30.0, 30.0, 30.0), &settings(), &mut world);
        assert_eq!(err.unwrap_err(), JointBuildError::InvertedStops(1, 30.0, 30.0));

        let err = JointActuator::new(0, hinge, joint_config(-90.0, 90.0, 100.0), &settings(), &mut world);
        assert_eq!(err.unwrap_err(), JointBuildError::DefaultOutOfStops(0));

        let mut cfg = joint_config(-90.0, 90.0, 0.0);
        cfg.torque_factor = 0.0;
        let err = JointActuator::new(0, hinge, cfg, &settings(), &mut world);
        assert_eq!(err.unwrap_err(), JointBuildError::InvalidTorqueFactor(0, 0.0));

        let mut cfg = joint_config(-90.0, 90.0, 45.0);
        cfg.name = String::new();
        let joint = JointActuator::new(4, hinge, cfg, &settings(), &mut world).unwrap();
        assert_eq!(joint.name(), "joint_4");

        let d = joint.descriptor();
        assert_eq!(d.index, 4);
        assert_eq!(d.symmetric_index, 4);
        assert_eq!(d.stop_lo, -0.5);
        assert_eq!(d.stop_hi, 0.5);
        assert!((d.default_position - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_setpoints_are_clipped() {
        let (mut world, hinge) = world();
        let mut joint = joint(&mut world, hinge);
        assert_eq!(joint.mode(), ControlMode::Voltage);

        joint.set_position(2.0);
        assert_eq!(joint.mode(), ControlMode::Position);
        assert_eq!(joint.pid_setpoint(), PI);

        joint.set_position(0.5);
        assert_eq!(joint.pid_setpoint(), 0.5 * PI);

        joint.set_max_torque(1.5);
        assert_eq!(joint.pid_max_torque(), 1.0);
        joint.set_max_torque(-0.5);
        assert_eq!(joint.pid_max_torque(), 0.0);

        let params = ActuatorParameters::SENSORIMOTOR;
        joint.set_voltage(&world, 3.0);
        assert_eq!(joint.mode(), ControlMode::Voltage);
        assert_eq!(joint.voltage_setpoint(), motor_model(1.0, 0.0, 5.0, &params));

        joint.set_voltage(&world, -1.0);
        assert_eq!(joint.voltage_setpoint(), motor_model(-1.0, 0.0, 5.0, &params));
    }

    #[test]
    fn test_position_control_reaches_setpoint() {
        let (mut world, hinge) = world();
        let mut joint = joint(&mut world, hinge);

        joint.set_max_torque(1.0);
        joint.set_position(0.25);

        for _ in 0..500 {
            joint.apply_control(&mut world);
            world.step(DT);
        }

        assert!((joint.position_norm(&world) - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_friction_holds_joint_at_rest() {
        let (mut world, hinge) = world();
        let mut joint = joint(&mut world, hinge);

        for _ in 0..100 {
            joint.apply_control(&mut world);
            world.step(DT);
            assert!(joint.bristle_deflection().abs() <= joint.params().bristle_displ_max);
        }

        assert!(joint.position_norm(&world).abs() < 1e-6);
        assert!(joint.is_sticking());
    }

    #[test]
    fn test_voltage_drives_joint() {
        let (mut world, hinge) = world();
        let mut joint = joint(&mut world, hinge);

        for _ in 0..20 {
            joint.set_voltage(&world, 1.0);
            joint.apply_control(&mut world);
            world.step(DT);
        }

        assert!(joint.velocity_norm(&world) > 0.0);
        assert!(joint.position_norm(&world) > 0.0);
    }

    #[test]
    fn test_reset() {
        let (mut world, hinge) = world();
        let mut joint = joint(&mut world, hinge);

        joint.set_position(0.5);
        joint.set_max_torque(1.0);
        for _ in 0..10 {
            joint.apply_control(&mut world);
            world.step(DT);
        }

        joint.reset(&mut world);
        assert_eq!(joint.mode(), ControlMode::Voltage);
        assert_eq!(joint.voltage_setpoint(), 0.0);
        assert_eq!(joint.pid_setpoint(), 0.0);
        assert_eq!(joint.pid_max_torque(), 0.5);
        assert_eq!(joint.bristle_deflection(), 0.0);

        // The differentiator restarts at the present position
        let v = joint.low_resolution_velocity(&world, SensorQuality::Good);
        assert!(v.abs() <= 130.0 / 32768.0 * 0.25 / DT + 1e-9);
    }

    #[test]
    fn test_sensor_readings() {
        let (mut world, hinge) = world();
        let mut joint = joint(&mut world, hinge);

        let good = joint.low_resolution_position(&world, SensorQuality::Good);
        assert_eq!((good * 32768.0).fract(), 0.0);
        assert!(good.abs() <= 65.0 / 32768.0);

        let poor = joint.low_resolution_position(&world, SensorQuality::Poor);
        assert_eq!((poor * 512.0).fract(), 0.0);

        let poor_vel = joint.low_resolution_velocity(&world, SensorQuality::Poor);
        assert_eq!((poor_vel * 512.0).fract(), 0.0);
    }
}
