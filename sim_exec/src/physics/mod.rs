//! # Physics backend interface
//!
//! The simulation does not do rigid body dynamics itself. Everything it needs from a physics
//! engine goes through the [`PhysicsBackend`] trait: creating and destroying bodies and hinges,
//! reading and writing body states, and driving the hinge motors.
//!
//! Bodies and joints are referred to by [`BodyId`] and [`JointId`] handles issued by the backend.
//! Passing a handle which the backend did not issue, or one which has been destroyed, is a
//! programming error.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod simple;

pub use simple::SimpleWorld;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Gravitational acceleration.
///
/// Units: meters/second^2
pub const GRAVITY_MS2: f64 = 9.81;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle to a body in the physics backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId(pub usize);

/// Handle to a hinge joint (and its motor) in the physics backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointId(pub usize);

/// Full kinematic state of a body.
///
/// The rotation matrix and the quaternion describe the same orientation, both are kept so that a
/// restored state is bit for bit the captured one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    /// Units: meters, Frame: world
    pub position: Vector3<f64>,

    pub rotation: Matrix3<f64>,

    pub quaternion: UnitQuaternion<f64>,

    /// Units: meters/second, Frame: world
    pub linear_velocity: Vector3<f64>,

    /// Units: radians/second, Frame: world
    pub angular_velocity: Vector3<f64>,
}

/// Description of a box shaped body to create.
#[derive(Debug, Clone)]
pub struct BodyDesc {
    pub name: String,

    /// Centre of the box.
    ///
    /// Units: meters, Frame: world
    pub position: Vector3<f64>,

    /// Full edge lengths of the box.
    ///
    /// Units: meters
    pub size: Vector3<f64>,

    /// Mass of the body. If zero the mass is calculated from the density.
    ///
    /// Units: kilograms
    pub mass_kg: f64,

    /// Units: kilograms/meter^3
    pub density: f64,

    /// Static bodies are part of the environment and are never moved by the simulation.
    pub is_static: bool,
}

/// Description of a hinge joint to create between two bodies.
#[derive(Debug, Clone)]
pub struct HingeDesc {
    /// The parent body
    pub body1: BodyId,

    /// The child body
    pub body2: BodyId,

    /// Position of the hinge anchor relative to the centre of `body2`.
    ///
    /// Units: meters, Frame: world
    pub anchor_offset: Vector3<f64>,

    /// Unit hinge axis.
    ///
    /// Frame: world
    pub axis: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Interface to a rigid body physics engine.
pub trait PhysicsBackend {
    /// Advance the world by `dt` seconds.
    fn step(&mut self, dt: f64);

    fn set_gravity(&mut self, enabled: bool);

    fn gravity_enabled(&self) -> bool;

    fn create_body(&mut self, desc: &BodyDesc) -> BodyId;

    fn destroy_body(&mut self, id: BodyId);

    fn body_state(&self, id: BodyId) -> BodyState;

    /// Overwrite the full kinematic state of a body.
    fn set_body_state(&mut self, id: BodyId, state: &BodyState);

    /// Mass of the body.
    ///
    /// Units: kilograms
    fn body_mass(&self, id: BodyId) -> f64;

    /// Apply a force to the body's centre of mass for the next step.
    ///
    /// Units: newtons, Frame: world
    fn add_force(&mut self, id: BodyId, force: Vector3<f64>);

    fn is_fixed(&self, id: BodyId) -> bool;

    /// Attach or release the body from the world.
    fn set_fixed(&mut self, id: BodyId, fixed: bool);

    fn create_hinge(&mut self, desc: &HingeDesc) -> JointId;

    fn destroy_hinge(&mut self, id: JointId);

    /// Set the angle stops of the hinge. Passing `None` removes them.
    ///
    /// Units: radians
    fn set_hinge_stops(&mut self, id: JointId, stops: Option<(f64, f64)>);

    /// Hinge angle in `(-pi, pi]`.
    ///
    /// Units: radians
    fn hinge_angle(&self, id: JointId) -> f64;

    /// Units: radians/second
    fn hinge_rate(&self, id: JointId) -> f64;

    /// Angle reported by the hinge's motor.
    ///
    /// Units: radians
    fn motor_angle(&self, id: JointId) -> f64;

    /// Target velocity of the hinge motor.
    ///
    /// Units: radians/second
    fn set_motor_velocity(&mut self, id: JointId, velocity: f64);

    /// Maximum torque the motor may use to reach its target velocity.
    fn set_motor_fmax(&mut self, id: JointId, fmax: f64);

    /// Add a torque about the hinge axis for the next step.
    fn add_motor_torque(&mut self, id: JointId, torque: f64);
}
