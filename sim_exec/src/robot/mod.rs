//! # Robot
//!
//! A robot is an ordered set of bodies connected by actuated hinge joints, with acceleration
//! sensors attached to some of its bodies. Robots are assembled with a [`RobotBuilder`] by a
//! [`RobotFactory`] and are identified by a [`ModelId`].
//!
//! The environment around the robot is a set of [`Obstacles`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod accel;
mod models;

pub use accel::AccelSensor;
pub use models::{density, RobotFactory, StandardModels};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info};
use nalgebra::Vector3;
use thiserror::Error;

use comms_if::tm::{
    BodyTelemetry, RobotConfiguration, Telemetry, JointType, EMPTY_DESCRIPTION
};

use crate::actuator::{
    ActuatorConfig, ActuatorParameters, JointActuator, JointBuildError, JointConfig,
    SensorQuality
};
use crate::physics::{BodyDesc, BodyId, HingeDesc, PhysicsBackend};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Identity of a built robot.
///
/// The instance number is increased on every rebuild, so two builds of the same model are
/// distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelId {
    pub identifier: i32,
    pub instance_no: u32,
}

#[derive(Debug, Clone)]
pub struct RobotBody {
    pub name: String,
    pub id: BodyId,
}

#[derive(Debug, Clone)]
pub struct Robot {
    model: ModelId,
    bodies: Vec<RobotBody>,
    joints: Vec<JointActuator>,
    accels: Vec<AccelSensor>,
    description: Option<String>,
}

/// Fixed bodies making up the environment.
#[derive(Debug, Clone, Default)]
pub struct Obstacles {
    bodies: Vec<BodyId>,
}

/// Assembles a robot in a physics world.
pub struct RobotBuilder<'a> {
    world: &'a mut dyn PhysicsBackend,
    settings: &'a ActuatorConfig,
    robot: Robot,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Unknown robot model {0}")]
    UnknownModel(i32),

    #[error("Unknown scene {0}")]
    UnknownScene(u32),

    #[error("Cannot find a body called '{0}'")]
    UnknownBody(String),

    #[error("A body called '{0}' already exists")]
    DuplicateBody(String),

    #[error("Invalid joint axis '{0}', must be one of xyzXYZ")]
    InvalidAxis(char),

    #[error("Invalid joint: {0}")]
    Joint(#[from] JointBuildError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Robot {
    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    pub fn num_accels(&self) -> usize {
        self.accels.len()
    }

    pub fn bodies(&self) -> &[RobotBody] {
        &self.bodies
    }

    pub fn joints(&self) -> &[JointActuator] {
        &self.joints
    }

    pub fn joints_mut(&mut self) -> &mut [JointActuator] {
        &mut self.joints
    }

    pub fn accels(&self) -> &[AccelSensor] {
        &self.accels
    }

    /// Description string, `None` if the model has none.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Body handles in body index order.
    pub fn body_ids(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.bodies.iter().map(|b| b.id)
    }

    /// The configuration message sent to the client.
    pub fn configuration(&self) -> RobotConfiguration {
        RobotConfiguration {
            num_accels: self.accels.len(),
            joints: self.joints.iter().map(|j| j.descriptor()).collect(),
            body_names: self.bodies.iter().map(|b| b.name.clone()).collect(),
        }
    }

    /// The description message sent to the client.
    pub fn description_message(&self) -> String {
        let mut msg = match self.description() {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => EMPTY_DESCRIPTION.to_string()
        };

        if !msg.ends_with('\n') {
            msg.push('\n');
        }

        msg
    }

    /// Sample every sensor for the telemetry of this step.
    pub fn telemetry(
        &mut self,
        world: &dyn PhysicsBackend,
        time: f64,
        quality: SensorQuality
    ) -> Telemetry {
        let joint_positions = self.joints
            .iter_mut()
            .map(|j| j.low_resolution_position(world, quality))
            .collect();

        let joint_velocities = self.joints
            .iter_mut()
            .map(|j| j.low_resolution_velocity(world, quality))
            .collect();

        let accels = self.accels
            .iter_mut()
            .map(|a| a.update(world))
            .collect();

        let bodies = self.bodies
            .iter()
            .map(|b| {
                let state = world.body_state(b.id);
                let (p, v) = (state.position, state.linear_velocity);
                BodyTelemetry {
                    position: [p.x, p.y, p.z],
                    velocity: [v.x, v.y, v.z],
                }
            })
            .collect();

        Telemetry {
            time,
            joint_positions,
            joint_velocities,
            accels,
            bodies,
        }
    }

    /// Apply the setpoints of every joint for the next step.
    pub fn apply_control_all(&mut self, world: &mut dyn PhysicsBackend) {
        for joint in self.joints.iter_mut() {
            joint.apply_control(world);
        }
    }

    /// Reset every joint and accelerometer.
    pub fn reset(&mut self, world: &mut dyn PhysicsBackend) {
        for joint in self.joints.iter_mut() {
            joint.reset(world);
        }
        for accel in self.accels.iter_mut() {
            accel.reset(world);
        }
    }

    /// Replace the actuator parameters of every joint.
    pub fn reinit_params(&mut self, params: ActuatorParameters) {
        for joint in self.joints.iter_mut() {
            joint.reinit_params(params);
        }
    }

    /// Remove the robot from the world, leaving it without bodies, joints or sensors.
    pub fn destroy(&mut self, world: &mut dyn PhysicsBackend) {
        debug!("Destroying robot {:?}", self.model);

        for joint in self.joints.drain(..) {
            world.destroy_hinge(joint.hinge());
        }
        for body in self.bodies.drain(..) {
            world.destroy_body(body.id);
        }
        self.accels.clear();
        self.description = None;
    }
}

impl Obstacles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn body_ids(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.bodies.iter().copied()
    }

    /// Add a box which is fixed to the world.
    pub fn create_fixed_box(
        &mut self,
        world: &mut dyn PhysicsBackend,
        position: Vector3<f64>,
        size: Vector3<f64>,
        density: f64
    ) {
        let id = world.create_body(&BodyDesc {
            name: format!("obstacle_{}", self.bodies.len()),
            position,
            size,
            mass_kg: 0.0,
            density,
            is_static: false,
        });
        world.set_fixed(id, true);

        self.bodies.push(id);
    }

    /// Remove every obstacle from the world.
    pub fn destroy(&mut self, world: &mut dyn PhysicsBackend) {
        for id in self.bodies.drain(..) {
            world.destroy_body(id);
        }
    }
}

impl<'a> RobotBuilder<'a> {
    pub fn new(
        world: &'a mut dyn PhysicsBackend,
        settings: &'a ActuatorConfig,
        model: ModelId
    ) -> Self {
        Self {
            world,
            settings,
            robot: Robot {
                model,
                bodies: Vec::new(),
                joints: Vec::new(),
                accels: Vec::new(),
                description: None,
            },
        }
    }

    /// Add a box shaped body. A `mass_kg` of zero takes the mass from the density.
    pub fn create_box(
        &mut self,
        name: &str,
        position: Vector3<f64>,
        size: Vector3<f64>,
        mass_kg: f64,
        density: f64,
        is_static: bool
    ) -> Result<BodyId, BuildError> {
        if self.find_body(name).is_ok() {
            return Err(BuildError::DuplicateBody(name.to_string()))
        }

        let id = self.world.create_body(&BodyDesc {
            name: name.to_string(),
            position,
            size,
            mass_kg,
            density,
            is_static,
        });

        self.robot.bodies.push(RobotBody { name: name.to_string(), id });

        Ok(id)
    }

    /// Connect two bodies with an actuated hinge.
    ///
    /// The anchor is given relative to the centre of `body2`. The axis is one of `xyz`, or `XYZ`
    /// for the negative direction. If the joint is symmetric and a joint called `symmetric_name`
    /// already exists the two are linked.
    pub fn connect_joint(
        &mut self,
        body1: &str,
        body2: &str,
        anchor_offset: Vector3<f64>,
        axis: char,
        config: JointConfig,
        symmetric_name: &str
    ) -> Result<(), BuildError> {
        let axis = axis_vector(axis)?;
        let body1 = self.find_body(body1)?;
        let body2 = self.find_body(body2)?;

        let hinge = self.world.create_hinge(&HingeDesc {
            body1,
            body2,
            anchor_offset,
            axis,
        });

        let index = self.robot.joints.len();
        let joint = JointActuator::new(index, hinge, config, self.settings, &mut *self.world)?;
        self.robot.joints.push(joint);

        if !self.link_symmetric(index, symmetric_name) {
            debug!("No symmetric partner found yet for joint {}", index);
        }

        Ok(())
    }

    /// Attach an acceleration sensor to a body.
    pub fn attach_accel_sensor(&mut self, body: &str) -> Result<(), BuildError> {
        let id = self.find_body(body)?;

        let seed = match self.settings.noise_seed {
            0 => 0,
            s => s.wrapping_add(1000 + self.robot.accels.len() as u64)
        };

        let accel = AccelSensor::new(id, self.settings.step_length_s, seed, &*self.world);
        self.robot.accels.push(accel);

        Ok(())
    }

    pub fn set_description(&mut self, description: &str) {
        self.robot.description = Some(description.to_string());
    }

    pub fn finish(self) -> Robot {
        let total_mass: f64 = self.robot.bodies.iter().map(|b| self.world.body_mass(b.id)).sum();

        info!(
            "Robot {} built: {} bodies, {} joints, {} accels, {:.3} kg",
            self.robot.model.identifier,
            self.robot.num_bodies(),
            self.robot.num_joints(),
            self.robot.num_accels(),
            total_mass
        );

        self.robot
    }

    fn find_body(&self, name: &str) -> Result<BodyId, BuildError> {
        self.robot.bodies
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.id)
            .ok_or_else(|| BuildError::UnknownBody(name.to_string()))
    }

    /// Link a symmetric joint to the joint called `partner`. The partner becomes a normal joint.
    fn link_symmetric(&mut self, index: usize, partner: &str) -> bool {
        if self.robot.joints[index].joint_type() != JointType::Symmetric {
            return false
        }

        let partner = match self.robot.joints.iter().position(|j| j.name() == partner) {
            Some(p) => p,
            None => return false
        };

        debug!("Joint {:02} symmetrically associated with {:02}", index, partner);

        self.robot.joints[index].set_symmetric_partner(partner, JointType::Symmetric);
        self.robot.joints[partner].set_symmetric_partner(index, JointType::Normal);

        true
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn axis_vector(axis: char) -> Result<Vector3<f64>, BuildError> {
    match axis {
        'x' => Ok(Vector3::x()),
        'y' => Ok(Vector3::y()),
        'z' => Ok(Vector3::z()),
        'X' => Ok(-Vector3::x()),
        'Y' => Ok(-Vector3::y()),
        'Z' => Ok(-Vector3::z()),
        c => Err(BuildError::InvalidAxis(c))
    }
}
