//! # Robot models and scenes
//!
//! The [`RobotFactory`] trait builds robots and scenes from their numeric identifiers. The
//! [`StandardModels`] factory provides the test rigs:
//!
//! | Id | Model                              |
//! |----|------------------------------------|
//! | 90 | Pendulum                           |
//! | 91 | Double pendulum                    |
//! | 92 | Horizontal excentric rotor         |
//! | 93 | Vertical centric rotor             |
//! | 94 | Axial rotor                        |
//! | 95 | Pendulum without accelerometer     |
//!
//! and the scenes `0` (empty) and `1` (hurdles).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::info;
use nalgebra::Vector3;

use crate::actuator::{ActuatorParameters, JointConfig, JointType};
use crate::physics::PhysicsBackend;
use super::{BuildError, Obstacles, RobotBuilder};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Material densities.
///
/// Units: kilograms/meter^3
pub mod density {
    pub const LIGHT: f64 = 200.0;
    pub const NORMAL: f64 = 500.0;
    pub const BODY: f64 = 1000.0;
    pub const HEAVY: f64 = 1500.0;
    pub const ROCK: f64 = 2800.0;
}

/// Height of the ground the rigs stand on
const ZHEIGHT_START: f64 = 0.0;

/// Gap between a rig's base and its moving parts
const JOINT_DISTANCE: f64 = 0.005;

/// Size of a pendulum lever
const SIZE_LEVER: [f64; 3] = [0.02, 0.015, 0.52];

/// Units: kilograms
const MASS_LEVER_KG: f64 = 0.133;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Builds robots and scenes by identifier.
pub trait RobotFactory {
    /// Build robot model `identifier` into the builder.
    fn build_robot(&self, identifier: i32, builder: &mut RobotBuilder) -> Result<(), BuildError>;

    /// Build scene `scene` into the obstacles.
    fn build_scene(
        &self,
        scene: u32,
        world: &mut dyn PhysicsBackend,
        obstacles: &mut Obstacles
    ) -> Result<(), BuildError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The standard test rigs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardModels;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RobotFactory for StandardModels {
    fn build_robot(&self, identifier: i32, builder: &mut RobotBuilder) -> Result<(), BuildError> {
        match identifier {
            90 => pendulum(builder, true),
            91 => double_pendulum(builder),
            92 => rotor_horizontal(builder),
            93 => rotor_vertical(builder),
            94 => rotor_axial(builder),
            95 => pendulum(builder, false),
            _ => Err(BuildError::UnknownModel(identifier))
        }
    }

    fn build_scene(
        &self,
        scene: u32,
        world: &mut dyn PhysicsBackend,
        obstacles: &mut Obstacles
    ) -> Result<(), BuildError> {
        match scene {
            0 => info!("Scene: flat world"),
            1 => {
                info!("Scene: hurdles");
                for i in 1..10 {
                    let height = 0.002 * i as f64;
                    obstacles.create_fixed_box(
                        world,
                        Vector3::new(0.0, -(i as f64) - 0.5, 0.5 * height + 0.001),
                        Vector3::new(1.5, 0.25, height),
                        density::ROCK
                    );
                }
            },
            s => return Err(BuildError::UnknownScene(s))
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// A full turn hinge with the default position at zero.
fn free_joint(name: &str, torque_factor: f64, params: ActuatorParameters) -> JointConfig {
    JointConfig {
        name: name.to_string(),
        joint_type: JointType::Normal,
        stop_lo_deg: -180.0,
        stop_hi_deg: 180.0,
        default_deg: 0.0,
        torque_factor,
        params,
    }
}

fn lever_size(scale: f64) -> Vector3<f64> {
    Vector3::from(SIZE_LEVER) * scale
}

fn pendulum(b: &mut RobotBuilder, with_accel: bool) -> Result<(), BuildError> {
    let size_base = Vector3::new(0.5, 0.5, 0.75);
    let size_lever = lever_size(1.0);

    b.create_box(
        "base",
        Vector3::new(0.0, 0.5 * size_base.y, 0.5 * size_base.z + ZHEIGHT_START),
        size_base,
        0.0,
        density::HEAVY,
        true
    )?;

    b.create_box(
        "lever",
        Vector3::new(
            0.0,
            -0.5 * size_lever.y - JOINT_DISTANCE,
            0.9 * size_base.z - 0.5 * size_lever.z + ZHEIGHT_START
        ),
        size_lever,
        MASS_LEVER_KG,
        0.0,
        false
    )?;

    b.connect_joint(
        "base",
        "lever",
        Vector3::new(0.0, 0.0, 0.5 * size_lever.z - 0.03),
        'y',
        free_joint("joint0", 5.0, ActuatorParameters::SENSORIMOTOR),
        ""
    )?;

    if with_accel {
        b.attach_accel_sensor("lever")?;
    }

    Ok(())
}

fn double_pendulum(b: &mut RobotBuilder) -> Result<(), BuildError> {
    let size_base = Vector3::new(0.5, 0.5, 1.25);
    let size_lever = lever_size(1.0);

    b.create_box(
        "base",
        Vector3::new(0.0, 0.5 * size_base.y, 0.5 * size_base.z + ZHEIGHT_START),
        size_base,
        0.0,
        density::HEAVY,
        true
    )?;

    let y = -0.5 * size_lever.y - JOINT_DISTANCE;

    b.create_box(
        "lever1",
        Vector3::new(0.0, y, 0.9 * size_base.z - 0.5 * size_lever.z + ZHEIGHT_START),
        lever_size(1.001),
        0.0,
        density::BODY,
        false
    )?;

    b.create_box(
        "lever2",
        Vector3::new(
            0.0,
            y,
            0.9 * size_base.z - 1.5 * size_lever.z + size_lever.x + ZHEIGHT_START
        ),
        size_lever,
        0.0,
        density::BODY,
        false
    )?;

    let anchor = Vector3::new(0.0, 0.0, 0.5 * size_lever.z - 0.5 * size_lever.x);
    let params = ActuatorParameters::default();

    b.connect_joint("base", "lever1", anchor, 'y', free_joint("joint0", 1.0, params), "")?;
    b.connect_joint("lever1", "lever2", anchor, 'y', free_joint("joint1", 1.0, params), "")?;

    b.attach_accel_sensor("lever2")
}

fn rotor_horizontal(b: &mut RobotBuilder) -> Result<(), BuildError> {
    let size_base = Vector3::new(0.5, 0.5, 0.5);
    let size_rotor = Vector3::new(0.5, 0.025, 0.025);

    b.create_box(
        "base",
        Vector3::new(0.0, 0.0, 0.5 * size_base.z + ZHEIGHT_START),
        size_base,
        0.0,
        density::HEAVY,
        true
    )?;

    b.create_box(
        "rotor",
        Vector3::new(
            0.5 * size_rotor.x,
            0.0,
            size_base.z + 0.5 * size_rotor.z + JOINT_DISTANCE + ZHEIGHT_START
        ),
        size_rotor,
        0.0,
        density::BODY,
        false
    )?;

    b.connect_joint(
        "base",
        "rotor",
        Vector3::new(-0.5 * size_rotor.x + 0.5 * size_rotor.y, 0.0, 0.0),
        'z',
        free_joint("joint0", 1.0, ActuatorParameters::default()),
        ""
    )?;

    b.attach_accel_sensor("rotor")
}

fn rotor_vertical(b: &mut RobotBuilder) -> Result<(), BuildError> {
    let size_base = Vector3::new(0.25, 0.25, 0.5);
    let size_rotor = Vector3::new(0.5, 0.025, 0.025);

    b.create_box(
        "base",
        Vector3::new(0.0, 0.5 * size_base.y, 0.5 * size_base.z + ZHEIGHT_START),
        size_base,
        0.0,
        density::HEAVY,
        true
    )?;

    b.create_box(
        "rotor",
        Vector3::new(
            0.0,
            -0.5 * size_rotor.y - JOINT_DISTANCE,
            0.9 * size_base.z + ZHEIGHT_START
        ),
        size_rotor,
        0.0,
        density::BODY,
        false
    )?;

    b.connect_joint(
        "base",
        "rotor",
        Vector3::zeros(),
        'y',
        free_joint("joint0", 1.0, ActuatorParameters::default()),
        ""
    )?;

    b.attach_accel_sensor("rotor")
}

fn rotor_axial(b: &mut RobotBuilder) -> Result<(), BuildError> {
    let size_base = Vector3::new(0.1, 0.5, 0.5);
    let size_rotor = Vector3::new(0.1, 0.5, 0.1);

    b.create_box(
        "base",
        Vector3::new(0.0, 0.0, 0.5 * size_base.z + ZHEIGHT_START),
        size_base,
        0.0,
        density::HEAVY,
        true
    )?;

    b.create_box(
        "rotor",
        Vector3::new(0.0, 0.0, size_base.z + 0.75 * size_rotor.z + ZHEIGHT_START),
        size_rotor,
        0.0,
        density::BODY,
        false
    )?;

    b.connect_joint(
        "base",
        "rotor",
        Vector3::zeros(),
        'y',
        free_joint("joint0", 1.0, ActuatorParameters::default()),
        ""
    )?;

    b.attach_accel_sensor("rotor")
}
