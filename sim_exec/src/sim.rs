//! # Simulation
//!
//! The simulation owns the physics world, the robot built in it and the obstacles around it.
//! Robots are built and rebuilt through a [`RobotFactory`].

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::info;
use nalgebra::Vector3;

use comms_if::{cmd::{Force, JointTarget}, tm::Telemetry};

use crate::actuator::{ActuatorConfig, ActuatorParameters, SensorQuality};
use crate::physics::PhysicsBackend;
use crate::robot::{BuildError, ModelId, Obstacles, Robot, RobotBuilder, RobotFactory};
use crate::snapshot::Snapshot;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct Simulation {
    world: Box<dyn PhysicsBackend>,
    factory: Box<dyn RobotFactory>,
    settings: ActuatorConfig,
    scene: u32,
    robot: Robot,
    obstacles: Obstacles,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Simulation {
    /// Build robot `robot_id` and scene `scene` in the given world.
    pub fn new(
        mut world: Box<dyn PhysicsBackend>,
        factory: Box<dyn RobotFactory>,
        settings: ActuatorConfig,
        robot_id: i32,
        scene: u32
    ) -> Result<Self, BuildError> {
        let model = ModelId { identifier: robot_id, instance_no: 0 };
        let robot = build_robot(&mut *world, &*factory, &settings, model)?;

        let mut obstacles = Obstacles::new();
        factory.build_scene(scene, &mut *world, &mut obstacles)?;

        Ok(Self {
            world,
            factory,
            settings,
            scene,
            robot,
            obstacles,
        })
    }

    pub fn world(&self) -> &dyn PhysicsBackend {
        &*self.world
    }

    pub fn robot(&self) -> &Robot {
        &self.robot
    }

    pub fn obstacles(&self) -> &Obstacles {
        &self.obstacles
    }

    /// Destroy the robot and the scene and build model `identifier` in their place.
    ///
    /// If `params` are given they replace the actuator parameters of every joint of the new robot.
    pub fn rebuild(
        &mut self,
        identifier: i32,
        params: Option<ActuatorParameters>
    ) -> Result<(), BuildError> {
        info!("Rebuilding with model {}", identifier);

        let model = ModelId {
            identifier,
            instance_no: self.robot.model().instance_no + 1,
        };

        self.robot.destroy(&mut *self.world);
        self.obstacles.destroy(&mut *self.world);

        self.robot = build_robot(&mut *self.world, &*self.factory, &self.settings, model)?;
        self.factory.build_scene(self.scene, &mut *self.world, &mut self.obstacles)?;

        if let Some(p) = params {
            self.robot.reinit_params(p);
        }

        Ok(())
    }

    /// Advance the physics by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        self.world.step(dt);
    }

    pub fn set_gravity(&mut self, enabled: bool) {
        self.world.set_gravity(enabled);
    }

    /// Set a joint quantity. The index must be valid.
    pub fn set_joint(&mut self, index: usize, target: JointTarget, value: f64) {
        let joint = &mut self.robot.joints_mut()[index];

        match target {
            JointTarget::Voltage => joint.set_voltage(&*self.world, value),
            JointTarget::Position => joint.set_position(value),
            JointTarget::MaxTorque => joint.set_max_torque(value),
        }
    }

    /// Apply a force to a robot body for the next step. The index must be valid.
    pub fn add_impulse(&mut self, body: usize, force: Force) {
        let id = self.robot.bodies()[body].id;
        self.world.add_force(id, Vector3::from(force));
    }

    /// Toggle the fixed constraint of a robot body, returning whether it is now fixed.
    pub fn toggle_fixed(&mut self, body: usize) -> bool {
        let id = self.robot.bodies()[body].id;
        let fixed = !self.world.is_fixed(id);
        self.world.set_fixed(id, fixed);
        fixed
    }

    pub fn reinit_params(&mut self, params: ActuatorParameters) {
        self.robot.reinit_params(params);
    }

    pub fn reset_actuators(&mut self) {
        self.robot.reset(&mut *self.world);
    }

    pub fn apply_control_all(&mut self) {
        self.robot.apply_control_all(&mut *self.world);
    }

    pub fn telemetry(&mut self, time: f64, quality: SensorQuality) -> Telemetry {
        self.robot.telemetry(&*self.world, time, quality)
    }

    pub fn capture(&self) -> Snapshot {
        Snapshot::capture(&*self.world, &self.robot, &self.obstacles)
    }

    pub fn restore(&mut self, snapshot: &Snapshot) {
        snapshot.restore(&mut *self.world, &self.robot, &self.obstacles);
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn build_robot(
    world: &mut dyn PhysicsBackend,
    factory: &dyn RobotFactory,
    settings: &ActuatorConfig,
    model: ModelId
) -> Result<Robot, BuildError> {
    let mut builder = RobotBuilder::new(world, settings, model);
    factory.build_robot(model.identifier, &mut builder)?;
    Ok(builder.finish())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::SimExecParams;
    use crate::physics::SimpleWorld;
    use crate::robot::StandardModels;

    fn sim(robot: i32, scene: u32) -> Simulation {
        let params = SimExecParams { noise_seed: 9, ..Default::default() };
        Simulation::new(
            Box::new(SimpleWorld::new(true)),
            Box::new(StandardModels),
            ActuatorConfig::from(&params),
            robot,
            scene
        ).unwrap()
    }

    #[test]
    fn test_rebuild() {
        let mut sim = sim(90, 1);
        assert_eq!(sim.robot().model(), ModelId { identifier: 90, instance_no: 0 });
        assert_eq!(sim.obstacles().len(), 9);

        sim.rebuild(91, Some(ActuatorParameters::SENSORIMOTOR)).unwrap();
        assert_eq!(sim.robot().model(), ModelId { identifier: 91, instance_no: 1 });
        assert_eq!(sim.robot().num_joints(), 2);
        assert_eq!(sim.obstacles().len(), 9);
        assert!(sim.robot().joints().iter().all(|j| *j.params() == ActuatorParameters::SENSORIMOTOR));

        sim.rebuild(90, None).unwrap();
        assert_eq!(sim.robot().model().instance_no, 2);

        assert!(matches!(sim.rebuild(12, None), Err(BuildError::UnknownModel(12))));
    }

    #[test]
    fn test_unknown_model_is_fatal() {
        let params = SimExecParams::default();
        let res = Simulation::new(
            Box::new(SimpleWorld::new(true)),
            Box::new(StandardModels),
            ActuatorConfig::from(&params),
            31,
            0
        );
        assert!(matches!(res, Err(BuildError::UnknownModel(31))));
    }

    #[test]
    fn test_unknown_scene_is_fatal() {
        let params = SimExecParams::default();
        let res = Simulation::new(
            Box::new(SimpleWorld::new(true)),
            Box::new(StandardModels),
            ActuatorConfig::from(&params),
            90,
            7
        );
        assert!(matches!(res, Err(BuildError::UnknownScene(7))));
    }

    #[test]
    fn test_toggle_fixed() {
        let mut sim = sim(90, 0);
        assert!(sim.toggle_fixed(1));
        assert!(sim.world().is_fixed(sim.robot().bodies()[1].id));
        assert!(!sim.toggle_fixed(1));
    }
}
