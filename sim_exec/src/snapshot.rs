//! # Snapshots
//!
//! A snapshot is the full kinematic state of every robot body followed by every obstacle body,
//! tagged with the identity of the robot it was taken from. Restoring writes the states back in
//! the same order. Actuator and session state are not part of a snapshot.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use util::raise_error;

use crate::physics::{BodyState, PhysicsBackend};
use crate::robot::{ModelId, Obstacles, Robot};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    model: ModelId,
    bodies: Vec<BodyState>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Snapshot {
    /// Record the state of the robot and the obstacles.
    pub fn capture(world: &dyn PhysicsBackend, robot: &Robot, obstacles: &Obstacles) -> Self {
        let bodies: Vec<BodyState> = robot
            .body_ids()
            .chain(obstacles.body_ids())
            .map(|id| world.body_state(id))
            .collect();

        trace!("Captured {} body states of {:?}", bodies.len(), robot.model());

        Self {
            model: robot.model(),
            bodies,
        }
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Write the recorded states back.
    ///
    /// The snapshot must have been captured from the same robot instance, anything else is a
    /// programming error and panics.
    pub fn restore(&self, world: &mut dyn PhysicsBackend, robot: &Robot, obstacles: &Obstacles) {
        if self.model != robot.model() {
            raise_error!(
                "Snapshot of {:?} cannot be restored onto {:?}",
                self.model,
                robot.model()
            );
        }

        let ids: Vec<_> = robot.body_ids().chain(obstacles.body_ids()).collect();
        if ids.len() != self.bodies.len() {
            raise_error!(
                "Snapshot holds {} bodies but the world has {}",
                self.bodies.len(),
                ids.len()
            );
        }

        for (id, state) in ids.into_iter().zip(self.bodies.iter()) {
            world.set_body_state(id, state);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::actuator::ActuatorConfig;
    use crate::params::SimExecParams;
    use crate::physics::SimpleWorld;
    use crate::robot::{RobotBuilder, RobotFactory, StandardModels};

    fn setup(instance_no: u32) -> (SimpleWorld, Robot, Obstacles) {
        let mut world = SimpleWorld::new(true);
        let settings = ActuatorConfig::from(&SimExecParams::default());

        let mut b = RobotBuilder::new(&mut world, &settings, ModelId { identifier: 91, instance_no });
        StandardModels.build_robot(91, &mut b).unwrap();
        let robot = b.finish();

        let mut obstacles = Obstacles::new();
        StandardModels.build_scene(1, &mut world, &mut obstacles).unwrap();

        (world, robot, obstacles)
    }

    #[test]
    fn test_capture_restore() {
        let (mut world, robot, obstacles) = setup(0);
        let hinge = robot.joints()[0].hinge();

        // Swing the pendulum up a bit
        for _ in 0..10 {
            world.add_motor_torque(hinge, 0.5);
            world.step(0.01);
        }

        let snap = Snapshot::capture(&world, &robot, &obstacles);
        assert_eq!(snap.len(), 3 + 9);
        let angle = world.hinge_angle(hinge);

        for _ in 0..50 {
            world.step(0.01);
        }
        assert!((world.hinge_angle(hinge) - angle).abs() > 1e-3);

        snap.restore(&mut world, &robot, &obstacles);
        assert_eq!(Snapshot::capture(&world, &robot, &obstacles), snap);
        assert!((world.hinge_angle(hinge) - angle).abs() < 1e-9);
    }

    #[test]
    #[should_panic]
    fn test_restore_onto_other_model_panics() {
        let (world, robot, obstacles) = setup(0);
        let snap = Snapshot::capture(&world, &robot, &obstacles);

        let (mut world, robot, obstacles) = setup(1);
        snap.restore(&mut world, &robot, &obstacles);
    }
}
