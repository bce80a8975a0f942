//! # Session scenarios
//!
//! Drives whole client sessions through the controller and scheduler using scripted streams.

use std::f64::consts::PI;
use std::io::Cursor;

use comms_if::{
    net::{LineStream, ReplayStream},
    tm::{RobotConfiguration, Telemetry, TmParseError},
};
use sim_lib::{
    actuator::{ActuatorConfig, ActuatorParameters, ControlMode},
    controller::{ControllerError, SessionController, SessionState, MAX_UNRECOGNISED_LINES},
    params::SimExecParams,
    physics::SimpleWorld,
    robot::{BuildError, ModelId, StandardModels},
    scheduler::{Scheduler, SchedulerConfig, SimulationClock},
    sim::Simulation,
};

type Replay = ReplayStream<Cursor<Vec<u8>>, Vec<u8>>;

const STEP: f64 = 0.01;

fn params() -> SimExecParams {
    SimExecParams {
        noise_seed: 42,
        real_time: false,
        use_fps_control: false,
        step_length_s: STEP,
        ..Default::default()
    }
}

fn simulation(robot: i32) -> Simulation {
    Simulation::new(
        Box::new(SimpleWorld::new(true)),
        Box::new(StandardModels),
        ActuatorConfig::from(&params()),
        robot,
        0
    ).unwrap()
}

fn connect(script: &str, sim: &Simulation) -> SessionController<Replay> {
    let stream = ReplayStream::new(Cursor::new(script.as_bytes().to_vec()), Vec::new());
    SessionController::new(LineStream::new(stream), sim)
}

fn sent(ctrl: &SessionController<Replay>) -> Vec<String> {
    String::from_utf8_lossy(ctrl.stream().get_ref().output())
        .lines()
        .map(String::from)
        .collect()
}

/// Split the server output into the configuration and the telemetry lines after it.
fn split_output(lines: &[String]) -> (RobotConfiguration, Vec<String>) {
    let mut iter = lines.iter().cloned();
    let config = RobotConfiguration::parse(|| -> Result<String, TmParseError> {
        Ok(iter.next().unwrap_or_default())
    }).unwrap();

    (config, iter.collect())
}

/// One simulation step followed by one control cycle.
fn cycle(
    sim: &mut Simulation,
    clock: &mut SimulationClock,
    ctrl: &mut SessionController<Replay>
) -> bool {
    if !ctrl.is_paused() {
        sim.step(STEP);
        clock.advance(STEP);
    }
    ctrl.control(sim, clock).unwrap()
}

#[test]
fn test_position_all_then_telemetry() {
    let sim = simulation(91);
    let mut ctrl = connect("ACK\nPA 0.5\nDONE\n", &sim);
    assert!(ctrl.handshake(&sim).unwrap());

    let mut sched = Scheduler::new(SchedulerConfig::from(&params()), sim, ctrl);

    assert!(sched.step_frame(false).unwrap());
    for j in sched.simulation().robot().joints() {
        assert_eq!(j.mode(), ControlMode::Position);
        assert_eq!(j.pid_setpoint(), 0.5 * PI);
    }

    // End of the script closes the session after one more telemetry line
    assert!(!sched.step_frame(false).unwrap());

    let (config, tm) = split_output(&sent(sched.controller()));
    assert_eq!(config.num_bodies(), 3);
    assert_eq!(config.num_joints(), 2);
    assert_eq!(config.num_accels, 1);
    assert_eq!(tm.len(), 2);

    let second = Telemetry::parse(&tm[1], 2, 1, 3).unwrap();
    assert!((second.time - 2.0 * STEP).abs() < 1e-6);
    for p in second.joint_positions.iter() {
        assert!(p.abs() <= 1.0);
    }
}

#[test]
fn test_unrecognised_line_limit() {
    let mut clock = SimulationClock::new();

    // One short of the limit keeps the session
    let mut sim = simulation(90);
    let script = format!("ACK\n{}DONE\n", "FOO\n".repeat(MAX_UNRECOGNISED_LINES - 1));
    let mut ctrl = connect(&script, &sim);
    ctrl.handshake(&sim).unwrap();
    assert!(ctrl.control(&mut sim, &mut clock).unwrap());
    assert_eq!(ctrl.state(), SessionState::Active);

    // At the limit the session ends before DONE is read
    let mut sim = simulation(90);
    let script = format!("ACK\n{}DONE\n", "FOO\n".repeat(MAX_UNRECOGNISED_LINES));
    let mut ctrl = connect(&script, &sim);
    ctrl.handshake(&sim).unwrap();
    assert!(!ctrl.control(&mut sim, &mut clock).unwrap());
    assert_eq!(ctrl.state(), SessionState::Terminated);

    // Recognised lines, even malformed ones, restart the count
    let mut sim = simulation(90);
    let burst = "FOO\n".repeat(MAX_UNRECOGNISED_LINES - 1);
    let script = format!("ACK\n{}UA x\n{}DONE\n", burst, burst);
    let mut ctrl = connect(&script, &sim);
    ctrl.handshake(&sim).unwrap();
    assert!(ctrl.control(&mut sim, &mut clock).unwrap());
}

#[test]
fn test_reset_then_save_restore() {
    let mut sim = simulation(91);
    let mut clock = SimulationClock::new();
    let initial = sim.capture();

    let script = "ACK\n\
        UA 1\nDONE\n\
        DONE\n\
        DONE\n\
        RESET\nSAVE\nDONE\n\
        UA -1\nDONE\n\
        DONE\n\
        RESTORE\nDONE\n";
    let mut ctrl = connect(script, &sim);
    ctrl.handshake(&sim).unwrap();

    for _ in 0..3 {
        assert!(cycle(&mut sim, &mut clock, &mut ctrl));
    }
    assert_ne!(sim.capture(), initial);

    assert!(cycle(&mut sim, &mut clock, &mut ctrl));
    let after_reset = sim.capture();
    assert_eq!(after_reset, initial);
    assert_eq!(clock.sim_time(), 0.0);
    for j in sim.robot().joints() {
        assert_eq!(j.mode(), ControlMode::Voltage);
        assert_eq!(j.voltage_setpoint(), 0.0);
    }

    for _ in 0..2 {
        assert!(cycle(&mut sim, &mut clock, &mut ctrl));
    }
    assert_ne!(sim.capture(), after_reset);

    assert!(cycle(&mut sim, &mut clock, &mut ctrl));
    assert_eq!(sim.capture(), after_reset);
}

#[test]
fn test_model_rebuild_handshake() {
    let mut sim = simulation(91);
    let mut clock = SimulationClock::new();
    clock.advance(1.0);

    let mut ctrl = connect("ACK\nMODEL 90 0\nDONE\nACK\nDONE\n", &sim);
    ctrl.handshake(&sim).unwrap();

    assert!(ctrl.control(&mut sim, &mut clock).unwrap());
    assert_eq!(sim.robot().model(), ModelId { identifier: 90, instance_no: 1 });
    assert_eq!(clock.sim_time(), 0.0);

    assert!(cycle(&mut sim, &mut clock, &mut ctrl));

    let lines = sent(&ctrl);
    let (first, rest) = split_output(&lines);
    assert_eq!(first.num_joints(), 2);

    // Telemetry of the old robot, then the new configuration and telemetry of the new robot
    let (second, tm) = split_output(&rest[1..]);
    assert_eq!(second.num_joints(), 1);
    assert_eq!(second.num_bodies(), 2);
    assert_eq!(tm.len(), 1);
    assert!(Telemetry::parse(&tm[0], 1, 1, 2).is_ok());
}

#[test]
fn test_model_rebuild_rejected_handshake() {
    let mut sim = simulation(91);
    let mut clock = SimulationClock::new();
    let mut ctrl = connect("ACK\nMODEL 92 0\nDONE\nNOPE\n", &sim);
    ctrl.handshake(&sim).unwrap();

    assert!(!ctrl.control(&mut sim, &mut clock).unwrap());
    assert_eq!(ctrl.state(), SessionState::Terminated);
}

#[test]
fn test_unknown_model_is_an_error() {
    let mut sim = simulation(90);
    let mut clock = SimulationClock::new();
    let mut ctrl = connect("ACK\nMODEL 31 0\nDONE\n", &sim);
    ctrl.handshake(&sim).unwrap();

    assert!(matches!(
        ctrl.control(&mut sim, &mut clock),
        Err(ControllerError::Build(_))
    ));
}

#[test]
fn test_unknown_scene_is_an_error() {
    let res = Simulation::new(
        Box::new(SimpleWorld::new(true)),
        Box::new(StandardModels),
        ActuatorConfig::from(&params()),
        90,
        7
    );

    assert!(matches!(res, Err(BuildError::UnknownScene(7))));
}

#[test]
fn test_model_with_bad_params_still_rebuilds() {
    let mut sim = simulation(90);
    let mut clock = SimulationClock::new();
    let mut ctrl = connect("ACK\nMODEL 91 2 0.5\nDONE\nACK\nDONE\n", &sim);
    ctrl.handshake(&sim).unwrap();

    assert!(ctrl.control(&mut sim, &mut clock).unwrap());
    assert_eq!(sim.robot().model(), ModelId { identifier: 91, instance_no: 1 });
    assert_eq!(ctrl.state(), SessionState::Active);
    assert!(sim.robot().joints().iter().all(|j| *j.params() == ActuatorParameters::default()));
}

#[test]
fn test_model_params_reach_the_actuators() {
    let mut sim = simulation(90);
    let mut clock = SimulationClock::new();

    // Model 91 is built with the default parameters
    let custom = ActuatorParameters::SENSORIMOTOR;
    assert_ne!(custom, ActuatorParameters::default());
    let values: Vec<String> = custom.to_vec().iter().map(|v| v.to_string()).collect();

    let script = format!("ACK\nMODEL 91 10 {}\nDONE\nACK\nDONE\n", values.join(" "));
    let mut ctrl = connect(&script, &sim);
    ctrl.handshake(&sim).unwrap();

    assert!(ctrl.control(&mut sim, &mut clock).unwrap());
    assert_eq!(sim.robot().num_joints(), 2);
    for j in sim.robot().joints() {
        assert_eq!(*j.params(), custom);
    }
}

#[test]
fn test_voltage_clipping_in_the_world() {
    // Same seed, same steps, one command over the limit and one at it
    let script = |u: &str| format!("ACK\nUA {}\nDONE\n{}", u, "DONE\n".repeat(20));

    let mut sim_over = simulation(91);
    let initial = sim_over.capture();
    let mut clock_over = SimulationClock::new();
    let mut ctrl_over = connect(&script("3.0"), &sim_over);
    ctrl_over.handshake(&sim_over).unwrap();

    let mut sim_max = simulation(91);
    let mut clock_max = SimulationClock::new();
    let mut ctrl_max = connect(&script("1.0"), &sim_max);
    ctrl_max.handshake(&sim_max).unwrap();

    for _ in 0..20 {
        assert!(cycle(&mut sim_over, &mut clock_over, &mut ctrl_over));
        assert!(cycle(&mut sim_max, &mut clock_max, &mut ctrl_max));
    }

    let hinge_over = sim_over.robot().joints()[0].hinge();
    let hinge_max = sim_max.robot().joints()[0].hinge();
    let angle = sim_max.world().hinge_angle(hinge_max);

    assert_ne!(sim_max.capture(), initial);
    assert_eq!(sim_over.capture(), sim_max.capture());
    assert_eq!(sim_over.world().hinge_angle(hinge_over), angle);
    assert_eq!(
        sim_over.world().hinge_rate(hinge_over),
        sim_max.world().hinge_rate(hinge_max)
    );
    assert_eq!(sent(&ctrl_over), sent(&ctrl_max));
}

#[test]
fn test_vector_fan_out() {
    let mut sim = simulation(91);
    let mut clock = SimulationClock::new();
    let mut ctrl = connect("ACK\nPX 0.1 0.2\nDONE\nUX 0.5\nDONE\nPX 0.3 x 0.9\nDONE\n", &sim);
    ctrl.handshake(&sim).unwrap();

    assert!(ctrl.control(&mut sim, &mut clock).unwrap());
    let joints = sim.robot().joints();
    assert_eq!(joints[0].pid_setpoint(), 0.1 * PI);
    assert_eq!(joints[1].pid_setpoint(), 0.2 * PI);

    // A short vector only sets the joints it covers
    assert!(cycle(&mut sim, &mut clock, &mut ctrl));
    let joints = sim.robot().joints();
    assert_eq!(joints[0].mode(), ControlMode::Voltage);
    assert_eq!(joints[1].mode(), ControlMode::Position);
    assert_eq!(joints[1].pid_setpoint(), 0.2 * PI);

    assert!(cycle(&mut sim, &mut clock, &mut ctrl));
    let joints = sim.robot().joints();
    assert_eq!(joints[0].mode(), ControlMode::Position);
    assert_eq!(joints[0].pid_setpoint(), 0.3 * PI);
    assert_eq!(joints[1].pid_setpoint(), 0.2 * PI);
}

#[test]
fn test_index_commands_out_of_range() {
    let mut sim = simulation(90);
    let mut clock = SimulationClock::new();
    let mut ctrl = connect("ACK\nPI 7 0.5\nFI 2 0 0 1\nFIXED 5\nPI 0 -0.25\nDONE\n", &sim);
    ctrl.handshake(&sim).unwrap();

    assert!(ctrl.control(&mut sim, &mut clock).unwrap());
    assert_eq!(sim.robot().joints()[0].pid_setpoint(), -0.25 * PI);
}

#[test]
fn test_rejected_handshake() {
    let sim = simulation(90);
    let mut ctrl = connect("HELLO\nDONE\n", &sim);

    assert!(!ctrl.handshake(&sim).unwrap());
    assert_eq!(ctrl.state(), SessionState::Terminated);
}
