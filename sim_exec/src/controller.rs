//! # Session controller
//!
//! The session controller serves one client over a line stream. After the handshake, in which the
//! robot configuration is sent and acknowledged, every simulation step runs one [`control`]
//! cycle:
//!
//! 1. Send the telemetry of the current state, unless the previous step was paused.
//! 2. Read and execute commands until `DONE`, `EXIT` or too many unrecognised lines.
//! 3. Rebuild the robot if a `MODEL` command was received, and repeat the handshake.
//! 4. Apply the joint setpoints, unless this step is paused.
//!
//! Malformed commands are logged and skipped, they never end the session.
//!
//! [`control`]: SessionController::control

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::io::{Read, Write};
use log::{debug, error, info, trace, warn};
use thiserror::Error;

use comms_if::{
    cmd::{Command, CommandParseError, JointTarget, SensorQuality},
    net::{LineStream, LineStreamError},
    tm::ACK_PREFIX,
};

use crate::actuator::{ActuatorParameters, NUM_ACTUATOR_PARAMS};
use crate::robot::BuildError;
use crate::scheduler::SimulationClock;
use crate::sim::Simulation;
use crate::snapshot::Snapshot;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of consecutive unrecognised lines after which the client is considered out of sync.
pub const MAX_UNRECOGNISED_LINES: usize = 42;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct SessionController<S> {
    stream: LineStream<S>,
    state: SessionState,

    /// Physics and telemetry are suspended for the next step
    paused: bool,

    /// A frame capture was requested for this step
    record: bool,

    quality: SensorQuality,

    /// Consecutive unrecognised lines
    num_unrecognised: usize,

    /// State after the robot was built
    init_snapshot: Snapshot,

    /// State saved by the client
    user_snapshot: Snapshot,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHandshake,
    Active,
    Terminated,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Client connection error: {0}")]
    Stream(#[from] LineStreamError),

    #[error("Could not build the requested model: {0}")]
    Build(#[from] BuildError),
}

/// What to do after executing a command
enum Flow {
    Continue,
    Done,
    Exit,
    Reload(i32, Option<ActuatorParameters>),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<S> SessionController<S>
where
    S: Read + Write
{
    /// Create a controller for a new client. The initial snapshot is taken from the current state
    /// of the simulation.
    pub fn new(stream: LineStream<S>, sim: &Simulation) -> Self {
        let snapshot = sim.capture();

        Self {
            stream,
            state: SessionState::AwaitingHandshake,
            paused: false,
            record: false,
            quality: SensorQuality::Good,
            num_unrecognised: 0,
            init_snapshot: snapshot.clone(),
            user_snapshot: snapshot,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn record_requested(&self) -> bool {
        self.record
    }

    pub fn sensor_quality(&self) -> SensorQuality {
        self.quality
    }

    pub fn stream(&self) -> &LineStream<S> {
        &self.stream
    }

    /// Send the robot configuration and wait for the acknowledgement.
    ///
    /// Returns `false`, and ends the session, if the client replied with anything else.
    pub fn handshake(&mut self, sim: &Simulation) -> Result<bool, ControllerError> {
        self.stream.send(&sim.robot().configuration().to_message())?;

        debug!("Waiting for acknowledgement");
        let reply = self.stream.receive_line()?;

        if reply.starts_with(ACK_PREFIX) {
            info!("Acknowledgement of the configuration received");
            self.state = SessionState::Active;
            Ok(true)
        }
        else {
            error!("Failed to receive acknowledgement, got '{}'", reply);
            self.state = SessionState::Terminated;
            Ok(false)
        }
    }

    /// Run one control cycle. Returns `false` once the session has ended.
    pub fn control(
        &mut self,
        sim: &mut Simulation,
        clock: &mut SimulationClock
    ) -> Result<bool, ControllerError> {
        if self.state != SessionState::Active {
            return Ok(false)
        }

        self.record = false;

        if !self.paused {
            let tm = sim.telemetry(clock.sim_time(), self.quality);
            self.stream.send(&tm.to_line())?;
        }

        self.paused = false;

        let mut reload = None;

        loop {
            let line = self.stream.receive_line()?;
            trace!("Received '{}'", line);

            let cmd = match Command::parse(&line) {
                Ok(c) => {
                    self.num_unrecognised = 0;
                    c
                },
                Err(CommandParseError::Unrecognised(l)) => {
                    self.num_unrecognised += 1;
                    warn!("Unknown command: '{}'", l);

                    if self.num_unrecognised >= MAX_UNRECOGNISED_LINES {
                        error!(
                            "{} unrecognised lines in a row, the client is out of sync",
                            self.num_unrecognised
                        );
                        self.state = SessionState::Terminated;
                        return Ok(false)
                    }
                    continue
                },
                Err(e) => {
                    self.num_unrecognised = 0;
                    warn!("{}", e);
                    continue
                }
            };

            let flow = match self.execute(cmd, &line, sim, clock) {
                Ok(f) => f,
                Err(e) => {
                    self.state = SessionState::Terminated;
                    return Err(e)
                }
            };

            match flow {
                Flow::Continue => (),
                Flow::Done => break,
                Flow::Exit => {
                    info!("Received 'EXIT' command");
                    self.state = SessionState::Terminated;
                    return Ok(false)
                },
                Flow::Reload(id, params) => reload = Some((id, params)),
            }
        }

        if let Some((id, params)) = reload {
            sim.rebuild(id, params)?;
            sim.reset_actuators();
            clock.reset();

            self.init_snapshot = sim.capture();
            self.user_snapshot = self.init_snapshot.clone();

            if !self.handshake(sim)? {
                return Ok(false)
            }
        }

        if !self.paused {
            sim.apply_control_all();
        }

        Ok(true)
    }

    /// Execute a single command.
    fn execute(
        &mut self,
        cmd: Command,
        line: &str,
        sim: &mut Simulation,
        clock: &mut SimulationClock
    ) -> Result<Flow, ControllerError> {
        let num_joints = sim.robot().num_joints();
        let num_bodies = sim.robot().num_bodies();

        match cmd {
            Command::JointAll(target, value) => {
                for i in 0..num_joints {
                    sim.set_joint(i, target, value);
                }
            },
            Command::JointEach(target, values) => {
                for (i, v) in values.iter().take(num_joints).enumerate() {
                    sim.set_joint(i, target, *v);
                }
                if values.len() < num_joints {
                    warn!("Bad '{}' format: '{}'", joint_cmd_name(target, 'X'), line);
                }
            },
            Command::JointIndex(target, idx, value) => {
                if idx < num_joints {
                    sim.set_joint(idx, target, value);
                }
                else {
                    warn_out_of_range("joint", num_joints, line);
                }
            },
            Command::ImpulseAll(force) => {
                for i in 0..num_bodies {
                    sim.add_impulse(i, force);
                }
            },
            Command::ImpulseEach(forces) => {
                for (i, f) in forces.iter().take(num_bodies).enumerate() {
                    sim.add_impulse(i, *f);
                }
                if forces.len() < num_bodies {
                    warn!("Bad 'FX' format: '{}'", line);
                }
            },
            Command::ImpulseIndex(idx, force) => {
                if idx < num_bodies {
                    sim.add_impulse(idx, force);
                }
                else {
                    warn_out_of_range("body", num_bodies, line);
                }
            },
            Command::Gravity(enabled) => {
                info!("Gravity {}", if enabled { "on" } else { "off" });
                sim.set_gravity(enabled);
            },
            Command::Reset => {
                sim.restore(&self.init_snapshot);
                sim.reset_actuators();
                clock.reset();
            },
            Command::Save => {
                debug!("Saving state");
                self.user_snapshot = sim.capture();
            },
            Command::Restore => sim.restore(&self.user_snapshot),
            Command::NewTime => clock.reset(),
            Command::Record => self.record = true,
            Command::Pause => self.paused = true,
            Command::Done => return Ok(Flow::Done),
            Command::Exit => return Ok(Flow::Exit),
            Command::Model { id, params } => {
                let params = match params.len() {
                    0 => None,
                    NUM_ACTUATOR_PARAMS => match ActuatorParameters::from_slice(&params) {
                        Ok(p) => Some(p),
                        Err(e) => {
                            warn!("Ignoring actuator parameters of '{}': {}", line, e);
                            None
                        }
                    },
                    n => {
                        warn!(
                            "Ignoring {} model parameters, expected 0 or {}",
                            n, NUM_ACTUATOR_PARAMS
                        );
                        None
                    }
                };
                return Ok(Flow::Reload(id, params))
            },
            Command::Motor { params } => match ActuatorParameters::from_slice(&params) {
                Ok(p) => {
                    info!("Reinitialising the actuator model with {} parameters", params.len());
                    sim.reinit_params(p);
                },
                Err(e) => warn!("Bad 'MOTOR' parameters '{}': {}", line, e),
            },
            Command::Sensors(quality) => {
                info!("Setting {:?} sensor quality", quality);
                self.quality = quality;
            },
            Command::Fixed(idx) => {
                if idx < num_bodies {
                    if sim.toggle_fixed(idx) {
                        info!("Fixating body {}", idx);
                    }
                    else {
                        info!("Releasing body {}", idx);
                    }
                }
                else {
                    warn_out_of_range("body", num_bodies, line);
                }
            },
            Command::Description => {
                debug!("Robot description requested");
                self.stream.send(&sim.robot().description_message())?;
            },
        }

        Ok(Flow::Continue)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn joint_cmd_name(target: JointTarget, kind: char) -> String {
    let prefix = match target {
        JointTarget::Voltage => 'U',
        JointTarget::Position => 'P',
        JointTarget::MaxTorque => 'T',
    };
    format!("{}{}", prefix, kind)
}

fn warn_out_of_range(what: &str, len: usize, line: &str) {
    if len == 0 {
        warn!("No {} to address: '{}'", what, line);
    }
    else {
        warn!("{} index out of range (0...{}): '{}'", what, len - 1, line);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::actuator::{ActuatorConfig, ControlMode};
    use crate::params::SimExecParams;
    use crate::physics::SimpleWorld;
    use crate::robot::StandardModels;
    use comms_if::net::ReplayStream;
    use std::f64::consts::PI;
    use std::io::Cursor;

    type Replay = ReplayStream<Cursor<Vec<u8>>, Vec<u8>>;

    fn sim(robot: i32) -> Simulation {
        let params = SimExecParams { noise_seed: 1, ..Default::default() };
        Simulation::new(
            Box::new(SimpleWorld::new(true)),
            Box::new(StandardModels),
            ActuatorConfig::from(&params),
            robot,
            0
        ).unwrap()
    }

    fn controller(script: &str, sim: &Simulation) -> SessionController<Replay> {
        let stream = ReplayStream::new(Cursor::new(script.as_bytes().to_vec()), Vec::new());
        SessionController::new(LineStream::new(stream), sim)
    }

    fn output(ctrl: &SessionController<Replay>) -> String {
        String::from_utf8_lossy(ctrl.stream().get_ref().output()).into_owned()
    }

    #[test]
    fn test_handshake() {
        let sim = sim(91);
        let mut ctrl = controller("ACK\n", &sim);
        assert_eq!(ctrl.state(), SessionState::AwaitingHandshake);

        assert!(ctrl.handshake(&sim).unwrap());
        assert_eq!(ctrl.state(), SessionState::Active);
        assert_eq!(output(&ctrl), sim.robot().configuration().to_message());

        let mut ctrl = controller("NACK\n", &sim);
        assert!(!ctrl.handshake(&sim).unwrap());
        assert_eq!(ctrl.state(), SessionState::Terminated);
    }

    #[test]
    fn test_control_before_handshake() {
        let mut sim = sim(90);
        let mut clock = SimulationClock::new();
        let mut ctrl = controller("DONE\n", &sim);

        assert!(!ctrl.control(&mut sim, &mut clock).unwrap());
        assert_eq!(output(&ctrl), "");
    }

    #[test]
    fn test_joint_commands() {
        let mut sim = sim(91);
        let mut clock = SimulationClock::new();
        let mut ctrl = controller(
            "ACK\nPX 0.5\nTI 1 0.25\nPI 5 0.1\nTA 2.0\nTI 0 0.3\nDONE\n",
            &sim
        );
        ctrl.handshake(&sim).unwrap();

        assert!(ctrl.control(&mut sim, &mut clock).unwrap());

        let joints = sim.robot().joints();
        assert_eq!(joints[0].mode(), ControlMode::Position);
        assert_eq!(joints[0].pid_setpoint(), 0.5 * PI);

        // Short vector leaves the second joint alone
        assert_eq!(joints[1].mode(), ControlMode::Voltage);

        assert_eq!(joints[0].pid_max_torque(), 0.3);
        assert_eq!(joints[1].pid_max_torque(), 1.0);
    }

    #[test]
    fn test_pause_suppresses_telemetry() {
        let mut sim = sim(90);
        let mut clock = SimulationClock::new();
        let mut ctrl = controller("ACK\nPAUSE\nDONE\nDONE\nDONE\n", &sim);
        ctrl.handshake(&sim).unwrap();
        let config_len = output(&ctrl).len();

        assert!(ctrl.control(&mut sim, &mut clock).unwrap());
        assert!(ctrl.is_paused());
        let lines_after_first = output(&ctrl)[config_len..].lines().count();
        assert_eq!(lines_after_first, 1);

        // Paused step sends nothing
        assert!(ctrl.control(&mut sim, &mut clock).unwrap());
        assert!(!ctrl.is_paused());
        assert_eq!(output(&ctrl)[config_len..].lines().count(), 1);

        assert!(ctrl.control(&mut sim, &mut clock).unwrap());
        assert_eq!(output(&ctrl)[config_len..].lines().count(), 2);
    }

    #[test]
    fn test_flags_and_description() {
        let mut sim = sim(90);
        let mut clock = SimulationClock::new();
        let mut ctrl = controller(
            "ACK\nRECORD\nSENSORS POOR\nFIXED 1\nFIXED 9\nDESCRIPTION\nDONE\nDONE\n",
            &sim
        );
        ctrl.handshake(&sim).unwrap();
        let config_len = output(&ctrl).len();

        assert!(ctrl.control(&mut sim, &mut clock).unwrap());
        assert!(ctrl.record_requested());
        assert_eq!(ctrl.sensor_quality(), SensorQuality::Poor);
        assert!(sim.world().is_fixed(sim.robot().bodies()[1].id));
        assert!(output(&ctrl)[config_len..].ends_with("<EMPTY>\n"));

        // Recording is only for one step
        assert!(ctrl.control(&mut sim, &mut clock).unwrap());
        assert!(!ctrl.record_requested());
    }

    /// Accepts writes until a message containing `fail_on` is written.
    struct BrokenWriter {
        written: Vec<u8>,
        fail_on: &'static str,
    }

    impl std::io::Write for BrokenWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if String::from_utf8_lossy(buf).contains(self.fail_on) {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "client gone"))
            }
            self.written.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_description_send_failure_ends_session() {
        let mut sim = sim(90);
        let mut clock = SimulationClock::new();
        let stream = ReplayStream::new(
            Cursor::new(b"ACK\nDESCRIPTION\nDONE\n".to_vec()),
            BrokenWriter { written: Vec::new(), fail_on: "<EMPTY>" }
        );
        let mut ctrl = SessionController::new(LineStream::new(stream), &sim);
        assert!(ctrl.handshake(&sim).unwrap());

        assert!(matches!(
            ctrl.control(&mut sim, &mut clock),
            Err(ControllerError::Stream(_))
        ));
        assert_eq!(ctrl.state(), SessionState::Terminated);
        assert!(!ctrl.control(&mut sim, &mut clock).unwrap());
    }

    #[test]
    fn test_motor_command() {
        let mut sim = sim(90);
        let mut clock = SimulationClock::new();
        let p = ActuatorParameters::default().to_vec();
        let good: Vec<String> = p.iter().map(|v| v.to_string()).collect();

        let script = format!(
            "ACK\nMOTOR 3 1 2 3\nDONE\nMOTOR 10 {}\nDONE\n",
            good.join(" ")
        );
        let mut ctrl = controller(&script, &sim);
        ctrl.handshake(&sim).unwrap();

        assert!(ctrl.control(&mut sim, &mut clock).unwrap());
        assert_eq!(*sim.robot().joints()[0].params(), ActuatorParameters::SENSORIMOTOR);

        assert!(ctrl.control(&mut sim, &mut clock).unwrap());
        assert_eq!(*sim.robot().joints()[0].params(), ActuatorParameters::default());
    }

    #[test]
    fn test_exit_and_disconnect() {
        let mut sim = sim(90);
        let mut clock = SimulationClock::new();

        let mut ctrl = controller("ACK\nEXIT\n", &sim);
        ctrl.handshake(&sim).unwrap();
        assert!(!ctrl.control(&mut sim, &mut clock).unwrap());
        assert_eq!(ctrl.state(), SessionState::Terminated);
        assert!(!ctrl.control(&mut sim, &mut clock).unwrap());

        // End of stream reads as EXIT
        let mut ctrl = controller("ACK\nUA 0.1\n", &sim);
        ctrl.handshake(&sim).unwrap();
        assert!(!ctrl.control(&mut sim, &mut clock).unwrap());
    }
}
