//! # Telemetry module
//!
//! Messages sent from the simulation to the client:
//!
//! - The robot configuration, sent on connection and after every model change. The client must
//!   reply with a line starting with `ACK`.
//! - One telemetry line per simulation step, a space separated list of numbers.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::fmt::Write;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Prefix of the client's reply to a configuration message.
pub const ACK_PREFIX: &str = "ACK";

/// Description reported for robots without one.
pub const EMPTY_DESCRIPTION: &str = "<EMPTY>";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Description of a single joint as reported in the configuration message.
#[derive(Debug, Clone, PartialEq)]
pub struct JointDescriptor {
    pub index: usize,

    pub joint_type: JointType,

    /// Index of the joint this one mirrors, or its own index if it has no partner.
    pub symmetric_index: usize,

    /// Normalised lower stop
    pub stop_lo: f64,

    /// Normalised upper stop
    pub stop_hi: f64,

    /// Normalised default position
    pub default_position: f64,

    pub name: String,
}

/// The configuration message describing the robot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RobotConfiguration {
    pub num_accels: usize,

    pub joints: Vec<JointDescriptor>,

    /// Body names, in body index order
    pub body_names: Vec<String>,
}

/// Per body part of the telemetry
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyTelemetry {
    pub position: [f64; 3],
    pub velocity: [f64; 3],
}

/// One telemetry line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Telemetry {
    /// Simulation time in seconds
    pub time: f64,

    /// Normalised joint positions
    pub joint_positions: Vec<f64>,

    /// Normalised joint velocities
    pub joint_velocities: Vec<f64>,

    /// Normalised accelerations, `[left, forward, up]` per sensor
    pub accels: Vec<[f64; 3]>,

    pub bodies: Vec<BodyTelemetry>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointType {
    Normal = 0,
    Symmetric = 1,
}

#[derive(Debug, Error, PartialEq)]
pub enum TmParseError {
    #[error("Malformed configuration header: '{0}'")]
    BadHeader(String),

    #[error("Malformed joint descriptor: '{0}'")]
    BadJoint(String),

    #[error("Malformed body line: '{0}'")]
    BadBody(String),

    #[error("Expected {expected} telemetry values, found {found}")]
    BadTelemetryLength {
        expected: usize,
        found: usize,
    },

    #[error("Malformed telemetry value: '{0}'")]
    BadTelemetryValue(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl JointType {
    fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(JointType::Normal),
            1 => Some(JointType::Symmetric),
            _ => None
        }
    }
}

impl JointDescriptor {
    /// Format the descriptor as a configuration line, including the terminator.
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {} {}\n",
            self.index,
            self.joint_type as u32,
            self.symmetric_index,
            format_sci(self.stop_lo),
            format_sci(self.stop_hi),
            format_sci(self.default_position),
            self.name
        )
    }

    /// Parse a configuration line (without terminator).
    pub fn parse(line: &str) -> Result<Self, TmParseError> {
        let err = || TmParseError::BadJoint(line.to_string());
        let mut tokens = line.splitn(7, ' ');

        let mut next = || tokens.next().ok_or_else(err);

        let index: usize = next()?.parse().map_err(|_| err())?;
        let joint_type = next()?.parse().ok().and_then(JointType::from_code).ok_or_else(err)?;
        let symmetric_index: usize = next()?.parse().map_err(|_| err())?;
        let stop_lo: f64 = next()?.parse().map_err(|_| err())?;
        let stop_hi: f64 = next()?.parse().map_err(|_| err())?;
        let default_position: f64 = next()?.parse().map_err(|_| err())?;
        let name = next()?.to_string();

        Ok(Self {
            index,
            joint_type,
            symmetric_index,
            stop_lo,
            stop_hi,
            default_position,
            name,
        })
    }
}

impl RobotConfiguration {
    pub fn num_bodies(&self) -> usize {
        self.body_names.len()
    }

    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    /// Build the full configuration message.
    pub fn to_message(&self) -> String {
        let mut msg = format!(
            "{} {} {}\n",
            self.num_bodies(),
            self.num_joints(),
            self.num_accels
        );

        for joint in self.joints.iter() {
            msg.push_str(&joint.to_line());
        }

        for (i, name) in self.body_names.iter().enumerate() {
            let _ = writeln!(msg, "{} {}", i, name);
        }

        msg
    }

    /// Parse the header line into `(bodies, joints, accels)`.
    pub fn parse_header(line: &str) -> Result<(usize, usize, usize), TmParseError> {
        let err = || TmParseError::BadHeader(line.to_string());
        let counts: Vec<usize> = line
            .split_whitespace()
            .map(|t| t.parse().map_err(|_| err()))
            .collect::<Result<_, _>>()?;

        match counts.as_slice() {
            [b, j, a] => Ok((*b, *j, *a)),
            _ => Err(err())
        }
    }

    /// Parse a full configuration message, reading lines from `next_line` as needed.
    pub fn parse<F, E>(mut next_line: F) -> Result<Self, E>
    where
        F: FnMut() -> Result<String, E>,
        E: From<TmParseError>
    {
        let (num_bodies, num_joints, num_accels) = Self::parse_header(&next_line()?)?;

        let mut joints = Vec::with_capacity(num_joints);
        for _ in 0..num_joints {
            joints.push(JointDescriptor::parse(&next_line()?)?);
        }

        let mut body_names = Vec::with_capacity(num_bodies);
        for _ in 0..num_bodies {
            let line = next_line()?;
            match line.split_once(' ') {
                Some((_, name)) => body_names.push(name.to_string()),
                None => return Err(TmParseError::BadBody(line).into())
            }
        }

        Ok(Self { num_accels, joints, body_names })
    }
}

impl Telemetry {
    /// Number of values in a telemetry line for the given robot shape.
    pub fn num_values(num_joints: usize, num_accels: usize, num_bodies: usize) -> usize {
        1 + 2 * num_joints + 3 * num_accels + 6 * num_bodies
    }

    /// Format the telemetry as a line, each value followed by a space, including the terminator.
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(
            12 * Self::num_values(
                self.joint_positions.len(),
                self.accels.len(),
                self.bodies.len()
            )
        );

        let values = std::iter::once(&self.time)
            .chain(self.joint_positions.iter())
            .chain(self.joint_velocities.iter())
            .chain(self.accels.iter().flatten())
            .chain(self.bodies.iter().flat_map(|b| b.position.iter().chain(b.velocity.iter())));

        for v in values {
            let _ = write!(line, "{:.6} ", v);
        }
        line.push('\n');

        line
    }

    /// Parse a telemetry line for a robot of the given shape.
    pub fn parse(
        line: &str,
        num_joints: usize,
        num_accels: usize,
        num_bodies: usize
    ) -> Result<Self, TmParseError> {
        let values: Vec<f64> = line
            .split_whitespace()
            .map(|t| t.parse().map_err(|_| TmParseError::BadTelemetryValue(t.to_string())))
            .collect::<Result<_, _>>()?;

        let expected = Self::num_values(num_joints, num_accels, num_bodies);
        if values.len() != expected {
            return Err(TmParseError::BadTelemetryLength { expected, found: values.len() })
        }

        let (time, rest) = (values[0], &values[1..]);
        let (joint_positions, rest) = rest.split_at(num_joints);
        let (joint_velocities, rest) = rest.split_at(num_joints);
        let (accels, bodies) = rest.split_at(3 * num_accels);

        Ok(Self {
            time,
            joint_positions: joint_positions.to_vec(),
            joint_velocities: joint_velocities.to_vec(),
            accels: accels.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
            bodies: bodies
                .chunks_exact(6)
                .map(|c| BodyTelemetry {
                    position: [c[0], c[1], c[2]],
                    velocity: [c[3], c[4], c[5]],
                })
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Format a number in scientific notation with six decimals and a signed, at least two digit
/// exponent, e.g. `-1.000000e+00`.
pub fn format_sci(value: f64) -> String {
    let s = format!("{:.6e}", value);

    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        },
        // inf and NaN have no exponent
        None => s
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
