//! # Command module
//!
//! Commands are single ASCII lines sent by the client. Each command is identified by a fixed
//! literal prefix, the prefixes are tried in a fixed order and the first match wins, so for
//! example any line starting with `RESET` is a reset command.
//!
//! Vector commands (`UX`, `PX`, `TX`, `FX`) are parsed value by value and stop at the first
//! value which is not a number. The values read up to that point are kept, it is up to the
//! simulation to decide what to do with a short vector.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use std::str::FromStr;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A three dimensional force, `[x, y, z]`
pub type Force = [f64; 3];

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The joint quantity which a joint command sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointTarget {
    /// Motor voltage (`U`), normalised to `[-1, 1]`
    Voltage,

    /// PID position setpoint (`P`), normalised to `[-1, 1]`
    Position,

    /// PID torque limit (`T`), normalised to `[0, 1]`
    MaxTorque,
}

/// Which sensor degradation pipeline readings go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorQuality {
    /// 16 bit resolution with small noise
    Good,

    /// 10 bit resolution with larger noise
    Poor,
}

/// A command sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `UA`, `PA`, `TA`: one value for every joint
    JointAll(JointTarget, f64),

    /// `UX`, `PX`, `TX`: one value per joint, in joint order
    JointEach(JointTarget, Vec<f64>),

    /// `UI`, `PI`, `TI`: a value for a single joint
    JointIndex(JointTarget, usize, f64),

    /// `FA`: the same impulse on every body
    ImpulseAll(Force),

    /// `FX`: one impulse per body, in body order
    ImpulseEach(Vec<Force>),

    /// `FI`: an impulse on a single body
    ImpulseIndex(usize, Force),

    /// `GRAVITY ON`, `GRAVITY OFF`
    Gravity(bool),

    /// Restore the initial snapshot, reset the actuators and the clock
    Reset,

    /// Capture the user snapshot
    Save,

    /// Restore the user snapshot
    Restore,

    /// Zero the simulation clock
    NewTime,

    /// Flag this step for frame capture
    Record,

    /// Suspend physics and telemetry for the next step
    Pause,

    /// End of the command batch for this step
    Done,

    /// End the session
    Exit,

    /// Rebuild the robot from a new model
    Model {
        id: i32,
        params: Vec<f64>,
    },

    /// Replace the actuator parameters of every joint
    Motor {
        params: Vec<f64>,
    },

    /// `SENSORS GOOD`, `SENSORS POOR`
    Sensors(SensorQuality),

    /// Toggle the fixed-to-world constraint of a body
    Fixed(usize),

    /// Request the robot's description string
    Description,
}

/// Errors which can occur while parsing a command line.
#[derive(Debug, Error, PartialEq)]
pub enum CommandParseError {
    #[error("Unknown command: '{0}'")]
    Unrecognised(String),

    #[error("Bad '{cmd}' format: '{line}'")]
    BadFormat {
        cmd: &'static str,
        line: String,
    },
}

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Command prefixes in matching order.
const PREFIXES: [&str; 28] = [
    "UX ", "UA ", "UI ",
    "PX ", "PA ", "PI ",
    "TX ", "TA ", "TI ",
    "FX ", "FA ", "FI ",
    "GRAVITY ON", "GRAVITY OFF",
    "RESET", "SAVE", "RESTORE", "NEWTIME",
    "RECORD", "PAUSE", "DONE", "EXIT",
    "MODEL", "MOTOR",
    "SENSORS POOR", "SENSORS GOOD",
    "FIXED", "DESCRIPTION",
];

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Command {
    /// Parse a single line (without its terminator) into a command.
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        let prefix = match PREFIXES.iter().find(|p| line.starts_with(*p)) {
            Some(p) => *p,
            None => return Err(CommandParseError::Unrecognised(line.to_string()))
        };

        let args = &line[prefix.len()..];
        let bad_format = || CommandParseError::BadFormat {
            cmd: prefix.trim_end(),
            line: line.to_string()
        };

        let cmd = match prefix {
            "UX " => Command::JointEach(JointTarget::Voltage, scan_vector(args)),
            "PX " => Command::JointEach(JointTarget::Position, scan_vector(args)),
            "TX " => Command::JointEach(JointTarget::MaxTorque, scan_vector(args)),

            "UA " => Command::JointAll(JointTarget::Voltage, scan_one(args).ok_or_else(bad_format)?),
            "PA " => Command::JointAll(JointTarget::Position, scan_one(args).ok_or_else(bad_format)?),
            "TA " => Command::JointAll(JointTarget::MaxTorque, scan_one(args).ok_or_else(bad_format)?),

            "UI " | "PI " | "TI " => {
                let target = match prefix {
                    "UI " => JointTarget::Voltage,
                    "PI " => JointTarget::Position,
                    _ => JointTarget::MaxTorque
                };
                let mut tokens = args.split_whitespace();
                let idx = next_token(&mut tokens).ok_or_else(bad_format)?;
                let value = next_number(&mut tokens).ok_or_else(bad_format)?;
                Command::JointIndex(target, idx, value)
            },

            "FX " => Command::ImpulseEach(
                scan_vector(args)
                    .chunks_exact(3)
                    .map(|c| [c[0], c[1], c[2]])
                    .collect()
            ),
            "FA " => {
                let mut tokens = args.split_whitespace();
                Command::ImpulseAll(next_force(&mut tokens).ok_or_else(bad_format)?)
            },
            "FI " => {
                let mut tokens = args.split_whitespace();
                let idx = next_token(&mut tokens).ok_or_else(bad_format)?;
                let force = next_force(&mut tokens).ok_or_else(bad_format)?;
                Command::ImpulseIndex(idx, force)
            },

            "GRAVITY ON" => Command::Gravity(true),
            "GRAVITY OFF" => Command::Gravity(false),
            "RESET" => Command::Reset,
            "SAVE" => Command::Save,
            "RESTORE" => Command::Restore,
            "NEWTIME" => Command::NewTime,
            "RECORD" => Command::Record,
            "PAUSE" => Command::Pause,
            "DONE" => Command::Done,
            "EXIT" => Command::Exit,

            "MODEL" => {
                let mut tokens = args.split_whitespace();
                let id: i32 = next_token(&mut tokens).ok_or_else(bad_format)?;
                let n: usize = next_token(&mut tokens).ok_or_else(bad_format)?;

                // The model is rebuilt even when its parameter list is unusable
                let params = read_params(&mut tokens, n).unwrap_or_else(|| {
                    warn!("Bad 'MODEL' parameters, rebuilding with defaults: '{}'", line);
                    Vec::new()
                });
                Command::Model { id, params }
            },
            "MOTOR" => {
                let mut tokens = args.split_whitespace();
                let params = counted_params(&mut tokens).ok_or_else(bad_format)?;
                Command::Motor { params }
            },

            "SENSORS POOR" => Command::Sensors(SensorQuality::Poor),
            "SENSORS GOOD" => Command::Sensors(SensorQuality::Good),

            "FIXED" => {
                let mut tokens = args.split_whitespace();
                Command::Fixed(next_token(&mut tokens).ok_or_else(bad_format)?)
            },
            "DESCRIPTION" => Command::Description,

            _ => return Err(CommandParseError::Unrecognised(line.to_string()))
        };

        Ok(cmd)
    }
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Parse a finite number, non-finite values are treated as malformed.
fn parse_number(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn next_number<'a, I: Iterator<Item = &'a str>>(tokens: &mut I) -> Option<f64> {
    tokens.next().and_then(parse_number)
}

fn next_token<'a, T: FromStr, I: Iterator<Item = &'a str>>(tokens: &mut I) -> Option<T> {
    tokens.next().and_then(|t| t.parse().ok())
}

fn next_force<'a, I: Iterator<Item = &'a str>>(tokens: &mut I) -> Option<Force> {
    Some([next_number(tokens)?, next_number(tokens)?, next_number(tokens)?])
}

/// The first value of the arguments, anything after it is ignored.
fn scan_one(args: &str) -> Option<f64> {
    next_number(&mut args.split_whitespace())
}

/// Read numbers until the end of the line or the first malformed value.
fn scan_vector(args: &str) -> Vec<f64> {
    args.split_whitespace()
        .map(parse_number)
        .take_while(Option::is_some)
        .flatten()
        .collect()
}

/// Read a count `n` followed by exactly `n` numbers. Anything after the `n`th number is ignored.
fn counted_params<'a, I: Iterator<Item = &'a str>>(tokens: &mut I) -> Option<Vec<f64>> {
    let n: usize = next_token(tokens)?;
    read_params(tokens, n)
}

/// Read exactly `n` numbers.
fn read_params<'a, I: Iterator<Item = &'a str>>(tokens: &mut I, n: usize) -> Option<Vec<f64>> {
    (0..n).map(|_| next_number(tokens)).collect()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
