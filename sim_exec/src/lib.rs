//! # Simulation library.
//!
//! This library provides the simulation server: the actuator and sensor models of the simulated
//! robots, the session protocol spoken with the control client and the scheduler stepping it all.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Actuator module - friction, motor and PID models of the robot's joints and their sensors
pub mod actuator;

/// Session controller - executes client commands and sends telemetry
pub mod controller;

/// Parameters of the simulation executable
pub mod params;

/// Physics backend interface and the built-in headless world
pub mod physics;

/// Robot module - robots, their accelerometers and the standard model library
pub mod robot;

/// Scheduler - drives physics, controller and real time pacing
pub mod scheduler;

/// Simulation - the world together with the robot and scene built in it
pub mod sim;

/// Snapshots of the kinematic state of every body
pub mod snapshot;
