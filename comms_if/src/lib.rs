//! # Communications interface crate.
//!
//! Provides the line-oriented protocol spoken between the simulation server
//! and its control client.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Commands sent from the client to the simulation
pub mod cmd;

/// Telemetry and configuration messages sent from the simulation to the client
pub mod tm;

/// Network module
pub mod net;
