//! # warden-cli
//!
//! Command-line interface for Warden.
//!
//! ## Commands
//!
//! - `warden check-config`: Validate the configuration and list warnings
//! - `warden show-config`: Print the effective configuration
//! - `warden tripwire`: Run the tripwire suite against the reference validator
//! - `warden simulate`: Push a scripted request through an in-process gatekeeper

pub mod commands;

pub use commands::Cli;
pub use commands::simulate::{EchoExecutor, Simulation, run_simulation};
