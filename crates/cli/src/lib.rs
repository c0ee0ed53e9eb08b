//! Command-line front end for the bus.
//!
//! Provides commands for:
//! - Running a root node or a child node over TCP
//! - Calling a published object
//! - Emitting and listening to signals

pub mod commands;
pub mod config;

pub use commands::Command;
pub use config::CliConfig;
