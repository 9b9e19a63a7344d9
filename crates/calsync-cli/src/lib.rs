//! Command-line host for the calsync engine: sources, sign-in, calendars, events
//!
//! This crate provides the `calsync` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use config::CliConfig;
pub use error::{CliError, CliResult};
