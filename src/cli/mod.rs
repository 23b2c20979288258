//! CLI module for shardrelay
//!
//! Provides command-line interface for:
//! - primary: run the primary node
//! - secondary: run a secondary node
//! - check-config: validate a config file
//! - default-config: print a config skeleton

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, RoleArg};
pub use commands::{check_config, default_config, primary, run, run_command, secondary};
pub use errors::{CliError, CliErrorCode, CliResult};
