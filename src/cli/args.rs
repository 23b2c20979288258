//! CLI argument definitions using clap
//!
//! Commands:
//! - shardrelay primary --config <path>
//! - shardrelay secondary --config <path> [--primary <addr>]
//! - shardrelay check-config --config <path>
//! - shardrelay default-config [--role primary|secondary]

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::replication::NodeRole;

/// shardrelay - primary/secondary statement replication with table sharding
#[derive(Parser, Debug)]
#[command(name = "shardrelay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the primary node
    Primary {
        /// Path to configuration file
        #[arg(long, default_value = "./shardrelay.json")]
        config: PathBuf,
    },

    /// Run a secondary node
    Secondary {
        /// Path to configuration file
        #[arg(long, default_value = "./shardrelay.json")]
        config: PathBuf,

        /// Primary to follow, `host` or `host:port`; overrides the config
        #[arg(long)]
        primary: Option<String>,
    },

    /// Load and validate a configuration file, then exit
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./shardrelay.json")]
        config: PathBuf,
    },

    /// Print a configuration skeleton
    DefaultConfig {
        #[arg(long, value_enum, default_value_t = RoleArg::Primary)]
        role: RoleArg,
    },
}

/// `--role` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Primary,
    Secondary,
}

impl From<RoleArg> for NodeRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Primary => NodeRole::Primary,
            RoleArg::Secondary => NodeRole::Secondary,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
