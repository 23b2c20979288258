//! CLI command implementations
//!
//! `primary` and `secondary` load the config, install logging, build a tokio
//! runtime and run the node until Ctrl-C. `check-config` and `default-config`
//! only print JSON.

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::node::{self, NodeConfig};
use crate::observability::{init_logging, Event};
use crate::replication::NodeRole;

use super::args::{Command, RoleArg};
use super::errors::{CliError, CliResult};
use super::io::{write_json, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Primary { config } => primary(&config),
        Command::Secondary { config, primary } => secondary(&config, primary.as_deref()),
        Command::CheckConfig { config } => check_config(&config),
        Command::DefaultConfig { role } => default_config(role),
    }
}

/// Run the primary node
pub fn primary(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path, NodeRole::Primary, None)?;
    serve(config)
}

/// Run a secondary node, optionally overriding the primary address
pub fn secondary(config_path: &Path, primary: Option<&str>) -> CliResult<()> {
    let config = load_config(config_path, NodeRole::Secondary, primary)?;
    serve(config)
}

/// Summary printed by `check-config`
#[derive(Debug, Serialize)]
struct ConfigSummary {
    role: NodeRole,
    shards: Vec<String>,
    coordination_addr: String,
    control_addr: Option<String>,
}

/// Validate a config file and print what it describes
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = NodeConfig::load(config_path)?;
    config.validate()?;

    let coordination_addr = match config.role {
        NodeRole::Primary => config.coordination.listen_addr.clone(),
        NodeRole::Secondary => config.coordination.primary_endpoint().unwrap_or_default(),
    };
    let summary = ConfigSummary {
        role: config.role,
        shards: config.shard_names().map(str::to_string).collect(),
        coordination_addr,
        control_addr: config
            .control
            .enabled
            .then(|| config.control.socket_addr()),
    };
    write_response(&summary)
}

/// Print a config skeleton for `role`
pub fn default_config(role: RoleArg) -> CliResult<()> {
    write_json(&NodeConfig::for_role(role.into()))
}

fn load_config(path: &Path, expected: NodeRole, primary: Option<&str>) -> CliResult<NodeConfig> {
    let mut config = NodeConfig::load(path)?;
    if config.role != expected {
        return Err(CliError::role_mismatch(expected.as_str(), config.role.as_str()));
    }
    if let Some(addr) = primary {
        config.override_primary(addr);
    }
    config.validate()?;
    Ok(config)
}

fn serve(config: NodeConfig) -> CliResult<()> {
    init_logging(&config.log);
    info!(event = %Event::ConfigLoaded, role = %config.role, "configuration loaded");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::boot_failed(format!("Failed to start runtime: {}", e)))?;

    runtime.block_on(node::run(config))?;
    Ok(())
}
