//! Node configuration
//!
//! One JSON file per node. Every section and field is optional except
//! `role`; a secondary additionally needs `coordination.primary_address`
//! (or `--primary` on the command line).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::{NodeError, NodeResult};
use crate::http_server::HttpServerConfig;
use crate::observability::LogConfig;
use crate::replication::{with_default_port, CoordinationConfig, NodeRole};
use crate::sql::is_valid_identifier;

/// Upper bound on configured shards
pub const MAX_SHARDS: usize = 64;

/// Local storage of the base backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one file per database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Keep every database in memory; `data_dir` is ignored
    #[serde(default)]
    pub in_memory: bool,

    /// Apply DDL and database lifecycle commands to shards as well
    #[serde(default = "default_true")]
    pub mirror_schema_to_shards: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            in_memory: false,
            mirror_schema_to_shards: true,
        }
    }
}

/// One shard backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub name: String,

    /// Defaults to `<storage.data_dir>/<name>`
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Whole node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub role: NodeRole,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Shard backends in index order
    #[serde(default)]
    pub shards: Vec<ShardConfig>,

    #[serde(default)]
    pub coordination: CoordinationConfig,

    #[serde(default)]
    pub control: HttpServerConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl NodeConfig {
    /// Skeleton config for `role`, printed by `default-config`.
    pub fn for_role(role: NodeRole) -> Self {
        let mut config = Self {
            role,
            storage: StorageConfig::default(),
            shards: vec![
                ShardConfig {
                    name: "shard1".to_string(),
                    data_dir: None,
                },
                ShardConfig {
                    name: "shard2".to_string(),
                    data_dir: None,
                },
            ],
            coordination: CoordinationConfig::default(),
            control: HttpServerConfig::default(),
            log: LogConfig::default(),
        };
        if role == NodeRole::Secondary {
            config.coordination.primary_address = Some("127.0.0.1".to_string());
            config.control.port = 8082;
        }
        config
    }

    /// Load configuration from file; the result is not validated yet.
    pub fn load(path: &Path) -> NodeResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| NodeError::config(format!("Failed to read config: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| NodeError::config(format!("Invalid config JSON: {}", e)))
    }

    /// Replace the primary address, filling in the default port.
    pub fn override_primary(&mut self, addr: &str) {
        self.coordination.primary_address = Some(with_default_port(addr.trim()));
    }

    pub fn validate(&self) -> NodeResult<()> {
        self.coordination
            .validate(self.role)
            .map_err(|e| NodeError::config(e.to_string()))?;

        if self.shards.len() > MAX_SHARDS {
            return Err(NodeError::config(format!(
                "at most {} shards are supported, got {}",
                MAX_SHARDS,
                self.shards.len()
            )));
        }

        let mut seen = HashSet::new();
        for shard in &self.shards {
            if !is_valid_identifier(&shard.name) {
                return Err(NodeError::config(format!(
                    "invalid shard name '{}'",
                    shard.name
                )));
            }
            if !seen.insert(shard.name.as_str()) {
                return Err(NodeError::config(format!(
                    "duplicate shard name '{}'",
                    shard.name
                )));
            }
        }

        if self.control.enabled && self.control.port == 0 {
            return Err(NodeError::config("control.port must be > 0"));
        }

        Ok(())
    }

    /// Data directory of shard `index`.
    pub fn shard_dir(&self, index: usize) -> Option<PathBuf> {
        self.shards.get(index).map(|shard| {
            shard
                .data_dir
                .clone()
                .unwrap_or_else(|| self.storage.data_dir.join(&shard.name))
        })
    }

    pub fn shard_names(&self) -> impl Iterator<Item = &str> {
        self.shards.iter().map(|shard| shard.name.as_str())
    }
}
