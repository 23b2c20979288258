//! # Node
//!
//! Assembles one process: storage backends, shard router, executor,
//! coordination channel (listener on the primary, link on a secondary) and
//! the control API. Startup order on a secondary is connect, full sync, then
//! serve; a failed full sync stops the node before the control API opens.

mod config;
mod errors;
mod runner;

pub use config::{NodeConfig, ShardConfig, StorageConfig, MAX_SHARDS};
pub use errors::{NodeError, NodeResult};
pub use runner::{build_executor, run, run_until};
