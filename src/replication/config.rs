//! Coordination Configuration
//!
//! Settings for the primary/secondary channel. Loaded as the `coordination`
//! section of the node config; every field has a default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::broadcast::AckPolicy;
use super::errors::{ReplicationError, ReplicationResult};
use super::role::NodeRole;
use crate::protocol::{FrameCodec, DEFAULT_MAX_FRAME_BYTES};
use crate::sync::DEFAULT_SYNC_CHUNK_BYTES;

/// Default coordination port
pub const DEFAULT_COORDINATION_PORT: u16 = 8083;

/// Coordination channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Address the primary listens on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Primary to follow (secondaries only); `host` or `host:port`
    #[serde(default)]
    pub primary_address: Option<String>,

    /// Upper bound for one frame body
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Upper bound for one full-sync chunk
    #[serde(default = "default_sync_chunk_bytes")]
    pub sync_chunk_bytes: usize,

    /// Frames queued per peer before the peer is evicted
    #[serde(default = "default_outbound_queue_depth")]
    pub outbound_queue_depth: usize,

    /// How many peers must have written a broadcast before it returns
    #[serde(default)]
    pub ack_policy: AckPolicy,

    /// Bound on the acknowledgment wait
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Secondary requests a full sync right after connecting
    #[serde(default = "default_true")]
    pub full_sync_on_start: bool,

    /// Primary announces its shard assignments to secondaries
    #[serde(default = "default_true")]
    pub share_shard_map: bool,
}

fn default_listen_addr() -> String {
    format!("0.0.0.0:{}", DEFAULT_COORDINATION_PORT)
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

fn default_sync_chunk_bytes() -> usize {
    DEFAULT_SYNC_CHUNK_BYTES
}

fn default_outbound_queue_depth() -> usize {
    1024
}

fn default_ack_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            primary_address: None,
            max_frame_bytes: default_max_frame_bytes(),
            sync_chunk_bytes: default_sync_chunk_bytes(),
            outbound_queue_depth: default_outbound_queue_depth(),
            ack_policy: AckPolicy::default(),
            ack_timeout_ms: default_ack_timeout_ms(),
            full_sync_on_start: true,
            share_shard_map: true,
        }
    }
}

impl CoordinationConfig {
    /// Validate against the node's role.
    ///
    /// A secondary needs a primary address; a primary must not have one.
    pub fn validate(&self, role: NodeRole) -> ReplicationResult<()> {
        match role {
            NodeRole::Primary if self.primary_address.is_some() => {
                return Err(ReplicationError::config(
                    "primary must not have primary_address configured",
                ));
            }
            NodeRole::Secondary
                if self
                    .primary_address
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or("")
                    .is_empty() =>
            {
                return Err(ReplicationError::config(
                    "secondary requires primary_address to be configured",
                ));
            }
            _ => {}
        }

        if self.max_frame_bytes == 0 {
            return Err(ReplicationError::config("max_frame_bytes must be > 0"));
        }
        if self.sync_chunk_bytes == 0 || self.sync_chunk_bytes > self.max_frame_bytes {
            return Err(ReplicationError::config(
                "sync_chunk_bytes must be > 0 and <= max_frame_bytes",
            ));
        }
        if self.outbound_queue_depth == 0 {
            return Err(ReplicationError::config("outbound_queue_depth must be > 0"));
        }

        Ok(())
    }

    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new(self.max_frame_bytes)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Primary endpoint with the default port filled in.
    pub fn primary_endpoint(&self) -> Option<String> {
        self.primary_address
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(with_default_port)
    }
}

/// Append the coordination port when `addr` has none.
pub fn with_default_port(addr: &str) -> String {
    let has_port = match addr.rsplit_once(':') {
        // bracketed IPv6 without a port ends in `]`
        Some((host, port)) => !port.is_empty() && !host.is_empty() && !port.contains(']'),
        None => false,
    };
    if has_port {
        addr.to_string()
    } else {
        format!("{}:{}", addr, DEFAULT_COORDINATION_PORT)
    }
}
