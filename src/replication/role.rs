//! Node role
//!
//! A node is configured as the primary or as a secondary at startup; the role
//! never changes while the process runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sharding::AllocationPolicy;

/// Replication role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Accepts secondaries, serves full syncs, fans writes out
    Primary,
    /// Follows one primary, forwards its own writes to it
    Secondary,
}

impl NodeRole {
    pub fn is_primary(&self) -> bool {
        matches!(self, NodeRole::Primary)
    }

    /// How this role assigns shards to tables it has not seen.
    pub fn allocation_policy(&self) -> AllocationPolicy {
        match self {
            NodeRole::Primary => AllocationPolicy::RoundRobin,
            NodeRole::Secondary => AllocationPolicy::FirstShard,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Primary => "primary",
            NodeRole::Secondary => "secondary",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
