//! Table-to-shard assignment

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::observability::Event;

/// How an unseen table gets its shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// `assigned tables % shard count` (primary)
    RoundRobin,
    /// Always shard 0 (secondary)
    FirstShard,
}

/// Outcome of [`ShardRouter::pin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    /// Table was unknown and now has the given index
    Assigned,
    /// Table already had this index
    Unchanged,
    /// Table keeps its existing, different index
    Diverged { kept: usize },
    /// Index is not a configured shard
    OutOfRange,
}

/// Result of routing one table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub index: usize,
    /// The table had no assignment before this call
    pub newly_assigned: bool,
}

/// Maps table names to shard indices.
///
/// Assignments are created lazily, are never removed and live only in this
/// process. Table names are case-sensitive.
#[derive(Debug)]
pub struct ShardRouter {
    shard_count: usize,
    policy: AllocationPolicy,
    assignments: Mutex<HashMap<String, usize>>,
}

impl ShardRouter {
    pub fn new(shard_count: usize, policy: AllocationPolicy) -> Self {
        Self {
            shard_count,
            policy,
            assignments: Mutex::new(HashMap::new()),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    pub fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    /// Routing is disabled when no shards are configured.
    pub fn is_enabled(&self) -> bool {
        self.shard_count > 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.assignments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Shard for `table`, assigning one if the table is new.
    ///
    /// Returns `None` when routing is disabled.
    pub fn route(&self, table: &str) -> Option<Route> {
        if !self.is_enabled() {
            return None;
        }

        let mut assignments = self.lock();
        if let Some(&index) = assignments.get(table) {
            return Some(Route {
                index,
                newly_assigned: false,
            });
        }

        let index = match self.policy {
            AllocationPolicy::RoundRobin => assignments.len() % self.shard_count,
            AllocationPolicy::FirstShard => 0,
        };
        assignments.insert(table.to_string(), index);
        debug!(event = %Event::ShardAssigned, table, shard = index, "assigned table to shard");

        Some(Route {
            index,
            newly_assigned: true,
        })
    }

    /// Current assignment, if any. Never assigns.
    pub fn lookup(&self, table: &str) -> Option<usize> {
        self.lock().get(table).copied()
    }

    /// Record an assignment announced by the primary.
    ///
    /// An existing assignment is kept even when it differs.
    pub fn pin(&self, table: &str, index: usize) -> PinOutcome {
        if index >= self.shard_count {
            warn!(table, shard = index, shard_count = self.shard_count, "announced shard index out of range");
            return PinOutcome::OutOfRange;
        }

        let mut assignments = self.lock();
        match assignments.get(table) {
            Some(&kept) if kept == index => PinOutcome::Unchanged,
            Some(&kept) => {
                warn!(
                    event = %Event::ShardDivergence,
                    table,
                    local = kept,
                    announced = index,
                    "table already assigned to a different shard"
                );
                PinOutcome::Diverged { kept }
            }
            None => {
                assignments.insert(table.to_string(), index);
                debug!(event = %Event::ShardAssigned, table, shard = index, "pinned announced assignment");
                PinOutcome::Assigned
            }
        }
    }

    /// Sorted copy of every assignment.
    pub fn snapshot(&self) -> BTreeMap<String, usize> {
        self.lock()
            .iter()
            .map(|(table, index)| (table.clone(), *index))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
