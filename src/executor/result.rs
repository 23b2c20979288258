//! Execution outcomes

use serde::Serialize;

/// Where a statement ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum Placement {
    /// The base backend
    Base,
    /// A shard backend chosen by the router
    Shard {
        index: usize,
        table: String,
        /// The router assigned the table during this call
        newly_assigned: bool,
    },
}

impl Placement {
    /// The `(table, index)` pair to announce, if this call created one.
    pub fn new_assignment(&self) -> Option<(&str, usize)> {
        match self {
            Placement::Shard {
                index,
                table,
                newly_assigned: true,
            } => Some((table.as_str(), *index)),
            _ => None,
        }
    }
}

/// Result of applying one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Backend-reported affected rows
    pub rows_affected: u64,
    pub placement: Placement,
}

impl Execution {
    pub fn on_base(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            placement: Placement::Base,
        }
    }
}
