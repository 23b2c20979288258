//! shardrelay - primary/secondary statement replication with table sharding
//!
//! A node is either the primary or a secondary. Writes accepted anywhere are
//! applied locally and then propagated as SQL statement text over a
//! length-framed TCP channel; the primary fans them out, secondaries forward
//! theirs to the primary. DML is routed to per-table shard backends.

pub mod backend;
pub mod cli;
pub mod control;
pub mod errors;
pub mod executor;
pub mod http_server;
pub mod node;
pub mod observability;
pub mod protocol;
pub mod replication;
pub mod sharding;
pub mod sql;
pub mod sync;
