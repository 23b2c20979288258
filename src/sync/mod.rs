//! Full-sync engine
//!
//! A secondary joining the cluster asks the primary for its whole state with
//! `FULL_SYNC|`. The primary answers with a stream of frames:
//!
//! ```text
//! SHARD_MAP|orders=0          one per known assignment
//! FULL_SYNC|<statements>      chunks of `;`-terminated statements
//! FULL_SYNC_END|<count>
//! ```
//!
//! The secondary replays every chunk before it starts serving replicated
//! statements. Replay is idempotent at the database level
//! (`CREATE DATABASE IF NOT EXISTS`) and tolerant of per-statement failure.

mod consumer;
mod errors;
mod producer;

pub use consumer::{ReplayReport, SnapshotReplayer};
pub use errors::{SyncError, SyncResult};
pub use producer::{insert_statements, produce_snapshot, ChunkPacker, SnapshotStream};

/// Default size bound of one `FULL_SYNC` chunk: 64 KiB
pub const DEFAULT_SYNC_CHUNK_BYTES: usize = 64 * 1024;
