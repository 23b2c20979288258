//! Coordination wire protocol
//!
//! Primary and secondaries talk over one TCP connection per secondary. Every
//! logical message travels in its own length-prefixed frame, so a payload of
//! any size up to the configured bound arrives whole.
//!
//! Vocabulary:
//! - `FULL_SYNC|` asks for a snapshot; `FULL_SYNC|<statements>` carries one
//!   chunk of it and `FULL_SYNC_END|<count>` closes it
//! - `SHARD_MAP|<table>=<index>` announces one primary shard assignment
//! - `master|<statement>` is a setup command answered with `OK` / `Error: ..`
//! - `<database>|<statement>` is a replicated or forwarded statement
//! - anything else is a bare reply
//!
//! `FULL_SYNC`, `FULL_SYNC_END`, `SHARD_MAP` and `master` are reserved and
//! cannot be used as database names on the channel.

mod codec;
mod errors;
mod frame;

pub use codec::{FrameCodec, DEFAULT_MAX_FRAME_BYTES};
pub use errors::{ProtocolError, ProtocolResult};
pub use frame::{reply, Frame, FULL_SYNC, FULL_SYNC_END, SETUP, SHARD_MAP};
