//! Logical messages of the coordination channel
//!
//! A message is `verb|payload`, split on the first `|` only, or a bare reply.

use std::fmt;

use super::errors::{ProtocolError, ProtocolResult};
use crate::sql::is_valid_identifier;

pub const FULL_SYNC: &str = "FULL_SYNC";
pub const FULL_SYNC_END: &str = "FULL_SYNC_END";
pub const SHARD_MAP: &str = "SHARD_MAP";
pub const SETUP: &str = "master";

const DELIMITER: char = '|';

/// One message on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `FULL_SYNC|` with an empty payload
    FullSyncRequest,

    /// `FULL_SYNC|<statements>`: one chunk of a snapshot
    FullSyncChunk(String),

    /// `FULL_SYNC_END|<count>`: snapshot finished after `count` statements
    FullSyncEnd(u64),

    /// `SHARD_MAP|<table>=<index>`
    ShardMap { table: String, index: usize },

    /// `master|<statement>`: setup command, answered with `OK` or `Error: ..`
    Setup(String),

    /// `<database>|<statement>`
    Statement { database: String, statement: String },

    /// Anything without a usable verb: `OK`, `Error: ..`, `Invalid request` ..
    Reply(String),
}

impl Frame {
    pub fn statement(database: impl Into<String>, statement: impl Into<String>) -> Self {
        Frame::Statement {
            database: database.into(),
            statement: statement.into(),
        }
    }

    pub fn reply(text: impl Into<String>) -> Self {
        Frame::Reply(text.into())
    }

    /// Parse a frame body.
    ///
    /// A verb that is not an identifier makes the whole body a reply, so
    /// reply text that happens to contain `|` is never taken for a statement.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let Some((verb, payload)) = text.split_once(DELIMITER) else {
            return Ok(Frame::Reply(text.to_string()));
        };
        if !is_valid_identifier(verb) {
            return Ok(Frame::Reply(text.to_string()));
        }

        match verb {
            FULL_SYNC if payload.is_empty() => Ok(Frame::FullSyncRequest),
            FULL_SYNC => Ok(Frame::FullSyncChunk(payload.to_string())),
            FULL_SYNC_END => payload
                .trim()
                .parse()
                .map(Frame::FullSyncEnd)
                .map_err(|_| invalid_payload(verb, payload)),
            SHARD_MAP => {
                let (table, index) = payload
                    .split_once('=')
                    .ok_or_else(|| invalid_payload(verb, payload))?;
                let index = index
                    .trim()
                    .parse()
                    .map_err(|_| invalid_payload(verb, payload))?;
                if table.is_empty() {
                    return Err(invalid_payload(verb, payload));
                }
                Ok(Frame::ShardMap {
                    table: table.to_string(),
                    index,
                })
            }
            SETUP => Ok(Frame::Setup(payload.to_string())),
            _ => Ok(Frame::statement(verb, payload)),
        }
    }

    /// Text carried inside the length prefix.
    pub fn to_text(&self) -> String {
        match self {
            Frame::FullSyncRequest => format!("{}{}", FULL_SYNC, DELIMITER),
            Frame::FullSyncChunk(chunk) => format!("{}{}{}", FULL_SYNC, DELIMITER, chunk),
            Frame::FullSyncEnd(count) => format!("{}{}{}", FULL_SYNC_END, DELIMITER, count),
            Frame::ShardMap { table, index } => {
                format!("{}{}{}={}", SHARD_MAP, DELIMITER, table, index)
            }
            Frame::Setup(statement) => format!("{}{}{}", SETUP, DELIMITER, statement),
            Frame::Statement {
                database,
                statement,
            } => format!("{}{}{}", database, DELIMITER, statement),
            Frame::Reply(text) => text.clone(),
        }
    }

    /// Whether the frame belongs to a full-sync stream.
    pub fn is_sync(&self) -> bool {
        matches!(
            self,
            Frame::FullSyncChunk(_) | Frame::FullSyncEnd(_) | Frame::ShardMap { .. }
        )
    }

    pub fn verb(&self) -> &str {
        match self {
            Frame::FullSyncRequest | Frame::FullSyncChunk(_) => FULL_SYNC,
            Frame::FullSyncEnd(_) => FULL_SYNC_END,
            Frame::ShardMap { .. } => SHARD_MAP,
            Frame::Setup(_) => SETUP,
            Frame::Statement { database, .. } => database,
            Frame::Reply(_) => "",
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn invalid_payload(verb: &str, payload: &str) -> ProtocolError {
    ProtocolError::InvalidPayload {
        verb: verb.to_string(),
        payload: payload.to_string(),
    }
}

/// Reply texts exchanged as bare frames.
pub mod reply {
    pub const OK: &str = "OK";
    pub const INVALID_REQUEST: &str = "Invalid request";
    pub const MASTER_ONLY: &str = "Error: CREATE and DROP are master-only operations";

    pub fn error(message: impl std::fmt::Display) -> String {
        format!("Error: {}", message)
    }

    pub fn rows_affected(rows: u64) -> String {
        format!("Query executed: Rows affected: {}", rows)
    }

    pub fn execution_failed(message: impl std::fmt::Display) -> String {
        format!("Error executing query: {}", message)
    }

    pub fn selection_failed(message: impl std::fmt::Display) -> String {
        format!("Error selecting database: {}", message)
    }

    pub fn sync_failed(message: impl std::fmt::Display) -> String {
        format!("Error syncing databases: {}", message)
    }

    /// Every failure reply starts with `Error`.
    pub fn is_error(text: &str) -> bool {
        text.starts_with("Error")
    }

    /// Answer to a setup command: `OK` or an error.
    pub fn is_setup_ack(text: &str) -> bool {
        text == OK || is_error(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_first_delimiter_only() {
        let frame = Frame::parse("ecommerce|SELECT 'a|b' FROM orders").unwrap();
        assert_eq!(
            frame,
            Frame::statement("ecommerce", "SELECT 'a|b' FROM orders")
        );
    }

    #[test]
    fn test_full_sync_request_and_chunk() {
        assert_eq!(Frame::parse("FULL_SYNC|").unwrap(), Frame::FullSyncRequest);
        assert_eq!(
            Frame::parse("FULL_SYNC|USE shop;").unwrap(),
            Frame::FullSyncChunk("USE shop;".to_string())
        );
        assert_eq!(Frame::parse("FULL_SYNC_END|12").unwrap(), Frame::FullSyncEnd(12));
    }

    #[test]
    fn test_shard_map() {
        assert_eq!(
            Frame::parse("SHARD_MAP|orders=1").unwrap(),
            Frame::ShardMap {
                table: "orders".to_string(),
                index: 1
            }
        );
        assert!(matches!(
            Frame::parse("SHARD_MAP|orders"),
            Err(ProtocolError::InvalidPayload { .. })
        ));
        assert!(Frame::parse("SHARD_MAP|orders=x").is_err());
    }

    #[test]
    fn test_setup_frame() {
        assert_eq!(
            Frame::parse("master|CREATE DATABASE IF NOT EXISTS shard1").unwrap(),
            Frame::Setup("CREATE DATABASE IF NOT EXISTS shard1".to_string())
        );
    }

    #[test]
    fn test_bare_replies() {
        assert_eq!(Frame::parse("ecommerce").unwrap(), Frame::reply("ecommerce"));
        assert_eq!(Frame::parse("OK").unwrap(), Frame::reply("OK"));
        // a reply that quotes a statement is still a reply
        let text = "Error executing query: near \"x|y\": syntax error";
        assert_eq!(Frame::parse(text).unwrap(), Frame::reply(text));
    }

    #[test]
    fn test_text_form_parses_back() {
        let frames = [
            Frame::FullSyncRequest,
            Frame::FullSyncEnd(3),
            Frame::ShardMap {
                table: "users".to_string(),
                index: 0,
            },
            Frame::statement("db", "DELETE FROM t"),
        ];
        for frame in frames {
            assert_eq!(Frame::parse(&frame.to_text()).unwrap(), frame);
        }
    }

    #[test]
    fn test_reply_helpers() {
        assert_eq!(reply::rows_affected(2), "Query executed: Rows affected: 2");
        assert!(reply::is_error(reply::MASTER_ONLY));
        assert!(reply::is_error(&reply::sync_failed("disk")));
        assert!(!reply::is_error(reply::OK));
        assert!(reply::is_setup_ack(reply::OK));
        assert!(reply::is_setup_ack("Error: no space"));
        assert!(!reply::is_setup_ack("ecommerce"));
        assert!(!reply::is_setup_ack(&reply::rows_affected(1)));
    }
}
