//! Lightweight SQL handling
//!
//! Statements travel between nodes as verbatim text. Nothing here parses SQL
//! into a plan; this module only answers the questions the coordination layer
//! needs answered:
//! - what kind of statement is this, and which table does it touch
//! - is it a database-level command (`CREATE DATABASE`, `DROP DATABASE`, `USE`)
//! - how is a backend value written back as a SQL literal
//! - where does one statement end inside a dump

mod classifier;
mod literal;
mod splitter;

pub use classifier::{
    classify, database_command, is_valid_identifier, skip_leading_comments, ClassifiedStatement,
    DatabaseCommand, DdlVerb, StatementKind,
};
pub use literal::{quote_identifier, render_literal};
pub use splitter::split_statements;
