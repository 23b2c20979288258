//! # Control API
//!
//! A thin JSON HTTP adapter over the control surface.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness and role
//! - `GET /status` - Role, sessions, shard map, counters
//! - `GET /databases` - Databases, system ones hidden
//! - `GET /tables?db=` - Tables of one database
//! - `GET /schema?db=&table=` - Columns of one table
//! - `GET /rows?db=&table=` - Row ids of one table
//! - `GET /row?db=&table=&id=` - One row, `id` excluded
//! - `POST /query` - Submit a statement: `{user_type, db_name, query}`

pub mod config;
pub mod routes;
pub mod server;

pub use config::{HttpServerConfig, DEFAULT_CONTROL_PORT};
pub use routes::control_routes;
pub use server::HttpServer;
