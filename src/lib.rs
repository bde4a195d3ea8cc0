//! Unified database MCP server library.
//!
//! Exposes MySQL, PostgreSQL, SQLite and Redis operations as MCP tools.
//! Relational results go through a generic materializer that walks every
//! result set a statement or stored procedure produces; Redis commands go
//! through a tokenizer and a reply formatter.

pub mod config;
pub mod db;
pub mod error;
pub mod kv;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::UnifiedDbService;
