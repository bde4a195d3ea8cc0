//! MCP tool implementations.
//!
//! One handler per backend:
//! - `mysql`: statements, stored procedures and table DDL
//! - `pgsql`: statements and catalog listings
//! - `sqlite`: one-shot statements against a database file
//! - `redis`: generic commands, scripts and typed data-structure operations
//!
//! Handlers return the tool's response text; the service turns errors into
//! failed tool results.

pub mod mysql;
pub mod pgsql;
pub mod redis;
pub mod sqlite;

pub use mysql::MySqlToolHandler;
pub use pgsql::PgToolHandler;
pub use redis::RedisToolHandler;
pub use sqlite::SqliteToolHandler;

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, validate_connection_id};
use serde::Serialize;

/// The session id a call targets: the caller's, trimmed, or the backend default.
pub fn resolve_connection_id(provided: Option<&str>, db_type: DatabaseType) -> DbResult<String> {
    let id = provided
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(db_type.default_connection_id());
    validate_connection_id(id).map_err(|e| DbError::invalid_input(e.to_string()))?;
    Ok(id.to_string())
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> DbResult<String> {
    serde_json::to_string(value)
        .map_err(|e| DbError::internal(format!("failed to encode response: {e}")))
}

pub(crate) fn to_pretty_json<T: Serialize>(value: &T) -> DbResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| DbError::internal(format!("failed to encode response: {e}")))
}
