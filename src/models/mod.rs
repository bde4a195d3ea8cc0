//! Data models for the unified database MCP server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{
    ConnectionConfig, ConnectionConfigError, ConnectionInfo, DatabaseType,
    validate_connection_id,
};
pub use query::{
    DEFAULT_QUERY_TIMEOUT_SECS, ExecResult, QueryParam, QueryResult, ResponseKind,
};
