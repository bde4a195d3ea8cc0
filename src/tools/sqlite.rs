//! SQLite tool.
//!
//! `sqlite_query` opens the named database file for the duration of one call,
//! or runs against a preconfigured SQLite session when no path is given.

use crate::config::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::db::pool::open_sqlite_file;
use crate::db::{ConnectionManager, DbPool, ResultSet, StatementExecutor, classify};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam};
use crate::tools::{resolve_connection_id, to_pretty_json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SqliteQueryInput {
    /// Path to the SQLite database file. Created if it does not exist.
    #[serde(default)]
    pub db_path: Option<String>,
    /// SQL statement to execute. Use `?` placeholders for arguments.
    pub sql: String,
    /// Positional arguments bound to the `?` placeholders in order
    #[serde(default)]
    pub args: Vec<QueryParam>,
    /// Preconfigured SQLite session, used when db_path is omitted (default: "sqlite")
    #[serde(default)]
    pub connection_id: Option<String>,
}

/// Response of `sqlite_query`, keyed by `type`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SqliteResponse {
    Modification {
        #[serde(rename = "rowsAffected")]
        rows_affected: u64,
        #[serde(rename = "lastInsertId", skip_serializing_if = "Option::is_none")]
        last_insert_id: Option<u64>,
    },
    Select {
        data: ResultSet,
        count: usize,
    },
}

/// Handler for the SQLite tool.
pub struct SqliteToolHandler {
    connection_manager: Arc<ConnectionManager>,
    executor: StatementExecutor,
    connect_timeout: Duration,
}

impl SqliteToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>, executor: StatementExecutor) -> Self {
        Self {
            connection_manager,
            executor,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub async fn query(&self, input: SqliteQueryInput) -> DbResult<String> {
        if input.sql.trim().is_empty() {
            return Err(DbError::invalid_input("sql cannot be empty"));
        }

        let response = match input.db_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => {
                let pool = open_sqlite_file(Path::new(path), self.connect_timeout).await?;
                debug!(db_path = %path, "Opened SQLite file");
                let result = self.run(&pool, &input.sql, &input.args).await;
                pool.close().await;
                result?
            }
            _ => {
                let id = resolve_connection_id(input.connection_id.as_deref(), DatabaseType::SQLite)?;
                let pool = self
                    .connection_manager
                    .get_pool_of(&id, DatabaseType::SQLite)
                    .await
                    .map_err(|e| match e {
                        DbError::ConnectionNotFound { .. } => DbError::invalid_input(format!(
                            "db_path is required (no SQLite session named '{id}')"
                        )),
                        other => other,
                    })?;
                self.run(&pool, &input.sql, &input.args).await?
            }
        };
        to_pretty_json(&response)
    }

    /// INSERT/UPDATE/DELETE without RETURNING are executed; everything else is read.
    async fn run(&self, pool: &DbPool, sql: &str, args: &[QueryParam]) -> DbResult<SqliteResponse> {
        let start = Instant::now();
        let kind = classify(sql, DatabaseType::SQLite);

        if kind.is_modification() && !kind.returns_rows() {
            let outcome = self.executor.execute(pool, sql, args).await?;
            info!(
                rows_affected = outcome.rows_affected,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "SQLite statement executed"
            );
            return Ok(SqliteResponse::Modification {
                rows_affected: outcome.rows_affected,
                last_insert_id: outcome.last_insert_id.filter(|_| kind.is_insert()),
            });
        }

        let data = self.executor.query_single(pool, sql, args).await?;
        info!(
            row_count = data.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "SQLite query executed"
        );
        Ok(SqliteResponse::Select {
            count: data.len(),
            data,
        })
    }
}
