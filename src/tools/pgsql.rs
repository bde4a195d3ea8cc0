//! PostgreSQL tools.
//!
//! Responses are compact JSON: `{columns, rows, count}` for row-returning
//! statements and `{rows_affected, message}` for everything else.

use crate::config::PoolOptions;
use crate::db::{Cell, ConnectionManager, DbPool, ResultSet, StatementExecutor, classify};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType, QueryParam};
use crate::tools::{resolve_connection_id, to_json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use url::Url;

const SSL_MODES: &[&str] = &[
    "disable",
    "allow",
    "prefer",
    "require",
    "verify-ca",
    "verify-full",
];

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_sslmode() -> String {
    "disable".to_string()
}

/// Input for pgsql_connect.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PgConnectInput {
    /// Server host name or address (default: localhost)
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port (default: 5432)
    #[serde(default = "default_port")]
    pub port: u16,
    /// User name
    pub user: String,
    /// Password
    pub password: String,
    /// Database name
    pub database: String,
    /// SSL mode: disable, allow, prefer, require, verify-ca or verify-full (default: disable)
    #[serde(default = "default_sslmode")]
    pub sslmode: String,
    /// Session name for later calls (default: "pgsql")
    #[serde(default)]
    pub connection_id: Option<String>,
}

/// A statement with optional positional arguments.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PgStatementInput {
    /// SQL statement to execute. Use `$1`, `$2`, ... placeholders for arguments.
    pub sql: String,
    /// Positional arguments bound to `$1`, `$2`, ... in order
    #[serde(default)]
    pub args: Vec<QueryParam>,
    /// PostgreSQL session to use (default: "pgsql")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct PgSessionInput {
    /// PostgreSQL session to use (default: "pgsql")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Schema to list (default: public)
    #[serde(default)]
    pub schema: Option<String>,
    /// PostgreSQL session to use (default: "pgsql")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PgTableInput {
    /// Table name
    pub table_name: String,
    /// Schema of the table (default: public)
    #[serde(default)]
    pub schema: Option<String>,
    /// PostgreSQL session to use (default: "pgsql")
    #[serde(default)]
    pub connection_id: Option<String>,
}

/// Envelope for row-returning statements.
#[derive(Debug, Serialize)]
pub struct PgQueryResult {
    pub columns: Vec<String>,
    pub rows: ResultSet,
    pub count: usize,
}

/// Envelope for statements that do not return rows.
#[derive(Debug, Serialize)]
pub struct PgExecResult {
    pub rows_affected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
struct PgConnectOutput {
    status: &'static str,
    connection_id: String,
    host: String,
    port: u16,
    database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_version: Option<String>,
    replaced: bool,
}

#[derive(Debug, Serialize)]
struct PgTarget {
    host: Option<String>,
    port: u16,
    database: Option<String>,
    user: Option<String>,
    sslmode: String,
}

#[derive(Debug, Serialize)]
struct PgInfoOutput {
    version: String,
    current_database: String,
    current_user: String,
    config: PgTarget,
}

/// Build a `postgres://` URL. Sensitive: carries the password.
fn connection_url(input: &PgConnectInput) -> DbResult<String> {
    let sslmode = input.sslmode.trim().to_ascii_lowercase();
    if !SSL_MODES.contains(&sslmode.as_str()) {
        return Err(DbError::invalid_input(format!(
            "Invalid sslmode '{}': expected one of {}",
            input.sslmode,
            SSL_MODES.join(", ")
        )));
    }
    let host = input.host.trim();
    let mut url = Url::parse(&format!("postgres://{host}:{}", input.port))
        .map_err(|e| DbError::invalid_input(format!("Invalid PostgreSQL host '{host}': {e}")))?;
    url.set_username(&input.user)
        .and_then(|_| url.set_password(Some(&input.password)))
        .map_err(|_| DbError::invalid_input("PostgreSQL host cannot carry credentials"))?;
    url.set_path(&input.database);
    url.query_pairs_mut().append_pair("sslmode", &sslmode);
    Ok(url.to_string())
}

/// Describe a session's target without its password.
fn describe_target(connection_string: &str) -> PgTarget {
    match Url::parse(connection_string) {
        Ok(url) => PgTarget {
            host: url.host_str().map(str::to_string),
            port: url.port().unwrap_or(5432),
            database: Some(url.path().trim_start_matches('/'))
                .filter(|db| !db.is_empty())
                .map(str::to_string),
            user: Some(url.username())
                .filter(|user| !user.is_empty())
                .map(str::to_string),
            sslmode: url
                .query_pairs()
                .find(|(key, _)| key == "sslmode")
                .map(|(_, value)| value.into_owned())
                .unwrap_or_else(|| "prefer".to_string()),
        },
        Err(_) => PgTarget {
            host: None,
            port: 5432,
            database: None,
            user: None,
            sslmode: "prefer".to_string(),
        },
    }
}

fn schema_or_public(schema: Option<&str>) -> String {
    match schema.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => "public".to_string(),
    }
}

/// First column of the first row, read as an integer id.
fn returned_id(rows: &ResultSet) -> DbResult<i64> {
    let cell = rows.first().and_then(|row| row.iter().next().map(|(_, cell)| cell));
    match cell {
        Some(Cell::Int(id)) => Ok(*id),
        Some(Cell::Text(text)) => text.trim().parse().map_err(|_| {
            DbError::invalid_input(format!("RETURNING value '{text}' is not an integer id"))
        }),
        Some(other) => Err(DbError::invalid_input(format!(
            "RETURNING value {other:?} is not an integer id"
        ))),
        None => Err(DbError::invalid_input("INSERT ... RETURNING produced no row")),
    }
}

/// Handler for the PostgreSQL tools.
pub struct PgToolHandler {
    connection_manager: Arc<ConnectionManager>,
    executor: StatementExecutor,
}

impl PgToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>, executor: StatementExecutor) -> Self {
        Self {
            connection_manager,
            executor,
        }
    }

    async fn session(&self, connection_id: Option<&str>) -> DbResult<(String, DbPool)> {
        let id = resolve_connection_id(connection_id, DatabaseType::PostgreSQL)?;
        let pool = self
            .connection_manager
            .get_pool_of(&id, DatabaseType::PostgreSQL)
            .await?;
        Ok((id, pool))
    }

    pub async fn connect(&self, input: PgConnectInput) -> DbResult<String> {
        let id = resolve_connection_id(input.connection_id.as_deref(), DatabaseType::PostgreSQL)?;
        let config = ConnectionConfig::new(
            id,
            connection_url(&input)?,
            Some(input.database.clone()),
            PoolOptions::default(),
        )
        .map_err(|e| DbError::invalid_input(e.to_string()))?;

        let info = self.connection_manager.connect(config).await?;
        to_json(&PgConnectOutput {
            status: "connected",
            connection_id: info.connection_id,
            host: input.host,
            port: input.port,
            database: input.database,
            server_version: info.server_version,
            replaced: info.replaced,
        })
    }

    pub async fn query(&self, input: PgStatementInput) -> DbResult<String> {
        let (id, pool) = self.session(input.connection_id.as_deref()).await?;
        let start = Instant::now();
        let result = self.table(&pool, &input.sql, &input.args).await?;
        info!(
            connection_id = %id,
            row_count = result.count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "PostgreSQL query executed"
        );
        to_json(&result)
    }

    /// Execute a statement. `INSERT ... RETURNING` reports the returned id.
    pub async fn exec(&self, input: PgStatementInput) -> DbResult<String> {
        let (id, pool) = self.session(input.connection_id.as_deref()).await?;
        let kind = classify(&input.sql, DatabaseType::PostgreSQL);

        let result = if kind.is_insert() && kind.returns_rows() {
            let rows = self
                .executor
                .query_single(&pool, &input.sql, &input.args)
                .await?;
            PgExecResult {
                rows_affected: 1,
                last_insert_id: Some(returned_id(&rows)?),
                message: "Inserted successfully",
            }
        } else {
            let outcome = self
                .executor
                .execute(&pool, &input.sql, &input.args)
                .await?;
            PgExecResult {
                rows_affected: outcome.rows_affected,
                last_insert_id: None,
                message: "Executed successfully",
            }
        };

        info!(
            connection_id = %id,
            rows_affected = result.rows_affected,
            "PostgreSQL statement executed"
        );
        to_json(&result)
    }

    pub async fn info(&self, input: PgSessionInput) -> DbResult<String> {
        let (id, pool) = self.session(input.connection_id.as_deref()).await?;
        let config = self.connection_manager.get_config(&id).await?;
        let rows = self
            .executor
            .query_single(
                &pool,
                "SELECT version() AS version, current_database() AS current_database, \
                 current_user AS current_user",
                &[],
            )
            .await?;
        let text = |column: &str| -> String {
            match rows.first().and_then(|row| row.get(column)) {
                Some(Cell::Text(value)) => value.clone(),
                _ => String::new(),
            }
        };
        to_json(&PgInfoOutput {
            version: text("version"),
            current_database: text("current_database"),
            current_user: text("current_user"),
            config: describe_target(&config.connection_string),
        })
    }

    pub async fn list_schemas(&self, input: PgSessionInput) -> DbResult<String> {
        self.catalog(
            input.connection_id.as_deref(),
            "SELECT schema_name FROM information_schema.schemata \
             WHERE schema_name NOT IN ('information_schema', 'pg_catalog', 'pg_toast') \
             ORDER BY schema_name",
            &[],
        )
        .await
    }

    pub async fn list_tables(&self, input: ListTablesInput) -> DbResult<String> {
        let schema = schema_or_public(input.schema.as_deref());
        self.catalog(
            input.connection_id.as_deref(),
            "SELECT table_name, table_type, table_schema FROM information_schema.tables \
             WHERE table_schema = $1 ORDER BY table_name",
            &[QueryParam::String(schema)],
        )
        .await
    }

    pub async fn list_columns(&self, input: PgTableInput) -> DbResult<String> {
        let schema = schema_or_public(input.schema.as_deref());
        self.catalog(
            input.connection_id.as_deref(),
            "SELECT column_name, data_type, is_nullable, column_default, \
             character_maximum_length, numeric_precision, numeric_scale \
             FROM information_schema.columns \
             WHERE table_name = $1 AND table_schema = $2 ORDER BY ordinal_position",
            &[QueryParam::String(input.table_name), QueryParam::String(schema)],
        )
        .await
    }

    pub async fn list_indexes(&self, input: PgTableInput) -> DbResult<String> {
        let schema = schema_or_public(input.schema.as_deref());
        self.catalog(
            input.connection_id.as_deref(),
            "SELECT i.indexname AS index_name, i.indexdef AS index_definition, \
             'INDEX' AS index_type FROM pg_indexes i \
             WHERE i.tablename = $1 AND i.schemaname = $2 ORDER BY i.indexname",
            &[QueryParam::String(input.table_name), QueryParam::String(schema)],
        )
        .await
    }

    async fn catalog(
        &self,
        connection_id: Option<&str>,
        sql: &str,
        args: &[QueryParam],
    ) -> DbResult<String> {
        let (_, pool) = self.session(connection_id).await?;
        to_json(&self.table(&pool, sql, args).await?)
    }

    async fn table(&self, pool: &DbPool, sql: &str, args: &[QueryParam]) -> DbResult<PgQueryResult> {
        let (columns, rows) = self.executor.query_table(pool, sql, args).await?;
        Ok(PgQueryResult {
            columns,
            count: rows.len(),
            rows,
        })
    }
}
