//! MCP service implementation using rmcp.
//!
//! This module defines [`UnifiedDbService`], which exposes the MySQL,
//! PostgreSQL, SQLite and Redis tools over the MCP protocol. Handler errors
//! never become protocol errors: they are returned as tool results flagged
//! `isError`, so the calling agent can read the message and recover.

use crate::db::{ConnectionManager, ConnectionSummary, StatementExecutor};
use crate::error::{DbError, DbResult};
use crate::kv::RedisRegistry;
use crate::tools::mysql::{
    AlterTableInput, CallProcedureInput, CreateProcedureInput, CreateTableInput,
    MySqlConnectInput, MySqlStatementInput, ProcedureNameInput, SessionInput,
    ShowProceduresInput, TableNameInput,
};
use crate::tools::pgsql::{
    ListTablesInput, PgConnectInput, PgSessionInput, PgStatementInput, PgTableInput,
};
use crate::tools::redis::{
    RedisCommandInput, RedisConnectInput, RedisDbInput, RedisDelInput, RedisExpireInput,
    RedisHashInput, RedisInfoInput, RedisKeyInput, RedisKeysInput, RedisListInput,
    RedisLuaInput, RedisSessionInput, RedisSetInput, RedisStringInput, RedisZSetInput,
};
use crate::tools::sqlite::SqliteQueryInput;
use crate::tools::{
    MySqlToolHandler, PgToolHandler, RedisToolHandler, SqliteToolHandler, to_json,
};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    schemars::JsonSchema,
    tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Output for the list_connections tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ListConnectionsOutput {
    /// Open sessions of every backend, ordered by id
    pub connections: Vec<ConnectionSummary>,
    /// Number of sessions
    pub count: usize,
}

/// Input for the disconnect tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DisconnectInput {
    /// Session to close (any backend)
    pub connection_id: String,
}

/// Turn a handler result into a tool result.
fn respond(tool: &str, result: DbResult<String>) -> Result<CallToolResult, McpError> {
    match result {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(e) => {
            warn!(tool, error = %e, "Tool call failed");
            Ok(CallToolResult::error(vec![Content::text(e.to_tool_message())]))
        }
    }
}

#[derive(Clone)]
pub struct UnifiedDbService {
    /// Relational sessions (MySQL, PostgreSQL, SQLite)
    connection_manager: Arc<ConnectionManager>,
    /// Redis sessions
    redis_registry: Arc<RedisRegistry>,
    executor: StatementExecutor,
    connect_timeout: Duration,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl UnifiedDbService {
    /// Create a new service over shared session registries.
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        redis_registry: Arc<RedisRegistry>,
        executor: StatementExecutor,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            connection_manager,
            redis_registry,
            executor,
            connect_timeout,
            tool_router: Self::tool_router(),
        }
    }

    /// Close every relational pool and Redis session.
    pub async fn close_all(&self) {
        self.connection_manager.close_all().await;
        self.redis_registry.close_all().await;
    }

    fn mysql(&self) -> MySqlToolHandler {
        MySqlToolHandler::new(self.connection_manager.clone(), self.executor.clone())
    }

    fn pgsql(&self) -> PgToolHandler {
        PgToolHandler::new(self.connection_manager.clone(), self.executor.clone())
    }

    fn sqlite(&self) -> SqliteToolHandler {
        SqliteToolHandler::new(self.connection_manager.clone(), self.executor.clone())
            .with_connect_timeout(self.connect_timeout)
    }

    fn redis(&self) -> RedisToolHandler {
        RedisToolHandler::new(self.redis_registry.clone())
    }

    async fn list_sessions(&self) -> ListConnectionsOutput {
        let mut connections = self.connection_manager.list_connections_detail().await;
        connections.extend(self.redis_registry.list().await);
        connections.sort_by(|a, b| a.id.cmp(&b.id));
        let count = connections.len();
        ListConnectionsOutput { connections, count }
    }

    /// Close a session of either registry.
    async fn close_session(&self, connection_id: &str) -> DbResult<String> {
        let id = connection_id.trim();
        if id.is_empty() {
            return Err(DbError::invalid_input(
                "connection_id is required. Call list_connections to see open sessions.",
            ));
        }
        let closed = match self.connection_manager.disconnect(id).await {
            Err(DbError::ConnectionNotFound { .. }) => self.redis_registry.disconnect(id).await,
            other => other,
        };
        closed?;
        to_json(&serde_json::json!({ "status": "disconnected", "connection_id": id }))
    }
}

#[tool_router]
impl UnifiedDbService {
    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    #[tool(
        description = "List all open sessions of every backend.\nReturns session ids, backend types and targets (credentials masked)."
    )]
    async fn list_connections(&self) -> Result<CallToolResult, McpError> {
        let output = self.list_sessions().await;
        respond("list_connections", to_json(&output))
    }

    #[tool(description = "Close a session of any backend by its connection_id.")]
    async fn disconnect(
        &self,
        Parameters(input): Parameters<DisconnectInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("disconnect", self.close_session(&input.connection_id).await)
    }

    // -------------------------------------------------------------------------
    // MySQL
    // -------------------------------------------------------------------------

    #[tool(
        description = "Connect to a MySQL server.\nThe session is registered under connection_id (default \"mysql\"); connecting again under the same id replaces it."
    )]
    async fn mysql_connect(
        &self,
        Parameters(input): Parameters<MySqlConnectInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("mysql_connect", self.mysql().connect(input).await)
    }

    #[tool(
        description = "Run a MySQL query and return its rows.\nUse ? placeholders with args. Statements returning several result sets report all of them."
    )]
    async fn mysql_query(
        &self,
        Parameters(input): Parameters<MySqlStatementInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("mysql_query", self.mysql().query(input).await)
    }

    #[tool(
        description = "Execute a MySQL INSERT, UPDATE or DELETE.\nReturns rows_affected; INSERT also returns last_insert_id."
    )]
    async fn mysql_exec(
        &self,
        Parameters(input): Parameters<MySqlStatementInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("mysql_exec", self.mysql().exec(input).await)
    }

    #[tool(description = "Execute a MySQL INSERT and return the generated id.")]
    async fn mysql_exec_get_id(
        &self,
        Parameters(input): Parameters<MySqlStatementInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("mysql_exec_get_id", self.mysql().exec_get_id(input).await)
    }

    #[tool(
        description = "Call a MySQL stored procedure with positional arguments.\nReturns `data` for a single result set or `result_sets` when the procedure yields several."
    )]
    async fn mysql_call_procedure(
        &self,
        Parameters(input): Parameters<CallProcedureInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("mysql_call_procedure", self.mysql().call_procedure(input).await)
    }

    #[tool(description = "Create a MySQL stored procedure from a complete CREATE PROCEDURE statement.")]
    async fn mysql_create_procedure(
        &self,
        Parameters(input): Parameters<CreateProcedureInput>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            "mysql_create_procedure",
            self.mysql().create_procedure(input).await,
        )
    }

    #[tool(description = "Drop a MySQL stored procedure if it exists.")]
    async fn mysql_drop_procedure(
        &self,
        Parameters(input): Parameters<ProcedureNameInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("mysql_drop_procedure", self.mysql().drop_procedure(input).await)
    }

    #[tool(
        description = "List the stored routines of a MySQL database (default: the session's current database)."
    )]
    async fn mysql_show_procedures(
        &self,
        Parameters(input): Parameters<ShowProceduresInput>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            "mysql_show_procedures",
            self.mysql().show_procedures(input).await,
        )
    }

    #[tool(description = "Create a MySQL table from a complete CREATE TABLE statement.")]
    async fn mysql_create_table(
        &self,
        Parameters(input): Parameters<CreateTableInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("mysql_create_table", self.mysql().create_table(input).await)
    }

    #[tool(description = "Alter a MySQL table with a complete ALTER TABLE statement.")]
    async fn mysql_alter_table(
        &self,
        Parameters(input): Parameters<AlterTableInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("mysql_alter_table", self.mysql().alter_table(input).await)
    }

    #[tool(description = "Drop a MySQL table if it exists.")]
    async fn mysql_drop_table(
        &self,
        Parameters(input): Parameters<TableNameInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("mysql_drop_table", self.mysql().drop_table(input).await)
    }

    #[tool(description = "List the tables of the session's current MySQL database.")]
    async fn mysql_show_tables(
        &self,
        Parameters(input): Parameters<SessionInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("mysql_show_tables", self.mysql().show_tables(input).await)
    }

    #[tool(description = "Describe the columns of a MySQL table.")]
    async fn mysql_describe_table(
        &self,
        Parameters(input): Parameters<TableNameInput>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            "mysql_describe_table",
            self.mysql().describe_table(input).await,
        )
    }

    #[tool(description = "Show the CREATE TABLE statement of a MySQL table.")]
    async fn mysql_show_create_table(
        &self,
        Parameters(input): Parameters<TableNameInput>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            "mysql_show_create_table",
            self.mysql().show_create_table(input).await,
        )
    }

    // -------------------------------------------------------------------------
    // PostgreSQL
    // -------------------------------------------------------------------------

    #[tool(
        description = "Connect to a PostgreSQL server.\nThe session is registered under connection_id (default \"pgsql\")."
    )]
    async fn pgsql_connect(
        &self,
        Parameters(input): Parameters<PgConnectInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("pgsql_connect", self.pgsql().connect(input).await)
    }

    #[tool(
        description = "Run a PostgreSQL query.\nUse $1, $2, ... placeholders with args. Returns {columns, rows, count}."
    )]
    async fn pgsql_query(
        &self,
        Parameters(input): Parameters<PgStatementInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("pgsql_query", self.pgsql().query(input).await)
    }

    #[tool(
        description = "Execute a PostgreSQL INSERT, UPDATE or DELETE.\nAn INSERT with RETURNING reports the returned id as last_insert_id."
    )]
    async fn pgsql_exec(
        &self,
        Parameters(input): Parameters<PgStatementInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("pgsql_exec", self.pgsql().exec(input).await)
    }

    #[tool(description = "Show the PostgreSQL server version, current database and current user.")]
    async fn pgsql_info(
        &self,
        Parameters(input): Parameters<PgSessionInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("pgsql_info", self.pgsql().info(input).await)
    }

    #[tool(description = "List the user schemas of the PostgreSQL database.")]
    async fn pgsql_list_schemas(
        &self,
        Parameters(input): Parameters<PgSessionInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("pgsql_list_schemas", self.pgsql().list_schemas(input).await)
    }

    #[tool(description = "List the tables of a PostgreSQL schema (default: public).")]
    async fn pgsql_list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("pgsql_list_tables", self.pgsql().list_tables(input).await)
    }

    #[tool(description = "List the columns of a PostgreSQL table.")]
    async fn pgsql_list_columns(
        &self,
        Parameters(input): Parameters<PgTableInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("pgsql_list_columns", self.pgsql().list_columns(input).await)
    }

    #[tool(description = "List the indexes of a PostgreSQL table.")]
    async fn pgsql_list_indexes(
        &self,
        Parameters(input): Parameters<PgTableInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("pgsql_list_indexes", self.pgsql().list_indexes(input).await)
    }

    // -------------------------------------------------------------------------
    // SQLite
    // -------------------------------------------------------------------------

    #[tool(
        description = "Execute SQL on a SQLite database file.\nINSERT/UPDATE/DELETE return rowsAffected (and lastInsertId for INSERT); other statements return rows.\nWithout db_path the preconfigured SQLite session is used."
    )]
    async fn sqlite_query(
        &self,
        Parameters(input): Parameters<SqliteQueryInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("sqlite_query", self.sqlite().query(input).await)
    }

    // -------------------------------------------------------------------------
    // Redis
    // -------------------------------------------------------------------------

    #[tool(
        description = "Connect to a Redis server.\nThe server must answer PING. The session is registered under connection_id (default \"redis\")."
    )]
    async fn redis_connect(
        &self,
        Parameters(input): Parameters<RedisConnectInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_connect", self.redis().connect(input).await)
    }

    #[tool(description = "Close a Redis session.")]
    async fn redis_disconnect(
        &self,
        Parameters(input): Parameters<RedisSessionInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_disconnect", self.redis().disconnect(input).await)
    }

    #[tool(description = "Check that the Redis server answers PING.")]
    async fn redis_ping(
        &self,
        Parameters(input): Parameters<RedisSessionInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_ping", self.redis().ping(input).await)
    }

    #[tool(
        description = "Run a raw Redis command, e.g. `SET key value` or `ZADD board 1 ann`.\nTokens are split on whitespace; numeric tokens are sent as numbers."
    )]
    async fn redis_command(
        &self,
        Parameters(input): Parameters<RedisCommandInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_command", self.redis().command(input).await)
    }

    #[tool(description = "Evaluate a Lua script with EVAL.")]
    async fn redis_lua(
        &self,
        Parameters(input): Parameters<RedisLuaInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_lua", self.redis().lua(input).await)
    }

    #[tool(description = "Show Redis server information, optionally for one INFO section.")]
    async fn redis_info(
        &self,
        Parameters(input): Parameters<RedisInfoInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_info", self.redis().info(input).await)
    }

    #[tool(description = "List the keys matching a pattern (default: *).")]
    async fn redis_keys(
        &self,
        Parameters(input): Parameters<RedisKeysInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_keys", self.redis().keys(input).await)
    }

    #[tool(description = "Show whether a key exists, its type and its TTL in seconds.")]
    async fn redis_key_info(
        &self,
        Parameters(input): Parameters<RedisKeyInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_key_info", self.redis().key_info(input).await)
    }

    #[tool(description = "Delete one or more keys.")]
    async fn redis_del(
        &self,
        Parameters(input): Parameters<RedisDelInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_del", self.redis().del(input).await)
    }

    #[tool(description = "Set the time to live of a key in seconds.")]
    async fn redis_expire(
        &self,
        Parameters(input): Parameters<RedisExpireInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_expire", self.redis().expire(input).await)
    }

    #[tool(description = "String operations: SET, GET, MGET, MSET, INCR, DECR, INCRBY, DECRBY.")]
    async fn redis_string(
        &self,
        Parameters(input): Parameters<RedisStringInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_string", self.redis().string(input).await)
    }

    #[tool(description = "Hash operations: HSET, HGET, HGETALL, HDEL, HEXISTS, HKEYS, HLEN.")]
    async fn redis_hash(
        &self,
        Parameters(input): Parameters<RedisHashInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_hash", self.redis().hash(input).await)
    }

    #[tool(description = "List operations: LPUSH, RPUSH, LPOP, RPOP, LRANGE, LLEN.")]
    async fn redis_list(
        &self,
        Parameters(input): Parameters<RedisListInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_list", self.redis().list(input).await)
    }

    #[tool(description = "Set operations: SADD, SMEMBERS, SREM, SISMEMBER, SCARD.")]
    async fn redis_set(
        &self,
        Parameters(input): Parameters<RedisSetInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_set", self.redis().set(input).await)
    }

    #[tool(
        description = "Sorted set operations: ZADD, ZRANGE, ZREM, ZSCORE, ZCARD.\nZADD pairs members with scores (numbers or numeric strings)."
    )]
    async fn redis_zset(
        &self,
        Parameters(input): Parameters<RedisZSetInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_zset", self.redis().zset(input).await)
    }

    #[tool(description = "Database operations: DBSIZE, FLUSHDB, FLUSHALL.")]
    async fn redis_db(
        &self,
        Parameters(input): Parameters<RedisDbInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("redis_db", self.redis().db(input).await)
    }
}

#[tool_handler]
impl ServerHandler for UnifiedDbService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "unidb-mcp-server".to_owned(),
                title: Some("Unified Database MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Tools for MySQL, PostgreSQL, SQLite and Redis.\n\
                \n\
                ## Workflow\n\
                1. Call `list_connections` to see open sessions\n\
                2. If the backend you need has none, call `mysql_connect`, `pgsql_connect` or `redis_connect`\n\
                3. Pass the session's `connection_id` to later calls, or omit it to use the backend default (`mysql`, `pgsql`, `redis`)\n\
                \n\
                ## Notes\n\
                - `sqlite_query` opens `db_path` for that call only; without it, the preconfigured `sqlite` session is used.\n\
                - MySQL placeholders are `?`; PostgreSQL placeholders are `$1`, `$2`, ...\n\
                - `mysql_call_procedure` reports `result_sets` when a procedure returns several.\n\
                - `redis_command` splits on whitespace; values containing spaces need the typed tools (`redis_string`, `redis_hash`, ...).\n\
                \n\
                ## Errors\n\
                Failed calls return an error result with a suggestion. \"Connection not found\" means the session must be opened first."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> UnifiedDbService {
        UnifiedDbService::new(
            Arc::new(ConnectionManager::new()),
            Arc::new(RedisRegistry::default()),
            StatementExecutor::default(),
            Duration::from_secs(5),
        )
    }

    fn text_of(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect()
    }

    #[test]
    fn test_service_creation() {
        let _service = create_test_service();
    }

    #[test]
    fn test_server_info() {
        let service = create_test_service();
        let info = service.get_info();
        assert_eq!(info.server_info.name, "unidb-mcp-server");
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("list_connections"));
    }

    #[test]
    fn test_all_tools_registered() {
        let service = create_test_service();
        let names: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        for expected in [
            "list_connections",
            "disconnect",
            "mysql_connect",
            "mysql_call_procedure",
            "mysql_show_create_table",
            "pgsql_query",
            "pgsql_list_indexes",
            "sqlite_query",
            "redis_command",
            "redis_zset",
            "redis_db",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing tool {expected}");
        }
        assert_eq!(names.len(), 41);
    }

    #[test]
    fn test_respond_maps_errors_to_tool_errors() {
        let ok = respond("t", Ok("42".to_string())).unwrap();
        assert_ne!(ok.is_error, Some(true));
        assert_eq!(text_of(&ok), "42");

        let failed = respond("t", Err(DbError::connection_not_found("mysql"))).unwrap();
        assert_eq!(failed.is_error, Some(true));
        assert!(text_of(&failed).contains("Connection not found: mysql"));
    }

    #[tokio::test]
    async fn test_list_connections_empty() {
        let service = create_test_service();
        let output = service.list_sessions().await;
        assert_eq!(output.count, 0);
        assert!(output.connections.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_unknown_session() {
        let service = create_test_service();
        let err = service.close_session("nope").await.unwrap_err();
        assert!(matches!(err, DbError::ConnectionNotFound { .. }));

        let err = service.close_session("  ").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_tool_failure_is_not_protocol_error() {
        let service = create_test_service();
        let result = service
            .mysql_show_tables(Parameters(SessionInput::default()))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }
}
