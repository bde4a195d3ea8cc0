//! Statement execution engine.
//!
//! This module runs statements against a [`DbPool`] with support for:
//! - Positional arguments
//! - Statement timeouts
//! - Multiple result sets per statement
//!
//! # Architecture
//!
//! Row-returning statements open a [`PoolCursor`] over every result set the
//! backend produced and hand it to the materializer. Database-specific code
//! lives in the `mysql`, `postgres` and `sqlite` submodules, which are kept
//! parallel to make differences obvious.

use crate::db::cursor::{BufferedCursor, ResultCursor};
use crate::db::materialize::{ProcedureOutcome, materialize, walk};
use crate::db::pool::DbPool;
use crate::db::value::{ResultSet, SqlValue};
use crate::error::{DbError, DbResult};
use crate::models::{DEFAULT_QUERY_TIMEOUT_SECS, QueryParam};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Auto-increment id generated by the statement, where the backend reports one.
    pub last_insert_id: Option<u64>,
}

/// A cursor over the result sets of one statement, for any relational backend.
pub enum PoolCursor {
    MySql(BufferedCursor<MySqlRow>),
    Postgres(BufferedCursor<PgRow>),
    SQLite(BufferedCursor<SqliteRow>),
}

macro_rules! delegate {
    ($self:ident, $c:ident => $body:expr) => {
        match $self {
            PoolCursor::MySql($c) => $body,
            PoolCursor::Postgres($c) => $body,
            PoolCursor::SQLite($c) => $body,
        }
    };
}

impl ResultCursor for PoolCursor {
    fn columns(&mut self) -> DbResult<Vec<String>> {
        delegate!(self, c => c.columns())
    }

    fn next_row(&mut self) -> bool {
        delegate!(self, c => c.next_row())
    }

    fn scan(&mut self, slots: &mut [SqlValue]) -> DbResult<()> {
        delegate!(self, c => c.scan(slots))
    }

    fn next_result_set(&mut self) -> bool {
        delegate!(self, c => c.next_result_set())
    }

    fn err(&mut self) -> Option<DbError> {
        delegate!(self, c => c.err())
    }
}

/// Executes statements with a per-statement timeout.
#[derive(Debug, Clone)]
pub struct StatementExecutor {
    timeout: Duration,
}

impl StatementExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        match timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DbError::timeout(operation, self.timeout.as_secs() as u32)),
        }
    }

    /// Run a statement and open a cursor over all of its result sets.
    pub async fn open_cursor(
        &self,
        pool: &DbPool,
        sql: &str,
        args: &[QueryParam],
    ) -> DbResult<PoolCursor> {
        debug!(sql = %sql, params = args.len(), backend = %pool.db_type(), "Executing query");
        self.bounded("query execution", async {
            Ok::<_, DbError>(match pool {
                DbPool::MySql(p) => PoolCursor::MySql(mysql::open_cursor(p, sql, args).await?),
                DbPool::Postgres(p) => {
                    PoolCursor::Postgres(postgres::open_cursor(p, sql, args).await?)
                }
                DbPool::SQLite(p) => PoolCursor::SQLite(sqlite::open_cursor(p, sql, args).await?),
            })
        })
        .await
    }

    /// Materialize a statement known to produce one result set.
    pub async fn query_single(
        &self,
        pool: &DbPool,
        sql: &str,
        args: &[QueryParam],
    ) -> DbResult<ResultSet> {
        let start = Instant::now();
        let mut cursor = self.open_cursor(pool, sql, args).await?;
        let records = materialize(&mut cursor)?;
        debug!(
            row_count = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query materialized"
        );
        Ok(records)
    }

    /// Materialize a single result set together with its column names.
    ///
    /// For PostgreSQL the columns of an empty result come from the statement
    /// description.
    pub async fn query_table(
        &self,
        pool: &DbPool,
        sql: &str,
        args: &[QueryParam],
    ) -> DbResult<(Vec<String>, ResultSet)> {
        let mut cursor = self.open_cursor(pool, sql, args).await?;
        let mut columns = cursor.columns()?;
        if columns.is_empty() {
            if let DbPool::Postgres(p) = pool {
                columns = self
                    .bounded("statement description", postgres::describe_columns(p, sql))
                    .await?;
            }
        }
        let records = materialize(&mut cursor)?;
        Ok((columns, records))
    }

    /// Walk every result set the statement produced.
    pub async fn query_all(
        &self,
        pool: &DbPool,
        sql: &str,
        args: &[QueryParam],
    ) -> DbResult<Vec<ResultSet>> {
        let start = Instant::now();
        let mut cursor = self.open_cursor(pool, sql, args).await?;
        let sets = walk(&mut cursor)?;
        debug!(
            result_sets = sets.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Result sets materialized"
        );
        Ok(sets)
    }

    /// Run a stored procedure call and select the result shape.
    pub async fn call_procedure(
        &self,
        pool: &DbPool,
        sql: &str,
        args: &[QueryParam],
    ) -> DbResult<ProcedureOutcome> {
        let start = Instant::now();
        let mut cursor = match self.open_cursor(pool, sql, args).await? {
            PoolCursor::MySql(c) => PoolCursor::MySql(c.without_call_status()),
            other => other,
        };
        let outcome = ProcedureOutcome::from_sets(walk(&mut cursor)?);
        debug!(
            result_sets = outcome.set_count(),
            row_count = outcome.total_records(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Procedure materialized"
        );
        Ok(outcome)
    }

    /// Execute a statement that does not return rows.
    pub async fn execute(
        &self,
        pool: &DbPool,
        sql: &str,
        args: &[QueryParam],
    ) -> DbResult<ExecOutcome> {
        let start = Instant::now();
        debug!(sql = %sql, params = args.len(), backend = %pool.db_type(), "Executing statement");

        let outcome = self
            .bounded("statement execution", async {
                match pool {
                    DbPool::MySql(p) => mysql::execute(p, sql, args).await,
                    DbPool::Postgres(p) => postgres::execute(p, sql, args).await,
                    DbPool::SQLite(p) => sqlite::execute(p, sql, args).await,
                }
            })
            .await?;

        debug!(
            rows_affected = outcome.rows_affected,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Statement executed"
        );
        Ok(outcome)
    }
}

impl Default for StatementExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS))
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Statements without arguments go through the driver's simple protocol, which
// accepts multi-statement text and procedure bodies that cannot be prepared.

mod mysql {
    use super::*;
    use crate::db::params::mysql_query;
    use sqlx::{Executor, MySqlPool};

    pub async fn open_cursor(
        pool: &MySqlPool,
        sql: &str,
        args: &[QueryParam],
    ) -> DbResult<BufferedCursor<MySqlRow>> {
        if args.is_empty() {
            BufferedCursor::collect(pool.fetch_many(sql)).await
        } else {
            BufferedCursor::collect(pool.fetch_many(mysql_query(sql, args))).await
        }
    }

    pub async fn execute(
        pool: &MySqlPool,
        sql: &str,
        args: &[QueryParam],
    ) -> DbResult<ExecOutcome> {
        let result = if args.is_empty() {
            pool.execute(sql).await?
        } else {
            mysql_query(sql, args).execute(pool).await?
        };
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_id()),
        })
    }
}

mod postgres {
    use super::*;
    use crate::db::params::postgres_query;
    use sqlx::{Column, Executor, PgPool};

    pub async fn open_cursor(
        pool: &PgPool,
        sql: &str,
        args: &[QueryParam],
    ) -> DbResult<BufferedCursor<PgRow>> {
        if args.is_empty() {
            BufferedCursor::collect(pool.fetch_many(sql)).await
        } else {
            BufferedCursor::collect(pool.fetch_many(postgres_query(sql, args))).await
        }
    }

    pub async fn describe_columns(pool: &PgPool, sql: &str) -> DbResult<Vec<String>> {
        let description = pool.describe(sql).await?;
        Ok(description
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }

    pub async fn execute(pool: &PgPool, sql: &str, args: &[QueryParam]) -> DbResult<ExecOutcome> {
        let result = if args.is_empty() {
            pool.execute(sql).await?
        } else {
            postgres_query(sql, args).execute(pool).await?
        };
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::sqlite_query;
    use sqlx::{Executor, SqlitePool};

    pub async fn open_cursor(
        pool: &SqlitePool,
        sql: &str,
        args: &[QueryParam],
    ) -> DbResult<BufferedCursor<SqliteRow>> {
        if args.is_empty() {
            BufferedCursor::collect(pool.fetch_many(sql)).await
        } else {
            BufferedCursor::collect(pool.fetch_many(sqlite_query(sql, args))).await
        }
    }

    pub async fn execute(
        pool: &SqlitePool,
        sql: &str,
        args: &[QueryParam],
    ) -> DbResult<ExecOutcome> {
        let result = if args.is_empty() {
            pool.execute(sql).await?
        } else {
            sqlite_query(sql, args).execute(pool).await?
        };
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: u64::try_from(result.last_insert_rowid()).ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_default_timeout() {
        let executor = StatementExecutor::default();
        assert_eq!(
            executor.timeout(),
            Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS)
        );
    }

    #[tokio::test]
    async fn test_bounded_reports_timeout() {
        let executor = StatementExecutor::new(Duration::from_millis(10));
        let result: DbResult<()> = executor
            .bounded("slow operation", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(DbError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_bounded_passes_through_errors() {
        let executor = StatementExecutor::default();
        let result: DbResult<()> = executor
            .bounded("op", async { Err(DbError::invalid_input("bad")) })
            .await;
        assert!(matches!(result, Err(DbError::InvalidInput { .. })));
    }
}
