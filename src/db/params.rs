//! Positional argument binding.
//!
//! Each backend gets a builder that turns a statement plus its [`QueryParam`]
//! list into a bound sqlx query, so callers never match on parameter types.

use crate::models::QueryParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};

/// Build a MySQL statement with its arguments bound in order.
pub fn mysql_query<'q>(sql: &'q str, args: &'q [QueryParam]) -> Query<'q, MySql, MySqlArguments> {
    args.iter().fold(sqlx::query(sql), |query, arg| match arg {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    })
}

/// Build a PostgreSQL statement with its arguments bound in order.
pub fn postgres_query<'q>(
    sql: &'q str,
    args: &'q [QueryParam],
) -> Query<'q, Postgres, PgArguments> {
    args.iter().fold(sqlx::query(sql), |query, arg| match arg {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    })
}

/// Build a SQLite statement with its arguments bound in order.
pub fn sqlite_query<'q>(
    sql: &'q str,
    args: &'q [QueryParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    args.iter().fold(sqlx::query(sql), |query, arg| match arg {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        // No native JSON type; stored as text
        QueryParam::Json(v) => query.bind(v.to_string()),
    })
}

/// `?, ?, ?` for `n` positional arguments.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
