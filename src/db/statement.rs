//! Statement classification.
//!
//! Decides whether a statement modifies rows and whether it hands rows back
//! (`RETURNING`). Parsing uses the backend's sqlparser dialect; statements
//! the parser does not understand (procedure bodies, vendor extensions) fall
//! back to their leading keyword.

use crate::models::DatabaseType;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

/// Coarse kind of a SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// INSERT or REPLACE
    Insert { returning: bool },
    Update { returning: bool },
    Delete { returning: bool },
    /// Anything else: SELECT, SHOW, DDL, CALL, ...
    Other,
}

impl StatementKind {
    /// True for INSERT/UPDATE/DELETE.
    pub fn is_modification(&self) -> bool {
        !matches!(self, Self::Other)
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Self::Insert { .. })
    }

    /// True when the statement yields rows through RETURNING.
    pub fn returns_rows(&self) -> bool {
        matches!(
            self,
            Self::Insert { returning: true }
                | Self::Update { returning: true }
                | Self::Delete { returning: true }
        )
    }
}

fn get_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
        DatabaseType::MySQL | DatabaseType::Redis => Box::new(MySqlDialect {}),
    }
}

/// Classify the first statement of `sql`.
pub fn classify(sql: &str, db_type: DatabaseType) -> StatementKind {
    let dialect = get_dialect(db_type);
    match Parser::parse_sql(dialect.as_ref(), sql) {
        Ok(statements) => match statements.first() {
            Some(stmt) => classify_statement(stmt),
            None => StatementKind::Other,
        },
        Err(_) => classify_by_keyword(sql),
    }
}

fn classify_statement(stmt: &Statement) -> StatementKind {
    match stmt {
        Statement::Insert(insert) => StatementKind::Insert {
            returning: insert.returning.is_some(),
        },
        Statement::Update(update) => StatementKind::Update {
            returning: update.returning.is_some(),
        },
        Statement::Delete(delete) => StatementKind::Delete {
            returning: delete.returning.is_some(),
        },
        _ => StatementKind::Other,
    }
}

/// Look for a bare RETURNING keyword, skipping quoted literals and identifiers.
fn has_returning(sql: &str) -> bool {
    let mut word = String::new();
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        if word.eq_ignore_ascii_case("RETURNING") {
            return true;
        }
        word.clear();
        if matches!(c, '\'' | '"' | '`') {
            quote = Some(c);
        }
    }
    word.eq_ignore_ascii_case("RETURNING")
}

fn classify_by_keyword(sql: &str) -> StatementKind {
    let first = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    let returning = has_returning(sql);
    match first.as_str() {
        "INSERT" | "REPLACE" => StatementKind::Insert { returning },
        "UPDATE" => StatementKind::Update { returning },
        "DELETE" => StatementKind::Delete { returning },
        _ => StatementKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_dml() {
        assert_eq!(
            classify("INSERT INTO t (a) VALUES (1)", DatabaseType::MySQL),
            StatementKind::Insert { returning: false }
        );
        assert_eq!(
            classify("update t set a = 1", DatabaseType::SQLite),
            StatementKind::Update { returning: false }
        );
        assert_eq!(
            classify("DELETE FROM t WHERE id = 3", DatabaseType::PostgreSQL),
            StatementKind::Delete { returning: false }
        );
    }

    #[test]
    fn test_classify_returning() {
        let kind = classify(
            "INSERT INTO users (name) VALUES ($1) RETURNING id",
            DatabaseType::PostgreSQL,
        );
        assert_eq!(kind, StatementKind::Insert { returning: true });
        assert!(kind.returns_rows());

        let kind = classify(
            "DELETE FROM users WHERE id = 1 RETURNING name",
            DatabaseType::PostgreSQL,
        );
        assert!(kind.returns_rows());
    }

    #[test]
    fn test_classify_reads_and_ddl_as_other() {
        assert_eq!(classify("SELECT 1", DatabaseType::MySQL), StatementKind::Other);
        assert_eq!(
            classify("CREATE TABLE t (id INT)", DatabaseType::SQLite),
            StatementKind::Other
        );
        assert!(!classify("SHOW TABLES", DatabaseType::MySQL).is_modification());
    }

    #[test]
    fn test_returning_inside_string_literal_is_ignored() {
        let kind = classify(
            "INSERT INTO notes (body) VALUES ('returning soon')",
            DatabaseType::PostgreSQL,
        );
        assert_eq!(kind, StatementKind::Insert { returning: false });
    }

    #[test]
    fn test_keyword_fallback_on_parse_failure() {
        assert_eq!(
            classify_by_keyword("  insert ignore into t values (1) ??"),
            StatementKind::Insert { returning: false }
        );
        assert!(classify_by_keyword("REPLACE INTO t VALUES (1)").is_insert());
        assert_eq!(classify_by_keyword("CALL proc()"), StatementKind::Other);
        assert_eq!(classify_by_keyword(""), StatementKind::Other);
    }

    #[test]
    fn test_update_with_returning_in_literal_is_plain_update() {
        let kind = classify(
            "UPDATE t SET note = 'see RETURNING policy' WHERE id = 1",
            DatabaseType::SQLite,
        );
        assert_eq!(kind, StatementKind::Update { returning: false });
        assert!(!kind.returns_rows());

        let kind = classify(
            "DELETE FROM t WHERE note = 'returning'",
            DatabaseType::PostgreSQL,
        );
        assert_eq!(kind, StatementKind::Delete { returning: false });

        let kind = classify(
            "UPDATE t SET note = 'x' WHERE id = 1 RETURNING id",
            DatabaseType::SQLite,
        );
        assert_eq!(kind, StatementKind::Update { returning: true });
    }

    #[test]
    fn test_keyword_fallback_skips_quoted_spans() {
        assert!(!has_returning("UPDATE t SET a = 'RETURNING' ??"));
        assert!(!has_returning("DELETE FROM `returning` WHERE \"returning\" = 1"));
        assert!(!has_returning("UPDATE t SET returning_count = 1"));
        assert!(has_returning("DELETE FROM t WHERE a = 'x' RETURNING *"));
        assert!(has_returning("delete from t returning"));
        assert_eq!(
            classify_by_keyword("UPDATE t SET note = 'returning' ??"),
            StatementKind::Update { returning: false }
        );
    }
}
