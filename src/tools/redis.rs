//! Redis tools.
//!
//! Generic commands and Lua scripts go through the command tokenizer and the
//! reply formatter. The typed data-structure tools (`redis_string`,
//! `redis_hash`, ...) select a command by their `operation` argument, which
//! is matched case-insensitively.
//!
//! Output conventions: a missing value is `null`, status replies are
//! `{"status": "OK"}`, integers are decimal text, strings are double-quoted
//! and collections are JSON.

use crate::error::{DbError, DbResult};
use crate::kv::{ListEnd, RedisRegistry, RedisSession, RedisTarget, ReplyValue, format_reply, tokenize};
use crate::models::DatabaseType;
use crate::tools::{resolve_connection_id, to_json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

const STATUS_OK: &str = r#"{"status": "OK"}"#;

fn default_pattern() -> String {
    "*".to_string()
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisConnectInput {
    /// Redis server address, e.g. 127.0.0.1:6379 (a redis:// or rediss:// URL is also accepted)
    pub addr: String,
    /// Redis password
    #[serde(default)]
    pub password: Option<String>,
    /// Redis database number (default: 0)
    #[serde(default)]
    pub db: i64,
    /// Connect over TLS without verifying the server certificate
    #[serde(default)]
    pub ssl_insecure_skip_verify: bool,
    /// Session name for later calls (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct RedisSessionInput {
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisCommandInput {
    /// Redis command, e.g. `SET key value` or `GET key`. Tokens are split on
    /// whitespace; quoting is not supported.
    pub command: String,
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisLuaInput {
    /// Lua script source
    pub script: String,
    /// Key names available to the script as KEYS
    #[serde(default)]
    pub keys: Vec<String>,
    /// Arguments available to the script as ARGV
    #[serde(default)]
    pub args: Vec<JsonValue>,
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct RedisInfoInput {
    /// INFO section, e.g. server, memory, replication
    #[serde(default)]
    pub section: Option<String>,
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisKeysInput {
    /// Key pattern, e.g. user:* (default: *)
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisKeyInput {
    /// Key name
    pub key: String,
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisDelInput {
    /// Keys to delete
    #[serde(default)]
    pub keys: Vec<String>,
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisExpireInput {
    /// Key name
    pub key: String,
    /// Time to live in seconds
    pub seconds: f64,
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisStringInput {
    /// One of SET, GET, MGET, MSET, INCR, DECR, INCRBY, DECRBY
    pub operation: String,
    /// Key name
    #[serde(default)]
    pub key: Option<String>,
    /// Value (SET)
    #[serde(default)]
    pub value: Option<JsonValue>,
    /// Key names (MGET, MSET)
    #[serde(default)]
    pub keys: Vec<String>,
    /// Values (MSET), paired with keys
    #[serde(default)]
    pub values: Vec<JsonValue>,
    /// Amount (INCRBY, DECRBY)
    #[serde(default)]
    pub increment: Option<f64>,
    /// Expiry in seconds (SET); 0 means no expiry
    #[serde(default)]
    pub expire: Option<u64>,
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisHashInput {
    /// One of HSET, HGET, HGETALL, HDEL, HEXISTS, HKEYS, HLEN
    pub operation: String,
    /// Hash key name
    pub key: String,
    /// Field name
    #[serde(default)]
    pub field: Option<String>,
    /// Field value (HSET)
    #[serde(default)]
    pub value: Option<JsonValue>,
    /// Field names (HSET, HDEL)
    #[serde(default)]
    pub fields: Vec<String>,
    /// Field values (HSET), paired with fields
    #[serde(default)]
    pub values: Vec<JsonValue>,
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisListInput {
    /// One of LPUSH, RPUSH, LPOP, RPOP, LRANGE, LLEN
    pub operation: String,
    /// List key name
    pub key: String,
    /// Values to push
    #[serde(default)]
    pub values: Vec<JsonValue>,
    /// Start index (LRANGE, default: 0)
    #[serde(default)]
    pub start: Option<i64>,
    /// Stop index, inclusive (LRANGE, default: -1)
    #[serde(default)]
    pub stop: Option<i64>,
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisSetInput {
    /// One of SADD, SMEMBERS, SREM, SISMEMBER, SCARD
    pub operation: String,
    /// Set key name
    pub key: String,
    /// Members (SADD, SREM)
    #[serde(default)]
    pub members: Vec<JsonValue>,
    /// Member (SISMEMBER)
    #[serde(default)]
    pub member: Option<JsonValue>,
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisZSetInput {
    /// One of ZADD, ZRANGE, ZREM, ZSCORE, ZCARD
    pub operation: String,
    /// Sorted set key name
    pub key: String,
    /// Members (ZADD, ZREM)
    #[serde(default)]
    pub members: Vec<JsonValue>,
    /// Scores (ZADD), paired with members; numbers or numeric strings
    #[serde(default)]
    pub scores: Vec<JsonValue>,
    /// Member (ZSCORE)
    #[serde(default)]
    pub member: Option<JsonValue>,
    /// Start rank (ZRANGE, default: 0)
    #[serde(default)]
    pub start: Option<i64>,
    /// Stop rank, inclusive (ZRANGE, default: -1)
    #[serde(default)]
    pub stop: Option<i64>,
    /// Include scores in ZRANGE output
    #[serde(default)]
    pub with_scores: bool,
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisDbInput {
    /// One of DBSIZE, FLUSHDB, FLUSHALL
    pub operation: String,
    /// Redis session to use (default: "redis")
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct RedisConnectOutput {
    status: &'static str,
    connection_id: String,
    addr: String,
    db: i64,
    replaced: bool,
}

#[derive(Debug, Serialize)]
struct KeyInfoOutput {
    exists: bool,
    #[serde(rename = "type")]
    key_type: String,
    ttl: i64,
}

#[derive(Debug, Serialize)]
struct ScoredMember {
    member: String,
    score: f64,
}

/// Text of a JSON argument as sent to Redis: strings bare, everything else as JSON.
fn arg_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn arg_texts(values: &[JsonValue]) -> Vec<String> {
    values.iter().map(arg_text).collect()
}

/// A ZADD score: a JSON number or a numeric string.
fn parse_score(value: &JsonValue) -> DbResult<f64> {
    let score = match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    score
        .filter(|s| !s.is_nan())
        .ok_or_else(|| DbError::invalid_input(format!("Invalid score: {value}")))
}

fn pair_up<T>(
    left: Vec<T>,
    right: Vec<String>,
    left_name: &str,
    right_name: &str,
) -> DbResult<Vec<(T, String)>> {
    if left.len() != right.len() {
        return Err(DbError::invalid_input(format!(
            "{left_name} and {right_name} must have the same length ({} vs {})",
            left.len(),
            right.len()
        )));
    }
    Ok(left.into_iter().zip(right).collect())
}

fn require<'a>(value: Option<&'a str>, name: &str, operation: &str) -> DbResult<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DbError::invalid_input(format!("{operation} requires '{name}'")))
}

fn require_any<T>(values: &[T], name: &str, operation: &str) -> DbResult<()> {
    if values.is_empty() {
        return Err(DbError::invalid_input(format!(
            "{operation} requires a non-empty '{name}'"
        )));
    }
    Ok(())
}

fn unsupported(operation: &str) -> DbError {
    DbError::invalid_input(format!("Unsupported operation: {operation}"))
}

fn optional_text(value: Option<String>) -> String {
    format_reply(&value.map_or(ReplyValue::Null, ReplyValue::Str))
}

fn index(value: Option<i64>, default: isize) -> isize {
    value
        .map(|v| v.clamp(isize::MIN as i64, isize::MAX as i64) as isize)
        .unwrap_or(default)
}

/// Handler for the Redis tools.
pub struct RedisToolHandler {
    registry: Arc<RedisRegistry>,
}

impl RedisToolHandler {
    pub fn new(registry: Arc<RedisRegistry>) -> Self {
        Self { registry }
    }

    async fn session(&self, connection_id: Option<&str>) -> DbResult<RedisSession> {
        let id = resolve_connection_id(connection_id, DatabaseType::Redis)?;
        self.registry.get(&id).await
    }

    pub async fn connect(&self, input: RedisConnectInput) -> DbResult<String> {
        let id = resolve_connection_id(input.connection_id.as_deref(), DatabaseType::Redis)?;
        let target = RedisTarget {
            addr: input.addr.trim().to_string(),
            password: input.password,
            db: input.db,
            ssl_insecure_skip_verify: input.ssl_insecure_skip_verify,
        };
        let url = target.to_url()?;
        let (session, replaced) = self.registry.connect(&id, &url).await?;
        to_json(&RedisConnectOutput {
            status: "connected",
            connection_id: id,
            addr: session.addr().to_string(),
            db: session.db(),
            replaced,
        })
    }

    pub async fn disconnect(&self, input: RedisSessionInput) -> DbResult<String> {
        let id = resolve_connection_id(input.connection_id.as_deref(), DatabaseType::Redis)?;
        self.registry.disconnect(&id).await?;
        Ok(r#"{"status": "disconnected"}"#.to_string())
    }

    pub async fn ping(&self, input: RedisSessionInput) -> DbResult<String> {
        self.session(input.connection_id.as_deref())
            .await?
            .ping()
            .await?;
        Ok(r#"{"status": "PONG"}"#.to_string())
    }

    pub async fn command(&self, input: RedisCommandInput) -> DbResult<String> {
        let args = tokenize(&input.command)?;
        let session = self.session(input.connection_id.as_deref()).await?;
        let reply = session.run(&args).await?;
        info!(
            addr = %session.addr(),
            command = %args[0],
            "Redis command executed"
        );
        Ok(format_reply(&reply))
    }

    pub async fn lua(&self, input: RedisLuaInput) -> DbResult<String> {
        if input.script.trim().is_empty() {
            return Err(DbError::invalid_input("script cannot be empty"));
        }
        let session = self.session(input.connection_id.as_deref()).await?;
        let reply = session
            .eval(&input.script, &input.keys, &arg_texts(&input.args))
            .await?;
        Ok(format_reply(&reply))
    }

    pub async fn info(&self, input: RedisInfoInput) -> DbResult<String> {
        let session = self.session(input.connection_id.as_deref()).await?;
        let text = session
            .info(input.section.as_deref().map(str::trim))
            .await?;
        Ok(format_reply(&ReplyValue::Str(text)))
    }

    pub async fn keys(&self, input: RedisKeysInput) -> DbResult<String> {
        let session = self.session(input.connection_id.as_deref()).await?;
        let pattern = if input.pattern.is_empty() {
            "*"
        } else {
            input.pattern.as_str()
        };
        to_json(&session.keys(pattern).await?)
    }

    pub async fn key_info(&self, input: RedisKeyInput) -> DbResult<String> {
        let session = self.session(input.connection_id.as_deref()).await?;
        match session.key_info(&input.key).await? {
            None => Ok(r#"{"exists": false}"#.to_string()),
            Some(info) => to_json(&KeyInfoOutput {
                exists: true,
                key_type: info.key_type,
                ttl: info.ttl,
            }),
        }
    }

    pub async fn del(&self, input: RedisDelInput) -> DbResult<String> {
        require_any(&input.keys, "keys", "DEL")?;
        let session = self.session(input.connection_id.as_deref()).await?;
        let deleted = session.del(&input.keys).await?;
        to_json(&serde_json::json!({ "deleted": deleted }))
    }

    pub async fn expire(&self, input: RedisExpireInput) -> DbResult<String> {
        let session = self.session(input.connection_id.as_deref()).await?;
        session.expire(&input.key, input.seconds).await?;
        Ok(r#"{"status": "ok"}"#.to_string())
    }

    pub async fn string(&self, input: RedisStringInput) -> DbResult<String> {
        let op = input.operation.trim().to_ascii_uppercase();
        if !matches!(
            op.as_str(),
            "SET" | "GET" | "MGET" | "MSET" | "INCR" | "DECR" | "INCRBY" | "DECRBY"
        ) {
            return Err(unsupported(&input.operation));
        }
        let session = self.session(input.connection_id.as_deref()).await?;
        let key = input.key.as_deref();

        match op.as_str() {
            "SET" => {
                let key = require(key, "key", &op)?;
                let value = input
                    .value
                    .as_ref()
                    .map(arg_text)
                    .ok_or_else(|| DbError::invalid_input("SET requires 'value'"))?;
                session
                    .set(key, &value, input.expire.unwrap_or_default())
                    .await?;
                Ok(STATUS_OK.to_string())
            }
            "GET" => Ok(optional_text(
                session.get(require(key, "key", &op)?).await?,
            )),
            "MGET" => {
                require_any(&input.keys, "keys", &op)?;
                to_json(&session.mget(&input.keys).await?)
            }
            "MSET" => {
                require_any(&input.keys, "keys", &op)?;
                let pairs = pair_up(input.keys, arg_texts(&input.values), "keys", "values")?;
                session.mset(&pairs).await?;
                Ok(STATUS_OK.to_string())
            }
            "INCR" | "DECR" | "INCRBY" | "DECRBY" => {
                let key = require(key, "key", &op)?;
                let amount = match op.as_str() {
                    "INCR" | "DECR" => 1,
                    _ => input.increment.map(|v| v as i64).ok_or_else(|| {
                        DbError::invalid_input(format!("{op} requires 'increment'"))
                    })?,
                };
                let delta = if op.starts_with("DECR") { -amount } else { amount };
                Ok(session.incr_by(key, delta).await?.to_string())
            }
            _ => Err(unsupported(&input.operation)),
        }
    }

    pub async fn hash(&self, input: RedisHashInput) -> DbResult<String> {
        let op = input.operation.trim().to_ascii_uppercase();
        if !matches!(
            op.as_str(),
            "HSET" | "HGET" | "HGETALL" | "HDEL" | "HEXISTS" | "HKEYS" | "HLEN"
        ) {
            return Err(unsupported(&input.operation));
        }
        let session = self.session(input.connection_id.as_deref()).await?;
        let key = input.key.as_str();
        let field = input.field.as_deref();

        match op.as_str() {
            "HSET" => {
                let pairs = if !input.fields.is_empty() {
                    pair_up(input.fields, arg_texts(&input.values), "fields", "values")?
                } else {
                    let field = require(field, "field", &op)?;
                    let value = input.value.as_ref().map(arg_text).ok_or_else(|| {
                        DbError::invalid_input("HSET requires 'value' or 'fields' and 'values'")
                    })?;
                    vec![(field.to_string(), value)]
                };
                Ok(session.hset(key, &pairs).await?.to_string())
            }
            "HGET" => Ok(optional_text(
                session.hget(key, require(field, "field", &op)?).await?,
            )),
            "HGETALL" => to_json(&session.hgetall(key).await?),
            "HDEL" => {
                let fields = if !input.fields.is_empty() {
                    input.fields
                } else {
                    vec![require(field, "field", &op)?.to_string()]
                };
                Ok(session.hdel(key, &fields).await?.to_string())
            }
            "HEXISTS" => Ok(session
                .hexists(key, require(field, "field", &op)?)
                .await?
                .to_string()),
            "HKEYS" => to_json(&session.hkeys(key).await?),
            "HLEN" => Ok(session.hlen(key).await?.to_string()),
            _ => Err(unsupported(&input.operation)),
        }
    }

    pub async fn list(&self, input: RedisListInput) -> DbResult<String> {
        let op = input.operation.trim().to_ascii_uppercase();
        if !matches!(
            op.as_str(),
            "LPUSH" | "RPUSH" | "LPOP" | "RPOP" | "LRANGE" | "LLEN"
        ) {
            return Err(unsupported(&input.operation));
        }
        let session = self.session(input.connection_id.as_deref()).await?;
        let key = input.key.as_str();
        let end = if op.starts_with('L') {
            ListEnd::Left
        } else {
            ListEnd::Right
        };

        match op.as_str() {
            "LPUSH" | "RPUSH" => {
                require_any(&input.values, "values", &op)?;
                Ok(session
                    .push(end, key, &arg_texts(&input.values))
                    .await?
                    .to_string())
            }
            "LPOP" | "RPOP" => Ok(optional_text(session.pop(end, key).await?)),
            "LRANGE" => to_json(
                &session
                    .lrange(key, index(input.start, 0), index(input.stop, -1))
                    .await?,
            ),
            "LLEN" => Ok(session.llen(key).await?.to_string()),
            _ => Err(unsupported(&input.operation)),
        }
    }

    pub async fn set(&self, input: RedisSetInput) -> DbResult<String> {
        let op = input.operation.trim().to_ascii_uppercase();
        if !matches!(
            op.as_str(),
            "SADD" | "SMEMBERS" | "SREM" | "SISMEMBER" | "SCARD"
        ) {
            return Err(unsupported(&input.operation));
        }
        let session = self.session(input.connection_id.as_deref()).await?;
        let key = input.key.as_str();

        match op.as_str() {
            "SADD" => {
                require_any(&input.members, "members", &op)?;
                Ok(session
                    .sadd(key, &arg_texts(&input.members))
                    .await?
                    .to_string())
            }
            "SMEMBERS" => to_json(&session.smembers(key).await?),
            "SREM" => {
                require_any(&input.members, "members", &op)?;
                Ok(session
                    .srem(key, &arg_texts(&input.members))
                    .await?
                    .to_string())
            }
            "SISMEMBER" => {
                let member = input
                    .member
                    .as_ref()
                    .map(arg_text)
                    .ok_or_else(|| DbError::invalid_input("SISMEMBER requires 'member'"))?;
                Ok(session.sismember(key, &member).await?.to_string())
            }
            "SCARD" => Ok(session.scard(key).await?.to_string()),
            _ => Err(unsupported(&input.operation)),
        }
    }

    pub async fn zset(&self, input: RedisZSetInput) -> DbResult<String> {
        let op = input.operation.trim().to_ascii_uppercase();
        if !matches!(op.as_str(), "ZADD" | "ZRANGE" | "ZREM" | "ZSCORE" | "ZCARD") {
            return Err(unsupported(&input.operation));
        }
        let session = self.session(input.connection_id.as_deref()).await?;
        let key = input.key.as_str();

        match op.as_str() {
            "ZADD" => {
                require_any(&input.members, "members", &op)?;
                require_any(&input.scores, "scores", &op)?;
                let scores = input
                    .scores
                    .iter()
                    .map(parse_score)
                    .collect::<DbResult<Vec<_>>>()?;
                let entries = pair_up(scores, arg_texts(&input.members), "scores", "members")?;
                Ok(session.zadd(key, &entries).await?.to_string())
            }
            "ZRANGE" => {
                let (start, stop) = (index(input.start, 0), index(input.stop, -1));
                if input.with_scores {
                    let scored: Vec<ScoredMember> = session
                        .zrange_withscores(key, start, stop)
                        .await?
                        .into_iter()
                        .map(|(member, score)| ScoredMember { member, score })
                        .collect();
                    to_json(&scored)
                } else {
                    to_json(&session.zrange(key, start, stop).await?)
                }
            }
            "ZREM" => {
                require_any(&input.members, "members", &op)?;
                Ok(session
                    .zrem(key, &arg_texts(&input.members))
                    .await?
                    .to_string())
            }
            "ZSCORE" => {
                let member = input
                    .member
                    .as_ref()
                    .map(arg_text)
                    .ok_or_else(|| DbError::invalid_input("ZSCORE requires 'member'"))?;
                let score = session.zscore(key, &member).await?;
                Ok(format_reply(&score.map_or(ReplyValue::Null, ReplyValue::Float)))
            }
            "ZCARD" => Ok(session.zcard(key).await?.to_string()),
            _ => Err(unsupported(&input.operation)),
        }
    }

    pub async fn db(&self, input: RedisDbInput) -> DbResult<String> {
        let op = input.operation.trim().to_ascii_uppercase();
        if !matches!(op.as_str(), "DBSIZE" | "FLUSHDB" | "FLUSHALL") {
            return Err(unsupported(&input.operation));
        }
        let session = self.session(input.connection_id.as_deref()).await?;
        match op.as_str() {
            "DBSIZE" => Ok(session.dbsize().await?.to_string()),
            "FLUSHDB" | "FLUSHALL" => {
                session.flush(op == "FLUSHALL").await?;
                info!(addr = %session.addr(), operation = %op, "Redis database flushed");
                Ok(STATUS_OK.to_string())
            }
            _ => Err(unsupported(&input.operation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn handler() -> RedisToolHandler {
        RedisToolHandler::new(Arc::new(RedisRegistry::default()))
    }

    #[test]
    fn test_arg_text() {
        assert_eq!(arg_text(&json!("abc")), "abc");
        assert_eq!(arg_text(&json!(42)), "42");
        assert_eq!(arg_text(&json!(1.5)), "1.5");
        assert_eq!(arg_text(&json!(true)), "true");
        assert_eq!(arg_text(&json!(null)), "");
        assert_eq!(arg_text(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score(&json!(1)).unwrap(), 1.0);
        assert_eq!(parse_score(&json!(2.5)).unwrap(), 2.5);
        assert_eq!(parse_score(&json!(" -3.25 ")).unwrap(), -3.25);
        assert!(parse_score(&json!("high")).is_err());
        assert!(parse_score(&json!(true)).is_err());
        assert!(parse_score(&json!(null)).is_err());
    }

    #[test]
    fn test_pair_up_rejects_mismatch() {
        let err = pair_up(
            vec!["a".to_string(), "b".to_string()],
            vec!["1".to_string()],
            "keys",
            "values",
        )
        .unwrap_err();
        assert!(err.to_string().contains("same length"));

        let pairs = pair_up(vec![1.0, 2.0], vec!["x".into(), "y".into()], "scores", "members")
            .unwrap();
        assert_eq!(pairs, vec![(1.0, "x".to_string()), (2.0, "y".to_string())]);
    }

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text(None), "null");
        assert_eq!(optional_text(Some("v".into())), "\"v\"");
    }

    #[test]
    fn test_index_defaults() {
        assert_eq!(index(None, 0), 0);
        assert_eq!(index(None, -1), -1);
        assert_eq!(index(Some(5), 0), 5);
    }

    #[test]
    fn test_zset_input_accepts_mixed_scores() {
        let input: RedisZSetInput = serde_json::from_value(json!({
            "operation": "zadd",
            "key": "board",
            "members": ["ann", "bob"],
            "scores": [10, "12.5"]
        }))
        .unwrap();
        assert_eq!(input.scores.len(), 2);
        assert!(!input.with_scores);
        let scores: Vec<f64> = input.scores.iter().map(|s| parse_score(s).unwrap()).collect();
        assert_eq!(scores, vec![10.0, 12.5]);
    }

    #[tokio::test]
    async fn test_unsupported_operation() {
        let err = handler()
            .string(RedisStringInput {
                operation: "APPEND".into(),
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
        assert_eq!(err.to_string(), "Invalid input: Unsupported operation: APPEND");
    }

    #[tokio::test]
    async fn test_operation_checked_before_session() {
        let err = handler()
            .db(RedisDbInput {
                operation: "SHUTDOWN".into(),
                connection_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_calls_require_session() {
        let err = handler()
            .ping(RedisSessionInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ConnectionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_command_fails_before_session() {
        let err = handler()
            .command(RedisCommandInput {
                command: "   ".into(),
                connection_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_del_requires_keys() {
        let err = handler()
            .del(RedisDelInput {
                keys: vec![],
                connection_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let handler = RedisToolHandler::new(Arc::new(RedisRegistry::new(
            Duration::from_millis(500),
            Duration::from_millis(500),
        )));
        let result = handler
            .connect(RedisConnectInput {
                addr: "127.0.0.1:1".into(),
                password: None,
                db: 0,
                ssl_insecure_skip_verify: false,
                connection_id: None,
            })
            .await;
        assert!(result.is_err());
    }
}
