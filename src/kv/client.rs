//! Redis session.
//!
//! A [`RedisSession`] owns one multiplexed connection. The connection is
//! cloned per call, so concurrent tool calls on the same session pipeline
//! over a single socket. Every call is bounded by the session's command
//! timeout.

use crate::error::{DbError, DbResult};
use crate::kv::command::{CommandArg, to_cmd};
use crate::kv::reply::ReplyValue;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

/// Where and how to reach a Redis server.
#[derive(Debug, Clone, Default)]
pub struct RedisTarget {
    /// `host:port`, or a full `redis://` / `rediss://` URL.
    pub addr: String,
    pub password: Option<String>,
    pub db: i64,
    /// Use TLS without verifying the server certificate.
    pub ssl_insecure_skip_verify: bool,
}

impl RedisTarget {
    /// Build the client URL. Sensitive: carries the password.
    pub fn to_url(&self) -> DbResult<Url> {
        let raw = if self.addr.contains("://") {
            self.addr.clone()
        } else {
            let scheme = if self.ssl_insecure_skip_verify {
                "rediss"
            } else {
                "redis"
            };
            format!("{scheme}://{}", self.addr)
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| DbError::invalid_input(format!("Invalid Redis address '{}': {e}", self.addr)))?;
        if !matches!(url.scheme(), "redis" | "rediss") {
            return Err(DbError::invalid_input(format!(
                "Unsupported Redis scheme '{}'",
                url.scheme()
            )));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(DbError::invalid_input("Redis address requires a host"));
        }

        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| DbError::invalid_input("Redis address cannot carry a password"))?;
        }
        url.set_path(&format!("/{}", self.db));
        if self.ssl_insecure_skip_verify && url.scheme() == "rediss" {
            url.set_fragment(Some("insecure"));
        }
        Ok(url)
    }
}

/// `host:port` of a Redis URL, for display.
pub fn display_addr(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// One live Redis connection.
#[derive(Clone)]
pub struct RedisSession {
    conn: MultiplexedConnection,
    addr: String,
    db: i64,
    command_timeout: Duration,
}

impl std::fmt::Debug for RedisSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSession")
            .field("addr", &self.addr)
            .field("db", &self.db)
            .finish()
    }
}

impl RedisSession {
    /// Connect and verify the server answers PING.
    pub async fn open(
        url: &Url,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> DbResult<Self> {
        let addr = display_addr(url);
        let db = url
            .path()
            .trim_start_matches('/')
            .parse::<i64>()
            .unwrap_or_default();
        debug!(addr = %addr, db, "Opening Redis connection");

        let client = redis::Client::open(url.as_str())?;
        let conn = match timeout(connect_timeout, client.get_multiplexed_async_connection()).await
        {
            Ok(conn) => conn?,
            Err(_) => {
                return Err(DbError::connection(
                    format!(
                        "Timed out connecting to {addr} after {}s",
                        connect_timeout.as_secs()
                    ),
                    "Check that the Redis server is running and reachable",
                ));
            }
        };

        let session = Self {
            conn,
            addr,
            db,
            command_timeout,
        };
        session.ping().await?;
        Ok(session)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn db(&self) -> i64 {
        self.db
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> DbResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.command_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DbError::timeout(
                operation,
                self.command_timeout.as_secs() as u32,
            )),
        }
    }

    pub async fn ping(&self) -> DbResult<String> {
        let mut conn = self.conn.clone();
        self.bounded("PING", async move {
            let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(pong)
        })
        .await
    }

    /// Run an arbitrary tokenized command.
    pub async fn run(&self, args: &[CommandArg]) -> DbResult<ReplyValue> {
        let cmd = to_cmd(args)?;
        let mut conn = self.conn.clone();
        debug!(command = %args[0], args = args.len() - 1, "Running Redis command");
        let value = self
            .bounded("redis command", async move {
                let value: redis::Value = cmd.query_async(&mut conn).await?;
                Ok(value)
            })
            .await?;
        Ok(value.into())
    }

    /// Evaluate a Lua script.
    pub async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> DbResult<ReplyValue> {
        let mut cmd = redis::cmd("EVAL");
        cmd.arg(script).arg(keys.len()).arg(keys).arg(args);
        let mut conn = self.conn.clone();
        let value = self
            .bounded("lua script", async move {
                let value: redis::Value = cmd.query_async(&mut conn).await?;
                Ok(value)
            })
            .await?;
        Ok(value.into())
    }

    pub async fn info(&self, section: Option<&str>) -> DbResult<String> {
        let mut cmd = redis::cmd("INFO");
        if let Some(section) = section.filter(|s| !s.is_empty()) {
            cmd.arg(section);
        }
        let mut conn = self.conn.clone();
        self.bounded("INFO", async move {
            let info: String = cmd.query_async(&mut conn).await?;
            Ok(info)
        })
        .await
    }

    pub async fn keys(&self, pattern: &str) -> DbResult<Vec<String>> {
        let mut conn = self.conn.clone();
        self.bounded("KEYS", async move { conn.keys(pattern).await })
            .await
    }

    /// Type and TTL of a key, or `None` when it does not exist.
    pub async fn key_info(&self, key: &str) -> DbResult<Option<KeyInfo>> {
        let mut conn = self.conn.clone();
        self.bounded("key info", async move {
            let exists: i64 = conn.exists(key).await?;
            if exists == 0 {
                return Ok(None);
            }
            let key_type: String = redis::cmd("TYPE").arg(key).query_async(&mut conn).await?;
            let ttl: i64 = conn.ttl(key).await?;
            Ok(Some(KeyInfo { key_type, ttl }))
        })
        .await
    }

    pub async fn del(&self, keys: &[String]) -> DbResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded("DEL", async move { conn.del(keys).await }).await
    }

    /// Set a TTL. Fractions are truncated to whole seconds; a positive TTL
    /// below one second becomes one second.
    pub async fn expire(&self, key: &str, seconds: f64) -> DbResult<()> {
        let secs = whole_seconds(seconds);
        let mut conn = self.conn.clone();
        self.bounded("EXPIRE", async move {
            let _: i64 = conn.expire(key, secs).await?;
            Ok(())
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Strings
    // -------------------------------------------------------------------------

    pub async fn set(&self, key: &str, value: &str, expire_secs: u64) -> DbResult<()> {
        let mut conn = self.conn.clone();
        self.bounded("SET", async move {
            if expire_secs > 0 {
                let _: () = conn.set_ex(key, value, expire_secs).await?;
            } else {
                let _: () = conn.set(key, value).await?;
            }
            Ok(())
        })
        .await
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded("GET", async move { conn.get(key).await }).await
    }

    pub async fn mget(&self, keys: &[String]) -> DbResult<Vec<Option<String>>> {
        let mut cmd = redis::cmd("MGET");
        cmd.arg(keys);
        let mut conn = self.conn.clone();
        self.bounded("MGET", async move { cmd.query_async(&mut conn).await })
            .await
    }

    pub async fn mset(&self, pairs: &[(String, String)]) -> DbResult<()> {
        let mut conn = self.conn.clone();
        self.bounded("MSET", async move {
            let _: () = conn.mset(pairs).await?;
            Ok(())
        })
        .await
    }

    /// INCRBY with a signed delta; DECR and DECRBY are negative deltas.
    pub async fn incr_by(&self, key: &str, delta: i64) -> DbResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded("INCRBY", async move { conn.incr(key, delta).await })
            .await
    }

    // -------------------------------------------------------------------------
    // Hashes
    // -------------------------------------------------------------------------

    /// Returns the number of fields that were added.
    pub async fn hset(&self, key: &str, pairs: &[(String, String)]) -> DbResult<i64> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in pairs {
            cmd.arg(field).arg(value);
        }
        let mut conn = self.conn.clone();
        self.bounded("HSET", async move { cmd.query_async(&mut conn).await })
            .await
    }

    pub async fn hget(&self, key: &str, field: &str) -> DbResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded("HGET", async move { conn.hget(key, field).await })
            .await
    }

    pub async fn hgetall(&self, key: &str) -> DbResult<BTreeMap<String, String>> {
        let mut conn = self.conn.clone();
        self.bounded("HGETALL", async move { conn.hgetall(key).await })
            .await
    }

    pub async fn hdel(&self, key: &str, fields: &[String]) -> DbResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded("HDEL", async move { conn.hdel(key, fields).await })
            .await
    }

    pub async fn hexists(&self, key: &str, field: &str) -> DbResult<bool> {
        let mut conn = self.conn.clone();
        self.bounded("HEXISTS", async move { conn.hexists(key, field).await })
            .await
    }

    pub async fn hkeys(&self, key: &str) -> DbResult<Vec<String>> {
        let mut conn = self.conn.clone();
        self.bounded("HKEYS", async move { conn.hkeys(key).await })
            .await
    }

    pub async fn hlen(&self, key: &str) -> DbResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded("HLEN", async move { conn.hlen(key).await })
            .await
    }

    // -------------------------------------------------------------------------
    // Lists
    // -------------------------------------------------------------------------

    /// LPUSH or RPUSH; returns the new list length.
    pub async fn push(&self, end: ListEnd, key: &str, values: &[String]) -> DbResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded(end.push_command(), async move {
            match end {
                ListEnd::Left => conn.lpush(key, values).await,
                ListEnd::Right => conn.rpush(key, values).await,
            }
        })
        .await
    }

    pub async fn pop(&self, end: ListEnd, key: &str) -> DbResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded(end.pop_command(), async move {
            match end {
                ListEnd::Left => conn.lpop(key, None).await,
                ListEnd::Right => conn.rpop(key, None).await,
            }
        })
        .await
    }

    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> DbResult<Vec<String>> {
        let mut conn = self.conn.clone();
        self.bounded("LRANGE", async move { conn.lrange(key, start, stop).await })
            .await
    }

    pub async fn llen(&self, key: &str) -> DbResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded("LLEN", async move { conn.llen(key).await })
            .await
    }

    // -------------------------------------------------------------------------
    // Sets
    // -------------------------------------------------------------------------

    pub async fn sadd(&self, key: &str, members: &[String]) -> DbResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded("SADD", async move { conn.sadd(key, members).await })
            .await
    }

    pub async fn smembers(&self, key: &str) -> DbResult<Vec<String>> {
        let mut conn = self.conn.clone();
        self.bounded("SMEMBERS", async move { conn.smembers(key).await })
            .await
    }

    pub async fn srem(&self, key: &str, members: &[String]) -> DbResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded("SREM", async move { conn.srem(key, members).await })
            .await
    }

    pub async fn sismember(&self, key: &str, member: &str) -> DbResult<bool> {
        let mut conn = self.conn.clone();
        self.bounded("SISMEMBER", async move { conn.sismember(key, member).await })
            .await
    }

    pub async fn scard(&self, key: &str) -> DbResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded("SCARD", async move { conn.scard(key).await })
            .await
    }

    // -------------------------------------------------------------------------
    // Sorted sets
    // -------------------------------------------------------------------------

    /// `entries` are `(score, member)`; returns the number of new members.
    pub async fn zadd(&self, key: &str, entries: &[(f64, String)]) -> DbResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded("ZADD", async move { conn.zadd_multiple(key, entries).await })
            .await
    }

    pub async fn zrange(&self, key: &str, start: isize, stop: isize) -> DbResult<Vec<String>> {
        let mut conn = self.conn.clone();
        self.bounded("ZRANGE", async move { conn.zrange(key, start, stop).await })
            .await
    }

    pub async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> DbResult<Vec<(String, f64)>> {
        let mut conn = self.conn.clone();
        self.bounded("ZRANGE", async move {
            conn.zrange_withscores(key, start, stop).await
        })
        .await
    }

    pub async fn zrem(&self, key: &str, members: &[String]) -> DbResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded("ZREM", async move { conn.zrem(key, members).await })
            .await
    }

    pub async fn zscore(&self, key: &str, member: &str) -> DbResult<Option<f64>> {
        let mut conn = self.conn.clone();
        self.bounded("ZSCORE", async move { conn.zscore(key, member).await })
            .await
    }

    pub async fn zcard(&self, key: &str) -> DbResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded("ZCARD", async move { conn.zcard(key).await })
            .await
    }

    // -------------------------------------------------------------------------
    // Database
    // -------------------------------------------------------------------------

    pub async fn dbsize(&self) -> DbResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded("DBSIZE", async move {
            redis::cmd("DBSIZE").query_async(&mut conn).await
        })
        .await
    }

    /// FLUSHDB, or FLUSHALL when `all` is set.
    pub async fn flush(&self, all: bool) -> DbResult<()> {
        let name = if all { "FLUSHALL" } else { "FLUSHDB" };
        let mut conn = self.conn.clone();
        self.bounded(name, async move {
            let _: () = redis::cmd(name).query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}

/// Metadata of an existing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub key_type: String,
    /// Seconds; -1 when the key has no expiry.
    pub ttl: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEnd {
    Left,
    Right,
}

impl ListEnd {
    fn push_command(self) -> &'static str {
        match self {
            Self::Left => "LPUSH",
            Self::Right => "RPUSH",
        }
    }

    fn pop_command(self) -> &'static str {
        match self {
            Self::Left => "LPOP",
            Self::Right => "RPOP",
        }
    }
}

fn whole_seconds(seconds: f64) -> i64 {
    if seconds > 0.0 && seconds < 1.0 {
        1
    } else {
        seconds.trunc() as i64
    }
}
