//! Registry of named Redis sessions.

use crate::config::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_QUERY_TIMEOUT_SECS};
use crate::db::ConnectionSummary;
use crate::error::{DbError, DbResult};
use crate::kv::client::RedisSession;
use crate::models::DatabaseType;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;
use url::Url;

/// Named Redis sessions, shared by every tool call.
#[derive(Debug, Clone)]
pub struct RedisRegistry {
    sessions: Arc<RwLock<HashMap<String, RedisSession>>>,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl RedisRegistry {
    pub fn new(connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            connect_timeout,
            command_timeout,
        }
    }

    /// Open a session and register it under `connection_id`.
    ///
    /// The server must answer PING before the session is registered. An
    /// existing session with the same id is replaced. Returns the new session
    /// and whether one was replaced.
    pub async fn connect(&self, connection_id: &str, url: &Url) -> DbResult<(RedisSession, bool)> {
        let session = RedisSession::open(url, self.connect_timeout, self.command_timeout).await?;

        let previous = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(connection_id.to_string(), session.clone())
        };
        let replaced = previous.is_some();

        info!(
            connection_id = %connection_id,
            addr = %session.addr(),
            db = session.db(),
            replaced,
            "Connected to Redis"
        );
        Ok((session, replaced))
    }

    pub async fn get(&self, connection_id: &str) -> DbResult<RedisSession> {
        let sessions = self.sessions.read().await;
        sessions
            .get(connection_id)
            .cloned()
            .ok_or_else(|| DbError::connection_not_found(connection_id))
    }

    /// Remove one session. Its connection closes when the last in-flight call
    /// holding a clone finishes.
    pub async fn disconnect(&self, connection_id: &str) -> DbResult<()> {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(connection_id)
        };
        match removed {
            Some(_) => {
                info!(connection_id = %connection_id, "Disconnected from Redis");
                Ok(())
            }
            None => Err(DbError::connection_not_found(connection_id)),
        }
    }

    pub async fn exists(&self, connection_id: &str) -> bool {
        self.sessions.read().await.contains_key(connection_id)
    }

    pub async fn list(&self) -> Vec<ConnectionSummary> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<ConnectionSummary> = sessions
            .iter()
            .map(|(id, session)| ConnectionSummary {
                id: id.clone(),
                db_type: DatabaseType::Redis,
                target: session.addr().to_string(),
                database: Some(session.db().to_string()),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn close_all(&self) {
        let drained: Vec<String> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(id, _)| id).collect()
        };
        for id in &drained {
            info!(connection_id = %id, "Closing Redis session");
        }
        info!(count = drained.len(), "All Redis sessions closed");
    }
}

impl Default for RedisRegistry {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        )
    }
}
