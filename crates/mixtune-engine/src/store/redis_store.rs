//! Redis session store
//!
//! Holds one multiplexed connection and reconnects lazily after a failure.
//! Every round trip is bounded by `op_timeout`.

use async_trait::async_trait;
use mixtune_common::{MixtuneError, Result};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::KeyValueStore;

/// Redis-backed key-value store
pub struct RedisStore {
    /// Redis client
    client: Client,
    /// Shared connection, `None` after a failure until the next reconnect
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
    /// Upper bound on a single round trip
    op_timeout: Duration,
}

impl RedisStore {
    /// Connect to Redis
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| MixtuneError::Config(format!("Failed to create Redis client: {}", e)))?;

        let connection = client.get_multiplexed_async_connection().await.map_err(|e| {
            MixtuneError::StoreUnavailable(format!("Failed to connect to Redis: {}", e))
        })?;

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(Some(connection))),
            op_timeout: Duration::from_secs(2),
        })
    }

    /// Set the per-operation timeout
    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Get a connection, reconnecting if the last one was dropped
    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        let guard = self.connection.read().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        drop(guard);

        let mut guard = self.connection.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                MixtuneError::StoreUnavailable(format!("Failed to reconnect to Redis: {}", e))
            })?;

        debug!("Reconnected to Redis");
        *guard = Some(connection.clone());
        Ok(connection)
    }

    /// Run one command with the timeout, dropping the connection on failure
    async fn run<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        let outcome = match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => format!("Redis {} failed: {}", op, e),
            Err(_) => format!("Redis {} timed out after {:?}", op, self.op_timeout),
        };

        warn!(op, error = %outcome, "Store error");
        *self.connection.write().await = None;
        Err(MixtuneError::StoreUnavailable(outcome))
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;
        self.run("GET", conn.get(key)).await
    }

    #[instrument(skip(self, value), fields(bytes = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut conn = self.get_connection().await?;
        self.run("SET", conn.set::<_, _, ()>(key, value)).await
    }

    #[instrument(skip(self))]
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        self.run("EXISTS", conn.exists(key)).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let removed: u64 = self.run("DEL", conn.del(key)).await?;
        debug!(key, removed, "Deleted key");
        Ok(())
    }
}
