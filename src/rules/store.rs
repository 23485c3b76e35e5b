//! Rule store access.
//!
//! # Responsibilities
//! - Fetch the serialized rule stored under a key
//! - Distinguish "absent" (`Ok(None)`) from transport failures
//!
//! # Design Decisions
//! - The gateway only reads; writes and TTLs belong to the administration layer
//! - Redis connections are established lazily and retried on later requests,
//!   so a store outage at startup does not prevent serving

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Errors raised by a rule store.
#[derive(Debug, Error)]
pub enum RuleStoreError {
    #[error("rule store connection failed: {0}")]
    Connect(#[source] redis::RedisError),

    #[error("rule store command failed: {0}")]
    Command(#[source] redis::RedisError),
}

/// Key-value view of the rule store.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Returns the raw value stored under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, RuleStoreError>;
}

/// Rule store backed by Redis.
pub struct RedisRuleStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisRuleStore {
    /// Create a store for `address`, either `host:port` or a `redis://` URL.
    ///
    /// No connection is made until the first lookup.
    pub fn new(address: &str) -> Result<Self, RuleStoreError> {
        let client = redis::Client::open(redis_url(address)).map_err(RuleStoreError::Connect)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, RuleStoreError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                tracing::info!("Connecting to rule store");
                ConnectionManager::new(self.client.clone()).await
            })
            .await
            .map_err(RuleStoreError::Connect)?;
        Ok(manager.clone())
    }
}

/// Accept bare `host:port` addresses as well as full Redis URLs.
pub fn redis_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    }
}

#[async_trait]
impl RuleStore for RedisRuleStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RuleStoreError> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(RuleStoreError::Command)
    }
}

/// In-process rule store.
///
/// Lets embedders and tests run the gateway against a store with exact
/// contents and no external dependency.
#[derive(Clone, Default)]
pub struct MemoryRuleStore {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RuleStoreError> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }
}
