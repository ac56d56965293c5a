//! Content-addressed stage cache.
//!
//! Memoizes extraction, structuring and report generation by the exact bytes
//! of their input plus the model and prompt that produced them. Entries expire
//! after a TTL; there is no other invalidation. The cache is an optimization
//! only: read and write failures are logged and the stage runs normally.

use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use sha2::{Digest, Sha256};
use thiserror::Error;

const KEY_PREFIX: &str = "stage:";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Pipeline stages whose results may be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Structuring,
    Report,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Structuring => "structuring",
            Stage::Report => "report",
        }
    }
}

/// Identifies one cached stage result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageKey {
    pub stage: Stage,
    /// Model id, or the extractor backend for extraction.
    pub model: &'static str,
    /// Hash of the prompt template(s) used by the stage.
    pub prompt_hash: String,
    pub input_hash: String,
}

impl StageKey {
    pub fn new(stage: Stage, model: &'static str, prompts: &[&str], input: &[u8]) -> Self {
        Self {
            stage,
            model,
            prompt_hash: hash_bytes(prompts.join("\n").as_bytes()),
            input_hash: hash_bytes(input),
        }
    }

    /// Storage key: `stage:<sha256 of all components>`.
    pub fn to_cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.stage.as_str());
        hasher.update(b"|");
        hasher.update(self.model);
        hasher.update(b"|");
        hasher.update(&self.prompt_hash);
        hasher.update(b"|");
        hasher.update(&self.input_hash);
        format!("{KEY_PREFIX}{:x}", hasher.finalize())
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[async_trait]
pub trait StageCache: Send + Sync {
    async fn get(&self, key: &StageKey) -> Result<Option<String>, CacheError>;
    async fn put(&self, key: &StageKey, value: &str) -> Result<(), CacheError>;
}

/// Redis-backed stage cache with a fixed TTL per entry.
#[derive(Clone)]
pub struct RedisStageCache {
    client: Client,
    ttl_seconds: u64,
}

impl RedisStageCache {
    /// Opens the client and verifies the connection with a PING.
    pub async fn connect(redis_url: &str, ttl_seconds: u64) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        tracing::info!(ttl_seconds, "Redis stage cache connected");
        Ok(Self {
            client,
            ttl_seconds,
        })
    }
}

#[async_trait]
impl StageCache for RedisStageCache {
    async fn get(&self, key: &StageKey) -> Result<Option<String>, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key.to_cache_key()).await?;
        Ok(value)
    }

    async fn put(&self, key: &StageKey, value: &str) -> Result<(), CacheError> {
        let full_key = key.to_cache_key();
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(&full_key, value, self.ttl_seconds).await?;

        tracing::debug!(key = %full_key, ttl = self.ttl_seconds, "Cached stage result");
        Ok(())
    }
}
