// src/core/cache/mod.rs

//! The dedup/rate-limit cache shared by the event pipeline.
//!
//! Two backends satisfy the same contract: a bounded in-process LRU (the
//! default) and a remote RESP key/value store for deployments where several
//! replicas must share rate windows. Selection happens once at startup and
//! is immutable thereafter.

use crate::core::errors::AgentError;
use std::time::Duration;
use tracing::{debug, info};

pub mod local;
pub mod protocol;
pub mod remote;

pub use local::LocalCache;
pub use remote::RemoteCache;

/// The cache handle used by the dispatcher and the memory guard.
pub enum EventCache {
    Local(LocalCache),
    Remote(RemoteCache),
}

impl EventCache {
    /// Selects the backend from the environment: `REDIS_ENABLED=true` picks
    /// the remote store (`REDIS_HOST`/`REDIS_PORT`/`REDIS_PASSWORD`),
    /// anything else the local LRU.
    pub fn from_env() -> Self {
        if env_or("REDIS_ENABLED", "") == "true" {
            let host = env_or("REDIS_HOST", "localhost");
            let port = env_or("REDIS_PORT", "6379").parse().unwrap_or(6379);
            let password = std::env::var("REDIS_PASSWORD").ok();
            info!(host = %host, port, "Using remote event cache");
            EventCache::Remote(RemoteCache::new(host, port, password))
        } else {
            debug!("Using local LRU event cache");
            EventCache::Local(LocalCache::new())
        }
    }

    /// Reads the counter at `key`. Absent or expired entries read as 0.
    pub async fn get_counter(&self, key: &str) -> Result<i64, AgentError> {
        match self {
            EventCache::Local(cache) => Ok(cache.get_counter(key)),
            EventCache::Remote(cache) => cache.get_counter(key).await,
        }
    }

    pub async fn set_counter(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<(), AgentError> {
        match self {
            EventCache::Local(cache) => {
                cache.set_counter(key, value, ttl);
                Ok(())
            }
            EventCache::Remote(cache) => cache.set_counter(key, value, ttl).await,
        }
    }

    /// Adds `delta` to the counter and refreshes its TTL, atomically from
    /// the caller's perspective. Returns the new value.
    pub async fn increment_by(
        &self,
        key: &str,
        delta: i64,
        ttl: Duration,
    ) -> Result<i64, AgentError> {
        match self {
            EventCache::Local(cache) => Ok(cache.increment_by(key, delta, ttl)),
            EventCache::Remote(cache) => cache.increment_by(key, delta, ttl).await,
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), AgentError> {
        match self {
            EventCache::Local(cache) => {
                cache.delete(key);
                Ok(())
            }
            EventCache::Remote(cache) => cache.delete(key).await,
        }
    }

    /// Drops up to `count` entries from the local backend. The remote store
    /// manages its own memory; reclaiming there is a no-op.
    pub fn reclaim(&self, count: usize) -> usize {
        match self {
            EventCache::Local(cache) => cache.prune(count),
            EventCache::Remote(_) => 0,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
