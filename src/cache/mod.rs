// src/cache/mod.rs
//! Two-tier key/value cache: a fast in-process tier with a bounded TTL in
//! front of an optional durable Redis tier. Backend faults are never
//! surfaced — a broken tier behaves like a miss, because cached values are
//! idempotently regenerable.

pub mod memory;
pub mod redis;

use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use memory::MemoryTier;
pub use redis::RedisTier;

/// Upper bound on memory-tier entry lifetime, independent of the TTL the
/// caller requests for the durable tier.
pub const MEMORY_TTL_CAP: Duration = Duration::from_secs(60);

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cache_memory_hits_total", "Memory-tier cache hits.");
        describe_counter!("cache_redis_hits_total", "Durable-tier cache hits.");
        describe_counter!("cache_misses_total", "Total cache misses (both tiers).");
        describe_counter!("cache_redis_errors_total", "Durable-tier faults treated as misses.");
    });
}

/// Counts removed from each tier by a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FlushCounts {
    pub memory: usize,
    pub redis: usize,
}

pub struct FeedCache {
    memory: MemoryTier,
    redis: Option<RedisTier>,
}

impl FeedCache {
    pub fn new(redis: Option<RedisTier>) -> Self {
        ensure_metrics_described();
        Self {
            memory: MemoryTier::new(MEMORY_TTL_CAP),
            redis,
        }
    }

    /// Memory-only cache, used in tests and when Redis is not configured.
    pub fn memory_only() -> Self {
        Self::new(None)
    }

    /// Memory tier first; on a miss, the durable tier backfills the memory
    /// tier with a capped TTL. Never raises — any backend fault is a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(value) = self.memory.get(key) {
            counter!("cache_memory_hits_total").increment(1);
            return serde_json::from_value(value).ok();
        }
        if let Some(redis) = &self.redis {
            match redis.get(key).await {
                Ok(Some(value)) => {
                    counter!("cache_redis_hits_total").increment(1);
                    self.memory.set(key, value.clone(), self.memory.ttl_cap());
                    return serde_json::from_value(value).ok();
                }
                Ok(None) => {}
                Err(e) => {
                    counter!("cache_redis_errors_total").increment(1);
                    tracing::warn!(error = ?e, key, "redis get failed; treating as miss");
                }
            }
        }
        counter!("cache_misses_total").increment(1);
        None
    }

    /// Write both tiers. A durable-tier fault is logged and swallowed; the
    /// memory write has already succeeded, so the system stays available in
    /// degraded form.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };
        self.memory
            .set(key, value.clone(), Duration::from_secs(ttl_secs));
        if let Some(redis) = &self.redis {
            if let Err(e) = redis.set(key, &value, ttl_secs).await {
                counter!("cache_redis_errors_total").increment(1);
                tracing::warn!(error = ?e, key, "redis set failed; memory tier only");
            }
        }
    }

    /// Administrative flush of both tiers by key prefix (everything when
    /// absent). The durable tier is drained via SCAN cursor pagination.
    pub async fn flush(&self, prefix: Option<&str>) -> FlushCounts {
        let memory = self.memory.flush(prefix);

        let mut redis_removed = 0usize;
        if let Some(redis) = &self.redis {
            let pattern = match prefix {
                Some(p) => format!("{p}*"),
                None => "*".to_string(),
            };
            let mut cursor = "0".to_string();
            loop {
                match redis.scan(&cursor, &pattern).await {
                    Ok((next, keys)) => {
                        if !keys.is_empty() {
                            match redis.del(&keys).await {
                                Ok(n) => redis_removed += n as usize,
                                Err(e) => {
                                    tracing::warn!(error = ?e, "redis del failed during flush");
                                    break;
                                }
                            }
                        }
                        if next == "0" {
                            break;
                        }
                        cursor = next;
                    }
                    Err(e) => {
                        counter!("cache_redis_errors_total").increment(1);
                        tracing::warn!(error = ?e, "redis scan failed during flush");
                        break;
                    }
                }
            }
        }

        FlushCounts {
            memory,
            redis: redis_removed,
        }
    }
}
