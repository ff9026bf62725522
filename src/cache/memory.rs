// src/cache/memory.rs
//! In-process cache tier: a TTL map behind an `RwLock`. TTLs are capped so
//! a long durable TTL can never keep this tier serving stale data.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

pub struct MemoryTier {
    entries: RwLock<HashMap<String, Entry>>,
    ttl_cap: Duration,
}

impl MemoryTier {
    pub fn new(ttl_cap: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_cap,
        }
    }

    pub fn ttl_cap(&self) -> Duration {
        self.ttl_cap
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let guard = match self.entries.read() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        let entry = guard.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let ttl = ttl.min(self.ttl_cap);
        let mut guard = match self.entries.write() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        let now = Instant::now();
        // lazy eviction keeps get() on the read path
        guard.retain(|_, e| e.expires_at > now);
        guard.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    /// Remove entries whose key starts with `prefix` (all entries when
    /// absent). Returns the number removed.
    pub fn flush(&self, prefix: Option<&str>) -> usize {
        let mut guard = match self.entries.write() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        let before = guard.len();
        match prefix {
            None => guard.clear(),
            Some(p) => guard.retain(|k, _| !k.starts_with(p)),
        }
        before - guard.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_roundtrip_and_prefix_flush() {
        let tier = MemoryTier::new(Duration::from_secs(60));
        tier.set("feed:video:a", json!({"n": 1}), Duration::from_secs(30));
        tier.set("feed:article:b", json!({"n": 2}), Duration::from_secs(30));

        assert_eq!(tier.get("feed:video:a"), Some(json!({"n": 1})));
        assert_eq!(tier.get("feed:video:missing"), None);

        assert_eq!(tier.flush(Some("feed:video")), 1);
        assert_eq!(tier.get("feed:video:a"), None);
        assert_eq!(tier.get("feed:article:b"), Some(json!({"n": 2})));

        assert_eq!(tier.flush(None), 1);
        assert_eq!(tier.get("feed:article:b"), None);
    }

    #[test]
    fn ttl_is_capped_and_entries_expire() {
        let tier = MemoryTier::new(Duration::from_millis(10));
        // requested TTL far above the cap; entry must still expire quickly
        tier.set("k", json!("v"), Duration::from_secs(3600));
        assert_eq!(tier.get("k"), Some(json!("v")));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(tier.get("k"), None);
    }
}
