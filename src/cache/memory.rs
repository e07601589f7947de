//! In-process credential cache.
//!
//! Used by tests and by `--cache-url memory` for local development. Entries
//! are dropped when read after their expiry, and every [`SWEEP_EVERY`] writes
//! the whole map is swept so keys that are never read again do not pile up.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{CacheError, CredentialCache};

pub const SWEEP_EVERY: usize = 256;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
struct Store {
    entries: HashMap<String, Entry>,
    writes: usize,
}

impl Store {
    fn insert(&mut self, key: &str, entry: Entry, now: Instant) {
        self.writes += 1;
        if self.writes >= SWEEP_EVERY {
            self.writes = 0;
            self.entries.retain(|_, e| e.is_live(now));
        }
        self.entries.insert(key.to_string(), entry);
    }
}

#[derive(Default)]
pub struct MemoryCache {
    store: Mutex<Store>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a live entry.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let store = self.store.lock().await;
        store
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }

    #[cfg(test)]
    async fn stored(&self) -> usize {
        self.store.lock().await.entries.len()
    }
}

#[async_trait]
impl CredentialCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut store = self.store.lock().await;
        match store.entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                store.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut store = self.store.lock().await;
        store.insert(
            key,
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
            now,
        );
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let now = Instant::now();
        let mut store = self.store.lock().await;
        let current = match store.entries.get(key) {
            Some(entry) if entry.is_live(now) => entry
                .value
                .parse::<i64>()
                .map_err(|_| CacheError::NotAnInteger(key.to_string()))?,
            _ => 0,
        };
        let count = current + 1;
        store.insert(
            key,
            Entry {
                value: count.to_string(),
                expires_at: now + ttl,
            },
            now,
        );
        Ok(count)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.lock().await.entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
