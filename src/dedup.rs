// src/dedup.rs
//! Time-windowed fingerprint deduplication over a shared sorted-set
//! store. Production uses Redis so horizontally-scaled instances share
//! one view; tests use the in-memory store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Sorted-set style backing store: member → unix-seconds score.
///
/// `add_if_absent` must be atomic (check-and-insert in one op) so two
/// concurrent calls on the same key cannot both observe "new".
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Insert the key scored with `ts_unix` unless it already exists.
    /// Returns true when the key was newly added. An existing key is
    /// never re-scored.
    async fn add_if_absent(&self, key: &str, ts_unix: u64) -> Result<bool>;

    /// Bulk-delete members scored strictly below `cutoff_unix`.
    /// Returns the number removed.
    async fn remove_older_than(&self, cutoff_unix: u64) -> Result<u64>;
}

/// Redis-backed store; one sorted set shared by all monitor instances.
#[derive(Clone)]
pub struct RedisDedupStore {
    conn: redis::aio::ConnectionManager,
    key: String,
}

impl RedisDedupStore {
    pub async fn connect(redis_url: &str, key: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("creating redis client")?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .context("connecting to redis")?;
        Ok(Self {
            conn,
            key: key.into(),
        })
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn add_if_absent(&self, key: &str, ts_unix: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        // ZADD NX is the store's native conditional insert: returns the
        // number of members actually added (0 on pre-existing key).
        let added: i64 = redis::cmd("ZADD")
            .arg(&self.key)
            .arg("NX")
            .arg(ts_unix)
            .arg(key)
            .query_async(&mut conn)
            .await
            .context("ZADD NX")?;
        Ok(added == 1)
    }

    async fn remove_older_than(&self, cutoff_unix: u64) -> Result<u64> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("ZREMRANGEBYSCORE")
            .arg(&self.key)
            .arg("-inf")
            .arg(format!("({cutoff_unix}"))
            .query_async(&mut conn)
            .await
            .context("ZREMRANGEBYSCORE")?;
        Ok(removed)
    }
}

/// In-memory store with the same conditional-insert contract, for
/// tests and single-process runs without Redis.
#[derive(Default)]
pub struct MemoryDedupStore {
    inner: Mutex<HashMap<String, u64>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("dedup store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn add_if_absent(&self, key: &str, ts_unix: u64) -> Result<bool> {
        let mut map = self.inner.lock().expect("dedup store mutex poisoned");
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(key.to_string(), ts_unix);
        Ok(true)
    }

    async fn remove_older_than(&self, cutoff_unix: u64) -> Result<u64> {
        let mut map = self.inner.lock().expect("dedup store mutex poisoned");
        let before = map.len();
        map.retain(|_, ts| *ts >= cutoff_unix);
        Ok((before - map.len()) as u64)
    }
}

/// Membership gate applied to every crawled item.
pub struct Deduplicator {
    store: Arc<dyn DedupStore>,
    retention: Duration,
    cleanup_every: u64,
    calls: AtomicU64,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn DedupStore>, retention: Duration, cleanup_every: u64) -> Self {
        Self {
            store,
            retention,
            cleanup_every: cleanup_every.max(1),
            calls: AtomicU64::new(0),
        }
    }

    /// 30-day retention, sweep every 100th call.
    pub fn with_defaults(store: Arc<dyn DedupStore>) -> Self {
        Self::new(store, Duration::from_secs(30 * 24 * 3600), 100)
    }

    /// Has this fingerprint been seen within the retention window?
    ///
    /// `None` or empty fingerprints are never deduplicable: always
    /// false, no store mutation, no call counted. Otherwise the first
    /// sight inserts a record stamped "now" and reports false; any
    /// later sight reports true.
    pub async fn seen(&self, fingerprint: Option<&str>) -> Result<bool> {
        let key = match fingerprint {
            Some(k) if !k.is_empty() => k,
            _ => return Ok(false),
        };

        let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.cleanup_every == 0 {
            let removed = self.cleanup().await?;
            if removed > 0 {
                tracing::debug!(removed, "dedup cleanup sweep");
            }
        }

        let newly_added = self.store.add_if_absent(key, now_unix()).await?;
        if !newly_added {
            counter!("dedup_hits_total").increment(1);
        }
        Ok(!newly_added)
    }

    /// Remove records that aged out of the retention window.
    pub async fn cleanup(&self) -> Result<u64> {
        let cutoff = now_unix().saturating_sub(self.retention.as_secs());
        self.store.remove_older_than(cutoff).await
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
