//! In-memory hot-object cache.
//!
//! Holds recently served byte payloads keyed by [`CacheKey`]. The cache is
//! bounded by total payload bytes: inserts evict least-recently-used entries
//! until the new payload fits, and a periodic sweep drops entries that have
//! been idle for longer than the configured TTL.
//!
//! Lookups take a shared lock and never block each other; per-entry access
//! bookkeeping and the hit/miss counters are atomics. Inserts, evictions and
//! sweeps take the exclusive lock.

use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

use super::range::ByteRange;

/// Identity of a cached payload.
///
/// Two requests for the same bytes of the same file version produce the same
/// key: the key combines the asset, the resolved byte interval and the file's
/// length and modification time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(asset: &str, file_len: u64, modified: Option<SystemTime>, range: ByteRange) -> Self {
        let modified_nanos = modified
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self(format!(
            "{asset}@{file_len}.{modified_nanos}#{}-{}",
            range.start, range.end
        ))
    }

    /// Key for `range` of the file at `path` with the given metadata.
    pub fn for_file(path: &Path, metadata: &std::fs::Metadata, range: ByteRange) -> Self {
        Self::new(
            &path.to_string_lossy(),
            metadata.len(),
            metadata.modified().ok(),
            range,
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached payload with its access bookkeeping.
#[derive(Debug)]
pub struct CacheEntry {
    payload: Bytes,
    size: u64,
    /// Milliseconds since the cache's epoch.
    last_access: AtomicU64,
    hit_count: AtomicU64,
}

impl CacheEntry {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    total_bytes: u64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub items: usize,
    pub size_bytes: u64,
    pub max_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate as a percentage of all lookups.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64 * 100.0
        }
    }
}

/// Thread-safe, size-bounded payload cache.
#[derive(Debug)]
pub struct ObjectCache {
    inner: RwLock<Inner>,
    capacity_bytes: u64,
    idle_ttl: Duration,
    epoch: Instant,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ObjectCache {
    /// Create a new cache holding at most `capacity_bytes` of payload.
    pub fn new(capacity_bytes: u64, idle_ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity_bytes,
            idle_ttl,
            epoch: Instant::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Look up a payload. Counts a hit or a miss; the cache never loads data itself.
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let inner = self.inner.read();
        match inner.entries.get(key) {
            Some(entry) => {
                entry.last_access.store(self.now_millis(), Ordering::Relaxed);
                entry.hit_count.fetch_add(1, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.payload.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a payload, evicting least-recently-used entries until it fits.
    ///
    /// A payload larger than the whole cache is ignored. Returns whether the
    /// payload was stored.
    pub fn put(&self, key: CacheKey, payload: Bytes) -> bool {
        let size = payload.len() as u64;
        if size > self.capacity_bytes {
            tracing::trace!(key = %key, size, "Payload larger than cache, not caching");
            return false;
        }

        let mut inner = self.inner.write();

        if let Some(old) = inner.entries.remove(&key) {
            inner.total_bytes -= old.size;
        }

        while inner.total_bytes + size > self.capacity_bytes {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access.load(Ordering::Relaxed))
                .map(|(key, _)| key.clone());

            let Some(oldest) = oldest else { break };
            if let Some(evicted) = inner.entries.remove(&oldest) {
                inner.total_bytes -= evicted.size;
                tracing::debug!(key = %oldest, size = evicted.size, "Evicted cache entry");
            }
        }

        let entry = CacheEntry {
            payload,
            size,
            last_access: AtomicU64::new(self.now_millis()),
            hit_count: AtomicU64::new(0),
        };
        inner.entries.insert(key, entry);
        inner.total_bytes += size;
        true
    }

    /// Remove entries idle for longer than the TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let ttl = self.idle_ttl.as_millis() as u64;
        let now = self.now_millis();

        let mut inner = self.inner.write();
        let before = inner.entries.len();
        let mut freed = 0;
        inner.entries.retain(|_, entry| {
            let idle = now.saturating_sub(entry.last_access.load(Ordering::Relaxed));
            if idle > ttl {
                freed += entry.size;
                false
            } else {
                true
            }
        });
        inner.total_bytes -= freed;
        let removed = before - inner.entries.len();

        if removed > 0 {
            tracing::debug!(removed, freed_bytes = freed, "Swept idle cache entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            items: inner.entries.len(),
            size_bytes: inner.total_bytes,
            max_size_bytes: self.capacity_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Get the number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Total payload bytes currently held.
    pub fn total_bytes(&self) -> u64 {
        self.inner.read().total_bytes
    }

    /// Whether `key` is cached, without touching counters or recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.read().entries.contains_key(key)
    }
}

/// Start a background task that sweeps idle entries every `interval`.
///
/// The task stops when `cancel` is triggered.
pub fn start_sweep_task(
    cache: Arc<ObjectCache>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    cache.sweep();
                }
                _ = cancel.cancelled() => {
                    tracing::debug!("Cache sweep task stopped");
                    break;
                }
            }
        }
    })
}
