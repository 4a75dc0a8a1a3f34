//! In-process batch cache.
//!
//! One batch lineage per owner key (user, scope, language). State per key:
//! empty -> composing -> ready -> stale (TTL) | invalidated -> empty.
//! Expiry is lazy, checked on read; there is no sweeper task.
//!
//! Concurrency contract:
//! - single-flight: concurrent `get_or_compose` calls for one key run at
//!   most one composition; late arrivals wait on the per-key lock and pick
//!   up the stored result.
//! - compositions run on a detached task, so a caller disconnecting does
//!   not cancel work other callers are waiting for.
//! - prefetch of the next batch is detached and never blocks or fails the
//!   read that triggered it.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::FeedConfig;
use crate::error::{AppError, Result};
use crate::models::{BatchKey, FeedBatch};
use crate::services::composer::BatchComposer;

struct CachedBatch {
    batch: Arc<FeedBatch>,
    stored_at: Instant,
}

impl CachedBatch {
    fn new(batch: Arc<FeedBatch>) -> Self {
        Self {
            batch,
            stored_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() >= ttl
    }
}

/// Tracks how far a client has paged through the current batch
#[derive(Debug, Default, Clone, Copy)]
struct ConsumptionCursor {
    consumed: usize,
    prefetch_scheduled: bool,
}

/// Point-in-time cache counters
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub entries: usize,
    pub shadow_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub compositions: u64,
    pub prefetches: u64,
    pub promotions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

pub struct BatchCache {
    composer: Arc<BatchComposer>,
    current: DashMap<BatchKey, CachedBatch>,
    /// Prefetched next batches, promoted when the current one is spent
    shadow: DashMap<BatchKey, CachedBatch>,
    cursors: DashMap<BatchKey, ConsumptionCursor>,
    /// Per-key single-flight locks; kept for the cache lifetime
    locks: DashMap<BatchKey, Arc<Mutex<()>>>,
    /// Bumped by `invalidate`; detached tasks from an older generation
    /// must not write their result back
    generations: DashMap<BatchKey, u64>,
    ttl: Duration,
    prefetch_threshold: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    compositions: AtomicU64,
    prefetches: AtomicU64,
    promotions: AtomicU64,
}

impl BatchCache {
    pub fn new(composer: Arc<BatchComposer>, config: &FeedConfig) -> Self {
        Self {
            composer,
            current: DashMap::new(),
            shadow: DashMap::new(),
            cursors: DashMap::new(),
            locks: DashMap::new(),
            generations: DashMap::new(),
            ttl: Duration::from_secs(config.batch_ttl_secs),
            prefetch_threshold: config.prefetch_threshold,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            compositions: AtomicU64::new(0),
            prefetches: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
        }
    }

    /// Return the cached batch for the key, composing one if the slot is
    /// empty, expired, or invalidated. Within TTL and with no intervening
    /// invalidation this is idempotent: same batch, same order.
    pub async fn get_or_compose(self: &Arc<Self>, key: &BatchKey) -> Result<Arc<FeedBatch>> {
        if let Some(batch) = self.live_batch(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(batch);
        }

        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Double-check: an earlier holder may have composed while we waited.
        if let Some(batch) = self.live_batch(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(batch);
        }

        // Roll over to a prefetched batch before composing from scratch.
        if let Some((_, entry)) = self.shadow.remove(key) {
            if !entry.is_expired(self.ttl) {
                let batch = entry.batch.clone();
                self.current.insert(key.clone(), entry);
                self.cursors
                    .insert(key.clone(), ConsumptionCursor::default());
                self.promotions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, batch_id = %batch.batch_id, "promoted prefetched batch");
                return Ok(batch);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        // Detached so one caller's cancellation cannot abort work that
        // other waiters (and the cache) will use.
        let cache = Arc::clone(self);
        let task_key = key.clone();
        let generation = self.generation(key);
        let handle = tokio::spawn(async move {
            let batch = Arc::new(cache.composer.compose(&task_key).await);
            cache.compositions.fetch_add(1, Ordering::Relaxed);
            // An invalidation while we composed supersedes this result;
            // serve it to the waiters but do not cache it.
            if cache.generation(&task_key) == generation {
                cache
                    .current
                    .insert(task_key.clone(), CachedBatch::new(batch.clone()));
                cache
                    .cursors
                    .insert(task_key, ConsumptionCursor::default());
            } else {
                debug!(key = %task_key, "composition superseded by invalidation, not cached");
            }
            batch
        });

        handle
            .await
            .map_err(|err| AppError::Internal(format!("composition task failed: {}", err)))
    }

    /// Record consumption after a page read and schedule a prefetch of the
    /// next batch once half of the current one is consumed. At most one
    /// prefetch per batch lifetime.
    pub fn maybe_prefetch_next(self: &Arc<Self>, key: &BatchKey, consumed: usize) {
        let Some(entry) = self.current.get(key) else {
            return;
        };
        let batch_len = entry.batch.len();
        drop(entry);
        if batch_len == 0 {
            return;
        }

        // Short batches prefetch at their own midpoint
        let threshold = self.prefetch_threshold.min(batch_len);

        {
            let mut cursor = self.cursors.entry(key.clone()).or_default();
            if consumed > cursor.consumed {
                cursor.consumed = consumed;
            }
            if cursor.consumed < threshold || cursor.prefetch_scheduled {
                return;
            }
            cursor.prefetch_scheduled = true;
        }

        if self.has_fresh_shadow(key) {
            return;
        }

        self.prefetches.fetch_add(1, Ordering::Relaxed);
        info!(key = %key, consumed, "prefetching next batch");

        let cache = Arc::clone(self);
        let task_key = key.clone();
        let generation = self.generation(key);
        tokio::spawn(async move {
            let batch = Arc::new(cache.composer.compose(&task_key).await);
            cache.compositions.fetch_add(1, Ordering::Relaxed);
            if cache.generation(&task_key) != generation {
                debug!(key = %task_key, "prefetch superseded by invalidation, dropped");
                return;
            }
            debug!(key = %task_key, batch_id = %batch.batch_id, "prefetch complete");
            cache.shadow.insert(task_key, CachedBatch::new(batch));
        });
    }

    /// Drop batch, shadow batch, and cursor for the key; the next read
    /// recomposes from scratch.
    pub fn invalidate(&self, key: &BatchKey) {
        *self.generations.entry(key.clone()).or_insert(0) += 1;
        self.current.remove(key);
        self.shadow.remove(key);
        self.cursors.remove(key);
        info!(key = %key, "batch invalidated");
    }

    fn generation(&self, key: &BatchKey) -> u64 {
        self.generations.get(key).map(|g| *g).unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.current.len(),
            shadow_entries: self.shadow.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compositions: self.compositions.load(Ordering::Relaxed),
            prefetches: self.prefetches.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
        }
    }

    /// Current batch if it is fresh and not yet spent. A fully consumed
    /// batch with a fresh shadow reads as a miss so the shadow gets
    /// promoted under the key lock.
    fn live_batch(&self, key: &BatchKey) -> Option<Arc<FeedBatch>> {
        let entry = self.current.get(key)?;
        if entry.is_expired(self.ttl) {
            return None;
        }
        let batch = entry.batch.clone();
        drop(entry);

        if !batch.is_empty() {
            let consumed = self
                .cursors
                .get(key)
                .map(|cursor| cursor.consumed)
                .unwrap_or(0);
            if consumed >= batch.len() && self.has_fresh_shadow(key) {
                return None;
            }
        }
        Some(batch)
    }

    fn has_fresh_shadow(&self, key: &BatchKey) -> bool {
        self.shadow
            .get(key)
            .map(|entry| !entry.is_expired(self.ttl))
            .unwrap_or(false)
    }
}
