//! The cache orchestrator: a three-tier lookup chain with promotion.
//!
//! Reads walk fast → session → durable and stop at the first live hit,
//! copying the value into every faster tier on the way out. Writes fan out
//! to each tier whose size threshold and availability permit. All public
//! methods are infallible: a failure below this boundary degrades to "that
//! tier is empty" and is logged, never surfaced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::entry::{Clock, SystemClock, Tier};
use crate::cache::policy::{resolve_category, PolicyTable};
use crate::cache::prefetch::{HexagramNeighbors, PrefetchQueue, RelatedKeys};
use crate::cache::stats::{CacheStats, StatsSnapshot};
use crate::config::CacheConfig;
use crate::tier::durable::DurableTier;
use crate::tier::fast::FastTier;
use crate::tier::session::SessionTier;
use crate::tier::{TierHit, TierStore};

/// Category writes to which enqueue related-key prefetch hints.
const PREFETCH_CATEGORY: &str = "hexagram";

/// Which tier(s) a [`TieredCache::clear`] call empties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearScope {
    #[default]
    All,
    Fast,
    Session,
    Durable,
}

/// Per-call options for [`TieredCache::get_with`].
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Category to use for promotion writes instead of the stored one.
    pub category: Option<String>,
}

/// Per-call options for [`TieredCache::set_with`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Explicit category; overrides key-prefix detection.
    pub category: Option<String>,

    /// Explicit priority; overrides the category table.
    pub priority: Option<u32>,
}

/// Three-tier cache over an opaque serializable payload type.
///
/// Owns the tier adapters and the prefetch queue exclusively; callers only
/// ever go through this type. Wrap it in an [`Arc`] to share it and to run
/// background maintenance.
pub struct TieredCache<V> {
    fast: FastTier<V>,
    session: SessionTier<V>,
    durable: DurableTier<V>,
    policies: Arc<PolicyTable>,
    config: CacheConfig,
    stats: CacheStats,
    prefetch: Mutex<PrefetchQueue>,
    related: Box<dyn RelatedKeys>,
    drain_in_flight: AtomicBool,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl<V> TieredCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Build a cache against the wall clock.
    pub async fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Build a cache with an injected time source (tests drive expiry with
    /// a manual clock).
    pub async fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let policies = Arc::new(PolicyTable::new(config.categories.clone()));

        let fast = FastTier::new(
            config.fast.capacity,
            config.fast_base_ttl().as_millis() as u64,
            Arc::clone(&policies),
            Arc::clone(&clock),
        );
        let session = SessionTier::new(
            config.session.enabled,
            config.session.quota_bytes,
            config.session_base_ttl().as_millis() as u64,
            Arc::clone(&policies),
            Arc::clone(&clock),
        );
        let durable = DurableTier::open(
            config.durable.enabled,
            config.durable.path.clone(),
            config.durable_base_ttl().as_millis() as u64,
            Arc::clone(&policies),
            Arc::clone(&clock),
        )
        .await;

        info!(
            fast_capacity = config.fast.capacity,
            session_available = session.available(),
            durable_available = durable.available(),
            "Tiered cache initialized"
        );

        let prefetch = Mutex::new(PrefetchQueue::new(config.maintenance.prefetch_queue_max));
        Self {
            fast,
            session,
            durable,
            policies,
            config,
            stats: CacheStats::new(),
            prefetch,
            related: Box::new(HexagramNeighbors),
            drain_in_flight: AtomicBool::new(false),
            maintenance: Mutex::new(None),
        }
    }

    /// Replace the related-key strategy used for prefetch hints.
    pub fn with_related_keys(mut self, strategy: Box<dyn RelatedKeys>) -> Self {
        self.related = strategy;
        self
    }

    /// Look a key up across the tiers, promoting on slow-tier hits.
    pub async fn get(&self, key: &str) -> Option<V> {
        self.get_with(key, GetOptions::default()).await
    }

    /// [`get`](Self::get) with an optional category override for the
    /// promotion writes.
    pub async fn get_with(&self, key: &str, options: GetOptions) -> Option<V> {
        let start = Instant::now();

        if let Some(hit) = self.fast.get(key).await {
            self.record_get(start, Some(Tier::Fast), &[]);
            return Some(hit.value);
        }

        if let Some(hit) = self.session.get(key).await {
            self.promote(key, &hit, options.category.as_deref(), Tier::Session)
                .await;
            self.record_get(start, Some(Tier::Session), Tier::Session.faster_tiers());
            return Some(hit.value);
        }

        if let Some(hit) = self.durable.get(key).await {
            self.promote(key, &hit, options.category.as_deref(), Tier::Durable)
                .await;
            self.record_get(start, Some(Tier::Durable), Tier::Durable.faster_tiers());
            return Some(hit.value);
        }

        self.record_get(start, None, &[Tier::Fast, Tier::Session, Tier::Durable]);
        None
    }

    /// Store a value, fanning out to every eligible tier. Never fails from
    /// the caller's perspective; tier failures are logged and swallowed.
    pub async fn set(&self, key: &str, value: V) {
        self.set_with(key, value, SetOptions::default()).await;
    }

    /// [`set`](Self::set) with an explicit category or priority.
    pub async fn set_with(&self, key: &str, value: V, options: SetOptions) {
        let category = resolve_category(key, options.category.as_deref());
        let priority = options
            .priority
            .unwrap_or_else(|| self.policies.priority(&category));

        // Serialize-and-measure; a value that will not serialize still gets
        // the live-object tier, with a default size estimate.
        let (approx_size, serializable) = match serde_json::to_string(&value) {
            Ok(raw) => (raw.len(), true),
            Err(e) => {
                warn!(key, error = %e, "Payload not serializable, using default size estimate");
                (self.config.thresholds.default_size_estimate, false)
            }
        };

        if approx_size <= self.config.thresholds.small_object_max {
            if let Err(e) = self
                .fast
                .set(key, &value, &category, priority, approx_size)
                .await
            {
                debug!(key, error = %e, "Fast tier write skipped");
            }
        }

        if serializable
            && approx_size <= self.config.thresholds.medium_object_max
            && self.session.available()
        {
            if let Err(e) = self
                .session
                .set(key, &value, &category, priority, approx_size)
                .await
            {
                debug!(key, error = %e, "Session tier write skipped");
            }
        }

        if serializable && self.durable.available() {
            if let Err(e) = self
                .durable
                .set(key, &value, &category, priority, approx_size)
                .await
            {
                debug!(key, error = %e, "Durable tier write skipped");
            }
        }

        if category == PREFETCH_CATEGORY {
            self.enqueue_related(key);
        }
    }

    /// Remove a key from every tier.
    pub async fn delete(&self, key: &str) {
        self.fast.delete(key).await;
        self.session.delete(key).await;
        self.durable.delete(key).await;
    }

    /// Clear the requested tier(s); idempotent.
    pub async fn clear(&self, scope: ClearScope) {
        match scope {
            ClearScope::All => {
                self.fast.clear().await;
                self.session.clear().await;
                self.durable.clear().await;
            }
            ClearScope::Fast => self.fast.clear().await,
            ClearScope::Session => self.session.clear().await,
            ClearScope::Durable => self.durable.clear().await,
        }
        debug!(?scope, "Cleared cache tier(s)");
    }

    /// Whether any tier holds a live entry for the key. Does not promote
    /// and does not touch the hit/miss counters.
    pub async fn contains(&self, key: &str) -> bool {
        self.fast.contains(key).await
            || self.session.contains(key).await
            || self.durable.contains(key).await
    }

    /// Entry count of one tier. May include expired-but-unswept entries.
    pub async fn tier_count(&self, tier: Tier) -> usize {
        self.adapter(tier).count().await
    }

    /// Cumulative counters since construction.
    pub fn stats(&self) -> StatsSnapshot {
        let mut snapshot = self.stats.snapshot();
        snapshot.fast.evictions = self.fast.evictions();
        snapshot
    }

    /// Pending prefetch hints.
    pub fn prefetch_len(&self) -> usize {
        self.prefetch.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// One maintenance pass: purge expired entries from every tier, then
    /// probe a batch of prefetch hints. Called on a timer by the
    /// maintenance task; tests call it directly.
    pub async fn run_maintenance(&self) {
        let purged_fast = self.fast.purge_expired().await;
        let purged_session = self.session.purge_expired().await;
        let purged_durable = self.durable.purge_expired().await;
        self.stats.record_expired_purged(Tier::Fast, purged_fast as u64);
        self.stats
            .record_expired_purged(Tier::Session, purged_session as u64);
        self.stats
            .record_expired_purged(Tier::Durable, purged_durable as u64);

        let total = purged_fast + purged_session + purged_durable;
        if total > 0 {
            info!(
                fast = purged_fast,
                session = purged_session,
                durable = purged_durable,
                "Cleanup pass removed expired entries"
            );
        }

        self.drain_prefetch().await;
    }

    /// Probe up to one batch of prefetch hints. A probe is a plain `get`,
    /// so a durable-only hit is promoted as a side effect; a full miss is
    /// the signal for the caller layer to load the key. At most one drain
    /// runs at a time.
    async fn drain_prefetch(&self) {
        if self
            .drain_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let batch = {
            let mut queue = self.prefetch.lock().unwrap_or_else(|e| e.into_inner());
            queue.drain(self.config.maintenance.prefetch_batch)
        };
        for key in batch {
            if self.get(&key).await.is_none() {
                debug!(key, "Prefetch probe missed; upstream should populate this key");
            }
        }

        self.drain_in_flight.store(false, Ordering::Release);
    }

    /// Start the periodic cleanup/prefetch task. Idempotent; the task ends
    /// when the cache is dropped or [`stop_maintenance`](Self::stop_maintenance)
    /// is called.
    pub fn start_maintenance(self: &Arc<Self>) {
        let mut guard = self.maintenance.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return;
        }
        let interval = self.config.maintenance_interval();
        // Weak, so an abandoned cache is not kept alive by its own task.
        let cache: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // the first tick completes immediately
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => cache.run_maintenance().await,
                    None => break,
                }
            }
        });
        *guard = Some(handle);
        debug!(interval_secs = interval.as_secs(), "Maintenance task started");
    }

    /// Stop the periodic task; idempotent.
    pub fn stop_maintenance(&self) {
        let handle = self
            .maintenance
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Maintenance task stopped");
        }
    }

    fn adapter(&self, tier: Tier) -> &dyn TierStore<V> {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Session => &self.session,
            Tier::Durable => &self.durable,
        }
    }

    /// Copy a hit into every tier faster than its source, fastest first.
    async fn promote(
        &self,
        key: &str,
        hit: &TierHit<V>,
        category_override: Option<&str>,
        source: Tier,
    ) {
        let category = category_override.unwrap_or(&hit.category);
        for tier in source.faster_tiers() {
            let target = self.adapter(*tier);
            if !target.available() {
                continue;
            }
            if let Err(e) = target
                .set(key, &hit.value, category, hit.priority, hit.approx_size)
                .await
            {
                debug!(key, tier = %target.tier(), error = %e, "Promotion write skipped");
            }
        }
    }

    fn enqueue_related(&self, key: &str) {
        let related = self.related.related(key);
        if related.is_empty() {
            return;
        }
        let mut queue = self.prefetch.lock().unwrap_or_else(|e| e.into_inner());
        for related_key in related {
            queue.enqueue(&related_key);
        }
    }

    fn record_get(&self, start: Instant, served_by: Option<Tier>, missed: &[Tier]) {
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.stats.record_get(served_by, missed, latency_ms);
    }
}

impl<V> Drop for TieredCache<V> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .maintenance
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}
