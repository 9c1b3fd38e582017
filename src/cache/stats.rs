//! Cumulative cache statistics.
//!
//! Counters are updated on every orchestrator call and exposed to callers
//! as an owned [`StatsSnapshot`].

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::cache::entry::Tier;

/// Per-tier counters within a snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TierStats {
    /// Reads served by this tier.
    pub hits: u64,
    /// Reads that checked this tier and found nothing live.
    pub misses: u64,
    /// Entries force-removed to make room (fast tier only in practice).
    pub evictions: u64,
    /// Entries removed because their TTL had elapsed.
    pub expired_purged: u64,
}

impl TierStats {
    /// Hit rate as a percentage of lookups against this tier.
    pub fn hit_rate_pct(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

/// Point-in-time view of the cumulative counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub total_hits: u64,
    pub total_misses: u64,
    /// Overall hit rate in percent.
    pub hit_rate_pct: f64,
    /// Incremental mean latency of `get` calls in milliseconds.
    pub avg_get_latency_ms: f64,
    pub fast: TierStats,
    pub session: TierStats,
    pub durable: TierStats,
}

#[derive(Debug, Default)]
struct StatsInner {
    total_requests: u64,
    total_hits: u64,
    total_misses: u64,
    avg_get_latency_ms: f64,
    tiers: HashMap<Tier, TierStats>,
}

/// Thread-safe cumulative counters owned by the orchestrator.
///
/// The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct CacheStats {
    inner: Mutex<StatsInner>,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed `get`: whether it hit, which tier served it,
    /// which tiers were checked and missed, and the call latency.
    pub fn record_get(&self, served_by: Option<Tier>, missed_tiers: &[Tier], latency_ms: f64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.total_requests += 1;

        // Incremental mean: avg = (avg * (n - 1) + new) / n
        let n = inner.total_requests as f64;
        inner.avg_get_latency_ms = (inner.avg_get_latency_ms * (n - 1.0) + latency_ms) / n;

        match served_by {
            Some(tier) => {
                inner.total_hits += 1;
                inner.tiers.entry(tier).or_default().hits += 1;
            }
            None => {
                inner.total_misses += 1;
            }
        }
        for tier in missed_tiers {
            inner.tiers.entry(*tier).or_default().misses += 1;
        }
    }

    pub fn record_expired_purged(&self, tier: Tier, count: u64) {
        if count == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.tiers.entry(tier).or_default().expired_purged += count;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let tier = |t: Tier| inner.tiers.get(&t).copied().unwrap_or_default();
        let total = inner.total_hits + inner.total_misses;
        let hit_rate_pct = if total == 0 {
            0.0
        } else {
            inner.total_hits as f64 / total as f64 * 100.0
        };
        StatsSnapshot {
            total_requests: inner.total_requests,
            total_hits: inner.total_hits,
            total_misses: inner.total_misses,
            hit_rate_pct,
            avg_get_latency_ms: inner.avg_get_latency_ms,
            fast: tier(Tier::Fast),
            session: tier(Tier::Session),
            durable: tier(Tier::Durable),
        }
    }
}
