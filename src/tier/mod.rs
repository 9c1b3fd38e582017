//! Storage tier adapters.
//!
//! Three backends with the same contract and different media:
//! - [`fast`]: process-local volatile map with a hard LRU capacity
//! - [`session`]: session-scoped string store under a byte quota
//! - [`durable`]: file-per-entry store that survives restarts
//!
//! Absence is a normal outcome everywhere; only `set` reports failures,
//! and the orchestrator swallows those after logging.

pub mod durable;
pub mod fast;
pub mod session;

use async_trait::async_trait;

use crate::cache::entry::Tier;
use crate::error::TierError;

/// A live value returned by a tier, with the metadata a promotion write
/// needs.
#[derive(Debug, Clone)]
pub struct TierHit<V> {
    pub value: V,
    pub category: String,
    pub priority: u32,
    pub approx_size: usize,
}

/// Uniform contract across the three tier adapters.
///
/// An adapter may be structurally unavailable (detected once at
/// construction); every operation on an unavailable adapter is a no-op
/// returning absent, so callers never special-case it.
#[async_trait]
pub trait TierStore<V>: Send + Sync
where
    V: Send + Sync,
{
    fn tier(&self) -> Tier;

    fn available(&self) -> bool;

    /// Fetch a live entry. Expired or malformed entries are deleted as a
    /// side effect and read as absent.
    async fn get(&self, key: &str) -> Option<TierHit<V>>;

    /// Whether a live entry exists, without refreshing recency or
    /// deserializing the payload. Expired entries are still deleted.
    async fn contains(&self, key: &str) -> bool;

    /// Write an entry, overwriting any prior one and computing its expiry
    /// from this tier's base TTL and the category's multiplier.
    async fn set(
        &self,
        key: &str,
        value: &V,
        category: &str,
        priority: u32,
        approx_size: usize,
    ) -> Result<(), TierError>;

    /// Unconditional removal; idempotent.
    async fn delete(&self, key: &str);

    /// Drop everything in this tier; idempotent.
    async fn clear(&self);

    /// Number of stored entries. May include expired-but-unswept entries.
    async fn count(&self) -> usize;

    /// Remove every expired entry; returns how many were removed.
    async fn purge_expired(&self) -> usize;
}

/// Expiry timestamp for an entry created at `now_ms`.
///
/// Always strictly after `now_ms`, even when the scaled TTL rounds to
/// zero.
pub(crate) fn compute_expiry(now_ms: u64, base_ttl_ms: u64, ttl_multiplier: f64) -> u64 {
    let ttl = (base_ttl_ms as f64 * ttl_multiplier).round() as u64;
    now_ms + ttl.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_scales_with_multiplier() {
        assert_eq!(compute_expiry(1_000, 300_000, 1.0), 301_000);
        assert_eq!(compute_expiry(1_000, 300_000, 4.0), 1_201_000);
    }

    #[test]
    fn test_expiry_always_after_creation() {
        assert!(compute_expiry(1_000, 0, 1.0) > 1_000);
        assert!(compute_expiry(1_000, 100, 0.0) > 1_000);
    }
}
