//! Cache entry types and tier definitions.
//!
//! An entry is the unit of storage within a single tier. The same key may
//! exist in every tier at once, each copy carrying its own expiry computed
//! from that tier's base TTL.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Identifies one of the three storage tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Tier 0: in-process volatile map (hot). Destroyed on restart.
    Fast,
    /// Tier 1: session-scoped string store (warm). Dies with the session.
    Session,
    /// Tier 2: durable per-origin store (cold). Survives restarts.
    Durable,
}

impl Tier {
    /// Tiers faster than this one, ordered fastest first. A hit in this
    /// tier is promoted into each of them.
    pub fn faster_tiers(&self) -> &'static [Tier] {
        match self {
            Tier::Fast => &[],
            Tier::Session => &[Tier::Fast],
            Tier::Durable => &[Tier::Fast, Tier::Session],
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Fast => write!(f, "fast"),
            Tier::Session => write!(f, "session"),
            Tier::Durable => write!(f, "durable"),
        }
    }
}

/// Time source for TTL computation, in milliseconds since the Unix epoch.
///
/// Injected so expiry can be driven by a test clock instead of wall time.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time source used outside of tests.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            now_ms: AtomicU64::new(start_ms),
        })
    }

    /// Move the clock forward by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// A live entry held by the fast tier. The value is kept as-is, never
/// serialized.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub category: String,
    pub priority: u32,
    pub created_at: u64,
    pub expires_at: u64,
    pub approx_size: usize,
}

impl<V> CacheEntry<V> {
    /// Whether the entry's TTL has elapsed at `now_ms`.
    ///
    /// An entry expires the instant `now >= expires_at`, so a zero-TTL
    /// entry is dead on arrival rather than alive for one read.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}

/// The serialized envelope stored by the session and durable tiers.
///
/// The payload is carried as opaque JSON; the cache never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub value: serde_json::Value,
    pub category: String,
    pub priority: u32,
    pub created_at: u64,
    pub expires_at: u64,
    pub approx_size: usize,
}

impl StoredEntry {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}
