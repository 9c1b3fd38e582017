//! tiered-cache: a three-tier cache for web application data.
//!
//! Values flow through a hierarchy of storage tiers:
//!   in-memory LRU (fast) → session store (warm) → durable store (cold)
//!
//! Reads stop at the first live hit and promote the value into every
//! faster tier; writes fan out to each tier whose size threshold permits.
//! Entry lifetime is a per-tier base TTL scaled by a category derived from
//! the key's prefix. A background task purges expired entries and drains a
//! queue of prefetch hints.
//!
//! The public API never fails for cache-internal reasons: misses are
//! `None`, tier failures degrade to "that tier is empty" and are logged
//! via `tracing`.
//!
//! ```no_run
//! use tiered_cache::{CacheConfig, TieredCache};
//!
//! # async fn demo() {
//! let cache: TieredCache<serde_json::Value> =
//!     TieredCache::new(CacheConfig::default()).await;
//! cache.set("hex_1", serde_json::json!({"text": "alpha"})).await;
//! assert!(cache.get("hex_1").await.is_some());
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod tier;

pub use cache::entry::{Clock, ManualClock, SystemClock, Tier};
pub use cache::orchestrator::{ClearScope, GetOptions, SetOptions, TieredCache};
pub use cache::policy::{detect_category, CategoryPolicy};
pub use cache::prefetch::{HexagramNeighbors, RelatedKeys};
pub use cache::stats::StatsSnapshot;
pub use config::CacheConfig;
pub use error::TierError;
