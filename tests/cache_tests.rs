//! Integration tests for the tiered cache orchestrator.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tiered_cache::{CacheConfig, ClearScope, ManualClock, SetOptions, Tier, TieredCache};

type JsonCache = TieredCache<serde_json::Value>;

async fn build_cache(
    tmp: &TempDir,
    tweak: impl FnOnce(&mut CacheConfig),
) -> (Arc<JsonCache>, Arc<ManualClock>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut config = CacheConfig::default();
    config.durable.path = tmp.path().join("durable");
    tweak(&mut config);
    let clock = ManualClock::new(0);
    let cache = Arc::new(TieredCache::with_clock(config, clock.clone()).await);
    (cache, clock)
}

#[tokio::test]
async fn test_set_then_get_served_by_fast_tier() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |_| {}).await;

    cache.set("hex_1", json!({"text": "alpha"})).await;
    assert_eq!(cache.get("hex_1").await.unwrap(), json!({"text": "alpha"}));

    let stats = cache.stats();
    assert_eq!(stats.fast.hits, 1);
    assert_eq!(stats.session.hits, 0);
    assert_eq!(stats.durable.hits, 0);
    assert_eq!(stats.total_requests, 1);
}

#[tokio::test]
async fn test_durable_hit_promotes_to_fast_and_session() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |_| {}).await;

    cache.set("calc_7", json!(42)).await;
    // Strip the faster tiers so only the durable copy remains.
    cache.clear(ClearScope::Fast).await;
    cache.clear(ClearScope::Session).await;
    assert_eq!(cache.tier_count(Tier::Fast).await, 0);
    assert_eq!(cache.tier_count(Tier::Session).await, 0);

    assert_eq!(cache.get("calc_7").await.unwrap(), json!(42));

    let stats = cache.stats();
    assert_eq!(stats.durable.hits, 1);
    assert_eq!(cache.tier_count(Tier::Fast).await, 1);
    assert_eq!(cache.tier_count(Tier::Session).await, 1);

    // The promoted copies now serve directly.
    assert_eq!(cache.get("calc_7").await.unwrap(), json!(42));
    assert_eq!(cache.stats().fast.hits, 1);
}

#[tokio::test]
async fn test_session_hit_promotes_to_fast_only() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |config| {
        config.durable.enabled = false;
    })
    .await;

    cache.set("analysis_3", json!("ready")).await;
    cache.clear(ClearScope::Fast).await;

    assert_eq!(cache.get("analysis_3").await.unwrap(), json!("ready"));
    assert_eq!(cache.stats().session.hits, 1);
    assert_eq!(cache.tier_count(Tier::Fast).await, 1);
}

#[tokio::test]
async fn test_ttl_staging_across_tiers() {
    let tmp = TempDir::new().unwrap();
    let (cache, clock) = build_cache(&tmp, |_| {}).await;

    // "general" category: multiplier 1.0 on every tier.
    cache.set("unprefixed_key_123", json!(7)).await;

    // Just short of the fast tier's 300 s base TTL: still a fast hit.
    clock.advance(299_999);
    assert!(cache.get("unprefixed_key_123").await.is_some());
    assert_eq!(cache.stats().fast.hits, 1);

    // Past 300 s the fast copy is dead; the session copy (1800 s) serves
    // and is promoted back into fast with a fresh TTL. Drop the promoted
    // copy again before the next stage.
    clock.advance(1);
    assert!(cache.get("unprefixed_key_123").await.is_some());
    assert_eq!(cache.stats().session.hits, 1);
    cache.clear(ClearScope::Fast).await;

    // Past 1800 s only the durable copy (7 days) is left.
    clock.advance(1_800_000);
    cache.clear(ClearScope::Session).await;
    assert!(cache.get("unprefixed_key_123").await.is_some());
    assert_eq!(cache.stats().durable.hits, 1);

    // Past the durable TTL everything is gone.
    cache.clear(ClearScope::Fast).await;
    cache.clear(ClearScope::Session).await;
    clock.advance(7 * 24 * 3_600_000);
    assert!(cache.get("unprefixed_key_123").await.is_none());
}

#[tokio::test]
async fn test_category_multiplier_extends_fast_ttl() {
    let tmp = TempDir::new().unwrap();
    let (cache, clock) = build_cache(&tmp, |_| {}).await;

    // "hexagram" carries a 4.0 multiplier: 300 s base → 1200 s in fast.
    cache.set("hex_9", json!("long-lived")).await;
    clock.advance(1_199_999);
    assert!(cache.get("hex_9").await.is_some());
    assert_eq!(cache.stats().fast.hits, 1);

    clock.advance(1);
    cache.get("hex_9").await;
    assert_eq!(cache.stats().fast.hits, 1); // second read missed fast
}

#[tokio::test]
async fn test_fast_capacity_lru_eviction() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |config| {
        config.fast.capacity = 2;
        config.session.enabled = false;
        config.durable.enabled = false;
    })
    .await;

    cache.set("a", json!(1)).await;
    cache.set("b", json!(2)).await;
    cache.set("c", json!(3)).await;

    assert_eq!(cache.tier_count(Tier::Fast).await, 2);
    assert!(cache.get("a").await.is_none());
    assert!(cache.get("b").await.is_some());
    assert!(cache.get("c").await.is_some());
    assert_eq!(cache.stats().fast.evictions, 1);
}

#[tokio::test]
async fn test_read_refreshes_lru_position() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |config| {
        config.fast.capacity = 2;
        config.session.enabled = false;
        config.durable.enabled = false;
    })
    .await;

    cache.set("a", json!(1)).await;
    cache.set("b", json!(2)).await;
    cache.get("a").await.unwrap(); // "b" becomes the LRU victim
    cache.set("c", json!(3)).await;

    assert!(cache.get("a").await.is_some());
    assert!(cache.get("b").await.is_none());
    assert!(cache.get("c").await.is_some());
}

#[tokio::test]
async fn test_clear_all_idempotent() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |_| {}).await;

    cache.set("hex_1", json!(1)).await;
    cache.set("user_1", json!(2)).await;

    for _ in 0..2 {
        cache.clear(ClearScope::All).await;
        assert_eq!(cache.tier_count(Tier::Fast).await, 0);
        assert_eq!(cache.tier_count(Tier::Session).await, 0);
        assert_eq!(cache.tier_count(Tier::Durable).await, 0);
    }
}

#[tokio::test]
async fn test_clear_fast_leaves_slower_tiers() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |_| {}).await;

    cache.set("graph_1", json!([1, 2, 3])).await;
    cache.clear(ClearScope::Fast).await;

    assert_eq!(cache.tier_count(Tier::Fast).await, 0);
    assert_eq!(cache.tier_count(Tier::Session).await, 1);
    assert_eq!(cache.tier_count(Tier::Durable).await, 1);

    // Still retrievable through the session tier.
    assert_eq!(cache.get("graph_1").await.unwrap(), json!([1, 2, 3]));
}

#[tokio::test]
async fn test_write_survives_unavailable_durable_tier() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |config| {
        config.durable.enabled = false;
    })
    .await;

    cache.set("user_5", json!({"name": "wen"})).await;
    assert_eq!(cache.get("user_5").await.unwrap(), json!({"name": "wen"}));
    assert_eq!(cache.tier_count(Tier::Durable).await, 0);
    assert!(cache.tier_count(Tier::Fast).await + cache.tier_count(Tier::Session).await >= 1);
}

#[tokio::test]
async fn test_session_quota_exhaustion_never_panics() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |config| {
        config.session.quota_bytes = 256;
        config.durable.enabled = false;
        // Keep the oversized values out of the fast tier too.
        config.thresholds.small_object_max = 64;
    })
    .await;

    for i in 0..10 {
        let key = format!("blob_{i}");
        cache.set(&key, json!("x".repeat(512))).await;
    }

    // Nothing fit anywhere; misses are a legitimate outcome.
    assert_eq!(cache.tier_count(Tier::Session).await, 0);
    assert!(cache.get("blob_0").await.is_none());
}

#[tokio::test]
async fn test_delete_removes_from_every_tier() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |_| {}).await;

    cache.set("hex_2", json!(2)).await;
    cache.delete("hex_2").await;

    assert!(!cache.contains("hex_2").await);
    assert_eq!(cache.tier_count(Tier::Fast).await, 0);
    assert_eq!(cache.tier_count(Tier::Session).await, 0);
    assert_eq!(cache.tier_count(Tier::Durable).await, 0);
}

#[tokio::test]
async fn test_contains_does_not_promote() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |_| {}).await;

    cache.set("calc_1", json!(1)).await;
    cache.clear(ClearScope::Fast).await;
    cache.clear(ClearScope::Session).await;

    assert!(cache.contains("calc_1").await);
    assert_eq!(cache.tier_count(Tier::Fast).await, 0);
    assert_eq!(cache.tier_count(Tier::Session).await, 0);
    assert_eq!(cache.stats().total_requests, 0);
}

#[tokio::test]
async fn test_hexagram_write_enqueues_related_keys() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |_| {}).await;

    cache.set("hex_5", json!("water over thunder")).await;
    assert_eq!(cache.prefetch_len(), 3);

    // Re-writing the same key must not duplicate pending hints.
    cache.set("hex_5", json!("updated")).await;
    assert_eq!(cache.prefetch_len(), 3);

    // Non-hexagram writes add nothing.
    cache.set("calc_5", json!(5)).await;
    assert_eq!(cache.prefetch_len(), 3);
}

#[tokio::test]
async fn test_maintenance_pass_drains_prefetch_queue() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |_| {}).await;

    cache.set("hex_10", json!("payload")).await;
    let pending = cache.prefetch_len();
    assert_eq!(pending, 3);

    let before = cache.stats().total_requests;
    cache.run_maintenance().await;

    // Each drained hint was probed with a plain get.
    assert_eq!(cache.prefetch_len(), 0);
    assert_eq!(cache.stats().total_requests, before + pending as u64);
}

#[tokio::test]
async fn test_maintenance_pass_purges_expired_entries() {
    let tmp = TempDir::new().unwrap();
    let (cache, clock) = build_cache(&tmp, |_| {}).await;

    cache.set("unpref_a", json!(1)).await;
    cache.set("unpref_b", json!(2)).await;

    // Outlive every tier's TTL for the general category.
    clock.advance(8 * 24 * 3_600_000);
    cache.run_maintenance().await;

    assert_eq!(cache.tier_count(Tier::Fast).await, 0);
    assert_eq!(cache.tier_count(Tier::Session).await, 0);
    assert_eq!(cache.tier_count(Tier::Durable).await, 0);

    let stats = cache.stats();
    assert_eq!(stats.fast.expired_purged, 2);
    assert_eq!(stats.session.expired_purged, 2);
    assert_eq!(stats.durable.expired_purged, 2);
}

#[tokio::test(start_paused = true)]
async fn test_background_maintenance_runs_on_interval() {
    let tmp = TempDir::new().unwrap();
    let (cache, clock) = build_cache(&tmp, |config| {
        config.maintenance.interval_secs = 1;
        config.durable.enabled = false;
    })
    .await;

    cache.set("unpref", json!(1)).await;
    clock.advance(2_000_000); // dead in fast and session tiers

    cache.start_maintenance();
    cache.start_maintenance(); // idempotent

    // Paused tokio time auto-advances; one interval elapses here.
    tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;

    assert_eq!(cache.tier_count(Tier::Fast).await, 0);
    assert_eq!(cache.tier_count(Tier::Session).await, 0);

    cache.stop_maintenance();
    cache.stop_maintenance(); // idempotent
}

#[tokio::test]
async fn test_stats_counts_hits_misses_and_latency() {
    let tmp = TempDir::new().unwrap();
    let (cache, _clock) = build_cache(&tmp, |_| {}).await;

    cache.set("hex_1", json!(1)).await;
    cache.get("hex_1").await;
    cache.get("absent_key").await;

    let stats = cache.stats();
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.total_hits, 1);
    assert_eq!(stats.total_misses, 1);
    assert!((stats.hit_rate_pct - 50.0).abs() < 1e-9);
    assert!(stats.avg_get_latency_ms >= 0.0);
    // A full miss walked and missed every tier.
    assert_eq!(stats.session.misses, 1);
    assert_eq!(stats.durable.misses, 1);
}

#[tokio::test]
async fn test_explicit_category_overrides_prefix() {
    let tmp = TempDir::new().unwrap();
    let (cache, clock) = build_cache(&tmp, |config| {
        config.session.enabled = false;
        config.durable.enabled = false;
    })
    .await;

    // "plain" would be general (multiplier 1.0); force hexagram (4.0).
    cache
        .set_with(
            "plain",
            json!(1),
            SetOptions {
                category: Some("hexagram".to_string()),
                priority: None,
            },
        )
        .await;

    clock.advance(600_000); // past the general TTL, inside the hexagram one
    assert!(cache.get("plain").await.is_some());
}

#[tokio::test]
async fn test_durable_entries_survive_cache_restart() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("durable");

    {
        let mut config = CacheConfig::default();
        config.durable.path = path.clone();
        let cache: JsonCache = TieredCache::new(config).await;
        cache.set("hex_33", json!({"text": "retreat"})).await;
    }

    let mut config = CacheConfig::default();
    config.durable.path = path;
    let cache: JsonCache = TieredCache::new(config).await;

    assert_eq!(cache.tier_count(Tier::Fast).await, 0);
    assert_eq!(
        cache.get("hex_33").await.unwrap(),
        json!({"text": "retreat"})
    );
    assert_eq!(cache.stats().durable.hits, 1);
}

mod unserializable {
    use super::*;
    use serde::de::Deserializer;
    use serde::ser::{Error as _, Serializer};
    use serde::{Deserialize, Serialize};

    // A payload that refuses to serialize: exercises the default size
    // estimate and the live-object-only write path.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Opaque(pub u32);

    impl Serialize for Opaque {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("opaque payload"))
        }
    }

    impl<'de> Deserialize<'de> for Opaque {
        fn deserialize<D: Deserializer<'de>>(_deserializer: D) -> Result<Self, D::Error> {
            Err(serde::de::Error::custom("opaque payload"))
        }
    }

    #[tokio::test]
    async fn test_unserializable_value_lands_in_fast_tier_only() {
        let tmp = TempDir::new().unwrap();
        let mut config = CacheConfig::default();
        config.durable.path = tmp.path().join("durable");
        let cache: TieredCache<Opaque> = TieredCache::new(config).await;

        cache.set("user_raw", Opaque(7)).await;

        assert_eq!(cache.get("user_raw").await.unwrap(), Opaque(7));
        assert_eq!(cache.tier_count(Tier::Fast).await, 1);
        assert_eq!(cache.tier_count(Tier::Session).await, 0);
        assert_eq!(cache.tier_count(Tier::Durable).await, 0);
    }
}
