//! Runtime configuration for the tiered cache.
//!
//! Configuration can be loaded from a JSON file or constructed
//! programmatically. All tier knobs (capacities, TTLs, size thresholds,
//! maintenance cadence) live here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::policy::{default_policies, CategoryPolicy};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Fast (in-memory) tier.
    pub fast: FastTierConfig,

    /// Session-scoped tier.
    pub session: SessionTierConfig,

    /// Durable tier.
    pub durable: DurableTierConfig,

    /// Per-tier write eligibility by payload size.
    pub thresholds: SizeThresholds,

    /// Background cleanup and prefetch drain.
    pub maintenance: MaintenanceConfig,

    /// Category policy table; missing categories fall back to
    /// `{priority: 5, ttl_multiplier: 1.0}`.
    pub categories: HashMap<String, CategoryPolicy>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fast: FastTierConfig::default(),
            session: SessionTierConfig::default(),
            durable: DurableTierConfig::default(),
            thresholds: SizeThresholds::default(),
            maintenance: MaintenanceConfig::default(),
            categories: default_policies(),
        }
    }
}

/// Fast tier: the only tier with a hard entry-count capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FastTierConfig {
    /// Maximum entry count; exceeding it evicts the LRU entry.
    pub capacity: usize,

    /// Base TTL in seconds, before the category multiplier.
    pub base_ttl_secs: u64,
}

impl Default for FastTierConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            base_ttl_secs: 300, // 5 minutes
        }
    }
}

/// Session tier: string-serialized entries under a byte quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTierConfig {
    /// When false the adapter is constructed unavailable and every
    /// operation is a no-op.
    pub enabled: bool,

    /// Total serialized bytes the tier may hold.
    pub quota_bytes: usize,

    /// Base TTL in seconds.
    pub base_ttl_secs: u64,
}

impl Default for SessionTierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quota_bytes: 2 * 1024 * 1024, // 2 MiB
            base_ttl_secs: 1800,          // 30 minutes
        }
    }
}

/// Durable tier: file-per-entry store surviving restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurableTierConfig {
    pub enabled: bool,

    /// Directory holding entry files.
    pub path: PathBuf,

    /// Base TTL in seconds.
    pub base_ttl_secs: u64,
}

impl Default for DurableTierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("/tmp/tiered-cache"),
            base_ttl_secs: 7 * 24 * 3600, // 7 days
        }
    }
}

/// Size-based tier eligibility for writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeThresholds {
    /// Payloads at or below this land in the fast tier.
    pub small_object_max: usize,

    /// Payloads at or below this land in the session tier.
    pub medium_object_max: usize,

    /// Size assumed for payloads that fail to serialize.
    pub default_size_estimate: usize,
}

impl Default for SizeThresholds {
    fn default() -> Self {
        Self {
            small_object_max: 32 * 1024,   // 32 KiB
            medium_object_max: 256 * 1024, // 256 KiB
            default_size_estimate: 1024,
        }
    }
}

/// Background maintenance cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Seconds between cleanup/prefetch ticks.
    pub interval_secs: u64,

    /// Prefetch keys probed per tick.
    pub prefetch_batch: usize,

    /// Maximum pending prefetch keys; excess hints are dropped.
    pub prefetch_queue_max: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            prefetch_batch: 5,
            prefetch_queue_max: 64,
        }
    }
}

impl CacheConfig {
    /// Load configuration from a JSON file, falling back to defaults when
    /// the file is missing.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: CacheConfig = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(CacheConfig::default())
        }
    }

    pub fn fast_base_ttl(&self) -> Duration {
        Duration::from_secs(self.fast.base_ttl_secs)
    }

    pub fn session_base_ttl(&self) -> Duration {
        Duration::from_secs(self.session.base_ttl_secs)
    }

    pub fn durable_base_ttl(&self) -> Duration {
        Duration::from_secs(self.durable.base_ttl_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance.interval_secs)
    }
}
