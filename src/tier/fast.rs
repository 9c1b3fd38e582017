//! Fast tier: process-local volatile map with LRU eviction.
//!
//! The only tier with a hard capacity. Values are held live (never
//! serialized) and are lost on restart. A recency ledger orders keys from
//! most to least recently used; inserting past capacity evicts exactly the
//! LRU key, synchronously.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::entry::{CacheEntry, Clock, Tier};
use crate::cache::policy::PolicyTable;
use crate::error::TierError;
use crate::tier::{compute_expiry, TierHit, TierStore};

struct FastState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Front = most recently used, back = least recently used.
    recency: VecDeque<String>,
}

impl<V> FastState<V> {
    fn touch(&mut self, key: &str) {
        self.recency.retain(|k| k != key);
        self.recency.push_front(key.to_string());
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        self.recency.retain(|k| k != key);
        self.entries.remove(key)
    }
}

/// In-memory tier. Capacity is enforced on every insert of a new key.
pub struct FastTier<V> {
    capacity: usize,
    base_ttl_ms: u64,
    policies: Arc<PolicyTable>,
    clock: Arc<dyn Clock>,
    state: RwLock<FastState<V>>,
    evictions: AtomicU64,
}

impl<V> FastTier<V>
where
    V: Clone + Send + Sync,
{
    pub fn new(
        capacity: usize,
        base_ttl_ms: u64,
        policies: Arc<PolicyTable>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            capacity,
            base_ttl_ms,
            policies,
            clock,
            state: RwLock::new(FastState {
                entries: HashMap::new(),
                recency: VecDeque::new(),
            }),
            evictions: AtomicU64::new(0),
        }
    }

    /// Total LRU evictions since construction.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// The current LRU key, for tests and diagnostics.
    pub async fn peek_lru(&self) -> Option<String> {
        self.state.read().await.recency.back().cloned()
    }
}

#[async_trait]
impl<V> TierStore<V> for FastTier<V>
where
    V: Clone + Send + Sync,
{
    fn tier(&self) -> Tier {
        Tier::Fast
    }

    fn available(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Option<TierHit<V>> {
        let now = self.clock.now_ms();
        let mut state = self.state.write().await;

        let expired = match state.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return None,
        };
        if expired {
            state.remove(key);
            return None;
        }

        // A hit makes the key most recently used.
        state.touch(key);
        let entry = state.entries.get(key)?;
        Some(TierHit {
            value: entry.value.clone(),
            category: entry.category.clone(),
            priority: entry.priority,
            approx_size: entry.approx_size,
        })
    }

    async fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        let mut state = self.state.write().await;
        match state.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                state.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &V,
        category: &str,
        priority: u32,
        approx_size: usize,
    ) -> Result<(), TierError> {
        let now = self.clock.now_ms();
        let expires_at = compute_expiry(now, self.base_ttl_ms, self.policies.ttl_multiplier(category));

        let mut state = self.state.write().await;

        // Evict the LRU entry before a new key would exceed capacity.
        if !state.entries.contains_key(key) && state.entries.len() >= self.capacity {
            if let Some(victim) = state.recency.pop_back() {
                state.entries.remove(&victim);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %victim, "Evicted LRU entry from fast tier");
            }
        }

        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                category: category.to_string(),
                priority,
                created_at: now,
                expires_at,
                approx_size,
            },
        );
        state.touch(key);
        Ok(())
    }

    async fn delete(&self, key: &str) {
        self.state.write().await.remove(key);
    }

    async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.recency.clear();
    }

    async fn count(&self) -> usize {
        self.state.read().await.entries.len()
    }

    async fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut state = self.state.write().await;
        let dead: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &dead {
            state.remove(key);
        }
        dead.len()
    }
}
