//! Session tier: string-serialized entries under a byte quota.
//!
//! Models a per-session string store: every entry is a JSON envelope, and
//! the tier tracks total serialized bytes against a quota. A write that
//! would not fit triggers one purge-expired pass and exactly one retry;
//! if it still does not fit, the write is dropped and logged. Malformed
//! envelopes are treated like expired entries: deleted, read as absent.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::entry::{Clock, StoredEntry, Tier};
use crate::cache::policy::PolicyTable;
use crate::error::TierError;
use crate::tier::{compute_expiry, TierHit, TierStore};

struct SessionState {
    entries: HashMap<String, String>,
    bytes_used: usize,
}

impl SessionState {
    fn remove(&mut self, key: &str) {
        if let Some(raw) = self.entries.remove(key) {
            self.bytes_used = self.bytes_used.saturating_sub(raw.len());
        }
    }

    fn insert(&mut self, key: &str, raw: String) {
        self.remove(key);
        self.bytes_used += raw.len();
        self.entries.insert(key.to_string(), raw);
    }

    /// Remove expired and malformed envelopes; returns how many went.
    fn purge_expired(&mut self, now_ms: u64) -> usize {
        let dead: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, raw)| match serde_json::from_str::<StoredEntry>(raw) {
                Ok(entry) => entry.is_expired(now_ms),
                Err(_) => true,
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &dead {
            self.remove(key);
        }
        dead.len()
    }
}

/// Session-scoped tier adapter. Dies with the process; survives
/// navigation within it.
pub struct SessionTier<V> {
    available: bool,
    quota_bytes: usize,
    base_ttl_ms: u64,
    policies: Arc<PolicyTable>,
    clock: Arc<dyn Clock>,
    state: RwLock<SessionState>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> SessionTier<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(
        enabled: bool,
        quota_bytes: usize,
        base_ttl_ms: u64,
        policies: Arc<PolicyTable>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if !enabled {
            debug!("Session tier disabled; all operations will be no-ops");
        }
        Self {
            available: enabled,
            quota_bytes,
            base_ttl_ms,
            policies,
            clock,
            state: RwLock::new(SessionState {
                entries: HashMap::new(),
                bytes_used: 0,
            }),
            _marker: PhantomData,
        }
    }

    /// Serialized bytes currently held, for tests and diagnostics.
    pub async fn bytes_used(&self) -> usize {
        self.state.read().await.bytes_used
    }

    /// Inject a raw envelope string, bypassing serialization. Test seam
    /// for exercising the malformed-entry path.
    #[doc(hidden)]
    pub async fn insert_raw(&self, key: &str, raw: String) {
        if !self.available {
            return;
        }
        self.state.write().await.insert(key, raw);
    }
}

#[async_trait]
impl<V> TierStore<V> for SessionTier<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    fn tier(&self) -> Tier {
        Tier::Session
    }

    fn available(&self) -> bool {
        self.available
    }

    async fn get(&self, key: &str) -> Option<TierHit<V>> {
        if !self.available {
            return None;
        }
        let now = self.clock.now_ms();
        let mut state = self.state.write().await;

        let raw = state.entries.get(key)?;
        let entry = match serde_json::from_str::<StoredEntry>(raw) {
            Ok(entry) => entry,
            Err(_) => {
                warn!(key, "Malformed session entry, deleting");
                state.remove(key);
                return None;
            }
        };
        if entry.is_expired(now) {
            state.remove(key);
            return None;
        }
        match serde_json::from_value::<V>(entry.value) {
            Ok(value) => Some(TierHit {
                value,
                category: entry.category,
                priority: entry.priority,
                approx_size: entry.approx_size,
            }),
            Err(_) => {
                warn!(key, "Session entry payload does not deserialize, deleting");
                state.remove(key);
                None
            }
        }
    }

    async fn contains(&self, key: &str) -> bool {
        if !self.available {
            return false;
        }
        let now = self.clock.now_ms();
        let mut state = self.state.write().await;
        let Some(raw) = state.entries.get(key) else {
            return false;
        };
        match serde_json::from_str::<StoredEntry>(raw) {
            Ok(entry) if !entry.is_expired(now) => true,
            _ => {
                state.remove(key);
                false
            }
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
        if !self.available {
            return Err(TierError::Unavailable(Tier::Session));
        }
        let now = self.clock.now_ms();
        let entry = StoredEntry {
            value: serde_json::to_value(value)?,
            category: category.to_string(),
            priority,
            created_at: now,
            expires_at: compute_expiry(now, self.base_ttl_ms, self.policies.ttl_multiplier(category)),
            approx_size,
        };
        let raw = serde_json::to_string(&entry)?;

        let mut state = self.state.write().await;
        let existing = state.entries.get(key).map(|r| r.len()).unwrap_or(0);
        let fits = |state: &SessionState, existing: usize| {
            state.bytes_used - existing + raw.len() <= self.quota_bytes
        };

        if !fits(&state, existing) {
            // One cleanup pass, then exactly one retry.
            let purged = state.purge_expired(now);
            debug!(key, purged, "Session quota pressure, purged expired entries");
            let existing = state.entries.get(key).map(|r| r.len()).unwrap_or(0);
            if !fits(&state, existing) {
                warn!(
                    key,
                    needed = raw.len(),
                    quota = self.quota_bytes,
                    "Session write dropped: quota exceeded after cleanup"
                );
                return Err(TierError::QuotaExceeded {
                    tier: Tier::Session,
                    needed: raw.len(),
                });
            }
        }

        state.insert(key, raw);
        Ok(())
    }

    async fn delete(&self, key: &str) {
        if !self.available {
            return;
        }
        self.state.write().await.remove(key);
    }

    async fn clear(&self) {
        if !self.available {
            return;
        }
        let mut state = self.state.write().await;
        state.entries.clear();
        state.bytes_used = 0;
    }

    async fn count(&self) -> usize {
        if !self.available {
            return 0;
        }
        self.state.read().await.entries.len()
    }

    async fn purge_expired(&self) -> usize {
        if !self.available {
            return 0;
        }
        let now = self.clock.now_ms();
        self.state.write().await.purge_expired(now)
    }
}
