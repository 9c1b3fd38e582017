//! Durable tier: one JSON envelope file per entry.
//!
//! Survives restarts; entries live until their (long) TTL elapses or the
//! tier is cleared. The backing directory is opened once at construction —
//! if it cannot be created the adapter is marked unavailable and every
//! operation degrades to a no-op, so the orchestrator never special-cases
//! a missing durable store.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::cache::entry::{Clock, StoredEntry, Tier};
use crate::cache::policy::PolicyTable;
use crate::error::TierError;
use crate::tier::{compute_expiry, TierHit, TierStore};

const ENTRY_SUFFIX: &str = ".entry";

/// Durable tier adapter over a directory of entry files.
pub struct DurableTier<V> {
    available: bool,
    root: PathBuf,
    base_ttl_ms: u64,
    policies: Arc<PolicyTable>,
    clock: Arc<dyn Clock>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> DurableTier<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    /// Open the backing directory. Never fails: a directory that cannot be
    /// created yields an unavailable adapter.
    pub async fn open(
        enabled: bool,
        root: PathBuf,
        base_ttl_ms: u64,
        policies: Arc<PolicyTable>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let available = if !enabled {
            debug!("Durable tier disabled; all operations will be no-ops");
            false
        } else {
            match fs::create_dir_all(&root).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(path = %root.display(), error = %e, "Durable tier unavailable");
                    false
                }
            }
        };
        Self {
            available,
            root,
            base_ttl_ms,
            policies,
            clock,
            _marker: PhantomData,
        }
    }

    /// Keys are arbitrary strings; hex-encode them so every key maps to a
    /// filesystem-safe, reversible file name.
    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}{ENTRY_SUFFIX}", hex::encode(key)))
    }

    async fn read_entry(&self, path: &Path) -> Option<StoredEntry> {
        let raw = fs::read_to_string(path).await.ok()?;
        match serde_json::from_str::<StoredEntry>(&raw) {
            Ok(entry) => Some(entry),
            Err(_) => {
                warn!(path = %path.display(), "Malformed durable entry, deleting");
                let _ = fs::remove_file(path).await;
                None
            }
        }
    }

    async fn entry_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let Ok(mut entries) = fs::read_dir(&self.root).await else {
            return files;
        };
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(ENTRY_SUFFIX))
                    {
                        files.push(path);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to walk durable tier directory");
                    break;
                }
            }
        }
        files
    }

    async fn write_envelope(&self, path: &Path, raw: &str) -> std::io::Result<()> {
        fs::write(path, raw).await
    }
}

#[async_trait]
impl<V> TierStore<V> for DurableTier<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    fn tier(&self) -> Tier {
        Tier::Durable
    }

    fn available(&self) -> bool {
        self.available
    }

    async fn get(&self, key: &str) -> Option<TierHit<V>> {
        if !self.available {
            return None;
        }
        let path = self.entry_path(key);
        let entry = self.read_entry(&path).await?;
        if entry.is_expired(self.clock.now_ms()) {
            let _ = fs::remove_file(&path).await;
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
                warn!(key, "Durable entry payload does not deserialize, deleting");
                let _ = fs::remove_file(&path).await;
                None
            }
        }
    }

    async fn contains(&self, key: &str) -> bool {
        if !self.available {
            return false;
        }
        let path = self.entry_path(key);
        match self.read_entry(&path).await {
            Some(entry) if !entry.is_expired(self.clock.now_ms()) => true,
            Some(_) => {
                let _ = fs::remove_file(&path).await;
                false
            }
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
        if !self.available {
            return Err(TierError::Unavailable(Tier::Durable));
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
        let path = self.entry_path(key);

        if let Err(first) = self.write_envelope(&path, &raw).await {
            // Capacity-class failure: purge expired entries and retry once.
            let purged = self.purge_expired().await;
            debug!(key, purged, error = %first, "Durable write failed, retrying after cleanup");
            if let Err(e) = self.write_envelope(&path, &raw).await {
                warn!(key, error = %e, "Durable write dropped after retry");
                return Err(TierError::Io {
                    tier: Tier::Durable,
                    source: e,
                });
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) {
        if !self.available {
            return;
        }
        let path = self.entry_path(key);
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(key, error = %e, "Failed to delete durable entry");
            }
        }
    }

    async fn clear(&self) {
        if !self.available {
            return;
        }
        for path in self.entry_files().await {
            let _ = fs::remove_file(&path).await;
        }
    }

    async fn count(&self) -> usize {
        if !self.available {
            return 0;
        }
        self.entry_files().await.len()
    }

    async fn purge_expired(&self) -> usize {
        if !self.available {
            return 0;
        }
        let now = self.clock.now_ms();
        let mut purged = 0;
        for path in self.entry_files().await {
            // read_entry deletes malformed files itself; count those too.
            match self.read_entry(&path).await {
                Some(entry) if entry.is_expired(now) => {
                    if fs::remove_file(&path).await.is_ok() {
                        purged += 1;
                    }
                }
                Some(_) => {}
                None => purged += 1,
            }
        }
        purged
    }
}
