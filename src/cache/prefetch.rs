//! Prefetch hints: keys flagged as likely to be needed soon.
//!
//! Writes to the hexagram category enqueue related symbol keys. The queue
//! is drained opportunistically by the maintenance task, which probes the
//! cache for each key — the cache never performs the upstream fetch, it
//! only surfaces misses so the caller layer can populate them.

use std::collections::{HashSet, VecDeque};

/// Produces keys related to a just-written key.
///
/// The exact neighbor relation is deliberately pluggable; the only contract
/// is that results are valid cache keys distinct from the input.
pub trait RelatedKeys: Send + Sync {
    fn related(&self, key: &str) -> Vec<String>;
}

/// Default strategy for `hex_<n>` keys over the 1..=64 symbol ordinals.
///
/// Emits up to [`RELATED_KEY_COUNT`] distinct in-range neighbors: the
/// ordinal complement plus wrap-around steps, padded by stepping forward
/// when transforms collide. Non-hexagram keys produce nothing.
#[derive(Debug, Default)]
pub struct HexagramNeighbors;

/// Neighbors emitted per hexagram write.
pub const RELATED_KEY_COUNT: usize = 3;

const ORDINAL_MIN: u32 = 1;
const ORDINAL_MAX: u32 = 64;

impl HexagramNeighbors {
    fn parse_ordinal(key: &str) -> Option<u32> {
        let raw = key.strip_prefix("hex_")?;
        let ordinal: u32 = raw.parse().ok()?;
        (ORDINAL_MIN..=ORDINAL_MAX).contains(&ordinal).then_some(ordinal)
    }
}

impl RelatedKeys for HexagramNeighbors {
    fn related(&self, key: &str) -> Vec<String> {
        let Some(n) = Self::parse_ordinal(key) else {
            return Vec::new();
        };

        let mut seen: HashSet<u32> = HashSet::from([n]);
        let mut ordinals = Vec::with_capacity(RELATED_KEY_COUNT);

        let candidates = [
            ORDINAL_MAX + 1 - n,         // complement
            n % ORDINAL_MAX + 1,         // successor, wrapping
            (n + 31) % ORDINAL_MAX + 1,  // opposite half, wrapping
        ];
        for candidate in candidates {
            if ordinals.len() < RELATED_KEY_COUNT && seen.insert(candidate) {
                ordinals.push(candidate);
            }
        }

        // Transforms can collide; pad by stepping forward from n.
        let mut step = 2;
        while ordinals.len() < RELATED_KEY_COUNT {
            let candidate = (n + step - 1) % ORDINAL_MAX + 1;
            if seen.insert(candidate) {
                ordinals.push(candidate);
            }
            step += 1;
        }

        ordinals.into_iter().map(|m| format!("hex_{m}")).collect()
    }
}

/// Deduplicated, bounded FIFO of keys awaiting a prefetch probe.
#[derive(Debug)]
pub struct PrefetchQueue {
    order: VecDeque<String>,
    pending: HashSet<String>,
    max_len: usize,
}

impl PrefetchQueue {
    pub fn new(max_len: usize) -> Self {
        Self {
            order: VecDeque::new(),
            pending: HashSet::new(),
            max_len,
        }
    }

    /// Enqueue a key unless it is already pending or the queue is full.
    /// Returns whether the key was added.
    pub fn enqueue(&mut self, key: &str) -> bool {
        if self.order.len() >= self.max_len || self.pending.contains(key) {
            return false;
        }
        self.pending.insert(key.to_string());
        self.order.push_back(key.to_string());
        true
    }

    /// Remove and return up to `batch` keys in FIFO order.
    pub fn drain(&mut self, batch: usize) -> Vec<String> {
        let mut keys = Vec::with_capacity(batch.min(self.order.len()));
        for _ in 0..batch {
            match self.order.pop_front() {
                Some(key) => {
                    self.pending.remove(&key);
                    keys.push(key);
                }
                None => break,
            }
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
