//! Internal error taxonomy for tier operations.
//!
//! These errors never cross the orchestrator's public boundary: a failed
//! tier operation degrades to "that tier is empty" and is logged.

use thiserror::Error;

use crate::cache::entry::Tier;

#[derive(Error, Debug)]
pub enum TierError {
    #[error("tier {0} is unavailable")]
    Unavailable(Tier),

    #[error("quota exceeded in tier {tier}: entry of {needed} bytes does not fit")]
    QuotaExceeded { tier: Tier, needed: usize },

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error in tier {tier}: {source}")]
    Io {
        tier: Tier,
        #[source]
        source: std::io::Error,
    },
}
