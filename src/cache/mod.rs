//! Core cache data structures and the orchestrator.
//!
//! - [`entry`]: Tier and entry definitions, clock abstraction
//! - [`policy`]: category detection and the category policy table
//! - [`stats`]: cumulative hit/miss/eviction counters
//! - [`prefetch`]: prefetch queue and related-key strategies
//! - [`orchestrator`]: the three-tier cache itself

pub mod entry;
pub mod orchestrator;
pub mod policy;
pub mod prefetch;
pub mod stats;
