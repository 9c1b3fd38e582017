//! Category detection and the category policy table.
//!
//! A key's category drives its TTL multiplier and priority. Detection is a
//! pure function of the key prefix; an explicit caller hint always wins.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// TTL and priority knobs for one category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CategoryPolicy {
    /// Relative importance, 1 (low) to 10 (high).
    pub priority: u32,

    /// Scales each tier's base TTL for entries in this category.
    pub ttl_multiplier: f64,
}

/// Fallback for unrecognized categories.
pub const DEFAULT_POLICY: CategoryPolicy = CategoryPolicy {
    priority: 5,
    ttl_multiplier: 1.0,
};

/// Recognized key prefixes, checked in order; first match wins.
const PREFIX_CATEGORIES: &[(&str, &str)] = &[
    ("hex_", "hexagram"),
    ("calc_", "calculation"),
    ("graph_", "graph"),
    ("analysis_", "analysis"),
    ("user_", "user"),
];

/// Category assigned to keys matching no recognized prefix.
pub const GENERAL_CATEGORY: &str = "general";

/// Derive a category from a key's prefix.
///
/// Pure: the same key always yields the same category. Category determines
/// TTL at write time and is never re-derived for a stored entry.
pub fn detect_category(key: &str) -> &'static str {
    for (prefix, category) in PREFIX_CATEGORIES {
        if key.starts_with(prefix) {
            return category;
        }
    }
    GENERAL_CATEGORY
}

/// Resolve a category from an optional explicit hint, falling back to
/// prefix detection.
pub fn resolve_category(key: &str, hint: Option<&str>) -> String {
    match hint {
        Some(category) => category.to_string(),
        None => detect_category(key).to_string(),
    }
}

/// Read-only mapping of category name to policy, loaded at cache
/// construction.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: HashMap<String, CategoryPolicy>,
}

impl PolicyTable {
    pub fn new(policies: HashMap<String, CategoryPolicy>) -> Self {
        Self { policies }
    }

    /// Policy for a category, or the default for unknown categories.
    pub fn policy(&self, category: &str) -> CategoryPolicy {
        self.policies
            .get(category)
            .copied()
            .unwrap_or(DEFAULT_POLICY)
    }

    pub fn ttl_multiplier(&self, category: &str) -> f64 {
        self.policy(category).ttl_multiplier
    }

    pub fn priority(&self, category: &str) -> u32 {
        self.policy(category).priority
    }
}

/// Default policies for the five recognized categories.
///
/// Hexagram text is static content and can live the longest; user entries
/// are small and frequently re-read; graph payloads are bulky and cheap to
/// regenerate, so they expire soonest.
pub fn default_policies() -> HashMap<String, CategoryPolicy> {
    let mut policies = HashMap::new();
    policies.insert(
        "hexagram".to_string(),
        CategoryPolicy {
            priority: 10,
            ttl_multiplier: 4.0,
        },
    );
    policies.insert(
        "calculation".to_string(),
        CategoryPolicy {
            priority: 8,
            ttl_multiplier: 2.0,
        },
    );
    policies.insert(
        "graph".to_string(),
        CategoryPolicy {
            priority: 6,
            ttl_multiplier: 1.5,
        },
    );
    policies.insert(
        "analysis".to_string(),
        CategoryPolicy {
            priority: 7,
            ttl_multiplier: 2.0,
        },
    );
    policies.insert(
        "user".to_string(),
        CategoryPolicy {
            priority: 9,
            ttl_multiplier: 3.0,
        },
    );
    policies
}
