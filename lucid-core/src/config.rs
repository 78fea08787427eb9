//! Search configuration.

use serde::{Deserialize, Serialize};

/// Default cap on value-propagation rounds.
pub const DEFAULT_MAX_ROUND: u32 = 20;

/// Default tolerance for comparing computed values.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Configuration for interpretation search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Highest round a state change may propagate from
    pub max_round: u32,
    /// Maximum number of search nodes initialized per search
    pub max_search_steps: u64,
    /// Reuse the undo log and weight of a cached search node when its
    /// observed inputs are unchanged
    pub enable_caching: bool,
    /// Recompute reusable nodes anyway and report mismatches
    pub verify_cache: bool,
    /// Skip branches contradicted by a candidate's cached decision
    pub optimize_search: bool,
    /// Collect terminal states for soft-max averaging
    pub compute_soft_max: bool,
    /// Values closer than this are considered equal
    pub tolerance: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_round: DEFAULT_MAX_ROUND,
            max_search_steps: u64::MAX,
            enable_caching: true,
            verify_cache: false,
            optimize_search: true,
            compute_soft_max: false,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl SearchConfig {
    /// Configuration that explores every branch the pruning rules allow and
    /// recomputes every node.
    #[must_use]
    pub fn exhaustive() -> Self {
        Self {
            enable_caching: false,
            optimize_search: false,
            ..Self::default()
        }
    }

    /// Set the round cap
    #[must_use]
    pub fn with_max_round(mut self, max_round: u32) -> Self {
        self.max_round = max_round;
        self
    }

    /// Set the search step ceiling
    #[must_use]
    pub fn with_max_search_steps(mut self, limit: u64) -> Self {
        self.max_search_steps = limit;
        self
    }

    /// Enable or disable node memoization
    #[must_use]
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.enable_caching = enabled;
        self
    }

    /// Enable or disable cache verification
    #[must_use]
    pub fn with_verify_cache(mut self, enabled: bool) -> Self {
        self.verify_cache = enabled;
        self
    }

    /// Enable or disable cached-decision pruning
    #[must_use]
    pub fn with_optimize_search(mut self, enabled: bool) -> Self {
        self.optimize_search = enabled;
        self
    }

    /// Enable or disable soft-max collection
    #[must_use]
    pub fn with_soft_max(mut self, enabled: bool) -> Self {
        self.compute_soft_max = enabled;
        self
    }
}
