//! Search statistics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Counters accumulated over all searches of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Completed or aborted `process` calls
    pub searches: u64,
    /// Non-terminal nodes initialized
    pub search_steps: u64,
    /// Search nodes created, root included
    pub nodes_created: u64,
    /// Terminal nodes evaluated
    pub terminals: u64,
    /// Times a better interpretation was staged
    pub best_updates: u64,
    /// Nodes whose undo log was reused from a cached node
    pub cache_hits: u64,
    /// Nodes computed through the value queue
    pub cache_misses: u64,
    /// Cached nodes that disagreed with a recomputation
    pub cache_mismatches: u64,
    /// Exclude branches pruned because they would leave an activation
    /// unsuppressed
    pub pruned_unsuppressed: u64,
    /// Branches skipped because of a cached decision
    pub pruned_by_cache: u64,
    /// Select branches vetoed by the skip-select policy
    pub select_vetoed: u64,
    /// Select branches revisited after their cached decision was invalidated
    pub repeats: u64,
    /// Round states that changed during value propagation
    pub value_updates: u64,
    /// State changes past the round cap
    pub round_overflows: u64,
    /// Upper bound changes
    pub bound_updates: u64,
}

impl fmt::Display for SearchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "searches:            {}", self.searches)?;
        writeln!(f, "search steps:        {}", self.search_steps)?;
        writeln!(f, "nodes created:       {}", self.nodes_created)?;
        writeln!(f, "terminals:           {}", self.terminals)?;
        writeln!(f, "best updates:        {}", self.best_updates)?;
        writeln!(
            f,
            "cache hit/miss/bad:  {}/{}/{}",
            self.cache_hits, self.cache_misses, self.cache_mismatches
        )?;
        writeln!(
            f,
            "pruned unsuppr/cache: {}/{}",
            self.pruned_unsuppressed, self.pruned_by_cache
        )?;
        writeln!(f, "select vetoed:       {}", self.select_vetoed)?;
        writeln!(f, "repeats:             {}", self.repeats)?;
        writeln!(f, "value updates:       {}", self.value_updates)?;
        writeln!(f, "round overflows:     {}", self.round_overflows)?;
        write!(f, "bound updates:       {}", self.bound_updates)
    }
}
