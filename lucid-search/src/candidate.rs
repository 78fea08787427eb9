//! Candidate ordering.
//!
//! Eligible undecided activations (decision unknown, positive upper bound)
//! are ordered so that every activation comes after the eligible
//! activations it reads through non-recurrent links. The order is produced
//! by peeling the dependency graph by in-degree, always placing the
//! smallest ready activation id next, so it is deterministic.

use crate::ledger::Ledger;
use crate::search::NodeId;
use lucid_core::{ActivationId, Decision, LucidError, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, error};

/// How a search node treated its candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebugState {
    /// A cached decision was available
    Cached,
    /// One branch was ruled out up front
    Limited,
    /// Both branches were open
    Explore,
}

/// Exploration counters of one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateStats {
    /// Visits with a cached decision
    pub cached: u64,
    /// Visits with one branch ruled out
    pub limited: u64,
    /// Visits with both branches open
    pub explored: u64,
    /// Select branches taken
    pub selected: u64,
    /// Exclude branches taken
    pub excluded: u64,
    /// Child nodes whose state was reused from the cached node
    pub reused: u64,
    /// Child nodes computed through the value queue
    pub computed: u64,
}

impl CandidateStats {
    pub(crate) fn count(&mut self, state: DebugState) {
        match state {
            DebugState::Cached => self.cached += 1,
            DebugState::Limited => self.limited += 1,
            DebugState::Explore => self.explored += 1,
        }
    }
}

/// An undecided activation in its place of the decision order.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub(crate) position: usize,
    pub(crate) activation: ActivationId,
    pub(crate) cached_decision: Decision,
    pub(crate) cached_node: Option<NodeId>,
    pub(crate) repeat: bool,
    pub(crate) stats: CandidateStats,
}

impl Candidate {
    fn new(position: usize, activation: ActivationId) -> Self {
        Self {
            position,
            activation,
            cached_decision: Decision::Unknown,
            cached_node: None,
            repeat: false,
            stats: CandidateStats::default(),
        }
    }

    /// Position in the decision order.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Activation decided at this position.
    #[must_use]
    pub fn activation(&self) -> ActivationId {
        self.activation
    }

    /// Decision remembered from the last time this candidate was resolved.
    #[must_use]
    pub fn cached_decision(&self) -> Decision {
        self.cached_decision
    }

    /// Exploration counters.
    #[must_use]
    pub fn stats(&self) -> &CandidateStats {
        &self.stats
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        write!(
            f,
            "CID:{} ACT:{} CD:{} CACHED:{} LIMITED:{} EXPLORE:{} SEL:{} EXCL:{} REUSED:{} COMPUTED:{}",
            self.position,
            self.activation,
            self.cached_decision.symbol(),
            s.cached,
            s.limited,
            s.explored,
            s.selected,
            s.excluded,
            s.reused,
            s.computed
        )
    }
}

/// Order the eligible activations of `ledger` into candidates.
///
/// Fails with [`LucidError::DependencyCycle`] if the non-recurrent links
/// among eligible activations form a cycle.
pub(crate) fn generate_candidates(ledger: &mut Ledger) -> Result<Vec<Candidate>> {
    for act in ledger.activations_mut() {
        act.candidate = None;
    }

    let eligible: BTreeSet<ActivationId> = ledger
        .iter()
        .filter(|a| a.decision() == Decision::Unknown && a.upper_bound() > 0.0)
        .map(|a| a.id())
        .collect();

    let mut pending: FxHashMap<ActivationId, usize> = FxHashMap::default();
    for &act in &eligible {
        let blocking = ledger
            .input_links(act)
            .filter(|l| !l.meta.recurrent && eligible.contains(&l.input))
            .count();
        pending.insert(act, blocking);
    }

    let mut ready: BTreeSet<ActivationId> = pending
        .iter()
        .filter(|(_, blocking)| **blocking == 0)
        .map(|(act, _)| *act)
        .collect();
    let mut candidates = Vec::with_capacity(eligible.len());

    while let Some(act) = ready.pop_first() {
        pending.remove(&act);
        ledger.act_mut(act).candidate = Some(candidates.len());
        candidates.push(Candidate::new(candidates.len(), act));

        let dependents: Vec<ActivationId> = ledger
            .output_links(act)
            .filter(|l| !l.meta.recurrent)
            .map(|l| l.output)
            .collect();
        for output in dependents {
            if let Some(blocking) = pending.get_mut(&output) {
                *blocking -= 1;
                if *blocking == 0 {
                    ready.insert(output);
                }
            }
        }
    }

    if !pending.is_empty() {
        let mut activations: Vec<ActivationId> = pending.into_keys().collect();
        activations.sort();
        for act in ledger.activations_mut() {
            act.candidate = None;
        }
        error!(
            remaining = activations.len(),
            "cycle detected in activations that is not marked recurrent"
        );
        return Err(LucidError::DependencyCycle { activations });
    }

    debug!(candidates = candidates.len(), "generated candidates");
    Ok(candidates)
}

/// Forget cached decisions that a change of `act` may have made stale: an
/// excluded decision of `act` itself (marked for a repeated select) and
/// selected decisions of its conflict partners.
pub(crate) fn invalidate_cached_decision(
    ledger: &Ledger,
    candidates: &mut [Candidate],
    act: ActivationId,
) {
    let activation = ledger.act(act);
    if let Some(c) = activation.candidate {
        if candidates[c].cached_decision == Decision::Excluded {
            candidates[c].cached_decision = Decision::Unknown;
            candidates[c].repeat = true;
        }
    }
    for conflict in activation.conflicts() {
        if let Some(c) = ledger.act(conflict).candidate {
            if candidates[c].cached_decision == Decision::Selected {
                candidates[c].cached_decision = Decision::Unknown;
            }
        }
    }
}

/// Invalidate cached decisions of everything `act` excites.
pub(crate) fn invalidate_cached_decisions(
    ledger: &Ledger,
    candidates: &mut [Candidate],
    act: ActivationId,
) {
    let outputs: Vec<ActivationId> = ledger
        .output_links(act)
        .filter(|l| !l.meta.negative)
        .map(|l| l.output)
        .collect();
    for output in outputs {
        invalidate_cached_decision(ledger, candidates, output);
    }
}
