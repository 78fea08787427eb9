//! Iterative branch-and-bound driver.
//!
//! The tree is walked without recursion: each node carries its own [`Step`]
//! and the driver holds the current node id plus the weight most recently
//! returned by a child. Descending means creating a child node (evaluating
//! the candidate decision through the value queue, or reusing a cached
//! evaluation) and switching to it; returning means restoring the child's
//! undo log and resuming the parent at its post step.

use super::node::{NodeId, SearchNode, Step};
use super::SkipSelectPolicy;
use crate::activation::{Mode, Rounds, State, StateChange};
use crate::candidate::{invalidate_cached_decisions, Candidate, DebugState};
use crate::ledger::Ledger;
use crate::propagation::value_queue::{ChangeRecorder, NodeChanges};
use crate::propagation::ValueQueue;
use crate::softmax::SoftMaxCollector;
use crate::stats::SearchStats;
use lucid_core::{ActivationId, Decision, LucidError, Result, SearchConfig};
use rustc_hash::FxHashMap;
use std::fmt::Write as _;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{error, trace};

/// Weight deltas of a cached and a recomputed node may differ by this much.
const CACHE_WEIGHT_TOLERANCE: f64 = 1e-5;

/// Best terminal found so far, with the decisions leading to it.
#[derive(Debug, Clone)]
pub(crate) struct BestPath {
    pub(crate) node: NodeId,
    pub(crate) level: usize,
    pub(crate) weight: f64,
    pub(crate) snapshot: Vec<(ActivationId, Decision, Rounds)>,
}

/// Result of one completed search.
#[derive(Debug)]
pub(crate) struct SearchOutcome {
    pub(crate) weight: f64,
    pub(crate) best: Option<BestPath>,
    pub(crate) avg_states: Option<FxHashMap<ActivationId, State>>,
    pub(crate) nodes: usize,
}

enum ExcludeStep {
    Explore,
    RetrySelect,
    Done,
}

/// State of one search over the candidates of a document.
pub(crate) struct Search<'a> {
    ledger: &'a mut Ledger,
    queue: &'a mut ValueQueue,
    candidates: &'a mut [Candidate],
    config: &'a SearchConfig,
    policy: Option<&'a dyn SkipSelectPolicy>,
    stats: &'a mut SearchStats,
    nodes: Vec<SearchNode>,
    best: Option<BestPath>,
    soft_max: Option<SoftMaxCollector>,
    steps: u64,
}

impl<'a> Search<'a> {
    pub(crate) fn new(
        ledger: &'a mut Ledger,
        queue: &'a mut ValueQueue,
        candidates: &'a mut [Candidate],
        config: &'a SearchConfig,
        policy: Option<&'a dyn SkipSelectPolicy>,
        stats: &'a mut SearchStats,
    ) -> Self {
        let soft_max = config.compute_soft_max.then(SoftMaxCollector::new);
        Self {
            ledger,
            queue,
            candidates,
            config,
            policy,
            stats,
            nodes: Vec::new(),
            best: None,
            soft_max,
            steps: 0,
        }
    }

    /// Run the search to completion.
    ///
    /// The timeout is measured from the start of this call and checked at
    /// every terminal. On error the ledger is left mid-path and must be
    /// rolled back by the caller.
    pub(crate) fn run(mut self, timeout: Option<Duration>) -> Result<SearchOutcome> {
        let start = Instant::now();
        let root = self.create_root();
        let mut current = root;
        let mut returned = f64::NEG_INFINITY;

        let weight = loop {
            let idx = current.index();
            let finished = match self.nodes[idx].step {
                Step::Init => {
                    if self.nodes[idx].level == self.candidates.len() {
                        Some(self.terminal(current, start, timeout)?)
                    } else {
                        self.init_step(current)?;
                        self.nodes[idx].step = Step::PrepareSelect;
                        None
                    }
                }
                Step::PrepareSelect => {
                    self.nodes[idx].step = if self.prepare_select(current) {
                        Step::Select
                    } else {
                        Step::PrepareExclude
                    };
                    None
                }
                Step::Select => {
                    self.nodes[idx].step = Step::PostSelect;
                    match self.nodes[idx].selected_child {
                        Some(child) => current = child,
                        None => self.nodes[idx].step = Step::PrepareExclude,
                    }
                    None
                }
                Step::PostSelect => {
                    self.nodes[idx].selected_weight = returned;
                    if let Some(child) = self.nodes[idx].selected_child {
                        self.post_return(current, child);
                    }
                    self.nodes[idx].step = Step::PrepareExclude;
                    None
                }
                Step::PrepareExclude => {
                    self.nodes[idx].step = match self.prepare_exclude(current) {
                        ExcludeStep::Explore => Step::Exclude,
                        ExcludeStep::RetrySelect => Step::PrepareSelect,
                        ExcludeStep::Done => Step::Final,
                    };
                    None
                }
                Step::Exclude => {
                    self.nodes[idx].step = Step::PostExclude;
                    match self.nodes[idx].excluded_child {
                        Some(child) => current = child,
                        None => self.nodes[idx].step = Step::Final,
                    }
                    None
                }
                Step::PostExclude => {
                    self.nodes[idx].excluded_weight = returned;
                    if let Some(child) = self.nodes[idx].excluded_child {
                        self.post_return(current, child);
                    }
                    self.nodes[idx].step = self.after_exclude(current);
                    None
                }
                Step::Final => Some(self.final_step(current)),
            };

            if let Some(weight) = finished {
                match self.nodes[idx].parent() {
                    Some(parent) => {
                        returned = weight;
                        current = parent;
                    }
                    None => break weight,
                }
            }
        };

        let root_changes = Rc::clone(&self.nodes[root.index()].changes);
        self.restore(&root_changes);

        let avg_states = self.soft_max.as_ref().map(|samples| {
            trace!(samples = samples.len(), "averaging terminal states");
            samples.average()
        });
        Ok(SearchOutcome {
            weight,
            best: self.best,
            avg_states,
            nodes: self.nodes.len(),
        })
    }

    /// Evaluate the decisions that hold before any candidate is decided.
    fn create_root(&mut self) -> NodeId {
        let id = NodeId::new(0);
        let mut recorder = ChangeRecorder::new();
        let inputs: Vec<ActivationId> = self
            .ledger
            .iter()
            .filter(|a| a.is_input() && a.decision() == Decision::Selected)
            .map(|a| a.id())
            .collect();
        for input in inputs {
            self.queue
                .propagate(self.ledger, 0, input, self.config.max_round, &mut recorder);
        }
        self.queue.process(
            self.ledger,
            None,
            self.config.max_round,
            &mut recorder,
            self.stats,
        );
        let changes = recorder.finish(self.ledger);

        let mut root = SearchNode::new(id, None, None, 0);
        root.weight_delta = changes.weight_delta;
        root.accumulated_weight = changes.weight_delta;
        root.changes = Rc::from(changes.changes);
        root.reads = Rc::from(changes.reads);
        self.nodes.push(root);
        self.stats.nodes_created += 1;
        id
    }

    fn init_step(&mut self, id: NodeId) -> Result<()> {
        self.steps += 1;
        self.stats.search_steps += 1;
        if self.steps > self.config.max_search_steps {
            let limit = self.config.max_search_steps;
            error!(limit, path = %self.dump_path(id), "search step limit exceeded");
            return Err(LucidError::SearchStepLimit { limit });
        }

        let c = self.nodes[id.index()].level;
        let act = self.candidates[c].activation;
        let (already_selected, already_excluded) = match self.ledger.act(act).input_decision() {
            Some(Decision::Selected) => (true, false),
            Some(Decision::Excluded) => (false, true),
            _ => {
                let activatable = self.ledger.is_activatable(act);
                (
                    activatable && !self.ledger.is_conflicting(act),
                    !activatable || self.ledger.has_selected_conflict(act),
                )
            }
        };

        let cached = self.cached_decision(c, already_excluded);
        let debug_state = if self.config.optimize_search && cached != Decision::Unknown {
            DebugState::Cached
        } else if already_selected || already_excluded {
            DebugState::Limited
        } else {
            DebugState::Explore
        };
        self.candidates[c].stats.count(debug_state);

        let node = &mut self.nodes[id.index()];
        node.begin_visit();
        node.candidate = Some(c);
        node.already_selected = already_selected;
        node.already_excluded = already_excluded;
        node.debug_state = Some(debug_state);
        trace!(
            node = %id,
            level = c,
            activation = %act,
            already_selected,
            already_excluded,
            state = ?debug_state,
            "search step"
        );
        Ok(())
    }

    fn cached_decision(&self, c: usize, already_excluded: bool) -> Decision {
        if already_excluded {
            Decision::Unknown
        } else {
            self.candidates[c].cached_decision
        }
    }

    /// Open the select branch if allowed. Returns whether a child was
    /// created.
    fn prepare_select(&mut self, id: NodeId) -> bool {
        let node = &self.nodes[id.index()];
        let Some(c) = node.candidate else {
            return false;
        };
        self.candidates[c].repeat = false;
        if node.explored_select {
            return false;
        }

        let act = self.candidates[c].activation;
        let vetoed = !node.already_excluded
            && self
                .policy
                .is_some_and(|p| p.skip_select(self.ledger.act(act)));
        if vetoed {
            self.stats.select_vetoed += 1;
        }
        if node.already_excluded || vetoed {
            self.nodes[id.index()].select_blocked = true;
            return false;
        }

        let cached = self.cached_decision(c, false);
        if !node.force_select && self.config.optimize_search && cached == Decision::Excluded {
            self.stats.pruned_by_cache += 1;
            return false;
        }

        if cached == Decision::Unknown {
            invalidate_cached_decisions(self.ledger, self.candidates, act);
        }
        let child = self.create_child(id, Decision::Selected);
        let node = &mut self.nodes[id.index()];
        node.selected_child = Some(child);
        node.explored_select = true;
        self.candidates[c].stats.selected += 1;
        true
    }

    fn prepare_exclude(&mut self, id: NodeId) -> ExcludeStep {
        let node = &self.nodes[id.index()];
        let Some(c) = node.candidate else {
            return ExcludeStep::Done;
        };
        if node.explored_exclude {
            return ExcludeStep::Done;
        }

        let act = self.candidates[c].activation;
        let must = !node.explored_select && node.select_blocked;
        if !must {
            let skip = if node.already_selected {
                true
            } else if self.config.optimize_search
                && node.explored_select
                && self.candidates[c].cached_decision == Decision::Selected
            {
                self.stats.pruned_by_cache += 1;
                true
            } else if !node.already_excluded && self.ledger.generates_unsuppressed_excluded(act) {
                self.stats.pruned_unsuppressed += 1;
                true
            } else {
                false
            };

            if skip {
                if !node.explored_select && !node.select_blocked {
                    self.nodes[id.index()].force_select = true;
                    return ExcludeStep::RetrySelect;
                }
                return ExcludeStep::Done;
            }
        }

        let child = self.create_child(id, Decision::Excluded);
        let node = &mut self.nodes[id.index()];
        node.excluded_child = Some(child);
        node.explored_exclude = true;
        self.candidates[c].stats.excluded += 1;
        ExcludeStep::Explore
    }

    fn after_exclude(&mut self, id: NodeId) -> Step {
        let node = &self.nodes[id.index()];
        let repeat = node
            .candidate
            .is_some_and(|c| self.candidates[c].repeat);
        if self.config.optimize_search && repeat && !node.explored_select {
            self.stats.repeats += 1;
            Step::PrepareSelect
        } else {
            Step::Final
        }
    }

    /// Pick the winning branch and return its weight.
    fn final_step(&mut self, id: NodeId) -> f64 {
        let node = &self.nodes[id.index()];
        let Some(c) = node.candidate else {
            return node.accumulated_weight;
        };
        let select_wins = node.explored_select
            && (!node.explored_exclude
                || node.already_selected
                || node.selected_weight >= node.excluded_weight);
        let (decision, weight, other) = if select_wins {
            (Decision::Selected, node.selected_weight, node.excluded_child)
        } else {
            (Decision::Excluded, node.excluded_weight, node.selected_child)
        };
        let already_excluded = node.already_excluded;

        let candidate = &mut self.candidates[c];
        if candidate.cached_decision == Decision::Unknown && !already_excluded {
            candidate.cached_decision = decision;
        }
        if let Some(other) = other {
            if candidate.cached_node != Some(other) {
                self.nodes[other.index()].release();
            }
        }
        weight
    }

    /// Evaluate a terminal node.
    fn terminal(&mut self, id: NodeId, start: Instant, timeout: Option<Duration>) -> Result<f64> {
        if let Some(budget) = timeout {
            let elapsed = start.elapsed();
            if elapsed >= budget {
                return Err(LucidError::Timeout { elapsed, budget });
            }
        }
        self.stats.terminals += 1;

        let node = &self.nodes[id.index()];
        let weight = node.accumulated_weight;
        let level = node.level;
        let better = self
            .best
            .as_ref()
            .is_none_or(|b| level > b.level || weight > b.weight);

        if better || self.soft_max.is_some() {
            let path = self.path_activations(id);
            if let Some(soft_max) = self.soft_max.as_mut() {
                let states = path
                    .iter()
                    .map(|&act| (act, self.ledger.act(act).rounds().last_state()));
                soft_max.record(id, weight, states);
            }
            if better {
                let snapshot = path
                    .into_iter()
                    .map(|act| {
                        let a = self.ledger.act(act);
                        (act, a.decision(), a.rounds().clone())
                    })
                    .collect();
                trace!(node = %id, weight, "new best interpretation");
                self.stats.best_updates += 1;
                self.best = Some(BestPath {
                    node: id,
                    level,
                    weight,
                    snapshot,
                });
            }
        }
        Ok(weight)
    }

    /// Candidate activations decided on the path to `id`.
    fn path_activations(&self, id: NodeId) -> Vec<ActivationId> {
        let mut acts = Vec::new();
        let mut current = id;
        while let Some(parent) = self.nodes[current.index()].parent() {
            if let Some(c) = self.nodes[parent.index()].candidate {
                acts.push(self.candidates[c].activation);
            }
            current = parent;
        }
        acts.reverse();
        acts
    }

    /// Create the child of `parent` for deciding its candidate.
    fn create_child(&mut self, parent: NodeId, decision: Decision) -> NodeId {
        let p = &self.nodes[parent.index()];
        let (selected_parent, excluded_parent) = match decision {
            Decision::Selected => (Some(parent), p.excluded_parent),
            _ => (p.selected_parent, Some(parent)),
        };
        let level = p.level + 1;
        let parent_weight = p.accumulated_weight;
        let Some(c) = p.candidate else {
            return parent;
        };
        let act = self.candidates[c].activation;
        let id = NodeId::new(self.nodes.len() as u32);

        let reusable = if self.config.enable_caching || self.config.verify_cache {
            self.candidates[c].cached_node.filter(|&cached| {
                let node = &self.nodes[cached.index()];
                node.decision() == decision && node.is_reusable(self.ledger)
            })
        } else {
            None
        };

        let mut child = SearchNode::new(id, selected_parent, excluded_parent, level);
        match reusable {
            Some(cached) if !self.config.verify_cache => {
                let cached = &self.nodes[cached.index()];
                let changes = Rc::clone(&cached.changes);
                child.reads = Rc::clone(&cached.reads);
                child.weight_delta = cached.weight_delta;
                for change in changes.iter() {
                    self.ledger.apply(change.act, change.state(Mode::New));
                }
                child.changes = changes;
                self.stats.cache_hits += 1;
                self.candidates[c].stats.reused += 1;
            }
            _ => {
                let computed = self.compute(act, decision);
                if let Some(cached) = reusable {
                    self.verify(cached, &computed);
                }
                child.weight_delta = computed.weight_delta;
                child.changes = Rc::from(computed.changes);
                child.reads = Rc::from(computed.reads);
                self.stats.cache_misses += 1;
                self.candidates[c].stats.computed += 1;
            }
        }
        child.accumulated_weight = parent_weight + child.weight_delta;
        trace!(
            node = %id,
            parent = %parent,
            activation = %act,
            decision = %decision.symbol(),
            delta = child.weight_delta,
            "created search node"
        );

        self.nodes.push(child);
        self.candidates[c].cached_node = Some(id);
        self.stats.nodes_created += 1;
        id
    }

    /// Apply `decision` to `act` and propagate it through the value queue.
    fn compute(&mut self, act: ActivationId, decision: Decision) -> NodeChanges {
        let mut recorder = ChangeRecorder::new();
        recorder.before_change(self.ledger, act);
        self.ledger.set_decision(act, decision);
        self.queue.process(
            self.ledger,
            Some(act),
            self.config.max_round,
            &mut recorder,
            self.stats,
        );
        recorder.finish(self.ledger)
    }

    fn verify(&mut self, cached: NodeId, computed: &NodeChanges) {
        let node = &self.nodes[cached.index()];
        let tolerance = self.ledger.tolerance();
        let same_delta = (node.weight_delta - computed.weight_delta).abs() <= CACHE_WEIGHT_TOLERANCE;
        let same_changes = node.changes.len() == computed.changes.len()
            && node
                .changes
                .iter()
                .zip(&computed.changes)
                .all(|(a, b)| same_outcome(a, b, tolerance));
        if !(same_delta && same_changes) {
            self.stats.cache_mismatches += 1;
            error!(
                node = %cached,
                cached_delta = node.weight_delta,
                computed_delta = computed.weight_delta,
                "cached search node disagrees with recomputation"
            );
        }
    }

    /// Undo `child`, then put its candidate back to undecided.
    fn post_return(&mut self, parent: NodeId, child: NodeId) {
        let changes = Rc::clone(&self.nodes[child.index()].changes);
        self.restore(&changes);
        if let Some(c) = self.nodes[parent.index()].candidate {
            let act = self.candidates[c].activation;
            self.ledger.set_decision(act, Decision::Unknown);
            self.ledger.reset_rounds(act);
        }
    }

    fn restore(&mut self, changes: &[StateChange]) {
        for change in changes.iter().rev() {
            self.ledger.apply(change.act, change.state(Mode::Old));
        }
    }

    /// One line per node from `id` up to the root.
    pub(crate) fn dump_path(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut current = Some(id);
        while let Some(n) = current {
            let node = &self.nodes[n.index()];
            let debug_state = node
                .debug_state
                .map_or_else(|| "-".to_string(), |s| format!("{s:?}"));
            let _ = write!(
                out,
                "{} L:{} {} {} AW:{:.3} DW:{:.3}",
                node.id,
                node.level,
                debug_state,
                node.decision().symbol(),
                node.accumulated_weight,
                node.weight_delta
            );
            if let Some(c) = node.candidate {
                let act = self.ledger.act(self.candidates[c].activation);
                let _ = write!(out, " ACT:{} {} {}", act.id(), act.label(), act.range());
            }
            out.push('\n');
            current = node.parent();
        }
        out
    }
}

fn same_outcome(a: &StateChange, b: &StateChange, tolerance: f64) -> bool {
    a.act == b.act
        && a.new.decision == b.new.decision
        && a.new.rounds.approx_eq(&b.new.rounds, tolerance)
}
