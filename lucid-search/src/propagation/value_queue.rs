//! Round value propagation.
//!
//! One ordered set per round keyed by `(sequence, activation id)`. A state
//! change at round `r` enqueues each decided dependent at `r` (ordinary
//! link) or `r + 1` (recurrent link); undecided dependents are left alone
//! until they get a decision. Rounds drain in ascending order, which makes
//! the propagation a discrete fixed-point iteration over feedback loops.
//!
//! Every activation read or written while draining is reported to a
//! [`ChangeRecorder`], producing the undo log and read set of the search
//! node being evaluated.

use crate::activation::{ActState, Observed, StateChange};
use crate::ledger::Ledger;
use crate::stats::SearchStats;
use lucid_core::{ActivationId, Decision};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use tracing::warn;

/// Undo log, read set and weight delta of one node evaluation.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeChanges {
    pub(crate) changes: Vec<StateChange>,
    pub(crate) reads: Vec<(ActivationId, Observed)>,
    pub(crate) weight_delta: f64,
}

/// Collects the activations observed and modified while evaluating a node.
#[derive(Debug, Default)]
pub(crate) struct ChangeRecorder {
    old: Vec<(ActivationId, ActState)>,
    modified: FxHashMap<ActivationId, usize>,
    reads: FxHashMap<ActivationId, Observed>,
}

impl ChangeRecorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record the state of `act` as first seen by this node.
    pub(crate) fn observe(&mut self, ledger: &Ledger, act: ActivationId) {
        self.reads
            .entry(act)
            .or_insert_with(|| ledger.observe(act));
    }

    /// Save the pre-change state of `act` the first time it is modified.
    pub(crate) fn before_change(&mut self, ledger: &Ledger, act: ActivationId) {
        self.observe(ledger, act);
        if !self.modified.contains_key(&act) {
            self.modified.insert(act, self.old.len());
            self.old.push((act, ledger.act(act).snapshot()));
        }
    }

    /// Capture the post-change states and compute the weight delta.
    pub(crate) fn finish(self, ledger: &Ledger) -> NodeChanges {
        let mut changes: Vec<StateChange> = self
            .old
            .into_iter()
            .map(|(act, old)| StateChange {
                act,
                old,
                new: ledger.act(act).snapshot(),
            })
            .collect();
        changes.sort_by_key(|c| c.act);
        let weight_delta = changes.iter().map(StateChange::weight_delta).sum();

        let mut reads: Vec<(ActivationId, Observed)> = self.reads.into_iter().collect();
        reads.sort_by_key(|(act, _)| *act);

        NodeChanges {
            changes,
            reads,
            weight_delta,
        }
    }
}

/// Per-round queues of activations awaiting recomputation.
#[derive(Debug, Default)]
pub struct ValueQueue {
    rounds: Vec<BTreeSet<(u32, ActivationId)>>,
}

impl ValueQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rounds.iter().all(BTreeSet::is_empty)
    }

    /// Enqueue `act` for `round` unless it is undecided.
    pub(crate) fn add(&mut self, ledger: &Ledger, round: u32, act: ActivationId) {
        let activation = ledger.act(act);
        if activation.decision() == Decision::Unknown {
            return;
        }
        let r = round as usize;
        if self.rounds.len() <= r {
            self.rounds.resize_with(r + 1, BTreeSet::new);
        }
        self.rounds[r].insert((activation.sequence(), act));
    }

    /// Enqueue `act` at `round` and again at every later round up to
    /// `max_round` where its own history or the history of a selected input
    /// has an entry, since those rounds were computed from older inputs.
    fn schedule(
        &mut self,
        ledger: &Ledger,
        round: u32,
        act: ActivationId,
        max_round: u32,
        recorder: &mut ChangeRecorder,
    ) {
        recorder.observe(ledger, act);
        let activation = ledger.act(act);
        if activation.decision() == Decision::Unknown {
            return;
        }
        self.add(ledger, round, act);

        let mut later: BTreeSet<u32> = activation
            .rounds()
            .iter()
            .map(|(r, _)| r)
            .filter(|&r| r > round)
            .collect();
        for link in ledger.input_links(act) {
            recorder.observe(ledger, link.input);
            let input = ledger.act(link.input);
            if input.decision() != Decision::Selected {
                continue;
            }
            let shift = u32::from(link.meta.recurrent);
            later.extend(
                input
                    .rounds()
                    .iter()
                    .map(|(r, _)| r + shift)
                    .filter(|&r| r > round),
            );
        }
        for r in later.into_iter().take_while(|&r| r <= max_round) {
            self.add(ledger, r, act);
        }
    }

    /// Enqueue the decided dependents of `act` after its state changed at
    /// `round`.
    pub(crate) fn propagate(
        &mut self,
        ledger: &Ledger,
        round: u32,
        act: ActivationId,
        max_round: u32,
        recorder: &mut ChangeRecorder,
    ) {
        let targets: Vec<(u32, ActivationId)> = ledger
            .output_links(act)
            .map(|l| {
                let r = if l.meta.recurrent { round + 1 } else { round };
                (r, l.output)
            })
            .collect();
        for (r, output) in targets {
            self.schedule(ledger, r, output, max_round, recorder);
        }
    }

    /// Drain all rounds, starting from `start` at round 0 if given.
    pub(crate) fn process(
        &mut self,
        ledger: &mut Ledger,
        start: Option<ActivationId>,
        max_round: u32,
        recorder: &mut ChangeRecorder,
        stats: &mut SearchStats,
    ) {
        if let Some(act) = start {
            self.schedule(ledger, 0, act, max_round, recorder);
        }

        let mut round = 0;
        while round < self.rounds.len() {
            while let Some((_, act)) = self.rounds[round].pop_first() {
                let r = round as u32;
                recorder.observe(ledger, act);
                let inputs: Vec<ActivationId> = ledger.input_links(act).map(|l| l.input).collect();
                for input in inputs {
                    recorder.observe(ledger, input);
                }

                let state = ledger.compute_state(act, r);
                if !ledger.act(act).rounds().differs_at(r, &state, ledger.tolerance()) {
                    continue;
                }
                recorder.before_change(ledger, act);
                ledger.set_round(act, r, state);
                stats.value_updates += 1;

                if r >= max_round {
                    stats.round_overflows += 1;
                    warn!(
                        activation = %act,
                        label = ledger.act(act).label(),
                        round = r,
                        "value did not converge within the round limit"
                    );
                    continue;
                }
                self.propagate(ledger, r, act, max_round, recorder);
            }
            round += 1;
        }
        self.rounds.clear();
    }

    /// Drop pending work.
    pub fn clear(&mut self) {
        self.rounds.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lucid_core::{Network, NeuronParams, Range, Synapse};
    use std::sync::Arc;

    /// Input W feeding A, A feeding B, B feeding back into A.
    fn chain() -> (Ledger, ActivationId, ActivationId) {
        let net = Arc::new(Network::new());
        let w = net.create_neuron("W", NeuronParams::excitatory(0.0));
        let a = net.create_neuron("A", NeuronParams::excitatory(-1.0));
        let b = net.create_neuron("B", NeuronParams::excitatory(0.0));
        let wa = net.add_synapse(a, Synapse::new(w, 2.0)).unwrap();
        let ab = net.add_synapse(b, Synapse::new(a, 1.0)).unwrap();
        let ba = net.add_synapse(a, Synapse::new(b, 1.0).recurrent()).unwrap();

        let mut ledger = Ledger::new(net, 1e-6);
        let range = Range::new(0, 1).unwrap();
        let (iw, _) = ledger.register(w, range).unwrap();
        ledger.set_input(iw, 1.0).unwrap();
        let (ia, _) = ledger.register(a, range).unwrap();
        let (ib, _) = ledger.register(b, range).unwrap();
        ledger.link(wa, iw, ia).unwrap();
        ledger.link(ab, ia, ib).unwrap();
        ledger.link(ba, ib, ia).unwrap();
        (ledger, ia, ib)
    }

    #[test]
    fn test_unknown_outputs_are_deferred() {
        let (mut ledger, a, b) = chain();
        let mut queue = ValueQueue::new();
        let mut recorder = ChangeRecorder::new();
        let mut stats = SearchStats::default();

        ledger.set_decision(a, Decision::Selected);
        queue.process(&mut ledger, Some(a), 20, &mut recorder, &mut stats);
        let changes = recorder.finish(&ledger);

        assert!(queue.is_empty());
        assert_eq!(changes.changes.len(), 1);
        assert_eq!(changes.changes[0].act, a);
        assert!((changes.weight_delta - 1.0).abs() < 1e-12);
        assert!(ledger.act(b).rounds().is_empty());
        // B was looked at but not computed.
        assert!(changes.reads.iter().any(|(id, o)| *id == b && o.decision == Decision::Unknown));
    }

    #[test]
    fn test_recurrent_feedback_reaches_fixed_point() {
        let (mut ledger, a, b) = chain();
        let mut queue = ValueQueue::new();
        let mut stats = SearchStats::default();

        ledger.set_decision(a, Decision::Selected);
        let mut recorder = ChangeRecorder::new();
        queue.process(&mut ledger, Some(a), 20, &mut recorder, &mut stats);
        recorder.finish(&ledger);

        ledger.set_decision(b, Decision::Selected);
        let mut recorder = ChangeRecorder::new();
        queue.process(&mut ledger, Some(b), 20, &mut recorder, &mut stats);
        let changes = recorder.finish(&ledger);

        let a_rounds = ledger.act(a).rounds();
        assert!(a_rounds.len() >= 2);
        let fixed = a_rounds.last_state();
        let b_last = ledger.act(b).rounds().last_state();
        // A = -1 + 2 + tanh(B), B = tanh(A)
        assert!((fixed.net - (1.0 + b_last.value)).abs() < 1e-5);
        assert!((b_last.net - fixed.value).abs() < 1e-5);
        assert_eq!(stats.round_overflows, 0);

        let expected: f64 = changes.changes.iter().map(StateChange::weight_delta).sum();
        assert!((changes.weight_delta - expected).abs() < 1e-12);
    }

    #[test]
    fn test_round_cap_stops_propagation() {
        let (mut ledger, a, b) = chain();
        let mut queue = ValueQueue::new();
        let mut stats = SearchStats::default();

        ledger.set_decision(a, Decision::Selected);
        ledger.set_decision(b, Decision::Selected);
        let mut recorder = ChangeRecorder::new();
        queue.process(&mut ledger, Some(a), 1, &mut recorder, &mut stats);

        assert!(stats.round_overflows > 0);
        assert!(queue.is_empty());
        assert!(ledger.act(a).rounds().last().is_some_and(|(r, _)| r <= 2));
    }
}
