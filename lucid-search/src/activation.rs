//! Activations and their per-round state.
//!
//! An activation is one neuron instantiated over a document range. Its value
//! is tracked per propagation round as a step function: a round without an
//! explicit entry repeats the most recent earlier one, and the last entry is
//! the fixed point reached so far.

use lucid_core::{
    ActivationId, Decision, Neuron, NeuronId, NeuronKind, Range, SynapseId, SynapseMeta,
};
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Index of a link in the ledger.
pub(crate) type LinkId = u32;

/// Computed state of an activation in one round.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct State {
    /// Output of the transfer function
    pub value: f64,
    /// Net input (bias plus weighted inputs)
    pub net: f64,
    /// Contribution to the interpretation weight
    pub weight: f64,
}

impl State {
    /// State of an excluded or inactive activation.
    pub const ZERO: State = State {
        value: 0.0,
        net: 0.0,
        weight: 0.0,
    };

    /// Fixed state of an input activation.
    #[must_use]
    pub fn input(value: f64) -> Self {
        Self {
            value,
            net: value,
            weight: 0.0,
        }
    }

    /// Compare value, net and weight within `tolerance`.
    #[must_use]
    pub fn approx_eq(&self, other: &State, tolerance: f64) -> bool {
        (self.value - other.value).abs() <= tolerance
            && (self.net - other.net).abs() <= tolerance
            && (self.weight - other.weight).abs() <= tolerance
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "V:{:.3} N:{:.3} W:{:.3}",
            self.value, self.net, self.weight
        )
    }
}

/// Round history of an activation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rounds {
    states: BTreeMap<u32, State>,
}

impl Rounds {
    /// State visible at `round`: the entry at or most recently before it.
    #[must_use]
    pub fn get(&self, round: u32) -> Option<&State> {
        self.states.range(..=round).next_back().map(|(_, s)| s)
    }

    /// Last explicit entry.
    #[must_use]
    pub fn last(&self) -> Option<(u32, &State)> {
        self.states.iter().next_back().map(|(r, s)| (*r, s))
    }

    /// Fixed-point state, zero if nothing was computed.
    #[must_use]
    pub fn last_state(&self) -> State {
        self.last().map_or(State::ZERO, |(_, s)| *s)
    }

    /// Number of explicit entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check whether no round was computed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Iterate over explicit entries in round order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &State)> {
        self.states.iter().map(|(r, s)| (*r, s))
    }

    /// Check whether storing `state` at `round` would change the visible
    /// history.
    #[must_use]
    pub fn differs_at(&self, round: u32, state: &State, tolerance: f64) -> bool {
        self.get(round)
            .is_none_or(|current| !current.approx_eq(state, tolerance))
    }

    /// Store `state` at `round`, returning whether the visible state at
    /// `round` changed.
    pub fn set(&mut self, round: u32, state: State, tolerance: f64) -> bool {
        if !self.differs_at(round, &state, tolerance) {
            return false;
        }
        let previous = round.checked_sub(1).and_then(|r| self.get(r)).copied();
        if previous.is_some_and(|p| p.approx_eq(&state, tolerance)) {
            // Converged onto the previous round.
            self.states.remove(&round);
        } else {
            self.states.insert(round, state);
        }
        self.collapse_after(round, tolerance);
        true
    }

    /// Drop entries after `round` that repeat the state visible at `round`.
    fn collapse_after(&mut self, round: u32, tolerance: f64) {
        let Some(visible) = self.get(round).copied() else {
            return;
        };
        while let Some((&next, next_state)) = self.states.range(round + 1..).next() {
            if !next_state.approx_eq(&visible, tolerance) {
                break;
            }
            self.states.remove(&next);
        }
    }

    /// Compare two histories entry by entry.
    #[must_use]
    pub fn approx_eq(&self, other: &Rounds, tolerance: f64) -> bool {
        self.states.len() == other.states.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((ra, sa), (rb, sb))| ra == rb && sa.approx_eq(sb, tolerance))
    }

    pub(crate) fn clear(&mut self) {
        self.states.clear();
    }
}

impl fmt::Display for Rounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (round, state)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "[R{} {}]", round, state)?;
        }
        Ok(())
    }
}

/// Connection between two activations of one document.
#[derive(Debug, Clone)]
pub struct Link {
    /// Synapse the link instantiates
    pub synapse: SynapseId,
    /// Source activation
    pub input: ActivationId,
    /// Target activation
    pub output: ActivationId,
    /// Structural flags cached from the synapse
    pub meta: SynapseMeta,
    /// Negative recurrent feedback from an inhibitor that the output itself
    /// drives; ignored during value computation.
    pub self_suppressing: bool,
}

/// One neuron instantiated over a document range.
#[derive(Debug)]
pub struct Activation {
    pub(crate) id: ActivationId,
    pub(crate) neuron: Arc<Neuron>,
    pub(crate) kind: NeuronKind,
    pub(crate) range: Range,
    pub(crate) decision: Decision,
    pub(crate) input_decision: Option<Decision>,
    pub(crate) input_value: Option<f64>,
    pub(crate) rounds: Rounds,
    pub(crate) generation: u64,
    pub(crate) upper_bound: f64,
    pub(crate) final_decision: Decision,
    pub(crate) final_rounds: Rounds,
    pub(crate) avg_state: Option<State>,
    pub(crate) inputs: SmallVec<[LinkId; 4]>,
    pub(crate) outputs: SmallVec<[LinkId; 4]>,
    pub(crate) conflicts: BTreeSet<ActivationId>,
    pub(crate) candidate: Option<usize>,
}

impl Activation {
    pub(crate) fn new(id: ActivationId, neuron: Arc<Neuron>, range: Range) -> Self {
        let params = neuron.params();
        Self {
            id,
            kind: params.kind,
            range,
            decision: Decision::Unknown,
            input_decision: None,
            input_value: None,
            rounds: Rounds::default(),
            generation: 0,
            upper_bound: params.transfer.upper_limit(),
            final_decision: Decision::Unknown,
            final_rounds: Rounds::default(),
            avg_state: None,
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
            conflicts: BTreeSet::new(),
            candidate: None,
            neuron,
        }
    }

    /// Identifier
    #[must_use]
    pub fn id(&self) -> ActivationId {
        self.id
    }

    /// Owning neuron
    #[must_use]
    pub fn neuron_id(&self) -> NeuronId {
        self.neuron.id()
    }

    /// Label of the owning neuron
    #[must_use]
    pub fn label(&self) -> &str {
        self.neuron.label()
    }

    /// Excitatory or inhibitory
    #[must_use]
    pub fn kind(&self) -> NeuronKind {
        self.kind
    }

    /// Document range
    #[must_use]
    pub fn range(&self) -> Range {
        self.range
    }

    /// Decision on the current search path
    #[must_use]
    pub fn decision(&self) -> Decision {
        self.decision
    }

    /// Externally fixed decision, if any
    #[must_use]
    pub fn input_decision(&self) -> Option<Decision> {
        self.input_decision
    }

    /// Check whether this is an input activation with a fixed value.
    #[must_use]
    pub fn is_input(&self) -> bool {
        self.input_value.is_some()
    }

    /// Optimistic bound on the value
    #[must_use]
    pub fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    /// Round history on the current search path
    #[must_use]
    pub fn rounds(&self) -> &Rounds {
        &self.rounds
    }

    /// Decision in the committed interpretation
    #[must_use]
    pub fn final_decision(&self) -> Decision {
        self.final_decision
    }

    /// Round history in the committed interpretation
    #[must_use]
    pub fn final_rounds(&self) -> &Rounds {
        &self.final_rounds
    }

    /// Fixed-point state in the committed interpretation.
    #[must_use]
    pub fn final_state(&self) -> State {
        self.final_rounds.last_state()
    }

    /// Check whether the activation is part of the committed interpretation.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.final_decision == Decision::Selected
    }

    /// Soft-max weighted average state over all explored interpretations
    #[must_use]
    pub fn avg_state(&self) -> Option<State> {
        self.avg_state
    }

    /// Activations that cannot be selected together with this one
    pub fn conflicts(&self) -> impl Iterator<Item = ActivationId> + '_ {
        self.conflicts.iter().copied()
    }

    /// Position in the candidate order of the last search
    #[must_use]
    pub fn candidate_position(&self) -> Option<usize> {
        self.candidate
    }

    /// Queue key: candidates by position, everything else first.
    pub(crate) fn sequence(&self) -> u32 {
        self.candidate.map_or(0, |c| c as u32 + 1)
    }

    pub(crate) fn snapshot(&self) -> ActState {
        ActState {
            decision: self.decision,
            rounds: self.rounds.clone(),
            generation: self.generation,
        }
    }

    pub(crate) fn observed(&self) -> Observed {
        Observed {
            generation: self.generation,
            decision: self.decision,
        }
    }
}

/// Decision and round history of one activation at one instant.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ActState {
    pub(crate) decision: Decision,
    pub(crate) rounds: Rounds,
    pub(crate) generation: u64,
}

/// Which side of a [`StateChange`] to restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// State before the node was evaluated
    Old,
    /// State after the node was evaluated
    New,
}

/// Undo record for one activation touched while evaluating a search node.
#[derive(Debug, Clone)]
pub(crate) struct StateChange {
    pub(crate) act: ActivationId,
    pub(crate) old: ActState,
    pub(crate) new: ActState,
}

impl StateChange {
    pub(crate) fn state(&self, mode: Mode) -> &ActState {
        match mode {
            Mode::Old => &self.old,
            Mode::New => &self.new,
        }
    }

    /// Weight contributed by this change to the path weight.
    pub(crate) fn weight_delta(&self) -> f64 {
        self.new.rounds.last_state().weight - self.old.rounds.last_state().weight
    }
}

/// Generation stamp and decision of an activation as read by a search node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Observed {
    pub(crate) generation: u64,
    pub(crate) decision: Decision,
}
