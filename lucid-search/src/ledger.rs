//! Activation Ledger.
//!
//! Per-document registry of activations. Owns:
//! - activations indexed by id, by range begin, by range end and by
//!   (neuron, range)
//! - links between activations and the conflict relation derived from them
//! - decisions, round histories and generation stamps
//!
//! Generation stamps come from one monotonic counter. Every new round
//! history gets a fresh stamp and restoring an old history restores its old
//! stamp, so two equal stamps always denote the same history. An empty
//! history has stamp `0`.

use crate::activation::{ActState, Activation, Link, LinkId, Observed, Rounds, State};
use lucid_core::{
    ActivationId, Decision, LucidError, Network, NeuronId, NeuronKind, Range, Result,
    SynapseId,
};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::trace;

type RangeKey = (i64, NeuronId, ActivationId);

const MIN_NEURON: NeuronId = NeuronId::new(0);
const MIN_ACTIVATION: ActivationId = ActivationId::new(0);

/// Registry of the activations of one document.
#[derive(Debug)]
pub struct Ledger {
    network: Arc<Network>,
    activations: Vec<Activation>,
    links: Vec<Link>,
    by_begin: BTreeSet<RangeKey>,
    by_end: BTreeSet<RangeKey>,
    by_neuron: FxHashMap<NeuronId, BTreeMap<Range, ActivationId>>,
    generation: u64,
    tolerance: f64,
}

impl Ledger {
    /// Create an empty ledger over `network`.
    pub fn new(network: Arc<Network>, tolerance: f64) -> Self {
        Self {
            network,
            activations: Vec::new(),
            links: Vec::new(),
            by_begin: BTreeSet::new(),
            by_end: BTreeSet::new(),
            by_neuron: FxHashMap::default(),
            generation: 0,
            tolerance,
        }
    }

    /// Network the activations belong to.
    #[must_use]
    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Number of activations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.activations.len()
    }

    /// Check whether the ledger holds no activations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }

    /// Look up an activation.
    #[must_use]
    pub fn get(&self, id: ActivationId) -> Option<&Activation> {
        self.activations.get(id.index())
    }

    /// Look up an activation, failing on unknown ids.
    pub fn activation(&self, id: ActivationId) -> Result<&Activation> {
        self.get(id).ok_or(LucidError::UnknownActivation(id))
    }

    /// All activations in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Activation> {
        self.activations.iter()
    }

    /// Number of links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Look up a link.
    #[must_use]
    pub fn get_link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id as usize)
    }

    /// Input links of an activation.
    pub fn input_links(&self, id: ActivationId) -> impl Iterator<Item = &Link> {
        self.act(id)
            .inputs
            .iter()
            .map(move |&l| &self.links[l as usize])
    }

    /// Output links of an activation.
    pub fn output_links(&self, id: ActivationId) -> impl Iterator<Item = &Link> {
        self.act(id)
            .outputs
            .iter()
            .map(move |&l| &self.links[l as usize])
    }

    /// Activation of `neuron` over exactly `range`.
    #[must_use]
    pub fn find(&self, neuron: NeuronId, range: Range) -> Option<ActivationId> {
        self.by_neuron.get(&neuron)?.get(&range).copied()
    }

    /// Activations whose bounded range begins in `[from, to)`, ordered by
    /// begin, neuron and id.
    pub fn by_range_begin(&self, from: u32, to: u32) -> impl Iterator<Item = ActivationId> + '_ {
        Self::query(&self.by_begin, from, to)
    }

    /// Activations whose bounded range ends in `[from, to)`, ordered by end,
    /// neuron and id.
    pub fn by_range_end(&self, from: u32, to: u32) -> impl Iterator<Item = ActivationId> + '_ {
        Self::query(&self.by_end, from, to)
    }

    fn query(index: &BTreeSet<RangeKey>, from: u32, to: u32) -> impl Iterator<Item = ActivationId> + '_ {
        let lo = (i64::from(from), MIN_NEURON, MIN_ACTIVATION);
        let hi = (i64::from(to.max(from)), MIN_NEURON, MIN_ACTIVATION);
        index.range(lo..hi).map(|&(_, _, id)| id)
    }

    /// Activation ids ordered by range, neuron and id.
    #[must_use]
    pub fn sorted_by_range(&self) -> Vec<ActivationId> {
        let mut ids: Vec<ActivationId> = self.activations.iter().map(|a| a.id).collect();
        ids.sort_by_key(|&id| {
            let act = self.act(id);
            (act.range, act.neuron_id(), id)
        });
        ids
    }

    /// Register an activation of `neuron` over `range`, returning the
    /// existing one if already present.
    pub fn register(&mut self, neuron: NeuronId, range: Range) -> Result<(ActivationId, bool)> {
        if let Some(existing) = self.find(neuron, range) {
            return Ok((existing, false));
        }
        let handle = self.network.neuron(neuron)?;
        let id = ActivationId::new(self.activations.len() as u32);
        self.activations.push(Activation::new(id, handle, range));

        if let Some(begin) = range.begin {
            self.by_begin.insert((i64::from(begin), neuron, id));
        }
        if let Some(end) = range.end {
            self.by_end.insert((i64::from(end), neuron, id));
        }
        self.by_neuron.entry(neuron).or_default().insert(range, id);
        trace!(activation = %id, neuron = %neuron, range = %range, "registered activation");
        Ok((id, true))
    }

    /// Turn an activation into an input with a fixed value.
    pub(crate) fn set_input(&mut self, id: ActivationId, value: f64) -> Result<()> {
        self.activation(id)?;
        let generation = self.next_generation();
        let tolerance = self.tolerance;
        let act = self.act_mut(id);
        act.input_value = Some(value);
        act.input_decision = Some(Decision::Selected);
        act.decision = Decision::Selected;
        act.final_decision = Decision::Selected;
        act.upper_bound = value;
        act.rounds.clear();
        act.rounds.set(0, State::input(value), tolerance);
        act.final_rounds = act.rounds.clone();
        act.generation = generation;
        Ok(())
    }

    /// Fix the decision of an undecided activation.
    pub(crate) fn pin(&mut self, id: ActivationId, decision: Decision) -> Result<()> {
        self.activation(id)?;
        self.act_mut(id).input_decision = decision.is_decided().then_some(decision);
        Ok(())
    }

    /// Link `input` to `output` through `synapse`.
    ///
    /// Links fed into an inhibitory activation and links fed back from one
    /// derive the conflict relation: when `b` feeds inhibitor `i` and `i`
    /// feeds `a` through a negative recurrent synapse, `a` and `b` conflict.
    pub fn link(&mut self, synapse: SynapseId, input: ActivationId, output: ActivationId) -> Result<LinkId> {
        let input_neuron = self.activation(input)?.neuron_id();
        let output_neuron = self.activation(output)?.neuron_id();
        let syn = self.network.synapse(synapse)?;
        if syn.input != input_neuron || synapse.output != output_neuron {
            return Err(LucidError::SynapseMismatch {
                synapse,
                input: input_neuron,
                output: output_neuron,
            });
        }
        if let Some(existing) = self
            .input_links_ids(output)
            .find(|&l| self.links[l as usize].input == input && self.links[l as usize].synapse == synapse)
        {
            return Ok(existing);
        }

        let meta = syn.meta();
        let id = self.links.len() as LinkId;
        self.links.push(Link {
            synapse,
            input,
            output,
            meta,
            self_suppressing: false,
        });
        self.act_mut(input).outputs.push(id);
        self.act_mut(output).inputs.push(id);

        if meta.negative && meta.recurrent && self.act(input).kind == NeuronKind::Inhibitory {
            let sources: Vec<ActivationId> = self
                .input_links(input)
                .filter(|l| !l.meta.negative)
                .map(|l| l.input)
                .collect();
            for source in sources {
                if source == output {
                    self.links[id as usize].self_suppressing = true;
                } else {
                    self.add_conflict(output, source);
                }
            }
        }
        if !meta.negative && self.act(output).kind == NeuronKind::Inhibitory {
            let targets: Vec<(LinkId, ActivationId)> = self
                .act(output)
                .outputs
                .iter()
                .map(|&l| (l, &self.links[l as usize]))
                .filter(|(_, l)| l.meta.negative && l.meta.recurrent)
                .map(|(lid, l)| (lid, l.output))
                .collect();
            for (lid, target) in targets {
                if target == input {
                    self.links[lid as usize].self_suppressing = true;
                } else {
                    self.add_conflict(target, input);
                }
            }
        }
        trace!(link = id, input = %input, output = %output, "linked activations");
        Ok(id)
    }

    fn input_links_ids(&self, id: ActivationId) -> impl Iterator<Item = LinkId> + '_ {
        self.act(id).inputs.iter().copied()
    }

    fn add_conflict(&mut self, a: ActivationId, b: ActivationId) {
        self.act_mut(a).conflicts.insert(b);
        self.act_mut(b).conflicts.insert(a);
    }

    pub(crate) fn act(&self, id: ActivationId) -> &Activation {
        &self.activations[id.index()]
    }

    pub(crate) fn act_mut(&mut self, id: ActivationId) -> &mut Activation {
        &mut self.activations[id.index()]
    }

    pub(crate) fn activations_mut(&mut self) -> impl Iterator<Item = &mut Activation> {
        self.activations.iter_mut()
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Tolerance used to compare values.
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub(crate) fn set_decision(&mut self, id: ActivationId, decision: Decision) {
        self.act_mut(id).decision = decision;
    }

    pub(crate) fn set_upper_bound(&mut self, id: ActivationId, bound: f64) {
        self.act_mut(id).upper_bound = bound;
    }

    /// Store a round state, stamping a new generation if it changed.
    pub(crate) fn set_round(&mut self, id: ActivationId, round: u32, state: State) -> bool {
        let tolerance = self.tolerance;
        if !self.act(id).rounds.differs_at(round, &state, tolerance) {
            return false;
        }
        let generation = self.next_generation();
        let act = self.act_mut(id);
        act.rounds.set(round, state, tolerance);
        act.generation = generation;
        true
    }

    pub(crate) fn reset_rounds(&mut self, id: ActivationId) {
        let act = self.act_mut(id);
        act.rounds.clear();
        act.generation = 0;
    }

    pub(crate) fn apply(&mut self, id: ActivationId, state: &ActState) {
        let act = self.act_mut(id);
        act.decision = state.decision;
        act.rounds = state.rounds.clone();
        act.generation = state.generation;
    }

    pub(crate) fn observe(&self, id: ActivationId) -> Observed {
        self.act(id).observed()
    }

    pub(crate) fn commit_final(&mut self, id: ActivationId, decision: Decision, rounds: Rounds) {
        let act = self.act_mut(id);
        act.final_decision = decision;
        act.final_rounds = rounds;
    }

    /// Value of `input` as seen from `round`; `None` is the round before
    /// round 0.
    fn input_value(&self, input: ActivationId, round: Option<u32>) -> f64 {
        let Some(round) = round else {
            return 0.0;
        };
        let act = self.act(input);
        match act.decision {
            Decision::Selected => act.rounds.get(round).map_or(0.0, |s| s.value),
            Decision::Excluded | Decision::Unknown => 0.0,
        }
    }

    /// Compute the state of an activation at `round` from the states of its
    /// inputs under the current decisions.
    pub(crate) fn compute_state(&self, id: ActivationId, round: u32) -> State {
        let act = self.act(id);
        if let Some(value) = act.input_value {
            return State::input(value);
        }
        if act.decision != Decision::Selected {
            return State::ZERO;
        }

        let neuron = act.neuron.read();
        let mut net = neuron.params.bias;
        for link in act.inputs.iter().map(|&l| &self.links[l as usize]) {
            if link.self_suppressing {
                continue;
            }
            let Some(syn) = neuron.synapse(link.synapse.slot) else {
                continue;
            };
            let source_round = if link.meta.recurrent {
                round.checked_sub(1)
            } else {
                Some(round)
            };
            net += syn.weight * self.input_value(link.input, source_round);
        }

        let weight = match act.kind {
            NeuronKind::Excitatory => net,
            NeuronKind::Inhibitory => 0.0,
        };
        State {
            value: neuron.params.transfer.apply(net),
            net,
            weight,
        }
    }

    /// Optimistic value bound: negative synapses are ignored and every
    /// undecided input contributes its own bound.
    pub(crate) fn compute_upper_bound(&self, id: ActivationId) -> f64 {
        let act = self.act(id);
        if let Some(value) = act.input_value {
            return value;
        }
        if act.decision == Decision::Excluded {
            return 0.0;
        }

        let neuron = act.neuron.read();
        let mut net = neuron.params.bias;
        for link in act.inputs.iter().map(|&l| &self.links[l as usize]) {
            let Some(syn) = neuron.synapse(link.synapse.slot) else {
                continue;
            };
            if syn.weight <= 0.0 {
                continue;
            }
            let input = self.act(link.input);
            let bound = match input.decision {
                Decision::Excluded => 0.0,
                Decision::Selected | Decision::Unknown => input.upper_bound,
            };
            if bound > 0.0 {
                net += syn.weight * bound;
            }
        }
        neuron.params.transfer.apply(net)
    }

    /// Check whether the activation could still become active under the
    /// current decisions. Recurrent inhibition is ignored since it may still
    /// be lifted by later decisions.
    pub(crate) fn is_activatable(&self, id: ActivationId) -> bool {
        let act = self.act(id);
        if let Some(value) = act.input_value {
            return value > 0.0;
        }

        let neuron = act.neuron.read();
        let mut net = neuron.params.bias;
        for link in act.inputs.iter().map(|&l| &self.links[l as usize]) {
            if link.self_suppressing {
                continue;
            }
            let Some(syn) = neuron.synapse(link.synapse.slot) else {
                continue;
            };
            if link.meta.recurrent && syn.weight < 0.0 {
                continue;
            }
            let input = self.act(link.input);
            let value = match input.decision {
                Decision::Selected => input.rounds.last_state().value,
                Decision::Excluded => 0.0,
                Decision::Unknown => input.upper_bound.max(0.0),
            };
            if value > 0.0 {
                net += syn.weight * value;
            }
        }
        neuron.params.transfer.apply(net) > 0.0
    }

    /// Some conflict partner is not excluded.
    pub(crate) fn is_conflicting(&self, id: ActivationId) -> bool {
        self.act(id)
            .conflicts
            .iter()
            .any(|&c| self.act(c).decision != Decision::Excluded)
    }

    /// Some conflict partner is selected or pinned as selected.
    pub(crate) fn has_selected_conflict(&self, id: ActivationId) -> bool {
        self.act(id).conflicts.iter().any(|&c| {
            let other = self.act(c);
            other.decision == Decision::Selected || other.input_decision == Some(Decision::Selected)
        })
    }

    /// Excluding `id` would leave an excluded activation without any
    /// conflict partner that could still suppress it, or would leave `id`
    /// itself unsuppressed.
    pub(crate) fn generates_unsuppressed_excluded(&self, id: ActivationId) -> bool {
        let act = self.act(id);
        for &c in &act.conflicts {
            let other = self.act(c);
            if other.decision != Decision::Excluded {
                continue;
            }
            let suppressed = other
                .conflicts
                .iter()
                .any(|&cc| cc != id && self.act(cc).decision != Decision::Excluded);
            if !suppressed {
                return true;
            }
        }
        act.conflicts
            .iter()
            .all(|&c| self.act(c).decision == Decision::Excluded)
    }

    /// Drop all activations and links.
    pub(crate) fn clear(&mut self) {
        self.activations.clear();
        self.links.clear();
        self.by_begin.clear();
        self.by_end.clear();
        self.by_neuron.clear();
        self.generation = 0;
    }
}
