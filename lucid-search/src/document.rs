//! Document: the entry point for interpretation search.
//!
//! A document owns the activations produced for one input text, the two
//! propagation queues and the outcome of the last search. Activations are
//! registered by the caller (usually a pattern matcher walking the network);
//! [`Document::process`] then chooses the heaviest conflict-free
//! interpretation and commits it onto the final decisions of every
//! activation.
//!
//! # Examples
//!
//! ```rust
//! use lucid_core::{Network, NeuronParams, Range, Synapse};
//! use lucid_search::Document;
//! use std::sync::Arc;
//!
//! let net = Arc::new(Network::new());
//! let word = net.create_neuron("W", NeuronParams::excitatory(0.0));
//! let noun = net.create_neuron("NOUN", NeuronParams::excitatory(-5.0));
//! let syn = net.add_synapse(noun, Synapse::new(word, 10.0)).unwrap();
//!
//! let mut doc = Document::new(net);
//! let range = Range::new(0, 4).unwrap();
//! let w = doc.add_input(word, range, 1.0).unwrap();
//! let n = doc.add_activation(noun, range).unwrap();
//! doc.add_link(syn, w, n).unwrap();
//!
//! doc.process(None).unwrap();
//! assert!(doc.activation(n).unwrap().is_final());
//! assert!((doc.selected_weight() - 5.0).abs() < 1e-9);
//! ```

use crate::activation::Activation;
use crate::candidate::{generate_candidates, invalidate_cached_decision, Candidate};
use crate::ledger::Ledger;
use crate::propagation::{UpperBoundQueue, ValueQueue};
use crate::search::{NodeId, Search, SearchOutcome, SkipSelectPolicy};
use crate::stats::SearchStats;
use lucid_core::{
    ActivationId, Decision, Network, NeuronId, Range, Result, SearchConfig, SynapseId,
};
use rustc_hash::FxHashMap;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Activations of one input text and the interpretation chosen for them.
///
/// A document may be moved to another thread but never shared between
/// threads; the network it reads from may be shared freely.
pub struct Document {
    config: SearchConfig,
    ledger: Ledger,
    ub_queue: UpperBoundQueue,
    value_queue: ValueQueue,
    candidates: Vec<Candidate>,
    policy: Option<Box<dyn SkipSelectPolicy>>,
    stats: SearchStats,
    selected_weight: f64,
    best_node: Option<NodeId>,
    finally_activated: BTreeSet<NeuronId>,
    /// Final decisions of the last search, restored as cached decisions
    prior_decisions: FxHashMap<ActivationId, Decision>,
    /// Activations with smaller ids took part in the last search
    processed_upto: usize,
    _not_sync: PhantomData<Cell<()>>,
}

impl Document {
    /// Create an empty document over `network` with the default
    /// configuration.
    #[must_use]
    pub fn new(network: Arc<Network>) -> Self {
        Self::with_config(network, SearchConfig::default())
    }

    /// Create an empty document with a custom configuration.
    #[must_use]
    pub fn with_config(network: Arc<Network>, config: SearchConfig) -> Self {
        Self {
            ledger: Ledger::new(network, config.tolerance),
            config,
            ub_queue: UpperBoundQueue::new(),
            value_queue: ValueQueue::new(),
            candidates: Vec::new(),
            policy: None,
            stats: SearchStats::default(),
            selected_weight: 0.0,
            best_node: None,
            finally_activated: BTreeSet::new(),
            prior_decisions: FxHashMap::default(),
            processed_upto: 0,
            _not_sync: PhantomData,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Network the document reads from.
    #[must_use]
    pub fn network(&self) -> &Arc<Network> {
        self.ledger.network()
    }

    /// Register an input activation with a fixed value.
    ///
    /// Turning an existing activation into an input forgets the decisions
    /// remembered from the last search.
    pub fn add_input(&mut self, neuron: NeuronId, range: Range, value: f64) -> Result<ActivationId> {
        let (id, created) = self.ledger.register(neuron, range)?;
        if !created {
            self.prior_decisions.clear();
        }
        self.ledger.set_input(id, value)?;
        self.ub_queue.add_outputs(&self.ledger, id);
        Ok(id)
    }

    /// Register an activation of `neuron` over `range`. Registering the same
    /// neuron and range twice returns the existing activation.
    pub fn add_activation(&mut self, neuron: NeuronId, range: Range) -> Result<ActivationId> {
        let (id, created) = self.ledger.register(neuron, range)?;
        if created {
            self.ub_queue.add(&self.ledger, id);
        }
        Ok(id)
    }

    /// Link `input` to `output` through `synapse`.
    ///
    /// A new link may change values and conflicts anywhere downstream, so
    /// the decisions remembered from the last search are forgotten.
    pub fn add_link(&mut self, synapse: SynapseId, input: ActivationId, output: ActivationId) -> Result<()> {
        let links = self.ledger.link_count();
        self.ledger.link(synapse, input, output)?;
        if self.ledger.link_count() > links {
            self.prior_decisions.clear();
        }
        self.ub_queue.add(&self.ledger, output);
        Ok(())
    }

    /// Register an activation of `neuron` fed by `inputs` and link them.
    ///
    /// The range is the union of the ranges of the inputs whose synapse maps
    /// its range onto the output; without any such input it is unbounded.
    pub fn derive_activation(
        &mut self,
        neuron: NeuronId,
        inputs: &[(SynapseId, ActivationId)],
    ) -> Result<ActivationId> {
        let mut range: Option<Range> = None;
        for &(synapse, input) in inputs {
            let syn = self.ledger.network().synapse(synapse)?;
            let input_range = self.ledger.activation(input)?.range();
            if syn.range_output {
                range = Some(range.map_or(input_range, |r| r.union(&input_range)));
            }
        }

        let id = self.add_activation(neuron, range.unwrap_or(Range::UNBOUNDED))?;
        for &(synapse, input) in inputs {
            self.add_link(synapse, input, id)?;
        }
        Ok(id)
    }

    /// Fix the decision of an activation for all following searches.
    /// `Decision::Unknown` lifts the pin.
    ///
    /// Decisions remembered from the last search for the activation and its
    /// conflict partners are forgotten.
    pub fn pin_decision(&mut self, id: ActivationId, decision: Decision) -> Result<()> {
        self.ledger.pin(id, decision)?;
        self.prior_decisions.remove(&id);
        for conflict in self.ledger.act(id).conflicts() {
            self.prior_decisions.remove(&conflict);
        }
        Ok(())
    }

    /// Install a hook that may veto select branches. Decisions remembered
    /// from the last search are forgotten.
    pub fn set_skip_select_policy(&mut self, policy: impl SkipSelectPolicy + 'static) {
        self.policy = Some(Box::new(policy));
        self.prior_decisions.clear();
    }

    /// Remove the skip-select hook.
    pub fn clear_skip_select_policy(&mut self) {
        self.policy = None;
        self.prior_decisions.clear();
    }

    /// Propagate upper bounds until stable. Returns the number of bounds
    /// that changed.
    pub fn propagate(&mut self) -> usize {
        self.ub_queue.process(&mut self.ledger, &mut self.stats)
    }

    /// Search for the heaviest interpretation and commit it.
    ///
    /// `timeout` bounds the search time; on [`LucidError::Timeout`] and on
    /// every other error nothing is committed and the final decisions of the
    /// previous call stay in place.
    ///
    /// [`LucidError::Timeout`]: lucid_core::LucidError::Timeout
    pub fn process(&mut self, timeout: Option<Duration>) -> Result<()> {
        let bound_updates = self.propagate();
        let mut candidates = generate_candidates(&mut self.ledger)?;
        debug!(
            activations = self.ledger.len(),
            candidates = candidates.len(),
            bound_updates,
            "starting search"
        );

        if self.config.optimize_search {
            for candidate in &mut candidates {
                if let Some(&decision) = self.prior_decisions.get(&candidate.activation) {
                    candidate.cached_decision = decision;
                }
            }
            for raw in self.processed_upto..self.ledger.len() {
                invalidate_cached_decision(&self.ledger, &mut candidates, ActivationId::new(raw as u32));
            }
        }

        let result = Search::new(
            &mut self.ledger,
            &mut self.value_queue,
            &mut candidates,
            &self.config,
            self.policy.as_deref(),
            &mut self.stats,
        )
        .run(timeout);
        self.stats.searches += 1;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.rollback(&candidates);
                self.candidates = candidates;
                if err.is_timeout() {
                    warn!(%err, "search aborted");
                }
                return Err(err);
            }
        };
        self.candidates = candidates;
        self.commit(outcome);
        Ok(())
    }

    /// Put every candidate back to undecided after an aborted search.
    fn rollback(&mut self, candidates: &[Candidate]) {
        for candidate in candidates {
            self.ledger.set_decision(candidate.activation, Decision::Unknown);
            self.ledger.reset_rounds(candidate.activation);
        }
        self.value_queue.clear();
    }

    fn commit(&mut self, outcome: SearchOutcome) {
        for act in self.ledger.activations_mut() {
            if act.input_value.is_none() {
                act.final_decision = Decision::Excluded;
                act.final_rounds.clear();
            }
            act.avg_state = None;
        }

        self.prior_decisions.clear();
        self.best_node = None;
        self.selected_weight = outcome.weight;
        if let Some(best) = outcome.best {
            for (act, decision, rounds) in best.snapshot {
                self.prior_decisions.insert(act, decision);
                self.ledger.commit_final(act, decision, rounds);
            }
            self.best_node = Some(best.node);
            self.selected_weight = best.weight;
        }
        if let Some(avg_states) = outcome.avg_states {
            for (id, state) in avg_states {
                self.ledger.act_mut(id).avg_state = Some(state);
            }
        }

        self.finally_activated = self
            .ledger
            .iter()
            .filter(|a| a.is_final())
            .map(Activation::neuron_id)
            .collect();
        self.processed_upto = self.ledger.len();
        debug!(
            nodes = outcome.nodes,
            weight = self.selected_weight,
            activated = self.finally_activated.len(),
            "search finished"
        );
    }

    /// Look up an activation.
    pub fn activation(&self, id: ActivationId) -> Result<&Activation> {
        self.ledger.activation(id)
    }

    /// All activations in id order.
    pub fn activations(&self) -> impl Iterator<Item = &Activation> {
        self.ledger.iter()
    }

    /// Activation registry.
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Finally selected activations of `neuron`.
    #[must_use]
    pub fn final_activations(&self, neuron: NeuronId) -> Vec<ActivationId> {
        self.ledger
            .iter()
            .filter(|a| a.neuron_id() == neuron && a.is_final())
            .map(Activation::id)
            .collect()
    }

    /// Neurons with at least one finally selected activation.
    #[must_use]
    pub fn finally_activated_neurons(&self) -> &BTreeSet<NeuronId> {
        &self.finally_activated
    }

    /// Weight of the committed interpretation.
    #[must_use]
    pub fn selected_weight(&self) -> f64 {
        self.selected_weight
    }

    /// Candidates of the last search in decision order.
    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Accumulated search statistics.
    #[must_use]
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Reset the search statistics.
    pub fn reset_stats(&mut self) {
        self.stats = SearchStats::default();
    }

    /// One line per activation, sorted by range, neuron and id, followed by
    /// the winning node and weight. Activations that can never fire are
    /// left out; with `final_only` only the committed interpretation is
    /// listed.
    #[must_use]
    pub fn activations_to_string(&self, final_only: bool) -> String {
        let mut out = String::new();
        for id in self.ledger.sorted_by_range() {
            let act = self.ledger.act(id);
            if !act.is_input() && act.upper_bound() <= 0.0 {
                continue;
            }
            if final_only && !act.is_final() {
                continue;
            }
            let _ = write!(
                out,
                "{} {} {} {} UB:{:.3} {}",
                act.id(),
                act.range(),
                act.label(),
                act.final_decision().symbol(),
                act.upper_bound(),
                act.final_rounds()
            );
            if let Some(avg) = act.avg_state() {
                let _ = write!(out, " AVG:[{}]", avg);
            }
            out.push('\n');
        }
        let node = self
            .best_node
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        let _ = writeln!(
            out,
            " Final SearchNode:{} WeightSum:{:.3}",
            node, self.selected_weight
        );
        out
    }

    /// Log the exploration counters of every candidate.
    pub fn dump_candidate_statistics(&self) {
        for candidate in &self.candidates {
            info!("{}", candidate);
        }
    }

    /// Drop every activation and all search results.
    pub fn clear_activations(&mut self) {
        self.ledger.clear();
        self.ub_queue.clear();
        self.value_queue.clear();
        self.candidates.clear();
        self.prior_decisions.clear();
        self.processed_upto = 0;
        self.finally_activated.clear();
        self.selected_weight = 0.0;
        self.best_node = None;
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("activations", &self.ledger.len())
            .field("candidates", &self.candidates.len())
            .field("selected_weight", &self.selected_weight)
            .finish_non_exhaustive()
    }
}
