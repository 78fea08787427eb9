//! Lucid Search: interpretation search over neural activations
//!
//! Given the activations a network produced for one document, find the
//! interpretation of maximum total weight: a subset of activations to
//! select such that no two conflicting activations are both selected and the
//! values reached by recurrent propagation are consistent with the choice.
//!
//! # Components
//!
//! - **Ledger**: activations, links, derived conflicts, per-round values and
//!   generation stamps
//! - **Propagation**: an upper-bound queue filtering what can ever fire, and
//!   a round value queue computing exact per-round values
//! - **Candidates**: undecided activations in dependency order
//! - **Search**: iterative branch-and-bound over the candidates with
//!   conflict pruning, cached decisions and node memoization
//! - **Document**: the user-facing orchestrator
//!
//! # Examples
//!
//! ```rust
//! use lucid_core::{Network, NeuronParams, Range, Synapse};
//! use lucid_search::Document;
//! use std::sync::Arc;
//!
//! // Two readings of one word that inhibit each other.
//! let net = Arc::new(Network::new());
//! let word = net.create_neuron("W", NeuronParams::excitatory(0.0));
//! let a = net.create_neuron("A", NeuronParams::excitatory(-7.0));
//! let b = net.create_neuron("B", NeuronParams::excitatory(-5.0));
//! let inhib = net.create_neuron("INHIB", NeuronParams::inhibitory(0.0));
//! let wa = net.add_synapse(a, Synapse::new(word, 10.0)).unwrap();
//! let wb = net.add_synapse(b, Synapse::new(word, 10.0)).unwrap();
//! let ai = net.add_synapse(inhib, Synapse::new(a, 1.0)).unwrap();
//! let bi = net.add_synapse(inhib, Synapse::new(b, 1.0)).unwrap();
//! let ia = net.add_synapse(a, Synapse::new(inhib, -100.0).recurrent()).unwrap();
//! let ib = net.add_synapse(b, Synapse::new(inhib, -100.0).recurrent()).unwrap();
//!
//! let mut doc = Document::new(net);
//! let r = Range::new(0, 4).unwrap();
//! let w = doc.add_input(word, r, 1.0).unwrap();
//! let xa = doc.derive_activation(a, &[(wa, w)]).unwrap();
//! let xb = doc.derive_activation(b, &[(wb, w)]).unwrap();
//! let xi = doc.derive_activation(inhib, &[(ai, xa), (bi, xb)]).unwrap();
//! doc.add_link(ia, xi, xa).unwrap();
//! doc.add_link(ib, xi, xb).unwrap();
//!
//! doc.process(None).unwrap();
//! assert!(!doc.activation(xa).unwrap().is_final());
//! assert!(doc.activation(xb).unwrap().is_final());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod activation;
pub mod candidate;
pub mod document;
pub mod ledger;
pub mod propagation;
pub mod search;
mod softmax;
pub mod stats;

pub use activation::{Activation, Link, Rounds, State};
pub use candidate::{Candidate, CandidateStats, DebugState};
pub use document::Document;
pub use ledger::Ledger;
pub use propagation::{UpperBoundQueue, ValueQueue};
pub use search::{NodeId, SkipSelectPolicy};
pub use stats::SearchStats;

pub use lucid_core::{
    ActivationId, Decision, LucidError, Network, NeuronId, NeuronKind, NeuronParams, Range,
    Result, SearchConfig, Synapse, SynapseId, TransferFunction,
};
