//! Lucid Core: shared types for interpretation search
//!
//! This crate holds everything the search engine shares with the code that
//! builds and trains networks:
//! - **Identifiers**: dense handles for neurons, synapses and activations
//! - **Ranges**: half-open document spans with optional bounds
//! - **Decisions**: the selected / excluded / unknown state of an activation
//! - **Network**: neurons and synapses behind per-neuron reader/writer locks
//! - **Configuration** and the workspace-wide error type
//!
//! # Examples
//!
//! ```rust
//! use lucid_core::{Network, NeuronParams, Synapse};
//!
//! let net = Network::new();
//! let word = net.create_neuron("W", NeuronParams::excitatory(0.0));
//! let noun = net.create_neuron("NOUN", NeuronParams::excitatory(-5.0));
//! let syn = net.add_synapse(noun, Synapse::new(word, 10.0)).unwrap();
//! assert_eq!(net.synapse(syn).unwrap().weight, 10.0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod decision;
pub mod error;
pub mod ids;
pub mod network;
pub mod range;
pub mod transfer;

pub use config::SearchConfig;
pub use decision::Decision;
pub use error::{LucidError, Result};
pub use ids::{ActivationId, NeuronId, SynapseId};
pub use network::{Network, Neuron, NeuronKind, NeuronParams, NeuronState, Synapse, SynapseMeta};
pub use range::Range;
pub use transfer::TransferFunction;
