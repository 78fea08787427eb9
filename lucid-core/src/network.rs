//! Shared Weighted Network.
//!
//! Neurons and the synapses feeding them. A network is built once and then
//! shared through an `Arc` by any number of documents, each processed on its
//! own thread. Every neuron keeps its parameters and input synapses behind
//! its own reader/writer lock, so value computation during a search only
//! ever holds a read lock on a single neuron while training-style updates
//! take the write lock of the neuron they modify.

use crate::error::{LucidError, Result};
use crate::ids::{NeuronId, SynapseId};
use crate::transfer::TransferFunction;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// Role of a neuron in conflict derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NeuronKind {
    /// Contributes its net input as interpretation weight
    #[default]
    Excitatory,
    /// Suppresses competitors through negative recurrent synapses
    Inhibitory,
}

/// Parameters of a neuron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronParams {
    /// Bias added to the net input
    pub bias: f64,
    /// Excitatory or inhibitory
    pub kind: NeuronKind,
    /// Transfer function
    pub transfer: TransferFunction,
}

impl NeuronParams {
    /// Excitatory neuron with a rectified tanh transfer function.
    #[must_use]
    pub fn excitatory(bias: f64) -> Self {
        Self {
            bias,
            kind: NeuronKind::Excitatory,
            transfer: TransferFunction::RectifiedTanh,
        }
    }

    /// Inhibitory neuron with a rectified linear transfer function.
    #[must_use]
    pub fn inhibitory(bias: f64) -> Self {
        Self {
            bias,
            kind: NeuronKind::Inhibitory,
            transfer: TransferFunction::RectifiedLinear,
        }
    }

    /// Replace the transfer function
    #[must_use]
    pub fn with_transfer(mut self, transfer: TransferFunction) -> Self {
        self.transfer = transfer;
        self
    }
}

/// Weighted connection from an input neuron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synapse {
    /// Source neuron
    pub input: NeuronId,
    /// Connection weight
    pub weight: f64,
    /// Feeds back into the previous round instead of the current one
    pub recurrent: bool,
    /// The output's range covers the input's range
    pub range_output: bool,
}

impl Synapse {
    /// Non-recurrent synapse that propagates the input range.
    #[must_use]
    pub fn new(input: NeuronId, weight: f64) -> Self {
        Self {
            input,
            weight,
            recurrent: false,
            range_output: true,
        }
    }

    /// Mark as recurrent
    #[must_use]
    pub fn recurrent(mut self) -> Self {
        self.recurrent = true;
        self
    }

    /// Set whether the input range maps onto the output range
    #[must_use]
    pub fn with_range_output(mut self, range_output: bool) -> Self {
        self.range_output = range_output;
        self
    }

    /// Check whether the synapse inhibits its output.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.weight < 0.0
    }

    /// Structural flags of this synapse.
    #[must_use]
    pub fn meta(&self) -> SynapseMeta {
        SynapseMeta {
            recurrent: self.recurrent,
            negative: self.is_negative(),
            range_output: self.range_output,
        }
    }
}

/// Structural flags a document caches per link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SynapseMeta {
    /// Recurrent synapse
    pub recurrent: bool,
    /// Negative weight
    pub negative: bool,
    /// Range-output mapping
    pub range_output: bool,
}

/// Mutable part of a neuron, guarded by the neuron's lock.
#[derive(Debug, Clone)]
pub struct NeuronState {
    /// Current parameters
    pub params: NeuronParams,
    inputs: Vec<Synapse>,
}

impl NeuronState {
    /// Input synapse stored in `slot`.
    #[must_use]
    pub fn synapse(&self, slot: u32) -> Option<&Synapse> {
        self.inputs.get(slot as usize)
    }

    /// All input synapses in slot order.
    #[must_use]
    pub fn inputs(&self) -> &[Synapse] {
        &self.inputs
    }
}

/// A neuron of the shared network.
#[derive(Debug)]
pub struct Neuron {
    id: NeuronId,
    label: String,
    state: RwLock<NeuronState>,
}

impl Neuron {
    /// Identifier
    #[must_use]
    pub fn id(&self) -> NeuronId {
        self.id
    }

    /// Human-readable label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Acquire the read lock.
    pub fn read(&self) -> RwLockReadGuard<'_, NeuronState> {
        self.state.read()
    }

    /// Acquire the write lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, NeuronState> {
        self.state.write()
    }

    /// Snapshot of the current parameters.
    #[must_use]
    pub fn params(&self) -> NeuronParams {
        self.state.read().params.clone()
    }
}

/// Network of neurons shared between documents.
#[derive(Debug, Default)]
pub struct Network {
    neurons: RwLock<Vec<Arc<Neuron>>>,
}

impl Network {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a neuron and return its id.
    pub fn create_neuron(&self, label: impl Into<String>, params: NeuronParams) -> NeuronId {
        let mut neurons = self.neurons.write();
        let id = NeuronId::new(neurons.len() as u32);
        neurons.push(Arc::new(Neuron {
            id,
            label: label.into(),
            state: RwLock::new(NeuronState {
                params,
                inputs: Vec::new(),
            }),
        }));
        id
    }

    /// Look up a neuron.
    pub fn neuron(&self, id: NeuronId) -> Result<Arc<Neuron>> {
        self.neurons
            .read()
            .get(id.index())
            .cloned()
            .ok_or(LucidError::UnknownNeuron(id))
    }

    /// Number of neurons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.neurons.read().len()
    }

    /// Check whether the network has no neurons.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.neurons.read().is_empty()
    }

    /// Add an input synapse to `output`.
    pub fn add_synapse(&self, output: NeuronId, synapse: Synapse) -> Result<SynapseId> {
        // Validate the source before locking the target.
        self.neuron(synapse.input)?;
        let neuron = self.neuron(output)?;
        let mut state = neuron.write();
        let slot = state.inputs.len() as u32;
        trace!(
            input = %synapse.input,
            output = %output,
            weight = synapse.weight,
            recurrent = synapse.recurrent,
            "adding synapse"
        );
        state.inputs.push(synapse);
        Ok(SynapseId::new(output, slot))
    }

    /// Copy of a synapse.
    pub fn synapse(&self, id: SynapseId) -> Result<Synapse> {
        let neuron = self.neuron(id.output)?;
        let state = neuron.read();
        state
            .synapse(id.slot)
            .cloned()
            .ok_or(LucidError::UnknownSynapse(id))
    }

    /// Update a neuron's bias.
    pub fn set_bias(&self, id: NeuronId, bias: f64) -> Result<()> {
        let neuron = self.neuron(id)?;
        neuron.write().params.bias = bias;
        Ok(())
    }

    /// Update a synapse weight.
    pub fn set_weight(&self, id: SynapseId, weight: f64) -> Result<()> {
        let neuron = self.neuron(id.output)?;
        let mut state = neuron.write();
        let synapse = state
            .inputs
            .get_mut(id.slot as usize)
            .ok_or(LucidError::UnknownSynapse(id))?;
        synapse.weight = weight;
        Ok(())
    }
}
