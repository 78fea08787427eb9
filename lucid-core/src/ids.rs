//! Identifier Types.
//!
//! Dense, copyable handles for neurons, synapses and activations. Every
//! handle is an index into the owning table, so lookups are O(1) and
//! relations between objects never form ownership cycles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a neuron in a [`crate::Network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NeuronId(u32);

impl NeuronId {
    /// Create from a raw table index.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index into the neuron table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NeuronId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identifier of a synapse.
///
/// Synapses are stored with their output neuron, so the handle names the
/// output neuron and the slot within its input list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SynapseId {
    /// Neuron this synapse feeds into
    pub output: NeuronId,
    /// Slot within the output neuron's input synapses
    pub slot: u32,
}

impl SynapseId {
    /// Create a synapse handle.
    #[must_use]
    pub const fn new(output: NeuronId, slot: u32) -> Self {
        Self { output, slot }
    }
}

impl fmt::Display for SynapseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.output, self.slot)
    }
}

/// Identifier of an activation inside one document.
///
/// Ids are assigned in creation order, which also serves as the stable
/// tie-break key wherever activations need a deterministic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActivationId(u32);

impl ActivationId {
    /// Create from a raw ledger index.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index into the activation ledger.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
