//! Error types for the Lucid engine.

use crate::ids::{ActivationId, NeuronId, SynapseId};
use std::time::Duration;
use thiserror::Error;

/// Result type alias used across the workspace.
pub type Result<T> = std::result::Result<T, LucidError>;

/// Errors raised while building a document or searching an interpretation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LucidError {
    /// The non-recurrent dependencies between candidates contain a cycle
    #[error("cycle detected in activations that is not marked recurrent: {activations:?}")]
    DependencyCycle {
        /// Activations that could not be ordered
        activations: Vec<ActivationId>,
    },

    /// The search visited more nodes than allowed
    #[error("search step limit of {limit} exceeded")]
    SearchStepLimit {
        /// Configured ceiling
        limit: u64,
    },

    /// The caller's time budget ran out
    #[error("interpretation search timed out after {elapsed:?} (budget {budget:?})")]
    Timeout {
        /// Time spent before the search was aborted
        elapsed: Duration,
        /// Time budget passed to the search
        budget: Duration,
    },

    /// Activation id not registered in the document
    #[error("unknown activation {0}")]
    UnknownActivation(ActivationId),

    /// Neuron id not present in the network
    #[error("unknown neuron {0}")]
    UnknownNeuron(NeuronId),

    /// Synapse id not present in the network
    #[error("unknown synapse {0}")]
    UnknownSynapse(SynapseId),

    /// Synapse endpoints do not match the linked activations
    #[error("synapse {synapse} does not connect neuron {input} to neuron {output}")]
    SynapseMismatch {
        /// Synapse used for the link
        synapse: SynapseId,
        /// Neuron of the input activation
        input: NeuronId,
        /// Neuron of the output activation
        output: NeuronId,
    },

    /// Range end lies before its begin
    #[error("invalid range: end {end} is before begin {begin}")]
    InvalidRange {
        /// Begin offset
        begin: u32,
        /// End offset
        end: u32,
    },
}

impl LucidError {
    /// Check whether the error is the caller's timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, LucidError::Timeout { .. })
    }

    /// Check whether the error aborts processing for a reason other than the
    /// time budget.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LucidError::DependencyCycle { .. } | LucidError::SearchStepLimit { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let timeout = LucidError::Timeout {
            elapsed: Duration::from_millis(3),
            budget: Duration::ZERO,
        };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_fatal());

        let cycle = LucidError::DependencyCycle {
            activations: vec![ActivationId::new(1), ActivationId::new(2)],
        };
        assert!(cycle.is_fatal());
        assert!(cycle.to_string().contains("not marked recurrent"));
    }
}
