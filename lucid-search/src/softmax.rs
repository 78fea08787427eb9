//! Soft-max averaging over explored interpretations.
//!
//! Every terminal assignment reached during a search is a sample whose
//! accumulated weight acts as an unnormalized log-score. The average state
//! of an activation is the probability-weighted mean of its fixed-point
//! state across all samples; a sample in which the activation did not take
//! part contributes the zero state.

use crate::activation::State;
use crate::search::NodeId;
use lucid_core::ActivationId;
use rustc_hash::FxHashMap;

/// Terminal samples collected during one search.
#[derive(Debug, Default)]
pub(crate) struct SoftMaxCollector {
    weights: Vec<(NodeId, f64)>,
    states: FxHashMap<ActivationId, FxHashMap<NodeId, State>>,
}

impl SoftMaxCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record one terminal assignment.
    pub(crate) fn record(
        &mut self,
        terminal: NodeId,
        weight: f64,
        states: impl IntoIterator<Item = (ActivationId, State)>,
    ) {
        self.weights.push((terminal, weight));
        for (act, state) in states {
            self.states.entry(act).or_default().insert(terminal, state);
        }
    }

    /// Number of samples.
    pub(crate) fn len(&self) -> usize {
        self.weights.len()
    }

    /// Probability of each sample.
    fn probabilities(&self) -> Vec<(NodeId, f64)> {
        let max = self
            .weights
            .iter()
            .map(|&(_, w)| w)
            .fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            let uniform = 1.0 / self.weights.len().max(1) as f64;
            return self.weights.iter().map(|&(n, _)| (n, uniform)).collect();
        }
        let norm: f64 = self.weights.iter().map(|&(_, w)| (w - max).exp()).sum();
        self.weights
            .iter()
            .map(|&(n, w)| (n, (w - max).exp() / norm))
            .collect()
    }

    /// Probability-weighted average state per activation.
    pub(crate) fn average(&self) -> FxHashMap<ActivationId, State> {
        let probabilities = self.probabilities();
        self.states
            .iter()
            .map(|(&act, per_terminal)| {
                let mut avg = State::ZERO;
                for &(terminal, p) in &probabilities {
                    if let Some(s) = per_terminal.get(&terminal) {
                        avg.value += p * s.value;
                        avg.net += p * s.net;
                        avg.weight += p * s.weight;
                    }
                }
                (act, avg)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(v: f64) -> State {
        State {
            value: v,
            net: v,
            weight: v,
        }
    }

    #[test]
    fn test_weighted_average() {
        let a = ActivationId::new(0);
        let b = ActivationId::new(1);
        let mut softmax = SoftMaxCollector::new();
        softmax.record(NodeId::new(5), 0.0, [(a, value(1.0))]);
        softmax.record(NodeId::new(9), 3.0f64.ln(), [(a, value(0.0)), (b, value(2.0))]);
        assert_eq!(softmax.len(), 2);

        let avg = softmax.average();
        // p = 1/4 for the first sample and 3/4 for the second.
        assert!((avg[&a].value - 0.25).abs() < 1e-12);
        assert!((avg[&b].value - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_large_weights_stay_finite() {
        let a = ActivationId::new(0);
        let mut softmax = SoftMaxCollector::new();
        softmax.record(NodeId::new(1), 1000.0, [(a, value(1.0))]);
        softmax.record(NodeId::new(2), 1000.0, [(a, value(3.0))]);
        let avg = softmax.average();
        assert!((avg[&a].value - 2.0).abs() < 1e-12);
    }
}
