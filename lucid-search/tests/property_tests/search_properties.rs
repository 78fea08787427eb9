//! Search properties on random conflict graphs
//!
//! Every graph is one input word read `n` ways. Reading `i` has net input
//! `weights[i]`; each conflict edge gets its own inhibitor fed by both
//! readings and feeding back into both, so the conflict relation is exactly
//! the edge set.

use lucid_search::{ActivationId, Decision, Document, Network, NeuronParams, Range, SearchConfig, Synapse};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Graph {
    weights: Vec<u32>,
    edges: Vec<(usize, usize)>,
}

impl Graph {
    fn new(weights: Vec<u32>, present: &[bool]) -> Self {
        let n = weights.len();
        let pairs = (0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j)));
        let edges = pairs
            .zip(present)
            .filter(|(_, p)| **p)
            .map(|(e, _)| e)
            .collect();
        Self { weights, edges }
    }

    /// Heaviest independent set by enumeration.
    fn brute_force(&self) -> f64 {
        let n = self.weights.len();
        (0u32..1 << n)
            .filter(|mask| {
                self.edges
                    .iter()
                    .all(|&(i, j)| mask & (1 << i) == 0 || mask & (1 << j) == 0)
            })
            .map(|mask| {
                (0..n)
                    .filter(|i| mask & (1 << i) != 0)
                    .map(|i| f64::from(self.weights[i]))
                    .sum::<f64>()
            })
            .fold(0.0, f64::max)
    }

    fn document(&self, config: SearchConfig) -> (Document, Vec<ActivationId>) {
        let net = Arc::new(Network::new());
        let word = net.create_neuron("W", NeuronParams::excitatory(0.0));
        let range = Range::new(0, 4).unwrap();

        let mut readings = Vec::new();
        for (i, &w) in self.weights.iter().enumerate() {
            let bias = f64::from(w) - 10.0;
            let n = net.create_neuron(format!("R{i}"), NeuronParams::excitatory(bias));
            let feed = net.add_synapse(n, Synapse::new(word, 10.0)).unwrap();
            readings.push((n, feed));
        }

        let mut doc = Document::with_config(Arc::clone(&net), config);
        let input = doc.add_input(word, range, 1.0).unwrap();
        let acts: Vec<ActivationId> = readings
            .iter()
            .map(|&(n, feed)| doc.derive_activation(n, &[(feed, input)]).unwrap())
            .collect();

        for &(i, j) in &self.edges {
            let inhib = net.create_neuron(format!("I{i}-{j}"), NeuronParams::inhibitory(0.0));
            let si = net.add_synapse(inhib, Synapse::new(readings[i].0, 1.0)).unwrap();
            let sj = net.add_synapse(inhib, Synapse::new(readings[j].0, 1.0)).unwrap();
            let bi = net
                .add_synapse(readings[i].0, Synapse::new(inhib, -100.0).recurrent())
                .unwrap();
            let bj = net
                .add_synapse(readings[j].0, Synapse::new(inhib, -100.0).recurrent())
                .unwrap();
            let ia = doc.derive_activation(inhib, &[(si, acts[i]), (sj, acts[j])]).unwrap();
            doc.add_link(bi, ia, acts[i]).unwrap();
            doc.add_link(bj, ia, acts[j]).unwrap();
        }
        (doc, acts)
    }

    fn check_exclusion(&self, doc: &Document, acts: &[ActivationId]) -> Result<(), TestCaseError> {
        for &(i, j) in &self.edges {
            let both = doc.activation(acts[i]).unwrap().is_final()
                && doc.activation(acts[j]).unwrap().is_final();
            prop_assert!(!both, "conflicting readings {} and {} both selected", i, j);
        }
        Ok(())
    }
}

fn graph_strategy() -> impl Strategy<Value = Graph> {
    (2usize..7).prop_flat_map(|n| {
        (
            prop::collection::vec(1u32..10, n),
            prop::collection::vec(any::<bool>(), n * (n - 1) / 2),
        )
            .prop_map(|(weights, present)| Graph::new(weights, &present))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn exhaustive_search_is_optimal(graph in graph_strategy()) {
        let (mut doc, acts) = graph.document(SearchConfig::exhaustive());
        doc.process(None).unwrap();

        graph.check_exclusion(&doc, &acts)?;
        prop_assert!((doc.selected_weight() - graph.brute_force()).abs() < 1e-9);
    }

    #[test]
    fn committed_weight_matches_final_states(graph in graph_strategy()) {
        let (mut doc, acts) = graph.document(SearchConfig::default());
        doc.process(None).unwrap();

        graph.check_exclusion(&doc, &acts)?;
        let sum: f64 = doc.activations().map(|a| a.final_state().weight).sum();
        prop_assert!((doc.selected_weight() - sum).abs() < 1e-9);
        prop_assert!(doc.selected_weight() <= graph.brute_force() + 1e-9);
    }

    #[test]
    fn memoization_does_not_change_results(graph in graph_strategy()) {
        let plain = SearchConfig::exhaustive();
        let cached = plain.clone().with_caching(true);
        let verified = plain.clone().with_verify_cache(true);

        let mut outcomes = Vec::new();
        for config in [plain, cached, verified] {
            let (mut doc, _) = graph.document(config);
            doc.process(None).unwrap();
            prop_assert_eq!(doc.stats().cache_mismatches, 0);
            let finals: Vec<Decision> = doc.activations().map(|a| a.final_decision()).collect();
            outcomes.push((finals, doc.selected_weight()));
        }
        prop_assert_eq!(&outcomes[0].0, &outcomes[1].0);
        prop_assert_eq!(&outcomes[0].0, &outcomes[2].0);
        prop_assert!((outcomes[0].1 - outcomes[1].1).abs() < 1e-9);
    }

    #[test]
    fn search_restores_tentative_state(graph in graph_strategy()) {
        let (mut doc, _) = graph.document(SearchConfig::default());
        doc.process(None).unwrap();

        for act in doc.activations().filter(|a| !a.is_input()) {
            prop_assert_eq!(act.decision(), Decision::Unknown);
            prop_assert!(act.rounds().is_empty());
        }
    }
}
