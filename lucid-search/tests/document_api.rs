//! Document-level API: dumps, statistics, soft-max and cache equivalence

use lucid_search::{
    ActivationId, Decision, Document, Network, NeuronId, NeuronParams, Range, Rounds,
    SearchConfig, Synapse, SynapseId,
};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Readings with net inputs 3, 5 and 2 of one word, mutually exclusive.
fn build_network() -> (Arc<Network>, Vec<NeuronId>) {
    let net = Arc::new(Network::new());
    let w = net.create_neuron("W", NeuronParams::excitatory(0.0));
    let a = net.create_neuron("A", NeuronParams::excitatory(-7.0));
    let b = net.create_neuron("B", NeuronParams::excitatory(-5.0));
    let c = net.create_neuron("C", NeuronParams::excitatory(-8.0));
    let i = net.create_neuron("INHIB", NeuronParams::inhibitory(0.0));
    for n in [a, b, c] {
        net.add_synapse(n, Synapse::new(w, 10.0)).unwrap();
        net.add_synapse(i, Synapse::new(n, 1.0)).unwrap();
        net.add_synapse(n, Synapse::new(i, -100.0).recurrent()).unwrap();
    }
    (net, vec![w, a, b, c, i])
}

/// Instantiate the network over one word. Returns the document and the
/// activations in the order W, A, B, C, INHIB.
fn build_document(net: &Arc<Network>, neurons: &[NeuronId], config: SearchConfig) -> (Document, Vec<ActivationId>) {
    let (w, i) = (neurons[0], neurons[4]);
    let mut doc = Document::with_config(Arc::clone(net), config);
    let range = Range::new(0, 4).unwrap();
    let word = doc.add_input(w, range, 1.0).unwrap();
    let mut acts = vec![word];
    for &n in &neurons[1..4] {
        acts.push(doc.add_activation(n, range).unwrap());
    }
    let inhib = doc.add_activation(i, range).unwrap();

    for (k, &n) in neurons[1..4].iter().enumerate() {
        let act = acts[k + 1];
        doc.add_link(SynapseId::new(n, 0), word, act).unwrap();
        doc.add_link(SynapseId::new(i, k as u32), act, inhib).unwrap();
        doc.add_link(SynapseId::new(n, 1), inhib, act).unwrap();
    }
    acts.push(inhib);
    (doc, acts)
}

fn final_decisions(doc: &Document) -> Vec<Decision> {
    doc.activations().map(|a| a.final_decision()).collect()
}

#[test]
fn test_activation_dump() {
    init_tracing();
    let (net, neurons) = build_network();
    let (mut doc, acts) = build_document(&net, &neurons, SearchConfig::default());
    doc.process(None).unwrap();

    let dump = doc.activations_to_string(false);
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], "0 (0,4) W S UB:1.000 [R0 V:1.000 N:1.000 W:0.000]");
    assert_eq!(
        lines[acts[2].index()],
        "2 (0,4) B S UB:1.000 [R0 V:1.000 N:5.000 W:5.000]"
    );
    assert!(lines[1].starts_with("1 (0,4) A E UB:0.995"));
    assert!(lines[5].starts_with(" Final SearchNode:"));
    assert!(lines[5].ends_with("WeightSum:5.000"));

    let finals = doc.activations_to_string(true);
    let labels: Vec<&str> = finals
        .lines()
        .filter_map(|l| l.split(' ').nth(2))
        .filter(|l| !l.starts_with("SearchNode"))
        .collect();
    assert_eq!(labels, vec!["W", "B", "INHIB"]);
}

#[test]
fn test_final_queries() {
    let (net, neurons) = build_network();
    let (mut doc, acts) = build_document(&net, &neurons, SearchConfig::default());
    doc.process(None).unwrap();

    assert_eq!(doc.final_activations(neurons[2]), vec![acts[2]]);
    assert!(doc.final_activations(neurons[1]).is_empty());
    let activated: Vec<NeuronId> = doc.finally_activated_neurons().iter().copied().collect();
    assert_eq!(activated, vec![neurons[0], neurons[2], neurons[4]]);
}

#[test]
fn test_cache_equivalence() {
    init_tracing();
    let (net, neurons) = build_network();
    let configs = [
        SearchConfig::default(),
        SearchConfig::default().with_caching(false),
        SearchConfig::default().with_verify_cache(true),
        SearchConfig::exhaustive(),
    ];

    let mut results = Vec::new();
    for config in configs {
        let (mut doc, _) = build_document(&net, &neurons, config);
        doc.process(None).unwrap();
        assert_eq!(doc.stats().cache_mismatches, 0);
        results.push((final_decisions(&doc), doc.selected_weight()));
    }
    for (decisions, weight) in &results[1..] {
        assert_eq!(decisions, &results[0].0);
        assert!((weight - results[0].1).abs() < 1e-9);
    }
}

#[test]
fn test_repeated_search_is_deterministic() {
    let (net, neurons) = build_network();
    let config = SearchConfig::default().with_caching(false);
    let runs: Vec<Vec<(Decision, Rounds)>> = (0..3)
        .map(|_| {
            let (mut doc, _) = build_document(&net, &neurons, config.clone());
            doc.process(None).unwrap();
            doc.activations()
                .map(|a| (a.final_decision(), a.final_rounds().clone()))
                .collect()
        })
        .collect();
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
}

#[test]
fn test_soft_max_average_states() {
    let (net, neurons) = build_network();
    let (mut doc, acts) = build_document(&net, &neurons, SearchConfig::default().with_soft_max(true));
    doc.process(None).unwrap();

    let avg = |id: ActivationId| doc.activation(id).unwrap().avg_state().unwrap();
    let norm = 2.0f64.exp() + 3.0f64.exp() + 5.0f64.exp();
    assert!((avg(acts[1]).weight - 3.0 * 3.0f64.exp() / norm).abs() < 1e-9);
    assert!((avg(acts[2]).weight - 5.0 * 5.0f64.exp() / norm).abs() < 1e-9);
    assert!((avg(acts[3]).weight - 2.0 * 2.0f64.exp() / norm).abs() < 1e-9);
    assert!(doc.activation(acts[0]).unwrap().avg_state().is_none());
    assert!(doc.activations_to_string(false).contains("AVG:["));

    // Without soft-max no averages are kept.
    let (mut plain, acts) = build_document(&net, &neurons, SearchConfig::default());
    plain.process(None).unwrap();
    assert!(plain.activation(acts[2]).unwrap().avg_state().is_none());
}

#[test]
fn test_statistics() {
    init_tracing();
    let (net, neurons) = build_network();
    let (mut doc, acts) = build_document(&net, &neurons, SearchConfig::default());
    doc.process(None).unwrap();
    doc.dump_candidate_statistics();

    let stats = doc.stats().clone();
    assert_eq!(stats.searches, 1);
    assert_eq!(stats.terminals, 3);
    assert!(stats.nodes_created > stats.terminals);
    assert!(stats.value_updates > 0);

    let order: Vec<ActivationId> = doc.candidates().iter().map(|c| c.activation()).collect();
    assert_eq!(order, vec![acts[1], acts[2], acts[3], acts[4]]);
    let first = doc.candidates()[0].stats();
    assert_eq!(first.selected, 1);
    assert_eq!(first.excluded, 1);
    assert_eq!(doc.candidates()[1].cached_decision(), Decision::Selected);

    let json = serde_json::to_string(&stats).unwrap();
    assert!(json.contains("\"terminals\":3"));
    let candidate_json = serde_json::to_string(first).unwrap();
    assert!(candidate_json.contains("\"selected\":1"));

    doc.reset_stats();
    assert_eq!(doc.stats().searches, 0);
    assert!(stats.to_string().contains("terminals:"));
}

#[test]
fn test_concurrent_documents_share_network() {
    init_tracing();
    let (net, neurons) = build_network();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let net = Arc::clone(&net);
                let neurons = neurons.clone();
                scope.spawn(move || {
                    let (mut doc, acts) = build_document(&net, &neurons, SearchConfig::default());
                    doc.process(None).unwrap();
                    doc.activation(acts[2]).unwrap().is_final()
                })
            })
            .collect();

        // A writer updating a bias to its current value while documents read.
        let writer = scope.spawn(|| {
            for _ in 0..100 {
                net.set_bias(neurons[3], -8.0).unwrap();
            }
        });

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        writer.join().unwrap();
    });
}

#[test]
fn test_documents_can_move_between_threads() {
    let (net, neurons) = build_network();
    let (doc, acts) = build_document(&net, &neurons, SearchConfig::default());
    let doc = std::thread::spawn(move || {
        let mut doc = doc;
        doc.process(None).unwrap();
        doc
    })
    .join()
    .unwrap();
    assert!(doc.activation(acts[2]).unwrap().is_final());
}
