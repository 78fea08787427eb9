//! Ledger registration and range index properties

use lucid_search::{ActivationId, Ledger, Network, NeuronId, NeuronParams, Range};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn ledger_with(spans: &[(usize, u32, u32)]) -> Ledger {
    let net = Arc::new(Network::new());
    let neurons: Vec<NeuronId> = (0..3)
        .map(|i| net.create_neuron(format!("N{i}"), NeuronParams::excitatory(0.0)))
        .collect();
    let mut ledger = Ledger::new(net, 1e-6);
    for &(n, begin, len) in spans {
        let range = Range::new(begin, begin + len).unwrap();
        ledger.register(neurons[n], range).unwrap();
    }
    ledger
}

fn span_strategy() -> impl Strategy<Value = Vec<(usize, u32, u32)>> {
    prop::collection::vec((0usize..3, 0u32..20, 0u32..5), 0..40)
}

proptest! {
    #[test]
    fn registration_dedupes(spans in span_strategy()) {
        let ledger = ledger_with(&spans);
        let distinct: BTreeSet<(usize, u32, u32)> = spans.iter().copied().collect();
        prop_assert_eq!(ledger.len(), distinct.len());

        for act in ledger.iter() {
            prop_assert_eq!(ledger.find(act.neuron_id(), act.range()), Some(act.id()));
        }
    }

    #[test]
    fn begin_index_matches_scan(spans in span_strategy(), from in 0u32..25, width in 0u32..25) {
        let ledger = ledger_with(&spans);
        let to = from + width;

        let indexed: Vec<ActivationId> = ledger.by_range_begin(from, to).collect();
        let mut scanned: Vec<(u32, NeuronId, ActivationId)> = ledger
            .iter()
            .filter_map(|a| a.range().begin.map(|b| (b, a.neuron_id(), a.id())))
            .filter(|&(b, _, _)| b >= from && b < to)
            .collect();
        scanned.sort();
        let scanned: Vec<ActivationId> = scanned.into_iter().map(|(_, _, id)| id).collect();
        prop_assert_eq!(indexed, scanned);
    }

    #[test]
    fn end_index_matches_scan(spans in span_strategy(), from in 0u32..25, width in 0u32..25) {
        let ledger = ledger_with(&spans);
        let to = from + width;

        let indexed: BTreeSet<ActivationId> = ledger.by_range_end(from, to).collect();
        let scanned: BTreeSet<ActivationId> = ledger
            .iter()
            .filter(|a| a.range().end.is_some_and(|e| e >= from && e < to))
            .map(|a| a.id())
            .collect();
        prop_assert_eq!(indexed, scanned);
    }

    #[test]
    fn sorted_order_is_total(spans in span_strategy()) {
        let ledger = ledger_with(&spans);
        let sorted = ledger.sorted_by_range();
        prop_assert_eq!(sorted.len(), ledger.len());
        for pair in sorted.windows(2) {
            let a = ledger.activation(pair[0]).unwrap();
            let b = ledger.activation(pair[1]).unwrap();
            prop_assert!((a.range(), a.neuron_id(), a.id()) < (b.range(), b.neuron_id(), b.id()));
        }
    }
}
