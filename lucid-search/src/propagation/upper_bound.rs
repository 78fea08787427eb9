//! Upper-bound propagation.
//!
//! FIFO queue of activations whose optimistic bound must be recomputed. A
//! bound that moves re-enqueues the outputs reachable through non-recurrent
//! links only; feedback links never re-enqueue, so the queue drains on any
//! graph whose non-recurrent part is acyclic.

use crate::ledger::Ledger;
use crate::stats::SearchStats;
use lucid_core::ActivationId;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Queue of pending bound recomputations.
#[derive(Debug, Default)]
pub struct UpperBoundQueue {
    queue: VecDeque<ActivationId>,
    queued: FxHashSet<ActivationId>,
}

impl UpperBoundQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending activations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Enqueue an activation. Inputs keep their fixed bound.
    pub fn add(&mut self, ledger: &Ledger, act: ActivationId) {
        if ledger.get(act).is_none_or(|a| a.is_input()) {
            return;
        }
        if self.queued.insert(act) {
            self.queue.push_back(act);
        }
    }

    /// Enqueue the non-recurrent dependents of `act`.
    pub fn add_outputs(&mut self, ledger: &Ledger, act: ActivationId) {
        let outputs: Vec<ActivationId> = ledger
            .output_links(act)
            .filter(|l| !l.meta.recurrent)
            .map(|l| l.output)
            .collect();
        for output in outputs {
            self.add(ledger, output);
        }
    }

    /// Recompute bounds until the queue is empty. Returns the number of
    /// bounds that changed.
    pub fn process(&mut self, ledger: &mut Ledger, stats: &mut SearchStats) -> usize {
        let tolerance = ledger.tolerance();
        let mut updates = 0;
        while let Some(act) = self.queue.pop_front() {
            self.queued.remove(&act);
            let old = ledger.act(act).upper_bound;
            let bound = ledger.compute_upper_bound(act);
            let moved = if old.is_infinite() || bound.is_infinite() {
                old != bound
            } else {
                (bound - old).abs() > tolerance
            };
            if moved {
                ledger.set_upper_bound(act, bound);
                updates += 1;
                self.add_outputs(ledger, act);
            }
        }
        stats.bound_updates += updates as u64;
        updates
    }

    /// Drop pending work.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.queued.clear();
    }
}
