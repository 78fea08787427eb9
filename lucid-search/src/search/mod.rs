//! Interpretation search.
//!
//! A binary search tree over the candidate order: every level decides one
//! candidate, selecting or excluding it. Branches are pruned by conflict
//! reasoning and by decisions cached from earlier visits, and the values
//! implied by each decision are evaluated incrementally through the round
//! value queue with an undo log per node.

mod node;
mod tree;

pub use node::NodeId;
pub(crate) use tree::{Search, SearchOutcome};

use crate::activation::Activation;

/// Hook that can veto the select branch of a candidate.
pub trait SkipSelectPolicy: Send {
    /// Return `true` to skip selecting `activation` on the current path.
    fn skip_select(&self, activation: &Activation) -> bool;
}

impl<F> SkipSelectPolicy for F
where
    F: Fn(&Activation) -> bool + Send,
{
    fn skip_select(&self, activation: &Activation) -> bool {
        self(activation)
    }
}
