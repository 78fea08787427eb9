//! Search tree nodes.

use crate::activation::{Observed, StateChange};
use crate::candidate::DebugState;
use crate::ledger::Ledger;
use lucid_core::{ActivationId, Decision};
use std::fmt;
use std::rc::Rc;

/// Identifier of a node in the search arena. Ids grow monotonically in
/// creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Step of the per-node state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Init,
    PrepareSelect,
    Select,
    PostSelect,
    PrepareExclude,
    Exclude,
    PostExclude,
    Final,
}

/// One binary decision point.
#[derive(Debug)]
pub(crate) struct SearchNode {
    pub(crate) id: NodeId,
    /// Nearest ancestor whose candidate was selected on this path
    pub(crate) selected_parent: Option<NodeId>,
    /// Nearest ancestor whose candidate was excluded on this path
    pub(crate) excluded_parent: Option<NodeId>,
    pub(crate) level: usize,
    pub(crate) candidate: Option<usize>,
    pub(crate) weight_delta: f64,
    pub(crate) accumulated_weight: f64,
    pub(crate) changes: Rc<[StateChange]>,
    pub(crate) reads: Rc<[(ActivationId, Observed)]>,
    pub(crate) released: bool,
    pub(crate) debug_state: Option<DebugState>,

    // Scratch state of the current visit.
    pub(crate) step: Step,
    pub(crate) already_selected: bool,
    pub(crate) already_excluded: bool,
    pub(crate) select_blocked: bool,
    pub(crate) force_select: bool,
    pub(crate) explored_select: bool,
    pub(crate) explored_exclude: bool,
    pub(crate) selected_child: Option<NodeId>,
    pub(crate) excluded_child: Option<NodeId>,
    pub(crate) selected_weight: f64,
    pub(crate) excluded_weight: f64,
}

impl SearchNode {
    pub(crate) fn new(
        id: NodeId,
        selected_parent: Option<NodeId>,
        excluded_parent: Option<NodeId>,
        level: usize,
    ) -> Self {
        Self {
            id,
            selected_parent,
            excluded_parent,
            level,
            candidate: None,
            weight_delta: 0.0,
            accumulated_weight: 0.0,
            changes: Rc::from(Vec::new()),
            reads: Rc::from(Vec::new()),
            released: false,
            debug_state: None,
            step: Step::Init,
            already_selected: false,
            already_excluded: false,
            select_blocked: false,
            force_select: false,
            explored_select: false,
            explored_exclude: false,
            selected_child: None,
            excluded_child: None,
            selected_weight: f64::NEG_INFINITY,
            excluded_weight: f64::NEG_INFINITY,
        }
    }

    /// Decision that led from the logical parent to this node. The root
    /// counts as selected.
    pub(crate) fn decision(&self) -> Decision {
        match (self.selected_parent, self.excluded_parent) {
            (_, None) => Decision::Selected,
            (Some(s), Some(e)) if s > e => Decision::Selected,
            _ => Decision::Excluded,
        }
    }

    /// The node whose candidate decision created this one.
    pub(crate) fn parent(&self) -> Option<NodeId> {
        match self.decision() {
            Decision::Selected => self.selected_parent,
            _ => self.excluded_parent,
        }
    }

    /// Check whether every activation this node read is still in the state
    /// it read.
    pub(crate) fn is_reusable(&self, ledger: &Ledger) -> bool {
        !self.released
            && self
                .reads
                .iter()
                .all(|&(act, observed)| ledger.observe(act) == observed)
    }

    /// Drop the undo log of a node that can no longer be revisited.
    pub(crate) fn release(&mut self) {
        self.changes = Rc::from(Vec::new());
        self.reads = Rc::from(Vec::new());
        self.released = true;
    }

    /// Reset the scratch state before a visit.
    pub(crate) fn begin_visit(&mut self) {
        self.already_selected = false;
        self.already_excluded = false;
        self.select_blocked = false;
        self.force_select = false;
        self.explored_select = false;
        self.explored_exclude = false;
        self.selected_child = None;
        self.excluded_child = None;
        self.selected_weight = f64::NEG_INFINITY;
        self.excluded_weight = f64::NEG_INFINITY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_parent() {
        let root = SearchNode::new(NodeId::new(0), None, None, 0);
        assert_eq!(root.decision(), Decision::Selected);
        assert_eq!(root.parent(), None);

        // Selected child of the root.
        let s = SearchNode::new(NodeId::new(1), Some(NodeId::new(0)), None, 1);
        assert_eq!(s.decision(), Decision::Selected);
        assert_eq!(s.parent(), Some(NodeId::new(0)));

        // Excluded child of node 1.
        let e = SearchNode::new(NodeId::new(2), Some(NodeId::new(0)), Some(NodeId::new(1)), 2);
        assert_eq!(e.decision(), Decision::Excluded);
        assert_eq!(e.parent(), Some(NodeId::new(1)));

        // Selected child of node 2 keeps the excluded ancestor.
        let s2 = SearchNode::new(NodeId::new(3), Some(NodeId::new(2)), Some(NodeId::new(1)), 3);
        assert_eq!(s2.decision(), Decision::Selected);
        assert_eq!(s2.parent(), Some(NodeId::new(2)));
    }

    #[test]
    fn test_released_node_is_not_reusable() {
        let net = std::sync::Arc::new(lucid_core::Network::new());
        let ledger = Ledger::new(net, 1e-6);
        let mut node = SearchNode::new(NodeId::new(0), None, None, 0);
        assert!(node.is_reusable(&ledger));
        node.release();
        assert!(!node.is_reusable(&ledger));
    }
}
