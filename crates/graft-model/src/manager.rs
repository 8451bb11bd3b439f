//! Node manager hook.
//!
//! A [`NodeManager`] watches source elements come, change and go, and decides
//! which synthetic nodes should exist because of them. It never mutates the
//! proxy directly: it files requests on a [`NodeRequests`] handle, which the
//! model applies once the hook has returned.
//!
//! | Request    | Applied                                        |
//! |------------|------------------------------------------------|
//! | `register` | Deferred to the next turn (coalesced rebuild)  |
//! | `update`   | Immediately, emits `DataChanged`               |
//! | `remove`   | Immediately, adoptees are rehomed first        |

use graft_types::NodeId;

use crate::node::SyntheticNode;
use crate::source::SourceItem;
use crate::tree::NodeTree;

/// Domain hook deciding which synthetic nodes exist. Every method defaults to
/// doing nothing.
pub trait NodeManager {
    /// `item` (or an ancestor of it) was inserted and is now mirrored.
    fn check_insert(&mut self, _item: &SourceItem<'_>, _nodes: &mut NodeRequests<'_>) {}

    /// `item`'s data changed; its placement is already up to date.
    fn check_update(&mut self, _item: &SourceItem<'_>, _nodes: &mut NodeRequests<'_>) {}

    /// `item` is being removed. Its mirror is already gone but its data is
    /// still readable.
    fn check_removal(&mut self, _item: &SourceItem<'_>, _nodes: &mut NodeRequests<'_>) {}
}

/// Manager that never asks for anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNodeManager;

impl NodeManager for NoopNodeManager {}

/// A change a manager wants made to the synthetic node set.
#[derive(Debug)]
pub enum NodeRequest {
    Register(Box<dyn SyntheticNode>),
    Update(Box<dyn SyntheticNode>),
    Remove(Box<dyn SyntheticNode>),
}

/// Read access to the attached synthetic nodes plus a request sink.
pub struct NodeRequests<'a> {
    tree: &'a NodeTree,
    synthetic: &'a [NodeId],
    requests: Vec<NodeRequest>,
}

impl<'a> NodeRequests<'a> {
    pub(crate) fn new(tree: &'a NodeTree, synthetic: &'a [NodeId]) -> Self {
        Self {
            tree,
            synthetic,
            requests: Vec::new(),
        }
    }

    /// Attached synthetic nodes in registration order.
    pub fn synthetic_nodes(&self) -> impl Iterator<Item = &'a dyn SyntheticNode> + '_ {
        let tree = self.tree;
        self.synthetic.iter().filter_map(move |id| tree.get(*id).and_then(|n| n.synthetic()))
    }

    /// How many mirrors the attached node equal to `node` has adopted.
    /// Zero if no equal node is attached.
    pub fn adoptee_count(&self, node: &dyn SyntheticNode) -> usize {
        self.synthetic
            .iter()
            .find(|id| {
                self.tree
                    .get(**id)
                    .and_then(|n| n.synthetic())
                    .is_some_and(|s| s.equals(node))
            })
            .map(|id| self.tree.children_of(*id).len())
            .unwrap_or(0)
    }

    pub fn register(&mut self, node: Box<dyn SyntheticNode>) {
        self.requests.push(NodeRequest::Register(node));
    }

    pub fn update(&mut self, node: Box<dyn SyntheticNode>) {
        self.requests.push(NodeRequest::Update(node));
    }

    pub fn remove(&mut self, node: Box<dyn SyntheticNode>) {
        self.requests.push(NodeRequest::Remove(node));
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub(crate) fn into_requests(self) -> Vec<NodeRequest> {
        self.requests
    }
}
