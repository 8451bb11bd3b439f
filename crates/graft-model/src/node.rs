//! Proxy tree nodes.
//!
//! A node is one of a closed set of kinds: the implicit root, a mirror of one
//! source element, or a synthetic node. Synthetic behavior (adoption,
//! duplicate detection, data) is a capability object behind the
//! [`SyntheticNode`] trait, owned by the node itself.

use std::any::Any;
use std::fmt;

use graft_types::{attrs, NodeId, SourceRef, Value};

use crate::source::SourceItem;

// ============================================================================
// SyntheticNode — pluggable rules for proxy-only nodes
// ============================================================================

/// Rules for a proxy-only node that can claim source elements.
///
/// Implementations must only ever adopt *source* elements; the model attaches
/// synthetic nodes directly under the root, which together make an adoption
/// cycle impossible.
pub trait SyntheticNode: fmt::Debug {
    /// Whether `other` represents the same logical synthetic node.
    ///
    /// Equal registrations are no-ops.
    fn equals(&self, other: &dyn SyntheticNode) -> bool;

    /// Whether this node claims `item` as its child, in place of the item's
    /// natural parent.
    fn adopts(&self, item: &SourceItem<'_>) -> bool;

    /// Whether this node stands for the same entity as `item`.
    ///
    /// A synthetic node that is a duplicate of a present source element is
    /// never shown alongside it.
    fn is_duplicate_of(&self, _item: &SourceItem<'_>) -> bool {
        false
    }

    /// Read an attribute.
    fn data(&self, attribute: &str) -> Option<Value>;

    /// Write an attribute. Returns `false` when the attribute is not writable.
    fn set_data(&mut self, _attribute: &str, _value: Value) -> bool {
        false
    }

    /// Whether this node carries a checkable state under [`attrs::CHECK_STATE`].
    fn is_checkable(&self) -> bool {
        false
    }

    /// Absorb the data of an equal node. Returns `true` if anything changed.
    fn update(&mut self, _other: &dyn SyntheticNode) -> bool {
        false
    }

    /// Label for snapshots and logs.
    fn label(&self) -> String {
        match self.data(attrs::DISPLAY) {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => format!("{self:?}"),
        }
    }

    /// Downcasting support for `equals` and `update`.
    fn as_any(&self) -> &dyn Any;
}

// ============================================================================
// Node
// ============================================================================

/// What a proxy node stands for.
#[derive(Debug)]
pub enum NodeKind {
    /// The implicit root. Exactly one per tree, never addressable externally.
    Root,
    /// One-to-one shadow of a source element.
    SourceMirror(SourceRef),
    /// Proxy-only node.
    Synthetic(Box<dyn SyntheticNode>),
}

impl NodeKind {
    /// Short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::SourceMirror(_) => "source_mirror",
            NodeKind::Synthetic(_) => "synthetic",
        }
    }
}

/// A node in the proxy arena.
///
/// Children are kept in display order. The parent link and the parent's
/// child list are only ever changed together, by [`NodeTree`](crate::NodeTree).
#[derive(Debug)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Parent node, `None` for the root and for detached nodes.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The mirrored source element, if this is a source mirror.
    pub fn source_ref(&self) -> Option<SourceRef> {
        match self.kind {
            NodeKind::SourceMirror(r) => Some(r),
            _ => None,
        }
    }

    /// The synthetic payload, if this is a synthetic node.
    pub fn synthetic(&self) -> Option<&dyn SyntheticNode> {
        match &self.kind {
            NodeKind::Synthetic(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub(crate) fn synthetic_mut(&mut self) -> Option<&mut (dyn SyntheticNode + 'static)> {
        match &mut self.kind {
            NodeKind::Synthetic(s) => Some(s.as_mut()),
            _ => None,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self.kind, NodeKind::Synthetic(_))
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, NodeKind::Root)
    }
}
