//! Error types for proxy operations.

use thiserror::Error;

use graft_types::{HandleId, NodeId, SourceRef};

/// Errors that can occur while maintaining the proxy tree.
///
/// Structural-translation variants (`UnknownSource`, `DuplicateMirror`,
/// `RowsOutOfRange`, the event-pairing variants) mean the source and the proxy
/// have diverged. They are returned to whoever drove the source mutation and
/// must not be ignored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Node not found in the arena (never existed, or already destroyed).
    #[error("node not found: {0}")]
    UnknownNode(NodeId),

    /// Source element has no mirror in the proxy tree.
    #[error("source element not mirrored: {0}")]
    UnknownSource(SourceRef),

    /// Source element already has a mirror.
    #[error("source element already mirrored: {0}")]
    DuplicateMirror(SourceRef),

    /// `attach` on a node that still has a parent.
    #[error("node {0} is already attached")]
    AlreadyAttached(NodeId),

    /// `detach` on a node that has no parent.
    #[error("node {0} is not attached")]
    NotAttached(NodeId),

    /// `destroy` on a node that is still linked into the tree.
    #[error("node {0} must be detached before it is destroyed")]
    StillAttached(NodeId),

    /// The root is not addressable as a child.
    #[error("the root node cannot be moved or destroyed")]
    RootImmutable,

    /// Attaching would make a node its own ancestor.
    #[error("attaching {node} under {parent} would create a cycle")]
    CycleDetected { node: NodeId, parent: NodeId },

    /// Source move that would place an element inside its own subtree.
    #[error("cannot move {0} into its own subtree")]
    InvalidSourceMove(SourceRef),

    /// Child position past the end of the parent's children.
    #[error("position {pos} out of bounds for parent with {len} children")]
    PositionOutOfBounds { pos: usize, len: usize },

    /// Source event row range does not match the source's children.
    #[error("rows {first}..={last} out of range for parent with {len} children")]
    RowsOutOfRange { first: usize, last: usize, len: usize },

    /// A source end event arrived without its begin event.
    #[error("unpaired source event: expected {expected}, got {got}")]
    UnpairedSourceEvent { expected: &'static str, got: &'static str },

    /// A source event arrived while another begin/end pair was still open.
    #[error("source event {got} nested inside open {open} operation")]
    NestedSourceEvent { open: &'static str, got: &'static str },

    /// A mutating call that must not run inside a source begin/end pair.
    #[error("source {0} operation in progress")]
    SourceEditInProgress(&'static str),

    /// Handle target was removed, or the handle was released.
    #[error("stale handle: {0}")]
    StaleHandle(HandleId),

    /// Operation only applies to synthetic nodes.
    #[error("node {0} is not a synthetic node")]
    NotSynthetic(NodeId),

    /// Synthetic node does not support a checkable state.
    #[error("node {0} is not checkable")]
    NotCheckable(NodeId),

    /// Structural invariant broken (corrupt parent chain, cycle, missing child link).
    #[error("invariant violated at {node}: {reason}")]
    InvariantViolation { node: NodeId, reason: String },

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(String),
}
