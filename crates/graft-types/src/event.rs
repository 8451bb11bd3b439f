//! Structural event vocabularies.
//!
//! [`SourceEvent`] is what a source collection reports about itself;
//! [`ProxyEvent`] is what the reparenting proxy reports to its observers. The
//! two share a vocabulary, differing only in addressing: source events name
//! parents by [`SourceRef`], proxy events by [`NodeId`]. `None` addresses the
//! top level (the implicit root).
//!
//! # Protocol
//!
//! Row insertions, removals and moves, as well as resets, arrive as begin/end
//! pairs. Pairs never nest. `DataChanged` is a single event and is only legal
//! outside a pair.

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::ids::{NodeId, SourceRef};

// ============================================================================
// SourceEvent
// ============================================================================

/// A structural change reported by the source collection.
///
/// Rows are inclusive ranges of sibling positions under `parent`. For moves,
/// `dst_row` is the destination position expressed in the destination parent's
/// row numbering *before* the move.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SourceEvent {
    RowsAboutToBeInserted {
        parent: Option<SourceRef>,
        first: usize,
        last: usize,
    },
    RowsInserted {
        parent: Option<SourceRef>,
        first: usize,
        last: usize,
    },
    RowsAboutToBeRemoved {
        parent: Option<SourceRef>,
        first: usize,
        last: usize,
    },
    RowsRemoved {
        parent: Option<SourceRef>,
        first: usize,
        last: usize,
    },
    RowsAboutToBeMoved {
        src_parent: Option<SourceRef>,
        first: usize,
        last: usize,
        dst_parent: Option<SourceRef>,
        dst_row: usize,
    },
    RowsMoved {
        src_parent: Option<SourceRef>,
        first: usize,
        last: usize,
        dst_parent: Option<SourceRef>,
        dst_row: usize,
    },
    DataChanged {
        parent: Option<SourceRef>,
        first: usize,
        last: usize,
    },
    AboutToBeReset,
    Reset,
}

impl SourceEvent {
    /// Snake-case event name, for logging.
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Whether this event opens a begin/end pair.
    pub fn is_begin(&self) -> bool {
        matches!(
            self,
            SourceEvent::RowsAboutToBeInserted { .. }
                | SourceEvent::RowsAboutToBeRemoved { .. }
                | SourceEvent::RowsAboutToBeMoved { .. }
                | SourceEvent::AboutToBeReset
        )
    }
}

// ============================================================================
// ProxyEvent
// ============================================================================

/// A structural change reported by the proxy to its observers.
///
/// Addresses are proxy nodes; `None` is the implicit root. Every begin event
/// is followed by its end event before any other begin event, and the node
/// count changes only by what the pair announces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ProxyEvent {
    RowsAboutToBeInserted {
        parent: Option<NodeId>,
        first: usize,
        last: usize,
    },
    RowsInserted {
        parent: Option<NodeId>,
        first: usize,
        last: usize,
    },
    RowsAboutToBeRemoved {
        parent: Option<NodeId>,
        first: usize,
        last: usize,
    },
    RowsRemoved {
        parent: Option<NodeId>,
        first: usize,
        last: usize,
    },
    RowsAboutToBeMoved {
        src_parent: Option<NodeId>,
        first: usize,
        last: usize,
        dst_parent: Option<NodeId>,
        dst_row: usize,
    },
    RowsMoved {
        src_parent: Option<NodeId>,
        first: usize,
        last: usize,
        dst_parent: Option<NodeId>,
        dst_row: usize,
    },
    DataChanged {
        parent: Option<NodeId>,
        first: usize,
        last: usize,
    },
    ModelAboutToBeReset,
    ModelReset,
}

impl ProxyEvent {
    /// Snake-case event name, for logging and filtering.
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Whether this event opens a begin/end pair.
    pub fn is_begin(&self) -> bool {
        matches!(
            self,
            ProxyEvent::RowsAboutToBeInserted { .. }
                | ProxyEvent::RowsAboutToBeRemoved { .. }
                | ProxyEvent::RowsAboutToBeMoved { .. }
                | ProxyEvent::ModelAboutToBeReset
        )
    }

    /// Whether this event closes a begin/end pair.
    pub fn is_end(&self) -> bool {
        matches!(
            self,
            ProxyEvent::RowsInserted { .. }
                | ProxyEvent::RowsRemoved { .. }
                | ProxyEvent::RowsMoved { .. }
                | ProxyEvent::ModelReset
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
