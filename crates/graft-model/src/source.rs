//! Source collection contract.
//!
//! The source is a black box that exposes parent/children navigation and
//! per-attribute reads, and reports its own structural changes to a
//! [`SourceListener`]. The listener is called synchronously at each protocol
//! moment with the source itself as `&dyn SourceCollection`:
//!
//! ```text
//! source.remove(item, &mut proxy)
//!     │
//!     ├─ proxy.source_event(&source, RowsAboutToBeRemoved)   ← old state visible
//!     ├─ (source mutates)
//!     └─ proxy.source_event(&source, RowsRemoved)            ← new state visible
//! ```

use graft_types::{SourceEvent, SourceRef, Value, MAX_TREE_DEPTH};

use crate::Result;

/// Read access to the proxied hierarchical collection.
pub trait SourceCollection {
    /// Ordered children of `parent`; `None` lists the top level.
    fn children(&self, parent: Option<SourceRef>) -> Vec<SourceRef>;

    /// Parent of `item`; `None` for top-level elements (and unknown ones).
    fn parent(&self, item: SourceRef) -> Option<SourceRef>;

    /// Whether `item` currently exists.
    fn contains(&self, item: SourceRef) -> bool;

    /// Read an attribute of `item`.
    fn data(&self, item: SourceRef, attribute: &str) -> Option<Value>;

    /// Position of `item` among its siblings.
    fn row_of(&self, item: SourceRef) -> Option<usize> {
        if !self.contains(item) {
            return None;
        }
        self.children(self.parent(item)).iter().position(|c| *c == item)
    }
}

/// Receiver of a source collection's structural events.
pub trait SourceListener {
    /// Handle one event. Errors propagate out of the source's mutating call.
    fn source_event(&mut self, source: &dyn SourceCollection, event: &SourceEvent) -> Result<()>;
}

/// No-op listener, for populating a source before anything observes it.
impl SourceListener for () {
    fn source_event(&mut self, _source: &dyn SourceCollection, _event: &SourceEvent) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// SourceItem — borrowed view of one element
// ============================================================================

/// One source element together with the collection it lives in.
///
/// Handed to adoption and duplicate rules and to node-manager hooks, so they
/// can inspect attributes without holding on to the source.
#[derive(Clone, Copy)]
pub struct SourceItem<'a> {
    source: &'a dyn SourceCollection,
    item: SourceRef,
}

impl<'a> SourceItem<'a> {
    pub fn new(source: &'a dyn SourceCollection, item: SourceRef) -> Self {
        Self { source, item }
    }

    pub fn source_ref(&self) -> SourceRef {
        self.item
    }

    pub fn data(&self, attribute: &str) -> Option<Value> {
        self.source.data(self.item, attribute)
    }

    pub fn parent(&self) -> Option<SourceRef> {
        self.source.parent(self.item)
    }

    pub fn collection(&self) -> &'a dyn SourceCollection {
        self.source
    }
}

impl std::fmt::Debug for SourceItem<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SourceItem").field(&self.item).finish()
    }
}

// ============================================================================
// Walks
// ============================================================================

/// Row path of `item` from the top level (`[row_in_top, row_in_child, ...]`).
///
/// Comparing paths lexicographically orders elements in source preorder.
/// Circuit-breaks at `MAX_TREE_DEPTH`.
pub fn source_path(source: &dyn SourceCollection, item: SourceRef) -> Vec<usize> {
    let mut path = Vec::new();
    let mut current = Some(item);

    while let Some(id) = current {
        if path.len() >= MAX_TREE_DEPTH {
            tracing::warn!("source_path() hit MAX_TREE_DEPTH ({MAX_TREE_DEPTH}), truncating");
            break;
        }
        let parent = source.parent(id);
        let row = source.children(parent).iter().position(|c| *c == id).unwrap_or(usize::MAX);
        path.push(row);
        current = parent;
    }

    path.reverse();
    path
}

/// All descendants of `item` in preorder, excluding `item` itself.
///
/// Circuit-breaks at `MAX_TREE_DEPTH` levels.
pub fn source_descendants(source: &dyn SourceCollection, item: SourceRef) -> Vec<SourceRef> {
    let mut result = Vec::new();
    let mut stack: Vec<(usize, SourceRef)> =
        source.children(Some(item)).into_iter().rev().map(|c| (1, c)).collect();

    while let Some((depth, id)) = stack.pop() {
        if depth > MAX_TREE_DEPTH {
            tracing::warn!("source_descendants() hit MAX_TREE_DEPTH ({MAX_TREE_DEPTH}), skipping subtree");
            continue;
        }
        result.push(id);
        for child in source.children(Some(id)).into_iter().rev() {
            stack.push((depth + 1, child));
        }
    }

    result
}

/// Every element of the collection in preorder.
pub fn source_walk(source: &dyn SourceCollection) -> Vec<SourceRef> {
    let mut result = Vec::new();
    for top in source.children(None) {
        result.push(top);
        result.extend(source_descendants(source, top));
    }
    result
}

// ============================================================================
// Tests
// ============================================================================
