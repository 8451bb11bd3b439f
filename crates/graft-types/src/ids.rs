//! Typed identifiers for proxy nodes, source elements, and stable handles.
//!
//! All three are small `Copy` values. They're opaque to callers and display in
//! a compact form (`N3v1`, `S7`, `H2`) for logging.
//!
//! `NodeId` carries a generation next to the arena slot index: when a slot is
//! reclaimed its generation is bumped, so an id held past its node's lifetime
//! never resolves to whichever node reuses the slot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A proxy node identifier (arena slot + generation).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Build an id from its raw parts. Only the arena should mint these.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index.
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued.
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}v{}", self.index, self.generation)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

/// An element of the source collection.
///
/// Issued by the source; stable for as long as the element exists. The proxy
/// never owns what it points at; it only compares refs and asks the source
/// about them.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(u64);

impl SourceRef {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceRef({})", self.0)
    }
}

/// Identity of a caller-held stable handle.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(u64);

impl HandleId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H{}", self.0)
    }
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandleId({})", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display_includes_generation() {
        let id = NodeId::new(3, 1);
        assert_eq!(id.to_string(), "N3v1");
        assert_eq!(format!("{id:?}"), "NodeId(N3v1)");
    }

    #[test]
    fn test_node_id_generation_distinguishes_reused_slot() {
        let old = NodeId::new(4, 0);
        let reused = NodeId::new(4, 1);
        assert_ne!(old, reused);
        assert_eq!(old.index(), reused.index());
    }

    #[test]
    fn test_source_ref_serializes_transparently() {
        let r = SourceRef::new(42);
        assert_eq!(serde_json::to_string(&r).unwrap(), "42");
        let back: SourceRef = serde_json::from_str("42").unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_handle_id_display() {
        assert_eq!(HandleId::new(2).to_string(), "H2");
    }
}
