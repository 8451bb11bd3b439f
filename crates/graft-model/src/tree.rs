//! Node arena with parent/child links.
//!
//! `NodeTree` owns every proxy node and is the only code path that changes
//! parent/child links. Nodes live in generation-checked slots; a destroyed
//! node's slot is reused with a bumped generation so stale [`NodeId`]s never
//! resolve.
//!
//! # Invariants
//!
//! 1. Every attached node except the root has exactly one parent.
//! 2. Every attached node appears exactly once in its parent's child list.
//! 3. Following parent links from any attached node reaches the root in at
//!    most `max_depth` steps (no cycles).
//!
//! [`NodeTree::validate`] checks these for one node and its ancestors,
//! [`NodeTree::validate_all`] for the whole arena.

use graft_types::{NodeId, MAX_TREE_DEPTH};

use crate::node::{Node, NodeKind};
use crate::{ModelError, Result};

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena of proxy nodes rooted at a single implicit root.
#[derive(Debug)]
pub struct NodeTree {
    slots: Vec<Slot>,
    /// Indices of empty slots, reused LIFO.
    free: Vec<u32>,
    root: NodeId,
    /// Live nodes, excluding the root.
    len: usize,
    max_depth: usize,
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTree {
    pub fn new() -> Self {
        Self::with_max_depth(MAX_TREE_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        let root = NodeId::new(0, 0);
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(Node::new(NodeKind::Root)),
            }],
            free: Vec::new(),
            root,
            len: 0,
            max_depth,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, attached or not, excluding the root.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.node.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.get(id).ok_or(ModelError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.get_mut(id).ok_or(ModelError::UnknownNode(id))
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Children in display order. Empty for unknown nodes.
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Position of `id` among its parent's children.
    pub fn row_of(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent_of(id)?;
        self.children_of(parent).iter().position(|c| *c == id)
    }

    /// Whether `ancestor` is a proper ancestor of `id`.
    ///
    /// Circuit-breaks at `max_depth`.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.parent_of(id);
        let mut steps = 0;
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.max_depth {
                tracing::warn!("is_ancestor() hit max depth ({}), giving up", self.max_depth);
                return false;
            }
            current = self.parent_of(p);
        }
        false
    }

    /// All nodes below `id` in preorder, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.children_of(id).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            result.push(n);
            stack.extend(self.children_of(n).iter().rev().copied());
        }
        result
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Allocate a detached node.
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        self.len += 1;
        let node = Some(Node::new(kind));

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = node;
            return NodeId::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, node });
        NodeId::new(index, 0)
    }

    /// Free a detached node and its whole subtree.
    ///
    /// Returns the destroyed ids with their kinds (so callers can reclaim
    /// synthetic payloads and drop mirror bookkeeping), in preorder.
    pub fn destroy(&mut self, id: NodeId) -> Result<Vec<(NodeId, NodeKind)>> {
        if id == self.root {
            return Err(ModelError::RootImmutable);
        }
        if self.node(id)?.parent.is_some() {
            return Err(ModelError::StillAttached(id));
        }

        let mut doomed = vec![id];
        doomed.extend(self.descendants(id));

        let mut destroyed = Vec::with_capacity(doomed.len());
        for n in doomed {
            let slot = &mut self.slots[n.index() as usize];
            if let Some(node) = slot.node.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(n.index());
                self.len -= 1;
                destroyed.push((n, node.kind));
            }
        }

        Ok(destroyed)
    }

    /// Destroy everything except the root.
    pub fn clear(&mut self) -> Vec<(NodeId, NodeKind)> {
        let top: Vec<NodeId> = self.children_of(self.root).to_vec();
        let mut destroyed = Vec::new();
        for id in top {
            if self.detach(id).is_ok() {
                destroyed.extend(self.destroy(id).unwrap_or_default());
            }
        }
        // Detached leftovers (built but never attached) go too.
        for index in 1..self.slots.len() {
            let slot = &mut self.slots[index];
            if let Some(node) = slot.node.take() {
                let id = NodeId::new(index as u32, slot.generation);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                self.len -= 1;
                destroyed.push((id, node.kind));
            }
        }
        destroyed
    }

    // =========================================================================
    // Structural edits
    // =========================================================================

    /// Insert `id` as child `position` of `parent`.
    ///
    /// Fails without changing anything if `id` already has a parent, if the
    /// position is past the end, or if `parent` lies inside `id`'s subtree.
    pub fn attach(&mut self, id: NodeId, parent: NodeId, position: usize) -> Result<()> {
        if id == self.root {
            return Err(ModelError::RootImmutable);
        }
        if self.node(id)?.parent.is_some() {
            return Err(ModelError::AlreadyAttached(id));
        }
        let len = self.node(parent)?.children.len();
        if position > len {
            return Err(ModelError::PositionOutOfBounds { pos: position, len });
        }
        if parent == id || self.is_ancestor(id, parent) {
            return Err(ModelError::CycleDetected { node: id, parent });
        }

        self.node_mut(parent)?.children.insert(position, id);
        self.node_mut(id)?.parent = Some(parent);
        Ok(())
    }

    /// Unlink `id` from its parent. Its own subtree stays intact.
    ///
    /// Returns the former parent and row.
    pub fn detach(&mut self, id: NodeId) -> Result<(NodeId, usize)> {
        if id == self.root {
            return Err(ModelError::RootImmutable);
        }
        let parent = self.node(id)?.parent.ok_or(ModelError::NotAttached(id))?;
        let siblings = &mut self.node_mut(parent)?.children;
        let row = siblings.iter().position(|c| *c == id).ok_or_else(|| ModelError::InvariantViolation {
            node: id,
            reason: format!("missing from children of {parent}"),
        })?;
        siblings.remove(row);
        self.node_mut(id)?.parent = None;
        Ok((parent, row))
    }

    /// Atomically move `id` (with its subtree) to child `position` of
    /// `new_parent`. `position` counts `new_parent`'s children after `id`
    /// has been detached.
    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId, position: usize) -> Result<()> {
        if new_parent == id || self.is_ancestor(id, new_parent) {
            return Err(ModelError::CycleDetected { node: id, parent: new_parent });
        }
        let current = self.node(id)?.parent;
        let len = self.node(new_parent)?.children.len() - usize::from(current == Some(new_parent));
        if position > len {
            return Err(ModelError::PositionOutOfBounds { pos: position, len });
        }

        self.detach(id)?;
        self.attach(id, new_parent, position)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check the parent chain from `id` up to the root.
    ///
    /// For `id` and every ancestor: a parent exists (unless it is the root),
    /// the node is listed exactly once among its parent's children, and the
    /// chain is no longer than `max_depth`.
    pub fn validate(&self, id: NodeId) -> Result<()> {
        let mut current = id;
        let mut steps = 0;

        loop {
            let node = self.node(current)?;
            if current == self.root {
                return match node.parent {
                    None => Ok(()),
                    Some(p) => Err(ModelError::InvariantViolation {
                        node: current,
                        reason: format!("root has parent {p}"),
                    }),
                };
            }

            let parent = node.parent.ok_or_else(|| ModelError::InvariantViolation {
                node: current,
                reason: "no parent".to_string(),
            })?;
            let parent_node = self.get(parent).ok_or_else(|| ModelError::InvariantViolation {
                node: current,
                reason: format!("dangling parent {parent}"),
            })?;
            let listed = parent_node.children.iter().filter(|c| **c == current).count();
            if listed != 1 {
                return Err(ModelError::InvariantViolation {
                    node: current,
                    reason: format!("listed {listed} times among children of {parent}"),
                });
            }

            steps += 1;
            if steps > self.max_depth {
                return Err(ModelError::InvariantViolation {
                    node: id,
                    reason: format!("parent chain longer than {}", self.max_depth),
                });
            }
            current = parent;
        }
    }

    /// Validate every node reachable from the root, and check that every
    /// child link points back at its parent.
    pub fn validate_all(&self) -> Result<()> {
        let reachable = self.descendants(self.root);
        for id in &reachable {
            self.validate(*id)?;
        }

        for id in std::iter::once(self.root).chain(reachable) {
            for child in self.children_of(id) {
                let back = self.parent_of(*child);
                if back != Some(id) {
                    return Err(ModelError::InvariantViolation {
                        node: *child,
                        reason: format!("listed under {id} but parent is {back:?}"),
                    });
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
