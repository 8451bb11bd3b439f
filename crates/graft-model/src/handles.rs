//! Stable handles to proxy positions.
//!
//! A handle is taken at a (parent, row) position and from then on follows the
//! node that sat there. Sibling insertions, removals and moves of the node
//! itself don't disturb it; removing the node (or any ancestor) invalidates it
//! for good. Resolving an invalidated handle is an error, never a silent
//! retarget.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use graft_types::{HandleId, NodeId};

use crate::{ModelError, Result};

/// Caller-held reference to a proxy position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StableHandle {
    pub id: HandleId,
    /// Parent the handle was taken under (`None` = root).
    pub origin_parent: Option<NodeId>,
    /// Row the handle was taken at.
    pub origin_row: usize,
}

/// Where a handle currently points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlePosition {
    pub node: NodeId,
    pub parent: Option<NodeId>,
    pub row: usize,
}

/// Maps handle ids to their current target node.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    /// `None` marks a handle whose target is gone.
    targets: HashMap<HandleId, Option<NodeId>>,
    by_node: HashMap<NodeId, Vec<HandleId>>,
    next_id: u64,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new handle following `node`.
    pub fn track(&mut self, node: NodeId) -> HandleId {
        let id = HandleId::new(self.next_id);
        self.next_id += 1;
        self.targets.insert(id, Some(node));
        self.by_node.entry(node).or_default().push(id);
        id
    }

    /// Current target of `id`.
    pub fn target(&self, id: HandleId) -> Result<NodeId> {
        self.targets.get(&id).copied().flatten().ok_or(ModelError::StaleHandle(id))
    }

    /// Invalidate every handle following `node`.
    pub fn invalidate(&mut self, node: NodeId) {
        if let Some(ids) = self.by_node.remove(&node) {
            for id in ids {
                self.targets.insert(id, None);
            }
        }
    }

    /// Point `id` at `node`, or invalidate it.
    ///
    /// Used when a rebuild reissues node ids: handles whose target survives
    /// the rebuild are carried over to the new id.
    pub fn retarget(&mut self, id: HandleId, node: Option<NodeId>) {
        let Some(slot) = self.targets.get_mut(&id) else {
            return;
        };
        if let Some(old) = slot.take()
            && let Some(ids) = self.by_node.get_mut(&old)
        {
            ids.retain(|h| *h != id);
            if ids.is_empty() {
                self.by_node.remove(&old);
            }
        }
        *slot = node;
        if let Some(node) = node {
            self.by_node.entry(node).or_default().push(id);
        }
    }

    /// Handles that still resolve, with their targets.
    pub fn live(&self) -> Vec<(HandleId, NodeId)> {
        let mut live: Vec<_> = self
            .targets
            .iter()
            .filter_map(|(id, target)| target.map(|node| (*id, node)))
            .collect();
        live.sort();
        live
    }

    /// Forget `id` entirely. Returns `false` if it was unknown.
    pub fn release(&mut self, id: HandleId) -> bool {
        match self.targets.remove(&id) {
            Some(target) => {
                if let Some(node) = target
                    && let Some(ids) = self.by_node.get_mut(&node)
                {
                    ids.retain(|h| *h != id);
                    if ids.is_empty() {
                        self.by_node.remove(&node);
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Number of issued, unreleased handles (live or stale).
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
