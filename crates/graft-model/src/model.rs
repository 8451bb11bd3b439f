//! The reparenting proxy model.
//!
//! `ReparentingModel` owns the [`NodeTree`] and keeps it in lock-step with a
//! source collection plus a caller-supplied set of synthetic nodes. Source
//! events arrive through its [`SourceListener`](crate::SourceListener) impl
//! (see `translate.rs`); everything else is here: registration, the deferred
//! rebuild, placement rules, and the read/write surface observers use.
//!
//! # Display order
//!
//! ```text
//! root
//! ├── synthetic 0          registration order
//! ├── synthetic 1
//! │   ├── adoptee          source preorder
//! │   └── adoptee
//! ├── mirror               source order, natural children below
//! └── mirror
//! ```
//!
//! Incremental edits and a full rebuild both produce exactly this order, so
//! rebuilding never changes a consistent tree.

use std::collections::HashMap;
use std::fmt;

use strum::IntoStaticStr;

use graft_types::{attrs, HandleId, NodeId, ProxyEvent, SourceRef, Value};

use crate::config::ModelConfig;
use crate::handles::{HandlePosition, HandleRegistry, StableHandle};
use crate::manager::{NodeManager, NodeRequest, NodeRequests};
use crate::node::{NodeKind, SyntheticNode};
use crate::observer::ProxyObserver;
use crate::snapshot::{source_label, SnapshotKind, SnapshotNode, TreeSnapshot};
use crate::source::{source_path, source_walk, SourceCollection, SourceItem};
use crate::tasks::{Task, TaskQueue};
use crate::tree::NodeTree;
use crate::{ModelError, Result};

/// Outcome of [`ReparentingModel::register_synthetic_node`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// Queued for the next deferred apply.
    Queued,
    /// An equal node is already attached or queued; nothing happened.
    Duplicate,
}

/// Where in-place edits of a node should go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Buddy {
    /// Edit the synthetic node itself.
    Synthetic(NodeId),
    /// Edit the source element it mirrors.
    Source(SourceRef),
}

/// Source begin/end pair currently open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum SourceOp {
    Insert,
    Remove,
    Move,
    Reset,
}

impl SourceOp {
    pub(crate) fn begin_kind(self) -> &'static str {
        match self {
            SourceOp::Insert => "rows_about_to_be_inserted",
            SourceOp::Remove => "rows_about_to_be_removed",
            SourceOp::Move => "rows_about_to_be_moved",
            SourceOp::Reset => "about_to_be_reset",
        }
    }

    pub(crate) fn end_kind(self) -> &'static str {
        match self {
            SourceOp::Insert => "rows_inserted",
            SourceOp::Remove => "rows_removed",
            SourceOp::Move => "rows_moved",
            SourceOp::Reset => "reset",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Hook {
    Insert,
    Update,
    Removal,
}

/// What a handle pointed at before a rebuild reissued every node id.
#[derive(Clone, Copy, Debug)]
enum Anchor {
    Source(SourceRef),
    /// Index into the pre-rebuild registration order.
    Synthetic(usize),
}

/// Proxy tree over a source collection, with synthetic nodes spliced in.
pub struct ReparentingModel {
    pub(crate) config: ModelConfig,
    pub(crate) tree: NodeTree,
    /// Source element to its mirror.
    pub(crate) mirrors: HashMap<SourceRef, NodeId>,
    /// Attached synthetic nodes in registration order. They occupy root rows
    /// `0..synthetic.len()` in this order.
    pub(crate) synthetic: Vec<NodeId>,
    /// Registered, not yet applied.
    pending: Vec<Box<dyn SyntheticNode>>,
    /// Next apply replaces the attached set with `pending`.
    replace_pending: bool,
    tasks: TaskQueue,
    handles: HandleRegistry,
    manager: Option<Box<dyn NodeManager>>,
    observers: Vec<Box<dyn ProxyObserver>>,
    pub(crate) open: Option<SourceOp>,
    rebuilds: u64,
}

impl fmt::Debug for ReparentingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReparentingModel")
            .field("nodes", &self.tree.len())
            .field("mirrors", &self.mirrors.len())
            .field("synthetic", &self.synthetic)
            .field("pending", &self.pending.len())
            .field("open", &self.open)
            .field("rebuilds", &self.rebuilds)
            .finish_non_exhaustive()
    }
}

impl Default for ReparentingModel {
    fn default() -> Self {
        Self::new(ModelConfig::default())
    }
}

impl ReparentingModel {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            tree: NodeTree::with_max_depth(config.max_depth),
            config,
            mirrors: HashMap::new(),
            synthetic: Vec::new(),
            pending: Vec::new(),
            replace_pending: false,
            tasks: TaskQueue::new(),
            handles: HandleRegistry::new(),
            manager: None,
            observers: Vec::new(),
            open: None,
            rebuilds: 0,
        }
    }

    pub fn with_node_manager(mut self, manager: impl NodeManager + 'static) -> Self {
        self.manager = Some(Box::new(manager));
        self
    }

    pub fn set_node_manager(&mut self, manager: Box<dyn NodeManager>) {
        self.manager = Some(manager);
    }

    /// Add an observer. Observers are notified in subscription order.
    pub fn subscribe(&mut self, observer: impl ProxyObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    /// Full rebuilds run so far (deferred applies, source moves and resets,
    /// explicit [`rebuild`](Self::rebuild) calls).
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// Synthetic nodes registered but not yet applied.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Queue `node` for the next deferred apply.
    ///
    /// A no-op when an equal node is already attached or queued. Never
    /// mutates the tree, so it is safe to call from inside a source callback.
    #[tracing::instrument(skip(self, node), name = "graft.register", fields(node = %node.label()))]
    pub fn register_synthetic_node(&mut self, node: Box<dyn SyntheticNode>) -> Registration {
        let attached = !self.replace_pending && self.synthetic_payloads().any(|s| s.equals(node.as_ref()));
        if attached || self.pending.iter().any(|p| p.equals(node.as_ref())) {
            tracing::debug!("equal synthetic node already registered");
            return Registration::Duplicate;
        }

        self.pending.push(node);
        if self.tasks.post(Task::ApplyPendingNodes) {
            tracing::debug!("scheduled deferred apply");
        }
        Registration::Queued
    }

    /// Replace the whole synthetic node set on the next deferred apply.
    ///
    /// Attached nodes missing from `nodes` disappear; equal entries in
    /// `nodes` collapse to the first.
    #[tracing::instrument(skip(self, nodes), name = "graft.set_nodes", fields(count = nodes.len()))]
    pub fn set_synthetic_nodes(&mut self, nodes: Vec<Box<dyn SyntheticNode>>) {
        let mut set: Vec<Box<dyn SyntheticNode>> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !set.iter().any(|s| s.equals(node.as_ref())) {
                set.push(node);
            }
        }
        self.pending = set;
        self.replace_pending = true;
        self.tasks.post(Task::ApplyPendingNodes);
    }

    /// Let the registered node equal to `node` absorb its data.
    ///
    /// Emits `DataChanged` for an attached node that changed. Returns whether
    /// any attached or queued node changed.
    pub fn update_synthetic_node(&mut self, node: &dyn SyntheticNode) -> bool {
        let mut changed = false;
        for queued in self.pending.iter_mut().filter(|p| p.equals(node)) {
            changed |= queued.update(node);
        }

        if let Some(id) = self.find_synthetic(node) {
            let updated = self
                .tree
                .get_mut(id)
                .and_then(|n| n.synthetic_mut())
                .is_some_and(|s| s.update(node));
            if updated {
                self.emit_data_changed(id);
                changed = true;
            }
        }

        changed
    }

    /// Remove the node equal to `node`, immediately.
    ///
    /// Its adoptees are first moved to their next placement, so no source
    /// element drops out of the view. A queued equal node is dropped too.
    /// Returns whether anything was removed.
    #[tracing::instrument(skip(self, source, node), name = "graft.remove", fields(node = %node.label()))]
    pub fn remove_synthetic_node(&mut self, source: &dyn SourceCollection, node: &dyn SyntheticNode) -> Result<bool> {
        let queued = self.pending.len();
        self.pending.retain(|p| !p.equals(node));
        let mut removed = self.pending.len() != queued;

        if let Some(id) = self.find_synthetic(node) {
            self.discard_synthetic(source, id)?;
            removed = true;
        }

        Ok(removed)
    }

    /// Run everything deferred so far. Returns how many rebuilds ran.
    #[tracing::instrument(skip(self, source), name = "graft.run_pending")]
    pub fn run_pending_tasks(&mut self, source: &dyn SourceCollection) -> Result<usize> {
        if let Some(op) = self.open {
            return Err(ModelError::SourceEditInProgress(op.into()));
        }

        let mut rebuilds = 0;
        for task in self.tasks.take_all() {
            match task {
                Task::ApplyPendingNodes => {
                    if self.pending.is_empty() && !self.replace_pending {
                        tracing::debug!("pending registrations netted out, skipping rebuild");
                        continue;
                    }
                    self.rebuild(source)?;
                    rebuilds += 1;
                }
            }
        }
        Ok(rebuilds)
    }

    /// Reconstruct the tree from `source` and the synthetic node set, inside
    /// one reset pair. Queued registrations are applied.
    #[tracing::instrument(skip(self, source), name = "graft.rebuild")]
    pub fn rebuild(&mut self, source: &dyn SourceCollection) -> Result<()> {
        if let Some(op) = self.open {
            return Err(ModelError::SourceEditInProgress(op.into()));
        }
        self.emit(ProxyEvent::ModelAboutToBeReset);
        self.rebuild_tree(source)?;
        self.emit(ProxyEvent::ModelReset);
        Ok(())
    }

    /// The rebuild proper, without notifications.
    pub(crate) fn rebuild_tree(&mut self, source: &dyn SourceCollection) -> Result<()> {
        let old_synthetic = std::mem::take(&mut self.synthetic);

        let anchors: Vec<(HandleId, Option<Anchor>)> = self
            .handles
            .live()
            .into_iter()
            .map(|(handle, node)| {
                let anchor = match self.tree.get(node).map(|n| n.kind()) {
                    Some(NodeKind::SourceMirror(item)) => Some(Anchor::Source(*item)),
                    Some(NodeKind::Synthetic(_)) => old_synthetic.iter().position(|s| *s == node).map(Anchor::Synthetic),
                    _ => None,
                };
                (handle, anchor)
            })
            .collect();

        let mut old_payloads: Vec<Option<Box<dyn SyntheticNode>>> = old_synthetic.iter().map(|_| None).collect();
        for (id, kind) in self.tree.clear() {
            if let NodeKind::Synthetic(payload) = kind
                && let Some(i) = old_synthetic.iter().position(|s| *s == id)
            {
                old_payloads[i] = Some(payload);
            }
        }
        self.mirrors.clear();

        // Payloads to attach, with their pre-rebuild registration index.
        let mut payloads: Vec<(Box<dyn SyntheticNode>, Option<usize>)> = Vec::new();
        if std::mem::take(&mut self.replace_pending) {
            for payload in std::mem::take(&mut self.pending) {
                let origin = old_payloads
                    .iter()
                    .position(|old| old.as_ref().is_some_and(|old| old.equals(payload.as_ref())));
                payloads.push((payload, origin));
            }
        } else {
            for (i, payload) in old_payloads.into_iter().enumerate() {
                if let Some(payload) = payload {
                    payloads.push((payload, Some(i)));
                }
            }
            for payload in std::mem::take(&mut self.pending) {
                if !payloads.iter().any(|(p, _)| p.equals(payload.as_ref())) {
                    payloads.push((payload, None));
                }
            }
        }

        // Mirror the source in natural placement.
        let root = self.tree.root();
        let items = source_walk(source);
        for item in &items {
            let parent = match source.parent(*item) {
                None => root,
                Some(p) => *self.mirrors.get(&p).ok_or(ModelError::UnknownSource(p))?,
            };
            let node = self.tree.create(NodeKind::SourceMirror(*item));
            let pos = self.tree.children_of(parent).len();
            self.tree.attach(node, parent, pos)?;
            self.mirrors.insert(*item, node);
        }

        // Attach synthetic nodes; each adopts what no earlier one claimed.
        let mut reissued: HashMap<usize, NodeId> = HashMap::new();
        for (payload, origin) in payloads {
            if let Some(dup) = items
                .iter()
                .find(|item| payload.is_duplicate_of(&SourceItem::new(source, **item)))
            {
                tracing::debug!(node = %payload.label(), duplicate_of = %dup, "suppressing duplicate synthetic node");
                continue;
            }

            let mut adoptees = Vec::new();
            for item in &items {
                let Some(&mirror) = self.mirrors.get(item) else {
                    continue;
                };
                let claimed = self.tree.parent_of(mirror).is_some_and(|p| self.is_synthetic(p));
                if !claimed && payload.adopts(&SourceItem::new(source, *item)) {
                    adoptees.push(mirror);
                }
            }

            let node = self.tree.create(NodeKind::Synthetic(payload));
            self.tree.attach(node, root, self.synthetic.len())?;
            self.synthetic.push(node);
            for mirror in adoptees {
                let pos = self.tree.children_of(node).len();
                self.tree.reparent(mirror, node, pos)?;
            }
            if let Some(i) = origin {
                reissued.insert(i, node);
            }
        }

        for (handle, anchor) in anchors {
            let target = match anchor {
                Some(Anchor::Source(item)) => self.mirrors.get(&item).copied(),
                Some(Anchor::Synthetic(i)) => reissued.get(&i).copied(),
                None => None,
            };
            self.handles.retarget(handle, target);
        }

        self.rebuilds += 1;
        tracing::debug!(
            mirrors = self.mirrors.len(),
            synthetic = self.synthetic.len(),
            rebuilds = self.rebuilds,
            "rebuilt proxy tree"
        );
        self.check_invariants();
        Ok(())
    }

    // =========================================================================
    // Placement
    // =========================================================================

    pub(crate) fn payload(&self, id: NodeId) -> Option<&dyn SyntheticNode> {
        self.tree.get(id).and_then(|n| n.synthetic())
    }

    fn synthetic_payloads(&self) -> impl Iterator<Item = &dyn SyntheticNode> + '_ {
        self.synthetic.iter().filter_map(|id| self.payload(*id))
    }

    fn find_synthetic(&self, node: &dyn SyntheticNode) -> Option<NodeId> {
        self.synthetic
            .iter()
            .copied()
            .find(|id| self.payload(*id).is_some_and(|s| s.equals(node)))
    }

    pub(crate) fn is_synthetic(&self, id: NodeId) -> bool {
        self.tree.get(id).is_some_and(|n| n.is_synthetic())
    }

    /// Proxy address of `node`: `None` for the root.
    pub(crate) fn address(&self, node: NodeId) -> Option<NodeId> {
        (node != self.tree.root()).then_some(node)
    }

    /// First attached synthetic node, in registration order, that adopts
    /// `item`.
    pub(crate) fn adopter_for(&self, source: &dyn SourceCollection, item: SourceRef, skip: Option<NodeId>) -> Option<NodeId> {
        let view = SourceItem::new(source, item);
        self.synthetic
            .iter()
            .copied()
            .filter(|id| Some(*id) != skip)
            .find(|id| self.payload(*id).is_some_and(|s| s.adopts(&view)))
    }

    /// Mirror of `item`'s source parent, or the root for top-level elements.
    pub(crate) fn natural_parent(&self, source: &dyn SourceCollection, item: SourceRef) -> Result<NodeId> {
        match source.parent(item) {
            None => Ok(self.tree.root()),
            Some(p) => self.mirrors.get(&p).copied().ok_or(ModelError::UnknownSource(p)),
        }
    }

    /// Row for `item` under its natural parent: after the synthetic rows at
    /// root, after every preceding source sibling mirrored there.
    fn natural_position(&self, source: &dyn SourceCollection, item: SourceRef, parent: NodeId) -> usize {
        let base = if parent == self.tree.root() { self.synthetic.len() } else { 0 };
        let preceding = source
            .children(source.parent(item))
            .into_iter()
            .take_while(|s| *s != item)
            .filter(|s| {
                self.mirrors
                    .get(s)
                    .is_some_and(|m| self.tree.parent_of(*m) == Some(parent))
            })
            .count();
        base + preceding
    }

    /// Row for `item` among `group`'s adoptees, which are kept in source
    /// preorder.
    pub(crate) fn adopted_position(&self, source: &dyn SourceCollection, item: SourceRef, group: NodeId) -> usize {
        let path = source_path(source, item);
        self.tree
            .children_of(group)
            .iter()
            .filter_map(|c| self.tree.get(*c).and_then(|n| n.source_ref()))
            .filter(|r| *r != item && source_path(source, *r) < path)
            .count()
    }

    /// Where `item`'s mirror belongs: its adopter (ignoring `skip`) or its
    /// natural parent.
    pub(crate) fn placement(
        &self,
        source: &dyn SourceCollection,
        item: SourceRef,
        skip: Option<NodeId>,
    ) -> Result<(NodeId, usize)> {
        match self.adopter_for(source, item, skip) {
            Some(group) => Ok((group, self.adopted_position(source, item, group))),
            None => {
                let parent = self.natural_parent(source, item)?;
                Ok((parent, self.natural_position(source, item, parent)))
            }
        }
    }

    // =========================================================================
    // Announced structural edits
    // =========================================================================

    pub(crate) fn emit(&mut self, event: ProxyEvent) {
        tracing::trace!(kind = event.kind(), ?event, "proxy event");
        for observer in &mut self.observers {
            observer.notify(&event);
        }
    }

    pub(crate) fn emit_data_changed(&mut self, node: NodeId) {
        if let (Some(parent), Some(row)) = (self.tree.parent_of(node), self.tree.row_of(node)) {
            let parent = self.address(parent);
            self.emit(ProxyEvent::DataChanged { parent, first: row, last: row });
        }
    }

    /// Attach a detached node inside an insert pair.
    pub(crate) fn insert_node(&mut self, node: NodeId, parent: NodeId, pos: usize) -> Result<()> {
        let addr = self.address(parent);
        self.emit(ProxyEvent::RowsAboutToBeInserted { parent: addr, first: pos, last: pos });
        self.tree.attach(node, parent, pos)?;
        self.emit(ProxyEvent::RowsInserted { parent: addr, first: pos, last: pos });
        self.check_invariants();
        Ok(())
    }

    /// Move `node` under `parent` inside a move pair. `pos` is the row in
    /// `parent` before the move. Returns `false` (and emits nothing) when the
    /// node is already under `parent`.
    pub(crate) fn move_node(&mut self, node: NodeId, parent: NodeId, pos: usize) -> Result<bool> {
        let src = self.tree.parent_of(node).ok_or(ModelError::NotAttached(node))?;
        if src == parent {
            return Ok(false);
        }
        let row = self.tree.row_of(node).ok_or(ModelError::NotAttached(node))?;

        let (src_parent, dst_parent) = (self.address(src), self.address(parent));
        self.emit(ProxyEvent::RowsAboutToBeMoved { src_parent, first: row, last: row, dst_parent, dst_row: pos });
        self.tree.reparent(node, parent, pos)?;
        self.emit(ProxyEvent::RowsMoved { src_parent, first: row, last: row, dst_parent, dst_row: pos });
        self.check_invariants();
        Ok(true)
    }

    /// Detach and destroy `node` with its subtree inside a remove pair.
    pub(crate) fn remove_node(&mut self, node: NodeId) -> Result<()> {
        let parent = self.tree.parent_of(node).ok_or(ModelError::NotAttached(node))?;
        let row = self.tree.row_of(node).ok_or(ModelError::NotAttached(node))?;
        let addr = self.address(parent);

        self.emit(ProxyEvent::RowsAboutToBeRemoved { parent: addr, first: row, last: row });
        self.tree.detach(node)?;
        for (id, kind) in self.tree.destroy(node)? {
            self.handles.invalidate(id);
            match kind {
                NodeKind::SourceMirror(item) => {
                    if self.mirrors.get(&item) == Some(&id) {
                        self.mirrors.remove(&item);
                    }
                }
                NodeKind::Synthetic(payload) => {
                    self.synthetic.retain(|s| *s != id);
                    tracing::debug!(node = %payload.label(), "synthetic node discarded");
                }
                NodeKind::Root => {}
            }
        }
        self.emit(ProxyEvent::RowsRemoved { parent: addr, first: row, last: row });
        self.check_invariants();
        Ok(())
    }

    /// Rehome `group`'s adoptees, then remove it.
    pub(crate) fn discard_synthetic(&mut self, source: &dyn SourceCollection, group: NodeId) -> Result<()> {
        for mirror in self.tree.children_of(group).to_vec() {
            let Some(item) = self.tree.get(mirror).and_then(|n| n.source_ref()) else {
                continue;
            };
            let (parent, pos) = self.placement(source, item, Some(group))?;
            tracing::debug!(%item, to = %parent, "rehoming adoptee");
            self.move_node(mirror, parent, pos)?;
        }
        self.remove_node(group)
    }

    /// Discard every attached synthetic node that duplicates one of `items`.
    pub(crate) fn remove_duplicates_of(&mut self, source: &dyn SourceCollection, items: &[SourceRef]) -> Result<()> {
        let doomed: Vec<NodeId> = self
            .synthetic
            .iter()
            .copied()
            .filter(|id| {
                self.payload(*id).is_some_and(|s| {
                    items
                        .iter()
                        .any(|item| s.is_duplicate_of(&SourceItem::new(source, *item)))
                })
            })
            .collect();

        for group in doomed {
            tracing::debug!(node = %group, "suppressing synthetic duplicate of source element");
            self.discard_synthetic(source, group)?;
        }
        Ok(())
    }

    /// Panics on a corrupt tree when per-edit validation is on.
    pub(crate) fn check_invariants(&self) {
        if !self.config.validate_edits {
            return;
        }
        if let Err(e) = self.tree.validate_all() {
            panic!("proxy tree invariant violated: {e}");
        }
    }

    // =========================================================================
    // Node manager
    // =========================================================================

    pub(crate) fn run_hook(&mut self, source: &dyn SourceCollection, item: SourceRef, hook: Hook) -> Result<()> {
        let Some(mut manager) = self.manager.take() else {
            return Ok(());
        };

        let view = SourceItem::new(source, item);
        let mut nodes = NodeRequests::new(&self.tree, &self.synthetic);
        match hook {
            Hook::Insert => manager.check_insert(&view, &mut nodes),
            Hook::Update => manager.check_update(&view, &mut nodes),
            Hook::Removal => manager.check_removal(&view, &mut nodes),
        }
        let requests = nodes.into_requests();
        self.manager = Some(manager);

        for request in requests {
            match request {
                NodeRequest::Register(node) => {
                    self.register_synthetic_node(node);
                }
                NodeRequest::Update(node) => {
                    self.update_synthetic_node(node.as_ref());
                }
                NodeRequest::Remove(node) => {
                    self.remove_synthetic_node(source, node.as_ref())?;
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    fn resolve_parent(&self, parent: Option<NodeId>) -> Result<NodeId> {
        match parent {
            None => Ok(self.tree.root()),
            Some(p) if self.tree.contains(p) => Ok(p),
            Some(p) => Err(ModelError::UnknownNode(p)),
        }
    }

    /// Children of `parent` (`None` = root) in display order.
    pub fn children(&self, parent: Option<NodeId>) -> &[NodeId] {
        self.tree.children_of(parent.unwrap_or_else(|| self.tree.root()))
    }

    pub fn row_count(&self, parent: Option<NodeId>) -> usize {
        self.children(parent).len()
    }

    pub fn index(&self, parent: Option<NodeId>, row: usize) -> Option<NodeId> {
        self.children(parent).get(row).copied()
    }

    /// Parent of `node`; `Ok(None)` for top-level rows.
    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>> {
        let parent = self
            .tree
            .get(node)
            .ok_or(ModelError::UnknownNode(node))?
            .parent()
            .ok_or(ModelError::NotAttached(node))?;
        Ok(self.address(parent))
    }

    pub fn row(&self, node: NodeId) -> Result<usize> {
        if !self.tree.contains(node) {
            return Err(ModelError::UnknownNode(node));
        }
        self.tree.row_of(node).ok_or(ModelError::NotAttached(node))
    }

    pub fn map_to_source(&self, node: NodeId) -> Option<SourceRef> {
        self.tree.get(node).and_then(|n| n.source_ref())
    }

    pub fn map_from_source(&self, item: SourceRef) -> Option<NodeId> {
        self.mirrors.get(&item).copied()
    }

    /// Attached synthetic nodes in registration order.
    pub fn synthetic_nodes(&self) -> &[NodeId] {
        &self.synthetic
    }

    pub fn synthetic_node(&self, node: NodeId) -> Option<&dyn SyntheticNode> {
        self.payload(node)
    }

    // =========================================================================
    // Data
    // =========================================================================

    /// Read `attribute` of `node`, from its payload or its source element.
    pub fn data(&self, source: &dyn SourceCollection, node: NodeId, attribute: &str) -> Result<Option<Value>> {
        match self.tree.get(node).ok_or(ModelError::UnknownNode(node))?.kind() {
            NodeKind::Synthetic(payload) => Ok(payload.data(attribute)),
            NodeKind::SourceMirror(item) => Ok(source.data(*item, attribute)),
            NodeKind::Root => Ok(None),
        }
    }

    /// Write `attribute` of a synthetic node. Source mirrors are edited via
    /// their [`buddy`](Self::buddy) in the source collection.
    pub fn set_data(&mut self, node: NodeId, attribute: &str, value: Value) -> Result<bool> {
        let changed = self
            .tree
            .get_mut(node)
            .ok_or(ModelError::UnknownNode(node))?
            .synthetic_mut()
            .ok_or(ModelError::NotSynthetic(node))?
            .set_data(attribute, value);
        if changed {
            self.emit_data_changed(node);
        }
        Ok(changed)
    }

    pub fn buddy(&self, node: NodeId) -> Result<Buddy> {
        match self.tree.get(node).ok_or(ModelError::UnknownNode(node))?.kind() {
            NodeKind::Synthetic(_) => Ok(Buddy::Synthetic(node)),
            NodeKind::SourceMirror(item) => Ok(Buddy::Source(*item)),
            NodeKind::Root => Err(ModelError::RootImmutable),
        }
    }

    fn checkable(&self, node: NodeId) -> Result<&dyn SyntheticNode> {
        let n = self.tree.get(node).ok_or(ModelError::UnknownNode(node))?;
        n.synthetic()
            .filter(|s| s.is_checkable())
            .ok_or(ModelError::NotCheckable(node))
    }

    pub fn check_state(&self, node: NodeId) -> Result<Option<bool>> {
        Ok(self.checkable(node)?.data(attrs::CHECK_STATE).and_then(|v| v.as_bool()))
    }

    pub fn set_check_state(&mut self, node: NodeId, checked: bool) -> Result<bool> {
        self.checkable(node)?;
        self.set_data(node, attrs::CHECK_STATE, Value::Bool(checked))
    }

    // =========================================================================
    // Stable handles
    // =========================================================================

    /// Take a handle on the node at `row` under `parent`.
    pub fn create_handle(&mut self, parent: Option<NodeId>, row: usize) -> Result<StableHandle> {
        let p = self.resolve_parent(parent)?;
        let siblings = self.tree.children_of(p);
        let node = siblings
            .get(row)
            .copied()
            .ok_or(ModelError::PositionOutOfBounds { pos: row, len: siblings.len() })?;

        Ok(StableHandle {
            id: self.handles.track(node),
            origin_parent: parent,
            origin_row: row,
        })
    }

    /// Current position of the handle's target.
    pub fn resolve_handle(&self, handle: &StableHandle) -> Result<HandlePosition> {
        let node = self.handles.target(handle.id)?;
        match (self.tree.parent_of(node), self.tree.row_of(node)) {
            (Some(parent), Some(row)) => Ok(HandlePosition {
                node,
                parent: self.address(parent),
                row,
            }),
            _ => Err(ModelError::StaleHandle(handle.id)),
        }
    }

    pub fn release_handle(&mut self, handle: &StableHandle) -> bool {
        self.handles.release(handle.id)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn snapshot(&self, source: &dyn SourceCollection) -> TreeSnapshot {
        TreeSnapshot {
            roots: self
                .tree
                .children_of(self.tree.root())
                .iter()
                .filter_map(|c| self.snapshot_node(source, *c, 1))
                .collect(),
        }
    }

    fn snapshot_node(&self, source: &dyn SourceCollection, id: NodeId, depth: usize) -> Option<SnapshotNode> {
        let (label, kind) = match self.tree.get(id)?.kind() {
            NodeKind::SourceMirror(item) => (source_label(source, *item), SnapshotKind::Source(*item)),
            NodeKind::Synthetic(payload) => (payload.label(), SnapshotKind::Synthetic),
            NodeKind::Root => return None,
        };

        let children = if depth >= self.config.max_depth {
            tracing::warn!("snapshot() hit max depth ({}), truncating", self.config.max_depth);
            Vec::new()
        } else {
            self.tree
                .children_of(id)
                .iter()
                .filter_map(|c| self.snapshot_node(source, *c, depth + 1))
                .collect()
        };

        Some(SnapshotNode { label, kind, children })
    }

    /// Structural invariants of the arena only.
    pub fn validate(&self) -> Result<()> {
        self.tree.validate_all()
    }

    /// Full agreement check between the tree and `source`.
    ///
    /// Beyond [`validate`](Self::validate): every source element is mirrored
    /// exactly once and sits under its first adopter or else its natural
    /// parent; synthetic nodes fill the first root rows in registration
    /// order; no synthetic node duplicates a present element; siblings are in
    /// source order.
    pub fn check_consistency(&self, source: &dyn SourceCollection) -> Result<()> {
        self.tree.validate_all()?;

        let root = self.tree.root();
        let violation = |node: NodeId, reason: String| ModelError::InvariantViolation { node, reason };

        let items = source_walk(source);
        if self.mirrors.len() != items.len() {
            return Err(violation(
                root,
                format!("{} mirrors for {} source elements", self.mirrors.len(), items.len()),
            ));
        }

        for item in &items {
            let node = self.mirrors.get(item).copied().ok_or(ModelError::UnknownSource(*item))?;
            let n = self.tree.get(node).ok_or(ModelError::UnknownNode(node))?;
            if n.source_ref() != Some(*item) {
                return Err(violation(node, format!("mirror map entry for {item} points elsewhere")));
            }
            let parent = n.parent().ok_or(ModelError::NotAttached(node))?;

            let adopter = self.adopter_for(source, *item, None);
            let expected = match adopter {
                Some(group) => group,
                None => self.natural_parent(source, *item)?,
            };
            if parent != expected {
                return Err(violation(node, format!("{item} under {parent}, expected {expected}")));
            }
        }

        for (row, id) in self.synthetic.iter().enumerate() {
            if self.tree.parent_of(*id) != Some(root) || self.tree.row_of(*id) != Some(row) {
                return Err(violation(*id, format!("synthetic node not at root row {row}")));
            }
            if let Some(payload) = self.payload(*id)
                && let Some(dup) = items
                    .iter()
                    .find(|item| payload.is_duplicate_of(&SourceItem::new(source, **item)))
            {
                return Err(violation(*id, format!("duplicate of present element {dup}")));
            }
        }

        let expected_len = items.len() + self.synthetic.len();
        if self.tree.len() != expected_len {
            return Err(violation(
                root,
                format!("arena holds {} nodes, expected {expected_len}", self.tree.len()),
            ));
        }

        for parent in std::iter::once(root).chain(self.tree.descendants(root)) {
            let paths: Vec<Vec<usize>> = self
                .tree
                .children_of(parent)
                .iter()
                .filter_map(|c| self.map_to_source(*c))
                .map(|item| source_path(source, item))
                .collect();
            if paths.windows(2).any(|w| w[0] >= w[1]) {
                return Err(violation(parent, "children out of source order".to_string()));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
