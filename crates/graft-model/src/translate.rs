//! Source event translation.
//!
//! Replays source structural events against the proxy tree and re-emits them
//! at proxy addresses.
//!
//! ```text
//! RowsAboutToBeInserted   open pair
//! RowsInserted            dedupe → build mirrors → insert pair per placement → check_insert
//! RowsAboutToBeRemoved    remove adopted-away descendants → remove pair → check_removal
//! RowsRemoved             close pair
//! RowsAboutToBeMoved      ModelAboutToBeReset
//! RowsMoved               rebuild → ModelReset
//! DataChanged             dedupe → re-place → DataChanged → check_update
//! AboutToBeReset / Reset  as moves
//! ```
//!
//! Removal resolves elements by identity through the mirror map, not by the
//! proxy address of their source parent, so an adopted element is detached
//! from whichever synthetic node holds it.

use graft_types::{NodeId, ProxyEvent, SourceEvent, SourceRef};

use crate::model::{Hook, ReparentingModel, SourceOp};
use crate::node::NodeKind;
use crate::source::{source_descendants, SourceCollection, SourceListener};
use crate::{ModelError, Result};

impl SourceListener for ReparentingModel {
    fn source_event(&mut self, source: &dyn SourceCollection, event: &SourceEvent) -> Result<()> {
        tracing::trace!(kind = event.kind(), ?event, "source event");

        match *event {
            SourceEvent::RowsAboutToBeInserted { .. } => self.open_op(SourceOp::Insert, event),
            SourceEvent::RowsInserted { parent, first, last } => {
                self.close_op(SourceOp::Insert, event)?;
                self.rows_inserted(source, parent, first, last)
            }
            SourceEvent::RowsAboutToBeRemoved { parent, first, last } => {
                self.open_op(SourceOp::Remove, event)?;
                self.rows_about_to_be_removed(source, parent, first, last)
            }
            SourceEvent::RowsRemoved { .. } => self.close_op(SourceOp::Remove, event),
            SourceEvent::RowsAboutToBeMoved { .. } => {
                self.open_op(SourceOp::Move, event)?;
                self.emit(ProxyEvent::ModelAboutToBeReset);
                Ok(())
            }
            SourceEvent::RowsMoved { .. } => {
                self.close_op(SourceOp::Move, event)?;
                self.rebuild_tree(source)?;
                self.emit(ProxyEvent::ModelReset);
                Ok(())
            }
            SourceEvent::DataChanged { parent, first, last } => {
                if let Some(open) = self.open {
                    return Err(ModelError::NestedSourceEvent { open: open.into(), got: event.kind() });
                }
                self.data_changed(source, parent, first, last)
            }
            SourceEvent::AboutToBeReset => {
                self.open_op(SourceOp::Reset, event)?;
                self.emit(ProxyEvent::ModelAboutToBeReset);
                Ok(())
            }
            SourceEvent::Reset => {
                self.close_op(SourceOp::Reset, event)?;
                self.rebuild_tree(source)?;
                self.emit(ProxyEvent::ModelReset);
                Ok(())
            }
        }
    }
}

impl ReparentingModel {
    // =========================================================================
    // Pairing
    // =========================================================================

    fn open_op(&mut self, op: SourceOp, event: &SourceEvent) -> Result<()> {
        if let Some(open) = self.open {
            return Err(ModelError::NestedSourceEvent { open: open.into(), got: event.kind() });
        }
        self.open = Some(op);
        Ok(())
    }

    fn close_op(&mut self, op: SourceOp, event: &SourceEvent) -> Result<()> {
        match self.open {
            Some(open) if open == op => {
                self.open = None;
                Ok(())
            }
            Some(open) => Err(ModelError::UnpairedSourceEvent { expected: open.end_kind(), got: event.kind() }),
            None => Err(ModelError::UnpairedSourceEvent { expected: op.begin_kind(), got: event.kind() }),
        }
    }

    fn sibling_range(
        source: &dyn SourceCollection,
        parent: Option<SourceRef>,
        first: usize,
        last: usize,
    ) -> Result<Vec<SourceRef>> {
        let children = source.children(parent);
        if first > last || last >= children.len() {
            return Err(ModelError::RowsOutOfRange { first, last, len: children.len() });
        }
        Ok(children[first..=last].to_vec())
    }

    fn mirror_of(&self, item: SourceRef) -> Result<NodeId> {
        self.mirrors.get(&item).copied().ok_or(ModelError::UnknownSource(item))
    }

    // =========================================================================
    // Insert
    // =========================================================================

    #[tracing::instrument(skip(self, source), name = "graft.rows_inserted")]
    fn rows_inserted(
        &mut self,
        source: &dyn SourceCollection,
        parent: Option<SourceRef>,
        first: usize,
        last: usize,
    ) -> Result<()> {
        if let Some(p) = parent {
            self.mirror_of(p)?;
        }
        for item in Self::sibling_range(source, parent, first, last)? {
            self.insert_element(source, item)?;
        }
        Ok(())
    }

    /// Mirror a newly inserted element and its source subtree.
    fn insert_element(&mut self, source: &dyn SourceCollection, item: SourceRef) -> Result<()> {
        let mut subtree = vec![item];
        subtree.extend(source_descendants(source, item));
        if let Some(existing) = subtree.iter().find(|s| self.mirrors.contains_key(*s)) {
            return Err(ModelError::DuplicateMirror(*existing));
        }

        // A duplicate must never be visible alongside the element, not even
        // between the pairs below.
        self.remove_duplicates_of(source, &subtree)?;

        // Build the subtree detached. Descendants some synthetic node claims
        // are left out and attached to their adopter afterwards.
        let mut claimed = Vec::new();
        for s in &subtree {
            let node = self.tree.create(NodeKind::SourceMirror(*s));
            self.mirrors.insert(*s, node);
            if *s == item {
                continue;
            }
            match self.adopter_for(source, *s, None) {
                Some(group) => claimed.push((node, *s, group)),
                None => {
                    let parent = self.natural_parent(source, *s)?;
                    let pos = self.tree.children_of(parent).len();
                    self.tree.attach(node, parent, pos)?;
                }
            }
        }

        let node = self.mirror_of(item)?;
        let (parent, pos) = self.placement(source, item, None)?;
        if self.is_synthetic(parent) {
            tracing::debug!(%item, adopter = %parent, "inserted element adopted");
        }
        self.insert_node(node, parent, pos)?;

        for (node, s, group) in claimed {
            let pos = self.adopted_position(source, s, group);
            tracing::debug!(item = %s, adopter = %group, "inserted descendant adopted");
            self.insert_node(node, group, pos)?;
        }

        for s in subtree {
            self.run_hook(source, s, Hook::Insert)?;
        }
        Ok(())
    }

    // =========================================================================
    // Remove
    // =========================================================================

    #[tracing::instrument(skip(self, source), name = "graft.rows_removed")]
    fn rows_about_to_be_removed(
        &mut self,
        source: &dyn SourceCollection,
        parent: Option<SourceRef>,
        first: usize,
        last: usize,
    ) -> Result<()> {
        let items = Self::sibling_range(source, parent, first, last)?;
        for item in items.iter().rev() {
            self.remove_element(source, *item)?;
        }

        // The source still holds the removed data until RowsRemoved.
        for item in items {
            self.run_hook(source, item, Hook::Removal)?;
            for d in source_descendants(source, item) {
                self.run_hook(source, d, Hook::Removal)?;
            }
        }
        Ok(())
    }

    fn remove_element(&mut self, source: &dyn SourceCollection, item: SourceRef) -> Result<()> {
        let node = self.mirror_of(item)?;

        // Descendants adopted out of this subtree live elsewhere in the
        // proxy; take them out first. Ones already gone went with an adopted
        // ancestor.
        for d in source_descendants(source, item) {
            let Some(mirror) = self.mirrors.get(&d).copied() else {
                continue;
            };
            if self.tree.parent_of(mirror).is_some_and(|p| self.is_synthetic(p)) {
                tracing::debug!(item = %d, "removing adopted descendant");
                self.remove_node(mirror)?;
            }
        }

        self.remove_node(node)
    }

    // =========================================================================
    // Data
    // =========================================================================

    #[tracing::instrument(skip(self, source), name = "graft.data_changed")]
    fn data_changed(
        &mut self,
        source: &dyn SourceCollection,
        parent: Option<SourceRef>,
        first: usize,
        last: usize,
    ) -> Result<()> {
        for item in Self::sibling_range(source, parent, first, last)? {
            let node = self.mirror_of(item)?;
            self.remove_duplicates_of(source, &[item])?;

            let (target, pos) = self.placement(source, item, None)?;
            if self.move_node(node, target, pos)? {
                tracing::debug!(%item, to = %target, "data change re-placed element");
            }

            self.emit_data_changed(node);
            self.run_hook(source, item, Hook::Update)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::group::{GroupNode, GroupingManager};
    use crate::memory::{MemorySource, RecordSpec};
    use crate::observer::EventLog;

    fn model() -> ReparentingModel {
        ReparentingModel::new(ModelConfig::default().with_validation(true))
    }

    fn grouped(label: &str, key: &str) -> RecordSpec {
        RecordSpec::named(label).with("group", key)
    }

    /// Model over `src` with a `group == key` node registered and applied.
    fn with_group(src: &MemorySource, key: &str) -> ReparentingModel {
        let mut m = model();
        m.rebuild(src).unwrap();
        m.register_synthetic_node(Box::new(GroupNode::new("group", key).with_label(key.to_uppercase())));
        m.run_pending_tasks(src).unwrap();
        m
    }

    #[test]
    fn test_insert_natural_and_adopted() {
        let mut src = MemorySource::new();
        src.append(None, grouped("A", "g1"), &mut ()).unwrap();
        let mut m = with_group(&src, "g1");

        let log = EventLog::new();
        m.subscribe(log.recorder());

        src.append(None, grouped("B", "g2"), &mut m).unwrap();
        src.append(None, grouped("C", "g1"), &mut m).unwrap();

        assert_eq!(m.snapshot(&src).render(), "G1 [A, C], B");
        let g1 = m.index(None, 0);
        assert_eq!(
            log.events(),
            vec![
                ProxyEvent::RowsAboutToBeInserted { parent: None, first: 1, last: 1 },
                ProxyEvent::RowsInserted { parent: None, first: 1, last: 1 },
                ProxyEvent::RowsAboutToBeInserted { parent: g1, first: 1, last: 1 },
                ProxyEvent::RowsInserted { parent: g1, first: 1, last: 1 },
            ]
        );
        m.check_consistency(&src).unwrap();
    }

    #[test]
    fn test_insert_subtree_cascades_adoption() {
        let mut src = MemorySource::new();
        let mut m = with_group(&src, "g1");
        // Group without adoptees still shows.
        assert_eq!(m.snapshot(&src).render(), "G1");

        let spec = RecordSpec::named("P")
            .child(RecordSpec::named("P1"))
            .child(grouped("P2", "g1").child(RecordSpec::named("P2a")));
        let log = EventLog::new();
        m.subscribe(log.recorder());
        src.append(None, spec, &mut m).unwrap();

        assert_eq!(m.snapshot(&src).render(), "G1 [P2 [P2a]], P [P1]");
        assert_eq!(log.count("rows_inserted"), 2);
        m.check_consistency(&src).unwrap();
    }

    #[test]
    fn test_insert_child_of_adopted_element() {
        let mut src = MemorySource::new();
        let a = src.append(None, grouped("A", "g1"), &mut ()).unwrap();
        let mut m = with_group(&src, "g1");

        src.append(Some(a), RecordSpec::named("A1"), &mut m).unwrap();
        assert_eq!(m.snapshot(&src).render(), "G1 [A [A1]]");
        m.check_consistency(&src).unwrap();
    }

    #[test]
    fn test_adopted_order_follows_source_order() {
        let mut src = MemorySource::new();
        src.append(None, grouped("B", "g1"), &mut ()).unwrap();
        let mut m = with_group(&src, "g1");

        src.insert(None, 0, grouped("A", "g1"), &mut m).unwrap();
        src.append(None, grouped("C", "g1"), &mut m).unwrap();
        assert_eq!(m.snapshot(&src).render(), "G1 [A, B, C]");
        m.check_consistency(&src).unwrap();
    }

    #[test]
    fn test_remove_adopted_element() {
        let mut src = MemorySource::new();
        let a = src.append(None, grouped("A", "g1"), &mut ()).unwrap();
        src.append(None, grouped("B", "g2"), &mut ()).unwrap();
        src.append(None, grouped("C", "g1"), &mut ()).unwrap();
        let mut m = with_group(&src, "g1");

        let log = EventLog::new();
        m.subscribe(log.recorder());
        src.remove(a, &mut m).unwrap();

        assert_eq!(m.snapshot(&src).render(), "G1 [C], B");
        let g1 = m.index(None, 0);
        assert_eq!(
            log.events(),
            vec![
                ProxyEvent::RowsAboutToBeRemoved { parent: g1, first: 0, last: 0 },
                ProxyEvent::RowsRemoved { parent: g1, first: 0, last: 0 },
            ]
        );
    }

    #[test]
    fn test_remove_parent_of_adopted_descendant() {
        let mut src = MemorySource::new();
        let p = src
            .append(None, RecordSpec::named("P").child(grouped("P1", "g1")).child(RecordSpec::named("P2")), &mut ())
            .unwrap();
        let mut m = with_group(&src, "g1");
        assert_eq!(m.snapshot(&src).render(), "G1 [P1], P [P2]");

        let log = EventLog::new();
        m.subscribe(log.recorder());
        src.remove(p, &mut m).unwrap();

        assert_eq!(m.snapshot(&src).render(), "G1");
        assert_eq!(log.count("rows_removed"), 2);
        assert!(m.map_from_source(p).is_none());
        m.check_consistency(&src).unwrap();
    }

    #[test]
    fn test_remove_unmirrored_is_error() {
        let mut src = MemorySource::new();
        let a = src.append(None, RecordSpec::named("A"), &mut ()).unwrap();
        let mut m = model();

        let err = src.remove(a, &mut m).unwrap_err();
        assert_eq!(err, ModelError::UnknownSource(a));
    }

    #[test]
    fn test_insert_suppresses_duplicate_and_rehomes() {
        let mut src = MemorySource::new();
        src.append(None, grouped("A", "g1"), &mut ()).unwrap();
        let mut m = model();
        m.rebuild(&src).unwrap();
        m.register_synthetic_node(Box::new(
            GroupNode::new("group", "g1").with_label("G1").with_duplicate_attribute("id"),
        ));
        m.run_pending_tasks(&src).unwrap();
        assert_eq!(m.snapshot(&src).render(), "G1 [A]");

        let log = EventLog::new();
        m.subscribe(log.recorder());
        src.append(None, RecordSpec::named("Real G1").with("id", "g1"), &mut m).unwrap();

        assert_eq!(m.snapshot(&src).render(), "A, Real G1");
        let kinds: Vec<_> = log.events().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "rows_about_to_be_moved",
                "rows_moved",
                "rows_about_to_be_removed",
                "rows_removed",
                "rows_about_to_be_inserted",
                "rows_inserted",
            ]
        );
        m.check_consistency(&src).unwrap();
    }

    #[test]
    fn test_data_change_moves_into_and_out_of_group() {
        let mut src = MemorySource::new();
        src.append(None, grouped("A", "g1"), &mut ()).unwrap();
        let b = src.append(None, grouped("B", "g2"), &mut ()).unwrap();
        let mut m = with_group(&src, "g1");
        assert_eq!(m.snapshot(&src).render(), "G1 [A], B");

        let log = EventLog::new();
        m.subscribe(log.recorder());
        src.set_data(b, "group", "g1", &mut m).unwrap();
        assert_eq!(m.snapshot(&src).render(), "G1 [A, B]");
        assert_eq!(log.count("rows_moved"), 1);
        assert_eq!(log.count("data_changed"), 1);

        src.set_data(b, "group", "g3", &mut m).unwrap();
        assert_eq!(m.snapshot(&src).render(), "G1 [A], B");
        m.check_consistency(&src).unwrap();
    }

    #[test]
    fn test_data_change_in_place() {
        let mut src = MemorySource::new();
        let a = src.append(None, RecordSpec::named("A"), &mut ()).unwrap();
        let mut m = model();
        m.rebuild(&src).unwrap();

        let log = EventLog::new();
        m.subscribe(log.recorder());
        src.set_data(a, "color", "red", &mut m).unwrap();
        assert_eq!(log.events(), vec![ProxyEvent::DataChanged { parent: None, first: 0, last: 0 }]);
    }

    #[test]
    fn test_move_and_reset_rebuild() {
        let mut src = MemorySource::new();
        let a = src.append(None, grouped("A", "g1"), &mut ()).unwrap();
        let b = src.append(None, RecordSpec::named("B"), &mut ()).unwrap();
        let mut m = with_group(&src, "g1");
        let rebuilds = m.rebuild_count();

        let log = EventLog::new();
        m.subscribe(log.recorder());
        src.move_item(a, Some(b), 0, &mut m).unwrap();

        assert_eq!(log.events(), vec![ProxyEvent::ModelAboutToBeReset, ProxyEvent::ModelReset]);
        assert_eq!(m.rebuild_count(), rebuilds + 1);
        assert_eq!(m.snapshot(&src).render(), "G1 [A], B");
        m.check_consistency(&src).unwrap();

        src.reset(vec![grouped("X", "g1"), RecordSpec::named("Y")], &mut m).unwrap();
        assert_eq!(m.snapshot(&src).render(), "G1 [X], Y");
        assert_eq!(log.count("model_reset"), 2);
    }

    #[test]
    fn test_unpaired_and_nested_events() {
        let src = MemorySource::new();
        let mut m = model();

        let end = SourceEvent::RowsInserted { parent: None, first: 0, last: 0 };
        assert_eq!(
            m.source_event(&src, &end).unwrap_err(),
            ModelError::UnpairedSourceEvent { expected: "rows_about_to_be_inserted", got: "rows_inserted" }
        );

        m.source_event(&src, &SourceEvent::RowsAboutToBeInserted { parent: None, first: 0, last: 0 })
            .unwrap();
        assert_eq!(
            m.source_event(&src, &SourceEvent::AboutToBeReset).unwrap_err(),
            ModelError::NestedSourceEvent { open: "insert", got: "about_to_be_reset" }
        );
        assert_eq!(
            m.source_event(&src, &SourceEvent::Reset).unwrap_err(),
            ModelError::UnpairedSourceEvent { expected: "rows_inserted", got: "reset" }
        );
        assert_eq!(m.run_pending_tasks(&src).unwrap_err(), ModelError::SourceEditInProgress("insert"));
    }

    #[test]
    fn test_rows_out_of_range() {
        let src = MemorySource::new();
        let mut m = model();
        m.source_event(&src, &SourceEvent::RowsAboutToBeInserted { parent: None, first: 0, last: 0 })
            .unwrap();
        let err = m
            .source_event(&src, &SourceEvent::RowsInserted { parent: None, first: 0, last: 0 })
            .unwrap_err();
        assert_eq!(err, ModelError::RowsOutOfRange { first: 0, last: 0, len: 0 });
    }

    #[test]
    fn test_grouping_manager_creates_and_prunes() {
        let mut src = MemorySource::new();
        let mut m = model().with_node_manager(GroupingManager::new("group"));
        m.rebuild(&src).unwrap();

        let a = src.append(None, grouped("A", "g1"), &mut m).unwrap();
        assert!(m.has_pending_tasks());
        m.run_pending_tasks(&src).unwrap();
        assert_eq!(m.snapshot(&src).render(), "g1 [A]");

        // Second element with the same key: no new registration.
        src.append(None, grouped("B", "g1"), &mut m).unwrap();
        assert!(!m.has_pending_tasks());
        assert_eq!(m.snapshot(&src).render(), "g1 [A, B]");

        src.remove(a, &mut m).unwrap();
        assert_eq!(m.snapshot(&src).render(), "g1 [B]");

        let b = m.map_to_source(m.index(m.index(None, 0), 0).unwrap()).unwrap();
        src.remove(b, &mut m).unwrap();
        assert_eq!(m.snapshot(&src).render(), "");
        assert!(m.synthetic_nodes().is_empty());
        m.check_consistency(&src).unwrap();
    }

    #[test]
    fn test_grouping_manager_follows_key_change() {
        let mut src = MemorySource::new();
        let mut m = model().with_node_manager(GroupingManager::new("group"));
        m.rebuild(&src).unwrap();

        let a = src.append(None, grouped("A", "g1"), &mut m).unwrap();
        m.run_pending_tasks(&src).unwrap();

        src.set_data(a, "group", "g2", &mut m).unwrap();
        // Old group pruned at once, new one waits for the next turn.
        assert_eq!(m.snapshot(&src).render(), "A");
        m.run_pending_tasks(&src).unwrap();
        assert_eq!(m.snapshot(&src).render(), "g2 [A]");
        m.check_consistency(&src).unwrap();
    }
}
