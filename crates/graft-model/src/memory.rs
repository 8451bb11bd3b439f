//! In-memory source collection.
//!
//! `MemorySource` is a plain hierarchical record store that speaks the full
//! source event protocol. Every mutating call takes the listener that should
//! observe it, and reports begin events before touching its state and end
//! events after.
//!
//! It is the reference implementation of [`SourceCollection`] and what the
//! tests drive the proxy with.

use std::collections::{BTreeMap, HashMap};

use graft_types::{attrs, SourceEvent, SourceRef, Value};

use crate::source::{SourceCollection, SourceListener};
use crate::{ModelError, Result};

// ============================================================================
// RecordSpec — description of a record subtree
// ============================================================================

/// A record and its children, ready to be inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSpec {
    pub attributes: BTreeMap<String, Value>,
    pub children: Vec<RecordSpec>,
}

impl RecordSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// A record with a display label.
    pub fn named(label: impl Into<String>) -> Self {
        let label: String = label.into();
        Self::new().with(attrs::DISPLAY, label)
    }

    /// Set an attribute.
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(attribute.into(), value.into());
        self
    }

    /// Append a child record.
    pub fn child(mut self, child: RecordSpec) -> Self {
        self.children.push(child);
        self
    }
}

// ============================================================================
// MemorySource
// ============================================================================

#[derive(Debug, Clone)]
struct Record {
    parent: Option<SourceRef>,
    children: Vec<SourceRef>,
    attributes: BTreeMap<String, Value>,
}

/// Hierarchical in-memory records with attribute maps.
#[derive(Debug, Default)]
pub struct MemorySource {
    /// Records indexed by ref.
    records: HashMap<SourceRef, Record>,
    /// Top-level records in order.
    top: Vec<SourceRef>,
    /// Next ref to issue. Refs are never reused.
    next_ref: u64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records at any depth.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record(&self, item: SourceRef) -> Result<&Record> {
        self.records.get(&item).ok_or(ModelError::UnknownSource(item))
    }

    fn siblings(&self, parent: Option<SourceRef>) -> Result<&Vec<SourceRef>> {
        match parent {
            None => Ok(&self.top),
            Some(p) => self.record(p).map(|r| &r.children),
        }
    }

    fn siblings_mut(&mut self, parent: Option<SourceRef>) -> Result<&mut Vec<SourceRef>> {
        match parent {
            None => Ok(&mut self.top),
            Some(p) => self
                .records
                .get_mut(&p)
                .map(|r| &mut r.children)
                .ok_or(ModelError::UnknownSource(p)),
        }
    }

    fn position(&self, item: SourceRef) -> Result<(Option<SourceRef>, usize)> {
        let parent = self.record(item)?.parent;
        let row = self
            .siblings(parent)?
            .iter()
            .position(|c| *c == item)
            .ok_or(ModelError::UnknownSource(item))?;
        Ok((parent, row))
    }

    /// Allocate `spec` and its children. The new record is not yet linked
    /// into its parent's child list.
    fn build(&mut self, parent: Option<SourceRef>, spec: RecordSpec) -> SourceRef {
        let id = SourceRef::new(self.next_ref);
        self.next_ref += 1;

        self.records.insert(
            id,
            Record {
                parent,
                children: Vec::new(),
                attributes: spec.attributes,
            },
        );

        for child in spec.children {
            let child_id = self.build(Some(id), child);
            if let Some(record) = self.records.get_mut(&id) {
                record.children.push(child_id);
            }
        }

        id
    }

    /// Drop `item` and its whole subtree from the record map.
    fn drop_subtree(&mut self, item: SourceRef) {
        let mut stack = vec![item];
        while let Some(id) = stack.pop() {
            if let Some(record) = self.records.remove(&id) {
                stack.extend(record.children);
            }
        }
    }

    // =========================================================================
    // Mutations (each reports through `listener`)
    // =========================================================================

    /// Insert `spec` (with its children) as child `row` of `parent`.
    pub fn insert(
        &mut self,
        parent: Option<SourceRef>,
        row: usize,
        spec: RecordSpec,
        listener: &mut dyn SourceListener,
    ) -> Result<SourceRef> {
        let len = self.siblings(parent)?.len();
        if row > len {
            return Err(ModelError::PositionOutOfBounds { pos: row, len });
        }

        listener.source_event(&*self, &SourceEvent::RowsAboutToBeInserted { parent, first: row, last: row })?;
        let id = self.build(parent, spec);
        self.siblings_mut(parent)?.insert(row, id);
        listener.source_event(&*self, &SourceEvent::RowsInserted { parent, first: row, last: row })?;

        Ok(id)
    }

    /// Insert `spec` as the last child of `parent`.
    pub fn append(
        &mut self,
        parent: Option<SourceRef>,
        spec: RecordSpec,
        listener: &mut dyn SourceListener,
    ) -> Result<SourceRef> {
        let row = self.siblings(parent)?.len();
        self.insert(parent, row, spec, listener)
    }

    /// Remove `item` and everything below it.
    pub fn remove(&mut self, item: SourceRef, listener: &mut dyn SourceListener) -> Result<()> {
        let (parent, row) = self.position(item)?;

        listener.source_event(&*self, &SourceEvent::RowsAboutToBeRemoved { parent, first: row, last: row })?;
        self.siblings_mut(parent)?.remove(row);
        self.drop_subtree(item);
        listener.source_event(&*self, &SourceEvent::RowsRemoved { parent, first: row, last: row })?;

        Ok(())
    }

    /// Move `item` under `dst_parent`.
    ///
    /// `dst_row` is in the destination's row numbering before the move, so
    /// moving down within the same parent names the row *after* the target
    /// slot. Moves onto the item's own slot are ignored.
    pub fn move_item(
        &mut self,
        item: SourceRef,
        dst_parent: Option<SourceRef>,
        dst_row: usize,
        listener: &mut dyn SourceListener,
    ) -> Result<()> {
        let (src_parent, row) = self.position(item)?;

        let mut ancestor = dst_parent;
        while let Some(a) = ancestor {
            if a == item {
                return Err(ModelError::InvalidSourceMove(item));
            }
            ancestor = self.record(a)?.parent;
        }

        let len = self.siblings(dst_parent)?.len();
        if dst_row > len {
            return Err(ModelError::PositionOutOfBounds { pos: dst_row, len });
        }
        let same_parent = src_parent == dst_parent;
        if same_parent && (dst_row == row || dst_row == row + 1) {
            return Ok(());
        }

        let begin = SourceEvent::RowsAboutToBeMoved { src_parent, first: row, last: row, dst_parent, dst_row };
        listener.source_event(&*self, &begin)?;

        self.siblings_mut(src_parent)?.remove(row);
        let insert_at = if same_parent && dst_row > row { dst_row - 1 } else { dst_row };
        self.siblings_mut(dst_parent)?.insert(insert_at, item);
        if let Some(record) = self.records.get_mut(&item) {
            record.parent = dst_parent;
        }

        let end = SourceEvent::RowsMoved { src_parent, first: row, last: row, dst_parent, dst_row };
        listener.source_event(&*self, &end)?;

        Ok(())
    }

    /// Set one attribute of `item`.
    pub fn set_data(
        &mut self,
        item: SourceRef,
        attribute: &str,
        value: impl Into<Value>,
        listener: &mut dyn SourceListener,
    ) -> Result<()> {
        let (parent, row) = self.position(item)?;
        if let Some(record) = self.records.get_mut(&item) {
            record.attributes.insert(attribute.to_string(), value.into());
        }
        listener.source_event(&*self, &SourceEvent::DataChanged { parent, first: row, last: row })
    }

    /// Replace the whole collection.
    pub fn reset(&mut self, top: Vec<RecordSpec>, listener: &mut dyn SourceListener) -> Result<()> {
        listener.source_event(&*self, &SourceEvent::AboutToBeReset)?;

        self.records.clear();
        self.top.clear();
        for spec in top {
            let id = self.build(None, spec);
            self.top.push(id);
        }

        listener.source_event(&*self, &SourceEvent::Reset)
    }
}

impl SourceCollection for MemorySource {
    fn children(&self, parent: Option<SourceRef>) -> Vec<SourceRef> {
        self.siblings(parent).cloned().unwrap_or_default()
    }

    fn parent(&self, item: SourceRef) -> Option<SourceRef> {
        self.records.get(&item).and_then(|r| r.parent)
    }

    fn contains(&self, item: SourceRef) -> bool {
        self.records.contains_key(&item)
    }

    fn data(&self, item: SourceRef, attribute: &str) -> Option<Value> {
        self.records.get(&item).and_then(|r| r.attributes.get(attribute).cloned())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Listener that records every event it sees along with the row count of
    /// the top level at that moment.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<(SourceEvent, usize)>,
    }

    impl SourceListener for Recorder {
        fn source_event(&mut self, source: &dyn SourceCollection, event: &SourceEvent) -> Result<()> {
            self.seen.push((event.clone(), source.children(None).len()));
            Ok(())
        }
    }

    #[test]
    fn test_insert_reports_begin_before_mutation() {
        let mut src = MemorySource::new();
        let mut rec = Recorder::default();

        let a = src.append(None, RecordSpec::named("A"), &mut rec).unwrap();

        assert_eq!(rec.seen.len(), 2);
        assert_eq!(rec.seen[0], (SourceEvent::RowsAboutToBeInserted { parent: None, first: 0, last: 0 }, 0));
        assert_eq!(rec.seen[1], (SourceEvent::RowsInserted { parent: None, first: 0, last: 0 }, 1));
        assert_eq!(src.data(a, attrs::DISPLAY), Some(Value::from("A")));
    }

    #[test]
    fn test_insert_subtree_builds_children() {
        let mut src = MemorySource::new();
        let spec = RecordSpec::named("A").child(RecordSpec::named("A1")).child(RecordSpec::named("A2"));
        let a = src.append(None, spec, &mut ()).unwrap();

        let kids = src.children(Some(a));
        assert_eq!(kids.len(), 2);
        assert_eq!(src.parent(kids[0]), Some(a));
        assert_eq!(src.len(), 3);
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut src = MemorySource::new();
        let spec = RecordSpec::named("A").child(RecordSpec::named("A1").child(RecordSpec::named("A1x")));
        let a = src.append(None, spec, &mut ()).unwrap();
        let b = src.append(None, RecordSpec::named("B"), &mut ()).unwrap();

        let mut rec = Recorder::default();
        src.remove(a, &mut rec).unwrap();

        assert_eq!(src.len(), 1);
        assert_eq!(src.children(None), vec![b]);
        assert_eq!(rec.seen[0].1, 2, "begin must see the old state");
        assert_eq!(rec.seen[1].1, 1);
    }

    #[test]
    fn test_insert_out_of_bounds() {
        let mut src = MemorySource::new();
        let err = src.insert(None, 3, RecordSpec::new(), &mut ()).unwrap_err();
        assert_eq!(err, ModelError::PositionOutOfBounds { pos: 3, len: 0 });
    }

    #[test]
    fn test_move_within_parent_uses_pre_move_rows() {
        let mut src = MemorySource::new();
        let a = src.append(None, RecordSpec::named("A"), &mut ()).unwrap();
        let b = src.append(None, RecordSpec::named("B"), &mut ()).unwrap();
        let c = src.append(None, RecordSpec::named("C"), &mut ()).unwrap();

        // A to the end: destination row 3 in pre-move numbering.
        src.move_item(a, None, 3, &mut ()).unwrap();
        assert_eq!(src.children(None), vec![b, c, a]);

        // No-op move onto own slot.
        let mut rec = Recorder::default();
        src.move_item(c, None, 1, &mut rec).unwrap();
        assert!(rec.seen.is_empty());
    }

    #[test]
    fn test_move_into_own_subtree_rejected() {
        let mut src = MemorySource::new();
        let a = src.append(None, RecordSpec::named("A"), &mut ()).unwrap();
        let a1 = src.append(Some(a), RecordSpec::named("A1"), &mut ()).unwrap();

        let err = src.move_item(a, Some(a1), 0, &mut ()).unwrap_err();
        assert_eq!(err, ModelError::InvalidSourceMove(a));
    }

    #[test]
    fn test_set_data_reports_row() {
        let mut src = MemorySource::new();
        let _a = src.append(None, RecordSpec::named("A"), &mut ()).unwrap();
        let b = src.append(None, RecordSpec::named("B"), &mut ()).unwrap();

        let mut rec = Recorder::default();
        src.set_data(b, "group", "g1", &mut rec).unwrap();

        assert_eq!(rec.seen[0].0, SourceEvent::DataChanged { parent: None, first: 1, last: 1 });
        assert_eq!(src.data(b, "group"), Some(Value::from("g1")));
    }

    #[test]
    fn test_reset_replaces_everything() {
        let mut src = MemorySource::new();
        src.append(None, RecordSpec::named("A"), &mut ()).unwrap();

        let mut rec = Recorder::default();
        src.reset(vec![RecordSpec::named("X"), RecordSpec::named("Y")], &mut rec).unwrap();

        assert_eq!(src.len(), 2);
        assert_eq!(rec.seen[0], (SourceEvent::AboutToBeReset, 1));
        assert_eq!(rec.seen[1], (SourceEvent::Reset, 2));
    }
}
