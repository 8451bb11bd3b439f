//! End-to-end behavior of the reparenting proxy over a `MemorySource`.
//!
//! # Tiers
//!
//! - **Tier 1:** The grouping walkthrough: register, insert, remove,
//!   re-register, with the exact observer event stream
//! - **Tier 2:** Properties: adoption priority, coalesced registration,
//!   stable handles, duplicate suppression, rebuild idempotence

use graft_model::{
    EventLog, GroupNode, MemorySource, ModelConfig, ModelError, ProxyEvent, RecordSpec, Registration,
    ReparentingModel, SourceRef, SyntheticNode,
};

// ============================================================================
// Shared test setup
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn grouped(label: &str, key: &str) -> RecordSpec {
    RecordSpec::named(label).with("attr", key)
}

fn g(key: &str) -> Box<dyn SyntheticNode> {
    Box::new(GroupNode::new("attr", key).with_label(key.to_uppercase()))
}

/// Source `{A: g1, B: g2}` with a validating model attached to it.
fn setup() -> (MemorySource, ReparentingModel, SourceRef, SourceRef) {
    init_tracing();
    let mut source = MemorySource::new();
    let a = source.append(None, grouped("A", "g1"), &mut ()).unwrap();
    let b = source.append(None, grouped("B", "g2"), &mut ()).unwrap();

    let mut model = ReparentingModel::new(ModelConfig::default().with_validation(true));
    model.rebuild(&source).unwrap();
    (source, model, a, b)
}

/// Begin/end events must pair up without nesting.
fn assert_well_paired(events: &[ProxyEvent]) {
    let mut open: Option<&ProxyEvent> = None;
    for event in events {
        if event.is_begin() {
            assert!(open.is_none(), "{} nested inside {:?}", event.kind(), open);
            open = Some(event);
        } else if event.is_end() {
            assert!(open.is_some(), "{} without begin", event.kind());
            open = None;
        } else {
            assert!(open.is_none(), "{} inside an open pair", event.kind());
        }
    }
    assert!(open.is_none(), "unterminated pair");
}

// ============================================================================
// Tier 1: walkthrough
// ============================================================================

#[test]
fn test_grouping_walkthrough() {
    let (mut source, mut model, a, _b) = setup();
    let log = EventLog::new();
    model.subscribe(log.recorder());

    // Register G1: nothing happens until the deferred turn.
    assert_eq!(model.register_synthetic_node(g("g1")), Registration::Queued);
    assert!(log.is_empty());
    assert_eq!(model.run_pending_tasks(&source).unwrap(), 1);
    assert_eq!(model.snapshot(&source).render(), "G1 [A], B");
    assert_eq!(log.take(), vec![ProxyEvent::ModelAboutToBeReset, ProxyEvent::ModelReset]);

    // Insert C with the same key: lands inside G1, after A.
    source.append(None, grouped("C", "g1"), &mut model).unwrap();
    assert_eq!(model.snapshot(&source).render(), "G1 [A, C], B");
    let g1 = model.index(None, 0);
    assert_eq!(
        log.take(),
        vec![
            ProxyEvent::RowsAboutToBeInserted { parent: g1, first: 1, last: 1 },
            ProxyEvent::RowsInserted { parent: g1, first: 1, last: 1 },
        ]
    );

    // Remove A.
    source.remove(a, &mut model).unwrap();
    assert_eq!(model.snapshot(&source).render(), "G1 [C], B");
    assert_eq!(
        log.take(),
        vec![
            ProxyEvent::RowsAboutToBeRemoved { parent: g1, first: 0, last: 0 },
            ProxyEvent::RowsRemoved { parent: g1, first: 0, last: 0 },
        ]
    );

    // Equal registration: no rebuild, no events.
    let rebuilds = model.rebuild_count();
    assert_eq!(model.register_synthetic_node(g("g1")), Registration::Duplicate);
    assert_eq!(model.run_pending_tasks(&source).unwrap(), 0);
    assert_eq!(model.rebuild_count(), rebuilds);
    assert!(log.is_empty());
    assert_eq!(model.snapshot(&source).render(), "G1 [C], B");

    model.check_consistency(&source).unwrap();
}

// ============================================================================
// Tier 2: properties
// ============================================================================

#[test]
fn test_adoption_takes_priority_over_natural_parent() {
    let (mut source, mut model, _a, _b) = setup();
    model.register_synthetic_node(g("g3"));
    model.run_pending_tasks(&source).unwrap();

    let d = source.append(None, grouped("D", "g3"), &mut model).unwrap();
    let mirror = model.map_from_source(d).unwrap();
    let parent = model.parent(mirror).unwrap();

    assert_eq!(parent, Some(model.synthetic_nodes()[0]));
    assert_ne!(parent, None);
}

#[test]
fn test_registrations_in_one_turn_coalesce() {
    let (source, mut model, _a, _b) = setup();
    let log = EventLog::new();
    model.subscribe(log.recorder());
    let before = model.rebuild_count();

    model.register_synthetic_node(g("g1"));
    model.register_synthetic_node(g("g2"));
    assert!(model.has_pending_tasks());
    assert_eq!(model.run_pending_tasks(&source).unwrap(), 1);

    assert_eq!(model.rebuild_count(), before + 1);
    assert_eq!(log.count("model_about_to_be_reset"), 1);
    assert_eq!(log.count("model_reset"), 1);
    assert_eq!(model.snapshot(&source).render(), "G1 [A], G2 [B]");
}

#[test]
fn test_stable_handle_follows_and_invalidates() {
    let (mut source, mut model, a, b) = setup();
    let a1 = source.append(Some(a), RecordSpec::named("A1"), &mut model).unwrap();

    // Handles on B (root row 1) and on A1 (under A).
    let hb = model.create_handle(None, 1).unwrap();
    let a_node = model.map_from_source(a);
    let ha1 = model.create_handle(a_node, 0).unwrap();

    // Sibling insert before B shifts its row, the handle follows.
    source.insert(None, 0, RecordSpec::named("Z"), &mut model).unwrap();
    let pos = model.resolve_handle(&hb).unwrap();
    assert_eq!(pos.row, 2);
    assert_eq!(model.map_to_source(pos.node), Some(b));
    assert_eq!(model.map_to_source(model.resolve_handle(&ha1).unwrap().node), Some(a1));

    // Removing an ancestor of the target invalidates it for good.
    source.remove(a, &mut model).unwrap();
    let err = model.resolve_handle(&ha1).unwrap_err();
    assert_eq!(err, ModelError::StaleHandle(ha1.id));

    // Refilling the freed slots doesn't resurrect it.
    source.append(None, RecordSpec::named("Y"), &mut model).unwrap();
    source.append(None, RecordSpec::named("X"), &mut model).unwrap();
    assert!(model.resolve_handle(&ha1).is_err());
    assert_eq!(model.resolve_handle(&hb).unwrap().row, 1);
}

#[test]
fn test_duplicate_never_shown_with_its_element() {
    let (mut source, mut model, _a, _b) = setup();
    let dup = GroupNode::new("attr", "proj").with_label("PROJ").with_duplicate_attribute("id");
    model.register_synthetic_node(Box::new(dup.clone()));
    model.run_pending_tasks(&source).unwrap();
    assert_eq!(model.snapshot(&source).render(), "PROJ, A, B");

    // The element appears nested: the duplicate goes before the insert pair.
    let log = EventLog::new();
    model.subscribe(log.recorder());
    let holder = source
        .append(None, RecordSpec::named("H").child(RecordSpec::named("Project").with("id", "proj")), &mut model)
        .unwrap();
    assert_eq!(model.snapshot(&source).render(), "A, B, H [Project]");
    let kinds: Vec<_> = log.events().iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec!["rows_about_to_be_removed", "rows_removed", "rows_about_to_be_inserted", "rows_inserted"]
    );

    // Re-registering while the element exists is suppressed at rebuild.
    model.register_synthetic_node(Box::new(dup));
    model.run_pending_tasks(&source).unwrap();
    assert_eq!(model.snapshot(&source).render(), "A, B, H [Project]");
    model.check_consistency(&source).unwrap();

    source.remove(holder, &mut model).unwrap();
    assert_eq!(model.snapshot(&source).render(), "A, B");
    assert_well_paired(&log.events());
}

#[test]
fn test_rebuild_after_incremental_edits_is_identity() {
    let (mut source, mut model, a, b) = setup();
    model.register_synthetic_node(g("g1"));
    model.register_synthetic_node(g("g2"));
    model.run_pending_tasks(&source).unwrap();

    let c = source.append(Some(a), grouped("C", "g2"), &mut model).unwrap();
    source.append(Some(c), RecordSpec::named("C1"), &mut model).unwrap();
    source.insert(None, 0, grouped("D", "g1"), &mut model).unwrap();
    source.set_data(b, "attr", "g1", &mut model).unwrap();
    model.check_consistency(&source).unwrap();

    let incremental = model.snapshot(&source);
    assert_eq!(incremental.render(), "G1 [D, A, B], G2 [C [C1]]");

    model.rebuild(&source).unwrap();
    assert_eq!(model.snapshot(&source), incremental);

    let mut fresh = ReparentingModel::new(ModelConfig::default().with_validation(true));
    fresh.set_synthetic_nodes(vec![g("g1"), g("g2")]);
    fresh.run_pending_tasks(&source).unwrap();
    assert_eq!(fresh.snapshot(&source), incremental);
}

#[test]
fn test_event_stream_is_well_paired() {
    let (mut source, mut model, a, b) = setup();
    let log = EventLog::new();
    model.subscribe(log.recorder());

    model.register_synthetic_node(Box::new(
        GroupNode::new("attr", "g1").with_label("G1").with_duplicate_attribute("id"),
    ));
    model.run_pending_tasks(&source).unwrap();
    source.append(Some(b), grouped("B1", "g1"), &mut model).unwrap();
    source.set_data(a, "attr", "none", &mut model).unwrap();
    source.append(None, RecordSpec::named("Real").with("id", "g1"), &mut model).unwrap();
    source.move_item(a, Some(b), 0, &mut model).unwrap();
    source.remove(b, &mut model).unwrap();

    assert_well_paired(&log.events());
    model.check_consistency(&source).unwrap();
}
