//! Point-in-time views of the proxy tree.

use serde::{Deserialize, Serialize};

use graft_types::{attrs, SourceRef, Value};

/// What a snapshot node stands for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "source", rename_all = "snake_case")]
pub enum SnapshotKind {
    Source(SourceRef),
    Synthetic,
}

/// One node in a [`TreeSnapshot`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub label: String,
    pub kind: SnapshotKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SnapshotNode>,
}

/// Nested copy of the proxy tree, top-level rows first.
///
/// Two snapshots compare equal iff the trees have the same shape, the same
/// node kinds and the same labels in the same order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub roots: Vec<SnapshotNode>,
}

impl TreeSnapshot {
    /// Compact one-line form: `G1 [A, C], B`.
    pub fn render(&self) -> String {
        render_list(&self.roots)
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        fn count(nodes: &[SnapshotNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.roots)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

fn render_list(nodes: &[SnapshotNode]) -> String {
    nodes.iter().map(render_node).collect::<Vec<_>>().join(", ")
}

fn render_node(node: &SnapshotNode) -> String {
    if node.children.is_empty() {
        node.label.clone()
    } else {
        format!("{} [{}]", node.label, render_list(&node.children))
    }
}

/// Display label for a value read under [`attrs::DISPLAY`].
pub(crate) fn label_of(value: Option<Value>, fallback: impl FnOnce() -> String) -> String {
    match value {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => fallback(),
        Some(other) => other.to_string(),
    }
}

/// Label for a source element.
pub(crate) fn source_label(source: &dyn crate::source::SourceCollection, item: SourceRef) -> String {
    label_of(source.data(item, attrs::DISPLAY), || item.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(label: &str, n: u64) -> SnapshotNode {
        SnapshotNode {
            label: label.to_string(),
            kind: SnapshotKind::Source(SourceRef::new(n)),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_render_nested() {
        let snap = TreeSnapshot {
            roots: vec![
                SnapshotNode {
                    label: "G1".into(),
                    kind: SnapshotKind::Synthetic,
                    children: vec![leaf("A", 0), leaf("C", 2)],
                },
                leaf("B", 1),
            ],
        };
        assert_eq!(snap.render(), "G1 [A, C], B");
        assert_eq!(snap.len(), 4);
    }

    #[test]
    fn test_empty() {
        let snap = TreeSnapshot::default();
        assert!(snap.is_empty());
        assert_eq!(snap.render(), "");
    }

    #[test]
    fn test_serializes_kind_tag() {
        let json = serde_json::to_value(leaf("A", 3)).unwrap();
        assert_eq!(json["kind"]["type"], "source");
        assert_eq!(json["kind"]["source"], 3);
        assert!(json.get("children").is_none());
    }

    #[test]
    fn test_label_fallback() {
        assert_eq!(label_of(None, || "S4".into()), "S4");
        assert_eq!(label_of(Some(Value::from(7)), || unreachable!()), "7");
    }
}
