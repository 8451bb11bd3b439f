//! Grouping by attribute value.
//!
//! [`GroupNode`] is the stock synthetic node: it adopts every source element
//! whose `attribute` equals its key. [`GroupingManager`] keeps one group per
//! distinct key in the source and drops groups nobody belongs to anymore.

use std::any::Any;

use graft_types::{attrs, Value};

use crate::manager::{NodeManager, NodeRequests};
use crate::node::SyntheticNode;
use crate::source::SourceItem;

/// Attribute under which a group exposes its key.
pub const GROUP_KEY: &str = "group_key";

/// Synthetic node adopting elements by attribute value.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    attribute: String,
    key: Value,
    label: Option<String>,
    /// `Some` when the group is checkable.
    checked: Option<bool>,
    /// When set, the group is a duplicate of any element whose value for
    /// this attribute equals the key (the element *is* the group).
    duplicate_attribute: Option<String>,
}

impl GroupNode {
    pub fn new(attribute: impl Into<String>, key: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            key: key.into(),
            label: None,
            checked: None,
            duplicate_attribute: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Make the group checkable, starting in `checked` state.
    pub fn checkable(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    pub fn with_duplicate_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.duplicate_attribute = Some(attribute.into());
        self
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    fn display(&self) -> String {
        match (&self.label, &self.key) {
            (Some(label), _) => label.clone(),
            (None, Value::String(s)) => s.clone(),
            (None, other) => other.to_string(),
        }
    }
}

impl SyntheticNode for GroupNode {
    fn equals(&self, other: &dyn SyntheticNode) -> bool {
        other
            .as_any()
            .downcast_ref::<GroupNode>()
            .is_some_and(|o| o.attribute == self.attribute && o.key == self.key)
    }

    fn adopts(&self, item: &SourceItem<'_>) -> bool {
        item.data(&self.attribute).is_some_and(|v| v == self.key)
    }

    fn is_duplicate_of(&self, item: &SourceItem<'_>) -> bool {
        self.duplicate_attribute
            .as_deref()
            .and_then(|attr| item.data(attr))
            .is_some_and(|v| v == self.key)
    }

    fn data(&self, attribute: &str) -> Option<Value> {
        match attribute {
            attrs::DISPLAY => Some(Value::String(self.display())),
            attrs::CHECK_STATE => self.checked.map(Value::Bool),
            GROUP_KEY => Some(self.key.clone()),
            _ => None,
        }
    }

    fn set_data(&mut self, attribute: &str, value: Value) -> bool {
        match (attribute, value) {
            (attrs::DISPLAY, Value::String(s)) => {
                self.label = Some(s);
                true
            }
            (attrs::CHECK_STATE, Value::Bool(b)) if self.checked.is_some() => {
                self.checked = Some(b);
                true
            }
            _ => false,
        }
    }

    fn is_checkable(&self) -> bool {
        self.checked.is_some()
    }

    fn update(&mut self, other: &dyn SyntheticNode) -> bool {
        let Some(other) = other.as_any().downcast_ref::<GroupNode>() else {
            return false;
        };
        if other.label.is_none() || other.label == self.label {
            return false;
        }
        self.label = other.label.clone();
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// GroupingManager
// ============================================================================

/// Keeps a [`GroupNode`] for every distinct value of `attribute`.
///
/// Registers a group when an inserted or updated element carries a key no
/// group exists for. On update and removal, prunes its groups (those on the
/// same attribute) that have no adoptees left.
#[derive(Debug, Clone)]
pub struct GroupingManager {
    attribute: String,
}

impl GroupingManager {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }

    fn register_for(&self, item: &SourceItem<'_>, nodes: &mut NodeRequests<'_>) {
        match item.data(&self.attribute) {
            None | Some(Value::Null) => {}
            Some(key) => nodes.register(Box::new(GroupNode::new(self.attribute.clone(), key))),
        }
    }

    fn prune(&self, nodes: &mut NodeRequests<'_>) {
        let empty: Vec<GroupNode> = nodes
            .synthetic_nodes()
            .filter_map(|s| s.as_any().downcast_ref::<GroupNode>())
            .filter(|g| g.attribute == self.attribute)
            .filter(|g| nodes.adoptee_count(*g) == 0)
            .cloned()
            .collect();

        for group in empty {
            tracing::debug!(key = %group.key, "pruning empty group");
            nodes.remove(Box::new(group));
        }
    }
}

impl NodeManager for GroupingManager {
    fn check_insert(&mut self, item: &SourceItem<'_>, nodes: &mut NodeRequests<'_>) {
        self.register_for(item, nodes);
    }

    fn check_update(&mut self, item: &SourceItem<'_>, nodes: &mut NodeRequests<'_>) {
        self.register_for(item, nodes);
        self.prune(nodes);
    }

    fn check_removal(&mut self, _item: &SourceItem<'_>, nodes: &mut NodeRequests<'_>) {
        self.prune(nodes);
    }
}
