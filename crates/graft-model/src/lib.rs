//! Reparenting tree proxy.
//!
//! Presents a live hierarchical source collection as an augmented tree:
//! synthetic nodes (groups, pinned collections) are spliced in under the root,
//! and any source element a synthetic node claims is shown under it instead of
//! under its natural parent. The proxy tracks every source edit incrementally
//! and tells its observers about each change with the same begin/end protocol
//! the source uses.
//!
//! # Design Philosophy
//!
//! - **Arena, not pointers**: nodes live in a [`NodeTree`] and refer to each
//!   other by generation-checked [`NodeId`]s. Callers hold ids or
//!   [`StableHandle`]s, never references.
//! - **Closed node kinds**: a node is the root, a source mirror, or a
//!   synthetic node whose rules are a [`SyntheticNode`] capability object.
//! - **Deferred registration**: new synthetic nodes are queued and applied by
//!   one coalesced rebuild on the next turn, so registration is safe from
//!   inside a source callback.
//! - **One owner**: the model is the only thing that mutates the tree.
//!
//! # Usage
//!
//! ```
//! use graft_model::{GroupNode, MemorySource, ModelConfig, RecordSpec, ReparentingModel};
//!
//! let mut source = MemorySource::new();
//! source.append(None, RecordSpec::named("A").with("group", "g1"), &mut ()).unwrap();
//! source.append(None, RecordSpec::named("B").with("group", "g2"), &mut ()).unwrap();
//!
//! let mut model = ReparentingModel::new(ModelConfig::default());
//! model.rebuild(&source).unwrap();
//! model.register_synthetic_node(Box::new(GroupNode::new("group", "g1").with_label("G1")));
//! model.run_pending_tasks(&source).unwrap();
//! assert_eq!(model.snapshot(&source).render(), "G1 [A], B");
//!
//! source.append(None, RecordSpec::named("C").with("group", "g1"), &mut model).unwrap();
//! assert_eq!(model.snapshot(&source).render(), "G1 [A, C], B");
//! ```

mod config;
mod error;
mod group;
mod handles;
mod manager;
pub mod memory;
mod model;
mod node;
mod observer;
mod snapshot;
pub mod source;
mod tasks;
mod translate;
mod tree;

pub use config::ModelConfig;
pub use error::ModelError;
pub use group::{GroupNode, GroupingManager, GROUP_KEY};
pub use handles::{HandlePosition, HandleRegistry, StableHandle};
pub use manager::{NodeManager, NodeRequest, NodeRequests, NoopNodeManager};
pub use memory::{MemorySource, RecordSpec};
pub use model::{Buddy, Registration, ReparentingModel};
pub use node::{Node, NodeKind, SyntheticNode};
pub use observer::{EventLog, ProxyObserver};
pub use snapshot::{SnapshotKind, SnapshotNode, TreeSnapshot};
pub use source::{SourceCollection, SourceItem, SourceListener};
pub use tasks::{Task, TaskQueue};
pub use tree::NodeTree;

pub use graft_types::{attrs, HandleId, NodeId, ProxyEvent, SourceEvent, SourceRef, Value};

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ModelError>;
