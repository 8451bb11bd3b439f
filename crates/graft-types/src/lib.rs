//! Shared identity and event types for graft.
//!
//! This crate is the relational foundation: typed IDs for proxy nodes, source
//! elements and stable handles, plus the two event vocabularies that flow
//! through a reparenting proxy. It has **no internal graft dependencies**: a
//! pure leaf crate that the model crate builds on.
//!
//! # Flow Overview
//!
//! ```text
//! Source collection (SourceRef)
//!     └── emits SourceEvent (rows inserted/removed/moved, data, reset)
//!             │
//!             ▼
//!     ReparentingModel (NodeId arena)
//!             │
//!             ▼
//!     emits ProxyEvent (same vocabulary, proxy addresses)
//!             │
//!             ▼
//!     Observers (views, StableHandle holders via HandleId)
//! ```
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`NodeId`]        | Arena slot + generation of a proxy node      |
//! | [`SourceRef`]     | Opaque reference into the source collection  |
//! | [`HandleId`]      | Caller-held stable handle identity           |
//! | [`SourceEvent`]   | Structural events consumed from the source   |
//! | [`ProxyEvent`]    | Structural events emitted to observers       |
//! | [`Value`]         | Attribute value (JSON)                       |
//! |-------------------|----------------------------------------------|

pub mod attrs;
pub mod event;
pub mod ids;

pub use event::{ProxyEvent, SourceEvent};
pub use ids::{HandleId, NodeId, SourceRef};

/// Attribute values exchanged with the source collection and synthetic nodes.
pub use serde_json::Value;

/// Upper bound on parent-chain length and walk depth.
///
/// Any traversal that reaches this depth is treated as corruption (a cycle or a
/// runaway tree) and circuit-breaks.
pub const MAX_TREE_DEPTH: usize = 512;
