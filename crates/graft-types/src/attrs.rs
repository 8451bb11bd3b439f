//! Well-known attribute names.
//!
//! Attributes are plain strings so source collections can carry arbitrary
//! domain data; these are the ones the model itself reads or writes.

/// Human-readable label.
pub const DISPLAY: &str = "display";

/// Checkable state (`Value::Bool`) of a synthetic node.
pub const CHECK_STATE: &str = "check_state";

/// Icon or decoration hint.
pub const DECORATION: &str = "decoration";

/// Tooltip text.
pub const TOOL_TIP: &str = "tool_tip";
