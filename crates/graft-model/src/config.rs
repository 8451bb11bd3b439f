//! Model configuration.
//!
//! Loaded from defaults, a TOML fragment, or environment variables:
//!
//! ```toml
//! validate_edits = true
//! max_depth = 256
//! ```
//!
//! | Variable               | Field            |
//! |------------------------|------------------|
//! | `GRAFT_VALIDATE_EDITS` | `validate_edits` |
//! | `GRAFT_MAX_DEPTH`      | `max_depth`      |

use serde::{Deserialize, Serialize};

use graft_types::MAX_TREE_DEPTH;

use crate::{ModelError, Result};

/// Configuration for a [`ReparentingModel`](crate::ReparentingModel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Run the full tree validator after every structural edit and panic on
    /// the first violation. On by default in debug builds.
    pub validate_edits: bool,

    /// Parent-chain bound used by the validator.
    pub max_depth: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            validate_edits: cfg!(debug_assertions),
            max_depth: MAX_TREE_DEPTH,
        }
    }
}

impl ModelConfig {
    /// Parse a TOML fragment. Missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ModelError::Config(e.to_string()))?;
        config.checked()
    }

    /// Defaults overridden by `GRAFT_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("GRAFT_VALIDATE_EDITS") {
            config.validate_edits = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Ok(v) = std::env::var("GRAFT_MAX_DEPTH") {
            match v.parse::<usize>() {
                Ok(depth) if depth > 0 => config.max_depth = depth,
                _ => tracing::warn!(value = %v, "ignoring invalid GRAFT_MAX_DEPTH"),
            }
        }

        config
    }

    /// Enable or disable per-edit validation.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_edits = enabled;
        self
    }

    fn checked(self) -> Result<Self> {
        if self.max_depth == 0 {
            return Err(ModelError::Config("max_depth must be at least 1".to_string()));
        }
        Ok(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_depth_matches_tree_bound() {
        let config = ModelConfig::default();
        assert_eq!(config.max_depth, MAX_TREE_DEPTH);
        assert_eq!(config.validate_edits, cfg!(debug_assertions));
    }

    #[test]
    fn test_from_toml_partial_keeps_defaults() {
        let config = ModelConfig::from_toml("validate_edits = true").unwrap();
        assert!(config.validate_edits);
        assert_eq!(config.max_depth, MAX_TREE_DEPTH);

        let config = ModelConfig::from_toml("max_depth = 16\nvalidate_edits = false").unwrap();
        assert_eq!(config.max_depth, 16);
        assert!(!config.validate_edits);
    }

    #[test]
    fn test_from_toml_rejects_zero_depth() {
        let err = ModelConfig::from_toml("max_depth = 0").unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(ModelConfig::from_toml("max_depth = \"deep\"").is_err());
    }
}
