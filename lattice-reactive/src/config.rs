//! Runtime Configuration
//!
//! Tunables for the scheduler and the watch layer. The configuration is
//! per-thread, like the rest of the runtime: install it on the thread that
//! owns the reactive graph.
//!
//! ```rust,ignore
//! use lattice_reactive::RuntimeConfig;
//!
//! RuntimeConfig::from_json(r#"{ "recursion_limit": 50 }"#)?.install();
//! ```

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::error::Result;

thread_local! {
    static CONFIG: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::default());
}

/// Per-thread runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many times a single job may run within one flush before the
    /// scheduler gives up on it.
    pub recursion_limit: usize,

    /// Default depth used by deep watchers when traversing a reactive object.
    pub traverse_depth: usize,

    /// Emit a warning when a write hits a readonly view.
    pub warn_on_readonly_write: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            recursion_limit: 100,
            traverse_depth: usize::MAX,
            warn_on_readonly_write: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Make this the active configuration for the current thread.
    pub fn install(self) {
        CONFIG.with(|config| *config.borrow_mut() = self);
    }
}

/// The configuration active on the current thread.
pub fn current() -> RuntimeConfig {
    CONFIG.with(|config| config.borrow().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RuntimeConfig::default();
        assert_eq!(config.recursion_limit, 100);
        assert_eq!(config.traverse_depth, usize::MAX);
        assert!(config.warn_on_readonly_write);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = RuntimeConfig::from_json(r#"{ "recursion_limit": 7 }"#).unwrap();
        assert_eq!(config.recursion_limit, 7);
        assert_eq!(config.traverse_depth, usize::MAX);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = RuntimeConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, crate::ReactiveError::Config(_)));
    }

    #[test]
    fn install_is_visible_to_current() {
        RuntimeConfig {
            recursion_limit: 3,
            ..RuntimeConfig::default()
        }
        .install();
        assert_eq!(current().recursion_limit, 3);
        RuntimeConfig::default().install();
    }

    #[test]
    fn json_roundtrip_preserves_fields() {
        let config = RuntimeConfig {
            recursion_limit: 12,
            traverse_depth: 4,
            warn_on_readonly_write: false,
        };
        let parsed = RuntimeConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
