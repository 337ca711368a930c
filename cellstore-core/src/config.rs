//! Store Options
//!
//! Options are plain serde structs so they can be embedded in a host
//! application's own configuration file and handed to [`Definition::with_options`].
//!
//! [`Definition::with_options`]: crate::store::Definition::with_options

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What to do when an update targets a key that is not a base field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPolicy {
    /// Fail the whole batch with `StoreError::InvalidActionTarget`.
    #[default]
    Reject,

    /// Drop the offending key, log a warning, and apply the rest.
    Ignore,
}

/// Per-store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Name attached to every log event emitted by the store.
    pub name: String,

    /// Handling of unknown or non-base keys in action updates.
    pub target_policy: TargetPolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            target_policy: TargetPolicy::Reject,
        }
    }
}

impl StoreOptions {
    /// Options with the given store name and default policy.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the target policy.
    pub fn with_target_policy(mut self, policy: TargetPolicy) -> Self {
        self.target_policy = policy;
        self
    }

    /// Parse options from a JSON document. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
