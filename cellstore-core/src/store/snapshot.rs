//! Base-field snapshots.
//!
//! A snapshot holds the current value of every base field, keyed by field
//! name in definition order. Derived fields and actions are never included;
//! they are reconstructed from the base fields.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::action::Partial;
use crate::error::Result;

/// Values of all base fields at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot<V>(IndexMap<String, V>);

impl<V> Snapshot<V> {
    /// Value of a base field.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.get(key)
    }

    /// Number of base fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the store has no base fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Field keys in definition order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate over keys and values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Convert into an update that restores these values.
    pub fn into_partial(self) -> Partial<V> {
        self.0.into_iter().collect()
    }
}

impl<V: Serialize> Snapshot<V> {
    /// Serialize to a JSON object.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl<V: DeserializeOwned> Snapshot<V> {
    /// Parse a snapshot from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl<V> FromIterator<(String, V)> for Snapshot<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
