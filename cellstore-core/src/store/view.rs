//! State Views
//!
//! Getters and actions never see the store itself. They receive a view that
//! resolves every field access through the live cells at the moment of the
//! call:
//!
//! - [`ReadView`] is handed to getters. Every read is recorded as a
//!   dependency of the derived field being computed.
//! - [`ActionView`] is handed to actions. Writes are staged and only applied
//!   if the action returns successfully. Reads, base or derived, see
//!   committed state with the action's own staged writes laid over it.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::runtime::StoreInner;
use super::FieldValue;
use crate::error::{Result, StoreError};
use crate::graph::FieldId;
use crate::reactive::Tracker;

/// Read access to the fields of a store.
///
/// Implemented by both views so helpers can be written once for getters and
/// actions.
pub trait StateView<V> {
    /// Read a base or derived field.
    fn get(&self, key: &str) -> Result<V>;

    /// Read a field and convert it through serde.
    ///
    /// Mostly useful with `serde_json::Value` stores, where fields are
    /// dynamically typed.
    fn get_as<T>(&self, key: &str) -> Result<T>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let value = self.get(key)?;
        serde_json::to_value(value)
            .and_then(serde_json::from_value)
            .map_err(|source| StoreError::Decode {
                field: key.to_string(),
                source,
            })
    }
}

/// View handed to getters of derived fields.
pub struct ReadView<'a, V> {
    store: &'a StoreInner<V>,
    tracker: &'a Tracker,
    /// Writes staged by the calling action, if the getter runs inside one.
    staged: Option<&'a IndexMap<FieldId, V>>,
}

impl<'a, V: FieldValue> ReadView<'a, V> {
    pub(crate) fn new(store: &'a StoreInner<V>, tracker: &'a Tracker) -> Self {
        Self {
            store,
            tracker,
            staged: None,
        }
    }

    pub(crate) fn staged(
        store: &'a StoreInner<V>,
        tracker: &'a Tracker,
        staged: &'a IndexMap<FieldId, V>,
    ) -> Self {
        Self {
            store,
            tracker,
            staged: Some(staged),
        }
    }

    /// Read a field and record it as a dependency of the running getter.
    pub fn get(&self, key: &str) -> Result<V> {
        let id = self.store.resolve(key)?;
        if let Some(staged) = self.staged {
            return self.store.read_staged(id, self.tracker, staged);
        }
        let (value, version) = self.store.read_field(id, self.tracker)?;
        self.tracker.record(id, version);
        Ok(value)
    }
}

impl<V: FieldValue> StateView<V> for ReadView<'_, V> {
    fn get(&self, key: &str) -> Result<V> {
        ReadView::get(self, key)
    }
}

/// View handed to actions.
pub struct ActionView<'a, V> {
    store: &'a StoreInner<V>,
    tracker: Tracker,
    origin: &'a str,
    staged: IndexMap<FieldId, V>,
}

impl<'a, V: FieldValue> ActionView<'a, V> {
    pub(crate) fn new(store: &'a StoreInner<V>, origin: &'a str) -> Self {
        Self {
            store,
            tracker: Tracker::new(),
            origin,
            staged: IndexMap::new(),
        }
    }

    /// Read a field.
    ///
    /// Reads reflect writes staged earlier in this action. Once something is
    /// staged, derived fields are evaluated against the staged values instead
    /// of coming from their caches.
    pub fn get(&self, key: &str) -> Result<V> {
        let id = self.store.resolve(key)?;
        if self.staged.is_empty() {
            let (value, _) = self.store.read_field(id, &self.tracker)?;
            return Ok(value);
        }
        self.store.read_staged(id, &self.tracker, &self.staged)
    }

    /// Stage a write to a base field.
    ///
    /// Keys that are not base fields follow the store's target policy.
    pub fn set(&mut self, key: &str, value: V) -> Result<()> {
        if let Some(id) = self.store.resolve_target(self.origin, key)? {
            self.staged.insert(id, value);
        }
        Ok(())
    }

    /// Stage a write computed from the field's current value.
    pub fn update<F>(&mut self, key: &str, f: F) -> Result<()>
    where
        F: FnOnce(V) -> V,
    {
        let current = self.get(key)?;
        self.set(key, f(current))
    }

    /// The action this view belongs to.
    pub fn origin(&self) -> &str {
        self.origin
    }

    /// Number of staged writes.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub(crate) fn into_staged(self) -> IndexMap<FieldId, V> {
        self.staged
    }
}

impl<V: FieldValue> StateView<V> for ActionView<'_, V> {
    fn get(&self, key: &str) -> Result<V> {
        ActionView::get(self, key)
    }
}
