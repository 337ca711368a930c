//! Per-field handles.
//!
//! A handle resolves its key once and then talks to the store by id. Handles
//! keep the store alive and are cheap to clone, which makes them convenient
//! to hand to a binding layer that only cares about one field.

use super::runtime::Store;
use super::FieldValue;
use crate::error::Result;
use crate::graph::{FieldId, FieldKind};
use crate::reactive::Subscription;

/// Handle to one base or derived field.
#[derive(Debug)]
pub struct FieldHandle<V> {
    store: Store<V>,
    id: FieldId,
    kind: FieldKind,
}

impl<V: FieldValue> FieldHandle<V> {
    pub(crate) fn new(store: Store<V>, id: FieldId, kind: FieldKind) -> Self {
        Self { store, id, kind }
    }

    /// The field's key.
    pub fn key(&self) -> &str {
        self.store.inner.name_of(self.id)
    }

    /// The field's id.
    pub fn id(&self) -> FieldId {
        self.id
    }

    /// Base or derived.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Whether `set` is available.
    pub fn is_writable(&self) -> bool {
        self.kind == FieldKind::Base
    }

    /// Read the field.
    pub fn get(&self) -> Result<V> {
        self.store.read_id(self.id)
    }

    /// Write the field. Fails for derived fields.
    pub fn set(&self, value: V) -> Result<()> {
        self.store.write_id(self.id, value)
    }

    /// Current version.
    pub fn version(&self) -> Result<u64> {
        self.store.inner.version_of(self.id)
    }

    /// Subscribe to changes of this field.
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.store.inner.subscribe(self.id, std::sync::Arc::new(callback))
    }
}

impl<V> Clone for FieldHandle<V> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            id: self.id,
            kind: self.kind,
        }
    }
}

/// Handle to one action.
#[derive(Debug)]
pub struct ActionHandle<V> {
    store: Store<V>,
    id: FieldId,
}

impl<V: FieldValue> ActionHandle<V> {
    pub(crate) fn new(store: Store<V>, id: FieldId) -> Self {
        Self { store, id }
    }

    /// The action's key.
    pub fn key(&self) -> &str {
        self.store.inner.name_of(self.id)
    }

    /// Declared arity, if any.
    pub fn arity(&self) -> Option<usize> {
        self.store
            .inner
            .action_entry(self.id)
            .ok()
            .and_then(|entry| entry.arity())
    }

    /// Invoke the action.
    pub fn call(&self, args: &[V]) -> Result<()> {
        super::action::dispatch(&self.store.inner, self.id, args)
    }
}

impl<V> Clone for ActionHandle<V> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            id: self.id,
        }
    }
}
