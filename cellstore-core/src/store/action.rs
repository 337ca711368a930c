//! Action Dispatcher
//!
//! An action is a named operation that mutates one or more base fields. The
//! dispatcher runs it with an [`ActionView`], then applies everything the
//! action staged plus whatever partial update it returned as one batch.
//!
//! # Atomicity
//!
//! Nothing reaches the cells until the action has returned `Ok`. Staged
//! writes live in the view and are discarded if the action fails, so a
//! failing action leaves the store exactly as it found it, even if it called
//! `set` before failing.
//!
//! Every key of the batch is validated before the first cell is touched. A
//! key that is not a base field either rejects the whole batch or is dropped,
//! depending on the store's [`TargetPolicy`](crate::TargetPolicy).

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::runtime::StoreInner;
use super::view::ActionView;
use super::FieldValue;
use crate::error::{Result, StoreError};
use crate::graph::FieldId;

/// Body of an action: receives a view and the call arguments, and may return
/// a partial update.
pub type ActionFn<V> =
    Arc<dyn Fn(&mut ActionView<'_, V>, &[V]) -> Result<Option<Partial<V>>> + Send + Sync>;

/// A partial update: base field key to new value, in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Partial<V>(IndexMap<String, V>);

impl<V> Partial<V> {
    /// An empty update.
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Builder-style insert.
    pub fn set(mut self, key: impl Into<String>, value: V) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Insert or replace a key.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        self.0.insert(key.into(), value)
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.get(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the update is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over keys and values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl<V> Default for Partial<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for Partial<V>
where
    K: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }
}

impl<V> IntoIterator for Partial<V> {
    type Item = (String, V);
    type IntoIter = indexmap::map::IntoIter<String, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A declared action.
pub struct ActionEntry<V> {
    run: ActionFn<V>,
    arity: Option<usize>,
}

impl<V> ActionEntry<V> {
    /// Wrap an action body. `arity`, when set, is checked on every call.
    pub fn new(run: ActionFn<V>, arity: Option<usize>) -> Self {
        Self { run, arity }
    }

    /// Declared number of arguments, if any.
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }
}

impl<V> std::fmt::Debug for ActionEntry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionEntry")
            .field("arity", &self.arity)
            .finish()
    }
}

/// Run the action `id` and commit its effects.
///
/// Errors raised by the action are returned unmodified and nothing is
/// applied.
pub(crate) fn dispatch<V: FieldValue>(store: &StoreInner<V>, id: FieldId, args: &[V]) -> Result<()> {
    let entry = store.action_entry(id)?;
    let name = store.name_of(id);

    if let Some(expected) = entry.arity {
        if expected != args.len() {
            return Err(StoreError::ArityMismatch {
                action: name.to_string(),
                expected,
                actual: args.len(),
            });
        }
    }

    let run = Arc::clone(&entry.run);
    let mut view = ActionView::new(store, name);
    let returned = run(&mut view, args)?;

    let mut batch = view.into_staged();
    if let Some(partial) = returned {
        for (key, value) in partial {
            if let Some(target) = store.resolve_target(name, &key)? {
                batch.insert(target, value);
            }
        }
    }

    trace!(store = %store.name(), action = name, writes = batch.len(), "action returned");
    store.commit(name, batch.into_iter().collect());
    Ok(())
}
