//! Foreign Store Bridge
//!
//! Some state containers are written in the `(set, get)` style: an
//! initializer receives a setter and a getter and returns the initial state
//! plus actions that call `set` themselves. They have no notion of derived
//! state.
//!
//! [`bridge`] builds a regular [`Store`] from such an initializer. The
//! initializer receives a [`StoreApi`] whose `set` and `get` go straight to
//! the store's cells, so the bridged store gets dependency tracking,
//! memoization and subscriptions without the foreign code knowing about any
//! of them.
//!
//! ```rust
//! use cellstore_core::{bridge, ForeignDefinition, Partial, StoreApi};
//!
//! let store = bridge(|api: StoreApi<i64>| {
//!     ForeignDefinition::new()
//!         .value("count", 0_i64)
//!         .action("inc", move |_args| {
//!             let count = api.get("count")?;
//!             api.set(Partial::new().set("count", count + 1))
//!         })
//! })?;
//!
//! store.invoke("inc", &[])?;
//! assert_eq!(store.read("count")?, 1);
//! # Ok::<(), cellstore_core::StoreError>(())
//! ```

use std::sync::{Arc, OnceLock, Weak};

use super::action::Partial;
use super::definition::Definition;
use super::runtime::{Store, StoreInner};
use super::snapshot::Snapshot;
use super::FieldValue;
use crate::config::StoreOptions;
use crate::error::{Result, StoreError};

/// `(set, get)` accessors handed to a foreign initializer.
///
/// The accessors hold a weak reference, so actions capturing them do not keep
/// the store alive.
pub struct StoreApi<V> {
    target: Arc<OnceLock<Weak<StoreInner<V>>>>,
}

impl<V: FieldValue> StoreApi<V> {
    fn detached() -> Self {
        Self {
            target: Arc::new(OnceLock::new()),
        }
    }

    fn attach(&self, store: &Store<V>) {
        // A second attach cannot happen: `bridge` owns the only unattached api.
        let _ = self.target.set(Arc::downgrade(&store.inner));
    }

    fn store(&self) -> Result<Store<V>> {
        self.target
            .get()
            .and_then(Weak::upgrade)
            .map(Store::from_inner)
            .ok_or(StoreError::Detached)
    }

    /// Whether the accessors are bound to a live store.
    pub fn is_attached(&self) -> bool {
        self.store().is_ok()
    }

    /// Read one field.
    pub fn get(&self, key: &str) -> Result<V> {
        self.store()?.read(key)
    }

    /// Read all base fields.
    pub fn get_state(&self) -> Result<Snapshot<V>> {
        Ok(self.store()?.snapshot())
    }

    /// Apply a partial update as one batch.
    pub fn set(&self, partial: Partial<V>) -> Result<()> {
        self.store()?.inner.commit_partial("set", partial)
    }

    /// Compute a partial update from the current state and apply it.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Snapshot<V>) -> Partial<V>,
    {
        let store = self.store()?;
        let partial = f(&store.snapshot());
        store.inner.commit_partial("set", partial)
    }
}

impl<V> Clone for StoreApi<V> {
    fn clone(&self) -> Self {
        Self {
            target: Arc::clone(&self.target),
        }
    }
}

impl<V> std::fmt::Debug for StoreApi<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreApi")
            .field("bound", &self.target.get().is_some())
            .finish()
    }
}

/// Definition produced by a foreign initializer: base fields and actions only.
pub struct ForeignDefinition<V> {
    definition: Definition<V>,
}

impl<V: FieldValue> ForeignDefinition<V> {
    /// An empty definition.
    pub fn new() -> Self {
        Self {
            definition: Definition::new(),
        }
    }

    /// Replace the store options.
    pub fn with_options(self, options: StoreOptions) -> Self {
        Self {
            definition: self.definition.with_options(options),
        }
    }

    /// Declare a base field.
    pub fn value(self, key: impl Into<String>, value: V) -> Self {
        Self {
            definition: self.definition.value(key, value),
        }
    }

    /// Declare an action. The action mutates state through [`StoreApi::set`].
    pub fn action<F>(self, key: impl Into<String>, run: F) -> Self
    where
        F: Fn(&[V]) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            definition: self.definition.action(key, move |_view, args| {
                run(args)?;
                Ok(None)
            }),
        }
    }
}

impl<V: FieldValue> Default for ForeignDefinition<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a store from a `(set, get)`-style initializer.
pub fn bridge<V, F>(init: F) -> Result<Store<V>>
where
    V: FieldValue,
    F: FnOnce(StoreApi<V>) -> ForeignDefinition<V>,
{
    let api = StoreApi::detached();
    let foreign = init(api.clone());
    let store = foreign.definition.build()?;
    api.attach(&store);
    Ok(store)
}
