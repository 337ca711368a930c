//! Store Runtime
//!
//! The runtime is the central coordinator that connects base cells, derived
//! cells, actions and subscribers of one store.
//!
//! # How It Works
//!
//! 1. Reads resolve a key to a slot. Base slots read the cell table, derived
//!    slots go through the derivation engine, which may recompute.
//!
//! 2. Every mutation goes through [`StoreInner::commit`], whatever its origin
//!    (action, direct write, bridge `set`, snapshot restore):
//!    a. All writes of the batch are applied under one write lock
//!    b. Equal writes are dropped and do not bump versions
//!    c. The dependency graph yields the changed fields plus their
//!       transitive dependents, in topological order
//!    d. Subscribers of those fields are called once each, after every lock
//!       has been released
//!
//! 3. Derived fields are never recomputed by a commit. They notice the new
//!    versions the next time they are read.
//!
//! 4. Every commit that changes something bumps the store revision. A derived
//!    cell validated at the current revision skips validation entirely.
//!
//! # Thread Safety
//!
//! The cell table, the graph and the subscriber registry each sit behind a
//! `parking_lot` lock, and no lock is held while user code runs. A `Store` can
//! therefore be cloned and shared across threads. Cycle detection is scoped
//! to one evaluation stack, so concurrent readers never see each other's
//! frames.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use super::action::{self, ActionEntry, Partial};
use super::handle::{ActionHandle, FieldHandle};
use super::snapshot::Snapshot;
use super::FieldValue;
use crate::config::{StoreOptions, TargetPolicy};
use crate::error::{Result, StoreError};
use crate::graph::{DependencyGraph, FieldId, FieldKind};
use crate::reactive::{
    BaseCell, Callback, CycleDetected, DepSet, DerivedCell, SubscriberRegistry, Subscription,
    Tracker,
};

/// Storage behind one declared field.
pub(crate) enum Slot<V> {
    /// Index into the base cell table.
    Base(usize),
    Derived(DerivedCell<V>),
    Action(ActionEntry<V>),
}

impl<V> Slot<V> {
    pub(crate) fn kind(&self) -> FieldKind {
        match self {
            Slot::Base(_) => FieldKind::Base,
            Slot::Derived(_) => FieldKind::Derived,
            Slot::Action(_) => FieldKind::Action,
        }
    }
}

/// Shared state of one store.
pub(crate) struct StoreInner<V> {
    options: StoreOptions,
    /// Every declared field, in definition order. A field's position is its id.
    fields: IndexMap<String, Slot<V>>,
    base: RwLock<Vec<BaseCell<V>>>,
    graph: RwLock<DependencyGraph>,
    subscribers: Arc<RwLock<SubscriberRegistry>>,
    /// Bumped by every commit that changes at least one base field.
    revision: AtomicU64,
}

impl<V: FieldValue> StoreInner<V> {
    pub(crate) fn new(
        options: StoreOptions,
        fields: IndexMap<String, Slot<V>>,
        base: Vec<BaseCell<V>>,
    ) -> Self {
        let graph = DependencyGraph::new(fields.values().map(Slot::kind));
        Self {
            options,
            fields,
            base: RwLock::new(base),
            graph: RwLock::new(graph),
            subscribers: Arc::new(RwLock::new(SubscriberRegistry::default())),
            revision: AtomicU64::new(0),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.options.name
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub(crate) fn resolve(&self, key: &str) -> Result<FieldId> {
        self.fields
            .get_index_of(key)
            .and_then(FieldId::from_index)
            .ok_or_else(|| StoreError::UnknownField(key.to_string()))
    }

    pub(crate) fn name_of(&self, id: FieldId) -> &str {
        self.fields
            .get_index(id.index())
            .map_or("<unknown>", |(key, _)| key.as_str())
    }

    fn slot(&self, id: FieldId) -> &Slot<V> {
        &self.fields[id.index()]
    }

    pub(crate) fn kind_of(&self, id: FieldId) -> FieldKind {
        self.slot(id).kind()
    }

    fn wrong_kind(&self, id: FieldId, expected: FieldKind) -> StoreError {
        StoreError::WrongKind {
            field: self.name_of(id).to_string(),
            expected,
            actual: self.kind_of(id),
        }
    }

    fn derived_cell(&self, id: FieldId) -> Result<&DerivedCell<V>> {
        match self.slot(id) {
            Slot::Derived(cell) => Ok(cell),
            _ => Err(self.wrong_kind(id, FieldKind::Derived)),
        }
    }

    pub(crate) fn action_entry(&self, id: FieldId) -> Result<&ActionEntry<V>> {
        match self.slot(id) {
            Slot::Action(entry) => Ok(entry),
            _ => Err(self.wrong_kind(id, FieldKind::Action)),
        }
    }

    /// Read a base or derived field, returning its value and version.
    pub(crate) fn read_field(&self, id: FieldId, tracker: &Tracker) -> Result<(V, u64)> {
        match self.slot(id) {
            Slot::Base(index) => {
                let base = self.base.read();
                let cell = &base[*index];
                Ok((cell.value().clone(), cell.version()))
            }
            Slot::Derived(cell) => cell.get(id, self, tracker),
            Slot::Action(_) => Err(self.wrong_kind(id, FieldKind::Base)),
        }
    }

    /// Read a field as an action sees it after staging `staged`.
    ///
    /// Staged base values shadow committed ones, and derived fields are
    /// evaluated against that overlay without touching their caches.
    pub(crate) fn read_staged(
        &self,
        id: FieldId,
        tracker: &Tracker,
        staged: &IndexMap<FieldId, V>,
    ) -> Result<V> {
        match self.slot(id) {
            Slot::Base(index) => match staged.get(&id) {
                Some(value) => Ok(value.clone()),
                None => Ok(self.base.read()[*index].value().clone()),
            },
            Slot::Derived(cell) => cell.evaluate_staged(id, self, tracker, staged),
            Slot::Action(_) => Err(self.wrong_kind(id, FieldKind::Base)),
        }
    }

    /// Current version of a dependency, bringing derived fields up to date.
    pub(crate) fn dependency_version(&self, id: FieldId, tracker: &Tracker) -> Result<u64> {
        match self.slot(id) {
            Slot::Base(index) => Ok(self.base.read()[*index].version()),
            Slot::Derived(cell) => cell.get(id, self, tracker).map(|(_, version)| version),
            Slot::Action(_) => Err(self.wrong_kind(id, FieldKind::Base)),
        }
    }

    pub(crate) fn version_of(&self, id: FieldId) -> Result<u64> {
        match self.slot(id) {
            Slot::Base(index) => Ok(self.base.read()[*index].version()),
            Slot::Derived(cell) => Ok(cell.version()),
            Slot::Action(_) => Err(self.wrong_kind(id, FieldKind::Base)),
        }
    }

    pub(crate) fn cycle_error(&self, cycle: CycleDetected) -> StoreError {
        let path: Vec<String> = cycle
            .path
            .iter()
            .map(|id| self.name_of(*id).to_string())
            .collect();
        let field = path.last().cloned().unwrap_or_default();
        warn!(store = %self.name(), field = %field, path = ?path, "cyclic dependency detected");
        StoreError::CyclicDependency { field, path }
    }

    pub(crate) fn replace_edges(&self, id: FieldId, deps: &DepSet) {
        self.graph
            .write()
            .replace_dependencies(id, deps.iter().map(|(dep, _)| *dep));
    }

    /// Resolve the key of an update, applying the target policy.
    ///
    /// Returns `Ok(None)` for keys dropped under `TargetPolicy::Ignore`.
    pub(crate) fn resolve_target(&self, origin: &str, key: &str) -> Result<Option<FieldId>> {
        if let Some((index, _, Slot::Base(_))) = self.fields.get_full(key) {
            if let Some(id) = FieldId::from_index(index) {
                return Ok(Some(id));
            }
        }

        match self.options.target_policy {
            TargetPolicy::Reject => Err(StoreError::InvalidActionTarget {
                origin: origin.to_string(),
                key: key.to_string(),
            }),
            TargetPolicy::Ignore => {
                warn!(store = %self.name(), origin, key, "ignoring update to non-base key");
                Ok(None)
            }
        }
    }

    /// Validate every key of `partial`, then commit it as one batch.
    pub(crate) fn commit_partial(&self, origin: &str, partial: Partial<V>) -> Result<()> {
        let mut batch = IndexMap::with_capacity(partial.len());
        for (key, value) in partial {
            if let Some(id) = self.resolve_target(origin, &key)? {
                batch.insert(id, value);
            }
        }
        self.commit(origin, batch.into_iter().collect());
        Ok(())
    }

    /// Apply a batch of base writes and notify affected subscribers.
    ///
    /// Ids must refer to base fields.
    pub(crate) fn commit(&self, origin: &str, writes: Vec<(FieldId, V)>) {
        let changed: Vec<FieldId> = {
            let mut base = self.base.write();
            let changed: Vec<FieldId> = writes
                .into_iter()
                .filter_map(|(id, value)| match self.slot(id) {
                    Slot::Base(index) => base[*index].write(value).then_some(id),
                    _ => None,
                })
                .collect();
            if !changed.is_empty() {
                self.revision.fetch_add(1, Ordering::AcqRel);
            }
            changed
        };

        if changed.is_empty() {
            trace!(store = %self.name(), origin, "batch changed nothing");
            return;
        }

        let affected = self.graph.read().affected_by(&changed);
        let callbacks = self.subscribers.read().callbacks_for(&affected);
        debug!(
            store = %self.name(),
            origin,
            changed = changed.len(),
            affected = affected.len(),
            notified = callbacks.len(),
            "committed batch"
        );

        for callback in callbacks {
            callback();
        }
    }

    pub(crate) fn subscribe(&self, id: FieldId, callback: Callback) -> Result<Subscription> {
        match self.slot(id) {
            Slot::Base(_) => {}
            // Evaluate once so the graph knows what this field depends on.
            Slot::Derived(cell) => {
                cell.get(id, self, &Tracker::new())?;
            }
            Slot::Action(_) => return Err(self.wrong_kind(id, FieldKind::Base)),
        }
        let subscriber = self.subscribers.write().insert(id, callback);
        Ok(Subscription::new(subscriber, id, &self.subscribers))
    }

    pub(crate) fn subscriber_count(&self, id: FieldId) -> usize {
        self.subscribers.read().count(id)
    }

    pub(crate) fn snapshot(&self) -> Snapshot<V> {
        let base = self.base.read();
        self.fields
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Base(index) => Some((key.clone(), base[*index].value().clone())),
                _ => None,
            })
            .collect()
    }
}

/// A reactive store built from a [`Definition`](super::Definition).
///
/// Cloning is cheap and yields another handle to the same cells.
pub struct Store<V = serde_json::Value> {
    pub(crate) inner: Arc<StoreInner<V>>,
}

impl<V: FieldValue> Store<V> {
    pub(crate) fn from_inner(inner: Arc<StoreInner<V>>) -> Self {
        Self { inner }
    }

    /// Read a base or derived field.
    ///
    /// Reading a derived field recomputes it if any of its dependencies
    /// changed since the last read.
    pub fn read(&self, key: &str) -> Result<V> {
        let id = self.inner.resolve(key)?;
        self.read_id(id)
    }

    pub(crate) fn read_id(&self, id: FieldId) -> Result<V> {
        let tracker = Tracker::new();
        self.inner.read_field(id, &tracker).map(|(value, _)| value)
    }

    /// Write one base field.
    ///
    /// Writing a value equal to the current one does nothing.
    pub fn write(&self, key: &str, value: V) -> Result<()> {
        let id = self.inner.resolve(key)?;
        self.write_id(id, value)
    }

    pub(crate) fn write_id(&self, id: FieldId, value: V) -> Result<()> {
        if self.inner.kind_of(id) != FieldKind::Base {
            return Err(self.inner.wrong_kind(id, FieldKind::Base));
        }
        self.inner.commit(self.inner.name_of(id), vec![(id, value)]);
        Ok(())
    }

    /// Write several base fields as one batch.
    pub fn write_many(&self, partial: Partial<V>) -> Result<()> {
        self.inner.commit_partial("write_many", partial)
    }

    /// Invoke an action with the given arguments.
    pub fn invoke(&self, action: &str, args: &[V]) -> Result<()> {
        let id = self.inner.resolve(action)?;
        action::dispatch(&self.inner, id, args)
    }

    /// Call `callback` after every batch that changes (base) or may change
    /// (derived) the field.
    ///
    /// Subscribing to a derived field evaluates it once.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> Result<Subscription>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.resolve(key)?;
        self.inner.subscribe(id, Arc::new(callback))
    }

    /// Handle to a base or derived field.
    pub fn field(&self, key: &str) -> Result<FieldHandle<V>> {
        let id = self.inner.resolve(key)?;
        match self.inner.kind_of(id) {
            FieldKind::Action => Err(self.inner.wrong_kind(id, FieldKind::Base)),
            kind => Ok(FieldHandle::new(self.clone(), id, kind)),
        }
    }

    /// Handle to an action.
    pub fn action(&self, key: &str) -> Result<ActionHandle<V>> {
        let id = self.inner.resolve(key)?;
        self.inner.action_entry(id)?;
        Ok(ActionHandle::new(self.clone(), id))
    }

    /// Kind of a declared field.
    pub fn kind(&self, key: &str) -> Result<FieldKind> {
        let id = self.inner.resolve(key)?;
        Ok(self.inner.kind_of(id))
    }

    /// Declared keys in definition order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.fields.keys().map(String::as_str)
    }

    /// Version of a base field, or of a derived field's cached value (0 if
    /// never computed).
    pub fn version(&self, key: &str) -> Result<u64> {
        let id = self.inner.resolve(key)?;
        self.inner.version_of(id)
    }

    /// Number of times a derived field's getter has run to fill its cache.
    pub fn compute_count(&self, key: &str) -> Result<u64> {
        let id = self.inner.resolve(key)?;
        Ok(self.inner.derived_cell(id)?.compute_count())
    }

    /// Number of live subscriptions on a field.
    pub fn subscriber_count(&self, key: &str) -> Result<usize> {
        let id = self.inner.resolve(key)?;
        Ok(self.inner.subscriber_count(id))
    }

    /// Current values of all base fields.
    pub fn snapshot(&self) -> Snapshot<V> {
        self.inner.snapshot()
    }

    /// Apply a snapshot as one batch.
    pub fn restore(&self, snapshot: Snapshot<V>) -> Result<()> {
        self.inner.commit_partial("restore", snapshot.into_partial())
    }

    /// The options this store was built with.
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }
}

impl<V> Clone for Store<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for Store<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.options.name)
            .field("fields", &self.inner.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}
