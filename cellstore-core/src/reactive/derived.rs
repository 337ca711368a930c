//! Derived Cell Implementation
//!
//! A derived cell is a cached getter that re-evaluates only when one of the
//! fields it read last time has changed.
//!
//! # How Derived Cells Work
//!
//! 1. On first read, the getter runs inside a tracking frame and the result
//!    is cached together with the (field, version) pairs it read.
//!
//! 2. On later reads, every recorded dependency is brought up to date and its
//!    version compared with the recorded one. If all match, the cached value
//!    is returned without running the getter.
//!
//! 3. If any version differs, the getter runs again and the new dependency
//!    set replaces the old one.
//!
//! # Why This Matters
//!
//! Writes never run getters. A base field changes, ten derived fields depend
//! on it, and only the ones that are actually read again will recompute.
//! Dependencies that the last run skipped (an untaken branch) are not in the
//! recorded set, so changing them does not invalidate the cache.
//!
//! Validation is stamped with the store revision it ran at. The revision
//! moves only when a commit changes a base field, so a cell that was
//! validated or recomputed at the current revision is returned without
//! looking at its dependencies again. Without the stamp, diamond-shaped
//! graphs would revisit shared cells once per path.
//!
//! A derived cell carries its own version. It is bumped only when a
//! recomputation produces a value unequal to the cached one, which lets an
//! outer derived cell keep its cache when an inner one recomputed to the same
//! value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::context::{DepSet, Tracker};
use crate::error::Result;
use crate::graph::FieldId;
use crate::store::{ReadView, StoreInner};

/// Getter of a derived field.
pub type Getter<V> = Arc<dyn Fn(&ReadView<'_, V>) -> Result<V> + Send + Sync>;

/// The memoized result of one successful computation.
#[derive(Debug, Clone)]
pub struct Cached<V> {
    /// The computed value.
    pub value: V,
    /// Version of this derived cell after the computation.
    pub version: u64,
    /// Dependencies read by the computation, with their versions at read time.
    pub deps: DepSet,
    /// Store revision at which the value was last known to be current.
    pub verified_at: u64,
}

/// A cached derived value that recomputes only when dependencies change.
pub struct DerivedCell<V> {
    /// The computation function.
    compute: Getter<V>,

    /// The cached result (None if never computed).
    cache: Mutex<Option<Cached<V>>>,

    /// Number of times the getter has run to fill the cache.
    compute_count: AtomicU64,
}

impl<V> DerivedCell<V>
where
    V: Clone + PartialEq,
{
    /// Create a new derived cell with the given getter.
    ///
    /// The getter is not run immediately. It runs on first read.
    pub fn new(compute: Getter<V>) -> Self {
        Self {
            compute,
            cache: Mutex::new(None),
            compute_count: AtomicU64::new(0),
        }
    }

    /// A copy of the cached result, if any.
    pub fn cached(&self) -> Option<Cached<V>> {
        self.cache.lock().clone()
    }

    /// Version of the cached value, 0 if never computed.
    pub fn version(&self) -> u64 {
        self.cache.lock().as_ref().map_or(0, |cached| cached.version)
    }

    /// Check if the cell has a cached value.
    pub fn is_computed(&self) -> bool {
        self.cache.lock().is_some()
    }

    /// Get the number of times the getter has run to fill the cache.
    ///
    /// Evaluations against an action's staged writes are not counted.
    pub fn compute_count(&self) -> u64 {
        self.compute_count.load(Ordering::Relaxed)
    }

    /// Store a fresh result, returning the cell's new version.
    fn store(&self, value: V, deps: DepSet, revision: u64) -> u64 {
        let mut cache = self.cache.lock();
        let version = match cache.as_ref() {
            Some(previous) if previous.value == value => previous.version,
            Some(previous) => previous.version + 1,
            None => 1,
        };
        *cache = Some(Cached {
            value,
            version,
            deps,
            verified_at: revision,
        });
        version
    }

    /// Mark the cached value `version` as current at `revision`.
    ///
    /// A concurrent reader may have replaced the cache meanwhile; the stamp
    /// is then left alone.
    fn stamp(&self, version: u64, revision: u64) {
        if let Some(cached) = self.cache.lock().as_mut() {
            if cached.version == version && cached.verified_at < revision {
                cached.verified_at = revision;
            }
        }
    }
}

impl<V> DerivedCell<V>
where
    V: crate::store::FieldValue,
{
    /// Get the current value, recomputing if necessary.
    ///
    /// Returns the value together with the cell's version. Fails with
    /// `StoreError::CyclicDependency` if `id` is already being evaluated on
    /// `tracker`, and passes getter errors through. On failure the previous
    /// cache is left as it was.
    pub(crate) fn get(
        &self,
        id: FieldId,
        store: &StoreInner<V>,
        tracker: &Tracker,
    ) -> Result<(V, u64)> {
        let frame = tracker.enter(id).map_err(|cycle| store.cycle_error(cycle))?;
        // Read before validating: anything observed below is at least this new.
        let revision = store.revision();

        if let Some(cached) = self.cached() {
            if cached.verified_at == revision {
                return Ok((cached.value, cached.version));
            }
            if deps_current(store, &cached.deps, tracker)? {
                drop(frame);
                self.stamp(cached.version, revision);
                trace!(
                    store = %store.name(),
                    field = store.name_of(id),
                    version = cached.version,
                    "derived cache hit"
                );
                return Ok((cached.value, cached.version));
            }
        }

        self.compute_count.fetch_add(1, Ordering::Relaxed);
        let compute = Arc::clone(&self.compute);
        let view = ReadView::new(store, tracker);
        let value = compute(&view)?;
        let deps = frame.finish();

        store.replace_edges(id, &deps);
        let dep_count = deps.len();
        let version = self.store(value.clone(), deps, revision);
        debug!(
            store = %store.name(),
            field = store.name_of(id),
            version,
            deps = dep_count,
            "recomputed derived field"
        );

        Ok((value, version))
    }

    /// Run the getter against committed state overlaid with `staged` writes.
    ///
    /// Used by actions that read a derived field after staging writes. The
    /// cache, the compute count and the dependency graph are left untouched.
    pub(crate) fn evaluate_staged(
        &self,
        id: FieldId,
        store: &StoreInner<V>,
        tracker: &Tracker,
        staged: &IndexMap<FieldId, V>,
    ) -> Result<V> {
        let _frame = tracker.enter(id).map_err(|cycle| store.cycle_error(cycle))?;
        let compute = Arc::clone(&self.compute);
        let view = ReadView::staged(store, tracker, staged);
        let value = compute(&view)?;
        trace!(
            store = %store.name(),
            field = store.name_of(id),
            staged = staged.len(),
            "evaluated derived field against staged writes"
        );
        Ok(value)
    }
}

/// Check every recorded dependency against its current version.
///
/// Stops at the first mismatch. Derived dependencies are brought up to date
/// first, which may recompute them.
fn deps_current<V>(store: &StoreInner<V>, deps: &DepSet, tracker: &Tracker) -> Result<bool>
where
    V: crate::store::FieldValue,
{
    for &(dep, recorded) in deps {
        if store.dependency_version(dep, tracker)? != recorded {
            return Ok(false);
        }
    }
    Ok(true)
}

impl<V> std::fmt::Debug for DerivedCell<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("DerivedCell")
            .field("computed", &cache.is_some())
            .field("version", &cache.as_ref().map(|c| c.version))
            .field("compute_count", &self.compute_count.load(Ordering::Relaxed))
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
