//! Base Cell Implementation
//!
//! A base cell is the fundamental reactive storage unit. It holds a value
//! and a version counter.
//!
//! # How Base Cells Work
//!
//! 1. When a cell is read through a tracking view, the view records the
//!    cell's id and current version into the innermost tracking frame.
//!
//! 2. When a cell is written with a value unequal to the current one, the
//!    value is replaced and the version is bumped.
//!
//! 3. Derived cells compare the versions they recorded against the current
//!    ones to decide whether their cached value is still usable.
//!
//! Cells do not own subscribers or locks. The store keeps every base cell of
//! one store in a single table behind one lock, so a batch of writes is
//! applied under one guard and no reader can observe half of it.

/// A stored value with a monotonically increasing version.
#[derive(Debug, Clone)]
pub struct BaseCell<V> {
    /// The current value.
    value: V,

    /// Bumped on every write that changes the value. Starts at 0.
    version: u64,
}

impl<V> BaseCell<V>
where
    V: Clone + PartialEq,
{
    /// Create a new cell with the given initial value.
    pub fn new(value: V) -> Self {
        Self { value, version: 0 }
    }

    /// Get the current value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Get the current version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace the value.
    ///
    /// Returns `false` without touching the version when `value` equals the
    /// current value. Callers only notify subscribers on `true`.
    pub fn write(&mut self, value: V) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.version += 1;
        true
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
