//! Stores
//!
//! A store is built once from a [`Definition`] and then exposes its fields
//! through read, write, invoke and subscribe operations.
//!
//! # Concepts
//!
//! ## Base fields
//!
//! Plain stored values. They are the roots of reactivity: every change starts
//! with a write to one or more base fields.
//!
//! ## Derived fields
//!
//! Getters whose result is cached. The cache is reused as long as every field
//! the getter read last time still has the same version.
//!
//! ## Actions
//!
//! Named operations that change base fields. Everything an action changes is
//! applied in one batch, and subscribers are notified after the whole batch.
//!
//! # Implementation Notes
//!
//! Getters and actions receive explicit views rather than the store. The
//! dependency tracker travels inside the view, so tracking is scoped to one
//! evaluation instead of living in thread-local state.

mod action;
mod adapter;
mod definition;
mod handle;
mod runtime;
mod snapshot;
mod view;

pub use action::{ActionEntry, ActionFn, Partial};
pub use adapter::{bridge, ForeignDefinition, StoreApi};
pub use definition::{create_store, Definition, FieldSpec};
pub use handle::{ActionHandle, FieldHandle};
pub use runtime::Store;
pub use snapshot::Snapshot;
pub use view::{ActionView, ReadView, StateView};

pub(crate) use runtime::StoreInner;

/// Values a store can hold.
///
/// `PartialEq` decides whether a write is a change: writing a value equal to
/// the current one is a no-op.
pub trait FieldValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T> FieldValue for T where T: Clone + PartialEq + Send + Sync + 'static {}
