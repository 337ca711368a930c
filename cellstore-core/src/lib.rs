//! Cellstore Core
//!
//! This crate turns a flat definition of fields into a graph of
//! independently readable and subscribable reactive cells.
//! It implements:
//!
//! - Base fields with versioned, equality-checked writes
//! - Derived fields with automatic dependency tracking and lazy, memoized
//!   recomputation
//! - Actions whose updates are applied as one atomic batch
//! - Subscriptions notified once per batch, after the batch is applied
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Cells, the dependency tracker, subscriptions
//! - `graph`: Dependency edges and invalidation order
//! - `store`: Definitions, stores, views, actions, snapshots, foreign bridge
//! - `config`: Store options
//! - `error`: The crate error type
//!
//! # Example
//!
//! ```rust
//! use cellstore_core::Definition;
//!
//! let store = Definition::new()
//!     .value("base", 0_i64)
//!     .derived("double", |s| Ok(s.get("base")? * 2))
//!     .build()?;
//!
//! assert_eq!(store.read("double")?, 0);
//!
//! store.write("base", 5)?;
//! assert_eq!(store.read("double")?, 10);
//! assert_eq!(store.read("double")?, 10);
//! assert_eq!(store.compute_count("double")?, 2);
//! # Ok::<(), cellstore_core::StoreError>(())
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod store;

pub use config::{StoreOptions, TargetPolicy};
pub use error::{BoxError, Result, StoreError};
pub use graph::{FieldId, FieldKind};
pub use reactive::{SubscriberId, Subscription};
pub use store::{
    bridge, create_store, ActionHandle, ActionView, Definition, FieldHandle, FieldValue,
    ForeignDefinition, Partial, ReadView, Snapshot, StateView, Store, StoreApi,
};
