//! Reactive Primitives
//!
//! This module implements the cells a store is made of: base cells, derived
//! cells, the dependency tracker that connects them, and subscriptions.
//!
//! # Concepts
//!
//! ## Base cells
//!
//! A base cell is a container for a value plus a version. The version is
//! bumped on every write that changes the value.
//!
//! ## Derived cells
//!
//! A derived cell caches the result of a getter together with the versions of
//! everything the getter read. It re-evaluates only when one of those
//! versions has moved.
//!
//! ## Tracker
//!
//! The tracker is the stack of derived cells currently being evaluated. Reads
//! are recorded into the innermost frame, and re-entering a cell that is
//! already on the stack is reported as a cycle.
//!
//! # Implementation Notes
//!
//! Invalidation is pull-based: writes never touch derived cells. A derived
//! cell decides on read whether its cache is still valid, by comparing
//! versions. This is the same "automatic dependency tracking" used by
//! SolidJS, Vue 3, and Leptos, without the eager push phase.

mod cell;
mod context;
mod derived;
mod subscriber;

pub use cell::BaseCell;
pub use context::{CycleDetected, DepSet, FrameGuard, Tracked, Tracker};
pub use derived::{Cached, DerivedCell, Getter};
pub use subscriber::{Callback, SubscriberId, Subscription};

pub(crate) use subscriber::SubscriberRegistry;
