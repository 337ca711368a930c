//! Dependency Graph
//!
//! This module tracks the relationships between the fields of a store.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent fields (base values, derived getters, actions)
//! - Edges represent dependencies: if A read B during its last computation,
//!   there is an edge from B to A
//!
//! Staleness itself is decided by version comparison inside the derived
//! cells. The graph exists so that a write can find, without recomputing
//! anything, every subscribed field that may have changed.
//!
//! # Design Decisions
//!
//! 1. Edges are replaced wholesale after each recomputation, which gives
//!    conditional dependency tracking for free.
//!
//! 2. The graph is indexed by field id, which is a dense index.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.

mod node;
mod scheduler;

pub use node::{FieldId, FieldKind, Node};
pub use scheduler::DependencyGraph;
