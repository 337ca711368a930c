//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//! Every declared field of a store gets exactly one node, indexed by its
//! position in the definition.

use std::fmt;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Identifier of a field within one store.
///
/// Ids are dense indices assigned in definition order at build time, so they
/// double as indices into the store's slot table. A store holds at most
/// `u32::MAX` fields; the builder rejects larger definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(u32);

impl FieldId {
    /// Create an id from a definition index, or `None` if it does not fit.
    pub(crate) fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }

    /// The position of the field in its definition.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// The kind of a field, assigned once when the store is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A stored value. These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Base,

    /// A cached getter. Has dependencies and may have dependents.
    Derived,

    /// A mutating entry point. Never part of any edge.
    Action,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Base => "base",
            FieldKind::Derived => "derived",
            FieldKind::Action => "action",
        };
        f.write_str(name)
    }
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    /// What kind of field this node stands for.
    kind: FieldKind,

    /// Nodes that this node read during its last computation.
    dependencies: IndexSet<FieldId>,

    /// Nodes whose last computation read this node.
    dependents: IndexSet<FieldId>,
}

impl Node {
    /// Create a new node.
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
        }
    }

    /// Get the node's kind.
    pub(crate) fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Add a dependency (a node that this node reads from).
    pub fn add_dependency(&mut self, node_id: FieldId) {
        self.dependencies.insert(node_id);
    }

    /// Get all dependencies.
    pub fn dependencies(&self) -> &IndexSet<FieldId> {
        &self.dependencies
    }

    /// Add a dependent (a node that reads from this node).
    pub fn add_dependent(&mut self, node_id: FieldId) {
        self.dependents.insert(node_id);
    }

    /// Remove a dependent.
    pub fn remove_dependent(&mut self, node_id: FieldId) {
        self.dependents.shift_remove(&node_id);
    }

    /// Get all dependents.
    pub fn dependents(&self) -> &IndexSet<FieldId> {
        &self.dependents
    }

    /// Clear all dependencies, returning the previous set.
    pub fn take_dependencies(&mut self) -> IndexSet<FieldId> {
        std::mem::take(&mut self.dependencies)
    }
}
