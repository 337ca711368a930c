//! Invalidation Scheduler
//!
//! The graph records, for every derived field, the fields its last
//! computation read. It is only consulted after a batch of writes, to find
//! which subscribed fields must hear about the batch and in what order.
//!
//! # Algorithm
//!
//! 1. Start from the base fields whose value actually changed.
//! 2. Walk dependent edges breadth-first to collect every derived field that
//!    may now be stale.
//! 3. Sort the collected set topologically (dependencies before dependents)
//!    with Kahn's algorithm.
//!
//! Nothing here recomputes a value. Derived fields stay lazy; the walk only
//! decides who gets notified.

use std::collections::{HashMap, HashSet, VecDeque};

use super::node::{FieldId, FieldKind, Node};

/// The dependency graph of one store.
#[derive(Debug)]
pub struct DependencyGraph {
    /// All nodes, indexed by `FieldId::index`.
    nodes: Vec<Node>,
}

impl DependencyGraph {
    /// Create a graph with one node per field, in definition order.
    pub fn new<I>(kinds: I) -> Self
    where
        I: IntoIterator<Item = FieldKind>,
    {
        let nodes = kinds.into_iter().map(Node::new).collect();
        Self { nodes }
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: FieldId) -> Option<&Node> {
        self.nodes.get(node_id.index())
    }

    /// Replace the dependency edges of `dependent` with `dependencies`.
    ///
    /// Called after every successful recomputation: the freshly tracked set
    /// replaces whatever the previous run read.
    pub fn replace_dependencies<I>(&mut self, dependent: FieldId, dependencies: I)
    where
        I: IntoIterator<Item = FieldId>,
    {
        let Some(node) = self.nodes.get_mut(dependent.index()) else {
            return;
        };
        debug_assert_eq!(node.kind(), FieldKind::Derived, "only derived fields have dependencies");
        let previous = node.take_dependencies();
        for old in previous {
            if let Some(dep_node) = self.nodes.get_mut(old.index()) {
                dep_node.remove_dependent(dependent);
            }
        }

        for dependency in dependencies {
            self.add_edge(dependency, dependent);
        }
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    pub fn add_edge(&mut self, dependency: FieldId, dependent: FieldId) {
        if let Some(dep_node) = self.nodes.get_mut(dependency.index()) {
            dep_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(dependent.index()) {
            dependent_node.add_dependency(dependency);
        }
    }

    /// Collect the changed fields and everything transitively depending on them.
    ///
    /// The result is in topological order: every field appears after all of
    /// its dependencies that are also in the result.
    pub fn affected_by(&self, changed: &[FieldId]) -> Vec<FieldId> {
        let mut affected = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<FieldId> = changed.iter().copied().collect();

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            if let Some(node) = self.get_node(node_id) {
                affected.push(node_id);
                queue.extend(node.dependents().iter().copied());
            }
        }

        self.topological_sort(affected)
    }

    /// Perform a topological sort of the given nodes.
    ///
    /// Returns nodes in order such that dependencies come before dependents.
    fn topological_sort(&self, nodes: Vec<FieldId>) -> Vec<FieldId> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<FieldId, usize> = HashMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        // Calculate in-degrees (only counting edges within the node set)
        for &node_id in &nodes {
            if let Some(node) = self.get_node(node_id) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|d| node_set.contains(d))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    queue.push_back(node_id);
                }
            }
        }

        // Kahn's algorithm
        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);

            if let Some(node) = self.get_node(node_id) {
                for &dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(&dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(dependent_id);
                        }
                    }
                }
            }
        }

        // Failed computations never store edges, so the graph stays acyclic.
        // Anything left over is appended rather than dropped.
        if result.len() < nodes.len() {
            let placed: HashSet<_> = result.iter().copied().collect();
            result.extend(nodes.into_iter().filter(|id| !placed.contains(id)));
        }

        result
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: usize) -> FieldId {
        FieldId::from_index(index).unwrap()
    }

    // base(0), base(1), derived(2), derived(3)
    fn graph() -> DependencyGraph {
        DependencyGraph::new([
            FieldKind::Base,
            FieldKind::Base,
            FieldKind::Derived,
            FieldKind::Derived,
        ])
    }

    #[test]
    fn replace_dependencies_drops_old_edges() {
        let mut graph = graph();
        graph.replace_dependencies(id(2), [id(0), id(1)]);
        assert!(graph.get_node(id(1)).unwrap().dependents().contains(&id(2)));

        graph.replace_dependencies(id(2), [id(0)]);
        assert!(!graph.get_node(id(1)).unwrap().dependents().contains(&id(2)));
        assert!(graph.get_node(id(0)).unwrap().dependents().contains(&id(2)));
        assert_eq!(graph.get_node(id(2)).unwrap().dependencies().len(), 1);
    }

    #[test]
    fn affected_propagates_in_topological_order() {
        let mut graph = graph();
        // 3 reads 2, 2 reads 0. Node 1 is independent.
        graph.replace_dependencies(id(3), [id(2)]);
        graph.replace_dependencies(id(2), [id(0)]);

        let affected = graph.affected_by(&[id(0)]);
        assert_eq!(affected, vec![id(0), id(2), id(3)]);

        let untouched = graph.affected_by(&[id(1)]);
        assert_eq!(untouched, vec![id(1)]);
    }

    #[test]
    fn diamond_lists_each_field_once() {
        let mut graph = graph();
        graph.replace_dependencies(id(2), [id(0), id(1)]);
        graph.replace_dependencies(id(3), [id(0), id(2)]);

        let affected = graph.affected_by(&[id(0), id(1)]);
        assert_eq!(affected.len(), 4);
        let pos2 = affected.iter().position(|&n| n == id(2));
        let pos3 = affected.iter().position(|&n| n == id(3));
        assert!(pos2 < pos3);
        assert_eq!(graph.node_count(), 4);
    }
}
