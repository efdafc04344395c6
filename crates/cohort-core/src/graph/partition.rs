//! Connected-component partition of a [`RelationGraph`].
//!
//! Nodes are scanned in ascending index order; every node not yet visited
//! roots a new component, which is flooded breadth-first before the scan
//! moves on. Component ids therefore follow the index of each component's
//! lowest node.
//!
//! The flood uses an explicit queue and one visited bitset shared across the
//! whole pass, so a single component spanning the entire graph costs no more
//! stack than a singleton.

use std::collections::VecDeque;
use std::fmt;

use fixedbitset::FixedBitSet;
use petgraph::graph::NodeIndex;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::RolloutError;
use crate::graph::build::RelationGraph;

/// Dense component number, assigned in discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ComponentId(pub usize);

impl ComponentId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Assignment of every node to exactly one connected component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    component_of: Vec<ComponentId>,
    members: Vec<Vec<NodeIndex>>,
}

impl Partition {
    /// Partition `graph` into connected components.
    #[instrument(skip(graph), fields(nodes = graph.node_count()))]
    #[must_use]
    pub fn compute(graph: &RelationGraph) -> Self {
        let node_count = graph.node_count();
        let mut visited = FixedBitSet::with_capacity(node_count);
        let mut component_of = vec![ComponentId(0); node_count];
        let mut members: Vec<Vec<NodeIndex>> = Vec::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();

        for root in (0..node_count).map(NodeIndex::new) {
            if visited.contains(root.index()) {
                continue;
            }

            let id = ComponentId(members.len());
            let mut component = Vec::new();
            visited.insert(root.index());
            queue.push_back(root);

            while let Some(node) = queue.pop_front() {
                component_of[node.index()] = id;
                component.push(node);
                for neighbor in graph.neighbors(node) {
                    if !visited.put(neighbor.index()) {
                        queue.push_back(neighbor);
                    }
                }
            }

            members.push(component);
        }

        debug!(components = members.len(), "partition computed");

        Self {
            component_of,
            members,
        }
    }

    #[must_use]
    pub fn component_count(&self) -> usize {
        self.members.len()
    }

    /// Number of partitioned nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.component_of.len()
    }

    /// Component containing `node`, or `None` if the index is out of range.
    #[must_use]
    pub fn component_of(&self, node: NodeIndex) -> Option<ComponentId> {
        self.component_of.get(node.index()).copied()
    }

    /// Members of `id` in BFS discovery order; empty for an unknown id.
    #[must_use]
    pub fn members(&self, id: ComponentId) -> &[NodeIndex] {
        self.members.get(id.index()).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn size_of(&self, id: ComponentId) -> usize {
        self.members(id).len()
    }

    /// Component sizes indexed by [`ComponentId`].
    #[must_use]
    pub fn sizes(&self) -> Vec<usize> {
        self.members.iter().map(Vec::len).collect()
    }

    /// Iterate component ids in discovery order.
    pub fn ids(&self) -> impl Iterator<Item = ComponentId> {
        (0..self.members.len()).map(ComponentId)
    }

    /// Component containing the node named `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutError::NotFound`] if the identifier is not in `graph`.
    pub fn component_for_identifier(
        &self,
        graph: &RelationGraph,
        identifier: &str,
    ) -> Result<ComponentId, RolloutError> {
        graph
            .node_index(identifier)
            .and_then(|idx| self.component_of(idx))
            .ok_or_else(|| RolloutError::not_found(identifier))
    }

    /// Identifiers of every member of `id`, in discovery order.
    #[must_use]
    pub fn member_identifiers<'g>(&self, graph: &'g RelationGraph, id: ComponentId) -> Vec<&'g str> {
        self.members(id)
            .iter()
            .filter_map(|&node| graph.identifier(node))
            .collect()
    }
}
