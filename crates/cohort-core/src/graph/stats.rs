//! Summary statistics for a component partition.
//!
//! # Statistics Provided
//!
//! - **node_count** / **edge_count**: size of the relation graph.
//! - **component_count**: number of connected components.
//! - **singleton_count**: components with exactly one member. These dominate
//!   coaching networks and are what keeps subset selection cheap.
//! - **largest_component**: member count of the biggest component.
//! - **size_histogram**: component size → number of components of that size.
//! - **duplicate_neighbors**: repeated neighbor entries seen while building.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::graph::build::RelationGraph;
use crate::graph::partition::Partition;

/// Summary statistics for a partitioned relation graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub component_count: usize,
    pub singleton_count: usize,
    pub largest_component: usize,
    /// Mean component size; zero for an empty graph.
    pub mean_component_size: f64,
    pub size_histogram: BTreeMap<usize, usize>,
    pub duplicate_neighbors: usize,
    pub content_hash: String,
}

impl PartitionStats {
    #[must_use]
    pub fn from_partition(graph: &RelationGraph, partition: &Partition) -> Self {
        let sizes = partition.sizes();

        let mut size_histogram = BTreeMap::new();
        for &size in &sizes {
            *size_histogram.entry(size).or_insert(0) += 1;
        }

        Self {
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            component_count: sizes.len(),
            singleton_count: size_histogram.get(&1).copied().unwrap_or(0),
            largest_component: sizes.iter().copied().max().unwrap_or(0),
            mean_component_size: mean(graph.node_count(), sizes.len()),
            size_histogram,
            duplicate_neighbors: graph.report().duplicate_neighbors,
            content_hash: graph.content_hash().to_string(),
        }
    }

    /// Members that sit in components larger than one.
    #[must_use]
    pub const fn connected_members(&self) -> usize {
        self.node_count - self.singleton_count
    }

    /// Return `true` if no member has any relationship.
    #[must_use]
    pub const fn is_flat(&self) -> bool {
        self.singleton_count == self.node_count
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(total: usize, count: usize) -> f64 {
    if count == 0 {
        return 0.0_f64;
    }
    total as f64 / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build::DuplicateNeighborPolicy;
    use crate::record::Record;

    fn stats_of(records: Vec<Record>) -> PartitionStats {
        let graph = RelationGraph::from_records(records, DuplicateNeighborPolicy::Preserve);
        let partition = Partition::compute(&graph);
        PartitionStats::from_partition(&graph, &partition)
    }

    #[test]
    fn empty_graph_stats() {
        let stats = stats_of(vec![]);
        assert_eq!(stats.node_count, 0);
        assert_eq!(stats.component_count, 0);
        assert_eq!(stats.largest_component, 0);
        assert!((stats.mean_component_size - 0.0).abs() < f64::EPSILON);
        assert!(stats.is_flat());
    }

    #[test]
    fn isolated_members_are_singletons() {
        let stats = stats_of(vec![Record::isolated("a"), Record::isolated("b")]);
        assert_eq!(stats.singleton_count, 2);
        assert_eq!(stats.connected_members(), 0);
        assert_eq!(stats.size_histogram.get(&1), Some(&2));
    }

    #[test]
    fn mixed_sizes_histogram() {
        let stats = stats_of(vec![
            Record::with_neighbors("coach", ["s1", "s2"]),
            Record::with_neighbors("pair", ["mate"]),
            Record::isolated("solo"),
        ]);
        assert_eq!(stats.node_count, 6);
        assert_eq!(stats.edge_count, 3);
        assert_eq!(stats.component_count, 3);
        assert_eq!(stats.largest_component, 3);
        assert_eq!(stats.connected_members(), 5);
        assert_eq!(
            stats.size_histogram,
            BTreeMap::from([(1, 1), (2, 1), (3, 1)])
        );
        assert!((stats.mean_component_size - 2.0).abs() < 1e-10);
        assert!(!stats.is_flat());
    }

    #[test]
    fn duplicate_neighbors_reported() {
        let stats = stats_of(vec![Record::with_neighbors("a", ["b", "b", "b"])]);
        assert_eq!(stats.duplicate_neighbors, 2);
        assert_eq!(stats.edge_count, 3);
    }
}
