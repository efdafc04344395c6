//! Relation graph and connected-component partition.
//!
//! # Overview
//!
//! Records are folded into an undirected petgraph graph keyed by dense
//! [`NodeIndex`](petgraph::graph::NodeIndex) values. The partition then groups
//! every node into exactly one connected component; components are the unit
//! a rollout moves atomically.
//!
//! ## Pipeline
//!
//! ```text
//! (identifier, neighbors) records
//!        ↓  build::RelationGraph::from_records()
//! RelationGraph (UnGraph, identifier index, content hash)
//!        ↓  partition::Partition::compute()
//! Partition (component per node, members per component, sizes)
//!        ↓  stats::PartitionStats::from_partition()
//! PartitionStats (component count, singletons, largest, histogram)
//! ```
//!
//! ## Typical Usage
//!
//! ```rust
//! use cohort_core::graph::{DuplicateNeighborPolicy, Partition, RelationGraph};
//! use cohort_core::Record;
//!
//! let records = vec![
//!     Record::with_neighbors("coach", ["a", "b"]),
//!     Record::isolated("solo"),
//! ];
//! let graph = RelationGraph::from_records(records, DuplicateNeighborPolicy::Preserve);
//! let partition = Partition::compute(&graph);
//!
//! assert_eq!(partition.component_count(), 2);
//! assert_eq!(partition.sizes(), vec![3, 1]);
//! ```

pub mod build;
pub mod partition;
pub mod stats;

pub use build::{BuildReport, DuplicateNeighborPolicy, IdentifierIndex, RelationGraph};
pub use partition::{ComponentId, Partition};
pub use stats::PartitionStats;
