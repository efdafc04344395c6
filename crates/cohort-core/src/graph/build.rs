//! Relation graph construction from member records.
//!
//! # Overview
//!
//! Each record names an identifier and, optionally, the identifiers it coaches
//! or is coached by. Edges carry no direction: a coach and a student end up in
//! the same component whichever side listed the relationship.
//!
//! ## Node Numbering
//!
//! Identifiers get dense [`NodeIndex`] values in first-seen order, whether
//! they are seen as a record's own identifier or as a neighbor. The partition
//! relies on that order when it numbers components.
//!
//! ## Duplicate Neighbors
//!
//! A record that lists the same neighbor twice produces a parallel edge under
//! [`DuplicateNeighborPolicy::Preserve`]. Parallel edges never change
//! connectivity, only degrees and the edge count. The number of duplicates is
//! always reported in [`BuildReport`] and logged.
//!
//! ## Content Hash
//!
//! The graph carries a BLAKE3 hash of the consumed records in input order, so
//! a selection can be tied to the exact snapshot it was computed from.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::record::Record;

// ---------------------------------------------------------------------------
// Policy / report
// ---------------------------------------------------------------------------

/// How repeated neighbor identifiers within one record are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateNeighborPolicy {
    /// Every listed neighbor adds an edge, duplicates included.
    #[default]
    Preserve,
    /// A neighbor already linked to the record's identifier is skipped.
    Collapse,
}

/// Counters gathered while building a [`RelationGraph`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub records: usize,
    pub isolated_records: usize,
    /// Neighbor entries repeated within the same record.
    pub duplicate_neighbors: usize,
    /// Edges skipped because of [`DuplicateNeighborPolicy::Collapse`].
    pub collapsed_edges: usize,
}

// ---------------------------------------------------------------------------
// IdentifierIndex
// ---------------------------------------------------------------------------

/// Bidirectional map between identifiers and dense node indices.
#[derive(Debug, Default, Clone)]
pub struct IdentifierIndex {
    names: Vec<String>,
    lookup: HashMap<String, NodeIndex>,
}

impl IdentifierIndex {
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<NodeIndex> {
        self.lookup.get(identifier).copied()
    }

    #[must_use]
    pub fn name(&self, idx: NodeIndex) -> Option<&str> {
        self.names.get(idx.index()).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Identifiers in node-index order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    fn insert(&mut self, identifier: &str, idx: NodeIndex) {
        debug_assert_eq!(idx.index(), self.names.len());
        self.names.push(identifier.to_string());
        self.lookup.insert(identifier.to_string(), idx);
    }
}

// ---------------------------------------------------------------------------
// RelationGraph
// ---------------------------------------------------------------------------

/// Undirected relation graph over member identifiers.
///
/// Mutated only while it is being built; all downstream consumers borrow it
/// immutably.
#[derive(Debug, Clone)]
pub struct RelationGraph {
    graph: UnGraph<(), ()>,
    index: IdentifierIndex,
    policy: DuplicateNeighborPolicy,
    report: BuildReport,
    content_hash: String,
}

impl Default for RelationGraph {
    fn default() -> Self {
        Self::new(DuplicateNeighborPolicy::default())
    }
}

impl RelationGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new(policy: DuplicateNeighborPolicy) -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            index: IdentifierIndex::default(),
            policy,
            report: BuildReport::default(),
            content_hash: hash_records(&[]),
        }
    }

    /// Build a graph from a record stream.
    ///
    /// An absent or empty neighbor list adds an isolated node; otherwise one
    /// edge is added per listed neighbor, subject to `policy`.
    #[instrument(skip(records))]
    pub fn from_records<I>(records: I, policy: DuplicateNeighborPolicy) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        let mut graph = Self::new(policy);
        let mut hasher = blake3::Hasher::new();

        for record in records {
            hash_record(&mut hasher, &record);
            graph.add_record(&record);
        }

        graph.content_hash = format!("blake3:{}", hasher.finalize());

        if graph.report.duplicate_neighbors > 0 {
            warn!(
                duplicates = graph.report.duplicate_neighbors,
                ?policy,
                "records list the same neighbor more than once"
            );
        }
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            records = graph.report.records,
            "relation graph built"
        );

        graph
    }

    /// Add an identifier if it is not already known; return its index.
    pub fn add_node(&mut self, identifier: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(identifier) {
            return idx;
        }
        let idx = self.graph.add_node(());
        self.index.insert(identifier, idx);
        idx
    }

    /// Add an undirected edge, creating either endpoint if needed.
    ///
    /// A self-edge is stored once and lists its node once among its
    /// neighbors.
    pub fn add_edge(&mut self, src: &str, dst: &str) {
        let a = self.add_node(src);
        let b = self.add_node(dst);
        self.graph.add_edge(a, b, ());
    }

    fn add_record(&mut self, record: &Record) {
        self.report.records += 1;
        let neighbors = record.neighbor_list();
        if neighbors.is_empty() {
            self.report.isolated_records += 1;
            self.add_node(&record.identifier);
            return;
        }

        let mut seen: HashSet<&str> = HashSet::with_capacity(neighbors.len());
        for neighbor in neighbors {
            if !seen.insert(neighbor.as_str()) {
                self.report.duplicate_neighbors += 1;
            }
            if self.policy == DuplicateNeighborPolicy::Collapse {
                if let (Some(a), Some(b)) = (self.index.get(&record.identifier), self.index.get(neighbor)) {
                    if self.graph.contains_edge(a, b) {
                        self.report.collapsed_edges += 1;
                        continue;
                    }
                }
            }
            self.add_edge(&record.identifier, neighbor);
        }
    }

    /// Number of distinct identifiers.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of `add_edge` calls that produced an edge.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    #[must_use]
    pub fn node_index(&self, identifier: &str) -> Option<NodeIndex> {
        self.index.get(identifier)
    }

    #[must_use]
    pub fn identifier(&self, idx: NodeIndex) -> Option<&str> {
        self.index.name(idx)
    }

    /// Adjacent nodes of `idx`; parallel edges repeat their neighbor.
    pub fn neighbors(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors(idx)
    }

    #[must_use]
    pub fn index(&self) -> &IdentifierIndex {
        &self.index
    }

    #[must_use]
    pub const fn policy(&self) -> DuplicateNeighborPolicy {
        self.policy
    }

    #[must_use]
    pub const fn report(&self) -> &BuildReport {
        &self.report
    }

    /// BLAKE3 hash of the records this graph was built from.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Underlying petgraph graph.
    #[must_use]
    pub const fn inner(&self) -> &UnGraph<(), ()> {
        &self.graph
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn hash_record(hasher: &mut blake3::Hasher, record: &Record) {
    hasher.update(record.identifier.as_bytes());
    hasher.update(b"\x00");
    for neighbor in record.neighbor_list() {
        hasher.update(neighbor.as_bytes());
        hasher.update(b"\x01");
    }
    hasher.update(b"\x00");
}

fn hash_records(records: &[Record]) -> String {
    let mut hasher = blake3::Hasher::new();
    for record in records {
        hash_record(&mut hasher, record);
    }
    format!("blake3:{}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
