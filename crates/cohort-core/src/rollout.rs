//! Total and limited rollouts.
//!
//! [`RolloutEngine`] owns one built graph and its partition and answers
//! selection queries against them. The free functions [`total_infection`] and
//! [`limited_infection`] wrap a full pass: read the store, build, select, and
//! rewrite the version of every selected member.
//!
//! A limited rollout either moves whole components whose sizes land inside
//! the accepted range, or moves nothing and reports why.

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::RolloutError;
use crate::graph::{ComponentId, DuplicateNeighborPolicy, Partition, PartitionStats, RelationGraph};
use crate::record::Record;
use crate::select::{self, AcceptedRange, SelectionParams, Tolerance, fraction_of};
use crate::store::{FlatFileStore, validate_version};
use crate::timing::timed;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// How many members a limited rollout should move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSpec {
    /// Absolute member count.
    Count(u64),
    /// Fraction of all members, rounded down.
    Fraction(f64),
}

impl TargetSpec {
    /// Resolve to a member count for a population of `population`.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutError::InvalidParameter`] for a negative or non-finite
    /// fraction.
    pub fn resolve(self, population: usize) -> Result<u64, RolloutError> {
        match self {
            Self::Count(count) => Ok(count),
            Self::Fraction(fraction) => fraction_of(fraction, population as u64, "target"),
        }
    }
}

/// Parameters of one limited rollout.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitedRequest {
    pub target: TargetSpec,
    pub tolerance: Tolerance,
    /// Identifier whose component must be part of the result.
    pub forced: Option<String>,
}

impl LimitedRequest {
    #[must_use]
    pub const fn new(target: TargetSpec, tolerance: Tolerance) -> Self {
        Self {
            target,
            tolerance,
            forced: None,
        }
    }

    #[must_use]
    pub fn forcing(mut self, identifier: impl Into<String>) -> Self {
        self.forced = Some(identifier.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Components chosen by a feasible limited rollout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitedSelection {
    /// Members of the chosen components, component by component.
    pub identifiers: Vec<String>,
    /// Chosen components, ascending.
    pub components: Vec<ComponentId>,
    /// Resolved target count.
    pub target: u64,
    pub range: AcceptedRange,
    /// Number of members actually selected.
    pub realized: u64,
    pub singletons_used: usize,
}

/// Why a limited rollout selected nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfeasibleReport {
    pub requested: TargetSpec,
    pub requested_tolerance: Tolerance,
    /// Resolved target count.
    pub target: u64,
    pub range: AcceptedRange,
    pub population: usize,
    pub component_count: usize,
    pub largest_component: usize,
    pub forced: Option<String>,
    pub forced_component_size: Option<usize>,
}

/// Result of [`RolloutEngine::limited_infection`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LimitedOutcome {
    Selected(LimitedSelection),
    Infeasible(InfeasibleReport),
}

impl LimitedOutcome {
    /// Selected identifiers; empty when infeasible.
    #[must_use]
    pub fn identifiers(&self) -> &[String] {
        match self {
            Self::Selected(selection) => &selection.identifiers,
            Self::Infeasible(_) => &[],
        }
    }

    #[must_use]
    pub const fn is_feasible(&self) -> bool {
        matches!(self, Self::Selected(_))
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A built relation graph with its component partition.
#[derive(Debug, Clone)]
pub struct RolloutEngine {
    graph: RelationGraph,
    partition: Partition,
}

impl RolloutEngine {
    /// Build the graph and partition it.
    pub fn from_records<I>(records: I, policy: DuplicateNeighborPolicy) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        let graph = timed("graph.build", || RelationGraph::from_records(records, policy));
        Self::from_graph(graph)
    }

    /// Partition an already built graph.
    #[must_use]
    pub fn from_graph(graph: RelationGraph) -> Self {
        let partition = timed("partition", || Partition::compute(&graph));
        Self { graph, partition }
    }

    /// Read `store` and build an engine from its records.
    ///
    /// # Errors
    ///
    /// Propagates store read and parse errors.
    pub fn from_store(
        store: &FlatFileStore,
        policy: DuplicateNeighborPolicy,
    ) -> Result<Self, RolloutError> {
        let records = timed("store.read", || store.read_records())?;
        Ok(Self::from_records(records, policy))
    }

    #[must_use]
    pub const fn graph(&self) -> &RelationGraph {
        &self.graph
    }

    #[must_use]
    pub const fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Every member connected to `identifier`, itself included, in
    /// breadth-first order from the component root.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutError::NotFound`] for an unknown identifier.
    #[instrument(skip(self))]
    pub fn total_infection(&self, identifier: &str) -> Result<Vec<String>, RolloutError> {
        let component = self
            .partition
            .component_for_identifier(&self.graph, identifier)?;
        Ok(self.identifiers_of(&[component]))
    }

    /// Pick whole components whose combined size is acceptable for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutError::InvalidParameter`] for a bad target or
    /// tolerance, and [`RolloutError::NotFound`] for an unknown forced
    /// identifier. Infeasibility is reported through the outcome.
    #[instrument(skip(self), fields(nodes = self.graph.node_count()))]
    pub fn limited_infection(&self, request: &LimitedRequest) -> Result<LimitedOutcome, RolloutError> {
        let target = request.target.resolve(self.graph.node_count())?;
        let pinned = request
            .forced
            .as_deref()
            .map(|id| self.partition.component_for_identifier(&self.graph, id))
            .transpose()?;

        let params = SelectionParams {
            target,
            tolerance: request.tolerance,
            pinned: pinned.map(ComponentId::index),
        };
        let sizes = self.partition.sizes();
        let range = params.accepted_range(&sizes)?;

        let Some(selection) = timed("select", || select::select(&sizes, &params))? else {
            warn!(
                target_count = target,
                lower = range.lower,
                upper = range.upper,
                forced = ?request.forced,
                "no combination of whole components fits the requested range"
            );
            return Ok(LimitedOutcome::Infeasible(InfeasibleReport {
                requested: request.target,
                requested_tolerance: request.tolerance,
                target,
                range,
                population: self.graph.node_count(),
                component_count: sizes.len(),
                largest_component: sizes.iter().copied().max().unwrap_or(0),
                forced: request.forced.clone(),
                forced_component_size: pinned.map(|id| self.partition.size_of(id)),
            }));
        };

        let components: Vec<ComponentId> =
            selection.indices.iter().copied().map(ComponentId).collect();
        let identifiers = self.identifiers_of(&components);
        info!(
            target_count = target,
            realized = selection.total,
            components = components.len(),
            "limited selection found"
        );

        Ok(LimitedOutcome::Selected(LimitedSelection {
            identifiers,
            components,
            target,
            range,
            realized: selection.total,
            singletons_used: selection.singletons_used,
        }))
    }

    #[must_use]
    pub fn stats(&self) -> PartitionStats {
        PartitionStats::from_partition(&self.graph, &self.partition)
    }

    fn identifiers_of(&self, components: &[ComponentId]) -> Vec<String> {
        components
            .iter()
            .flat_map(|&id| self.partition.member_identifiers(&self.graph, id))
            .map(str::to_string)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Store-backed entry points
// ---------------------------------------------------------------------------

/// Knobs shared by the store-backed entry points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RolloutOptions {
    /// Compute the selection without rewriting the store.
    pub dry_run: bool,
    pub duplicate_neighbors: DuplicateNeighborPolicy,
}

/// Which kind of rollout produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutKind {
    Total,
    Limited,
}

/// Outcome of a store-backed rollout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RolloutReport {
    pub kind: RolloutKind,
    pub version: String,
    /// Store lines rewritten; zero for dry runs and infeasible requests.
    pub updated: usize,
    pub identifiers: Vec<String>,
    /// Hash of the records the selection was computed from.
    pub content_hash: String,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<LimitedSelectionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infeasible: Option<InfeasibleReport>,
}

/// Limited-selection figures without the identifier list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitedSelectionSummary {
    pub target: u64,
    pub range: AcceptedRange,
    pub realized: u64,
    pub components: usize,
    pub singletons_used: usize,
}

impl RolloutReport {
    #[must_use]
    pub fn selected(&self) -> usize {
        self.identifiers.len()
    }
}

/// Move the whole component containing `identifier` to `new_version`.
///
/// # Errors
///
/// Returns [`RolloutError::NotFound`] for an unknown identifier, or any store
/// read, parse, lock, or write error.
#[instrument(skip(store, options), fields(store = %store.path().display()))]
pub fn total_infection(
    store: &FlatFileStore,
    identifier: &str,
    new_version: &str,
    options: &RolloutOptions,
) -> Result<RolloutReport, RolloutError> {
    validate_version(new_version)?;
    let engine = RolloutEngine::from_store(store, options.duplicate_neighbors)?;
    let identifiers = engine.total_infection(identifier)?;
    let updated = apply(store, &identifiers, new_version, options)?;

    Ok(RolloutReport {
        kind: RolloutKind::Total,
        version: new_version.to_string(),
        updated,
        identifiers,
        content_hash: engine.graph().content_hash().to_string(),
        dry_run: options.dry_run,
        selection: None,
        infeasible: None,
    })
}

/// Move a set of whole components totalling roughly `target` members to
/// `new_version`. Nothing is written when no acceptable set exists.
///
/// # Errors
///
/// Returns [`RolloutError::InvalidParameter`] for bad parameters,
/// [`RolloutError::NotFound`] for an unknown forced identifier, or any store
/// error.
#[instrument(skip(store, options), fields(store = %store.path().display()))]
pub fn limited_infection(
    store: &FlatFileStore,
    new_version: &str,
    target: TargetSpec,
    tolerance: Tolerance,
    forced: Option<&str>,
    options: &RolloutOptions,
) -> Result<RolloutReport, RolloutError> {
    validate_version(new_version)?;
    let engine = RolloutEngine::from_store(store, options.duplicate_neighbors)?;
    let request = LimitedRequest {
        target,
        tolerance,
        forced: forced.map(str::to_string),
    };

    let mut report = RolloutReport {
        kind: RolloutKind::Limited,
        version: new_version.to_string(),
        updated: 0,
        identifiers: Vec::new(),
        content_hash: engine.graph().content_hash().to_string(),
        dry_run: options.dry_run,
        selection: None,
        infeasible: None,
    };

    match engine.limited_infection(&request)? {
        LimitedOutcome::Selected(selection) => {
            report.updated = apply(store, &selection.identifiers, new_version, options)?;
            report.selection = Some(LimitedSelectionSummary {
                target: selection.target,
                range: selection.range,
                realized: selection.realized,
                components: selection.components.len(),
                singletons_used: selection.singletons_used,
            });
            report.identifiers = selection.identifiers;
        }
        LimitedOutcome::Infeasible(infeasible) => {
            report.infeasible = Some(infeasible);
        }
    }

    Ok(report)
}

fn apply(
    store: &FlatFileStore,
    identifiers: &[String],
    new_version: &str,
    options: &RolloutOptions,
) -> Result<usize, RolloutError> {
    if options.dry_run || identifiers.is_empty() {
        return Ok(0);
    }
    timed("store.update", || store.update_versions(identifiers, new_version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn engine(records: Vec<Record>) -> RolloutEngine {
        RolloutEngine::from_records(records, DuplicateNeighborPolicy::Preserve)
    }

    /// coach1 → 3 students, coach2 → 1 student, three loners.
    fn classroom() -> Vec<Record> {
        vec![
            Record::with_neighbors("coach1", ["s1", "s2", "s3"]),
            Record::with_neighbors("coach2", ["s4"]),
            Record::isolated("l1"),
            Record::isolated("l2"),
            Record::isolated("l3"),
        ]
    }

    fn sorted(mut ids: Vec<String>) -> Vec<String> {
        ids.sort();
        ids
    }

    #[test]
    fn total_infection_returns_whole_component() {
        let engine = engine(classroom());
        let ids = engine.total_infection("s2").unwrap();
        assert_eq!(sorted(ids), vec!["coach1", "s1", "s2", "s3"]);
    }

    #[test]
    fn total_infection_is_idempotent() {
        let engine = engine(classroom());
        assert_eq!(
            engine.total_infection("coach2").unwrap(),
            engine.total_infection("coach2").unwrap()
        );
    }

    #[test]
    fn total_infection_of_unknown_identifier_fails() {
        let err = engine(classroom()).total_infection("ghost").unwrap_err();
        assert!(matches!(err, RolloutError::NotFound { .. }));
    }

    #[test]
    fn limited_exact_count_uses_components_and_padding() {
        let engine = engine(classroom());
        let outcome = engine
            .limited_infection(&LimitedRequest::new(TargetSpec::Count(6), Tolerance::Count(0)))
            .unwrap();
        let LimitedOutcome::Selected(selection) = outcome else {
            panic!("expected a selection");
        };
        assert_eq!(selection.realized, 6);
        assert_eq!(selection.identifiers.len(), 6);
        assert_eq!(selection.singletons_used, 2);
    }

    #[test]
    fn limited_fraction_resolves_against_population() {
        let engine = engine(classroom());
        // 9 members × 0.34 → 3, reachable only with loners.
        let outcome = engine
            .limited_infection(&LimitedRequest::new(
                TargetSpec::Fraction(0.34),
                Tolerance::Count(0),
            ))
            .unwrap();
        assert_eq!(sorted(outcome.identifiers().to_vec()), vec!["l1", "l2", "l3"]);
    }

    #[test]
    fn infeasible_request_reports_parameters() {
        let engine = engine(vec![Record::with_neighbors("coach", ["a", "b", "c"])]);
        let outcome = engine
            .limited_infection(&LimitedRequest::new(TargetSpec::Count(2), Tolerance::Count(0)))
            .unwrap();
        let LimitedOutcome::Infeasible(report) = outcome else {
            panic!("expected infeasible");
        };
        assert_eq!(report.target, 2);
        assert_eq!(report.largest_component, 4);
        assert_eq!((report.range.lower, report.range.upper), (2, 2));
        assert_eq!(report.requested_tolerance, Tolerance::Count(0));
        assert!(report.forced.is_none());
    }

    #[test]
    fn infeasible_report_echoes_fractional_tolerance() {
        let engine = engine(vec![Record::with_neighbors("coach", ["a", "b", "c"])]);
        let outcome = engine
            .limited_infection(&LimitedRequest::new(
                TargetSpec::Count(2),
                Tolerance::Fraction(0.4),
            ))
            .unwrap();
        let LimitedOutcome::Infeasible(report) = outcome else {
            panic!("expected infeasible");
        };
        assert_eq!(report.requested_tolerance, Tolerance::Fraction(0.4));
        assert_eq!(report.range.tolerance, 0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["requested_tolerance"]["fraction"], 0.4);
    }

    #[test]
    fn forced_component_is_always_included() {
        let engine = engine(classroom());
        let outcome = engine
            .limited_infection(
                &LimitedRequest::new(TargetSpec::Count(3), Tolerance::Count(0)).forcing("s4"),
            )
            .unwrap();
        let ids = outcome.identifiers().to_vec();
        assert!(ids.contains(&"coach2".to_string()));
        assert!(ids.contains(&"s4".to_string()));
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn forced_component_too_large_is_infeasible() {
        let engine = engine(classroom());
        let outcome = engine
            .limited_infection(
                &LimitedRequest::new(TargetSpec::Count(2), Tolerance::Count(0)).forcing("coach1"),
            )
            .unwrap();
        let LimitedOutcome::Infeasible(report) = outcome else {
            panic!("expected infeasible");
        };
        assert_eq!(report.forced.as_deref(), Some("coach1"));
        assert_eq!(report.forced_component_size, Some(4));
    }

    #[test]
    fn unknown_forced_identifier_fails() {
        let err = engine(classroom())
            .limited_infection(
                &LimitedRequest::new(TargetSpec::Count(2), Tolerance::Count(0)).forcing("ghost"),
            )
            .unwrap_err();
        assert!(matches!(err, RolloutError::NotFound { .. }));
    }

    #[test]
    fn negative_target_fraction_is_rejected() {
        let err = engine(classroom())
            .limited_infection(&LimitedRequest::new(
                TargetSpec::Fraction(-0.1),
                Tolerance::Count(0),
            ))
            .unwrap_err();
        assert!(matches!(err, RolloutError::InvalidParameter(_)));
    }

    #[test]
    fn stats_reflect_partition() {
        let stats = engine(classroom()).stats();
        assert_eq!(stats.node_count, 9);
        assert_eq!(stats.component_count, 5);
        assert_eq!(stats.singleton_count, 3);
    }

    fn store_with(contents: &str) -> (tempfile::TempDir, FlatFileStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("users.tsv");
        fs::write(&path, contents).expect("write store");
        (dir, FlatFileStore::open(path))
    }

    const STORE: &str = "coach\t1.0\ta,b\na\t1.0\t\nb\t1.0\t\nsolo\t1.0\t\n";

    #[test]
    fn total_entry_point_rewrites_component() {
        let (_dir, store) = store_with(STORE);
        let report =
            total_infection(&store, "a", "2.0", &RolloutOptions::default()).unwrap();
        assert_eq!(report.updated, 3);
        assert!(report.content_hash.starts_with("blake3:"));
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "coach\t2.0\ta,b\na\t2.0\t\nb\t2.0\t\nsolo\t1.0\t\n"
        );
    }

    #[test]
    fn dry_run_leaves_store_untouched() {
        let (_dir, store) = store_with(STORE);
        let options = RolloutOptions {
            dry_run: true,
            ..RolloutOptions::default()
        };
        let report = total_infection(&store, "coach", "2.0", &options).unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.selected(), 3);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), STORE);
    }

    #[test]
    fn limited_entry_point_applies_nothing_when_infeasible() {
        let (_dir, store) = store_with(STORE);
        let report = limited_infection(
            &store,
            "2.0",
            TargetSpec::Count(2),
            Tolerance::Count(0),
            Some("coach"),
            &RolloutOptions::default(),
        )
        .unwrap();
        assert_eq!(report.updated, 0);
        assert!(report.identifiers.is_empty());
        assert!(report.infeasible.is_some());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), STORE);
    }

    #[test]
    fn limited_entry_point_updates_selected_lines() {
        let (_dir, store) = store_with(STORE);
        let report = limited_infection(
            &store,
            "3.0",
            TargetSpec::Count(1),
            Tolerance::Count(0),
            None,
            &RolloutOptions::default(),
        )
        .unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.identifiers, vec!["solo"]);
        assert_eq!(store.version_of("solo").unwrap().as_deref(), Some("3.0"));
        let summary = report.selection.unwrap();
        assert_eq!(summary.realized, 1);
        assert_eq!(summary.singletons_used, 1);
    }

    #[test]
    fn entry_points_reject_bad_versions_before_reading() {
        let store = FlatFileStore::open("/nonexistent/users.tsv");
        let err = total_infection(&store, "a", "", &RolloutOptions::default()).unwrap_err();
        assert!(matches!(err, RolloutError::InvalidParameter(_)));
    }

    #[test]
    fn report_serializes_outcome_status() {
        let engine = engine(vec![Record::with_neighbors("coach", ["a"])]);
        let outcome = engine
            .limited_infection(&LimitedRequest::new(TargetSpec::Count(1), Tolerance::Count(0)))
            .unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "infeasible");
        assert_eq!(json["requested"]["count"], 1);
    }
}
