use std::collections::HashSet;

use cohort_core::graph::DuplicateNeighborPolicy;
use cohort_core::select::{SelectionParams, select};
use cohort_core::{Partition, Record, RelationGraph, Tolerance};
use proptest::prelude::*;

fn arb_records() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(
        (0_usize..40, prop::collection::vec(0_usize..40, 0..4)),
        0..60,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .map(|(id, neighbors)| {
                Record::with_neighbors(
                    format!("m{id}"),
                    neighbors.into_iter().map(|n| format!("m{n}")),
                )
            })
            .collect()
    })
}

fn arb_policy() -> impl Strategy<Value = DuplicateNeighborPolicy> {
    prop_oneof![
        Just(DuplicateNeighborPolicy::Preserve),
        Just(DuplicateNeighborPolicy::Collapse),
    ]
}

fn arb_weights() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(prop_oneof![3 => Just(1_usize), 2 => 2_usize..30], 0..40)
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(512))]

    // Partition
    #[test]
    fn every_node_in_exactly_one_component(records in arb_records(), policy in arb_policy()) {
        let graph = RelationGraph::from_records(records, policy);
        let partition = Partition::compute(&graph);

        prop_assert_eq!(partition.sizes().iter().sum::<usize>(), graph.node_count());

        let mut seen = HashSet::new();
        for id in partition.ids() {
            for &node in partition.members(id) {
                prop_assert!(seen.insert(node), "node listed twice");
                prop_assert_eq!(partition.component_of(node), Some(id));
            }
        }
        prop_assert_eq!(seen.len(), graph.node_count());
    }

    #[test]
    fn neighbors_share_a_component(records in arb_records()) {
        let graph = RelationGraph::from_records(records, DuplicateNeighborPolicy::Preserve);
        let partition = Partition::compute(&graph);
        for node in graph.inner().node_indices() {
            for neighbor in graph.neighbors(node) {
                prop_assert_eq!(partition.component_of(node), partition.component_of(neighbor));
            }
        }
    }

    // Graph
    #[test]
    fn adjacency_is_symmetric(records in arb_records(), policy in arb_policy()) {
        let graph = RelationGraph::from_records(records, policy);
        for node in graph.inner().node_indices() {
            for neighbor in graph.neighbors(node) {
                prop_assert!(graph.neighbors(neighbor).any(|back| back == node));
            }
        }
    }

    #[test]
    fn every_mentioned_identifier_is_indexed(records in arb_records()) {
        let graph = RelationGraph::from_records(records.clone(), DuplicateNeighborPolicy::Preserve);
        for record in &records {
            prop_assert!(graph.node_index(&record.identifier).is_some());
            for neighbor in record.neighbor_list() {
                prop_assert!(graph.node_index(neighbor).is_some());
            }
        }
    }

    // Selector
    #[test]
    fn selection_lands_in_accepted_range(
        weights in arb_weights(),
        target in 0_u64..400,
        tolerance in 0_u64..20,
    ) {
        let params = SelectionParams { target, tolerance: Tolerance::Count(tolerance), pinned: None };
        if let Some(selection) = select(&weights, &params).unwrap() {
            let range = params.accepted_range(&weights).unwrap();
            prop_assert!(range.contains(selection.total));

            let sum: usize = selection.indices.iter().map(|&idx| weights[idx]).sum();
            prop_assert_eq!(sum as u64, selection.total);
            prop_assert!(selection.indices.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn pinned_index_is_in_every_feasible_result(
        weights in arb_weights().prop_filter("need a weight", |w| !w.is_empty()),
        pick in any::<prop::sample::Index>(),
        target in 0_u64..400,
        tolerance in 0_u64..20,
    ) {
        let pinned = pick.index(weights.len());
        let params = SelectionParams {
            target,
            tolerance: Tolerance::Count(tolerance),
            pinned: Some(pinned),
        };
        if let Some(selection) = select(&weights, &params).unwrap() {
            prop_assert!(selection.indices.contains(&pinned));
            prop_assert!(params.accepted_range(&weights).unwrap().contains(selection.total));
        }
    }

    #[test]
    fn pinned_fraction_range_is_centered_on_target(
        weights in arb_weights().prop_filter("need a weight", |w| !w.is_empty()),
        pick in any::<prop::sample::Index>(),
        target in 0_u64..400,
        fraction in 0.0_f64..0.5,
    ) {
        let pinned = pick.index(weights.len());
        let params = SelectionParams {
            target,
            tolerance: Tolerance::Fraction(fraction),
            pinned: Some(pinned),
        };
        let remaining = target.saturating_sub(weights[pinned] as u64);
        let range = params.accepted_range(&weights).unwrap();
        prop_assert_eq!(range.tolerance, Tolerance::Fraction(fraction).resolve(remaining).unwrap());
        if let Some(selection) = select(&weights, &params).unwrap() {
            prop_assert!(selection.indices.contains(&pinned));
            prop_assert!(range.contains(selection.total));
        }
    }

    #[test]
    fn full_target_selects_everything(weights in arb_weights()) {
        let total: usize = weights.iter().sum();
        let params = SelectionParams {
            target: total as u64,
            tolerance: Tolerance::Count(0),
            pinned: None,
        };
        let selection = select(&weights, &params).unwrap().expect("full sum is reachable");
        prop_assert_eq!(selection.indices, (0..weights.len()).collect::<Vec<_>>());
    }

    #[test]
    fn selection_is_deterministic(weights in arb_weights(), target in 0_u64..400) {
        let params = SelectionParams { target, tolerance: Tolerance::Fraction(0.05), pinned: None };
        prop_assert_eq!(select(&weights, &params).unwrap(), select(&weights, &params).unwrap());
    }
}
