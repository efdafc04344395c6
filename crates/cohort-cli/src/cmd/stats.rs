//! `cohort stats`: component and version summary for the store.

use std::collections::BTreeMap;
use std::io::Write;

use clap::Args;
use cohort_core::{PartitionStats, RolloutEngine};
use serde::Serialize;

use super::StoreContext;
use crate::output::{OutputMode, fail, pretty_kv, pretty_section, render};

/// Arguments for `cohort stats`.
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Show at most this many histogram rows, largest sizes first.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

/// Report payload for `cohort stats`.
#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub store: String,
    pub partition: PartitionStats,
    /// Members per stored version.
    pub versions: BTreeMap<String, usize>,
}

/// Execute `cohort stats`.
pub fn run_stats(args: &StatsArgs, output: OutputMode, ctx: &StoreContext) -> anyhow::Result<()> {
    let store = ctx.store();
    let engine = RolloutEngine::from_store(&store, ctx.policy()).map_err(|err| fail(output, err))?;
    let versions = store.version_counts().map_err(|err| fail(output, err))?;

    let payload = StoreStats {
        store: store.path().display().to_string(),
        partition: engine.stats(),
        versions,
    };

    render(output, &payload, |payload, w| render_stats_human(payload, args.top, w))
}

fn render_stats_human(payload: &StoreStats, top: usize, w: &mut dyn Write) -> std::io::Result<()> {
    let stats = &payload.partition;

    pretty_section(w, "Partition")?;
    pretty_kv(w, "store", &payload.store)?;
    pretty_kv(w, "members", stats.node_count.to_string())?;
    pretty_kv(w, "edges", stats.edge_count.to_string())?;
    pretty_kv(w, "components", stats.component_count.to_string())?;
    pretty_kv(w, "singletons", stats.singleton_count.to_string())?;
    pretty_kv(w, "largest", stats.largest_component.to_string())?;
    pretty_kv(w, "mean size", format!("{:.2}", stats.mean_component_size))?;
    if stats.duplicate_neighbors > 0 {
        pretty_kv(w, "duplicates", stats.duplicate_neighbors.to_string())?;
    }
    pretty_kv(w, "snapshot", &stats.content_hash)?;

    writeln!(w)?;
    pretty_section(w, "Component sizes")?;
    for (size, count) in stats.size_histogram.iter().rev().take(top) {
        writeln!(w, "{size:>10}  x{count}")?;
    }
    if stats.size_histogram.len() > top {
        writeln!(w, "{:>10}  ({} more sizes)", "...", stats.size_histogram.len() - top)?;
    }

    writeln!(w)?;
    pretty_section(w, "Versions")?;
    for (version, count) in &payload.versions {
        writeln!(w, "{version:>10}  {count}")?;
    }
    Ok(())
}
