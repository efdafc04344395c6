//! `cohort limited`: move whole components totalling roughly a target count.

use std::io::{self, Write};

use clap::Args;
use cohort_core::rollout::{self, InfeasibleReport, RolloutReport, TargetSpec};
use cohort_core::Tolerance;

use super::StoreContext;
use super::total::{render_report_text, write_summary};
use crate::output::{OutputMode, fail, pretty_kv, pretty_section, render_mode};

/// Arguments for `cohort limited`.
#[derive(Args, Debug)]
pub struct LimitedArgs {
    /// Version written to every selected member.
    #[arg(long = "to-version", value_name = "VERSION")]
    pub to_version: String,

    /// Target number of members.
    #[arg(long, conflicts_with = "fraction")]
    pub count: Option<u64>,

    /// Target as a fraction of all members (e.g. 0.1).
    #[arg(long)]
    pub fraction: Option<f64>,

    /// Allowed deviation as a fraction of the target.
    #[arg(long, conflicts_with = "tolerance_count")]
    pub tolerance: Option<f64>,

    /// Allowed deviation as an absolute member count.
    #[arg(long)]
    pub tolerance_count: Option<u64>,

    /// Identifier whose component must be included.
    #[arg(long, value_name = "IDENTIFIER")]
    pub forced: Option<String>,

    /// Compute the selection without rewriting the store.
    #[arg(long)]
    pub dry_run: bool,
}

impl LimitedArgs {
    /// Target from flags, falling back to the configured default fraction.
    fn target(&self, ctx: &StoreContext) -> TargetSpec {
        match (self.count, self.fraction) {
            (Some(count), _) => TargetSpec::Count(count),
            (None, Some(fraction)) => TargetSpec::Fraction(fraction),
            (None, None) => TargetSpec::Fraction(ctx.config.limited.default_fraction),
        }
    }

    /// Tolerance from flags, falling back to the configured default.
    fn tolerance(&self, ctx: &StoreContext) -> Tolerance {
        match (self.tolerance_count, self.tolerance) {
            (Some(count), _) => Tolerance::Count(count),
            (None, Some(fraction)) => Tolerance::Fraction(fraction),
            (None, None) => Tolerance::Fraction(ctx.config.limited.default_tolerance),
        }
    }
}

/// Execute `cohort limited`.
///
/// An infeasible request is reported and exits successfully with nothing
/// updated.
pub fn run_limited(
    args: &LimitedArgs,
    output: OutputMode,
    ctx: &StoreContext,
) -> anyhow::Result<()> {
    let report = rollout::limited_infection(
        &ctx.store(),
        &args.to_version,
        args.target(ctx),
        args.tolerance(ctx),
        args.forced.as_deref(),
        &ctx.options(args.dry_run),
    )
    .map_err(|err| fail(output, err))?;

    render_mode(output, &report, render_limited_text, render_limited_pretty)
}

fn render_limited_text(report: &RolloutReport, w: &mut dyn Write) -> io::Result<()> {
    if let Some(infeasible) = &report.infeasible {
        return writeln!(
            w,
            "infeasible\ttarget={}\tlower={}\tupper={}\ttolerance={}\tforced={}",
            infeasible.target,
            infeasible.range.lower,
            infeasible.range.upper,
            infeasible.range.tolerance,
            infeasible.forced.as_deref().unwrap_or("-")
        );
    }
    render_report_text(report, w)
}

fn render_limited_pretty(report: &RolloutReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Limited rollout")?;
    if let Some(infeasible) = &report.infeasible {
        return write_infeasible(infeasible, w);
    }

    write_summary(report, w)?;
    if let Some(selection) = &report.selection {
        pretty_kv(w, "target", selection.target.to_string())?;
        pretty_kv(
            w,
            "accepted",
            format!("{}..={}", selection.range.lower, selection.range.upper),
        )?;
        pretty_kv(w, "components", selection.components.to_string())?;
        pretty_kv(w, "singletons", selection.singletons_used.to_string())?;
    }
    Ok(())
}

fn write_infeasible(report: &InfeasibleReport, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "No combination of whole groups fits the requested range.")?;
    writeln!(w, "Nothing was updated.")?;
    writeln!(w)?;
    pretty_kv(w, "target", report.target.to_string())?;
    pretty_kv(
        w,
        "accepted",
        format!("{}..={}", report.range.lower, report.range.upper),
    )?;
    pretty_kv(
        w,
        "tolerance",
        format!(
            "{} (±{})",
            describe_tolerance(report.requested_tolerance),
            report.range.tolerance
        ),
    )?;
    pretty_kv(w, "population", report.population.to_string())?;
    pretty_kv(w, "components", report.component_count.to_string())?;
    pretty_kv(w, "largest", report.largest_component.to_string())?;
    if let (Some(forced), Some(size)) = (&report.forced, report.forced_component_size) {
        pretty_kv(w, "forced", format!("{forced} (group of {size})"))?;
    }
    Ok(())
}

/// Tolerance as the caller gave it; fractions apply to the target left after
/// any forced group.
fn describe_tolerance(tolerance: Tolerance) -> String {
    match tolerance {
        Tolerance::Count(count) => format!("{count} members"),
        Tolerance::Fraction(fraction) => format!("{fraction} of target"),
    }
}
