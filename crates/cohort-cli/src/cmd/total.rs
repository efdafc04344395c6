//! `cohort total`: move one identifier's whole component to a new version.

use std::io::{self, Write};

use clap::Args;
use cohort_core::rollout::{self, RolloutReport};

use super::StoreContext;
use crate::output::{OutputMode, fail, pretty_kv, pretty_section, render_mode};

/// Arguments for `cohort total`.
#[derive(Args, Debug)]
pub struct TotalArgs {
    /// Identifier whose connected group is rolled out.
    pub identifier: String,

    /// Version written to every selected member.
    #[arg(long = "to-version", value_name = "VERSION")]
    pub to_version: String,

    /// Compute the selection without rewriting the store.
    #[arg(long)]
    pub dry_run: bool,
}

/// Execute `cohort total`.
pub fn run_total(args: &TotalArgs, output: OutputMode, ctx: &StoreContext) -> anyhow::Result<()> {
    let report = rollout::total_infection(
        &ctx.store(),
        &args.identifier,
        &args.to_version,
        &ctx.options(args.dry_run),
    )
    .map_err(|err| fail(output, err))?;

    render_mode(output, &report, render_report_text, render_report_pretty)
}

/// One summary line, then one identifier per line.
pub fn render_report_text(report: &RolloutReport, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "version={}\tselected={}\tupdated={}\tdry_run={}",
        report.version,
        report.selected(),
        report.updated,
        report.dry_run
    )?;
    for identifier in &report.identifiers {
        writeln!(w, "{identifier}")?;
    }
    Ok(())
}

fn render_report_pretty(report: &RolloutReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Total rollout")?;
    write_summary(report, w)?;
    writeln!(w)?;
    writeln!(w, "Members")?;
    for identifier in &report.identifiers {
        writeln!(w, "  {identifier}")?;
    }
    Ok(())
}

/// Key/value lines shared by total and limited pretty output.
pub fn write_summary(report: &RolloutReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_kv(w, "version", &report.version)?;
    pretty_kv(w, "selected", report.selected().to_string())?;
    let updated = if report.dry_run {
        format!("{} (dry run)", report.updated)
    } else {
        report.updated.to_string()
    };
    pretty_kv(w, "updated", updated)?;
    pretty_kv(w, "snapshot", &report.content_hash)
}
