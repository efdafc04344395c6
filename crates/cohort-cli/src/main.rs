#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use cohort_core::{config, timing};
use output::{OutputMode, fail};
use std::env;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "cohort: roll out versions to whole coaching groups",
    long_about = None
)]
struct Cli {
    /// Debug-level logging (ignored when COHORT_LOG is set).
    #[arg(short, long)]
    verbose: bool,

    /// Emit command timing report to stderr.
    #[arg(long, global = true)]
    timing: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Project config file (default: ./cohort.toml if present).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Record store to read and rewrite (overrides the config).
    #[arg(long, global = true, value_name = "PATH")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Rollout",
        about = "Roll out to one identifier's whole group",
        long_about = "Move every member transitively connected to IDENTIFIER to a new version.",
        after_help = "EXAMPLES:\n    # Move a coach and everyone they are connected to\n    cohort total id0000000000001 --to-version 1.17\n\n    # Preview without rewriting the store\n    cohort total id0000000000001 --to-version 1.17 --dry-run --json"
    )]
    Total(cmd::total::TotalArgs),

    #[command(
        next_help_heading = "Rollout",
        about = "Roll out to roughly N members in whole groups",
        long_about = "Move whole groups whose combined size lands within the tolerance of the target. Nothing is written when no combination fits.",
        after_help = "EXAMPLES:\n    # Ten percent of members, exactly\n    cohort limited --to-version 1.34 --fraction 0.1 --tolerance-count 0\n\n    # About 2019 members, within 1%, always including one coach's group\n    cohort limited --to-version 1.34 --count 2019 --tolerance 0.01 --forced id0000000000001"
    )]
    Limited(cmd::limited::LimitedArgs),

    #[command(
        next_help_heading = "Inspect",
        about = "Show group and version statistics",
        long_about = "Summarize the store: members, groups, group-size histogram, and members per version.",
        after_help = "EXAMPLES:\n    # Summary for the configured store\n    cohort stats\n\n    # Emit machine-readable output\n    cohort stats --json"
    )]
    Stats(cmd::stats::StatsArgs),

    #[command(
        next_help_heading = "Fixtures",
        about = "Write a synthetic store",
        long_about = "Generate a deterministic coaching-network store for testing.",
        after_help = "EXAMPLES:\n    # Every 100th member coaches every other member after them\n    cohort generate --out users.tsv --users 10000 --coach-ratio 100 --stride 2\n\n    # Seeded random relationships\n    cohort generate --out users.tsv --users 5000 --random-edges 4000 --seed 7"
    )]
    Generate(cmd::generate::GenerateArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    cohort completions bash\n\n    # Generate zsh completions\n    cohort completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

/// `COHORT_LOG` takes an `EnvFilter` directive; `COHORT_LOG_FORMAT=json`
/// switches to one JSON object per event.
fn init_tracing(verbose: bool) {
    let default_directive = if verbose || env::var_os("DEBUG").is_some() {
        "cohort=debug,info"
    } else {
        "cohort=info,warn"
    };
    let filter = EnvFilter::try_from_env("COHORT_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let registry = tracing_subscriber::registry().with(filter);

    if env::var("COHORT_LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        registry
            .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

/// Stderr, so stdout stays parseable under `--json`.
fn print_timing_report() -> anyhow::Result<()> {
    let report = timing::collect_report();
    let mut err = std::io::stderr().lock();
    if report.is_empty() {
        writeln!(err, "timing report: nothing recorded")?;
        return Ok(());
    }
    writeln!(err, "timing report:\n{}", report.display_table())?;
    writeln!(err, "{}", serde_json::to_string(&report.to_json())?)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let timing_enabled = cli.timing || timing::timing_enabled_from_env();
    timing::set_timing_enabled(timing_enabled);
    timing::clear_timings();

    let project_root = env::current_dir()?;
    let fallback = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let effective = config::resolve_config(&project_root, cli.config.as_deref(), cli.json)
        .map_err(|err| fail(fallback, err))?;
    let output = OutputMode::from_resolved(effective.output);
    let ctx = cmd::StoreContext::new(effective.project, cli.store.clone());

    let command_result = match cli.command {
        Commands::Total(ref args) => {
            timing::timed("cmd.total", || cmd::total::run_total(args, output, &ctx))
        }
        Commands::Limited(ref args) => {
            timing::timed("cmd.limited", || cmd::limited::run_limited(args, output, &ctx))
        }
        Commands::Stats(ref args) => {
            timing::timed("cmd.stats", || cmd::stats::run_stats(args, output, &ctx))
        }
        Commands::Generate(ref args) => {
            timing::timed("cmd.generate", || cmd::generate::run_generate(args, output))
        }
        Commands::Completions(args) => timing::timed("cmd.completions", || {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }),
    };

    if timing_enabled {
        print_timing_report()?;
    }

    command_result
}
