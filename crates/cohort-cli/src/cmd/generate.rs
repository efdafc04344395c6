//! `cohort generate`: write a synthetic coaching-network store.

use std::path::PathBuf;

use clap::Args;
use cohort_sim::{DEFAULT_VERSION, FixtureSpec, Shape};
use serde::Serialize;

use crate::output::{CliError, OutputMode, pretty_kv, render, render_error};

/// Arguments for `cohort generate`.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Store file to write (replaced if it exists).
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,

    /// Number of members.
    #[arg(long)]
    pub users: usize,

    /// Every N-th member is a coach.
    #[arg(long, conflicts_with = "random_edges")]
    pub coach_ratio: Option<usize>,

    /// Confine coaching to schools of this many members.
    #[arg(long, requires = "coach_ratio")]
    pub school_size: Option<usize>,

    /// Coaches take every K-th candidate member.
    #[arg(long, default_value_t = 1)]
    pub stride: usize,

    /// Draw this many random relationships instead of coaching.
    #[arg(long)]
    pub random_edges: Option<usize>,

    /// Seed for `--random-edges`.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Version written to every member.
    #[arg(long, default_value = DEFAULT_VERSION)]
    pub version: String,
}

impl GenerateArgs {
    fn spec(&self) -> FixtureSpec {
        let shape = match (self.random_edges, self.coach_ratio, self.school_size) {
            (Some(edges), _, _) => Shape::Random {
                edges,
                seed: self.seed,
            },
            (None, Some(coach_ratio), Some(school_size)) => Shape::Schools {
                coach_ratio,
                school_size,
                stride: self.stride,
            },
            (None, Some(coach_ratio), None) => Shape::Coached {
                coach_ratio,
                stride: self.stride,
            },
            (None, None, _) => Shape::Isolated,
        };
        FixtureSpec::new(self.users, shape).with_version(self.version.clone())
    }
}

#[derive(Debug, Serialize)]
struct GenerateResult {
    path: String,
    written: usize,
    fixture: FixtureSpec,
}

/// Execute `cohort generate`.
pub fn run_generate(args: &GenerateArgs, output: OutputMode) -> anyhow::Result<()> {
    let spec = args.spec();
    let written = match spec.write_to(&args.out) {
        Ok(written) => written,
        Err(err) => {
            render_error(
                output,
                &CliError::coded(
                    format!("{err:#}"),
                    "generate_failed",
                    Some("ratios, school size, and stride must be at least 1"),
                ),
            )?;
            return Err(err);
        }
    };

    let result = GenerateResult {
        path: args.out.display().to_string(),
        written,
        fixture: spec,
    };

    render(output, &result, |result, w| {
        pretty_kv(w, "wrote", format!("{} members", result.written))?;
        pretty_kv(w, "path", &result.path)?;
        pretty_kv(w, "version", &result.fixture.version)
    })
}
