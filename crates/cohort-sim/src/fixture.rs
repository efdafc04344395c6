//! Coaching-network fixture shapes.
//!
//! Members are named `id` followed by their zero-padded 13-digit ordinal.
//! Every `coach_ratio`-th member is a coach; which members it coaches depends
//! on the [`Shape`]:
//!
//! - **Coached**: the members after the coach, up to the next coach, taking
//!   every `stride`-th one.
//! - **Schools**: every `stride`-th member of the coach's school, starting at
//!   an offset that grows with the coach's rank in the school. A school's
//!   range ends one past its last member, so the next school's first member
//!   is reachable too.
//! - **Random**: `edges` distinct member pairs drawn from a seeded RNG.
//! - **Isolated**: no relationships at all.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use cohort_core::{FlatFileStore, Record};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Version written to every generated line unless overridden.
pub const DEFAULT_VERSION: &str = "1.1";

/// Identifier of the `ordinal`-th generated member.
#[must_use]
pub fn identifier(ordinal: usize) -> String {
    format!("id{ordinal:013}")
}

/// How generated members relate to each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Isolated,
    Coached {
        coach_ratio: usize,
        stride: usize,
    },
    Schools {
        coach_ratio: usize,
        school_size: usize,
        stride: usize,
    },
    Random {
        edges: usize,
        seed: u64,
    },
}

/// A complete fixture description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureSpec {
    pub users: usize,
    pub version: String,
    pub shape: Shape,
}

impl FixtureSpec {
    #[must_use]
    pub fn new(users: usize, shape: Shape) -> Self {
        Self {
            users,
            version: DEFAULT_VERSION.to_string(),
            shape,
        }
    }

    #[must_use]
    pub fn isolated(users: usize) -> Self {
        Self::new(users, Shape::Isolated)
    }

    #[must_use]
    pub fn coached(users: usize, coach_ratio: usize, stride: usize) -> Self {
        Self::new(users, Shape::Coached { coach_ratio, stride })
    }

    #[must_use]
    pub fn schools(users: usize, coach_ratio: usize, school_size: usize, stride: usize) -> Self {
        Self::new(
            users,
            Shape::Schools {
                coach_ratio,
                school_size,
                stride,
            },
        )
    }

    #[must_use]
    pub fn random(users: usize, edges: usize, seed: u64) -> Self {
        Self::new(users, Shape::Random { edges, seed })
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Reject shapes that cannot be generated.
    ///
    /// # Errors
    ///
    /// Returns an error if a ratio, school size, or stride is zero.
    pub fn validate(&self) -> Result<()> {
        match self.shape {
            Shape::Isolated | Shape::Random { .. } => {}
            Shape::Coached { coach_ratio, stride } => {
                ensure!(coach_ratio > 0, "coach ratio must be at least 1");
                ensure!(stride > 0, "stride must be at least 1");
            }
            Shape::Schools {
                coach_ratio,
                school_size,
                stride,
            } => {
                ensure!(coach_ratio > 0, "coach ratio must be at least 1");
                ensure!(school_size > 0, "school size must be at least 1");
                ensure!(stride > 0, "stride must be at least 1");
            }
        }
        Ok(())
    }

    /// Generate one record per member, in ordinal order.
    ///
    /// # Errors
    ///
    /// Returns an error if the fixture shape is invalid.
    pub fn records(&self) -> Result<Vec<Record>> {
        self.validate()?;
        let users = self.users;

        let records = match self.shape {
            Shape::Isolated => (0..users).map(|i| Record::isolated(identifier(i))).collect(),
            Shape::Coached { coach_ratio, stride } => (0..users)
                .map(|i| {
                    if i % coach_ratio != 0 {
                        return Record::isolated(identifier(i));
                    }
                    let lower = i + 1;
                    let upper = lower + coach_ratio - 1;
                    coach(i, lower, upper.min(users), stride)
                })
                .collect(),
            Shape::Schools {
                coach_ratio,
                school_size,
                stride,
            } => (0..users)
                .map(|i| {
                    if i % coach_ratio != 0 {
                        return Record::isolated(identifier(i));
                    }
                    let lower = (i / school_size) * school_size + 1;
                    let upper = lower + school_size;
                    let offset = (i % school_size) / coach_ratio;
                    coach(i, lower + offset, upper.min(users), stride)
                })
                .collect(),
            Shape::Random { edges, seed } => random_records(users, edges, seed),
        };

        Ok(records)
    }

    /// Write the fixture as a flat-file store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the fixture shape is invalid or the file cannot be
    /// written.
    pub fn write_to(&self, path: &Path) -> Result<usize> {
        let records = self.records()?;
        let written = FlatFileStore::open(path)
            .write_records(&records, &self.version)
            .with_context(|| format!("failed to write fixture to {}", path.display()))?;
        info!(path = %path.display(), users = written, shape = ?self.shape, "fixture written");
        Ok(written)
    }
}

fn coach(ordinal: usize, start: usize, end: usize, stride: usize) -> Record {
    let students = (start..end).step_by(stride).map(identifier);
    Record::with_neighbors(identifier(ordinal), students)
}

fn random_records(users: usize, edges: usize, seed: u64) -> Vec<Record> {
    let mut neighbors: Vec<Vec<String>> = vec![Vec::new(); users];
    if users > 1 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut added = 0;

        // Extra attempts absorb rejected self-pairs and repeats.
        for _ in 0..edges.saturating_mul(3) {
            if added >= edges {
                break;
            }
            let a = rng.gen_range(0..users);
            let b = rng.gen_range(0..users);
            if a == b || !seen.insert((a.min(b), a.max(b))) {
                continue;
            }
            neighbors[a].push(identifier(b));
            added += 1;
        }
    }

    neighbors
        .into_iter()
        .enumerate()
        .map(|(i, list)| Record::with_neighbors(identifier(i), list))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_zero_padded() {
        assert_eq!(identifier(1), "id0000000000001");
        assert_eq!(identifier(9_999), "id0000000009999");
    }

    #[test]
    fn coached_shape_links_every_other_follower() {
        let records = FixtureSpec::coached(10, 5, 2).records().unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(
            records[0].neighbor_list(),
            &[identifier(1), identifier(3)]
        );
        assert!(records[1].neighbor_list().is_empty());
        assert_eq!(
            records[5].neighbor_list(),
            &[identifier(6), identifier(8)]
        );
    }

    #[test]
    fn coached_shape_clips_at_population() {
        let records = FixtureSpec::coached(3, 5, 1).records().unwrap();
        assert_eq!(records[0].neighbor_list(), &[identifier(1), identifier(2)]);
    }

    #[test]
    fn schools_shift_by_coach_rank() {
        let records = FixtureSpec::schools(8, 2, 4, 2).records().unwrap();
        // School 0 spans 1..5; coach 2 is rank 1 so it starts one later.
        assert_eq!(records[0].neighbor_list(), &[identifier(1), identifier(3)]);
        assert_eq!(records[2].neighbor_list(), &[identifier(2), identifier(4)]);
        // School 1 spans 5..9, clipped to 8.
        assert_eq!(records[4].neighbor_list(), &[identifier(5), identifier(7)]);
    }

    #[test]
    fn random_shape_is_reproducible() {
        let first = FixtureSpec::random(50, 40, 7).records().unwrap();
        let second = FixtureSpec::random(50, 40, 7).records().unwrap();
        assert_eq!(first, second);

        let edges: usize = first.iter().map(|r| r.neighbor_list().len()).sum();
        assert!(edges <= 40);
    }

    #[test]
    fn random_shape_handles_tiny_populations() {
        assert_eq!(FixtureSpec::random(0, 10, 1).records().unwrap().len(), 0);
        let single = FixtureSpec::random(1, 10, 1).records().unwrap();
        assert!(single[0].neighbor_list().is_empty());
    }

    #[test]
    fn zero_stride_is_rejected() {
        let err = FixtureSpec::coached(10, 5, 0).records().unwrap_err();
        assert!(err.to_string().contains("stride"));
    }

    #[test]
    fn write_to_emits_store_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.tsv");
        let written = FixtureSpec::coached(4, 2, 1)
            .with_version("0.9")
            .write_to(&path)
            .unwrap();
        assert_eq!(written, 4);

        let contents = std::fs::read_to_string(&path).unwrap();
        let first = contents.lines().next().unwrap();
        assert_eq!(first, format!("{}\t0.9\t{}", identifier(0), identifier(1)));
    }
}
