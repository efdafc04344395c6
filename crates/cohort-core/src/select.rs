//! Bounded subset selection over component sizes.
//!
//! # Problem
//!
//! Given component sizes `w`, a target `T` and a tolerance `tol`, pick whole
//! components whose sizes sum to anything in `[T − tol, T + tol]`. The answer
//! does not have to be the closest sum, only an acceptable one.
//!
//! # Approach
//!
//! 1. **Singleton pool.** Size-1 components are pulled out of the search. In a
//!    coaching network they are the vast majority, and any shortfall up to
//!    their count can be filled with them afterwards.
//! 2. **Widened bounds.** The remaining sizes only need to reach
//!    `[T − tol − ones, T + tol]`; a hit `R` is topped up with
//!    `min(ones, max(0, T − R))` singletons.
//! 3. **Scan with backtrack points.** Sizes are visited largest first. Each
//!    size is included unless it overflows the upper bound. When an overflow
//!    directly follows an included size, a backtrack point is recorded that
//!    resumes the scan with that included size dropped. Running off the end
//!    pops the latest backtrack point. The first sum inside the bounds wins;
//!    an empty backtrack stack means no acceptable subset was found.
//!
//! # Determinism
//!
//! Sizes are ordered with a stable descending sort, so equal sizes keep
//! ascending component order, and singleton padding takes the lowest
//! component ids first. Identical inputs always produce identical selections.
//!
//! # Pinning
//!
//! A pinned index is always part of the result. Its size is subtracted from
//! `T` before the search, and a fractional tolerance is taken of what remains
//! (`T'`, floored at zero). The accepted range is therefore
//! `pinned + [T' − tol, T' + tol]`.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::error::RolloutError;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Allowed deviation between the realized and the requested count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tolerance {
    /// Absolute number of members.
    Count(u64),
    /// Fraction of the target, rounded down.
    Fraction(f64),
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::Count(0)
    }
}

impl Tolerance {
    /// Normalize to an absolute member count for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutError::InvalidParameter`] for a negative or non-finite
    /// fraction.
    pub fn resolve(self, target: u64) -> Result<u64, RolloutError> {
        match self {
            Self::Count(count) => Ok(count),
            Self::Fraction(fraction) => fraction_of(fraction, target, "tolerance"),
        }
    }
}

/// `floor(fraction × total)` after validating `fraction`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub(crate) fn fraction_of(fraction: f64, total: u64, what: &str) -> Result<u64, RolloutError> {
    if !fraction.is_finite() || fraction < 0.0 {
        return Err(RolloutError::InvalidParameter(format!(
            "{what} fraction must be finite and non-negative, got {fraction}"
        )));
    }
    Ok((fraction * total as f64).floor() as u64)
}

/// Inputs for one selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SelectionParams {
    pub target: u64,
    pub tolerance: Tolerance,
    /// Index that must be part of the result.
    pub pinned: Option<usize>,
}

/// Inclusive range of acceptable realized totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AcceptedRange {
    pub lower: u64,
    pub upper: u64,
    /// Tolerance after normalization to a member count.
    pub tolerance: u64,
}

impl AcceptedRange {
    #[must_use]
    pub const fn contains(&self, total: u64) -> bool {
        self.lower <= total && total <= self.upper
    }
}

impl SelectionParams {
    fn pinned_weight(&self, weights: &[usize]) -> Result<usize, RolloutError> {
        let Some(idx) = self.pinned else {
            return Ok(0);
        };
        weights.get(idx).copied().ok_or_else(|| {
            RolloutError::InvalidParameter(format!(
                "pinned index {idx} out of range for {} weights",
                weights.len()
            ))
        })
    }

    /// Realized totals this query accepts over `weights`.
    ///
    /// A fractional tolerance is resolved against the target left after the
    /// pinned weight is taken out.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutError::InvalidParameter`] for an invalid tolerance or
    /// an out-of-range pinned index.
    pub fn accepted_range(&self, weights: &[usize]) -> Result<AcceptedRange, RolloutError> {
        let pinned = self.pinned_weight(weights)? as u64;
        let tolerance = self.tolerance.resolve(self.target.saturating_sub(pinned))?;
        Ok(AcceptedRange {
            lower: self.target.saturating_sub(tolerance),
            upper: self.target.saturating_add(tolerance),
            tolerance,
        })
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Indices picked by [`select`], with the realized total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsetSelection {
    /// Chosen indices into the weight slice, ascending.
    pub indices: Vec<usize>,
    /// Sum of the chosen weights.
    pub total: u64,
    /// How many size-1 entries were used as padding.
    pub singletons_used: usize,
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Choose indices of `weights` whose sum lands in the accepted range.
///
/// Returns `Ok(None)` when no acceptable subset is found.
///
/// # Errors
///
/// Returns [`RolloutError::InvalidParameter`] for an invalid tolerance or an
/// out-of-range pinned index.
#[instrument(skip(weights), fields(weights = weights.len()))]
pub fn select(
    weights: &[usize],
    params: &SelectionParams,
) -> Result<Option<SubsetSelection>, RolloutError> {
    let tolerance = to_i64(params.accepted_range(weights)?.tolerance);
    let pinned_weight = params.pinned_weight(weights)?;
    let target = to_i64(params.target).saturating_sub(to_i64(pinned_weight));

    let mut ones: Vec<usize> = Vec::new();
    let mut rest: Vec<usize> = Vec::new();
    for (idx, &weight) in weights.iter().enumerate() {
        if Some(idx) == params.pinned {
            continue;
        }
        if weight == 1 {
            ones.push(idx);
        } else {
            rest.push(idx);
        }
    }

    // Stable: equal weights keep ascending index order.
    rest.sort_by(|&a, &b| weights[b].cmp(&weights[a]));
    let sorted: Vec<i64> = rest.iter().map(|&idx| to_i64(weights[idx])).collect();

    let pool = to_i64(ones.len());
    let lower = target.saturating_sub(tolerance).saturating_sub(pool);
    let upper = target.saturating_add(tolerance);
    debug!(
        adjusted_target = target,
        tolerance,
        singletons = ones.len(),
        candidates = rest.len(),
        lower,
        upper,
        "searching non-singleton components"
    );

    let Some(picked) = search(&sorted, lower, upper) else {
        debug!("no subset within bounds");
        return Ok(None);
    };

    let found: i64 = picked.iter().map(|&pos| sorted[pos]).sum();
    let singletons_used = usize::try_from((target - found).clamp(0, pool)).unwrap_or(0);

    let mut indices: Vec<usize> = params.pinned.into_iter().collect();
    indices.extend(picked.iter().map(|&pos| rest[pos]));
    indices.extend_from_slice(&ones[..singletons_used]);
    indices.sort_unstable();

    let total = indices.iter().map(|&idx| weights[idx] as u64).sum();
    debug!(total, singletons_used, chosen = indices.len(), "subset selected");

    Ok(Some(SubsetSelection {
        indices,
        total,
        singletons_used,
    }))
}

/// Saved scan state: resume at `next` with `chosen` / `sum` as the prefix.
#[derive(Debug)]
struct Backtrack {
    chosen: Vec<usize>,
    sum: i64,
    next: usize,
}

/// Find positions in `sorted` (descending) whose sum lies in `[lower, upper]`.
fn search(sorted: &[i64], lower: i64, upper: i64) -> Option<Vec<usize>> {
    if upper < 0 {
        return None;
    }
    if lower <= 0 {
        return Some(Vec::new());
    }

    let mut chosen: Vec<usize> = Vec::new();
    let mut sum = 0_i64;
    let mut stack: Vec<Backtrack> = Vec::new();
    let mut pos = 0;

    loop {
        if pos == sorted.len() {
            let point = stack.pop()?;
            trace!(resume = point.next, depth = stack.len(), "backtracking");
            chosen = point.chosen;
            sum = point.sum;
            pos = point.next;
            continue;
        }

        let candidate = sum + sorted[pos];
        if (lower..=upper).contains(&candidate) {
            chosen.push(pos);
            return Some(chosen);
        } else if candidate > upper {
            // Only an included predecessor gives a distinct exclude branch.
            if let Some(&last) = chosen.last().filter(|&&last| last + 1 == pos) {
                let mut prefix = chosen.clone();
                prefix.pop();
                stack.push(Backtrack {
                    chosen: prefix,
                    sum: sum - sorted[last],
                    next: last + 1,
                });
            }
        } else {
            chosen.push(pos);
            sum = candidate;
        }
        pos += 1;
    }
}

fn to_i64<T: TryInto<i64>>(value: T) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
