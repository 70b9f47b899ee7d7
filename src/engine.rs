//! Core IPF (Iterative Proportional Fitting / raking) algorithm.
//!
//! Rows are partitioned once per constraint; every pass then works on plain
//! `f64` slices of weights.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{DegeneratePolicy, FitOptions, SeedMode};
use crate::constraint::Constraint;
use crate::dataset::Dataset;
use crate::design;
use crate::error::{IpfError, Result};
use crate::projection;

/// Outcome of a fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    pub dataset: Dataset,
    pub iterations: usize,
    pub converged: bool,
    /// `Σ|w_after − w_before|` of the last completed pass.
    pub last_delta: f64,
    pub tolerance: f64,
    pub efficiency: f64,
    pub weight_min: f64,
    pub weight_max: f64,
}

impl FitResult {
    pub fn weights(&self) -> &[f64] {
        self.dataset.weights()
    }

    pub fn weight_ratio(&self) -> f64 {
        if self.weight_min > 0.0 {
            self.weight_max / self.weight_min
        } else {
            f64::INFINITY
        }
    }

    /// `Some` when the iteration cap was reached before the tolerance was met.
    pub fn non_convergence(&self) -> Option<NonConvergence> {
        (!self.converged).then_some(NonConvergence {
            iterations: self.iterations,
            last_delta: self.last_delta,
            tolerance: self.tolerance,
        })
    }
}

/// Notice that a fit stopped at its iteration cap. The weights are still usable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonConvergence {
    pub iterations: usize,
    pub last_delta: f64,
    pub tolerance: f64,
}

// ---------------------------------------------------------------------------
// Group plan: built once per constraint, reused across all passes
// ---------------------------------------------------------------------------

/// A constrained group: its rows and target total.
#[derive(Debug, Clone)]
struct TargetGroup {
    category: Vec<String>,
    rows: Vec<usize>,
    target: f64,
}

/// Row partition for one constraint. Groups without a target are left out,
/// which is the same as giving them a factor of 1. Every targeted category
/// gets a group, even one with no rows: a non-zero target over zero rows is
/// degenerate, a zero target over zero rows is neutral.
#[derive(Debug, Clone)]
pub(crate) struct MarginPlan {
    dimension: Vec<String>,
    groups: Vec<TargetGroup>,
}

impl MarginPlan {
    pub(crate) fn build(dataset: &Dataset, constraint: &Constraint) -> Result<Self> {
        constraint.validate()?;
        let dimension = constraint.dimension().attributes().to_vec();
        let columns = dataset.dimension_columns(&dimension)?;
        let partition = dataset.partition(&dimension)?;

        let mut groups = Vec::new();
        for (category, &target) in constraint.targets() {
            // An unseen level and an empty joint cell both mean no rows.
            let rows = dataset
                .encode_key(&columns, category)
                .and_then(|key| partition.get(&key).cloned())
                .unwrap_or_default();
            groups.push(TargetGroup {
                category: category.clone(),
                rows,
                target,
            });
        }

        Ok(Self { dimension, groups })
    }
}

// ---------------------------------------------------------------------------
// Single-constraint adjustment
// ---------------------------------------------------------------------------

/// Scale weights so every targeted group of one constraint sums to its target.
///
/// All factors are computed before any weight is written, so an error leaves
/// `weights` untouched.
pub(crate) fn adjust_margin(
    weights: &mut [f64],
    plan: &MarginPlan,
    policy: DegeneratePolicy,
) -> Result<()> {
    let current_weights: &[f64] = weights;
    let factors: Vec<f64> = plan
        .groups
        .par_iter()
        .map(|group| {
            let current: f64 = group.rows.iter().map(|&i| current_weights[i]).sum();
            group_factor(plan, group, current, policy)
        })
        .collect::<Result<_>>()?;

    for (group, &factor) in plan.groups.iter().zip(&factors) {
        if factor == 1.0 {
            continue;
        }
        for &i in &group.rows {
            weights[i] *= factor;
        }
    }
    Ok(())
}

fn group_factor(
    plan: &MarginPlan,
    group: &TargetGroup,
    current: f64,
    policy: DegeneratePolicy,
) -> Result<f64> {
    if current == 0.0 && group.target == 0.0 {
        return Ok(1.0);
    }
    let factor = group.target / current;
    if factor.is_finite() {
        return Ok(factor);
    }
    match policy {
        DegeneratePolicy::Error => Err(IpfError::DegenerateGroup {
            dimension: plan.dimension.clone(),
            category: group.category.clone(),
            target: group.target,
        }),
        DegeneratePolicy::Skip => {
            warn!(
                dimension = ?plan.dimension,
                category = ?group.category,
                target = group.target,
                current,
                "skipping degenerate group"
            );
            Ok(1.0)
        }
    }
}

/// Apply one constraint to a copy of `dataset`.
pub fn adjust(dataset: &Dataset, constraint: &Constraint, policy: DegeneratePolicy) -> Result<Dataset> {
    let plan = MarginPlan::build(dataset, constraint)?;
    let mut weights = dataset.weights().to_vec();
    adjust_margin(&mut weights, &plan, policy)?;
    let mut out = dataset.clone();
    out.set_weights(weights)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Weighting efficiency
// ---------------------------------------------------------------------------

/// Efficiency = (sum(w))^2 / (n * sum(w^2)) * 100
/// Uniform weights = 100%.
pub fn calculate_efficiency(weights: &[f64]) -> f64 {
    let n = weights.len() as f64;
    if n == 0.0 {
        return 0.0;
    }

    let sum_w: f64 = weights.iter().sum();
    let sum_w_sq: f64 = weights.iter().map(|w| w * w).sum();

    if sum_w_sq == 0.0 {
        return 0.0;
    }

    (sum_w * sum_w) / (n * sum_w_sq) * 100.0
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Initial weights for a fit.
fn seed_weights(dataset: &Dataset, constraints: &[Constraint], seed: SeedMode) -> Result<Vec<f64>> {
    let n = dataset.len();
    match seed {
        SeedMode::Uniform => Ok(vec![1.0; n]),
        SeedMode::Inferred => {
            let features = design::build_features(dataset, constraints)?;
            let projection = projection::estimate(&features)?;
            Ok(projection.into_iter().map(|p| 1.0 + p).collect())
        }
    }
}

/// Rake `dataset` against `constraints`, applied in order on every pass.
///
/// The caller's dataset is never modified; on success the fitted copy is
/// returned inside [`FitResult`]. Stopping at `max_iterations` is not an
/// error: check [`FitResult::converged`].
pub fn fit(dataset: &Dataset, constraints: &[Constraint], opts: &FitOptions) -> Result<FitResult> {
    opts.validate()?;
    if constraints.is_empty() {
        return Err(IpfError::InvalidOptions(
            "at least one constraint is required".to_string(),
        ));
    }

    // Plans validate every constraint against the schema before any work.
    let plans: Vec<MarginPlan> = constraints
        .iter()
        .map(|c| MarginPlan::build(dataset, c))
        .collect::<Result<_>>()?;

    let n = dataset.len();
    if n == 0 {
        return Ok(FitResult {
            dataset: dataset.clone(),
            iterations: 0,
            converged: true,
            last_delta: 0.0,
            tolerance: opts.tolerance,
            efficiency: 100.0,
            weight_min: 1.0,
            weight_max: 1.0,
        });
    }

    let mut weights = seed_weights(dataset, constraints, opts.seed)?;

    let mut last_delta = f64::INFINITY;
    let mut converged = false;
    let mut iteration = 0;

    // Reused each pass.
    let mut old_weights = vec![0.0_f64; n];

    for iter in 1..=opts.max_iterations {
        iteration = iter;
        old_weights.copy_from_slice(&weights);

        for plan in &plans {
            adjust_margin(&mut weights, plan, opts.degenerate_policy)?;
        }

        last_delta = weights
            .iter()
            .zip(old_weights.iter())
            .map(|(w, o)| (w - o).abs())
            .sum();
        debug!(iteration = iter, delta = last_delta, "raking pass");

        if last_delta < opts.tolerance {
            converged = true;
            break;
        }
    }

    if converged {
        info!(iterations = iteration, delta = last_delta, "raking converged");
    } else {
        warn!(
            iterations = iteration,
            delta = last_delta,
            tolerance = opts.tolerance,
            "raking stopped at iteration cap without converging"
        );
    }

    let efficiency = calculate_efficiency(&weights);
    let weight_min = weights.iter().cloned().fold(f64::INFINITY, f64::min);
    let weight_max = weights.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let mut fitted = dataset.clone();
    fitted.set_weights(weights)?;

    Ok(FitResult {
        dataset: fitted,
        iterations: iteration,
        converged,
        last_delta,
        tolerance: opts.tolerance,
        efficiency,
        weight_min,
        weight_max,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
