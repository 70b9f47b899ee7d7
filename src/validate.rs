//! Before/target/after comparison of marginal totals.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use tracing::info;

use crate::constraint::{Constraint, Dimension};
use crate::dataset::Dataset;
use crate::error::Result;

/// One category of one constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryComparison {
    pub category: Vec<String>,
    /// Unweighted row count in the original dataset.
    pub before: Option<usize>,
    pub target: Option<f64>,
    /// Weighted total in the fitted dataset.
    pub after: Option<f64>,
    /// `after - target`.
    pub diff: Option<f64>,
    /// `diff / target * 100`; `None` for a zero target.
    pub pct_diff: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintReport {
    pub dimension: Dimension,
    pub categories: Vec<CategoryComparison>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub constraints: Vec<ConstraintReport>,
    /// Sum of `|diff|` over every category where it is defined.
    pub total_abs_diff: f64,
    /// `total_abs_diff / Σ target * 100`, 0 when all targets are zero.
    pub avg_pct_diff: f64,
}

fn grouped<T>(
    dataset: &Dataset,
    dimension: &[String],
    mut aggregate: impl FnMut(&[usize]) -> T,
) -> Result<IndexMap<Vec<String>, T>> {
    Ok(dataset
        .partition(dimension)?
        .into_iter()
        .map(|(key, rows)| (dataset.decode_key(dimension, &key), aggregate(&rows)))
        .collect())
}

/// Compare achieved marginal totals of `weighted` against `constraints`,
/// with row counts from `original` for context. Neither dataset is modified.
pub fn validate(original: &Dataset, weighted: &Dataset, constraints: &[Constraint]) -> Result<ValidationReport> {
    let mut reports = Vec::with_capacity(constraints.len());
    let mut total_abs_diff = 0.0;
    let mut total_target = 0.0;

    for constraint in constraints {
        constraint.validate()?;
        let dimension = constraint.dimension().attributes();
        let before = grouped(original, dimension, |rows| rows.len())?;
        let weights = weighted.weights();
        let after = grouped(weighted, dimension, |rows| rows.iter().map(|&i| weights[i]).sum::<f64>())?;

        let keys: IndexSet<&Vec<String>> = constraint
            .targets()
            .keys()
            .chain(before.keys())
            .chain(after.keys())
            .collect();

        let categories = keys
            .into_iter()
            .map(|key| {
                let target = constraint.targets().get(key).copied();
                let after = after.get(key).copied();
                let diff = after.zip(target).map(|(a, t)| a - t);
                let pct_diff = diff
                    .zip(target)
                    .filter(|&(_, t)| t != 0.0)
                    .map(|(d, t)| d / t * 100.0);
                if let Some(d) = diff {
                    total_abs_diff += d.abs();
                }
                CategoryComparison {
                    category: key.clone(),
                    before: before.get(key).copied(),
                    target,
                    after,
                    diff,
                    pct_diff,
                }
            })
            .collect();

        total_target += constraint.target_sum();
        reports.push(ConstraintReport {
            dimension: constraint.dimension().clone(),
            categories,
        });
    }

    let avg_pct_diff = if total_target > 0.0 {
        total_abs_diff / total_target * 100.0
    } else {
        0.0
    };
    info!(total_abs_diff, avg_pct_diff, "validated marginal totals");

    Ok(ValidationReport {
        constraints: reports,
        total_abs_diff,
        avg_pct_diff,
    })
}

fn cell(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Comparison of totals:")?;
        for report in &self.constraints {
            writeln!(f)?;
            writeln!(f, "Dimension: {}", report.dimension)?;
            writeln!(
                f,
                "{:<24} {:>10} {:>14} {:>14} {:>14} {:>10}",
                "category", "before", "target", "after", "diff", "% diff"
            )?;
            for c in &report.categories {
                writeln!(
                    f,
                    "{:<24} {:>10} {:>14} {:>14} {:>14} {:>10}",
                    c.category.join(", "),
                    c.before.map_or_else(|| "-".to_string(), |b| b.to_string()),
                    cell(c.target),
                    cell(c.after),
                    cell(c.diff),
                    cell(c.pct_diff),
                )?;
            }
        }
        writeln!(f)?;
        writeln!(f, "Total absolute difference: {}", self.total_abs_diff)?;
        write!(f, "Average percentage difference: {:.4}%", self.avg_pct_diff)
    }
}
