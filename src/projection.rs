//! Initial-weight estimation: min-max scaling followed by a projection onto
//! the first principal axis.

use faer::{Mat, Side};
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::design::FeatureMatrix;
use crate::error::{IpfError, Result};

/// Reduces a feature matrix to one scalar per row.
pub trait LinearProjector {
    fn project(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>>;
}

/// First principal component from a symmetric eigendecomposition of the
/// sample covariance matrix.
#[derive(Debug, Clone)]
pub struct PrincipalAxisProjector {
    /// Top eigenvalues at or below this count as zero variance.
    pub min_variance: f64,
}

impl Default for PrincipalAxisProjector {
    fn default() -> Self {
        Self { min_variance: 1e-12 }
    }
}

impl PrincipalAxisProjector {
    /// Unit eigenvector of the largest covariance eigenvalue, or `None` when
    /// the data has no variance.
    fn principal_axis(&self, centered: ArrayView2<'_, f64>) -> Result<Option<Array1<f64>>> {
        let (n, p) = centered.dim();
        if n < 2 || p == 0 {
            return Ok(None);
        }
        let cov: Array2<f64> = centered.t().dot(&centered) / (n - 1) as f64;
        let cov = Mat::from_fn(p, p, |i, j| 0.5 * (cov[[i, j]] + cov[[j, i]]));

        let eig = cov
            .as_ref()
            .self_adjoint_eigen(Side::Lower)
            .map_err(|err| IpfError::InvalidData(format!("covariance eigendecomposition failed: {err:?}")))?;
        let values = eig.S();
        let vectors = eig.U();

        let mut top = 0;
        for k in 1..values.dim() {
            if values[k] > values[top] {
                top = k;
            }
        }
        if values[top].is_nan() || values[top] <= self.min_variance {
            return Ok(None);
        }
        let mut axis = Array1::from_shape_fn(p, |i| vectors[(i, top)]);

        // Sign: the first loading of (near) maximal magnitude is positive.
        // Two-level one-hot blocks give exactly opposed loadings.
        let max_abs = axis.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let pivot = axis
            .iter()
            .copied()
            .find(|v| v.abs() >= max_abs * (1.0 - 1e-9))
            .unwrap_or(0.0);
        if pivot < 0.0 {
            axis.mapv_inplace(|v| -v);
        }
        Ok(Some(axis))
    }
}

impl LinearProjector for PrincipalAxisProjector {
    fn project(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let n = features.nrows();
        let Some(mean) = features.mean_axis(Axis(0)) else {
            return Ok(Array1::zeros(n));
        };
        let centered = &features - &mean;
        match self.principal_axis(centered.view())? {
            Some(axis) => Ok(centered.dot(&axis)),
            None => Ok(Array1::zeros(n)),
        }
    }
}

/// Rescale every column to [0, 1]. Constant columns become 0.
pub fn min_max_scale(features: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut scaled = features.to_owned();
    for mut col in scaled.columns_mut() {
        let min = col.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = col.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if range > 0.0 {
            col.mapv_inplace(|v| (v - min) / range);
        } else {
            col.fill(0.0);
        }
    }
    scaled
}

/// Per-row warm-start perturbation using a custom projector.
pub fn estimate_with<P: LinearProjector>(features: &FeatureMatrix, projector: &P) -> Result<Vec<f64>> {
    let scaled = min_max_scale(features.values());
    let projection = projector.project(scaled.view())?;
    if projection.len() != features.n_rows() {
        return Err(IpfError::InvalidData(format!(
            "projection has {} values for {} rows",
            projection.len(),
            features.n_rows()
        )));
    }
    if projection.iter().any(|v| !v.is_finite()) {
        return Err(IpfError::InvalidData(
            "projection produced non-finite values".to_string(),
        ));
    }
    Ok(projection.to_vec())
}

/// Per-row warm-start perturbation along the first principal axis.
pub fn estimate(features: &FeatureMatrix) -> Result<Vec<f64>> {
    estimate_with(features, &PrincipalAxisProjector::default())
}
