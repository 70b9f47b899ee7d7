//! Iterative proportional fitting (raking) of row weights to marginal totals.
//!
//! Layout:
//!   - `engine`: the raking loop and the single-constraint adjustment
//!   - `design` / `projection`: optional warm-start weights from the constraint design matrix
//!   - `validate`: before/target/after comparison of marginal totals
//!   - `arrow_adapter`: RecordBatch in, RecordBatch with weight column out
//!
//! ```
//! use ipf_engine::{fit, Constraint, Dataset, FitOptions};
//!
//! let data = Dataset::from_columns([("sex", vec!["M", "M", "M", "F"])]).unwrap();
//! let constraints = [Constraint::new("sex").target("M", 30.0).target("F", 10.0)];
//!
//! let result = fit(&data, &constraints, &FitOptions::default()).unwrap();
//! assert!(result.converged);
//! assert_eq!(result.weights(), &[10.0, 10.0, 10.0, 10.0]);
//! ```

pub mod arrow_adapter;
pub mod config;
pub mod constraint;
pub mod dataset;
pub mod design;
pub mod engine;
pub mod error;
pub mod projection;
pub mod validate;

pub use config::{DegeneratePolicy, FitConfig, FitOptions, SeedMode};
pub use constraint::{CategoryKey, Constraint, Dimension};
pub use dataset::{CategoricalColumn, Dataset};
pub use design::{FeatureEncoder, FeatureMatrix, OneHotInteractionEncoder, build_features};
pub use engine::{FitResult, NonConvergence, adjust, calculate_efficiency, fit};
pub use error::{ConfigError, IpfError, Result};
pub use projection::{LinearProjector, PrincipalAxisProjector, estimate, estimate_with, min_max_scale};
pub use validate::{CategoryComparison, ConstraintReport, ValidationReport, validate};
