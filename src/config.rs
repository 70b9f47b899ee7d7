//! Fitting options and TOML configuration.
//!
//! ```
//! use ipf_engine::{FitConfig, SeedMode};
//!
//! let config = FitConfig::from_toml_str(r#"
//!     [options]
//!     max_iterations = 50
//!     seed = "inferred"
//!
//!     [[constraints]]
//!     dimension = "sex"
//!     targets = [
//!         { category = "M", total = 30.0 },
//!         { category = "F", total = 10.0 },
//!     ]
//!
//!     [[constraints]]
//!     dimension = ["sex", "region"]
//!     targets = [{ category = ["M", "north"], total = 12.0 }]
//! "#).unwrap();
//!
//! assert_eq!(config.options.max_iterations, 50);
//! assert_eq!(config.options.seed, SeedMode::Inferred);
//! assert_eq!(config.constraints.len(), 2);
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::constraint::Constraint;
use crate::error::{ConfigError, IpfError, Result};

/// How the weight column is initialized before the first pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedMode {
    /// Every row starts at 1.
    #[default]
    Uniform,
    /// Rows start at `1 + projection`, the projection coming from the
    /// principal axis of the constraint design matrix.
    Inferred,
}

/// What to do with a group whose current total is zero but whose target is not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    #[default]
    Error,
    /// Leave the group's weights unchanged and log a warning.
    Skip,
}

/// Options for the fitting loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub seed: SeedMode,
    pub max_iterations: usize,
    /// Stop once the summed absolute weight change of a full pass is
    /// strictly below this value.
    pub tolerance: f64,
    pub degenerate_policy: DegeneratePolicy,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            seed: SeedMode::Uniform,
            max_iterations: 100,
            tolerance: 1e-6,
            degenerate_policy: DegeneratePolicy::Error,
        }
    }
}

impl FitOptions {
    pub fn with_seed(mut self, seed: SeedMode) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_degenerate_policy(mut self, policy: DegeneratePolicy) -> Self {
        self.degenerate_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(IpfError::InvalidOptions(
                "max_iterations must be positive".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(IpfError::InvalidOptions(format!(
                "tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// A complete fitting job: options plus the ordered constraint list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FitConfig {
    #[serde(default)]
    pub options: FitOptions,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl FitConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(ConfigError::from)?;
        config.options.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::from)?;
        Self::from_toml_str(&contents)
    }
}
