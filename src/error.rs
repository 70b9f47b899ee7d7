//! Error types for ipf-engine.

use arrow::error::ArrowError;
use thiserror::Error;

/// Main error type for fitting operations.
#[derive(Debug, Error)]
pub enum IpfError {
    /// A constrained group has zero current weight but a non-zero target,
    /// so no finite adjustment factor exists.
    #[error("degenerate group {category:?} in dimension {dimension:?}: current total is zero but target is {target}")]
    DegenerateGroup {
        dimension: Vec<String>,
        category: Vec<String>,
        target: f64,
    },

    /// A constraint does not match the dataset schema or its own dimension.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A target total is negative or not finite.
    #[error("invalid target {value} for category {category:?}")]
    InvalidTarget { category: Vec<String>, value: f64 },

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for fitting operations.
pub type Result<T> = std::result::Result<T, IpfError>;
