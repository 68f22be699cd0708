//! Error types for SegmentForge

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the segmentation pipeline.
///
/// Every stage validates its own preconditions and fails with one of these
/// instead of returning a silently degraded result.
#[derive(Error, Debug)]
pub enum Error {
    /// A required field is missing or cannot be interpreted
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Not enough distinct customers for the requested computation
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// K cannot produce K non-empty clusters for the current data
    #[error("Invalid cluster count {k}: {reason}")]
    InvalidClusterCount { k: usize, reason: String },

    /// Median or quantile thresholds cannot be computed
    #[error("Undefined threshold: {0}")]
    UndefinedThreshold(String),

    /// Invalid pipeline configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// K-Means fitting failed inside linfa
    #[error("Clustering failed: {0}")]
    Clustering(#[from] linfa_clustering::KMeansError),

    /// CSV reading or column extraction failed
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Array construction failed
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl Error {
    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MalformedInput(_) => "malformed_input",
            Error::InsufficientData(_) => "insufficient_data",
            Error::InvalidClusterCount { .. } => "invalid_cluster_count",
            Error::UndefinedThreshold(_) => "undefined_threshold",
            Error::Config(_) => "config",
            Error::Clustering(_) => "clustering",
            Error::Polars(_) => "polars",
            Error::Shape(_) => "shape",
        }
    }
}
