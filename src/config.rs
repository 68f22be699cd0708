//! Pipeline configuration

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Toggles for the individual cleaning rules. All rules are enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningOptions {
    pub drop_missing_customer: bool,
    pub filter_positive_quantity: bool,
    pub filter_positive_price: bool,
    pub drop_duplicates: bool,
}

impl Default for CleaningOptions {
    fn default() -> Self {
        Self {
            drop_missing_customer: true,
            filter_positive_quantity: true,
            filter_positive_price: true,
            drop_duplicates: true,
        }
    }
}

/// K-Means hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Number of clusters (K)
    pub n_clusters: usize,
    /// Seed for centroid initialization
    pub seed: u64,
    /// Number of independent initializations; the lowest-inertia run wins
    pub n_init: usize,
    /// Maximum Lloyd iterations per run
    pub max_iters: u64,
    /// Convergence tolerance on centroid movement
    pub tolerance: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            n_clusters: 4,
            seed: 42,
            n_init: 10,
            max_iters: 300,
            tolerance: 1e-4,
        }
    }
}

impl ClusterParams {
    /// Check the parameters that do not depend on the data.
    ///
    /// The upper bound on `n_clusters` is data dependent and is enforced by
    /// [`crate::model::fit_kmeans`].
    pub fn validate(&self) -> Result<()> {
        if self.n_clusters < 2 {
            return Err(Error::InvalidClusterCount {
                k: self.n_clusters,
                reason: "at least 2 clusters are required".to_string(),
            });
        }
        if self.n_init == 0 {
            return Err(Error::Config("n_init must be at least 1".to_string()));
        }
        if self.max_iters == 0 {
            return Err(Error::Config("max_iters must be at least 1".to_string()));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(Error::Config(format!(
                "tolerance must be a positive number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Everything a single pipeline run needs besides the records themselves
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub cleaning: CleaningOptions,
    pub clustering: ClusterParams,
    /// Explicit snapshot instant; defaults to the latest invoice plus one day
    pub snapshot: Option<NaiveDateTime>,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.clustering.validate()
    }
}
