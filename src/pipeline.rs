//! End-to-end segmentation run: clean → aggregate → scale → cluster → rank → advise

use chrono::NaiveDateTime;
use ndarray::Array2;
use serde::Serialize;
use tracing::info;

use crate::advisor::{annotate_profiles, GlobalThresholds};
use crate::config::PipelineConfig;
use crate::data::{clean_records, TransactionRecord};
use crate::model::{fit_kmeans, predict_cluster, KMeansModel};
use crate::ranking::{rank_clusters, ClusterProfile};
use crate::rfm::{compute_rfm, CustomerRfm, RfmPoint};
use crate::scaler::StandardScaler;

/// Customers sampled for the silhouette diagnostic
const SILHOUETTE_SAMPLE: usize = 1_000;

/// Everything a single run produces
#[derive(Debug, Serialize)]
pub struct PipelineOutput {
    /// RFM rows with cluster labels, ordered by customer id
    pub customers: Vec<CustomerRfm>,
    /// Cluster profiles ordered by rank (best first)
    pub profiles: Vec<ClusterProfile>,
    pub scaler: StandardScaler,
    pub snapshot: NaiveDateTime,
    pub thresholds: GlobalThresholds,
    /// Number of cleaned transaction lines
    pub cleaned_records: usize,
    pub inertia: f64,
    pub silhouette: f64,
    #[serde(skip)]
    pub model: KMeansModel,
    /// Standardized features in customer order
    #[serde(skip)]
    pub features: Array2<f64>,
}

impl PipelineOutput {
    /// Assign a new raw RFM triple to one of the fitted clusters
    pub fn predict(&self, point: &RfmPoint) -> crate::Result<usize> {
        predict_cluster(&self.model, &self.scaler, &point.to_array())
    }

    pub fn profile(&self, cluster_id: usize) -> Option<&ClusterProfile> {
        self.profiles.iter().find(|p| p.cluster_id == cluster_id)
    }
}

/// Run the full segmentation pipeline over raw transaction records
pub fn run_pipeline(
    records: &[TransactionRecord],
    config: &PipelineConfig,
) -> crate::Result<PipelineOutput> {
    config.validate()?;

    let cleaned = clean_records(records, &config.cleaning)?;
    let mut table = compute_rfm(&cleaned, config.snapshot)?;

    let raw_features = table.raw_features();
    let (scaler, features) = StandardScaler::fit_transform(&raw_features)?;

    let model = fit_kmeans(&features, &config.clustering)?;
    table.assign_clusters(&model.labels)?;

    let thresholds = GlobalThresholds::from_customers(&table.customers)?;
    let mut profiles = rank_clusters(&table.customers)?;
    annotate_profiles(&mut profiles, &thresholds);
    profiles.sort_by_key(|p| p.rank);

    let silhouette = model.silhouette_sample(&features, SILHOUETTE_SAMPLE);
    info!(
        customers = table.len(),
        clusters = profiles.len(),
        inertia = model.inertia,
        silhouette,
        "segmentation complete"
    );

    Ok(PipelineOutput {
        customers: table.customers,
        profiles,
        scaler,
        snapshot: table.snapshot,
        thresholds,
        cleaned_records: cleaned.len(),
        inertia: model.inertia,
        silhouette,
        model,
        features,
    })
}
