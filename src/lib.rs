//! SegmentForge: customer segmentation with RFM analysis and K-Means clustering
//!
//! The pipeline cleans retail transactions, reduces them to one
//! Recency/Frequency/Monetary triple per customer, standardizes the triples,
//! clusters them with K-Means, ranks the clusters by desirability and
//! attaches segment names and recommended actions.

pub mod advisor;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod insights;
pub mod model;
pub mod pipeline;
pub mod ranking;
pub mod report;
pub mod rfm;
pub mod scaler;

// Re-export public items for easier access
pub use advisor::{classify, suggest_actions, GlobalThresholds, Segment};
pub use cli::Args;
pub use config::{CleaningOptions, ClusterParams, PipelineConfig};
pub use data::{clean_records, load_transactions, CleanedRecord, TransactionRecord};
pub use error::{Error, Result};
pub use model::{fit_kmeans, fit_kmeans_with_rng, predict_cluster, KMeansModel};
pub use pipeline::{run_pipeline, PipelineOutput};
pub use ranking::{rank_clusters, ClusterProfile};
pub use rfm::{compute_rfm, CustomerRfm, RfmPoint, RfmTable};
pub use scaler::StandardScaler;
