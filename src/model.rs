//! K-Means clustering of standardized RFM features

use std::collections::HashSet;

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::ClusterParams;
use crate::scaler::StandardScaler;
use crate::Error;

/// K-Means model wrapper with fitted parameters
#[derive(Debug)]
pub struct KMeansModel {
    /// Fitted K-Means model from linfa
    pub model: KMeans<f64, L2Dist>,
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Cluster centroids in standardized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
}

impl KMeansModel {
    /// Nearest centroid for a standardized point
    pub fn predict(&self, features: &Array1<f64>) -> crate::Result<usize> {
        if features.len() != self.centroids.ncols() {
            return Err(Error::MalformedInput(format!(
                "feature vector must have {} dimensions, got {}",
                self.centroids.ncols(),
                features.len()
            )));
        }

        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;
        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = squared_distance(&features.view(), &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }

        Ok(closest_cluster)
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Mean silhouette coefficient over the first `sample_size` points
    ///
    /// Returns 0 when fewer than two points are sampled.
    pub fn silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let n_samples = features.nrows().min(sample_size);
        if n_samples < 2 {
            return 0.0;
        }

        let mut silhouette_sum = 0.0;
        for i in 0..n_samples {
            let point = features.row(i);
            let own = self.labels[i];

            // (sum, count) of distances to each cluster
            let mut totals = vec![(0.0, 0usize); self.n_clusters];
            for j in (0..n_samples).filter(|&j| j != i) {
                let distance = squared_distance(&point, &features.row(j)).sqrt();
                let entry = &mut totals[self.labels[j]];
                entry.0 += distance;
                entry.1 += 1;
            }

            let a_i = match totals[own] {
                (_, 0) => 0.0,
                (sum, count) => sum / count as f64,
            };
            let b_i = totals
                .iter()
                .enumerate()
                .filter(|&(cluster, &(_, count))| cluster != own && count > 0)
                .map(|(_, &(sum, count))| sum / count as f64)
                .fold(f64::INFINITY, f64::min);

            if b_i.is_finite() && a_i.max(b_i) > 0.0 {
                silhouette_sum += (b_i - a_i) / a_i.max(b_i);
            }
        }

        silhouette_sum / n_samples as f64
    }
}

/// Fit K-Means with a `StdRng` seeded from `params.seed`
///
/// # Arguments
/// * `features` - Standardized RFM features, one row per customer
/// * `params` - Cluster count, seed, restarts and convergence settings
///
/// # Returns
/// * Fitted `KMeansModel`; identical inputs always give identical labels
pub fn fit_kmeans(features: &Array2<f64>, params: &ClusterParams) -> crate::Result<KMeansModel> {
    fit_kmeans_with_rng(features, params, StdRng::seed_from_u64(params.seed))
}

/// Fit K-Means drawing centroid initializations from `rng`
///
/// Runs `params.n_init` k-means++ initializations and keeps the one with the
/// lowest inertia.
///
/// # Errors
/// * `InvalidClusterCount` if `n_clusters < 2`, `n_clusters >= n_rows`, there
///   are fewer distinct rows than clusters, or a fitted cluster ends up empty
pub fn fit_kmeans_with_rng<R: Rng + Clone>(
    features: &Array2<f64>,
    params: &ClusterParams,
    rng: R,
) -> crate::Result<KMeansModel> {
    params.validate()?;
    let n_clusters = params.n_clusters;
    let n_samples = features.nrows();

    if n_clusters >= n_samples {
        return Err(Error::InvalidClusterCount {
            k: n_clusters,
            reason: format!("must be smaller than the number of customers ({})", n_samples),
        });
    }
    let distinct = distinct_rows(features);
    if distinct < n_clusters {
        return Err(Error::InvalidClusterCount {
            k: n_clusters,
            reason: format!("only {} distinct customer profiles", distinct),
        });
    }

    // Dummy targets for unsupervised learning
    let targets: Array1<usize> = Array1::zeros(n_samples);
    let dataset = Dataset::new(features.clone(), targets);

    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .n_runs(params.n_init)
        .max_n_iterations(params.max_iters)
        .tolerance(params.tolerance)
        .fit(&dataset)?;

    let labels = model.predict(&dataset);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(features, &labels, &centroids);

    let fitted = KMeansModel {
        model,
        n_clusters,
        labels,
        centroids,
        inertia,
    };

    let sizes = fitted.cluster_sizes();
    debug!(?sizes, "cluster sizes");
    let non_empty = sizes.iter().filter(|&&size| size > 0).count();
    if non_empty < n_clusters {
        return Err(Error::InvalidClusterCount {
            k: n_clusters,
            reason: format!("clustering produced only {} non-empty clusters", non_empty),
        });
    }

    info!(k = n_clusters, inertia = fitted.inertia, "fitted k-means");
    Ok(fitted)
}

/// Assign a new raw RFM triple to a cluster
///
/// # Arguments
/// * `model` - Fitted K-Means model
/// * `scaler` - Scaler fitted on the training RFM table
/// * `rfm_values` - New RFM values [recency, frequency, monetary]
pub fn predict_cluster(
    model: &KMeansModel,
    scaler: &StandardScaler,
    rfm_values: &[f64; 3],
) -> crate::Result<usize> {
    let scaled = scaler.transform_point(rfm_values)?;
    model.predict(&scaled)
}

/// Within-cluster sum of squares
fn compute_inertia(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    centroids: &Array2<f64>,
) -> f64 {
    labels
        .iter()
        .zip(features.outer_iter())
        .filter(|(&cluster, _)| cluster < centroids.nrows())
        .map(|(&cluster, point)| squared_distance(&point, &centroids.row(cluster)))
        .sum()
}

fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn distinct_rows(features: &Array2<f64>) -> usize {
    features
        .outer_iter()
        .map(|row| row.iter().map(|v| v.to_bits()).collect::<Vec<u64>>())
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three well separated blobs of four points each
    fn blob_features() -> Array2<f64> {
        Array2::from_shape_vec(
            (12, 3),
            vec![
                -2.0, -2.0, -2.0, //
                -2.1, -1.9, -2.0, //
                -1.9, -2.1, -2.1, //
                -2.0, -2.0, -1.9, //
                0.0, 0.1, 0.0, //
                0.1, 0.0, 0.0, //
                0.0, 0.0, 0.1, //
                -0.1, 0.0, 0.0, //
                2.0, 2.0, 2.0, //
                2.1, 1.9, 2.0, //
                1.9, 2.1, 2.1, //
                2.0, 2.0, 1.9,
            ],
        )
        .unwrap()
    }

    fn params(n_clusters: usize) -> ClusterParams {
        ClusterParams {
            n_clusters,
            ..Default::default()
        }
    }

    #[test]
    fn test_fit_kmeans_separates_blobs() {
        let model = fit_kmeans(&blob_features(), &params(3)).unwrap();

        assert_eq!(model.n_clusters, 3);
        assert_eq!(model.labels.len(), 12);
        assert_eq!(model.centroids.shape(), &[3, 3]);
        assert_eq!(model.cluster_sizes(), vec![4, 4, 4]);

        for blob in 0..3 {
            let first = model.labels[blob * 4];
            assert!((0..4).all(|i| model.labels[blob * 4 + i] == first));
        }
        assert!(model.inertia >= 0.0 && model.inertia < 1.0);
    }

    #[test]
    fn test_same_seed_same_labels() {
        let features = blob_features();
        let first = fit_kmeans(&features, &params(3)).unwrap();
        let second = fit_kmeans(&features, &params(3)).unwrap();
        assert_eq!(first.labels, second.labels);
        assert_eq!(first.centroids, second.centroids);
    }

    #[test]
    fn test_injected_rng_matches_seeded_fit() {
        let features = blob_features();
        let config = params(2);
        let seeded = fit_kmeans(&features, &config).unwrap();
        let injected =
            fit_kmeans_with_rng(&features, &config, StdRng::seed_from_u64(config.seed)).unwrap();
        assert_eq!(seeded.labels, injected.labels);
    }

    #[test]
    fn test_invalid_cluster_count() {
        let features = blob_features();

        let result = fit_kmeans(&features, &params(1));
        assert!(matches!(result, Err(Error::InvalidClusterCount { k: 1, .. })));

        let result = fit_kmeans(&features, &params(12));
        assert!(matches!(result, Err(Error::InvalidClusterCount { k: 12, .. })));
    }

    #[test]
    fn test_cluster_count_above_distinct_points() {
        let features = Array2::from_shape_vec(
            (5, 3),
            vec![
                1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0,
            ],
        )
        .unwrap();
        let result = fit_kmeans(&features, &params(3));
        assert!(matches!(result, Err(Error::InvalidClusterCount { k: 3, .. })));
    }

    #[test]
    fn test_predict_and_silhouette() {
        let features = blob_features();
        let model = fit_kmeans(&features, &params(3)).unwrap();

        let near_last_blob = Array1::from(vec![1.8, 2.2, 2.0]);
        assert_eq!(model.predict(&near_last_blob).unwrap(), model.labels[8]);
        assert!(model.predict(&Array1::from(vec![0.0, 0.0])).is_err());

        let silhouette = model.silhouette_sample(&features, 100);
        assert!(silhouette > 0.8 && silhouette <= 1.0);
    }

    #[test]
    fn test_predict_cluster_through_scaler() {
        let raw = blob_features().mapv(|v| v * 10.0 + 50.0);
        let scaler = StandardScaler::fit(&raw).unwrap();
        let scaled = scaler.transform(&raw).unwrap();
        let model = fit_kmeans(&scaled, &params(3)).unwrap();

        let cluster = predict_cluster(&model, &scaler, &[30.0, 30.0, 30.0]).unwrap();
        assert_eq!(cluster, model.labels[0]);
    }
}
