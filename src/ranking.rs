//! Cluster profiling and desirability ranking

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::advisor::Segment;
use crate::rfm::{CustomerRfm, RfmPoint};
use crate::Error;

/// Aggregate view of one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterProfile {
    pub cluster_id: usize,
    /// Number of customers in the cluster
    pub size: usize,
    pub mean_recency: f64,
    pub mean_frequency: f64,
    pub mean_monetary: f64,
    /// Composite desirability score in [0, 3]
    pub score: f64,
    /// 1 = most desirable
    pub rank: usize,
    /// Ordinal label derived from the rank ("Tier 1" .. "Tier K")
    pub tier_label: String,
    /// Median-cut segment, filled in by the advisor
    pub segment: Option<Segment>,
    /// Quantile-cut recommendations, filled in by the advisor
    pub actions: Vec<String>,
}

impl ClusterProfile {
    pub fn mean_point(&self) -> RfmPoint {
        RfmPoint::new(self.mean_recency, self.mean_frequency, self.mean_monetary)
    }
}

pub fn tier_label(rank: usize) -> String {
    format!("Tier {}", rank)
}

/// Min-max normalization over clusters; 0 when every cluster has the same value
fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max == min {
        0.0
    } else {
        (value - min) / (max - min)
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

/// Composite score per mean profile: recent, frequent and high-spend score higher
///
/// `score = (1 - norm(recency)) + norm(frequency) + norm(monetary)`
pub fn desirability_scores(profiles: &[RfmPoint]) -> Vec<f64> {
    let (r_min, r_max) = min_max(profiles.iter().map(|p| p.recency));
    let (f_min, f_max) = min_max(profiles.iter().map(|p| p.frequency));
    let (m_min, m_max) = min_max(profiles.iter().map(|p| p.monetary));

    profiles
        .iter()
        .map(|p| {
            (1.0 - normalize(p.recency, r_min, r_max))
                + normalize(p.frequency, f_min, f_max)
                + normalize(p.monetary, m_min, m_max)
        })
        .collect()
}

/// Ranks for the given scores: 1 for the highest, ties keep input order
pub fn rank_by_score(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // sort_by is stable, so equal scores keep the lower index first
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut ranks = vec![0; scores.len()];
    for (position, index) in order.into_iter().enumerate() {
        ranks[index] = position + 1;
    }
    ranks
}

/// Profile every cluster and rank them by desirability
///
/// # Arguments
/// * `customers` - RFM rows with cluster labels attached
///
/// # Returns
/// * One `ClusterProfile` per cluster present, ordered by cluster id
pub fn rank_clusters(customers: &[CustomerRfm]) -> crate::Result<Vec<ClusterProfile>> {
    #[derive(Default)]
    struct Sums {
        count: usize,
        recency: f64,
        frequency: f64,
        monetary: f64,
    }

    let mut clusters: BTreeMap<usize, Sums> = BTreeMap::new();
    for customer in customers {
        let cluster = customer.cluster.ok_or_else(|| {
            Error::MalformedInput(format!(
                "customer {} has no cluster label",
                customer.customer_id
            ))
        })?;
        let sums = clusters.entry(cluster).or_default();
        sums.count += 1;
        sums.recency += customer.recency as f64;
        sums.frequency += customer.frequency as f64;
        sums.monetary += customer.monetary;
    }

    let ids: Vec<usize> = clusters.keys().copied().collect();
    let means: Vec<RfmPoint> = clusters
        .values()
        .map(|s| {
            let n = s.count as f64;
            RfmPoint::new(s.recency / n, s.frequency / n, s.monetary / n)
        })
        .collect();

    let scores = desirability_scores(&means);
    let ranks = rank_by_score(&scores);

    let profiles: Vec<ClusterProfile> = ids
        .into_iter()
        .zip(clusters.values())
        .zip(means.iter().zip(scores.iter().zip(ranks.iter())))
        .map(|((cluster_id, sums), (mean, (&score, &rank)))| ClusterProfile {
            cluster_id,
            size: sums.count,
            mean_recency: mean.recency,
            mean_frequency: mean.frequency,
            mean_monetary: mean.monetary,
            score,
            rank,
            tier_label: tier_label(rank),
            segment: None,
            actions: Vec::new(),
        })
        .collect();

    for profile in &profiles {
        debug!(
            cluster = profile.cluster_id,
            score = profile.score,
            rank = profile.rank,
            "ranked cluster"
        );
    }
    Ok(profiles)
}
