//! Segment interpretation and recommended actions
//!
//! Two independent modes interpret an RFM profile:
//!
//! - **median-cut**: a two-way split of each dimension at the global median,
//!   classified through the ordered rule table [`SEGMENT_RULES`] into one of
//!   six named [`Segment`]s with two fixed actions each.
//! - **quantile-cut**: a three-way split of each dimension at the global 33rd
//!   and 66th percentiles, producing one action per dimension.
//!
//! The modes are not reconciled with each other; callers pick whichever view
//! they need.

use serde::{Serialize, Serializer};

use crate::ranking::ClusterProfile;
use crate::rfm::{CustomerRfm, RfmPoint};
use crate::Error;

const LOW_QUANTILE: f64 = 0.33;
const HIGH_QUANTILE: f64 = 0.66;

/// Named customer segment from the median-cut decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Vip,
    AtRiskOfChurn,
    DormantHighValue,
    PotentialReturning,
    NewCustomer,
    NeedsActivation,
}

impl Segment {
    pub fn name(&self) -> &'static str {
        match self {
            Segment::Vip => "VIP",
            Segment::AtRiskOfChurn => "At risk of churn",
            Segment::DormantHighValue => "Dormant high-value",
            Segment::PotentialReturning => "Potential / recently returning",
            Segment::NewCustomer => "New customer",
            Segment::NeedsActivation => "Needs activation",
        }
    }

    pub fn actions(&self) -> [&'static str; 2] {
        match self {
            Segment::Vip => [
                "Keep exclusive offers and personalized care.",
                "High loyalty tier with early access to new products.",
            ],
            Segment::AtRiskOfChurn => [
                "Reactivate with a strong voucher or come-back offer.",
                "Send an email/SMS reminder with a short-lived offer.",
            ],
            Segment::DormantHighValue => [
                "Run a win-back campaign aimed at formerly high-value customers.",
                "Personalize offers from previously purchased products.",
            ],
            Segment::PotentialReturning => [
                "Upsell/cross-sell within related categories.",
                "Raise frequency with bundles or free shipping.",
            ],
            Segment::NewCustomer => [
                "Onboard with guides, category suggestions and a repeat-purchase offer.",
                "Encourage a second purchase with a small discount code.",
            ],
            Segment::NeedsActivation => [
                "A/B test different messages and offers.",
                "Remarket across channels (email, messaging, advertising).",
            ],
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Segment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Global medians of the three RFM dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MedianThresholds {
    pub recency: f64,
    pub frequency: f64,
    pub monetary: f64,
}

/// Lower (33rd) and upper (66th) percentile of one dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantileCut {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantileThresholds {
    pub recency: QuantileCut,
    pub frequency: QuantileCut,
    pub monetary: QuantileCut,
}

/// Thresholds computed once over every customer of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlobalThresholds {
    pub medians: MedianThresholds,
    pub quantiles: QuantileThresholds,
}

impl GlobalThresholds {
    pub fn from_customers(customers: &[CustomerRfm]) -> crate::Result<Self> {
        let points: Vec<RfmPoint> = customers.iter().map(CustomerRfm::point).collect();
        Self::from_points(&points)
    }

    /// # Errors
    /// * `UndefinedThreshold` with fewer than two customers
    pub fn from_points(points: &[RfmPoint]) -> crate::Result<Self> {
        if points.len() < 2 {
            return Err(Error::UndefinedThreshold(format!(
                "medians and quantiles need at least 2 customers, got {}",
                points.len()
            )));
        }

        let recency = sorted(points.iter().map(|p| p.recency));
        let frequency = sorted(points.iter().map(|p| p.frequency));
        let monetary = sorted(points.iter().map(|p| p.monetary));

        let cut = |values: &[f64]| QuantileCut {
            low: quantile(values, LOW_QUANTILE),
            high: quantile(values, HIGH_QUANTILE),
        };

        Ok(Self {
            medians: MedianThresholds {
                recency: quantile(&recency, 0.5),
                frequency: quantile(&frequency, 0.5),
                monetary: quantile(&monetary, 0.5),
            },
            quantiles: QuantileThresholds {
                recency: cut(&recency),
                frequency: cut(&frequency),
                monetary: cut(&monetary),
            },
        })
    }
}

fn sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.collect();
    values.sort_by(f64::total_cmp);
    values
}

/// Quantile of sorted values, linearly interpolated between order statistics
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let position = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
        }
    }
}

/// Where a profile sits relative to the global medians
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MedianPosition {
    /// Recency at or below the median (recent buyer)
    pub recency_low: bool,
    /// Frequency at or above the median
    pub frequency_high: bool,
    /// Monetary at or above the median
    pub monetary_high: bool,
}

impl MedianPosition {
    pub fn of(point: &RfmPoint, medians: &MedianThresholds) -> Self {
        Self {
            recency_low: point.recency <= medians.recency,
            frequency_high: point.frequency >= medians.frequency,
            monetary_high: point.monetary >= medians.monetary,
        }
    }
}

/// One row of the median-cut decision table
#[derive(Clone, Copy)]
pub struct SegmentRule {
    pub segment: Segment,
    pub matches: fn(&MedianPosition) -> bool,
}

fn vip(p: &MedianPosition) -> bool {
    p.recency_low && p.frequency_high && p.monetary_high
}

fn at_risk(p: &MedianPosition) -> bool {
    !p.recency_low && !p.frequency_high && !p.monetary_high
}

fn dormant_high_value(p: &MedianPosition) -> bool {
    !p.recency_low && (p.frequency_high || p.monetary_high)
}

fn potential(p: &MedianPosition) -> bool {
    p.recency_low && (p.frequency_high || p.monetary_high)
}

fn new_customer(p: &MedianPosition) -> bool {
    p.recency_low && !p.frequency_high && !p.monetary_high
}

/// Precedence-ordered rules; the first match wins, [`Segment::NeedsActivation`] otherwise
pub const SEGMENT_RULES: &[SegmentRule] = &[
    SegmentRule {
        segment: Segment::Vip,
        matches: vip,
    },
    SegmentRule {
        segment: Segment::AtRiskOfChurn,
        matches: at_risk,
    },
    SegmentRule {
        segment: Segment::DormantHighValue,
        matches: dormant_high_value,
    },
    SegmentRule {
        segment: Segment::PotentialReturning,
        matches: potential,
    },
    SegmentRule {
        segment: Segment::NewCustomer,
        matches: new_customer,
    },
];

/// Median-cut classification of a cluster mean or a single customer
pub fn classify(point: &RfmPoint, medians: &MedianThresholds) -> Segment {
    let position = MedianPosition::of(point, medians);
    SEGMENT_RULES
        .iter()
        .find(|rule| (rule.matches)(&position))
        .map(|rule| rule.segment)
        .unwrap_or(Segment::NeedsActivation)
}

/// Quantile-cut recommendations: one action for each of recency, frequency, monetary
pub fn suggest_actions(point: &RfmPoint, quantiles: &QuantileThresholds) -> [&'static str; 3] {
    let recency = if point.recency <= quantiles.recency.low {
        "Upsell/cross-sell from recently purchased products."
    } else if point.recency >= quantiles.recency.high {
        "Win back with an email/SMS and a short-term come-back offer."
    } else {
        "Send a gentle reminder with related product suggestions."
    };

    let frequency = if point.frequency >= quantiles.frequency.high {
        "Upgrade loyalty benefits and tier with an exclusive program."
    } else if point.frequency <= quantiles.frequency.low {
        "Encourage repeat purchases with a small voucher or low-threshold free shipping."
    } else {
        "Offer bundles/combos to raise purchase frequency."
    };

    let monetary = if point.monetary >= quantiles.monetary.high {
        "Recommend premium/exclusive products with priority care."
    } else if point.monetary <= quantiles.monetary.low {
        "Recommend value-priced products and cut shipping costs."
    } else {
        "Grow basket value with accessories and add-ons."
    };

    [recency, frequency, monetary]
}

/// Fill in the median-cut segment and quantile-cut actions of ranked profiles
pub fn annotate_profiles(profiles: &mut [ClusterProfile], thresholds: &GlobalThresholds) {
    for profile in profiles.iter_mut() {
        let mean = profile.mean_point();
        profile.segment = Some(classify(&mean, &thresholds.medians));
        profile.actions = suggest_actions(&mean, &thresholds.quantiles)
            .iter()
            .map(|action| action.to_string())
            .collect();
    }
}
