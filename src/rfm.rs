//! Per-customer Recency / Frequency / Monetary aggregation

use chrono::{Duration, NaiveDateTime};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::data::{cleaned_frame, timestamp_micros, CleanedRecord};
use crate::data::{CUSTOMER_ID, INVOICE, INVOICE_DATE, LINE_TOTAL};
use crate::Error;

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// RFM metrics for one customer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRfm {
    pub customer_id: i64,
    /// Whole days between the snapshot and the latest purchase
    pub recency: i64,
    /// Number of distinct invoices
    pub frequency: usize,
    /// Sum of line totals
    pub monetary: f64,
    /// Cluster label, attached after clustering
    pub cluster: Option<usize>,
}

impl CustomerRfm {
    pub fn point(&self) -> RfmPoint {
        RfmPoint::new(self.recency as f64, self.frequency as f64, self.monetary)
    }
}

/// A raw (unscaled) RFM triple: a customer, a cluster mean, or a new point to score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RfmPoint {
    pub recency: f64,
    pub frequency: f64,
    pub monetary: f64,
}

impl RfmPoint {
    pub fn new(recency: f64, frequency: f64, monetary: f64) -> Self {
        Self {
            recency,
            frequency,
            monetary,
        }
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.recency, self.frequency, self.monetary]
    }
}

/// One RFM row per customer, ordered by customer id
#[derive(Debug, Clone, Serialize)]
pub struct RfmTable {
    pub customers: Vec<CustomerRfm>,
    /// Reference instant used for every recency value in this table
    pub snapshot: NaiveDateTime,
}

impl RfmTable {
    pub fn len(&self) -> usize {
        self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }

    pub fn customer_ids(&self) -> Vec<i64> {
        self.customers.iter().map(|c| c.customer_id).collect()
    }

    /// Raw features as an (n_customers, 3) matrix in recency, frequency, monetary order
    pub fn raw_features(&self) -> Array2<f64> {
        let mut matrix = Array2::zeros((self.customers.len(), 3));
        for (mut row, customer) in matrix.outer_iter_mut().zip(&self.customers) {
            row.assign(&Array1::from(customer.point().to_array().to_vec()));
        }
        matrix
    }

    /// Attach cluster labels, one per customer in table order
    pub fn assign_clusters(&mut self, labels: &Array1<usize>) -> crate::Result<()> {
        if labels.len() != self.customers.len() {
            return Err(Error::MalformedInput(format!(
                "got {} cluster labels for {} customers",
                labels.len(),
                self.customers.len()
            )));
        }
        for (customer, &label) in self.customers.iter_mut().zip(labels.iter()) {
            customer.cluster = Some(label);
        }
        Ok(())
    }
}

/// Default snapshot: one day after the latest invoice
pub fn default_snapshot(records: &[CleanedRecord]) -> Option<NaiveDateTime> {
    records
        .iter()
        .map(|r| r.invoice_timestamp)
        .max()
        .map(|latest| latest + Duration::days(1))
}

/// Compute RFM features from cleaned transactions
///
/// # Arguments
/// * `records` - Cleaned transaction lines
/// * `snapshot` - Reference instant; defaults to the latest invoice plus one day
///
/// # Returns
/// * `RfmTable` with one row per customer, sorted by customer id
pub fn compute_rfm(
    records: &[CleanedRecord],
    snapshot: Option<NaiveDateTime>,
) -> crate::Result<RfmTable> {
    let snapshot = match snapshot.or_else(|| default_snapshot(records)) {
        Some(snapshot) if !records.is_empty() => snapshot,
        _ => {
            return Err(Error::InsufficientData(
                "no cleaned transactions to aggregate".to_string(),
            ))
        }
    };

    let snapshot_micros = timestamp_micros(&snapshot);
    let grouped = cleaned_frame(records)?
        .lazy()
        .group_by([col(CUSTOMER_ID)])
        .agg([
            col(INVOICE_DATE).max().alias("LastPurchase"),
            col(INVOICE).n_unique().cast(DataType::Int64).alias("Frequency"),
            col(LINE_TOTAL).sum().alias("Monetary"),
        ])
        .collect()?;

    let ids = grouped.column(CUSTOMER_ID)?.i64()?;
    let last_purchase = grouped.column("LastPurchase")?.i64()?;
    let frequency = grouped.column("Frequency")?.i64()?;
    let monetary = grouped.column("Monetary")?.f64()?;

    let mut customers: Vec<CustomerRfm> = ids
        .into_no_null_iter()
        .zip(last_purchase.into_no_null_iter())
        .zip(frequency.into_no_null_iter())
        .zip(monetary.into_no_null_iter())
        .map(|(((customer_id, last), frequency), monetary)| CustomerRfm {
            customer_id,
            recency: (snapshot_micros - last).div_euclid(MICROS_PER_DAY),
            frequency: frequency as usize,
            monetary,
            cluster: None,
        })
        .collect();
    customers.sort_by_key(|c| c.customer_id);

    info!(customers = customers.len(), %snapshot, "computed RFM table");
    Ok(RfmTable {
        customers,
        snapshot,
    })
}
