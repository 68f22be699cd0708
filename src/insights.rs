//! Descriptive aggregates over cleaned transactions and RFM rows

use polars::prelude::*;
use serde::Serialize;

use crate::data::{cleaned_frame, CleanedRecord, DESCRIPTION, LINE_TOTAL, QUANTITY};
use crate::rfm::CustomerRfm;

const MONTH: &str = "Month";

/// Revenue of one calendar month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRevenue {
    /// `YYYY-MM`
    pub month: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSales {
    pub description: String,
    pub quantity: i64,
}

/// Bounds for browsing the RFM table
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RfmFilter {
    pub min_monetary: f64,
    pub max_recency: i64,
}

impl Default for RfmFilter {
    fn default() -> Self {
        Self {
            min_monetary: 0.0,
            max_recency: 999,
        }
    }
}

/// Sum of line totals per month, oldest month first
pub fn monthly_revenue(records: &[CleanedRecord]) -> crate::Result<Vec<MonthlyRevenue>> {
    let months: Vec<String> = records
        .iter()
        .map(|r| r.invoice_timestamp.format("%Y-%m").to_string())
        .collect();

    let mut df = cleaned_frame(records)?;
    df.with_column(Series::new(MONTH, months))?;

    let revenue = df
        .lazy()
        .group_by([col(MONTH)])
        .agg([col(LINE_TOTAL).sum().alias("Revenue")])
        .collect()?;

    let months = revenue.column(MONTH)?.str()?;
    let totals = revenue.column("Revenue")?.f64()?;
    let mut revenue: Vec<MonthlyRevenue> = months
        .into_no_null_iter()
        .zip(totals.into_no_null_iter())
        .map(|(month, revenue)| MonthlyRevenue {
            month: month.to_string(),
            revenue,
        })
        .collect();
    revenue.sort_by(|a, b| a.month.cmp(&b.month));
    Ok(revenue)
}

/// Best sellers by total quantity; ties ordered by description
///
/// Lines without a description are not attributed to any product.
pub fn top_products(records: &[CleanedRecord], n: usize) -> crate::Result<Vec<ProductSales>> {
    let totals = cleaned_frame(records)?
        .lazy()
        .filter(col(DESCRIPTION).is_not_null())
        .group_by([col(DESCRIPTION)])
        .agg([col(QUANTITY).sum()])
        .collect()?;

    let descriptions = totals.column(DESCRIPTION)?.str()?;
    let quantities = totals.column(QUANTITY)?.i64()?;
    let mut products: Vec<ProductSales> = descriptions
        .into_no_null_iter()
        .zip(quantities.into_no_null_iter())
        .map(|(description, quantity)| ProductSales {
            description: description.to_string(),
            quantity,
        })
        .collect();
    products.sort_by(|a, b| {
        b.quantity
            .cmp(&a.quantity)
            .then_with(|| a.description.cmp(&b.description))
    });
    products.truncate(n);
    Ok(products)
}

/// Customers spending at least `min_monetary` and active within `max_recency` days
pub fn filter_customers<'a>(
    customers: &'a [CustomerRfm],
    filter: &RfmFilter,
) -> Vec<&'a CustomerRfm> {
    customers
        .iter()
        .filter(|c| c.monetary >= filter.min_monetary && c.recency <= filter.max_recency)
        .collect()
}
