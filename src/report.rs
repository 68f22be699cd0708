//! Console rendering of segmentation results

use std::fmt;

use serde::Serialize;

use crate::insights::{MonthlyRevenue, ProductSales};
use crate::pipeline::PipelineOutput;
use crate::rfm::CustomerRfm;

/// Human-readable report of cluster statistics, tiers and recommendations
pub struct SegmentationReport<'a>(pub &'a PipelineOutput);

impl fmt::Display for SegmentationReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let output = self.0;
        let total = output.customers.len().max(1) as f64;

        writeln!(f, "=== Cluster Statistics ===")?;
        writeln!(f, "Snapshot date: {}", output.snapshot)?;
        writeln!(f, "Cleaned transaction lines: {}", output.cleaned_records)?;
        writeln!(f, "Total customers: {}", output.customers.len())?;
        writeln!(f, "Number of clusters: {}", output.profiles.len())?;
        writeln!(f, "Within-cluster sum of squares (Inertia): {:.2}", output.inertia)?;
        writeln!(f, "Silhouette score (sample): {:.3}", output.silhouette)?;

        writeln!(f, "\nMean RFM by cluster:")?;
        writeln!(f, "  Tier    | Cluster | Customers       | Recency | Frequency | Monetary")?;
        writeln!(f, "  --------|---------|-----------------|---------|-----------|------------")?;
        for profile in &output.profiles {
            writeln!(
                f,
                "  {:7} | {:7} | {:6} ({:5.1}%) | {:7.2} | {:9.2} | {:10.2}",
                profile.tier_label,
                profile.cluster_id,
                profile.size,
                profile.size as f64 / total * 100.0,
                profile.mean_recency,
                profile.mean_frequency,
                profile.mean_monetary
            )?;
        }

        writeln!(f, "\n=== Interpretation & Recommended Actions ===")?;
        for profile in &output.profiles {
            let segment = profile.segment.map(|s| s.name()).unwrap_or("unclassified");
            writeln!(
                f,
                "\n{} (Cluster {}, score {:.2}) - {}",
                profile.tier_label, profile.cluster_id, profile.score, segment
            )?;
            for action in &profile.actions {
                writeln!(f, "  - {}", action)?;
            }
            if let Some(segment) = profile.segment {
                for action in segment.actions() {
                    writeln!(f, "  * {}", action)?;
                }
            }
        }
        Ok(())
    }
}

/// Monthly revenue and best sellers
pub struct SummaryReport<'a> {
    pub revenue: &'a [MonthlyRevenue],
    pub products: &'a [ProductSales],
}

impl fmt::Display for SummaryReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Revenue by Month ===")?;
        for month in self.revenue {
            writeln!(f, "  {} | {:12.2}", month.month, month.revenue)?;
        }

        writeln!(f, "\n=== Best-selling Products ===")?;
        for (i, product) in self.products.iter().enumerate() {
            writeln!(f, "  {}. {} ({} units)", i + 1, product.description, product.quantity)?;
        }
        Ok(())
    }
}

/// Per-customer RFM rows
pub struct CustomerTable<'a>(pub &'a [&'a CustomerRfm]);

impl fmt::Display for CustomerTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Customer | Recency | Frequency | Monetary")?;
        writeln!(f, "  ---------|---------|-----------|------------")?;
        for customer in self.0 {
            writeln!(
                f,
                "  {:8} | {:7} | {:9} | {:10.2}",
                customer.customer_id, customer.recency, customer.frequency, customer.monetary
            )?;
        }
        writeln!(f, "\n{} customers", self.0.len())
    }
}

/// Pretty-printed JSON of any serializable result
pub fn to_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}
