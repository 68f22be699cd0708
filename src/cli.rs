//! Command-line interface definitions and argument parsing

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};

use crate::config::{CleaningOptions, ClusterParams, PipelineConfig};
use crate::data::parse_timestamp;
use crate::rfm::RfmPoint;

/// Customer segmentation CLI: RFM analysis, K-Means clustering and segment recommendations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full segmentation pipeline and print ranked segments
    Run {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Print the result as JSON instead of text tables
        #[arg(long)]
        json: bool,
    },
    /// Assign a new customer's RFM values to one of the fitted segments
    Predict {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// RFM values as a comma-separated string
        /// Example: --rfm "30,10,500.0" for Recency=30, Frequency=10, Monetary=500.0
        #[arg(short, long)]
        rfm: String,
    },
    /// Print monthly revenue and best-selling products of the cleaned data
    Summary {
        /// Path to the input CSV file
        #[arg(short, long, default_value = "data.csv")]
        input: String,

        /// Number of best-selling products to list
        #[arg(long, default_value = "5")]
        top: usize,

        #[command(flatten)]
        cleaning: CleaningArgs,
    },
    /// List per-customer RFM values, filtered by spend and recency
    Customers {
        /// Path to the input CSV file
        #[arg(short, long, default_value = "data.csv")]
        input: String,

        /// Only customers whose total spend is at least this amount
        #[arg(long, default_value = "0")]
        min_monetary: f64,

        /// Only customers who bought within this many days of the snapshot
        #[arg(long, default_value = "999")]
        max_recency: i64,

        /// Reference date for recency (default: latest invoice + 1 day)
        #[arg(long)]
        snapshot: Option<String>,

        #[command(flatten)]
        cleaning: CleaningArgs,

        /// Print the rows as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Toggles for the cleaning rules, all of which are on by default
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CleaningArgs {
    /// Keep rows without a customer id
    #[arg(long)]
    pub keep_missing_customers: bool,

    /// Keep returns and cancellations (quantity <= 0)
    #[arg(long)]
    pub keep_non_positive_quantity: bool,

    /// Keep rows with price <= 0
    #[arg(long)]
    pub keep_non_positive_price: bool,

    /// Keep exact duplicate rows
    #[arg(long)]
    pub keep_duplicates: bool,
}

impl CleaningArgs {
    pub fn to_options(&self) -> CleaningOptions {
        CleaningOptions {
            drop_missing_customer: !self.keep_missing_customers,
            filter_positive_quantity: !self.keep_non_positive_quantity,
            filter_positive_price: !self.keep_non_positive_price,
            drop_duplicates: !self.keep_duplicates,
        }
    }
}

/// Options shared by every command that runs the pipeline
#[derive(clap::Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "data.csv")]
    pub input: String,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value = "4")]
    pub clusters: usize,

    /// Seed for centroid initialization
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of K-Means initializations (best inertia wins)
    #[arg(long, default_value = "10")]
    pub n_init: usize,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Reference date for recency (default: latest invoice + 1 day)
    #[arg(long)]
    pub snapshot: Option<String>,

    #[command(flatten)]
    pub cleaning: CleaningArgs,
}

impl PipelineArgs {
    /// Build the pipeline configuration from the command-line options
    pub fn to_config(&self) -> anyhow::Result<PipelineConfig> {
        Ok(PipelineConfig {
            cleaning: self.cleaning.to_options(),
            clustering: ClusterParams {
                n_clusters: self.clusters,
                seed: self.seed,
                n_init: self.n_init,
                max_iters: self.max_iters,
                tolerance: self.tolerance,
            },
            snapshot: parse_snapshot(self.snapshot.as_deref())?,
        })
    }
}

/// Parse an optional `--snapshot` value
pub fn parse_snapshot(raw: Option<&str>) -> anyhow::Result<Option<NaiveDateTime>> {
    raw.map(|raw| {
        parse_timestamp(raw).ok_or_else(|| anyhow::anyhow!("Invalid snapshot date: {}", raw))
    })
    .transpose()
}

/// Parse RFM values from a "recency,frequency,monetary" string
pub fn parse_rfm_values(raw: &str) -> anyhow::Result<RfmPoint> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 3 {
        anyhow::bail!("RFM values must be in format 'recency,frequency,monetary'");
    }

    let parse = |name: &str, value: &str| -> anyhow::Result<f64> {
        value
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid {} value: {}", name, value))
    };

    Ok(RfmPoint::new(
        parse("recency", parts[0])?,
        parse("frequency", parts[1])?,
        parse("monetary", parts[2])?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfm_values() {
        let point = parse_rfm_values("30,10,500.0").unwrap();
        assert_eq!(point, RfmPoint::new(30.0, 10.0, 500.0));

        assert!(parse_rfm_values("invalid").is_err());
        assert!(parse_rfm_values("1,2,x").is_err());
    }

    #[test]
    fn test_run_args_to_config() {
        let args = Args::parse_from([
            "segmentforge",
            "run",
            "--input",
            "retail.csv",
            "-k",
            "3",
            "--seed",
            "7",
            "--keep-duplicates",
            "--snapshot",
            "2011-12-10",
        ]);

        let Command::Run { pipeline, json } = args.command else {
            panic!("expected run command");
        };
        assert!(!json);
        assert_eq!(pipeline.input, "retail.csv");

        let config = pipeline.to_config().unwrap();
        assert_eq!(config.clustering.n_clusters, 3);
        assert_eq!(config.clustering.seed, 7);
        assert_eq!(config.clustering.n_init, 10);
        assert!(!config.cleaning.drop_duplicates);
        assert!(config.cleaning.drop_missing_customer);
        assert_eq!(config.snapshot, parse_timestamp("2011-12-10"));
    }

    #[test]
    fn test_invalid_snapshot() {
        let args = Args::parse_from([
            "segmentforge",
            "predict",
            "--rfm",
            "1,2,3",
            "--snapshot",
            "soon",
        ]);
        let Command::Predict { pipeline, .. } = args.command else {
            panic!("expected predict command");
        };
        assert!(pipeline.to_config().is_err());
    }

    #[test]
    fn test_summary_honors_cleaning_flags() {
        let args = Args::parse_from([
            "segmentforge",
            "summary",
            "--input",
            "retail.csv",
            "--keep-non-positive-price",
        ]);
        let Command::Summary { cleaning, top, .. } = args.command else {
            panic!("expected summary command");
        };
        assert_eq!(top, 5);
        let options = cleaning.to_options();
        assert!(!options.filter_positive_price);
        assert!(options.filter_positive_quantity);
        assert!(options.drop_duplicates);
    }

    #[test]
    fn test_customers_filter_args() {
        let args = Args::parse_from([
            "segmentforge",
            "customers",
            "--min-monetary",
            "250.5",
            "--max-recency",
            "90",
            "--keep-duplicates",
        ]);
        let Command::Customers {
            input,
            min_monetary,
            max_recency,
            snapshot,
            cleaning,
            json,
        } = args.command
        else {
            panic!("expected customers command");
        };
        assert_eq!(input, "data.csv");
        assert_eq!(min_monetary, 250.5);
        assert_eq!(max_recency, 90);
        assert!(snapshot.is_none());
        assert!(!json);
        assert!(!cleaning.to_options().drop_duplicates);
    }

    #[test]
    fn test_parse_snapshot() {
        assert_eq!(parse_snapshot(None).unwrap(), None);
        assert_eq!(
            parse_snapshot(Some("2011-12-10")).unwrap(),
            parse_timestamp("2011-12-10")
        );
        assert!(parse_snapshot(Some("soon")).is_err());
    }
}
