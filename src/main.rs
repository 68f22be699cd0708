//! SegmentForge: customer segmentation CLI
//!
//! Entrypoint that loads transactions, runs the segmentation pipeline and
//! prints ranked segments, predictions or descriptive summaries.

use anyhow::{Context, Result};
use clap::Parser;
use segmentforge::cli::{parse_rfm_values, parse_snapshot, CleaningArgs, Command, PipelineArgs};
use segmentforge::insights::{filter_customers, monthly_revenue, top_products, RfmFilter};
use segmentforge::report::{to_json, CustomerTable, SegmentationReport, SummaryReport};
use segmentforge::{
    clean_records, compute_rfm, load_transactions, run_pipeline, Args, CleanedRecord,
    PipelineOutput,
};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::INFO } else { Level::WARN })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &args.command {
        Command::Run { pipeline, json } => run_segmentation(pipeline, *json),
        Command::Predict { pipeline, rfm } => run_prediction(pipeline, rfm),
        Command::Summary {
            input,
            top,
            cleaning,
        } => run_summary(input, *top, cleaning),
        Command::Customers {
            input,
            min_monetary,
            max_recency,
            snapshot,
            cleaning,
            json,
        } => {
            let filter = RfmFilter {
                min_monetary: *min_monetary,
                max_recency: *max_recency,
            };
            run_customers(input, snapshot.as_deref(), cleaning, &filter, *json)
        }
    }
}

fn load_cleaned(input: &str, cleaning: &CleaningArgs) -> Result<Vec<CleanedRecord>> {
    info!(input, "loading transactions");
    let records =
        load_transactions(input).with_context(|| format!("failed to load {}", input))?;
    Ok(clean_records(&records, &cleaning.to_options())?)
}

fn fit(pipeline: &PipelineArgs) -> Result<PipelineOutput> {
    let config = pipeline.to_config()?;

    info!(input = %pipeline.input, "loading transactions");
    let records = load_transactions(&pipeline.input)
        .with_context(|| format!("failed to load {}", pipeline.input))?;

    Ok(run_pipeline(&records, &config)?)
}

/// Run full clustering pipeline
fn run_segmentation(pipeline: &PipelineArgs, json: bool) -> Result<()> {
    let start_time = Instant::now();
    let output = fit(pipeline)?;

    if json {
        println!("{}", to_json(&output)?);
    } else {
        print!("{}", SegmentationReport(&output));
        println!("\nTotal processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    }

    Ok(())
}

/// Run prediction mode for a single customer
fn run_prediction(pipeline: &PipelineArgs, rfm: &str) -> Result<()> {
    let point = parse_rfm_values(rfm)?;
    let output = fit(pipeline)?;

    let cluster = output.predict(&point)?;
    let profile = output
        .profile(cluster)
        .context("predicted cluster has no profile")?;

    println!(
        "Input RFM values: R={}, F={}, M={}",
        point.recency, point.frequency, point.monetary
    );
    println!("\n✓ Predicted Cluster: {} ({})", cluster, profile.tier_label);
    if let Some(segment) = profile.segment {
        println!("  Segment: {}", segment);
    }
    println!(
        "  Size: {} customers ({:.1}% of total)",
        profile.size,
        profile.size as f64 / output.customers.len() as f64 * 100.0
    );
    println!(
        "  Centroid (normalized): R={:.2}, F={:.2}, M={:.2}",
        output.model.centroids[[cluster, 0]],
        output.model.centroids[[cluster, 1]],
        output.model.centroids[[cluster, 2]]
    );
    for action in &profile.actions {
        println!("  - {}", action);
    }

    Ok(())
}

fn run_summary(input: &str, top: usize, cleaning: &CleaningArgs) -> Result<()> {
    let cleaned = load_cleaned(input, cleaning)?;

    let revenue = monthly_revenue(&cleaned)?;
    let products = top_products(&cleaned, top)?;
    print!(
        "{}",
        SummaryReport {
            revenue: &revenue,
            products: &products,
        }
    );

    Ok(())
}

/// List customers whose RFM values pass the spend and recency bounds
fn run_customers(
    input: &str,
    snapshot: Option<&str>,
    cleaning: &CleaningArgs,
    filter: &RfmFilter,
    json: bool,
) -> Result<()> {
    let snapshot = parse_snapshot(snapshot)?;
    let cleaned = load_cleaned(input, cleaning)?;
    let table = compute_rfm(&cleaned, snapshot)?;

    let customers = filter_customers(&table.customers, filter);
    if json {
        println!("{}", to_json(&customers)?);
    } else {
        println!("Snapshot date: {}", table.snapshot);
        print!("{}", CustomerTable(&customers));
    }

    Ok(())
}
