//! Integration tests for SegmentForge

use segmentforge::advisor::{MedianThresholds, SEGMENT_RULES};
use segmentforge::insights::{filter_customers, RfmFilter};
use segmentforge::{
    classify, clean_records, compute_rfm, load_transactions, rank_clusters, run_pipeline,
    CleaningOptions, ClusterParams, CustomerRfm, Error, PipelineConfig, RfmPoint, Segment,
    StandardScaler,
};
use std::io::Write;
use tempfile::NamedTempFile;

/// Create a test CSV file with sample data
fn create_test_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "Invoice,StockCode,Description,Quantity,InvoiceDate,Price,Customer ID,Country"
    )
    .unwrap();

    // Customer 17850 - multiple purchases, one of them a two-line invoice
    writeln!(file, "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01 08:26:00,2.55,17850,United Kingdom").unwrap();
    writeln!(
        file,
        "536365,71053,WHITE METAL LANTERN,6,2010-12-01 08:26:00,3.39,17850,United Kingdom"
    )
    .unwrap();
    writeln!(
        file,
        "536366,22633,HAND WARMER UNION JACK,6,2011-11-01 08:28:00,1.85,17850,United Kingdom"
    )
    .unwrap();
    // Duplicate line, collapsed by cleaning
    writeln!(
        file,
        "536366,22633,HAND WARMER UNION JACK,6,2011-11-01 08:28:00,1.85,17850,United Kingdom"
    )
    .unwrap();
    // Cancellation, dropped by cleaning
    writeln!(
        file,
        "C536367,22633,HAND WARMER UNION JACK,-6,2011-11-02 08:28:00,1.85,17850,United Kingdom"
    )
    .unwrap();

    // Customer 13047 - single purchase
    writeln!(file, "536368,84406B,CREAM CUPID HEARTS COAT HANGER,8,2010-12-01 08:34:00,2.75,13047,United Kingdom").unwrap();

    // Customer 12345 - recent high value
    writeln!(
        file,
        "536369,22752,SET 7 BABUSHKA NESTING BOXES,20,2011-12-05 10:15:00,7.65,12345,United Kingdom"
    )
    .unwrap();
    writeln!(file, "536370,21730,GLASS STAR FROSTED T-LIGHT HOLDER,12,2011-12-06 10:15:00,1.25,12345,United Kingdom").unwrap();

    // Customer 98765 - old low value
    writeln!(file, "536371,22457,NATURAL SLATE HEART CHALKBOARD,4,2010-01-15 09:00:00,3.25,98765,United Kingdom").unwrap();

    // Customer 55555 - mid
    writeln!(file, "536372,22457,NATURAL SLATE HEART CHALKBOARD,10,2011-08-15 09:00:00,3.25,55555,United Kingdom").unwrap();

    // Guest checkout and free sample, both dropped by cleaning
    writeln!(file, "536373,22457,NATURAL SLATE HEART CHALKBOARD,1,2011-08-15 09:00:00,3.25,,United Kingdom").unwrap();
    writeln!(file, "536374,POST,POSTAGE,1,2011-08-15 09:00:00,0,55555,United Kingdom").unwrap();

    file
}

fn config(n_clusters: usize) -> PipelineConfig {
    PipelineConfig {
        clustering: ClusterParams {
            n_clusters,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_end_to_end_pipeline() {
    let test_file = create_test_csv();
    let file_path = test_file.path().to_str().unwrap();

    let records = load_transactions(file_path).unwrap();
    assert_eq!(records.len(), 12);

    let output = run_pipeline(&records, &config(3)).unwrap();

    // 5 unique customers, 8 cleaned lines
    assert_eq!(output.customers.len(), 5);
    assert_eq!(output.cleaned_records, 8);
    assert_eq!(output.features.shape(), &[5, 3]);

    for customer in &output.customers {
        assert!(customer.cluster.unwrap() < 3);
    }
    let sizes = output.model.cluster_sizes();
    assert_eq!(sizes.iter().sum::<usize>(), 5);
    assert!(sizes.iter().all(|&size| size > 0));

    let mut ranks: Vec<usize> = output.profiles.iter().map(|p| p.rank).collect();
    ranks.sort_unstable();
    assert_eq!(ranks, vec![1, 2, 3]);
    assert!(output.profiles.iter().all(|p| p.actions.len() == 3));
}

#[test]
fn test_cleaning_invariants() {
    let test_file = create_test_csv();
    let records = load_transactions(test_file.path().to_str().unwrap()).unwrap();
    let cleaned = clean_records(&records, &CleaningOptions::default()).unwrap();

    for (i, record) in cleaned.iter().enumerate() {
        assert!(record.quantity > 0);
        assert!(record.unit_price > 0.0);
        for other in &cleaned[i + 1..] {
            assert_ne!(record, other);
        }
    }
}

#[test]
fn test_rfm_computation() {
    let test_file = create_test_csv();
    let records = load_transactions(test_file.path().to_str().unwrap()).unwrap();
    let cleaned = clean_records(&records, &CleaningOptions::default()).unwrap();
    let table = compute_rfm(&cleaned, None).unwrap();

    assert!(table.customers.iter().all(|c| c.recency >= 0));

    let repeat = table
        .customers
        .iter()
        .find(|c| c.customer_id == 17850)
        .unwrap();
    assert_eq!(repeat.frequency, 2);

    let total: f64 = cleaned.iter().map(|r| r.line_total).sum();
    let aggregated: f64 = table.customers.iter().map(|c| c.monetary).sum();
    assert!((total - aggregated).abs() < 1e-9);

    let (_, scaled) = StandardScaler::fit_transform(&table.raw_features()).unwrap();
    for column in scaled.columns() {
        assert!(column.mean().unwrap().abs() < 1e-9);
        assert!((column.std(0.0) - 1.0).abs() < 1e-9);
    }
}

#[test]
fn test_clustering_is_reproducible() {
    let test_file = create_test_csv();
    let records = load_transactions(test_file.path().to_str().unwrap()).unwrap();

    let first = run_pipeline(&records, &config(3)).unwrap();
    let second = run_pipeline(&records, &config(3)).unwrap();
    assert_eq!(first.model.labels, second.model.labels);
    assert_eq!(first.profiles, second.profiles);
}

#[test]
fn test_error_handling_invalid_clusters() {
    let test_file = create_test_csv();
    let records = load_transactions(test_file.path().to_str().unwrap()).unwrap();

    let result = run_pipeline(&records, &config(1));
    assert!(matches!(result, Err(Error::InvalidClusterCount { .. })));

    let result = run_pipeline(&records, &config(5));
    assert!(matches!(result, Err(Error::InvalidClusterCount { .. })));
}

#[test]
fn test_ranking_example_profiles() {
    let rows = [(0usize, 5, 10, 1000.0), (1, 50, 2, 100.0), (2, 20, 5, 500.0)];
    let customers: Vec<CustomerRfm> = rows
        .iter()
        .map(|&(cluster, recency, frequency, monetary)| CustomerRfm {
            customer_id: cluster as i64,
            recency,
            frequency,
            monetary,
            cluster: Some(cluster),
        })
        .collect();

    let profiles = rank_clusters(&customers).unwrap();
    assert_eq!(profiles[0].rank, 1);
    assert_eq!(profiles[1].rank, 3);
    assert_eq!(profiles[2].rank, 2);
}

#[test]
fn test_median_cut_vip() {
    let medians = MedianThresholds {
        recency: 30.0,
        frequency: 3.0,
        monetary: 300.0,
    };
    let segment = classify(&RfmPoint::new(12.0, 6.0, 800.0), &medians);
    assert_eq!(segment, Segment::Vip);
    assert_eq!(segment.actions().len(), 2);
    assert_eq!(SEGMENT_RULES[0].segment, Segment::Vip);
}

#[test]
fn test_single_customer_is_degenerate() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "InvoiceNo,Quantity,InvoiceDate,UnitPrice,CustomerID").unwrap();
    writeln!(file, "1,2,2011-01-01T10:00:00Z,3.5,42").unwrap();
    writeln!(file, "2,1,2011-02-01T10:00:00Z,3.5,42").unwrap();

    let records = load_transactions(file.path().to_str().unwrap()).unwrap();
    let result = run_pipeline(&records, &config(2));
    assert!(matches!(result, Err(Error::InsufficientData(_))));

    let cleaned = clean_records(&records, &CleaningOptions::default()).unwrap();
    let table = compute_rfm(&cleaned, None).unwrap();
    assert!(matches!(
        segmentforge::GlobalThresholds::from_customers(&table.customers),
        Err(Error::UndefinedThreshold(_))
    ));
}

#[test]
fn test_empty_customer_column_is_malformed() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Invoice,Quantity,InvoiceDate,Price,Customer ID").unwrap();
    writeln!(file, "1,2,2011-01-01 10:00:00,3.5,").unwrap();
    writeln!(file, "2,1,2011-02-01 10:00:00,4.0,").unwrap();

    let records = load_transactions(file.path().to_str().unwrap()).unwrap();
    let err = run_pipeline(&records, &config(2)).unwrap_err();
    assert_eq!(err.kind(), "malformed_input");
}

#[test]
fn test_corrupt_values_are_not_dropped() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Invoice,Quantity,InvoiceDate,Price,Customer ID").unwrap();
    writeln!(file, "1,2,2011-01-01 10:00:00,3.5,17850").unwrap();
    writeln!(file, "2,1,2011-01-02 10:00:00,abc,13047").unwrap();
    writeln!(file, "3,1,2011-01-03 10:00:00,4.0,NOT_AN_ID").unwrap();
    writeln!(file, "4,1,2011-01-04 10:00:00,4.0,12000").unwrap();

    let err = load_transactions(file.path().to_str().unwrap()).unwrap_err();
    assert_eq!(err.kind(), "malformed_input");
}

#[test]
fn test_customer_filter_over_rfm_table() {
    let test_file = create_test_csv();
    let records = load_transactions(test_file.path().to_str().unwrap()).unwrap();
    let cleaned = clean_records(&records, &CleaningOptions::default()).unwrap();
    let table = compute_rfm(&cleaned, None).unwrap();

    let filter = RfmFilter {
        min_monetary: 100.0,
        max_recency: 30,
    };
    let kept: Vec<i64> = filter_customers(&table.customers, &filter)
        .iter()
        .map(|c| c.customer_id)
        .collect();
    assert_eq!(kept, vec![12345]);
}
