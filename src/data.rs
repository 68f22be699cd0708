//! Transaction records, CSV loading with Polars, and data cleaning

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CleaningOptions;
use crate::Error;

const INVOICE_COLUMNS: &[&str] = &["Invoice", "InvoiceNo"];
const STOCK_CODE_COLUMNS: &[&str] = &["StockCode"];
const DESCRIPTION_COLUMNS: &[&str] = &["Description"];
const QUANTITY_COLUMNS: &[&str] = &["Quantity"];
const DATE_COLUMNS: &[&str] = &["InvoiceDate"];
const PRICE_COLUMNS: &[&str] = &["Price", "UnitPrice"];
const CUSTOMER_COLUMNS: &[&str] = &["Customer ID", "CustomerID"];
const COUNTRY_COLUMNS: &[&str] = &["Country"];

// Column names of the in-memory frames
pub(crate) const INVOICE: &str = "Invoice";
pub(crate) const STOCK_CODE: &str = "StockCode";
pub(crate) const DESCRIPTION: &str = "Description";
pub(crate) const QUANTITY: &str = "Quantity";
pub(crate) const PRICE: &str = "Price";
pub(crate) const INVOICE_DATE: &str = "InvoiceDate";
pub(crate) const CUSTOMER_ID: &str = "CustomerID";
pub(crate) const COUNTRY: &str = "Country";
pub(crate) const LINE_TOTAL: &str = "LineTotal";
const ROW: &str = "row";

/// Columns compared when collapsing duplicate lines
const RECORD_FIELDS: &[&str] = &[
    INVOICE,
    STOCK_CODE,
    DESCRIPTION,
    QUANTITY,
    PRICE,
    INVOICE_DATE,
    CUSTOMER_ID,
    COUNTRY,
];

/// Naive date-time layouts accepted for `InvoiceDate`, tried in order after RFC 3339
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// One raw invoice line as read from the source table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub invoice_id: String,
    pub stock_code: Option<String>,
    pub description: Option<String>,
    /// Negative for returns and cancellations
    pub quantity: i64,
    pub unit_price: f64,
    pub invoice_timestamp: NaiveDateTime,
    pub customer_id: Option<i64>,
    pub country: Option<String>,
}

impl TransactionRecord {
    /// Create a record with the optional descriptive fields left empty
    pub fn new(
        invoice_id: impl Into<String>,
        customer_id: Option<i64>,
        quantity: i64,
        unit_price: f64,
        invoice_timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            invoice_id: invoice_id.into(),
            stock_code: None,
            description: None,
            quantity,
            unit_price,
            invoice_timestamp,
            customer_id,
            country: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A transaction line that passed cleaning, with its derived line total
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedRecord {
    pub invoice_id: String,
    pub stock_code: Option<String>,
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_price: f64,
    pub invoice_timestamp: NaiveDateTime,
    pub customer_id: i64,
    pub country: Option<String>,
    /// `quantity * unit_price`
    pub line_total: f64,
}

/// Clean raw transactions for RFM analysis
///
/// Rules run in order: drop rows without a customer, keep `quantity > 0`,
/// keep `unit_price > 0`, collapse exact duplicates (first occurrence wins).
/// Each rule can be disabled through `options`.
///
/// # Errors
/// * `MalformedInput` if no record carries a customer id, or if a retained
///   record has none (only possible when `drop_missing_customer` is disabled)
pub fn clean_records(
    records: &[TransactionRecord],
    options: &CleaningOptions,
) -> crate::Result<Vec<CleanedRecord>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let df = transactions_frame(records)?;
    if df.column(CUSTOMER_ID)?.null_count() == df.height() {
        return Err(Error::MalformedInput(
            "customer id is missing from every record".to_string(),
        ));
    }

    let mut lf = df.lazy();
    if options.drop_missing_customer {
        lf = lf.filter(col(CUSTOMER_ID).is_not_null());
    }
    if options.filter_positive_quantity {
        lf = lf.filter(col(QUANTITY).gt(lit(0)));
    }
    if options.filter_positive_price {
        lf = lf.filter(col(PRICE).gt(lit(0.0)));
    }
    if options.drop_duplicates {
        let fields = RECORD_FIELDS.iter().map(|name| name.to_string()).collect();
        lf = lf.unique_stable(Some(fields), UniqueKeepStrategy::First);
    }

    let kept = lf
        .select([
            col(ROW),
            (col(QUANTITY).cast(DataType::Float64) * col(PRICE)).alias(LINE_TOTAL),
        ])
        .collect()?;

    let rows = kept.column(ROW)?.u64()?.into_no_null_iter();
    let line_totals = kept.column(LINE_TOTAL)?.f64()?.into_no_null_iter();

    let mut cleaned = Vec::with_capacity(kept.height());
    for (row, line_total) in rows.zip(line_totals) {
        let record = &records[row as usize];
        let customer_id = record.customer_id.ok_or_else(|| {
            Error::MalformedInput(format!(
                "invoice {} has no customer id and cannot be coerced to an integer",
                record.invoice_id
            ))
        })?;

        cleaned.push(CleanedRecord {
            invoice_id: record.invoice_id.clone(),
            stock_code: record.stock_code.clone(),
            description: record.description.clone(),
            quantity: record.quantity,
            unit_price: record.unit_price,
            invoice_timestamp: record.invoice_timestamp,
            customer_id,
            country: record.country.clone(),
            line_total,
        });
    }

    info!(
        raw = records.len(),
        cleaned = cleaned.len(),
        "cleaned transaction records"
    );
    Ok(cleaned)
}

/// Raw records as a DataFrame, plus a `row` column pointing back into `records`
fn transactions_frame(records: &[TransactionRecord]) -> crate::Result<DataFrame> {
    let row: Vec<u64> = (0..records.len() as u64).collect();
    let invoice: Vec<&str> = records.iter().map(|r| r.invoice_id.as_str()).collect();
    let stock_code: Vec<Option<&str>> =
        records.iter().map(|r| r.stock_code.as_deref()).collect();
    let description: Vec<Option<&str>> =
        records.iter().map(|r| r.description.as_deref()).collect();
    let quantity: Vec<i64> = records.iter().map(|r| r.quantity).collect();
    let price: Vec<f64> = records.iter().map(|r| r.unit_price).collect();
    let timestamp: Vec<i64> = records
        .iter()
        .map(|r| timestamp_micros(&r.invoice_timestamp))
        .collect();
    let customer: Vec<Option<i64>> = records.iter().map(|r| r.customer_id).collect();
    let country: Vec<Option<&str>> = records.iter().map(|r| r.country.as_deref()).collect();

    Ok(DataFrame::new(vec![
        Series::new(ROW, row),
        Series::new(INVOICE, invoice),
        Series::new(STOCK_CODE, stock_code),
        Series::new(DESCRIPTION, description),
        Series::new(QUANTITY, quantity),
        Series::new(PRICE, price),
        Series::new(INVOICE_DATE, timestamp),
        Series::new(CUSTOMER_ID, customer),
        Series::new(COUNTRY, country),
    ])?)
}

/// Cleaned records as a DataFrame with `InvoiceDate` in microseconds since the epoch
pub fn cleaned_frame(records: &[CleanedRecord]) -> crate::Result<DataFrame> {
    let invoice: Vec<&str> = records.iter().map(|r| r.invoice_id.as_str()).collect();
    let description: Vec<Option<&str>> =
        records.iter().map(|r| r.description.as_deref()).collect();
    let quantity: Vec<i64> = records.iter().map(|r| r.quantity).collect();
    let timestamp: Vec<i64> = records
        .iter()
        .map(|r| timestamp_micros(&r.invoice_timestamp))
        .collect();
    let customer: Vec<i64> = records.iter().map(|r| r.customer_id).collect();
    let line_total: Vec<f64> = records.iter().map(|r| r.line_total).collect();

    Ok(DataFrame::new(vec![
        Series::new(INVOICE, invoice),
        Series::new(DESCRIPTION, description),
        Series::new(QUANTITY, quantity),
        Series::new(INVOICE_DATE, timestamp),
        Series::new(CUSTOMER_ID, customer),
        Series::new(LINE_TOTAL, line_total),
    ])?)
}

pub(crate) fn timestamp_micros(timestamp: &NaiveDateTime) -> i64 {
    timestamp.and_utc().timestamp_micros()
}

/// Load transaction records from a CSV file
///
/// # Arguments
/// * `file_path` - Path to the CSV file (Online Retail or Online Retail II layout)
///
/// # Returns
/// * Raw `TransactionRecord`s in file order
pub fn load_transactions(file_path: &str) -> crate::Result<Vec<TransactionRecord>> {
    // Full-file schema inference: invoice numbers turn alphanumeric ("C489449")
    // far into the file.
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(PathBuf::from(file_path)))?
        .finish()?;

    debug!(rows = df.height(), columns = df.width(), "read csv {}", file_path);
    records_from_frame(&df)
}

/// Convert a loaded DataFrame into transaction records
pub fn records_from_frame(df: &DataFrame) -> crate::Result<Vec<TransactionRecord>> {
    let invoices = string_values(required_column(df, INVOICE_COLUMNS)?)?;
    let quantities = i64_values(required_column(df, QUANTITY_COLUMNS)?)?;
    let dates = string_values(required_column(df, DATE_COLUMNS)?)?;
    let prices = f64_values(required_column(df, PRICE_COLUMNS)?)?;
    let customers = f64_values(required_column(df, CUSTOMER_COLUMNS)?)?;

    let stock_codes = optional_strings(df, STOCK_CODE_COLUMNS)?;
    let descriptions = optional_strings(df, DESCRIPTION_COLUMNS)?;
    let countries = optional_strings(df, COUNTRY_COLUMNS)?;

    let mut records = Vec::with_capacity(df.height());
    let mut skipped = 0usize;

    for row in 0..df.height() {
        let invoice_id = invoices[row].clone().ok_or_else(|| {
            Error::MalformedInput(format!("missing invoice id in data row {}", row + 1))
        })?;
        let raw_date = dates[row].as_deref().ok_or_else(|| {
            Error::MalformedInput(format!("missing InvoiceDate in data row {}", row + 1))
        })?;
        let invoice_timestamp = parse_timestamp(raw_date).ok_or_else(|| {
            Error::MalformedInput(format!(
                "unparseable InvoiceDate '{}' in data row {}",
                raw_date,
                row + 1
            ))
        })?;

        let (Some(quantity), Some(unit_price)) = (quantities[row], prices[row]) else {
            skipped += 1;
            continue;
        };

        records.push(TransactionRecord {
            invoice_id,
            stock_code: stock_codes.as_ref().and_then(|v| v[row].clone()),
            description: descriptions.as_ref().and_then(|v| v[row].clone()),
            quantity,
            unit_price,
            invoice_timestamp,
            customer_id: customers[row].filter(|id| id.is_finite()).map(|id| id as i64),
            country: countries.as_ref().and_then(|v| v[row].clone()),
        });
    }

    if skipped > 0 {
        warn!(skipped, "skipped rows with missing quantity or price");
    }
    Ok(records)
}

/// Parse an invoice timestamp in any of the supported layouts
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn find_column<'a>(df: &'a DataFrame, aliases: &[&str]) -> Option<&'a Series> {
    aliases.iter().find_map(|name| df.column(name).ok())
}

fn required_column<'a>(df: &'a DataFrame, aliases: &[&str]) -> crate::Result<&'a Series> {
    find_column(df, aliases).ok_or_else(|| {
        Error::MalformedInput(format!(
            "required column missing (expected one of: {})",
            aliases.join(", ")
        ))
    })
}

fn optional_strings(
    df: &DataFrame,
    aliases: &[&str],
) -> crate::Result<Option<Vec<Option<String>>>> {
    find_column(df, aliases).map(string_values).transpose()
}

fn string_values(series: &Series) -> crate::Result<Vec<Option<String>>> {
    let series = series.cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

fn i64_values(series: &Series) -> crate::Result<Vec<Option<i64>>> {
    let series = checked_cast(series, &DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

fn f64_values(series: &Series) -> crate::Result<Vec<Option<f64>>> {
    let series = checked_cast(series, &DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

/// Cast a column, failing on any present value the cast turned into null
///
/// Empty cells stay null; text such as `abc` in a numeric column is an error.
fn checked_cast(series: &Series, dtype: &DataType) -> crate::Result<Series> {
    let cast = series.cast(dtype)?;
    if cast.null_count() == series.null_count() {
        return Ok(cast);
    }

    let failed = series
        .is_not_null()
        .into_iter()
        .zip(cast.is_null().into_iter())
        .position(|(present, lost)| present == Some(true) && lost == Some(true));
    match failed {
        Some(row) => Err(Error::MalformedInput(format!(
            "invalid {} value {} in data row {}",
            series.name(),
            series.get(row)?,
            row + 1
        ))),
        None => Ok(cast),
    }
}
