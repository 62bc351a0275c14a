//! CSV parsing into typed records
//!
//! Rows are read one at a time through a header-driven column map:
//! - a row missing any required field (date, geoid, county, state) is skipped and counted
//! - a numeric field that fails to coerce becomes `None`, the row is kept
//! - a row the CSV reader itself cannot decode is skipped and counted

use crate::error::{Error, Result};
use crate::models::Record;
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use std::io::Read;
use tracing::debug;

pub const COL_DATE: &str = "date";
pub const COL_GEOID: &str = "geoid";
pub const COL_COUNTY: &str = "county";
pub const COL_STATE: &str = "state";
pub const COL_CASES: &str = "cases";
pub const COL_CASES_AVG: &str = "cases_avg";
pub const COL_CASES_AVG_PER_100K: &str = "cases_avg_per_100k";
pub const COL_DEATHS: &str = "deaths";
pub const COL_DEATHS_AVG: &str = "deaths_avg";
pub const COL_DEATHS_AVG_PER_100K: &str = "deaths_avg_per_100k";

const REQUIRED_COLUMNS: [&str; 4] = [COL_DATE, COL_GEOID, COL_COUNTY, COL_STATE];

/// Result of parsing one file
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// Records in file order
    pub records: Vec<Record>,
    /// Rows dropped for missing required fields or undecodable CSV
    pub skipped: usize,
}

/// Header name to column position
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let name = if i == 0 {
                    name.trim_start_matches('\u{feff}')
                } else {
                    name
                };
                (name.trim().to_lowercase(), i)
            })
            .collect();
        Self { index }
    }

    fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !self.index.contains_key(*c))
            .collect()
    }

    fn get<'r>(&self, row: &'r StringRecord, column: &str) -> Option<&'r str> {
        self.index
            .get(column)
            .and_then(|&i| row.get(i))
            .map(str::trim)
    }

    fn required(&self, row: &StringRecord, column: &str) -> Option<String> {
        self.get(row, column)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn int(&self, row: &StringRecord, column: &str) -> Option<i64> {
        self.get(row, column).and_then(parse_int)
    }

    fn float(&self, row: &StringRecord, column: &str) -> Option<f64> {
        self.get(row, column).and_then(parse_float)
    }
}

/// Coerce an integer field; empty or malformed text is `None`
pub fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<i64>().ok()
}

/// Coerce a float field; empty, malformed or non-finite text is `None`
pub fn parse_float(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Streaming parser for the rolling-average CSV layout
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordParser;

impl RecordParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse CSV text from any reader
    pub fn parse<R: Read>(&self, reader: R) -> Result<ParseOutcome> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let columns = Columns::from_headers(reader.headers()?);
        let missing = columns.missing_required();
        if !missing.is_empty() {
            return Err(Error::Parse(format!(
                "CSV header is missing required columns: {}",
                missing.join(", ")
            )));
        }

        let mut outcome = ParseOutcome::default();
        let mut row = StringRecord::new();
        let mut line = 1u64;

        loop {
            line += 1;
            match reader.read_record(&mut row) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    // An IO failure means the source is broken, not the row
                    if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                        return Err(e.into());
                    }
                    debug!(line, error = %e, "Skipping undecodable row");
                    outcome.skipped += 1;
                    continue;
                }
            }

            if row.iter().all(|f| f.trim().is_empty()) {
                continue;
            }

            match Self::to_record(&columns, &row) {
                Some(record) => outcome.records.push(record),
                None => {
                    debug!(line, "Skipping row with missing required field");
                    outcome.skipped += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Parse CSV text held in memory
    pub fn parse_str(&self, text: &str) -> Result<ParseOutcome> {
        self.parse(text.as_bytes())
    }

    fn to_record(columns: &Columns, row: &StringRecord) -> Option<Record> {
        let date = columns.required(row, COL_DATE)?;
        let geoid = columns.required(row, COL_GEOID)?;
        let county = columns.required(row, COL_COUNTY)?;
        let state = columns.required(row, COL_STATE)?;

        let mut record = Record::new(date, geoid, county, state);
        record.primary_metric = columns.int(row, COL_CASES);
        record.primary_metric_avg = columns.float(row, COL_CASES_AVG);
        record.primary_metric_avg_per_100k = columns.float(row, COL_CASES_AVG_PER_100K);
        record.secondary_metric = columns.int(row, COL_DEATHS);
        record.secondary_metric_avg = columns.float(row, COL_DEATHS_AVG);
        record.secondary_metric_avg_per_100k = columns.float(row, COL_DEATHS_AVG_PER_100K);
        Some(record)
    }
}
