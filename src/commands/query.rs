//! Query command implementation

use crate::config::Config;
use crate::models::Record;
use crate::query::QueryService;
use crate::sync::Availability;
use serde::Serialize;
use tracing::info;

/// Query options
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Region name; falls back to the configured default
    pub region: Option<String>,
    /// Parent region name; falls back to the configured default
    pub parent_region: Option<String>,
    /// Only the most recent N rows
    pub latest: Option<usize>,
}

/// Query result for CLI display
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub region: String,
    pub parent_region: String,
    pub availability: Availability,
    pub records: Vec<Record>,
}

/// Execute a query, syncing first
pub async fn cmd_query(
    config: &Config,
    service: &QueryService,
    options: QueryOptions,
) -> QueryResult {
    let region = options
        .region
        .unwrap_or_else(|| config.query.default_region.clone());
    let parent_region = options
        .parent_region
        .unwrap_or_else(|| config.query.default_parent_region.clone());

    info!("Querying: {}, {}", region, parent_region);

    let set = service
        .get_records_with_status(&region, &parent_region, options.latest)
        .await;

    info!("Returning {} records", set.records.len());

    QueryResult {
        region,
        parent_region,
        availability: set.availability,
        records: set.records,
    }
}

fn fmt_int(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn fmt_float(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

/// Print query results to console
pub fn print_query_results(result: &QueryResult) {
    println!("\n🔍 {}, {}\n", result.region, result.parent_region);

    if result.records.is_empty() {
        match result.availability {
            Availability::Unavailable => println!("No data available yet (sync has never succeeded)."),
            _ => println!("No records found."),
        }
        return;
    }

    if result.availability == Availability::Stale {
        println!("⚠ Some files failed to sync; data may be stale.\n");
    }

    println!(
        "{:<12} {:>10} {:>12} {:>10} {:>8} {:>10} {:>10}",
        "date", "cases", "cases_avg", "per_100k", "deaths", "deaths_avg", "per_100k"
    );
    for r in &result.records {
        println!(
            "{:<12} {:>10} {:>12} {:>10} {:>8} {:>10} {:>10}",
            r.date,
            fmt_int(r.primary_metric),
            fmt_float(r.primary_metric_avg),
            fmt_float(r.primary_metric_avg_per_100k),
            fmt_int(r.secondary_metric),
            fmt_float(r.secondary_metric_avg),
            fmt_float(r.secondary_metric_avg_per_100k),
        );
    }
    println!("\n{} records", result.records.len());
}
