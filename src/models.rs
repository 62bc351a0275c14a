//! Domain records shared by the parser, the store and the query service.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Sync bookkeeping for one tracked upstream file
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SourceFileState {
    pub file_id: String,
    pub last_synced_revision: String,
}

impl SourceFileState {
    pub fn new(file_id: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            last_synced_revision: revision.into(),
        }
    }
}

/// One daily observation for a geographic entity
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub date: String,
    pub geo_entity_id: String,
    pub region_name: String,
    pub parent_region_name: String,
    pub primary_metric: Option<i64>,
    pub primary_metric_avg: Option<f64>,
    pub primary_metric_avg_per_100k: Option<f64>,
    pub secondary_metric: Option<i64>,
    pub secondary_metric_avg: Option<f64>,
    pub secondary_metric_avg_per_100k: Option<f64>,
}

impl Record {
    /// Build a record with all metrics unset; the id is derived from date and entity
    pub fn new(
        date: impl Into<String>,
        geo_entity_id: impl Into<String>,
        region_name: impl Into<String>,
        parent_region_name: impl Into<String>,
    ) -> Self {
        let date = date.into();
        let geo_entity_id = geo_entity_id.into();
        Self {
            id: record_id(&date, &geo_entity_id),
            date,
            geo_entity_id,
            region_name: region_name.into(),
            parent_region_name: parent_region_name.into(),
            primary_metric: None,
            primary_metric_avg: None,
            primary_metric_avg_per_100k: None,
            secondary_metric: None,
            secondary_metric_avg: None,
            secondary_metric_avg_per_100k: None,
        }
    }
}

/// Stable storage identity of an observation
pub fn record_id(date: &str, geo_entity_id: &str) -> String {
    format!("{}-{}", date, geo_entity_id)
}

/// A distinct region known to the store
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Region {
    pub region_name: String,
    pub parent_region_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_is_derived() {
        let record = Record::new("2021-03-01", "USA-53033", "King", "Washington");
        assert_eq!(record.id, "2021-03-01-USA-53033");
        assert_eq!(record.id, record_id("2021-03-01", "USA-53033"));
        assert!(record.primary_metric.is_none());
    }

    #[test]
    fn test_record_id_differs_per_entity_and_date() {
        assert_ne!(
            record_id("2021-03-01", "USA-53033"),
            record_id("2021-03-02", "USA-53033")
        );
        assert_ne!(
            record_id("2021-03-01", "USA-53033"),
            record_id("2021-03-01", "USA-53035")
        );
    }
}
