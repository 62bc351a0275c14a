//! Query service over the synced replica

use crate::meta::RecordQuery;
use crate::models::Record;
use crate::sync::{Availability, SyncCoordinator, SyncReport};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Records together with how trustworthy they are
#[derive(Debug, Clone, Serialize)]
pub struct RecordSet {
    pub records: Vec<Record>,
    pub availability: Availability,
}

/// Answers region queries once the replica is synced
#[derive(Clone)]
pub struct QueryService {
    coordinator: Arc<SyncCoordinator>,
}

impl QueryService {
    pub fn new(coordinator: Arc<SyncCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Records for a region in ascending date order, the latest `latest_n` if given.
    ///
    /// Returns an empty sequence when nothing could be read.
    pub async fn get_records(
        &self,
        region: &str,
        parent_region: &str,
        latest_n: Option<usize>,
    ) -> Vec<Record> {
        self.get_records_with_status(region, parent_region, latest_n)
            .await
            .records
    }

    /// Same as [`get_records`](Self::get_records), also reporting sync availability
    pub async fn get_records_with_status(
        &self,
        region: &str,
        parent_region: &str,
        latest_n: Option<usize>,
    ) -> RecordSet {
        let report: SyncReport = self.coordinator.ensure_synced().await;

        let query = RecordQuery {
            region: region.to_string(),
            parent_region: parent_region.to_string(),
            latest: latest_n,
        };

        match self.coordinator.store().query_records(&query).await {
            Ok(records) => {
                debug!(region, parent_region, rows = records.len(), "Query answered");
                RecordSet {
                    records,
                    availability: report.availability(),
                }
            }
            Err(e) => {
                warn!(region, parent_region, error = %e, "Failed to query replica");
                RecordSet {
                    records: Vec::new(),
                    availability: Availability::Unavailable,
                }
            }
        }
    }
}
