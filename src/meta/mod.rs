//! Replica storage using SQLite
//!
//! This module handles all persisted state:
//! - Source files (last synced revision per tracked file)
//! - Records (merged observations, upserted by id)
//! - Sync runs (per-file outcome history)
//!
//! The schema is created on first use and every statement is idempotent.

mod schema;

pub use schema::*;

use crate::error::Result;
use crate::models::{Record, Region, SourceFileState};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Filter for record queries
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub region: String,
    pub parent_region: String,
    /// Return only the most recent N rows by date (still ascending)
    pub latest: Option<usize>,
}

impl RecordQuery {
    pub fn new(region: impl Into<String>, parent_region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            parent_region: parent_region.into(),
            latest: None,
        }
    }

    pub fn latest(mut self, n: usize) -> Self {
        self.latest = Some(n);
        self
    }
}

/// A persisted per-file sync outcome
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: String,
    pub file_id: String,
    pub started_at: String,
    pub completed_at: String,
    pub status: String,
    pub revision: Option<String>,
    pub records_upserted: i64,
    pub rows_skipped: i64,
    pub error: Option<String>,
}

/// Global statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub file_count: usize,
    pub record_count: usize,
    pub region_count: usize,
    pub run_count: usize,
}

/// Replica database handle
#[derive(Clone)]
pub struct SyncStore {
    pool: SqlitePool,
    schema: Arc<OnceCell<()>>,
}

impl SyncStore {
    /// Open (or create) the database at an explicit path
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(60));

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            schema: Arc::new(OnceCell::new()),
        })
    }

    /// Create tables if absent; runs once per handle
    pub async fn ensure_schema(&self) -> Result<()> {
        self.schema
            .get_or_try_init(|| async {
                debug!("Ensuring database schema");
                sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
                Ok::<(), crate::error::Error>(())
            })
            .await?;
        Ok(())
    }

    async fn pool(&self) -> Result<&SqlitePool> {
        self.ensure_schema().await?;
        Ok(&self.pool)
    }

    // ===== Source File Operations =====

    /// Get the sync state of a tracked file
    pub async fn get_file_state(&self, file_id: &str) -> Result<Option<SourceFileState>> {
        let state = sqlx::query_as::<_, SourceFileState>(
            "SELECT file_id, last_synced_revision FROM source_files WHERE file_id = ?",
        )
        .bind(file_id)
        .fetch_optional(self.pool().await?)
        .await?;
        Ok(state)
    }

    /// List the sync state of every file that has synced at least once
    pub async fn list_file_states(&self) -> Result<Vec<SourceFileState>> {
        let states = sqlx::query_as::<_, SourceFileState>(
            "SELECT file_id, last_synced_revision FROM source_files ORDER BY file_id",
        )
        .fetch_all(self.pool().await?)
        .await?;
        Ok(states)
    }

    /// Overwrite the sync state of a file
    pub async fn set_file_state(&self, state: &SourceFileState) -> Result<()> {
        let mut conn = self.pool().await?.acquire().await?;
        write_file_state(&mut *conn, state).await
    }

    // ===== Record Operations =====

    /// Insert or replace records by id, atomically
    pub async fn upsert_records(&self, records: &[Record]) -> Result<usize> {
        let mut tx = self.pool().await?.begin().await?;
        let count = upsert_in(&mut tx, records).await?;
        tx.commit().await?;
        Ok(count)
    }

    /// Upsert a file's records and advance its revision marker in one transaction
    pub async fn commit_file_sync(
        &self,
        records: &[Record],
        state: &SourceFileState,
    ) -> Result<usize> {
        let mut tx = self.pool().await?.begin().await?;
        let count = upsert_in(&mut tx, records).await?;
        write_file_state(&mut *tx, state).await?;
        tx.commit().await?;

        info!(
            file_id = %state.file_id,
            revision = %state.last_synced_revision,
            records = count,
            "Committed file sync"
        );
        Ok(count)
    }

    /// Records for a region, ascending by date
    pub async fn query_records(&self, query: &RecordQuery) -> Result<Vec<Record>> {
        let pool = self.pool().await?;
        let records = match query.latest {
            Some(n) => {
                sqlx::query_as::<_, Record>(
                    r#"
                    SELECT * FROM (
                        SELECT * FROM records
                        WHERE region_name = ? AND parent_region_name = ?
                        ORDER BY date DESC, id DESC
                        LIMIT ?
                    )
                    ORDER BY date ASC, id ASC
                    "#,
                )
                .bind(&query.region)
                .bind(&query.parent_region)
                .bind(i64::try_from(n).unwrap_or(i64::MAX))
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Record>(
                    r#"
                    SELECT * FROM records
                    WHERE region_name = ? AND parent_region_name = ?
                    ORDER BY date ASC, id ASC
                    "#,
                )
                .bind(&query.region)
                .bind(&query.parent_region)
                .fetch_all(pool)
                .await?
            }
        };
        Ok(records)
    }

    /// Get a single record by id
    pub async fn get_record(&self, id: &str) -> Result<Option<Record>> {
        let record = sqlx::query_as::<_, Record>("SELECT * FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool().await?)
            .await?;
        Ok(record)
    }

    /// Distinct regions, optionally restricted to one parent region
    pub async fn list_regions(&self, parent_region: Option<&str>) -> Result<Vec<Region>> {
        let pool = self.pool().await?;
        let regions = match parent_region {
            Some(parent) => {
                sqlx::query_as::<_, Region>(
                    r#"
                    SELECT DISTINCT region_name, parent_region_name FROM records
                    WHERE parent_region_name = ?
                    ORDER BY parent_region_name, region_name
                    "#,
                )
                .bind(parent)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Region>(
                    r#"
                    SELECT DISTINCT region_name, parent_region_name FROM records
                    ORDER BY parent_region_name, region_name
                    "#,
                )
                .fetch_all(pool)
                .await?
            }
        };
        Ok(regions)
    }

    /// Total number of stored records
    pub async fn record_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(self.pool().await?)
            .await?;
        Ok(count as usize)
    }

    // ===== Sync Run Operations =====

    /// Append a per-file sync outcome
    pub async fn insert_sync_run(&self, run: &SyncRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (id, file_id, started_at, completed_at, status, revision, records_upserted, rows_skipped, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.file_id)
        .bind(&run.started_at)
        .bind(&run.completed_at)
        .bind(&run.status)
        .bind(&run.revision)
        .bind(run.records_upserted)
        .bind(run.rows_skipped)
        .bind(&run.error)
        .execute(self.pool().await?)
        .await?;
        Ok(())
    }

    /// Number of recorded sync runs
    pub async fn sync_run_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_runs")
            .fetch_one(self.pool().await?)
            .await?;
        Ok(count as usize)
    }

    /// Latest sync run for a file
    pub async fn get_latest_run(&self, file_id: &str) -> Result<Option<SyncRun>> {
        let run = sqlx::query_as::<_, SyncRun>(
            "SELECT * FROM sync_runs WHERE file_id = ? ORDER BY completed_at DESC LIMIT 1",
        )
        .bind(file_id)
        .fetch_optional(self.pool().await?)
        .await?;
        Ok(run)
    }

    // ===== Statistics =====

    /// Get global statistics
    pub async fn get_stats(&self) -> Result<StoreStats> {
        let pool = self.pool().await?;

        let file_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM source_files")
            .fetch_one(pool)
            .await?;

        let record_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(pool)
            .await?;

        let region_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM (SELECT DISTINCT region_name, parent_region_name FROM records)",
        )
        .fetch_one(pool)
        .await?;

        Ok(StoreStats {
            file_count: file_count as usize,
            record_count: record_count as usize,
            region_count: region_count as usize,
            run_count: self.sync_run_count().await?,
        })
    }
}

async fn upsert_in(tx: &mut Transaction<'_, Sqlite>, records: &[Record]) -> Result<usize> {
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO records (id, date, geo_entity_id, region_name, parent_region_name,
                primary_metric, primary_metric_avg, primary_metric_avg_per_100k,
                secondary_metric, secondary_metric_avg, secondary_metric_avg_per_100k)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                date = excluded.date,
                geo_entity_id = excluded.geo_entity_id,
                region_name = excluded.region_name,
                parent_region_name = excluded.parent_region_name,
                primary_metric = excluded.primary_metric,
                primary_metric_avg = excluded.primary_metric_avg,
                primary_metric_avg_per_100k = excluded.primary_metric_avg_per_100k,
                secondary_metric = excluded.secondary_metric,
                secondary_metric_avg = excluded.secondary_metric_avg,
                secondary_metric_avg_per_100k = excluded.secondary_metric_avg_per_100k
            "#,
        )
        .bind(&record.id)
        .bind(&record.date)
        .bind(&record.geo_entity_id)
        .bind(&record.region_name)
        .bind(&record.parent_region_name)
        .bind(record.primary_metric)
        .bind(record.primary_metric_avg)
        .bind(record.primary_metric_avg_per_100k)
        .bind(record.secondary_metric)
        .bind(record.secondary_metric_avg)
        .bind(record.secondary_metric_avg_per_100k)
        .execute(&mut **tx)
        .await?;
    }
    Ok(records.len())
}

async fn write_file_state(conn: &mut sqlx::SqliteConnection, state: &SourceFileState) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO source_files (file_id, last_synced_revision) VALUES (?, ?)
        ON CONFLICT(file_id) DO UPDATE SET last_synced_revision = excluded.last_synced_revision
        "#,
    )
    .bind(&state.file_id)
    .bind(&state.last_synced_revision)
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_store() -> (SyncStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = SyncStore::connect(&tmp.path().join("test.db")).await.unwrap();
        (store, tmp)
    }

    fn record(date: &str, geoid: &str, cases: Option<i64>) -> Record {
        let mut r = Record::new(date, geoid, "King", "Washington");
        r.primary_metric = cases;
        r
    }

    #[tokio::test]
    async fn test_schema_is_created_lazily_and_idempotently() {
        let (store, tmp) = setup_test_store().await;
        assert!(store.get_file_state("x").await.unwrap().is_none());
        store.ensure_schema().await.unwrap();

        // A second handle on the same file re-runs CREATE IF NOT EXISTS safely
        let other = SyncStore::connect(&tmp.path().join("test.db")).await.unwrap();
        other.ensure_schema().await.unwrap();
        assert_eq!(other.record_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_state_overwrite() {
        let (store, _tmp) = setup_test_store().await;

        store
            .set_file_state(&SourceFileState::new("us-counties-2020", "r1"))
            .await
            .unwrap();
        store
            .set_file_state(&SourceFileState::new("us-counties-2020", "r2"))
            .await
            .unwrap();

        let state = store.get_file_state("us-counties-2020").await.unwrap().unwrap();
        assert_eq!(state.last_synced_revision, "r2");
        assert_eq!(store.list_file_states().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (store, _tmp) = setup_test_store().await;
        let records = vec![
            record("2021-01-01", "USA-1", Some(1)),
            record("2021-01-02", "USA-1", Some(2)),
        ];

        store.upsert_records(&records).await.unwrap();
        let once = store
            .query_records(&RecordQuery::new("King", "Washington"))
            .await
            .unwrap();

        store.upsert_records(&records).await.unwrap();
        let twice = store
            .query_records(&RecordQuery::new("King", "Washington"))
            .await
            .unwrap();

        assert_eq!(once, twice);
        assert_eq!(store.record_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_same_identity_collapses_later_wins() {
        let (store, _tmp) = setup_test_store().await;

        store
            .upsert_records(&[record("2021-01-01", "USA-1", Some(1))])
            .await
            .unwrap();
        store
            .upsert_records(&[record("2021-01-01", "USA-1", None)])
            .await
            .unwrap();

        assert_eq!(store.record_count().await.unwrap(), 1);
        let stored = store
            .get_record("2021-01-01-USA-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.primary_metric, None);
    }

    #[tokio::test]
    async fn test_query_latest_returns_tail_in_ascending_order() {
        let (store, _tmp) = setup_test_store().await;
        let records: Vec<Record> = (1..=5)
            .map(|d| record(&format!("2021-01-0{}", d), "USA-1", Some(d)))
            .collect();
        // Insert out of order
        let mut shuffled = records.clone();
        shuffled.reverse();
        store.upsert_records(&shuffled).await.unwrap();

        let latest = store
            .query_records(&RecordQuery::new("King", "Washington").latest(2))
            .await
            .unwrap();
        let dates: Vec<&str> = latest.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["2021-01-04", "2021-01-05"]);

        let all = store
            .query_records(&RecordQuery::new("King", "Washington"))
            .await
            .unwrap();
        assert_eq!(all, records);

        let more = store
            .query_records(&RecordQuery::new("King", "Washington").latest(10))
            .await
            .unwrap();
        assert_eq!(more.len(), 5);
    }

    #[tokio::test]
    async fn test_query_filters_by_region() {
        let (store, _tmp) = setup_test_store().await;
        let mut other = Record::new("2021-01-01", "USA-2", "Pierce", "Washington");
        other.primary_metric = Some(9);
        let mut other_state = Record::new("2021-01-01", "USA-3", "King", "Texas");
        other_state.primary_metric = Some(9);
        store
            .upsert_records(&[record("2021-01-01", "USA-1", Some(1)), other, other_state])
            .await
            .unwrap();

        let rows = store
            .query_records(&RecordQuery::new("King", "Washington"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].geo_entity_id, "USA-1");

        let regions = store.list_regions(Some("Washington")).await.unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].region_name, "King");
        assert_eq!(store.list_regions(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_commit_file_sync_writes_rows_and_marker() {
        let (store, _tmp) = setup_test_store().await;
        let state = SourceFileState::new("us-counties-2021", "2021-06-02T10:00:00Z");

        let count = store
            .commit_file_sync(&[record("2021-01-01", "USA-1", Some(1))], &state)
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            store.get_file_state("us-counties-2021").await.unwrap(),
            Some(state)
        );
        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.record_count, 1);
        assert_eq!(stats.region_count, 1);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back_rows_and_marker() {
        let (store, _tmp) = setup_test_store().await;
        let r1 = SourceFileState::new("us-counties-2021", "r1");
        store
            .commit_file_sync(&[record("2021-01-01", "USA-1", Some(1))], &r1)
            .await
            .unwrap();

        // Reject one entity so the batch fails after earlier rows were written
        sqlx::query(
            r#"
            CREATE TRIGGER reject_entity BEFORE INSERT ON records
            WHEN NEW.geo_entity_id = 'USA-BAD'
            BEGIN SELECT RAISE(ABORT, 'rejected'); END
            "#,
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let batch = [
            record("2021-01-01", "USA-1", Some(99)),
            record("2021-01-02", "USA-1", Some(2)),
            record("2021-01-02", "USA-BAD", Some(3)),
        ];
        let err = store
            .commit_file_sync(&batch, &SourceFileState::new("us-counties-2021", "r2"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Storage(_)));

        assert_eq!(store.get_file_state("us-counties-2021").await.unwrap(), Some(r1));
        assert_eq!(store.record_count().await.unwrap(), 1);
        let kept = store.get_record("2021-01-01-USA-1").await.unwrap().unwrap();
        assert_eq!(kept.primary_metric, Some(1));
        assert!(store.get_record("2021-01-02-USA-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_run_history() {
        let (store, _tmp) = setup_test_store().await;
        for (i, status) in ["failed", "synced"].iter().enumerate() {
            store
                .insert_sync_run(&SyncRun {
                    id: format!("run-{}", i),
                    file_id: "f".to_string(),
                    started_at: format!("2021-01-0{}T00:00:00Z", i + 1),
                    completed_at: format!("2021-01-0{}T00:00:01Z", i + 1),
                    status: status.to_string(),
                    revision: Some("r1".to_string()),
                    records_upserted: 3,
                    rows_skipped: 1,
                    error: None,
                })
                .await
                .unwrap();
        }

        let latest = store.get_latest_run("f").await.unwrap().unwrap();
        assert_eq!(latest.status, "synced");
        assert!(store.get_latest_run("g").await.unwrap().is_none());
        assert_eq!(store.sync_run_count().await.unwrap(), 2);
    }
}
