//! SQLite schema definition

/// SQL schema for the replica database
pub const SCHEMA_SQL: &str = r#"
-- Source files: last revision each tracked file was synced at
CREATE TABLE IF NOT EXISTS source_files (
    file_id TEXT PRIMARY KEY,
    last_synced_revision TEXT NOT NULL
);

-- Records: merged daily observations, keyed by date + entity
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    date TEXT NOT NULL,
    geo_entity_id TEXT NOT NULL,
    region_name TEXT NOT NULL,
    parent_region_name TEXT NOT NULL,
    primary_metric INTEGER,
    primary_metric_avg REAL,
    primary_metric_avg_per_100k REAL,
    secondary_metric INTEGER,
    secondary_metric_avg REAL,
    secondary_metric_avg_per_100k REAL
);

-- Sync runs: per-file outcome history
CREATE TABLE IF NOT EXISTS sync_runs (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    status TEXT NOT NULL,
    revision TEXT,
    records_upserted INTEGER NOT NULL DEFAULT 0,
    rows_skipped INTEGER NOT NULL DEFAULT 0,
    error TEXT
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_records_region ON records(parent_region_name, region_name, date);
CREATE INDEX IF NOT EXISTS idx_runs_file ON sync_runs(file_id, completed_at);
"#;
