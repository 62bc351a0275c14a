//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::meta::{StoreStats, SyncStore};
use crate::sync::TrackedFile;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Sync status of one tracked file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStatus {
    pub file_id: String,
    pub path: String,
    pub last_synced_revision: Option<String>,
    pub last_run_status: Option<String>,
    pub last_run_at: Option<String>,
    pub last_error: Option<String>,
}

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub repository: String,
    pub files: Vec<FileStatus>,
    pub db_stats: StoreStats,
}

/// Get system status without touching the upstream
pub async fn cmd_status(config: &Config, store: &SyncStore) -> Result<StatusInfo> {
    info!("Getting status");

    let mut files = Vec::with_capacity(config.files.len());
    for tracked in TrackedFile::from_config(config) {
        let state = store.get_file_state(&tracked.file_id).await?;
        let run = store.get_latest_run(&tracked.file_id).await?;
        files.push(FileStatus {
            file_id: tracked.file_id,
            path: tracked.path,
            last_synced_revision: state.map(|s| s.last_synced_revision),
            last_run_status: run.as_ref().map(|r| r.status.clone()),
            last_run_at: run.as_ref().map(|r| r.completed_at.clone()),
            last_error: run.and_then(|r| r.error),
        });
    }

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        repository: format!("{}/{}", config.upstream.owner, config.upstream.repository),
        files,
        db_stats: store.get_stats().await?,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 countysync Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Repository: {}", status.repository);

    println!("\nTracked files:");
    for file in &status.files {
        println!("• {} ({})", file.file_id, file.path);
        println!(
            "  Synced revision: {}",
            file.last_synced_revision.as_deref().unwrap_or("never")
        );
        if let (Some(run_status), Some(at)) = (&file.last_run_status, &file.last_run_at) {
            println!("  Last run: {} at {}", run_status, at);
        }
        if let Some(error) = &file.last_error {
            println!("  Last error: {}", error);
        }
    }

    println!("\nDatabase Stats:");
    println!("  Files synced: {}", status.db_stats.file_count);
    println!("  Records: {}", status.db_stats.record_count);
    println!("  Regions: {}", status.db_stats.region_count);
    println!("  Recorded sync runs: {}", status.db_stats.run_count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceFileState;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_status_reports_never_synced_files() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        let store = SyncStore::connect(&config.paths.db_file).await.unwrap();
        store
            .set_file_state(&SourceFileState::new("us-counties-2020", "r1"))
            .await
            .unwrap();

        let status = cmd_status(&config, &store).await.unwrap();

        assert_eq!(status.repository, "nytimes/covid-19-data");
        assert_eq!(status.files.len(), 2);
        assert_eq!(status.files[0].last_synced_revision.as_deref(), Some("r1"));
        assert!(status.files[1].last_synced_revision.is_none());
        assert!(status.files[1].last_run_status.is_none());
        assert_eq!(status.db_stats.file_count, 1);
        assert_eq!(status.db_stats.run_count, 0);
    }
}
