//! Sync command - run one pass over every tracked file

use crate::sync::{FileSyncState, SyncCoordinator, SyncReport};
use tracing::info;

/// Execute one sync pass (or join the one already running)
pub async fn cmd_sync(coordinator: &SyncCoordinator) -> SyncReport {
    info!(
        files = coordinator.tracked_files().len(),
        "Starting sync operation"
    );
    coordinator.ensure_synced().await
}

fn state_marker(state: FileSyncState) -> &'static str {
    match state {
        FileSyncState::Synced => "✓",
        FileSyncState::UpToDate => "=",
        FileSyncState::Failed => "✗",
        _ => "…",
    }
}

/// Print sync report to console
pub fn print_sync_report(report: &SyncReport) {
    println!("\n♻️  Sync Complete ({})\n", report.availability());

    for file in &report.files {
        println!(
            "{} {} [{}]",
            state_marker(file.state),
            file.file_id,
            file.state
        );
        if let Some(revision) = &file.revision {
            println!("  Revision: {}", revision);
        }
        if file.state == FileSyncState::Synced {
            println!("  Records upserted: {}", file.records_upserted);
            if file.rows_skipped > 0 {
                println!("  Rows skipped: {}", file.rows_skipped);
            }
        }
        if let Some(error) = &file.error {
            println!("  Error: {}", error);
        }
    }

    println!(
        "\nSynced: {}, Up to date: {}, Failed: {}",
        report.count(FileSyncState::Synced),
        report.count(FileSyncState::UpToDate),
        report.count(FileSyncState::Failed)
    );
}
