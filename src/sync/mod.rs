//! Incremental sync of tracked upstream files into the replica
//!
//! Each pass runs one pipeline per tracked file concurrently:
//! revision check, then (only when the revision moved) fetch, parse and a
//! single-transaction upsert that also advances the stored revision marker.
//! A failing file ends in `Failed` without affecting its siblings, and the
//! pass completes once every file has reached a terminal state.
//!
//! Concurrent `ensure_synced` callers share the in-flight pass.

#[cfg(test)]
pub(crate) mod testing;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::{SyncRun, SyncStore};
use crate::models::SourceFileState;
use crate::parse::RecordParser;
use crate::upstream::{create_upstream, FileFetcher, RevisionClient};
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::BufReader;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-file state within a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSyncState {
    Unchecked,
    Checking,
    UpToDate,
    Fetching,
    Parsing,
    Upserting,
    Synced,
    Failed,
}

impl FileSyncState {
    /// Whether the pipeline for this file has finished for the pass
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FileSyncState::UpToDate | FileSyncState::Synced | FileSyncState::Failed
        )
    }
}

impl std::fmt::Display for FileSyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSyncState::Unchecked => write!(f, "unchecked"),
            FileSyncState::Checking => write!(f, "checking"),
            FileSyncState::UpToDate => write!(f, "up_to_date"),
            FileSyncState::Fetching => write!(f, "fetching"),
            FileSyncState::Parsing => write!(f, "parsing"),
            FileSyncState::Upserting => write!(f, "upserting"),
            FileSyncState::Synced => write!(f, "synced"),
            FileSyncState::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for FileSyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "unchecked" => Ok(FileSyncState::Unchecked),
            "checking" => Ok(FileSyncState::Checking),
            "up_to_date" => Ok(FileSyncState::UpToDate),
            "fetching" => Ok(FileSyncState::Fetching),
            "parsing" => Ok(FileSyncState::Parsing),
            "upserting" => Ok(FileSyncState::Upserting),
            "synced" => Ok(FileSyncState::Synced),
            "failed" => Ok(FileSyncState::Failed),
            _ => Err(Error::Other(format!("Unknown sync state: {}", s))),
        }
    }
}

/// Whether queried data reflects a complete, partial or missing sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// Every tracked file is synced or up to date
    Fresh,
    /// Some file failed this pass; data may be stale or partial
    Stale,
    /// No tracked file has ever synced successfully
    Unavailable,
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Availability::Fresh => write!(f, "fresh"),
            Availability::Stale => write!(f, "stale"),
            Availability::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// A tracked upstream file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Logical dataset name, the key of its revision marker
    pub file_id: String,
    /// Repository-relative path
    pub path: String,
}

impl TrackedFile {
    pub fn new(file_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            path: path.into(),
        }
    }

    /// Tracked files listed in the configuration
    pub fn from_config(config: &Config) -> Vec<Self> {
        config
            .files
            .iter()
            .map(|id| Self::new(id.clone(), config.upstream.file_path(id)))
            .collect()
    }
}

/// Outcome of one file's pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub file_id: String,
    pub state: FileSyncState,
    /// Revision stored before this pass, if the file had ever synced
    pub previous_revision: Option<String>,
    /// Upstream revision observed this pass
    pub revision: Option<String>,
    pub records_upserted: usize,
    pub rows_skipped: usize,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl FileReport {
    fn new(file_id: &str) -> Self {
        let now = Utc::now();
        Self {
            file_id: file_id.to_string(),
            state: FileSyncState::Unchecked,
            previous_revision: None,
            revision: None,
            records_upserted: 0,
            rows_skipped: 0,
            error: None,
            started_at: now,
            completed_at: now,
        }
    }

    /// Whether the file has data in the store after this pass
    pub fn has_data(&self) -> bool {
        self.state != FileSyncState::Failed || self.previous_revision.is_some()
    }

    fn to_run(&self) -> SyncRun {
        SyncRun {
            id: Uuid::new_v4().to_string(),
            file_id: self.file_id.clone(),
            started_at: self.started_at.to_rfc3339(),
            completed_at: self.completed_at.to_rfc3339(),
            status: self.state.to_string(),
            revision: self.revision.clone(),
            records_upserted: self.records_upserted as i64,
            rows_skipped: self.rows_skipped as i64,
            error: self.error.clone(),
        }
    }
}

/// Outcome of a full sync pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files: Vec<FileReport>,
}

impl SyncReport {
    /// Look up a file's outcome
    pub fn file(&self, file_id: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.file_id == file_id)
    }

    pub fn count(&self, state: FileSyncState) -> usize {
        self.files.iter().filter(|f| f.state == state).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|f| f.state == FileSyncState::Failed)
    }

    pub fn records_upserted(&self) -> usize {
        self.files.iter().map(|f| f.records_upserted).sum()
    }

    pub fn rows_skipped(&self) -> usize {
        self.files.iter().map(|f| f.rows_skipped).sum()
    }

    /// Tri-state view of the data this pass left behind
    pub fn availability(&self) -> Availability {
        if self.failed().next().is_none() {
            Availability::Fresh
        } else if self.files.iter().any(FileReport::has_data) {
            Availability::Stale
        } else {
            Availability::Unavailable
        }
    }
}

type PassFuture = Shared<BoxFuture<'static, SyncReport>>;

struct Inner {
    store: SyncStore,
    revisions: Arc<dyn RevisionClient>,
    fetcher: Arc<dyn FileFetcher>,
    parser: RecordParser,
    files: Vec<TrackedFile>,
    states: Mutex<HashMap<String, FileSyncState>>,
    last_report: Mutex<Option<SyncReport>>,
    progress: Option<ProgressBar>,
}

/// Orchestrates sync passes over the tracked files
pub struct SyncCoordinator {
    inner: Arc<Inner>,
    in_flight: Mutex<Option<PassFuture>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SyncCoordinator {
    /// Create a coordinator over explicit upstream clients
    pub fn new(
        store: SyncStore,
        revisions: Arc<dyn RevisionClient>,
        fetcher: Arc<dyn FileFetcher>,
        files: Vec<TrackedFile>,
    ) -> Self {
        let states = files
            .iter()
            .map(|f| (f.file_id.clone(), FileSyncState::Unchecked))
            .collect();

        Self {
            inner: Arc::new(Inner {
                store,
                revisions,
                fetcher,
                parser: RecordParser::new(),
                files,
                states: Mutex::new(states),
                last_report: Mutex::new(None),
                progress: None,
            }),
            in_flight: Mutex::new(None),
        }
    }

    /// Create a coordinator against the configured GitHub repository
    pub fn from_config(config: &Config, store: SyncStore) -> Result<Self> {
        let (revisions, fetcher) = create_upstream(&config.upstream)?;
        Ok(Self::new(
            store,
            revisions,
            fetcher,
            TrackedFile::from_config(config),
        ))
    }

    /// Tick a progress bar as each file reaches a terminal state
    pub fn with_progress_bar(mut self, progress: ProgressBar) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.progress = Some(progress);
        }
        self
    }

    pub fn store(&self) -> &SyncStore {
        &self.inner.store
    }

    pub fn tracked_files(&self) -> &[TrackedFile] {
        &self.inner.files
    }

    /// Current state of every tracked file
    pub fn file_states(&self) -> Vec<(String, FileSyncState)> {
        let states = lock(&self.inner.states);
        self.inner
            .files
            .iter()
            .map(|f| {
                let state = states
                    .get(&f.file_id)
                    .copied()
                    .unwrap_or(FileSyncState::Unchecked);
                (f.file_id.clone(), state)
            })
            .collect()
    }

    /// Report of the most recently completed pass
    pub fn last_report(&self) -> Option<SyncReport> {
        lock(&self.inner.last_report).clone()
    }

    /// Whether a pass is currently running
    pub fn is_syncing(&self) -> bool {
        lock(&self.in_flight)
            .as_ref()
            .is_some_and(|pass| pass.peek().is_none())
    }

    /// Wait until every tracked file reaches a terminal state for a pass.
    ///
    /// Starts a pass unless one is already running, in which case the caller
    /// attaches to it.
    pub async fn ensure_synced(&self) -> SyncReport {
        let pass = {
            let mut slot = lock(&self.in_flight);
            match slot.as_ref() {
                Some(pass) if pass.peek().is_none() => {
                    debug!("Attaching to in-flight sync pass");
                    pass.clone()
                }
                _ => {
                    let inner = Arc::clone(&self.inner);
                    let pass = async move { inner.run_pass().await }.boxed().shared();
                    *slot = Some(pass.clone());
                    pass
                }
            }
        };

        let report = pass.clone().await;

        let mut slot = lock(&self.in_flight);
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&pass)) {
            *slot = None;
        }

        report
    }
}

impl Inner {
    fn transition(&self, file_id: &str, state: FileSyncState) {
        debug!(file_id, %state, "File state transition");
        lock(&self.states).insert(file_id.to_string(), state);
    }

    async fn run_pass(self: Arc<Self>) -> SyncReport {
        let started_at = Utc::now();
        info!(files = self.files.len(), "Starting sync pass");

        for file in &self.files {
            self.transition(&file.file_id, FileSyncState::Unchecked);
        }

        let (ids, tasks): (Vec<_>, Vec<_>) = self
            .files
            .iter()
            .cloned()
            .map(|file| {
                let inner = Arc::clone(&self);
                let id = file.file_id.clone();
                (id, tokio::spawn(async move { inner.sync_file(&file).await }))
            })
            .unzip();

        let files: Vec<FileReport> = ids
            .into_iter()
            .zip(join_all(tasks).await)
            .map(|(file_id, joined)| match joined {
                Ok(report) => report,
                Err(e) => {
                    warn!(%file_id, error = %e, "File sync task aborted");
                    self.transition(&file_id, FileSyncState::Failed);
                    let mut report = FileReport::new(&file_id);
                    report.state = FileSyncState::Failed;
                    report.error = Some(format!("sync task aborted: {}", e));
                    report
                }
            })
            .collect();

        let report = SyncReport {
            started_at,
            finished_at: Utc::now(),
            files,
        };

        // An up-to-date file leaves storage untouched
        for file in report
            .files
            .iter()
            .filter(|f| f.state != FileSyncState::UpToDate)
        {
            if let Err(e) = self.store.insert_sync_run(&file.to_run()).await {
                warn!(file_id = %file.file_id, error = %e, "Failed to record sync run");
            }
        }

        info!(
            synced = report.count(FileSyncState::Synced),
            up_to_date = report.count(FileSyncState::UpToDate),
            failed = report.count(FileSyncState::Failed),
            records = report.records_upserted(),
            "Sync pass complete"
        );

        *lock(&self.last_report) = Some(report.clone());
        report
    }

    async fn sync_file(&self, file: &TrackedFile) -> FileReport {
        let mut report = FileReport::new(&file.file_id);

        match self.run_pipeline(file, &mut report).await {
            Ok(state) => report.state = state,
            Err(e) => {
                warn!(
                    file_id = %file.file_id,
                    upstream = e.is_upstream(),
                    error = %e,
                    "File sync failed"
                );
                report.state = FileSyncState::Failed;
                report.error = Some(e.to_string());
            }
        }

        report.completed_at = Utc::now();
        self.transition(&file.file_id, report.state);
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
        report
    }

    async fn run_pipeline(
        &self,
        file: &TrackedFile,
        report: &mut FileReport,
    ) -> Result<FileSyncState> {
        let file_id = file.file_id.as_str();

        self.transition(file_id, FileSyncState::Checking);
        let stored = self.store.get_file_state(file_id).await?;
        report.previous_revision = stored.map(|s| s.last_synced_revision);

        let revision = self.revisions.latest_revision(&file.path).await?;
        report.revision = Some(revision.clone());

        if report.previous_revision.as_deref() == Some(revision.as_str()) {
            debug!(file_id, %revision, "File is up to date");
            return Ok(FileSyncState::UpToDate);
        }

        self.transition(file_id, FileSyncState::Fetching);
        let fetched = self.fetcher.fetch(&file.path).await?;

        self.transition(file_id, FileSyncState::Parsing);
        let parser = self.parser;
        let outcome = tokio::task::spawn_blocking(move || {
            let reader = BufReader::new(fetched.open()?);
            parser.parse(reader)
        })
        .await
        .map_err(|e| Error::Other(format!("parse task failed: {}", e)))??;

        report.rows_skipped = outcome.skipped;
        if outcome.skipped > 0 {
            info!(file_id, skipped = outcome.skipped, "Skipped malformed rows");
        }

        self.transition(file_id, FileSyncState::Upserting);
        let state = SourceFileState::new(file_id, revision);
        report.records_upserted = self
            .store
            .commit_file_sync(&outcome.records, &state)
            .await?;

        Ok(FileSyncState::Synced)
    }
}
