//! In-memory upstream used by coordinator and query tests

use crate::error::{Error, Result};
use crate::upstream::{FetchedFile, FileFetcher, RevisionClient};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Three valid rows for X/Y plus one row missing its geoid
pub const CSV_REGION_A: &str = "\
date,geoid,county,state,cases,cases_avg,cases_avg_per_100k,deaths,deaths_avg,deaths_avg_per_100k
2021-01-01,USA-1,X,Y,10,9.5,1.2,0,0.1,0.01
2021-01-02,USA-1,X,Y,12,10.5,1.3,1,0.2,0.02
2021-01-03,USA-1,X,Y,oops,11.5,1.4,0,0.2,0.02
2021-01-04,,X,Y,14,12.5,1.5,0,0.2,0.02
";

/// Two valid rows for Z/Y
pub const CSV_REGION_B: &str = "\
date,geoid,county,state,cases,cases_avg,cases_avg_per_100k,deaths,deaths_avg,deaths_avg_per_100k
2021-01-01,USA-2,Z,Y,3,2.5,0.4,0,0,0
2021-01-02,USA-2,Z,Y,4,3.0,0.5,0,0,0
";

#[derive(Default)]
struct Published {
    revisions: HashMap<String, String>,
    contents: HashMap<String, String>,
    failing_revisions: HashSet<String>,
    failing_fetches: HashSet<String>,
}

/// Fake upstream counting every call
#[derive(Default)]
pub struct FakeUpstream {
    published: Mutex<Published>,
    delay: Option<Duration>,
    pub revision_checks: AtomicUsize,
    pub fetches: AtomicUsize,
}

impl FakeUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call sleeps first, keeping a pass in flight
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn publish(&self, path: &str, revision: &str, content: &str) {
        let mut published = self.published.lock().unwrap();
        published
            .revisions
            .insert(path.to_string(), revision.to_string());
        published
            .contents
            .insert(path.to_string(), content.to_string());
    }

    pub fn fail_revision(&self, path: &str) {
        self.published
            .lock()
            .unwrap()
            .failing_revisions
            .insert(path.to_string());
    }

    pub fn fail_fetch(&self, path: &str) {
        self.published
            .lock()
            .unwrap()
            .failing_fetches
            .insert(path.to_string());
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RevisionClient for FakeUpstream {
    async fn latest_revision(&self, file_path: &str) -> Result<String> {
        self.revision_checks.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let published = self.published.lock().unwrap();
        if published.failing_revisions.contains(file_path) {
            return Err(Error::UpstreamUnavailable(format!("{}: host down", file_path)));
        }
        published
            .revisions
            .get(file_path)
            .cloned()
            .ok_or_else(|| Error::NotFound(file_path.to_string()))
    }
}

#[async_trait]
impl FileFetcher for FakeUpstream {
    async fn fetch(&self, file_path: &str) -> Result<FetchedFile> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let content = {
            let published = self.published.lock().unwrap();
            if published.failing_fetches.contains(file_path) {
                return Err(Error::Incomplete {
                    path: file_path.to_string(),
                    expected: 100,
                    received: 10,
                });
            }
            published
                .contents
                .get(file_path)
                .cloned()
                .ok_or_else(|| Error::NotFound(file_path.to_string()))?
        };
        FetchedFile::from_bytes(content.as_bytes())
    }
}
