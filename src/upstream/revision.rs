//! Revision lookup through the commit-history API

use super::{join_base, status_error, transport_error, GitHubSource, RevisionClient};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
struct CommitAuthorInfo {
    date: String,
}

#[derive(Debug, Deserialize)]
struct CommitInfo {
    committer: CommitAuthorInfo,
}

#[derive(Debug, Deserialize)]
struct Commit {
    commit: CommitInfo,
}

impl GitHubSource {
    /// URL listing the newest commit touching `file_path`
    pub fn commits_url(&self, file_path: &str) -> Result<Url> {
        let base = join_base(
            &self.config.api_base_url,
            &[
                "repos",
                &self.config.owner,
                &self.config.repository,
                "commits",
            ],
        );
        let url = Url::parse_with_params(
            &base,
            &[("path", file_path), ("page", "1"), ("per_page", "1")],
        )?;
        Ok(url)
    }
}

#[async_trait]
impl RevisionClient for GitHubSource {
    async fn latest_revision(&self, file_path: &str) -> Result<String> {
        let url = self.commits_url(file_path)?;
        debug!("Fetching revision: {}", url);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| transport_error(file_path, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(file_path, status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(file_path, e))?;
        let commits: Vec<Commit> = serde_json::from_str(&body).map_err(|e| {
            Error::UpstreamUnavailable(format!(
                "{}: unexpected commit history response: {}",
                file_path, e
            ))
        })?;

        commits
            .into_iter()
            .next()
            .map(|c| c.commit.committer.date)
            .ok_or_else(|| Error::NotFound(file_path.to_string()))
    }
}
