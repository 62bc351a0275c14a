//! Upstream access
//!
//! This module provides:
//! - A trait for looking up the latest revision of a file
//! - A trait for downloading a file to a scoped temporary location
//! - A GitHub-backed implementation of both, with request timeouts

mod fetch;
mod revision;

pub use fetch::*;
pub use revision::*;

use crate::config::UpstreamConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// Looks up the newest revision marker of an upstream file
#[async_trait]
pub trait RevisionClient: Send + Sync {
    /// Return the opaque revision marker of the newest change to `file_path`
    async fn latest_revision(&self, file_path: &str) -> Result<String>;
}

/// Downloads the raw content of an upstream file
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Download `file_path` at its current head revision
    async fn fetch(&self, file_path: &str) -> Result<FetchedFile>;
}

/// GitHub repository acting as the upstream source
#[derive(Clone)]
pub struct GitHubSource {
    client: Client,
    config: UpstreamConfig,
}

impl GitHubSource {
    /// Create a new source with a bounded request timeout
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }
}

/// Build the GitHub source and hand it out behind both upstream traits
pub fn create_upstream(
    config: &UpstreamConfig,
) -> Result<(Arc<dyn RevisionClient>, Arc<dyn FileFetcher>)> {
    let source = Arc::new(GitHubSource::new(config.clone())?);
    Ok((source.clone(), source))
}

/// Map a transport failure onto the upstream taxonomy
pub(crate) fn transport_error(context: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::UpstreamUnavailable(format!("{}: request timed out", context))
    } else {
        Error::UpstreamUnavailable(format!("{}: {}", context, err))
    }
}

/// Map a non-success HTTP status onto the upstream taxonomy
pub(crate) fn status_error(context: &str, status: StatusCode) -> Error {
    if status == StatusCode::NOT_FOUND {
        Error::NotFound(context.to_string())
    } else {
        Error::UpstreamUnavailable(format!("{}: HTTP {}", context, status))
    }
}

fn join_base(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if !segment.is_empty() {
            url.push('/');
            url.push_str(segment);
        }
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_base() {
        assert_eq!(
            join_base("https://github.com/", &["nytimes", "covid-19-data", "raw", "master"]),
            "https://github.com/nytimes/covid-19-data/raw/master"
        );
        assert_eq!(join_base("http://x", &["", "/a/b.csv"]), "http://x/a/b.csv");
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error("f", StatusCode::NOT_FOUND),
            Error::NotFound(_)
        ));
        assert!(matches!(
            status_error("f", StatusCode::BAD_GATEWAY),
            Error::UpstreamUnavailable(_)
        ));
    }
}
