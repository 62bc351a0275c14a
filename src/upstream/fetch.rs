//! Raw file download into a scoped temporary file

use super::{join_base, status_error, transport_error, FileFetcher, GitHubSource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Downloaded file content backed by a temporary file.
///
/// The backing file is removed when the value is dropped, so every exit path of
/// the caller (including a failed parse) cleans it up.
#[derive(Debug)]
pub struct FetchedFile {
    file: NamedTempFile,
    len: u64,
}

impl FetchedFile {
    /// Create an empty temporary file to stream a download into
    pub fn create() -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("countysync-")
            .suffix(".csv")
            .tempfile()?;
        Ok(Self { file, len: 0 })
    }

    /// Materialise in-memory content
    #[cfg(test)]
    pub(crate) fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut fetched = Self::create()?;
        fetched.append(data)?;
        Ok(fetched)
    }

    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.file.as_file_mut().write_all(data)?;
        self.len += data.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.file.as_file_mut().flush()?;
        Ok(())
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Number of bytes downloaded
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Open a fresh read handle positioned at the start
    pub fn open(&self) -> Result<File> {
        Ok(self.file.reopen()?)
    }
}

impl GitHubSource {
    /// URL serving the raw content of `file_path` at the configured branch
    pub fn raw_url(&self, file_path: &str) -> String {
        join_base(
            &self.config.raw_base_url,
            &[
                &self.config.owner,
                &self.config.repository,
                "raw",
                &self.config.branch,
                file_path,
            ],
        )
    }
}

#[async_trait]
impl FileFetcher for GitHubSource {
    async fn fetch(&self, file_path: &str) -> Result<FetchedFile> {
        let url = self.raw_url(file_path);
        debug!("Downloading: {}", url);

        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(file_path, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(file_path, status));
        }

        let expected = response.content_length();
        let mut fetched = FetchedFile::create()?;

        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => fetched.append(&chunk)?,
                Ok(None) => break,
                Err(e) if e.is_timeout() => return Err(transport_error(file_path, e)),
                Err(e) => {
                    debug!("Download of {} interrupted: {}", file_path, e);
                    return Err(Error::Incomplete {
                        path: file_path.to_string(),
                        expected: expected.unwrap_or(0),
                        received: fetched.len(),
                    });
                }
            }
        }
        fetched.finish()?;

        if let Some(expected) = expected {
            if expected != fetched.len() {
                return Err(Error::Incomplete {
                    path: file_path.to_string(),
                    expected,
                    received: fetched.len(),
                });
            }
        }

        debug!("Downloaded {} bytes for {}", fetched.len(), file_path);
        Ok(fetched)
    }
}
