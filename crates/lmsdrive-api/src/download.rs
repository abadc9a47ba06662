//! Content download with atomic file replacement
//!
//! Signed download URLs are pre-authorized, so the fetch carries no bearer
//! token. The body is streamed into `<destination>.part` in the destination
//! directory and renamed over the destination once complete, so a failed or
//! interrupted download never leaves a truncated file at the final path.
//!
//! Files can be large, so there is no overall deadline. Instead the response
//! headers and every body chunk must each arrive within a stall timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use lmsdrive_core::domain::DownloadError;
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use crate::client::CONNECT_TIMEOUT;

/// Longest wait for the response headers or the next body chunk
pub const STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Builds the client used for unauthenticated content fetches
pub fn content_client() -> Result<Client, reqwest::Error> {
    Client::builder().connect_timeout(CONNECT_TIMEOUT).build()
}

/// Downloads `url` to `destination`, returning the number of bytes written
///
/// Missing parent directories are created. Only `200 OK` is accepted; any
/// other status is [`DownloadError::NonSuccessStatus`] and leaves the
/// destination untouched. A server that goes quiet for longer than `stall`
/// fails the download with [`DownloadError::Network`].
#[instrument(skip(client, url), fields(destination = %destination.display()))]
pub async fn download_to_path(
    client: &Client,
    url: &str,
    destination: &Path,
    stall: Duration,
) -> Result<u64, DownloadError> {
    let response = tokio::time::timeout(stall, client.get(url).send())
        .await
        .map_err(|_| stalled(stall))?
        .map_err(|e| DownloadError::Network(e.to_string()))?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(DownloadError::NonSuccessStatus {
            status: status.as_u16(),
        });
    }

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| write_error(parent, e))?;
    }

    let part = PartFile::new(part_path(destination));
    let written = stream_to_file(response, part.path(), stall).await?;
    part.persist(destination).await?;

    debug!(bytes = written, "Download complete");
    Ok(written)
}

async fn stream_to_file(
    response: reqwest::Response,
    path: &Path,
    stall: Duration,
) -> Result<u64, DownloadError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| write_error(path, e))?;

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = tokio::time::timeout(stall, stream.next())
        .await
        .map_err(|_| stalled(stall))?
    {
        let chunk = chunk.map_err(|e| DownloadError::Network(e.to_string()))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| write_error(path, e))?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| write_error(path, e))?;
    Ok(written)
}

/// A `.part` file that is removed on drop unless it was renamed into place
///
/// Dropping covers both error returns and a caller abandoning the download
/// future mid-stream.
struct PartFile {
    path: PathBuf,
    persisted: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(mut self, destination: &Path) -> Result<(), DownloadError> {
        tokio::fs::rename(&self.path, destination)
            .await
            .map_err(|e| write_error(destination, e))?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Failed to remove partial download")
            }
        }
    }
}

fn stalled(stall: Duration) -> DownloadError {
    DownloadError::Network(format!("no data received for {}s", stall.as_secs_f32()))
}

fn part_path(destination: &Path) -> PathBuf {
    let mut p = destination.as_os_str().to_owned();
    p.push(".part");
    PathBuf::from(p)
}

fn write_error(path: &Path, e: std::io::Error) -> DownloadError {
    DownloadError::FilesystemWrite {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}
