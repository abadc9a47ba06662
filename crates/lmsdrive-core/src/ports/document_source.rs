//! Document source port (driven/secondary port)
//!
//! This module defines the interface to the platform's folder/file API.
//! Each operation is a distinct method with its own inputs and outputs;
//! there is no shared "mode" switch.
//!
//! ## Design Notes
//!
//! - Operations return the typed errors
//!   of [`crate::domain::errors`], because the engine's propagation policy
//!   depends on which family a failure belongs to.
//! - [`RemoteFolder`] and [`RemoteFile`] are port-level DTOs. The tree walker
//!   maps them to [`FolderNode`](crate::domain::FolderNode) and
//!   [`FileRecord`](crate::domain::FileRecord) and computes ancestry.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::domain::{AuthError, DiscoveryError, DownloadError};

/// A folder record as returned by the folder-listing endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub allow_upload: bool,
    pub sub_folder_count: u64,
    /// Whether the record carried an `access` attribute (server-side visibility gate)
    pub has_access: bool,
}

/// A file record as returned by the file-listing endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub last_updated: DateTime<Utc>,
}

/// Port trait for the remote document tree
#[async_trait::async_trait]
pub trait IDocumentSource: Send + Sync {
    /// Makes sure a usable token exists, logging in if needed
    ///
    /// Called once before a sync run touches any container so that bad
    /// credentials stop the run before any download is attempted.
    async fn authenticate(&self) -> Result<(), AuthError>;

    /// Lists the immediate child folders of a container or folder, in server order
    async fn list_folders(&self, parent_id: &str) -> Result<Vec<RemoteFolder>, DiscoveryError>;

    /// Lists the files directly inside a folder, in server order
    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, DiscoveryError>;

    /// Resolves a signed, short-lived content URL for a file
    async fn resolve_download_url(&self, file_id: &str) -> Result<String, DownloadError>;

    /// Streams the content behind a resolved URL to `destination`
    ///
    /// The fetch is unauthenticated. Any existing file at `destination` is
    /// replaced. Returns the number of bytes written.
    async fn download(&self, url: &str, destination: &Path) -> Result<u64, DownloadError>;
}
