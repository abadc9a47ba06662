//! Domain error types
//!
//! Every failure a sync run can observe falls into one of four families:
//! authentication, discovery, download and index. Payloads are plain strings
//! so the core stays free of adapter types and errors remain clonable.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while turning credentials into a bearer token
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The identity endpoint rejected the username/password
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// No credentials are stored for re-authentication
    #[error("No credentials available; run `lmsdrived login` first")]
    MissingCredentials,

    /// The identity or token endpoint could not be reached
    #[error("Network error during authentication: {0}")]
    Network(String),

    /// A login response did not have the expected shape
    #[error("Unexpected authentication response: {0}")]
    UnexpectedResponseShape(String),

    /// Persisting or loading the token failed
    #[error("Token storage error: {0}")]
    Storage(String),
}

/// Failures while walking a container's document tree
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// A token could not be obtained for the listing request
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The listing endpoint could not be reached or returned an error status
    #[error("Network error during discovery: {0}")]
    Network(String),

    /// A listing payload was missing required fields or had bad values
    #[error("Unexpected payload shape: {0}")]
    UnexpectedPayloadShape(String),

    /// The folder tree is deeper than the configured limit
    #[error("Folder tree exceeds maximum depth of {max_depth}")]
    DepthExceeded { max_depth: usize },
}

/// Failures while transferring a single file
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DownloadError {
    /// A token could not be obtained to resolve the download URL
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Network error during download: {0}")]
    Network(String),

    /// The server answered with something other than 200
    #[error("Download returned HTTP {status}")]
    NonSuccessStatus { status: u16 },

    #[error("Failed to write {}: {message}", .path.display())]
    FilesystemWrite { path: PathBuf, message: String },

    /// The run was cancelled before this file was transferred
    #[error("Download cancelled")]
    Cancelled,
}

/// Failures while loading or persisting the change index
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// No index file exists yet
    #[error("Index not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A row could not be parsed; the whole load is rejected
    #[error("Corrupt index at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("Index I/O failure: {0}")]
    IoFailure(String),
}
