//! Domain entities
//!
//! This module contains the core domain types for LMSDrive:
//! - Credentials and bearer tokens with the local TTL policy
//! - Document tree types (containers, folders, files)
//! - Change index entries
//! - Domain-specific error types

pub mod auth;
pub mod document;
pub mod errors;
pub mod index;

// Re-export commonly used types
pub use auth::{AuthToken, Credentials, TOKEN_REFRESH_MARGIN_SECS, TOKEN_TTL_SECS};
pub use document::{Container, FileRecord, FolderNode};
pub use errors::{AuthError, DiscoveryError, DownloadError, IndexError};
pub use index::{IndexEntry, IndexTable};
