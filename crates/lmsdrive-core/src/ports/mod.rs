//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are interfaces the sync engine depends on, whose implementations
//! live in adapter crates or in the daemon.
//!
//! ## Ports Overview
//!
//! - [`IDocumentSource`] - Folder/file listing, download URL resolution and content transfer
//! - [`ITokenStore`] - Persistence of the bearer token and the user's credentials
//! - [`IContainerSource`] - The list of root containers to mirror
//! - [`INotificationService`] - Completion/failure events for the user

pub mod container_source;
pub mod document_source;
pub mod notification;
pub mod token_store;

pub use container_source::IContainerSource;
pub use document_source::{IDocumentSource, RemoteFile, RemoteFolder};
pub use notification::{INotificationService, Notification, NotificationPriority};
pub use token_store::{ITokenStore, MemoryTokenStore};
