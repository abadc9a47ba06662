//! LMSDrive API - learning-platform document API client
//!
//! Provides async components for:
//! - Turning stored credentials into a bearer token (two-phase web login)
//! - Listing folders and files and resolving signed download URLs
//! - Streaming file content to disk
//!
//! ## Modules
//!
//! - [`auth`] - Login flow and the single-flight [`auth::TokenBroker`]
//! - [`client`] - Typed HTTP client for the listing/resolution endpoints
//! - [`download`] - Unauthenticated content fetch with atomic file replacement
//! - [`provider`] - [`provider::LmsDocumentSource`], the `IDocumentSource` adapter
//! - [`store`] - OS keyring persistence of the token and credentials

pub mod auth;
pub mod client;
pub mod download;
pub mod provider;
pub mod store;

pub use auth::{LoginConfig, LoginFlow, TokenBroker};
pub use client::{ApiRequest, LmsClient};
pub use provider::LmsDocumentSource;
pub use store::KeyringStore;
