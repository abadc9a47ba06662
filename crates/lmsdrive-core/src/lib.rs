//! LMSDrive Core - Domain types, ports and configuration
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `Credentials`, `AuthToken`, `Container`, `FolderNode`,
//!   `FileRecord`, `IndexEntry`
//! - **Error taxonomy** - `AuthError`, `DiscoveryError`, `DownloadError`, `IndexError`
//! - **Port definitions** - Traits for adapters: `IDocumentSource`, `ITokenStore`,
//!   `IContainerSource`, `INotificationService`
//! - **Configuration** - YAML-backed settings for the daemon
//!
//! # Architecture
//!
//! The domain module has no knowledge of HTTP or the filesystem. Ports define
//! trait interfaces that adapter crates (`lmsdrive-api`) implement, and the
//! sync engine (`lmsdrive-sync`) consumes.

pub mod config;
pub mod domain;
pub mod ports;
