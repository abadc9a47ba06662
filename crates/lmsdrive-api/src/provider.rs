//! LmsDocumentSource - IDocumentSource implementation for the document API
//!
//! Combines the [`LmsClient`] with the [`TokenBroker`] so that callers of the
//! port never handle bearer tokens themselves.
//!
//! ## Design Notes
//!
//! - Every listing or resolution call asks the broker for a token first; the
//!   broker decides whether that means a cache hit or a fresh login.
//! - When the server rejects a token the broker cache is invalidated and the
//!   call is retried once with a newly obtained token.
//! - Content downloads go through a separate `reqwest::Client` and carry no
//!   bearer token. They have no overall deadline, only a stall timeout.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use lmsdrive_core::domain::{AuthError, DiscoveryError, DownloadError};
use lmsdrive_core::ports::{IDocumentSource, RemoteFile, RemoteFolder};

use crate::auth::TokenBroker;
use crate::client::LmsClient;
use crate::download;

/// Document source backed by the platform's REST API
pub struct LmsDocumentSource {
    client: LmsClient,
    broker: Arc<TokenBroker>,
    http: Client,
}

impl LmsDocumentSource {
    pub fn new(client: LmsClient, broker: Arc<TokenBroker>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client,
            broker,
            http: download::content_client()?,
        })
    }

    async fn token(&self) -> Result<String, AuthError> {
        self.broker.get_valid_token().await
    }

    async fn discover<T, F, Fut>(&self, call: F) -> Result<T, DiscoveryError>
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = Result<T, DiscoveryError>>,
    {
        let token = self.token().await?;
        match call(token).await {
            Err(DiscoveryError::Auth(e)) => {
                warn!(error = %e, "Token rejected during discovery, logging in again");
                self.broker.invalidate().await;
                let token = self.token().await?;
                call(token).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl IDocumentSource for LmsDocumentSource {
    async fn authenticate(&self) -> Result<(), AuthError> {
        self.token().await.map(|_| ())
    }

    async fn list_folders(&self, parent_id: &str) -> Result<Vec<RemoteFolder>, DiscoveryError> {
        self.discover(|token| async move { self.client.list_folders(&token, parent_id).await })
            .await
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, DiscoveryError> {
        self.discover(|token| async move { self.client.list_files(&token, folder_id).await })
            .await
    }

    async fn resolve_download_url(&self, file_id: &str) -> Result<String, DownloadError> {
        let token = self.token().await?;
        match self.client.resolve_download_url(&token, file_id).await {
            Err(DownloadError::Auth(e)) => {
                warn!(error = %e, file_id, "Token rejected during URL resolution, logging in again");
                self.broker.invalidate().await;
                let token = self.token().await?;
                self.client.resolve_download_url(&token, file_id).await
            }
            other => other,
        }
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64, DownloadError> {
        debug!(destination = %destination.display(), "Fetching file content");
        download::download_to_path(&self.http, url, destination, download::STALL_TIMEOUT).await
    }
}
