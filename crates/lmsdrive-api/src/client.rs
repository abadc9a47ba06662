//! Document API client
//!
//! Provides a typed HTTP client for the platform's folder-listing,
//! file-listing and download-resolution endpoints. Every response arrives in
//! the same envelope:
//!
//! ```json
//! { "status": "...", "code": 200, "total": 3, "offset": 0, "data": [ ... ] }
//! ```
//!
//! Records are decoded into explicit schemas whose fields are all optional;
//! a missing required field becomes [`DiscoveryError::UnexpectedPayloadShape`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lmsdrive_api::client::LmsClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = LmsClient::new("https://lms.example.edu/api")?;
//! let folders = client.list_folders("bearer-token", "module-id").await?;
//! println!("{} folders", folders.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use lmsdrive_core::domain::{AuthError, DiscoveryError, DownloadError};
use lmsdrive_core::ports::{RemoteFile, RemoteFolder};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

/// Gateway subscription header sent when an API key is configured
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Time allowed to connect to any platform host
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a single API or login round trip
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ApiRequest
// ============================================================================

/// The closed set of operations this client performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRequest<'a> {
    /// Immediate child folders of a container or folder
    ListFolders { parent_id: &'a str, offset: u64 },
    /// Files directly inside a folder
    ListFiles { folder_id: &'a str, offset: u64 },
    /// Signed download URL for a file
    ResolveDownload { file_id: &'a str },
}

impl ApiRequest<'_> {
    /// Path relative to the API base URL
    pub fn path(&self) -> String {
        match self {
            ApiRequest::ListFolders { .. } => "/files/".to_string(),
            ApiRequest::ListFiles { folder_id, .. } => format!("/files/{}/file", folder_id),
            ApiRequest::ResolveDownload { file_id } => format!("/files/file/{}/downloadurl", file_id),
        }
    }

    /// Query string parameters
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        match self {
            ApiRequest::ListFolders { parent_id, offset } => {
                query.push((
                    "populate",
                    "totalFileCount,subFolderCount,TotalSize".to_string(),
                ));
                query.push(("ParentID", parent_id.to_string()));
                if *offset > 0 {
                    query.push(("offset", offset.to_string()));
                }
            }
            ApiRequest::ListFiles { offset, .. } => {
                query.push(("populate", "Creator,lastUpdatedUser,comment".to_string()));
                if *offset > 0 {
                    query.push(("offset", offset.to_string()));
                }
            }
            ApiRequest::ResolveDownload { .. } => {}
        }
        query
    }
}

// ============================================================================
// Response schemas
// ============================================================================

/// Envelope shared by every endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[allow(dead_code)]
    status: Option<String>,
    #[allow(dead_code)]
    code: Option<i64>,
    total: Option<u64>,
    #[allow(dead_code)]
    offset: Option<u64>,
    data: Option<T>,
}

/// Folder record from the folder-listing endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FolderRecord {
    id: Option<String>,
    name: Option<String>,
    is_active: Option<bool>,
    allow_upload: Option<bool>,
    sub_folder_count: Option<u64>,
    /// Present (even as `null`) only for folders the user may see
    #[serde(default, deserialize_with = "present")]
    access: Option<serde_json::Value>,
}

/// File record from the file-listing endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileRecordPayload {
    id: Option<String>,
    name: Option<String>,
    last_updated_date: Option<String>,
}

/// Marks a field as present even when its value is `null`
fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

fn missing(record: &str, field: &str) -> DiscoveryError {
    DiscoveryError::UnexpectedPayloadShape(format!("{} record missing '{}'", record, field))
}

impl FolderRecord {
    fn into_remote(self) -> Result<RemoteFolder, DiscoveryError> {
        Ok(RemoteFolder {
            id: self.id.ok_or_else(|| missing("folder", "id"))?,
            name: self.name.ok_or_else(|| missing("folder", "name"))?,
            is_active: self.is_active.ok_or_else(|| missing("folder", "isActive"))?,
            allow_upload: self
                .allow_upload
                .ok_or_else(|| missing("folder", "allowUpload"))?,
            sub_folder_count: self.sub_folder_count.unwrap_or(0),
            has_access: self.access.is_some(),
        })
    }
}

impl FileRecordPayload {
    fn into_remote(self) -> Result<RemoteFile, DiscoveryError> {
        let id = self.id.ok_or_else(|| missing("file", "id"))?;
        let name = self.name.ok_or_else(|| missing("file", "name"))?;
        let raw = self
            .last_updated_date
            .ok_or_else(|| missing("file", "lastUpdatedDate"))?;
        let last_updated = DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| {
                DiscoveryError::UnexpectedPayloadShape(format!(
                    "file {} has unparseable lastUpdatedDate '{}': {}",
                    id, raw, e
                ))
            })?
            .with_timezone(&Utc);

        Ok(RemoteFile {
            id,
            name,
            last_updated,
        })
    }
}

// ============================================================================
// LmsClient
// ============================================================================

/// HTTP client for the document API
///
/// Stateless with respect to authentication: every call takes the bearer
/// token to use, which the caller obtains from a
/// [`TokenBroker`](crate::auth::TokenBroker).
#[derive(Clone)]
pub struct LmsClient {
    client: Client,
    base_url: String,
    subscription_key: Option<String>,
}

impl LmsClient {
    /// Creates a client for the API rooted at `base_url`
    ///
    /// Every request is bounded by [`CONNECT_TIMEOUT`] and [`REQUEST_TIMEOUT`];
    /// a timeout surfaces as a network error of the calling operation.
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            subscription_key: None,
        })
    }

    /// Sends the gateway subscription header on every request
    pub fn with_subscription_key(mut self, key: impl Into<String>) -> Self {
        self.subscription_key = Some(key.into());
        self
    }

    /// Creates an authenticated request builder for an operation
    pub fn request(&self, token: &str, request: &ApiRequest<'_>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, request.path());
        let mut builder = self
            .client
            .request(Method::GET, &url)
            .bearer_auth(token)
            .query(&request.query());
        if let Some(key) = &self.subscription_key {
            builder = builder.header(SUBSCRIPTION_KEY_HEADER, key);
        }
        builder
    }

    /// Lists the immediate child folders of `parent_id`, in server order
    ///
    /// Records without an `access` attribute are returned with
    /// `has_access == false` when well-formed and dropped otherwise; only
    /// visible records are required to be complete.
    pub async fn list_folders(
        &self,
        token: &str,
        parent_id: &str,
    ) -> Result<Vec<RemoteFolder>, DiscoveryError> {
        let records: Vec<FolderRecord> = self
            .get_all_pages(token, |offset| ApiRequest::ListFolders { parent_id, offset })
            .await?;

        let mut folders = Vec::with_capacity(records.len());
        for record in records {
            let visible = record.access.is_some();
            match record.into_remote() {
                Ok(folder) => folders.push(folder),
                Err(e) if !visible => debug!(error = %e, "Skipping malformed hidden folder"),
                Err(e) => return Err(e),
            }
        }

        debug!(parent_id, count = folders.len(), "Listed folders");
        Ok(folders)
    }

    /// Lists the files directly inside `folder_id`, in server order
    pub async fn list_files(
        &self,
        token: &str,
        folder_id: &str,
    ) -> Result<Vec<RemoteFile>, DiscoveryError> {
        let records: Vec<FileRecordPayload> = self
            .get_all_pages(token, |offset| ApiRequest::ListFiles { folder_id, offset })
            .await?;

        let files = records
            .into_iter()
            .map(FileRecordPayload::into_remote)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(folder_id, count = files.len(), "Listed files");
        Ok(files)
    }

    /// Resolves the signed content URL for `file_id`
    pub async fn resolve_download_url(
        &self,
        token: &str,
        file_id: &str,
    ) -> Result<String, DownloadError> {
        let response = self
            .request(token, &ApiRequest::ResolveDownload { file_id })
            .send()
            .await
            .map_err(|e| DownloadError::Network(e.to_string()))?;

        let status = response.status();
        if is_auth_rejection(status) {
            return Err(DownloadError::Auth(token_rejected(status)));
        }
        if !status.is_success() {
            return Err(DownloadError::NonSuccessStatus {
                status: status.as_u16(),
            });
        }

        let envelope: Envelope<String> = response
            .json()
            .await
            .map_err(|e| DownloadError::Network(format!("unreadable download URL response: {}", e)))?;

        envelope
            .data
            .filter(|url| !url.is_empty())
            .ok_or_else(|| DownloadError::Network("download URL response had no data".to_string()))
    }

    /// Fetches every page of a listing
    ///
    /// The next page is requested with `offset` while the envelope's `total`
    /// exceeds the number of records received; an empty page always ends the
    /// listing.
    async fn get_all_pages<'a, T, F>(
        &self,
        token: &str,
        make_request: F,
    ) -> Result<Vec<T>, DiscoveryError>
    where
        T: DeserializeOwned,
        F: Fn(u64) -> ApiRequest<'a>,
    {
        let mut records: Vec<T> = Vec::new();

        loop {
            let offset = records.len() as u64;
            let envelope: Envelope<Vec<T>> = self.get_envelope(token, &make_request(offset)).await?;
            let page = envelope.data.ok_or_else(|| {
                DiscoveryError::UnexpectedPayloadShape("listing response had no data".to_string())
            })?;

            let page_len = page.len();
            records.extend(page);

            match envelope.total {
                Some(total) if page_len > 0 && (records.len() as u64) < total => {
                    debug!(received = records.len(), total, "Fetching next page");
                }
                _ => break,
            }
        }

        Ok(records)
    }

    async fn get_envelope<T: DeserializeOwned>(
        &self,
        token: &str,
        request: &ApiRequest<'_>,
    ) -> Result<Envelope<T>, DiscoveryError> {
        let response = self
            .request(token, request)
            .send()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;

        let status = response.status();
        if is_auth_rejection(status) {
            return Err(DiscoveryError::Auth(token_rejected(status)));
        }
        if !status.is_success() {
            return Err(DiscoveryError::Network(format!(
                "GET {} returned {}",
                request.path(),
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| {
            DiscoveryError::UnexpectedPayloadShape(format!("{}: {}", request.path(), e))
        })
    }
}

fn is_auth_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

fn token_rejected(status: StatusCode) -> AuthError {
    AuthError::InvalidCredentials(format!("bearer token rejected with {}", status))
}
