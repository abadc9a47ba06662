//! In-memory port doubles shared by the engine and walker tests

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use lmsdrive_core::domain::{AuthError, Container, DiscoveryError, DownloadError};
use lmsdrive_core::ports::{
    IContainerSource, IDocumentSource, INotificationService, Notification, RemoteFile,
    RemoteFolder,
};

pub fn folder(id: &str, name: &str, active: bool, allow_upload: bool, children: u64) -> RemoteFolder {
    RemoteFolder {
        id: id.to_string(),
        name: name.to_string(),
        is_active: active,
        allow_upload,
        sub_folder_count: children,
        has_access: true,
    }
}

pub fn file(id: &str, name: &str, rfc3339: &str) -> RemoteFile {
    RemoteFile {
        id: id.to_string(),
        name: name.to_string(),
        last_updated: DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc),
    }
}

/// A scripted document tree
#[derive(Default)]
pub struct FakeSource {
    pub auth_error: Option<AuthError>,
    pub folders: Mutex<HashMap<String, Vec<RemoteFolder>>>,
    pub files: Mutex<HashMap<String, Vec<RemoteFile>>>,
    pub folder_errors: HashMap<String, DiscoveryError>,
    /// File ids whose content fetch answers with this status
    pub download_status: HashMap<String, u16>,
    /// Raised after the first successful download
    pub cancel_on_download: Option<CancellationToken>,
    /// Folder or file ids whose requests never complete
    pub stalled: HashSet<String>,
    /// Raised when a request starts stalling
    pub cancel_on_stall: Option<CancellationToken>,
    pub folder_calls: AtomicUsize,
    pub file_calls: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folders(self, parent: &str, folders: Vec<RemoteFolder>) -> Self {
        self.folders.lock().unwrap().insert(parent.to_string(), folders);
        self
    }

    pub fn with_files(self, folder: &str, files: Vec<RemoteFile>) -> Self {
        self.files.lock().unwrap().insert(folder.to_string(), files);
        self
    }

    /// Replaces a folder's file listing, as if the server content changed
    pub fn set_files(&self, folder: &str, files: Vec<RemoteFile>) {
        self.files.lock().unwrap().insert(folder.to_string(), files);
    }

    async fn stall_if_scripted(&self, id: &str) {
        if self.stalled.contains(id) {
            if let Some(cancel) = &self.cancel_on_stall {
                cancel.cancel();
            }
            std::future::pending::<()>().await;
        }
    }

    pub fn list_calls(&self) -> usize {
        self.folder_calls.load(Ordering::SeqCst) + self.file_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IDocumentSource for FakeSource {
    async fn authenticate(&self) -> Result<(), AuthError> {
        match &self.auth_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn list_folders(&self, parent_id: &str) -> Result<Vec<RemoteFolder>, DiscoveryError> {
        self.folder_calls.fetch_add(1, Ordering::SeqCst);
        self.stall_if_scripted(parent_id).await;
        if let Some(e) = self.folder_errors.get(parent_id) {
            return Err(e.clone());
        }
        Ok(self
            .folders
            .lock()
            .unwrap()
            .get(parent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, DiscoveryError> {
        self.file_calls.fetch_add(1, Ordering::SeqCst);
        self.stall_if_scripted(folder_id).await;
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(folder_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn resolve_download_url(&self, file_id: &str) -> Result<String, DownloadError> {
        Ok(format!("fake://content/{}", file_id))
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64, DownloadError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let file_id = url.trim_start_matches("fake://content/");
        self.stall_if_scripted(file_id).await;
        if let Some(status) = self.download_status.get(file_id) {
            return Err(DownloadError::NonSuccessStatus { status: *status });
        }

        let body = format!("content of {}", file_id);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(destination, &body).unwrap();
        if let Some(cancel) = &self.cancel_on_download {
            cancel.cancel();
        }
        Ok(body.len() as u64)
    }
}

pub struct FixedContainers(pub Vec<Container>);

#[async_trait]
impl IContainerSource for FixedContainers {
    async fn list_containers(&self) -> anyhow::Result<Vec<Container>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl INotificationService for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
