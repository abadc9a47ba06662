//! One-way mirror engine
//!
//! The [`SyncEngine`] runs a full sync across containers and returns a
//! [`SyncReport`].
//!
//! ## Sync Flow
//!
//! 1. **Pre-flight**: make sure a token can be obtained. Failure stops the
//!    run before any download.
//! 2. **Index**: load the change index. A missing index is a first run.
//! 3. **Per container**: discover files, diff them against the loaded index
//!    and download each stale file to `root / ancestry... / name`.
//! 4. **Bookkeeping**: commit the index once with the entries of every
//!    successful download, then send a notification. When every container
//!    was walked to completion, entries for files the server no longer lists
//!    are dropped.
//!
//! ## Failure scopes
//!
//! - A discovery failure drops that container's contribution only, and is
//!   listed in [`SyncReport::container_failures`].
//! - A download failure drops that file only, and is listed in
//!   [`SyncReport::failures`]. Its index entry is left as it was, so the
//!   file is retried on the next run.
//!
//! ## Cancellation
//!
//! Every request of a run is raced against the cancellation token. Raising
//! it abandons the request in flight; the file being fetched and every stale
//! file not yet fetched are reported as [`DownloadError::Cancelled`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lmsdrive_core::config::SyncConfig;
use lmsdrive_core::domain::{
    Container, DiscoveryError, DownloadError, FileRecord, IndexEntry, IndexError, IndexTable,
};
use lmsdrive_core::ports::{IContainerSource, IDocumentSource, INotificationService, Notification};

use crate::index::ChangeIndex;
use crate::scheduler::SyncJob;
use crate::walker::DocumentTreeWalker;
use crate::SyncError;

// ============================================================================
// SyncReport
// ============================================================================

/// Summary of a completed sync run
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Number of files written to disk
    pub downloaded_count: usize,
    /// Files that were stale but could not be downloaded
    pub failures: Vec<(FileRecord, DownloadError)>,
    /// Containers whose discovery failed and contributed nothing
    pub container_failures: Vec<(Container, DiscoveryError)>,
    /// The index was corrupt and was replaced by a full re-sync
    pub index_reset: bool,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

impl SyncReport {
    /// True when every container was discovered and every stale file fetched
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.container_failures.is_empty()
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} file(s) downloaded, {} failed",
            self.downloaded_count,
            self.failures.len()
        );
        if !self.container_failures.is_empty() {
            let codes: Vec<&str> = self
                .container_failures
                .iter()
                .map(|(c, _)| c.code.as_str())
                .collect();
            text.push_str(&format!("; could not read {}", codes.join(", ")));
        }
        if self.index_reset {
            text.push_str("; change index was rebuilt");
        }
        text
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Mirrors containers from the platform onto local disk
///
/// ## Dependencies
///
/// - `source`: folder/file listings, URL resolution and content download
/// - `containers`: the containers to mirror when run by the scheduler
/// - `notifier`: receives one notification per run
pub struct SyncEngine {
    source: Arc<dyn IDocumentSource>,
    containers: Arc<dyn IContainerSource>,
    notifier: Arc<dyn INotificationService>,
    walker: DocumentTreeWalker,
    index: ChangeIndex,
    root: PathBuf,
    resync_on_corrupt_index: bool,
}

impl SyncEngine {
    /// Creates a new `SyncEngine` from its ports and the `sync` config section
    pub fn new(
        source: Arc<dyn IDocumentSource>,
        containers: Arc<dyn IContainerSource>,
        notifier: Arc<dyn INotificationService>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            walker: DocumentTreeWalker::from_config(source.clone(), config),
            source,
            containers,
            notifier,
            index: ChangeIndex::new(config.index_path.clone()),
            root: config.root.clone(),
            resync_on_corrupt_index: config.resync_on_corrupt_index,
        }
    }

    /// Destination root used by [`SyncEngine::sync_configured`]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Syncs the containers reported by the container source into the configured root
    pub async fn sync_configured(&self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        let containers = self
            .containers
            .list_containers()
            .await
            .map_err(|e| SyncError::Containers(format!("{e:#}")))?;
        self.sync_all(&containers, &self.root, cancel).await
    }

    /// Runs one full sync of `containers` into `dest_root`
    ///
    /// Once `cancel` is raised the request in flight is abandoned and no
    /// further requests are issued. Stale files that were not fetched are
    /// reported as [`DownloadError::Cancelled`], and downloads completed so
    /// far are still committed to the index. A run cancelled during the
    /// pre-flight check returns an empty report and leaves the index alone.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Auth`] if no token can be obtained; nothing is downloaded
    /// - [`SyncError::Index`] if the index cannot be loaded (unless configured
    ///   to rebuild a corrupt index) or committed
    #[tracing::instrument(skip_all, fields(containers = containers.len(), dest = %dest_root.display()))]
    pub async fn sync_all(
        &self,
        containers: &[Container],
        dest_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let mut report = SyncReport::default();

        info!("Starting sync run");

        let preflight = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.source.authenticate() => Some(result),
        };
        match preflight {
            None => {
                info!("Sync cancelled before authentication completed");
                report.duration_ms = start.elapsed().as_millis() as u64;
                return Ok(report);
            }
            Some(Err(e)) => {
                error!(error = %e, "Cannot authenticate, sync aborted");
                self.notify(Notification::error("Sync failed", format!("Sign-in failed: {e}")))
                    .await;
                return Err(SyncError::Auth(e));
            }
            Some(Ok(())) => {}
        }

        let indexed = match self.load_index(&mut report).await {
            Ok(table) => table,
            Err(e) => {
                error!(error = %e, "Cannot load change index, sync aborted");
                self.notify(Notification::error("Sync failed", e.to_string())).await;
                return Err(SyncError::Index(e));
            }
        };
        let mut staged = indexed.clone();
        let mut seen: HashSet<String> = HashSet::new();

        for container in containers {
            if cancel.is_cancelled() {
                info!(container = %container.code, "Sync cancelled, skipping container");
                continue;
            }

            let files = match self.walker.discover_files(container, cancel).await {
                Ok(files) => files,
                Err(e) => {
                    warn!(container = %container.code, error = %e, "Discovery failed");
                    report.container_failures.push((container.clone(), e));
                    continue;
                }
            };

            seen.extend(files.iter().map(|f| f.id.clone()));
            let stale = ChangeIndex::diff(&files, &indexed);
            info!(
                container = %container.code,
                discovered = files.len(),
                stale = stale.len(),
                "Container discovered"
            );

            for file in stale {
                if cancel.is_cancelled() {
                    report.failures.push((file, DownloadError::Cancelled));
                    continue;
                }

                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(DownloadError::Cancelled),
                    result = self.download(&file, dest_root) => result,
                };
                match outcome {
                    Ok(bytes) => {
                        debug!(file_id = %file.id, bytes, "File downloaded");
                        staged.insert(
                            file.id.clone(),
                            IndexEntry::new(file.id.clone(), file.name.clone(), file.last_updated_secs()),
                        );
                        report.downloaded_count += 1;
                    }
                    Err(e) => {
                        warn!(file_id = %file.id, name = %file.name, error = %e, "Download failed");
                        report.failures.push((file, e));
                    }
                }
            }
        }

        // A partial walk cannot tell a removed file from one it did not reach
        if report.container_failures.is_empty() && !cancel.is_cancelled() {
            let before = staged.len();
            staged.retain(|id, _| seen.contains(id));
            if staged.len() < before {
                info!(removed = before - staged.len(), "Dropped index entries for files no longer listed");
            }
        }

        if let Err(e) = self.index.commit(&staged).await {
            error!(error = %e, "Cannot commit change index");
            self.notify(Notification::error("Sync failed", e.to_string())).await;
            return Err(SyncError::Index(e));
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            downloaded = report.downloaded_count,
            failed = report.failures.len(),
            containers_failed = report.container_failures.len(),
            duration_ms = report.duration_ms,
            "Sync run finished"
        );

        let notification = if report.is_clean() {
            Notification::sync("Sync complete", report.summary())
        } else {
            Notification::error("Sync finished with errors", report.summary())
        };
        self.notify(notification).await;

        Ok(report)
    }

    /// Loads the index, applying the first-run and corrupt-index policies
    async fn load_index(&self, report: &mut SyncReport) -> Result<IndexTable, IndexError> {
        match self.index.load().await {
            Ok(table) => Ok(table),
            Err(IndexError::NotFound(path)) => {
                info!(path = %path.display(), "No change index yet, performing full sync");
                Ok(IndexTable::new())
            }
            Err(e @ IndexError::Corrupt { .. }) if self.resync_on_corrupt_index => {
                warn!(error = %e, "Change index is corrupt, rebuilding with a full sync");
                report.index_reset = true;
                Ok(IndexTable::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn download(&self, file: &FileRecord, dest_root: &Path) -> Result<u64, DownloadError> {
        let destination = file.local_path(dest_root);
        let url = self.source.resolve_download_url(&file.id).await?;
        self.source.download(&url, &destination).await
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(error = %e, "Failed to deliver notification");
        }
    }
}

#[async_trait]
impl SyncJob for SyncEngine {
    async fn run(&self, cancel: CancellationToken) -> Result<SyncReport, SyncError> {
        self.sync_configured(&cancel).await
    }
}
