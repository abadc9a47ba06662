//! LMSDrive Sync - one-way mirror engine
//!
//! Provides:
//! - Recursive discovery of a container's document tree
//! - A persisted change index deciding which files are stale
//! - A sync run that downloads stale files, tolerating per-file failures
//! - A periodic scheduler that never runs two syncs at once
//!
//! ## Modules
//!
//! - [`walker`] - Worklist traversal producing files with their ancestry
//! - [`index`] - Flat-table change index with atomic rewrite
//! - [`engine`] - Orchestrates discovery, diff, download and commit
//! - [`scheduler`] - Interval timer with overlap suppression

pub mod engine;
pub mod index;
pub mod scheduler;
pub mod walker;

#[cfg(test)]
pub(crate) mod test_support;

use thiserror::Error;

use lmsdrive_core::domain::{AuthError, IndexError};

pub use engine::{SyncEngine, SyncReport};
pub use index::ChangeIndex;
pub use scheduler::{RunOutcome, RunRecord, Scheduler, SchedulerState, SyncJob};
pub use walker::DocumentTreeWalker;

/// Failures that stop a sync run as a whole
///
/// Anything scoped to one container or one file is reported inside
/// [`SyncReport`] instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No usable token could be obtained before the run started
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The change index could not be loaded or committed
    #[error("Change index error: {0}")]
    Index(#[from] IndexError),

    /// The list of containers to mirror could not be obtained
    #[error("Container listing failed: {0}")]
    Containers(String),
}
