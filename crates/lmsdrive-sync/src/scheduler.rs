//! Sync scheduler - runs a sync job on a fixed interval
//!
//! The [`Scheduler`] owns one recurring timer and one run lock. Each tick
//! spawns a run of the [`SyncJob`]; a tick that arrives while a run is
//! still in progress is skipped, so two runs never overlap.
//!
//! ## States
//!
//! ```text
//!            schedule(d > 0)              schedule(d' > 0)
//! Stopped ─────────────────→ Scheduled(d) ─────────────────→ Scheduled(d')
//!    ↑                            │
//!    └──── schedule(0) / shutdown ┘
//! ```
//!
//! Rescheduling aborts the previous timer before the new one is installed,
//! while holding the timer lock, so there is never a moment with two timers.
//! The first tick fires one full interval after scheduling; callers wanting
//! an immediate run use [`Scheduler::run_now`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::SyncReport;
use crate::SyncError;

/// A unit of work the scheduler can run
#[async_trait]
pub trait SyncJob: Send + Sync + 'static {
    /// Runs one sync; `cancel` is raised when the scheduler shuts down
    async fn run(&self, cancel: CancellationToken) -> Result<SyncReport, SyncError>;
}

/// Timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Scheduled(Duration),
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        downloaded: usize,
        failed: usize,
    },
    Failed(String),
}

/// Observability record of the most recent run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
}

struct TimerSlot {
    state: SchedulerState,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    job: Arc<dyn SyncJob>,
    timer: Mutex<TimerSlot>,
    run_lock: Arc<AsyncMutex<()>>,
    last_run: Mutex<Option<RunRecord>>,
    shutdown: CancellationToken,
}

/// Periodic driver for a [`SyncJob`]
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler {
    /// Creates a stopped scheduler for `job`
    pub fn new(job: Arc<dyn SyncJob>) -> Self {
        Self {
            inner: Arc::new(Inner {
                job,
                timer: Mutex::new(TimerSlot {
                    state: SchedulerState::Stopped,
                    handle: None,
                }),
                run_lock: Arc::new(AsyncMutex::new(())),
                last_run: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Installs a recurring timer, replacing any existing one
    ///
    /// A zero interval stops the scheduler. Must be called from within a
    /// tokio runtime.
    pub fn schedule(&self, interval: Duration) {
        let mut slot = lock(&self.inner.timer);

        if let Some(previous) = slot.handle.take() {
            previous.abort();
        }

        if interval.is_zero() || self.inner.shutdown.is_cancelled() {
            slot.state = SchedulerState::Stopped;
            info!("Periodic sync stopped");
            return;
        }

        let inner = Arc::clone(&self.inner);
        slot.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::spawn(Arc::clone(&inner).try_run());
                    }
                }
            }
        }));
        slot.state = SchedulerState::Scheduled(interval);
        info!(interval_secs = interval.as_secs(), "Periodic sync scheduled");
    }

    /// Like [`Scheduler::schedule`], with zero or negative seconds meaning disabled
    pub fn schedule_secs(&self, interval_secs: i64) {
        let secs = u64::try_from(interval_secs).unwrap_or(0);
        self.schedule(Duration::from_secs(secs));
    }

    /// Runs the job now unless a run is already in progress
    ///
    /// Returns the record of this run, or `None` if it was skipped.
    pub async fn run_now(&self) -> Option<RunRecord> {
        Arc::clone(&self.inner).try_run().await
    }

    pub fn state(&self) -> SchedulerState {
        lock(&self.inner.timer).state
    }

    /// Record of the most recently finished run
    pub fn last_run(&self) -> Option<RunRecord> {
        lock(&self.inner.last_run).clone()
    }

    /// Returns true while a run is executing
    pub fn is_running(&self) -> bool {
        self.inner.run_lock.try_lock().is_err()
    }

    /// Stops the timer for good and cancels any in-flight run
    ///
    /// Resolves once the in-flight run, if any, has returned.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        {
            let mut slot = lock(&self.inner.timer);
            if let Some(handle) = slot.handle.take() {
                handle.abort();
            }
            slot.state = SchedulerState::Stopped;
        }
        let _drained = self.inner.run_lock.lock().await;
        info!("Scheduler shut down");
    }
}

impl Inner {
    async fn try_run(self: Arc<Self>) -> Option<RunRecord> {
        let Ok(_guard) = Arc::clone(&self.run_lock).try_lock_owned() else {
            warn!("Previous sync still running, skipping this one");
            return None;
        };

        let started_at = Utc::now();
        let outcome = match self.job.run(self.shutdown.child_token()).await {
            Ok(report) => RunOutcome::Completed {
                downloaded: report.downloaded_count,
                failed: report.failures.len() + report.container_failures.len(),
            },
            Err(e) => {
                error!(error = %e, "Sync run failed");
                RunOutcome::Failed(e.to_string())
            }
        };

        let record = RunRecord {
            started_at,
            finished_at: Utc::now(),
            outcome,
        };
        *lock(&self.last_run) = Some(record.clone());
        Some(record)
    }
}
