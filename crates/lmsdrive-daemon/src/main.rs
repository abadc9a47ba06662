//! LMSDrive Daemon - Background mirroring service
//!
//! This binary runs as a user service and handles:
//! - An initial sync at startup
//! - Periodic syncs at the configured interval
//! - Storing the user's credentials in the OS keyring (`login`)
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the keyring store, the token broker and the document API
//! client into a [`SyncEngine`], and hands the engine to a [`Scheduler`].
//! Shutdown is driven by a `CancellationToken` that is triggered on receipt
//! of SIGTERM or SIGINT; it stops the timer and cancels an in-flight run.

mod adapters;

use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lmsdrive_api::{KeyringStore, LmsClient, LmsDocumentSource, TokenBroker};
use lmsdrive_core::config::Config;
use lmsdrive_core::domain::Credentials;
use lmsdrive_core::ports::ITokenStore;
use lmsdrive_sync::{RunOutcome, RunRecord, Scheduler, SyncEngine};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::{LogNotifier, StaticContainerSource};

/// Environment variable consulted by `login` before prompting on stdin
const PASSWORD_ENV: &str = "LMSDRIVE_PASSWORD";

#[derive(Debug, Parser)]
#[command(name = "lmsdrived", version, about = "Mirror learning-platform files to local disk")]
struct Cli {
    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync now, then keep syncing at the configured interval (default)
    Run,
    /// Sync once and exit
    Once,
    /// Store credentials in the OS keyring and verify them
    ///
    /// The password is taken from LMSDRIVE_PASSWORD, or else read from stdin
    /// without hiding the typed characters.
    Login {
        /// Platform username
        #[arg(long)]
        username: String,
    },
}

// ============================================================================
// Wiring
// ============================================================================

/// The components shared by `run` and `once`
struct Daemon {
    scheduler: Scheduler,
    config: Config,
}

impl Daemon {
    fn new(config: Config) -> Result<Self> {
        let username = config
            .auth
            .username
            .clone()
            .context("auth.username is not set; run `lmsdrived login --username <user>` and set it in the config")?;

        let store: Arc<dyn ITokenStore> = Arc::new(KeyringStore::new(username));
        let broker = Arc::new(
            TokenBroker::from_config(&config.auth, store).context("Invalid auth configuration")?,
        );

        let mut client =
            LmsClient::new(config.api.base_url.clone()).context("Failed to build API client")?;
        if let Some(key) = &config.api.subscription_key {
            client = client.with_subscription_key(key.clone());
        }
        let source =
            LmsDocumentSource::new(client, broker).context("Failed to build download client")?;

        let engine = SyncEngine::new(
            Arc::new(source),
            Arc::new(StaticContainerSource::new(config.containers.clone())),
            Arc::new(LogNotifier),
            &config.sync,
        );

        Ok(Self {
            scheduler: Scheduler::new(Arc::new(engine)),
            config,
        })
    }

    /// Runs the initial sync, then waits on the scheduler until shutdown
    async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.watch_shutdown(shutdown.clone());

        if self.config.containers.is_empty() {
            warn!("No containers configured; nothing will be mirrored");
        }

        log_run(self.scheduler.run_now().await);

        if shutdown.is_cancelled() {
            return Ok(());
        }

        match self.config.sync.interval() {
            Some(interval) => self.scheduler.schedule(interval),
            None => info!("Periodic sync disabled (sync.interval_secs <= 0)"),
        }

        shutdown.cancelled().await;
        self.scheduler.shutdown().await;
        Ok(())
    }

    /// Runs a single sync
    async fn once(&self, shutdown: CancellationToken) -> Result<()> {
        self.watch_shutdown(shutdown);

        match self.scheduler.run_now().await {
            Some(record) => {
                log_run(Some(record.clone()));
                if let RunOutcome::Failed(reason) = record.outcome {
                    bail!("Sync failed: {reason}");
                }
                Ok(())
            }
            None => bail!("A sync is already running"),
        }
    }

    /// Shuts the scheduler down once `shutdown` is cancelled
    fn watch_shutdown(&self, shutdown: CancellationToken) {
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            scheduler.shutdown().await;
        });
    }
}

fn log_run(record: Option<RunRecord>) {
    let Some(record) = record else {
        return;
    };
    let elapsed_ms = (record.finished_at - record.started_at).num_milliseconds();
    match record.outcome {
        RunOutcome::Completed { downloaded, failed } => {
            info!(downloaded, failed, elapsed_ms, "Sync run completed")
        }
        RunOutcome::Failed(reason) => error!(%reason, elapsed_ms, "Sync run failed"),
    }
}

// ============================================================================
// login
// ============================================================================

async fn login(config: &Config, username: String) -> Result<()> {
    let password = read_password()?;
    let credentials = Credentials::new(username.clone(), password);

    let store = Arc::new(KeyringStore::new(username.clone()));
    store
        .store_credentials(&credentials)
        .context("Failed to store credentials")?;

    let broker = TokenBroker::from_config(&config.auth, store.clone())
        .context("Invalid auth configuration")?;
    if let Err(e) = broker.authenticate(&credentials).await {
        // Keep the keyring free of credentials that are known to be wrong
        if let Err(clear_err) = store.clear() {
            warn!(error = %clear_err, "Failed to remove rejected credentials");
        }
        return Err(e).context("Login failed");
    }

    info!(%username, "Credentials stored and verified");
    if config.auth.username.as_deref() != Some(username.as_str()) {
        warn!(
            config_path = %Config::default_path().display(),
            "Set auth.username to {username} in the config file so the daemon can find these credentials"
        );
    }
    Ok(())
}

/// Reads the password from `LMSDRIVE_PASSWORD`, falling back to one line of stdin
///
/// Input typed at a terminal is echoed, so interactive users are told to
/// prefer the environment variable.
fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            return Ok(password);
        }
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprintln!("Note: the password is shown as you type it; set {PASSWORD_ENV} to avoid this");
    }
    eprint!("Password: ");
    password_from_line(stdin.lock())
}

fn password_from_line(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    let password = line.trim_end_matches(&['\r', '\n'][..]).to_string();
    if password.is_empty() {
        bail!("Empty password; set {PASSWORD_ENV} or type it on stdin");
    }
    Ok(password)
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    match path {
        Some(path) => {
            let config = Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            Ok((config, path))
        }
        None => {
            let path = Config::default_path();
            Ok((Config::load_or_default(&path), path))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = load_config(cli.config)?;

    // RUST_LOG takes precedence over logging.level
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!(config_path = %config_path.display(), "LMSDrive daemon starting (lmsdrived)");

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!(%problem, "Invalid configuration");
        }
        bail!("{} configuration error(s)", problems.len());
    }

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Login { username } => login(&config, username).await,
        Command::Once => Daemon::new(config)?.once(shutdown_token).await,
        Command::Run => Daemon::new(config)?.run(shutdown_token).await,
    };

    match &result {
        Ok(()) => info!("LMSDrive daemon shut down gracefully"),
        Err(e) => error!(error = %e, "LMSDrive daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
