//! Configuration module for LMSDrive.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Container;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for LMSDrive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    /// Root containers to mirror
    pub containers: Vec<Container>,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Destination root directory for the local mirror.
    pub root: PathBuf,
    /// Seconds between sync runs. Zero or negative disables periodic sync.
    pub interval_secs: i64,
    /// Location of the change index (flat table).
    pub index_path: PathBuf,
    /// Maximum folder nesting walked below a container.
    pub max_depth: usize,
    /// Keep walking below folders that are not downloadable themselves.
    pub descend_into_non_downloadable: bool,
    /// Treat a corrupt index as empty (full re-sync) instead of failing the run.
    pub resync_on_corrupt_index: bool,
}

impl SyncConfig {
    /// The periodic sync interval, or `None` when periodic sync is disabled
    pub fn interval(&self) -> Option<Duration> {
        u64::try_from(self.interval_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Document API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL that listing and download-resolution paths are appended to.
    pub base_url: String,
    /// Value for the `Ocp-Apim-Subscription-Key` header, if the gateway needs one.
    pub subscription_key: Option<String>,
}

/// Identity / login flow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Identity endpoint receiving the username/password form.
    pub authorize_url: String,
    /// Endpoint exchanging the authorization code for a bearer token.
    pub token_url: String,
    pub client_id: String,
    /// `resource` parameter sent with both phases of the login.
    pub resource: String,
    pub redirect_uri: String,
    /// Username whose stored credentials are used. `None` until `lmsdrived login`.
    pub username: Option<String>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/lmsdrive/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("lmsdrive")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("lmsdrive")
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("LMSDrive"),
            interval_secs: 3600,
            index_path: data_dir().join("index.csv"),
            max_depth: 32,
            descend_into_non_downloadable: false,
            resync_on_corrupt_index: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://luminus.nus.edu.sg/v2/api".to_string(),
            subscription_key: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authorize_url: "https://vafs.nus.edu.sg/adfs/oauth2/authorize".to_string(),
            token_url: "https://luminus.nus.edu.sg/v2/api/login/adfstoken".to_string(),
            client_id: "E10493A3B1024F14BDC7D0D8B9F649E9".to_string(),
            resource: "sg_edu_nus_oauth".to_string(),
            redirect_uri: "https://luminus.nus.edu.sg/auth/callback".to_string(),
            username: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.max_depth"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. A non-positive
    /// `sync.interval_secs` is not an error; it disables periodic sync.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.max_depth == 0 {
            errors.push(ValidationError {
                field: "sync.max_depth".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.root.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "sync.root".into(),
                message: "must not be empty".into(),
            });
        }
        if self.sync.index_path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "sync.index_path".into(),
                message: "must not be empty".into(),
            });
        }

        // --- api / auth ---
        for (field, value) in [
            ("api.base_url", &self.api.base_url),
            ("auth.authorize_url", &self.auth.authorize_url),
            ("auth.token_url", &self.auth.token_url),
            ("auth.redirect_uri", &self.auth.redirect_uri),
        ] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("must be an http(s) URL, got '{}'", value),
                });
            }
        }
        if self.auth.client_id.is_empty() {
            errors.push(ValidationError {
                field: "auth.client_id".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- containers ---
        for (i, container) in self.containers.iter().enumerate() {
            if container.id.is_empty() {
                errors.push(ValidationError {
                    field: format!("containers[{}].id", i),
                    message: "must not be empty".into(),
                });
            }
            if container.code.is_empty() {
                errors.push(ValidationError {
                    field: format!("containers[{}].code", i),
                    message: "must not be empty".into(),
                });
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use lmsdrive_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .sync_root(PathBuf::from("/home/user/LMSDrive"))
///     .sync_interval_secs(1800)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_root(mut self, root: PathBuf) -> Self {
        self.config.sync.root = root;
        self
    }

    pub fn sync_interval_secs(mut self, seconds: i64) -> Self {
        self.config.sync.interval_secs = seconds;
        self
    }

    pub fn sync_index_path(mut self, path: PathBuf) -> Self {
        self.config.sync.index_path = path;
        self
    }

    pub fn sync_max_depth(mut self, depth: usize) -> Self {
        self.config.sync.max_depth = depth;
        self
    }

    pub fn sync_descend_into_non_downloadable(mut self, enabled: bool) -> Self {
        self.config.sync.descend_into_non_downloadable = enabled;
        self
    }

    pub fn sync_resync_on_corrupt_index(mut self, enabled: bool) -> Self {
        self.config.sync.resync_on_corrupt_index = enabled;
        self
    }

    // --- api ---

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api.base_url = url.into();
        self
    }

    pub fn api_subscription_key(mut self, key: impl Into<String>) -> Self {
        self.config.api.subscription_key = Some(key.into());
        self
    }

    // --- auth ---

    pub fn auth_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.config.auth.authorize_url = url.into();
        self
    }

    pub fn auth_token_url(mut self, url: impl Into<String>) -> Self {
        self.config.auth.token_url = url.into();
        self
    }

    pub fn auth_username(mut self, username: impl Into<String>) -> Self {
        self.config.auth.username = Some(username.into());
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- containers ---

    pub fn container(mut self, container: Container) -> Self {
        self.config.containers.push(container);
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
