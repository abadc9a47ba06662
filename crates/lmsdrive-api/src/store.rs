//! OS keyring persistence for the bearer token and credentials
//!
//! Uses the `keyring` crate so secrets live in the platform credential store
//! (GNOME Keyring, KDE Wallet, macOS Keychain) rather than in the config
//! file. Two entries are kept per user under the `lmsdrive` service:
//! `{username}:token` and `{username}:credentials`, both JSON-encoded.

use anyhow::{Context, Result};
use lmsdrive_core::domain::{AuthToken, Credentials};
use lmsdrive_core::ports::ITokenStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

/// Keyring service name
const KEYRING_SERVICE: &str = "lmsdrive";

/// Keyring-backed [`ITokenStore`] for a single user
#[derive(Debug, Clone)]
pub struct KeyringStore {
    username: String,
}

impl KeyringStore {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    /// Removes both the cached token and the stored credentials
    pub fn clear(&self) -> Result<()> {
        for kind in ["token", "credentials"] {
            let entry = self.entry(kind)?;
            match entry.delete_credential() {
                Ok(()) => info!(user = %self.username, kind, "Cleared keyring entry"),
                Err(keyring::Error::NoEntry) => {
                    debug!(user = %self.username, kind, "No keyring entry to clear")
                }
                Err(e) => {
                    return Err(anyhow::Error::new(e).context("Failed to delete from keyring"))
                }
            }
        }
        Ok(())
    }

    fn entry(&self, kind: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, &format!("{}:{}", self.username, kind))
            .context("Failed to create keyring entry")
    }

    fn write<T: Serialize>(&self, kind: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).context("Failed to serialize keyring value")?;
        self.entry(kind)?
            .set_password(&json)
            .context("Failed to store value in keyring")?;
        debug!(user = %self.username, kind, "Stored keyring entry");
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, kind: &str) -> Result<Option<T>> {
        match self.entry(kind)?.get_password() {
            Ok(json) => {
                let value = serde_json::from_str(&json)
                    .context("Failed to deserialize value from keyring")?;
                debug!(user = %self.username, kind, "Loaded keyring entry");
                Ok(Some(value))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(user = %self.username, kind, "No keyring entry found");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }
}

impl ITokenStore for KeyringStore {
    fn load_token(&self) -> Result<Option<AuthToken>> {
        self.read("token")
    }

    fn store_token(&self, token: &AuthToken) -> Result<()> {
        self.write("token", token)
    }

    fn load_credentials(&self) -> Result<Option<Credentials>> {
        self.read("credentials")
    }

    fn store_credentials(&self, credentials: &Credentials) -> Result<()> {
        self.write("credentials", credentials)
    }
}
