//! Token and credential persistence port
//!
//! Where and how the token and credentials are kept at rest is an adapter
//! concern; the token broker only sees this trait. The production adapter is
//! the OS keyring (`lmsdrive-api::store::KeyringStore`).

use std::sync::Mutex;

use anyhow::anyhow;

use crate::domain::{AuthToken, Credentials};

/// Port trait for persisting the bearer token and the user's credentials
pub trait ITokenStore: Send + Sync {
    fn load_token(&self) -> anyhow::Result<Option<AuthToken>>;

    fn store_token(&self, token: &AuthToken) -> anyhow::Result<()>;

    fn load_credentials(&self) -> anyhow::Result<Option<Credentials>>;

    fn store_credentials(&self, credentials: &Credentials) -> anyhow::Result<()>;
}

/// In-process store, used in tests and for one-shot runs
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<AuthToken>>,
    credentials: Mutex<Option<Credentials>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-loaded with credentials
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            token: Mutex::new(None),
            credentials: Mutex::new(Some(credentials)),
        }
    }
}

impl ITokenStore for MemoryTokenStore {
    fn load_token(&self) -> anyhow::Result<Option<AuthToken>> {
        let guard = self.token.lock().map_err(|_| anyhow!("token store poisoned"))?;
        Ok(guard.clone())
    }

    fn store_token(&self, token: &AuthToken) -> anyhow::Result<()> {
        let mut guard = self.token.lock().map_err(|_| anyhow!("token store poisoned"))?;
        *guard = Some(token.clone());
        Ok(())
    }

    fn load_credentials(&self) -> anyhow::Result<Option<Credentials>> {
        let guard = self
            .credentials
            .lock()
            .map_err(|_| anyhow!("credential store poisoned"))?;
        Ok(guard.clone())
    }

    fn store_credentials(&self, credentials: &Credentials) -> anyhow::Result<()> {
        let mut guard = self
            .credentials
            .lock()
            .map_err(|_| anyhow!("credential store poisoned"))?;
        *guard = Some(credentials.clone());
        Ok(())
    }
}
