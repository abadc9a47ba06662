//! Credentials and bearer tokens
//!
//! The platform reports a token lifetime in its token response, but LMSDrive
//! does not trust it. A token is stamped with a fixed local expiry of
//! [`TOKEN_TTL_SECS`] from issuance, and is treated as expired once less than
//! [`TOKEN_REFRESH_MARGIN_SECS`] remain.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Local token lifetime, counted from issuance (24 hours)
pub const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Minimum remaining lifetime for a token to be reused (1 hour)
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60 * 60;

// ============================================================================
// Credentials
// ============================================================================

/// Long-lived user credentials for the platform's identity endpoint
///
/// `Debug` redacts the password so credentials can never end up in a log line.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// AuthToken
// ============================================================================

/// A bearer token together with its locally computed expiry
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    /// Bearer token sent in the `Authorization` header
    pub token: String,
    /// Issuance time plus [`TOKEN_TTL_SECS`]
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    /// Stamps a freshly issued token with the local TTL
    pub fn issued_at(token: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at: issued_at + Duration::seconds(TOKEN_TTL_SECS),
        }
    }

    /// Stamps a token issued right now
    pub fn issued_now(token: impl Into<String>) -> Self {
        Self::issued_at(token, Utc::now())
    }

    /// Returns true if more than the refresh margin remains at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }

    /// Returns true if the token can still be used for a request
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Time left before the local expiry (negative once expired)
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
