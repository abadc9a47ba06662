//! Two-phase web login and bearer token lifecycle
//!
//! The platform has no direct password grant. A token is obtained by:
//!
//! 1. Posting the username/password form to the identity endpoint without
//!    following redirects, then repeating the post with the cookies the first
//!    response set. The second response redirects to the application's
//!    callback with `?code=...&state=...`.
//! 2. Exchanging that code at the token endpoint with an authorization-code
//!    grant. Only `access_token` is used from the response.
//!
//! ## Components
//!
//! - [`LoginConfig`] - Endpoints and client parameters for the flow
//! - [`LoginFlow`] - Performs one complete login
//! - [`TokenBroker`] - Caches the token under the local TTL policy and
//!   re-authenticates on demand, with a single login in flight at a time

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lmsdrive_core::config::AuthConfig;
use lmsdrive_core::domain::{AuthError, AuthToken, Credentials};
use lmsdrive_core::ports::ITokenStore;
use oauth2::{
    basic::{BasicClient, BasicErrorResponse},
    AuthType, AuthUrl, AuthorizationCode, ClientId, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, RequestTokenError, TokenResponse, TokenUrl,
};
use reqwest::header::{HeaderMap, COOKIE, LOCATION, SET_COOKIE};
use reqwest::{redirect, Client, Response};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::{CONNECT_TIMEOUT, REQUEST_TIMEOUT};

// ============================================================================
// LoginConfig
// ============================================================================

/// Endpoints and client parameters for the login flow
#[derive(Debug, Clone)]
pub struct LoginConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub client_id: String,
    pub resource: String,
    pub redirect_uri: String,
}

impl From<&AuthConfig> for LoginConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            authorize_url: config.authorize_url.clone(),
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            resource: config.resource.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }
}

// ============================================================================
// LoginFlow
// ============================================================================

type CodeClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Performs the two-phase login against the identity and token endpoints
pub struct LoginFlow {
    /// Never follows redirects; the redirect target is what phase one reads
    http: Client,
    oauth: CodeClient,
    resource: String,
}

impl LoginFlow {
    /// Creates a login flow for the given endpoints
    pub fn new(config: &LoginConfig) -> Result<Self, AuthError> {
        let invalid = |what: &str, e: url::ParseError| {
            AuthError::UnexpectedResponseShape(format!("invalid {} URL: {}", what, e))
        };

        let oauth = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_uri(
                AuthUrl::new(config.authorize_url.clone()).map_err(|e| invalid("authorize", e))?,
            )
            .set_token_uri(TokenUrl::new(config.token_url.clone()).map_err(|e| invalid("token", e))?)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri.clone()).map_err(|e| invalid("redirect", e))?,
            )
            .set_auth_type(AuthType::RequestBody);

        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;

        Ok(Self {
            http,
            oauth,
            resource: config.resource.clone(),
        })
    }

    /// Builds the identity endpoint URL with a fresh random `state`
    pub fn authorize_url(&self) -> (Url, CsrfToken) {
        self.oauth
            .authorize_url(CsrfToken::new_random)
            .add_extra_param("resource", self.resource.as_str())
            .url()
    }

    /// Runs both phases and returns a token stamped with the local TTL
    pub async fn login(&self, credentials: &Credentials) -> Result<AuthToken, AuthError> {
        info!(username = %credentials.username, "Logging in to identity endpoint");

        let code = self.request_code(credentials).await?;
        let access_token = self.exchange_code(code).await?;

        info!(username = %credentials.username, "Login succeeded");
        Ok(AuthToken::issued_now(access_token))
    }

    /// Phase one: credentials in, authorization code out
    async fn request_code(&self, credentials: &Credentials) -> Result<String, AuthError> {
        let (url, _state) = self.authorize_url();
        let form = [
            ("UserName", credentials.username.as_str()),
            ("Password", credentials.password.as_str()),
            ("AuthMethod", "FormsAuthentication"),
        ];

        let first = self
            .http
            .post(url.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let mut replay = self.http.post(url.clone()).form(&form);
        if let Some(cookies) = cookie_header(first.headers()) {
            debug!("Replaying identity cookies");
            replay = replay.header(COOKIE, cookies);
        }

        let second = replay
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        code_from_redirect(&second, &url).ok_or_else(|| {
            AuthError::InvalidCredentials(format!(
                "identity endpoint answered {} without an authorization code",
                second.status()
            ))
        })
    }

    /// Phase two: authorization code in, bearer token out
    async fn exchange_code(&self, code: String) -> Result<String, AuthError> {
        debug!("Exchanging authorization code for token");

        let response = self
            .oauth
            .exchange_code(AuthorizationCode::new(code))
            .add_extra_param("resource", self.resource.as_str())
            .request_async(&self.http)
            .await
            .map_err(classify_token_error)?;

        let token = response.access_token().secret().to_string();
        if token.is_empty() {
            return Err(AuthError::UnexpectedResponseShape(
                "token endpoint returned an empty access_token".to_string(),
            ));
        }
        Ok(token)
    }
}

/// Joins the `name=value` part of every `Set-Cookie` header into a `Cookie` header
fn cookie_header(headers: &HeaderMap) -> Option<String> {
    let pairs: Vec<&str> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

/// Reads the `code` query parameter of the response's redirect target
fn code_from_redirect(response: &Response, base: &Url) -> Option<String> {
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    code_from_location(location, base)
}

fn code_from_location(location: &str, base: &Url) -> Option<String> {
    let target = base.join(location).ok()?;
    target
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
}

fn classify_token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> AuthError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            AuthError::InvalidCredentials(format!("token endpoint rejected code: {}", response))
        }
        RequestTokenError::Request(e) => AuthError::Network(e.to_string()),
        RequestTokenError::Parse(e, _body) => AuthError::UnexpectedResponseShape(e.to_string()),
        RequestTokenError::Other(message) => AuthError::UnexpectedResponseShape(message),
    }
}

// ============================================================================
// TokenBroker
// ============================================================================

/// In-memory token state guarded by the broker lock
#[derive(Default)]
struct TokenCache {
    token: Option<AuthToken>,
    /// Set once the persisted token has been consulted; a token dropped by
    /// [`TokenBroker::invalidate`] is not reloaded from the store
    store_checked: bool,
}

/// Hands out valid bearer tokens, logging in again when the cached one is stale
///
/// The cache lock is held for the duration of a login, so concurrent callers
/// wait for the in-flight login and then reuse its token instead of starting
/// their own.
pub struct TokenBroker {
    flow: LoginFlow,
    store: Arc<dyn ITokenStore>,
    cached: Mutex<TokenCache>,
    /// Number of network logins performed by this broker
    logins: AtomicU64,
}

impl TokenBroker {
    pub fn new(flow: LoginFlow, store: Arc<dyn ITokenStore>) -> Self {
        Self {
            flow,
            store,
            cached: Mutex::new(TokenCache::default()),
            logins: AtomicU64::new(0),
        }
    }

    /// Creates a broker straight from the `auth` configuration section
    pub fn from_config(config: &AuthConfig, store: Arc<dyn ITokenStore>) -> Result<Self, AuthError> {
        let flow = LoginFlow::new(&LoginConfig::from(config))?;
        Ok(Self::new(flow, store))
    }

    /// Logs in with `credentials` and replaces the cached token
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<AuthToken, AuthError> {
        let mut cached = self.cached.lock().await;
        let token = self.login_and_persist(credentials).await?;
        cached.token = Some(token.clone());
        cached.store_checked = true;
        Ok(token)
    }

    /// Returns a bearer token that is valid under the local TTL policy
    ///
    /// Order of preference: in-memory cache, persisted token, fresh login
    /// with the stored credentials.
    pub async fn get_valid_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;

        if !cached.store_checked {
            cached.store_checked = true;
            match self.store.load_token() {
                Ok(persisted) => cached.token = persisted,
                Err(e) => warn!(error = %e, "Failed to load persisted token"),
            }
        }

        if let Some(token) = cached.token.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.token.clone());
        }

        debug!("No valid token cached, re-authenticating");
        let credentials = self
            .store
            .load_credentials()
            .map_err(|e| AuthError::Storage(e.to_string()))?
            .ok_or(AuthError::MissingCredentials)?;

        let token = self.login_and_persist(&credentials).await?;
        let bearer = token.token.clone();
        cached.token = Some(token);
        Ok(bearer)
    }

    /// Drops the cached token so the next request logs in again
    ///
    /// Used when the API rejects a token that the local policy still
    /// considered valid.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.lock().await;
        cached.store_checked = true;
        if cached.token.take().is_some() {
            info!("Cached token invalidated");
        }
    }

    /// Number of network logins performed so far
    pub fn login_count(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    async fn login_and_persist(&self, credentials: &Credentials) -> Result<AuthToken, AuthError> {
        self.logins.fetch_add(1, Ordering::Relaxed);
        let token = self.flow.login(credentials).await?;

        // The in-memory token is still usable if persisting fails
        if let Err(e) = self.store.store_token(&token) {
            warn!(error = %e, "Failed to persist token");
        }
        Ok(token)
    }
}
