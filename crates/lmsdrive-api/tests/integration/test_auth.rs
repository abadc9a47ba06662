//! Integration tests for the two-phase login and the token broker

use std::sync::Arc;

use chrono::{Duration, Utc};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lmsdrive_api::auth::{LoginFlow, TokenBroker};
use lmsdrive_core::domain::{AuthError, AuthToken, Credentials, TOKEN_TTL_SECS};
use lmsdrive_core::ports::{ITokenStore, MemoryTokenStore};

use crate::common;

fn credentials() -> Credentials {
    Credentials::new("e0123456", "hunter2")
}

#[tokio::test]
async fn test_login_returns_token_with_local_ttl() {
    let server = MockServer::start().await;
    common::mount_login(&server, "tok-1").await;

    let flow = LoginFlow::new(&common::login_config(&server)).unwrap();
    let before = Utc::now();
    let token = flow.login(&credentials()).await.expect("login failed");

    assert_eq!(token.token, "tok-1");
    let ttl = token.expires_at - before;
    assert!(ttl >= Duration::seconds(TOKEN_TTL_SECS));
    assert!(ttl < Duration::seconds(TOKEN_TTL_SECS + 60));
}

#[tokio::test]
async fn test_login_posts_form_and_exchanges_code() {
    let server = MockServer::start().await;
    common::mount_identity(&server).await;

    Mock::given(method("POST"))
        .and(path(common::TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .and(body_string_contains("resource=lms_resource"))
        .and(body_string_contains("client_id=client-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "tok-exchanged",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let flow = LoginFlow::new(&common::login_config(&server)).unwrap();
    let token = flow.login(&credentials()).await.unwrap();
    assert_eq!(token.token, "tok-exchanged");
}

#[tokio::test]
async fn test_login_without_redirect_is_invalid_credentials() {
    let server = MockServer::start().await;

    // The identity endpoint re-renders the login form instead of redirecting
    Mock::given(method("POST"))
        .and(path(common::AUTHORIZE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<form>Incorrect user ID or password</form>"))
        .mount(&server)
        .await;

    let flow = LoginFlow::new(&common::login_config(&server)).unwrap();
    let err = flow.login(&credentials()).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials(_)), "got {err:?}");
}

#[tokio::test]
async fn test_token_endpoint_rejection_is_invalid_credentials() {
    let server = MockServer::start().await;
    common::mount_identity(&server).await;

    Mock::given(method("POST"))
        .and(path(common::TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "code expired"
        })))
        .mount(&server)
        .await;

    let flow = LoginFlow::new(&common::login_config(&server)).unwrap();
    let err = flow.login(&credentials()).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials(_)), "got {err:?}");
}

#[tokio::test]
async fn test_token_response_without_access_token_is_shape_error() {
    let server = MockServer::start().await;
    common::mount_identity(&server).await;

    Mock::given(method("POST"))
        .and(path(common::TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id_token": "not-what-we-need"
        })))
        .mount(&server)
        .await;

    let flow = LoginFlow::new(&common::login_config(&server)).unwrap();
    let err = flow.login(&credentials()).await.unwrap_err();
    assert!(matches!(err, AuthError::UnexpectedResponseShape(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unreachable_identity_endpoint_is_network_error() {
    let server = MockServer::start().await;
    let config = common::login_config(&server);
    drop(server);

    let flow = LoginFlow::new(&config).unwrap();
    let err = flow.login(&credentials()).await.unwrap_err();
    assert!(matches!(err, AuthError::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn test_broker_reuses_token_within_ttl() {
    let server = MockServer::start().await;
    common::mount_identity(&server).await;
    Mock::given(method("POST"))
        .and(path(common::TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "tok-1",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let broker = common::broker(&server);
    let first = broker.get_valid_token().await.unwrap();
    let second = broker.get_valid_token().await.unwrap();

    assert_eq!(first, "tok-1");
    assert_eq!(first, second);
    assert_eq!(broker.login_count(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_login() {
    let server = MockServer::start().await;
    common::mount_login(&server, "tok-shared").await;

    let broker = Arc::new(common::broker(&server));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let broker = Arc::clone(&broker);
        handles.push(tokio::spawn(async move { broker.get_valid_token().await }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "tok-shared");
    }
    assert_eq!(broker.login_count(), 1);
}

#[tokio::test]
async fn test_persisted_valid_token_skips_login() {
    let server = MockServer::start().await;
    let store = MemoryTokenStore::with_credentials(credentials());
    store.store_token(&AuthToken::issued_now("persisted")).unwrap();

    let flow = LoginFlow::new(&common::login_config(&server)).unwrap();
    let broker = TokenBroker::new(flow, Arc::new(store));

    assert_eq!(broker.get_valid_token().await.unwrap(), "persisted");
    assert_eq!(broker.login_count(), 0);
}

#[tokio::test]
async fn test_token_inside_refresh_margin_triggers_login() {
    let server = MockServer::start().await;
    common::mount_login(&server, "tok-fresh").await;

    // Thirty minutes of lifetime left
    let store = Arc::new(MemoryTokenStore::with_credentials(credentials()));
    let stale = AuthToken::issued_at("tok-stale", Utc::now() - Duration::minutes(23 * 60 + 30));
    store.store_token(&stale).unwrap();

    let flow = LoginFlow::new(&common::login_config(&server)).unwrap();
    let broker = TokenBroker::new(flow, store.clone());

    assert_eq!(broker.get_valid_token().await.unwrap(), "tok-fresh");
    assert_eq!(broker.login_count(), 1);
    assert_eq!(store.load_token().unwrap().unwrap().token, "tok-fresh");
}

#[tokio::test]
async fn test_missing_credentials() {
    let server = MockServer::start().await;
    let flow = LoginFlow::new(&common::login_config(&server)).unwrap();
    let broker = TokenBroker::new(flow, Arc::new(MemoryTokenStore::new()));

    assert_eq!(
        broker.get_valid_token().await.unwrap_err(),
        AuthError::MissingCredentials
    );
    assert_eq!(broker.login_count(), 0);
}

#[tokio::test]
async fn test_invalidate_forces_new_login() {
    let server = MockServer::start().await;
    common::mount_login(&server, "tok-1").await;

    let store = Arc::new(MemoryTokenStore::with_credentials(credentials()));
    let flow = LoginFlow::new(&common::login_config(&server)).unwrap();
    let broker = TokenBroker::new(flow, store);

    broker.get_valid_token().await.unwrap();
    broker.invalidate().await;
    broker.get_valid_token().await.unwrap();

    // The rejected token was persisted too, but must not be reloaded
    assert_eq!(broker.login_count(), 2);
}

#[tokio::test]
async fn test_authenticate_replaces_cached_token() {
    let server = MockServer::start().await;
    common::mount_login(&server, "tok-explicit").await;

    let broker = TokenBroker::new(
        LoginFlow::new(&common::login_config(&server)).unwrap(),
        Arc::new(MemoryTokenStore::new()),
    );

    let token = broker.authenticate(&credentials()).await.unwrap();
    assert_eq!(token.token, "tok-explicit");
    // No stored credentials are needed while the cached token is valid
    assert_eq!(broker.get_valid_token().await.unwrap(), "tok-explicit");
    assert_eq!(broker.login_count(), 1);
}
