//! Integration tests for folder and file listings

use std::sync::Arc;

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lmsdrive_api::LmsDocumentSource;
use lmsdrive_core::domain::DiscoveryError;
use lmsdrive_core::ports::IDocumentSource;

use crate::common;

#[tokio::test]
async fn test_list_folders_reports_access_and_flags() {
    let server = MockServer::start().await;
    let mut hidden = common::folder_json("D3", "Staff Only", true, false);
    hidden.as_object_mut().unwrap().remove("access");

    Mock::given(method("GET"))
        .and(path("/api/files/"))
        .and(query_param("ParentID", "mod-1"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::envelope(
            serde_json::json!([
                common::folder_json("D1", "Lectures", true, false),
                common::folder_json("D2", "Submissions", true, true),
                hidden,
            ]),
            3,
            0,
        )))
        .mount(&server)
        .await;

    let folders = common::api_client(&server)
        .list_folders("tok-1", "mod-1")
        .await
        .expect("list_folders failed");

    let ids: Vec<&str> = folders.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["D1", "D2", "D3"]);
    assert!(folders[0].has_access && !folders[0].allow_upload);
    assert!(folders[1].allow_upload);
    assert!(!folders[2].has_access);
}

#[tokio::test]
async fn test_list_folders_treats_null_access_as_present() {
    let server = MockServer::start().await;
    let mut folder = common::folder_json("D1", "Lectures", true, false);
    folder["access"] = serde_json::Value::Null;

    Mock::given(method("GET"))
        .and(path("/api/files/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::envelope(serde_json::json!([folder]), 1, 0)),
        )
        .mount(&server)
        .await;

    let folders = common::api_client(&server).list_folders("t", "mod-1").await.unwrap();
    assert_eq!(folders.len(), 1);
    assert!(folders[0].has_access);
}

#[tokio::test]
async fn test_malformed_visible_folder_is_shape_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::envelope(
            serde_json::json!([{ "id": "D1", "name": "Lectures", "access": {} }]),
            1,
            0,
        )))
        .mount(&server)
        .await;

    let err = common::api_client(&server)
        .list_folders("t", "mod-1")
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::UnexpectedPayloadShape(_)), "got {err:?}");
}

#[tokio::test]
async fn test_list_files_follows_pagination() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/files/D1/file"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::envelope(
            serde_json::json!([common::file_json("F3", "c.pdf", "2023-03-01T00:00:00Z")]),
            3,
            2,
        )))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/files/D1/file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::envelope(
            serde_json::json!([
                common::file_json("F1", "a.pdf", "2023-01-01T00:00:00Z"),
                common::file_json("F2", "b.pdf", "2023-02-01T00:00:00+08:00"),
            ]),
            3,
            0,
        )))
        .with_priority(5)
        .expect(1)
        .mount(&server)
        .await;

    let files = common::api_client(&server).list_files("t", "D1").await.unwrap();

    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
    assert_eq!(files[0].last_updated.timestamp(), 1_672_531_200);
}

#[tokio::test]
async fn test_empty_folder_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files/D9/file"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::envelope(serde_json::json!([]), 0, 0)),
        )
        .mount(&server)
        .await;

    let files = common::api_client(&server).list_files("t", "D9").await.unwrap();
    assert!(files.is_empty());
}

#[tokio::test]
async fn test_unparseable_timestamp_fails_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files/D1/file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::envelope(
            serde_json::json!([
                common::file_json("F1", "a.pdf", "2023-01-01T00:00:00Z"),
                common::file_json("F2", "b.pdf", "last tuesday"),
            ]),
            2,
            0,
        )))
        .mount(&server)
        .await;

    let err = common::api_client(&server).list_files("t", "D1").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::UnexpectedPayloadShape(_)), "got {err:?}");
}

#[tokio::test]
async fn test_non_json_body_is_shape_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files/D1/file"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = common::api_client(&server).list_files("t", "D1").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::UnexpectedPayloadShape(_)), "got {err:?}");
}

#[tokio::test]
async fn test_rejected_token_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = common::api_client(&server).list_folders("expired", "mod-1").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Auth(_)), "got {err:?}");
}

#[tokio::test]
async fn test_server_error_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = common::api_client(&server).list_folders("t", "mod-1").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn test_subscription_key_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files/D1/file"))
        .and(header("Ocp-Apim-Subscription-Key", "sub-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::envelope(serde_json::json!([]), 0, 0)),
        )
        .expect(1)
        .mount(&server)
        .await;

    common::api_client(&server)
        .with_subscription_key("sub-key")
        .list_files("t", "D1")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_source_logs_in_again_after_rejection() {
    let server = MockServer::start().await;
    common::mount_login(&server, "tok-1").await;

    Mock::given(method("GET"))
        .and(path("/api/files/D1/file"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/files/D1/file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::envelope(
            serde_json::json!([common::file_json("F1", "a.pdf", "2023-01-01T00:00:00Z")]),
            1,
            0,
        )))
        .with_priority(5)
        .mount(&server)
        .await;

    let broker = Arc::new(common::broker(&server));
    let source = LmsDocumentSource::new(common::api_client(&server), broker.clone()).unwrap();

    let files = source.list_files("D1").await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(broker.login_count(), 2);
}

#[tokio::test]
async fn test_source_authenticate_logs_in_once() {
    let server = MockServer::start().await;
    common::mount_login(&server, "tok-1").await;

    let broker = Arc::new(common::broker(&server));
    let source = LmsDocumentSource::new(common::api_client(&server), broker.clone()).unwrap();

    source.authenticate().await.unwrap();
    source.authenticate().await.unwrap();
    assert_eq!(broker.login_count(), 1);
}
