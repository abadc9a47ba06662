//! Integration tests for download URL resolution and content fetch

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lmsdrive_api::download::{content_client, download_to_path, STALL_TIMEOUT};
use lmsdrive_api::LmsDocumentSource;
use lmsdrive_core::domain::DownloadError;
use lmsdrive_core::ports::IDocumentSource;

use crate::common;

#[tokio::test]
async fn test_resolve_and_download() {
    let server = MockServer::start().await;
    common::mount_login(&server, "tok-1").await;

    let content_url = format!("{}/content/F1?sig=abc", server.uri());
    Mock::given(method("GET"))
        .and(path("/api/files/file/F1/downloadurl"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::envelope(serde_json::json!(content_url), 0, 0)),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/content/F1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 lecture".to_vec()))
        .mount(&server)
        .await;

    let source = LmsDocumentSource::new(
        common::api_client(&server),
        Arc::new(common::broker(&server)),
    )
    .unwrap();

    let url = source.resolve_download_url("F1").await.unwrap();
    assert_eq!(url, content_url);

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("CS1010").join("Lectures").join("week1.pdf");
    let written = source.download(&url, &dest).await.unwrap();

    assert_eq!(written, 16);
    assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.7 lecture");
    assert!(!dir.path().join("CS1010/Lectures/week1.pdf.part").exists());
}

#[tokio::test]
async fn test_download_replaces_existing_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/content/F1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"v2".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("notes.txt");
    std::fs::write(&dest, b"version one, longer").unwrap();

    let client = reqwest::Client::new();
    download_to_path(&client, &format!("{}/content/F1", server.uri()), &dest, STALL_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), b"v2");
}

#[tokio::test]
async fn test_download_not_found_leaves_destination_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/content/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("sub").join("gone.pdf");

    let client = reqwest::Client::new();
    let err = download_to_path(&client, &format!("{}/content/gone", server.uri()), &dest, STALL_TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err, DownloadError::NonSuccessStatus { status: 404 });
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_download_into_unwritable_location() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/content/F1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    // A regular file where a directory is needed
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();
    let dest = blocker.join("child.pdf");

    let client = reqwest::Client::new();
    let err = download_to_path(&client, &format!("{}/content/F1", server.uri()), &dest, STALL_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::FilesystemWrite { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_stalled_download_fails_and_cleans_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/content/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("slow.pdf");

    let client = content_client().unwrap();
    let err = download_to_path(
        &client,
        &format!("{}/content/slow", server.uri()),
        &dest,
        Duration::from_millis(200),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DownloadError::Network(_)), "got {err:?}");
    assert!(!dest.exists());
    assert!(!dir.path().join("slow.pdf.part").exists());
}

#[tokio::test]
async fn test_resolve_unknown_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files/file/nope/downloadurl"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = common::api_client(&server)
        .resolve_download_url("t", "nope")
        .await
        .unwrap_err();
    assert_eq!(err, DownloadError::NonSuccessStatus { status: 404 });
}
