use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
};
use docuchat_chat::{
    config::Config,
    runtime::spawn_session,
    upload::{HttpUploader, UploadError, Uploader},
};
use docuchat_core::{ConnectionState, ReconnectPolicy, SessionSnapshot};
use serde_json::{Value, json};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{net::TcpListener, sync::watch};
use tracing::Level;

/// One multipart part as the server saw it.
#[derive(Debug, Clone, PartialEq)]
struct ReceivedPart {
    field: String,
    file_name: String,
    content_type: String,
    len: usize,
}

type Received = Arc<Mutex<Vec<ReceivedPart>>>;

async fn upload_pdfs(
    State(received): State<Received>,
    mut multipart: Multipart,
) -> Json<Value> {
    let mut uploaded = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let part = ReceivedPart {
            field: field.name().unwrap_or_default().to_string(),
            file_name: field.file_name().unwrap_or_default().to_string(),
            content_type: field.content_type().unwrap_or_default().to_string(),
            len: field.bytes().await.unwrap().len(),
        };
        uploaded.push(json!({
            "doc_id": format!("doc-{}", uploaded.len()),
            "filename": part.file_name,
            "num_chunks": 1,
        }));
        received.lock().unwrap().push(part);
    }
    Json(json!({ "status": "success", "uploaded_files": uploaded }))
}

async fn reject() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Serves `/upload_pdfs/` and returns its URL and the parts it receives.
async fn upload_server(accept: bool) -> (String, Received) {
    let received = Received::default();
    let app = if accept {
        Router::new().route("/upload_pdfs/", post(upload_pdfs))
    } else {
        Router::new().route("/upload_pdfs/", post(reject))
    }
    .with_state(received.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/upload_pdfs/", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (url, received)
}

/// A WebSocket URL nobody listens on; the session keeps retrying in the background.
async fn dead_ws_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    drop(listener);
    url
}

fn write_docs(dir: &tempfile::TempDir) -> Vec<PathBuf> {
    let pdf = dir.path().join("paper.pdf");
    let txt = dir.path().join("notes.txt");
    std::fs::write(&pdf, b"%PDF-1.4 fake").unwrap();
    std::fs::write(&txt, b"plain notes").unwrap();
    vec![pdf, txt]
}

async fn wait_for_status(
    snapshots: &mut watch::Receiver<SessionSnapshot>,
    status: &str,
) -> SessionSnapshot {
    tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|s| s.upload_status == status),
    )
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for upload status {status:?}"))
    .expect("session task ended")
    .clone()
}

async fn config(upload_url: String) -> Config {
    Config {
        ws_url: dead_ws_url().await,
        upload_url,
        reconnect: ReconnectPolicy::Fixed(Duration::from_secs(60)),
        greeting: None,
        log_level: Level::INFO,
    }
}

#[tokio::test]
async fn test_http_uploader_sends_files_field() {
    let (url, received) = upload_server(true).await;
    let dir = tempfile::tempdir().unwrap();
    let files = write_docs(&dir);

    let receipt = HttpUploader::new(url).upload(&files).await.unwrap();

    assert_eq!(receipt.status, "success");
    assert_eq!(receipt.uploaded_files.len(), 2);
    assert_eq!(receipt.uploaded_files[0].filename, "paper.pdf");
    assert_eq!(
        *received.lock().unwrap(),
        vec![
            ReceivedPart {
                field: "files".to_string(),
                file_name: "paper.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                len: 13,
            },
            ReceivedPart {
                field: "files".to_string(),
                file_name: "notes.txt".to_string(),
                content_type: "text/plain".to_string(),
                len: 11,
            },
        ]
    );
}

#[tokio::test]
async fn test_http_uploader_reports_rejection() {
    let (url, _) = upload_server(false).await;
    let dir = tempfile::tempdir().unwrap();
    let files = write_docs(&dir);

    let err = HttpUploader::new(url).upload(&files).await.unwrap_err();
    match err {
        UploadError::Status(status) => assert_eq!(status.as_u16(), 500),
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn test_session_upload_completes_while_chat_is_down() {
    let (url, received) = upload_server(true).await;
    let dir = tempfile::tempdir().unwrap();
    let files = write_docs(&dir);
    let config = config(url.clone()).await;
    let session = spawn_session(&config, Arc::new(HttpUploader::new(url)));
    let mut snapshots = session.subscribe();

    session.select_files(files).await.unwrap();
    session.upload().await.unwrap();
    let snapshot = wait_for_status(&mut snapshots, "Upload Complete!").await;

    assert_eq!(snapshot.selected_file.as_deref(), Some("paper.pdf"));
    assert_ne!(snapshot.connection, ConnectionState::Open);
    assert_eq!(received.lock().unwrap().len(), 2);

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_session_upload_failure_sets_error_status() {
    let (url, _) = upload_server(false).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(url.clone()).await;
    let session = spawn_session(&config, Arc::new(HttpUploader::new(url)));
    let mut snapshots = session.subscribe();

    session.select_files(write_docs(&dir)).await.unwrap();
    session.upload().await.unwrap();
    wait_for_status(&mut snapshots, "Error uploading files.").await;

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_session_upload_without_selection() {
    let (url, received) = upload_server(true).await;
    let config = config(url.clone()).await;
    let session = spawn_session(&config, Arc::new(HttpUploader::new(url)));
    let mut snapshots = session.subscribe();

    session.upload().await.unwrap();
    let snapshot = wait_for_status(&mut snapshots, "No files selected.").await;

    assert_eq!(snapshot.selected_file, None);
    assert!(received.lock().unwrap().is_empty());

    session.shutdown().await.unwrap();
}
