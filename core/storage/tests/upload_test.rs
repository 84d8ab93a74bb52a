//! Contract tests for multipart evidence uploads.
//!
//! ## Endpoints Tested
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | POST   | `/upload/drive/v3/files?uploadType=multipart` | `upload_*` |
//! | POST   | `/drive/v3/files/{id}/permissions` | `share_*` |
//! | GET    | `/drive/v3/files/{id}?fields=webViewLink` | `share_*` |

mod common;

use accredify_common::{AuthorizationToken, Error};
use accredify_storage::gdrive::multipart::split_parts;
use common::client_for;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token() -> AuthorizationToken {
    AuthorizationToken::new("test-token")
}

async fn mount_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .and(query_param("fields", "id,name,mimeType,webViewLink"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "1XYZ789",
            "name": "calibration.pdf",
            "mimeType": "application/pdf",
            "webViewLink": "https://drive.google.com/file/d/1XYZ789/view"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn upload_returns_canonical_file_ref() {
    let server = MockServer::start().await;
    mount_success(&server).await;

    let client = client_for(&server);
    let file = client
        .upload_file(&token(), "leaf", b"%PDF-1.7", "calibration.pdf", Some("application/pdf"))
        .await
        .unwrap();

    assert_eq!(file.id, "1XYZ789");
    assert_eq!(file.name, "calibration.pdf");
    assert_eq!(file.mime_type, "application/pdf");
    assert_eq!(
        file.view_link.as_deref(),
        Some("https://drive.google.com/file/d/1XYZ789/view")
    );
}

#[tokio::test]
async fn upload_body_has_metadata_then_content_with_header_boundary() {
    let server = MockServer::start().await;
    mount_success(&server).await;

    let content: Vec<u8> = (0..=255u8).cycle().take(2048).collect();
    let client = client_for(&server);
    client
        .upload_file(&token(), "leaf-42", &content, "calibration.pdf", Some("application/pdf"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let content_type = request
        .headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let boundary = content_type
        .strip_prefix("multipart/related; boundary=")
        .expect("multipart/related content type");

    let parts = split_parts(&request.body, boundary);
    assert_eq!(parts.len(), 2);

    let (meta_headers, meta_payload) = parts[0];
    assert_eq!(meta_headers, b"Content-Type: application/json; charset=UTF-8");
    let metadata: serde_json::Value = serde_json::from_slice(meta_payload).unwrap();
    assert_eq!(
        metadata,
        serde_json::json!({"name": "calibration.pdf", "parents": ["leaf-42"]})
    );

    let (content_headers, content_payload) = parts[1];
    assert_eq!(content_headers, b"Content-Type: application/pdf");
    assert_eq!(content_payload, content.as_slice());

    assert!(request
        .body
        .ends_with(format!("--{}--\r\n", boundary).as_bytes()));
    assert_eq!(
        request.headers.get("authorization").unwrap().to_str().unwrap(),
        "Bearer test-token"
    );
}

#[tokio::test]
async fn upload_defaults_to_octet_stream() {
    let server = MockServer::start().await;
    mount_success(&server).await;

    let client = client_for(&server);
    client
        .upload_file(&token(), "leaf", b"raw", "blob.bin", None)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0].headers.get("content-type").unwrap().to_str().unwrap();
    let boundary = content_type.strip_prefix("multipart/related; boundary=").unwrap();
    let parts = split_parts(&requests[0].body, boundary);
    assert_eq!(parts[1].0, b"Content-Type: application/octet-stream");
}

#[tokio::test]
async fn upload_uses_fresh_boundary_per_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "f", "name": "a.txt", "mimeType": "text/plain"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.upload_file(&token(), "leaf", b"a", "a.txt", Some("text/plain")).await.unwrap();
    client.upload_file(&token(), "leaf", b"a", "a.txt", Some("text/plain")).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let first = requests[0].headers.get("content-type").unwrap();
    let second = requests[1].headers.get("content-type").unwrap();
    assert_ne!(first, second);
}

#[tokio::test]
async fn upload_handles_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "error": {"code": 500, "message": "Backend Error"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    match client.upload_file(&token(), "leaf", b"x", "x.txt", None).await {
        Err(Error::UploadFailed(msg)) => {
            assert!(msg.contains("500"), "{msg}");
            assert!(msg.contains("Backend Error"), "{msg}");
        }
        other => panic!("expected UploadFailed, got: {other:?}"),
    }
}

#[tokio::test]
async fn upload_without_view_link_still_parses() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "f", "name": "a.txt", "mimeType": "text/plain"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let file = client.upload_file(&token(), "leaf", b"a", "a.txt", None).await.unwrap();
    assert!(file.view_link.is_none());
}

// ── Link sharing ─────────────────────────────────────────────────────

#[tokio::test]
async fn share_grants_anyone_reader_and_returns_link() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files/1XYZ789/permissions"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(serde_json::json!({ "type": "anyone", "role": "reader" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "anyoneWithLink"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/1XYZ789"))
        .and(query_param("fields", "webViewLink"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "webViewLink": "https://drive.google.com/file/d/1XYZ789/view?usp=sharing"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let link = client_for(&server)
        .share_with_link(&token(), "1XYZ789")
        .await
        .unwrap();
    assert_eq!(
        link.as_deref(),
        Some("https://drive.google.com/file/d/1XYZ789/view?usp=sharing")
    );
}

#[tokio::test]
async fn share_rejected_is_upload_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files/1XYZ789/permissions"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "error": {"code": 403, "message": "The user does not have sufficient permissions"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/1XYZ789"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = client_for(&server).share_with_link(&token(), "1XYZ789").await;
    match result {
        Err(Error::UploadFailed(detail)) => {
            assert!(detail.contains("403"));
            assert!(detail.contains("sufficient permissions"));
        }
        other => panic!("expected UploadFailed, got: {other:?}"),
    }
}
