mod support;

use std::time::Duration;

use axum::http::StatusCode;
use photoref_client::{PhotoFile, RawImageReference, UploadError};
use serde_json::json;
use support::{TOKEN, TestBackend};

const CHILD_PATH: &str = "/children/5/photo";
const PARENT_PATH: &str = "/users/parent-photo";

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];

fn png_base64() -> String {
    format!("iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJ{}", "A".repeat(40))
}

fn padded(magic: &[u8]) -> Vec<u8> {
    let mut bytes = magic.to_vec();
    bytes.extend_from_slice(&[0x11; 64]);
    bytes
}

#[tokio::test]
async fn concurrent_resolutions_share_one_request() {
    let backend = TestBackend::start().await.unwrap();
    backend.set_photo(CHILD_PATH, "text/plain", png_base64());
    backend.set_delay(Duration::from_millis(150));
    let resolver = backend.resolver(Some(TOKEN)).await;
    let raw = RawImageReference::from(CHILD_PATH);

    let (first, second) = tokio::join!(
        resolver.child_photo_source(5, &raw),
        resolver.child_photo_source(5, &raw)
    );

    let first = first.expect("first caller resolves");
    assert_eq!(Some(first.clone()), second);
    assert_eq!(first.uri, format!("data:image/png;base64,{}", png_base64()));
    assert_eq!(backend.hits(CHILD_PATH), 1);

    let stats = resolver.stats();
    assert_eq!(stats.leaders, 1);
    assert_eq!(stats.waiters, 1);
}

#[tokio::test]
async fn absolute_url_is_returned_with_bearer_and_never_fetched() {
    let backend = TestBackend::start().await.unwrap();
    let resolver = backend.resolver(Some(TOKEN)).await;

    let source = resolver
        .parent_photo_source(&RawImageReference::from(
            "https://cdn.example.com/a.png",
        ))
        .await
        .unwrap();

    assert_eq!(source.uri, "https://cdn.example.com/a.png");
    assert_eq!(
        source.authorization(),
        Some(format!("Bearer {TOKEN}").as_str())
    );
    assert_eq!(backend.total_hits(), 0);
}

#[tokio::test]
async fn upload_invalidates_and_next_resolution_refetches() {
    let backend = TestBackend::start().await.unwrap();
    backend.set_photo(CHILD_PATH, "text/plain", png_base64());
    let resolver = backend.resolver(Some(TOKEN)).await;
    let raw = RawImageReference::from(CHILD_PATH);

    let before = resolver.child_photo_source(5, &raw).await.unwrap();
    assert!(before.uri.starts_with("data:image/png;base64,"));
    resolver.child_photo_source(5, &raw).await.unwrap();
    assert_eq!(backend.hits(CHILD_PATH), 1);

    let body = resolver
        .upload_child_photo(5, PhotoFile::new(padded(&JPEG_MAGIC)))
        .await
        .unwrap();
    assert_eq!(body, Some(json!({ "photo_url": CHILD_PATH })));

    let after = resolver.child_photo_source(5, &raw).await.unwrap();
    assert_eq!(backend.hits(CHILD_PATH), 2);
    assert!(after.uri.starts_with("data:image/jpeg;base64,/9j/"));

    let uploads = backend.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].path, CHILD_PATH);
    assert_eq!(uploads[0].file_name.as_deref(), Some("photo.jpg"));
    assert_eq!(uploads[0].content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(uploads[0].child_id, None);
}

#[tokio::test]
async fn json_wrapped_payload_mislabeled_as_image() {
    let backend = TestBackend::start().await.unwrap();
    let wrapped = json!({ "data": format!("data:image/jpeg;base64,{}", png_base64()) });
    backend.set_photo(PARENT_PATH, "image/jpeg", wrapped.to_string());
    let resolver = backend.resolver(Some(TOKEN)).await;

    let source = resolver
        .parent_photo_source(&RawImageReference::from(PARENT_PATH))
        .await
        .unwrap();
    assert_eq!(source.uri, format!("data:image/png;base64,{}", png_base64()));
    assert_eq!(source.headers, None);
}

#[tokio::test]
async fn binary_body_is_encoded_and_sniffed() {
    let backend = TestBackend::start().await.unwrap();
    backend.set_photo(CHILD_PATH, "image/jpeg", padded(&PNG_MAGIC));
    let resolver = backend.resolver(Some(TOKEN)).await;

    let source = resolver
        .child_photo_source(5, &RawImageReference::from(CHILD_PATH))
        .await
        .unwrap();
    assert!(source.uri.starts_with("data:image/png;base64,iVBORw0KGgo"));
}

#[tokio::test]
async fn error_status_resolves_to_none_and_is_retried() {
    let backend = TestBackend::start().await.unwrap();
    let resolver = backend.resolver(Some(TOKEN)).await;
    let raw = RawImageReference::from("/children/404/photo");

    assert_eq!(resolver.child_photo_source(404, &raw).await, None);
    assert_eq!(resolver.child_photo_source(404, &raw).await, None);
    assert_eq!(backend.hits("/children/404/photo"), 2);
    assert!(resolver.cache().is_empty());
}

#[tokio::test]
async fn rejected_token_resolves_to_none() {
    let backend = TestBackend::start().await.unwrap();
    backend.set_photo(CHILD_PATH, "text/plain", png_base64());
    let resolver = backend.resolver(Some("stale-token")).await;

    let source = resolver
        .child_photo_source(5, &RawImageReference::from(CHILD_PATH))
        .await;
    assert_eq!(source, None);
    assert_eq!(backend.hits(CHILD_PATH), 1);
}

#[tokio::test]
async fn missing_session_makes_no_request() {
    let backend = TestBackend::start().await.unwrap();
    backend.set_photo(CHILD_PATH, "text/plain", png_base64());
    let resolver = backend.resolver(None).await;

    let source = resolver
        .child_photo_source(5, &RawImageReference::from(CHILD_PATH))
        .await;
    assert_eq!(source, None);
    assert_eq!(backend.total_hits(), 0);
}

#[tokio::test]
async fn json_quoted_data_uri_resolves_inline() {
    let backend = TestBackend::start().await.unwrap();
    let resolver = backend.resolver(Some(TOKEN)).await;
    let quoted = format!("\"data:image/png;base64,{}\"", png_base64());

    let source = resolver
        .build_source(&RawImageReference::from(quoted), None)
        .await
        .unwrap();
    assert_eq!(source.uri, format!("data:image/png;base64,{}", png_base64()));
    assert_eq!(backend.total_hits(), 0);
}

#[tokio::test]
async fn base_prefixed_reference_is_fetched_as_protected_path() {
    let backend = TestBackend::start().await.unwrap();
    backend.set_photo(PARENT_PATH, "text/plain", png_base64());
    let resolver = backend.resolver(Some(TOKEN)).await;

    let relative = resolver
        .parent_photo_source(&RawImageReference::from(PARENT_PATH))
        .await
        .unwrap();
    let absolute = format!("{}{PARENT_PATH}", backend.base_url);
    assert_eq!(
        resolver.to_protected_path(Some(absolute.as_str()), None),
        Some(PARENT_PATH.to_string())
    );
    assert!(resolver.invalidate(&absolute));

    let refetched = resolver
        .parent_photo_source(&RawImageReference::from(PARENT_PATH))
        .await
        .unwrap();
    assert_eq!(relative, refetched);
    assert_eq!(backend.hits(PARENT_PATH), 2);
}

#[tokio::test]
async fn parent_upload_sends_file_metadata() {
    let backend = TestBackend::start().await.unwrap();
    let resolver = backend.resolver(Some(TOKEN)).await;

    let file = PhotoFile::new(padded(&PNG_MAGIC))
        .named("me.png")
        .with_mime_type("image/png");
    resolver.upload_parent_photo(file).await.unwrap();

    let uploads = backend.uploads();
    assert_eq!(uploads[0].path, PARENT_PATH);
    assert_eq!(uploads[0].file_name.as_deref(), Some("me.png"));
    assert_eq!(uploads[0].content_type.as_deref(), Some("image/png"));
    assert_eq!(uploads[0].len, PNG_MAGIC.len() + 64);
}

#[tokio::test]
async fn upload_with_child_id_field() {
    let backend = TestBackend::start().await.unwrap();
    let resolver = backend.resolver(Some(TOKEN)).await;

    resolver
        .upload_photo(PARENT_PATH, PhotoFile::new(padded(&JPEG_MAGIC)), Some("7"))
        .await
        .unwrap();
    assert_eq!(backend.uploads()[0].child_id.as_deref(), Some("7"));
}

#[tokio::test]
async fn rejected_upload_reports_backend_detail() {
    let backend = TestBackend::start().await.unwrap();
    backend.set_photo(CHILD_PATH, "text/plain", png_base64());
    backend.reject_uploads(
        StatusCode::UNPROCESSABLE_ENTITY,
        json!({ "detail": [{ "msg": "File too large" }, { "msg": "Unsupported type" }] }),
    );
    let resolver = backend.resolver(Some(TOKEN)).await;
    let raw = RawImageReference::from(CHILD_PATH);
    resolver.child_photo_source(5, &raw).await.unwrap();

    let err = resolver
        .upload_child_photo(5, PhotoFile::new(padded(&JPEG_MAGIC)))
        .await
        .unwrap_err();
    match &err {
        UploadError::Rejected { status, message, .. } => {
            assert_eq!(*status, 422);
            assert_eq!(message, "File too large\nUnsupported type");
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    resolver.child_photo_source(5, &raw).await.unwrap();
    assert_eq!(backend.hits(CHILD_PATH), 1);
}

#[tokio::test]
async fn upload_without_session_is_session_expired() {
    let backend = TestBackend::start().await.unwrap();
    let resolver = backend.resolver(None).await;

    let err = resolver
        .upload_parent_photo(PhotoFile::new(padded(&JPEG_MAGIC)))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Session expired. Please log in again.");
    assert!(backend.uploads().is_empty());
}
