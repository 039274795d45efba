#![allow(dead_code)]

//! In-process photo backend for integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::{
        HeaderMap, StatusCode, Uri,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use photoref_client::{
    HttpTransport, ImageResolver, ResolutionCache, ResolverConfig, SessionStore,
    TokenExpiry,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const TOKEN: &str = "test-session-token";

#[derive(Debug, Clone)]
pub struct StoredPhoto {
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub path: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub len: usize,
    pub child_id: Option<String>,
}

#[derive(Debug, Default)]
struct BackendState {
    photos: Mutex<HashMap<String, StoredPhoto>>,
    hits: Mutex<HashMap<String, usize>>,
    uploads: Mutex<Vec<UploadRecord>>,
    delay: Mutex<Option<Duration>>,
    upload_rejection: Mutex<Option<(StatusCode, Value)>>,
}

/// A backend serving protected photos at `/users/parent-photo` and
/// `/children/{id}/photo`, counting every GET per path.
pub struct TestBackend {
    pub base_url: String,
    state: Arc<BackendState>,
    server: JoinHandle<()>,
}

impl TestBackend {
    pub async fn start() -> Result<Self> {
        let state = Arc::new(BackendState::default());
        let app = Router::new()
            .route("/users/parent-photo", get(serve_photo).post(receive_upload))
            .route("/children/{id}/photo", get(serve_photo).post(receive_upload))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            state,
            server,
        })
    }

    pub fn set_photo(&self, path: &str, content_type: &str, body: impl Into<Vec<u8>>) {
        self.state.photos.lock().unwrap().insert(
            path.to_string(),
            StoredPhoto {
                content_type: content_type.to_string(),
                body: body.into(),
            },
        );
    }

    /// Hold every GET for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = Some(delay);
    }

    pub fn reject_uploads(&self, status: StatusCode, body: Value) {
        *self.state.upload_rejection.lock().unwrap() = Some((status, body));
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.state.hits.lock().unwrap().values().sum()
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.state.uploads.lock().unwrap().clone()
    }

    /// Resolver wired to this backend through the reqwest transport, with a
    /// fresh cache. `token` is saved into its session when given.
    pub async fn resolver(&self, token: Option<&str>) -> ImageResolver {
        let config = ResolverConfig::new(&self.base_url).expect("valid base url");
        let session = Arc::new(SessionStore::new());
        if let Some(token) = token {
            session.save_token(token, TokenExpiry::Default).await;
        }
        // Loopback traffic must not be routed through a proxy from the
        // environment.
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("http client");
        ImageResolver::new(
            config,
            Arc::new(ResolutionCache::new()),
            session,
            Arc::new(HttpTransport::with_client(client)),
        )
    }
}

impl Drop for TestBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn is_authorized(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {TOKEN}"))
}

fn not_authenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Not authenticated" })),
    )
        .into_response()
}

async fn serve_photo(
    State(state): State<Arc<BackendState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = uri.path().to_string();
    *state.hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

    let delay = *state.delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    if !is_authorized(&headers) {
        return not_authenticated();
    }

    let photo = state.photos.lock().unwrap().get(&path).cloned();
    match photo {
        Some(photo) => {
            ([(CONTENT_TYPE, photo.content_type)], photo.body).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "Photo not found" })),
        )
            .into_response(),
    }
}

async fn receive_upload(
    State(state): State<Arc<BackendState>>,
    uri: Uri,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if !is_authorized(&headers) {
        return not_authenticated();
    }
    let path = uri.path().to_string();

    let mut child_id = None;
    let mut file = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("child_id") => child_id = field.text().await.ok(),
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let Ok(bytes) = field.bytes().await else {
                    return StatusCode::BAD_REQUEST.into_response();
                };
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let Some((file_name, content_type, bytes)) = file else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": [{ "msg": "Field required" }] })),
        )
            .into_response();
    };

    state.uploads.lock().unwrap().push(UploadRecord {
        path: path.clone(),
        file_name,
        content_type: content_type.clone(),
        len: bytes.len(),
        child_id,
    });

    let rejection = state.upload_rejection.lock().unwrap().clone();
    if let Some((status, body)) = rejection {
        return (status, Json(body)).into_response();
    }

    state.photos.lock().unwrap().insert(
        path.clone(),
        StoredPhoto {
            content_type: content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            body: bytes,
        },
    );
    (StatusCode::CREATED, Json(json!({ "photo_url": path }))).into_response()
}
