//! Entry points used by UI collaborators: turn any photo reference into a
//! displayable [`ResolvedImageSource`], and upload new photos while keeping
//! the resolution cache honest.

use crate::cache::{ResolutionCache, ResolutionStatsSnapshot};
use crate::config::ResolverConfig;
use crate::fetcher::AuthorizedFetcher;
use crate::inline::normalize_image_payload;
use crate::paths::{self, is_absolute_url, is_data_image_uri, pick_candidate};
use crate::session::TokenProvider;
use crate::transport::{HttpTransport, ImageTransport, PhotoUpload, TransportError};

use photoref_model::{RawImageReference, ResolvedImageSource};
use serde_json::Value;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

pub const PARENT_PHOTO_PATH: &str = "/users/parent-photo";

const DEFAULT_FILE_NAME: &str = "photo.jpg";
const DEFAULT_MIME_TYPE: &str = "image/jpeg";
const UPLOAD_FAILED: &str = "Upload failed";

pub fn child_photo_path(child_id: impl Display) -> String {
    format!("/children/{child_id}/photo")
}

/// Photo picked by the user for upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotoFile {
    pub bytes: Vec<u8>,
    /// Defaults to `photo.jpg`.
    pub name: Option<String>,
    /// Defaults to `image/jpeg`.
    pub mime_type: Option<String>,
}

impl PhotoFile {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Session expired. Please log in again.")]
    SessionExpired,

    #[error("Please select a photo to upload.")]
    MissingFile,

    #[error("{message}")]
    Rejected {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl UploadError {
    /// HTTP-style status for display; transport failures have none.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::SessionExpired => Some(401),
            UploadError::MissingFile => Some(400),
            UploadError::Rejected { status, .. } => Some(*status),
            UploadError::Transport(_) => None,
        }
    }
}

#[derive(Debug)]
struct ResolverInner {
    config: ResolverConfig,
    tokens: Arc<dyn TokenProvider>,
    transport: Arc<dyn ImageTransport>,
    fetcher: AuthorizedFetcher,
}

/// Cheap to clone; all clones share one cache.
#[derive(Debug, Clone)]
pub struct ImageResolver {
    inner: Arc<ResolverInner>,
}

impl ImageResolver {
    pub fn new(
        config: ResolverConfig,
        cache: Arc<ResolutionCache>,
        tokens: Arc<dyn TokenProvider>,
        transport: Arc<dyn ImageTransport>,
    ) -> Self {
        let fetcher = AuthorizedFetcher::new(
            config.base_url.clone(),
            cache,
            Arc::clone(&tokens),
            Arc::clone(&transport),
        );
        Self {
            inner: Arc::new(ResolverInner {
                config,
                tokens,
                transport,
                fetcher,
            }),
        }
    }

    /// Resolver backed by a reqwest [`HttpTransport`] built from `config`.
    pub fn http(
        config: ResolverConfig,
        cache: Arc<ResolutionCache>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(config, cache, tokens, Arc::new(transport)))
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        self.inner.fetcher.cache()
    }

    pub fn stats(&self) -> ResolutionStatsSnapshot {
        self.cache().stats()
    }

    pub fn resolve_api_image_uri(
        &self,
        raw: Option<&str>,
        fallback: Option<&str>,
    ) -> Option<String> {
        paths::resolve_api_image_uri(self.base(), raw, fallback)
    }

    pub fn to_protected_path(
        &self,
        raw: Option<&str>,
        fallback: Option<&str>,
    ) -> Option<String> {
        paths::to_protected_path(self.base(), raw, fallback)
    }

    /// Resolve any reference to a displayable source.
    ///
    /// Inline payloads never touch the network. Absolute URLs are returned
    /// as-is with a bearer header when logged in. Everything else is fetched
    /// as a protected path and returned inline. Object references contribute
    /// their first truthy wrapper field. `None` means "show a placeholder".
    pub async fn build_source(
        &self,
        raw: &RawImageReference,
        fallback: Option<&str>,
    ) -> Option<ResolvedImageSource> {
        if let Some(data_uri) = normalize_image_payload(raw) {
            return Some(ResolvedImageSource::inline(data_uri));
        }

        let candidate = pick_candidate(raw.candidate_text(), fallback)?;
        if is_absolute_url(candidate) {
            return self.build_authorized_source(Some(candidate), None).await;
        }

        let data_uri = self.inner.fetcher.fetch_data_uri(candidate).await?;
        Some(ResolvedImageSource::inline(data_uri))
    }

    /// The URI a renderer should load itself, with credentials attached when
    /// a session exists. Data URIs never carry a header.
    pub async fn build_authorized_source(
        &self,
        raw: Option<&str>,
        fallback: Option<&str>,
    ) -> Option<ResolvedImageSource> {
        let candidate = pick_candidate(raw, fallback)?;
        if is_data_image_uri(candidate) {
            return Some(ResolvedImageSource::inline(candidate));
        }

        let uri = paths::resolve_api_image_uri(self.base(), Some(candidate), None)?;
        match self.inner.tokens.bearer_token().await {
            Some(token) => Some(ResolvedImageSource::with_bearer(uri, &token)),
            None => Some(ResolvedImageSource::inline(uri)),
        }
    }

    pub async fn parent_photo_source(
        &self,
        raw: &RawImageReference,
    ) -> Option<ResolvedImageSource> {
        self.build_source(raw, None).await
    }

    pub async fn child_photo_source(
        &self,
        child_id: impl Display,
        raw: &RawImageReference,
    ) -> Option<ResolvedImageSource> {
        let source = self.build_source(raw, None).await;
        if source.is_none() && !raw.is_null() {
            log::debug!("[ImageResolver] no photo for child {}", child_id);
        }
        source
    }

    /// Forget the resolved image for `path` so the next resolution refetches.
    pub fn invalidate(&self, path: &str) -> bool {
        self.inner
            .fetcher
            .cache_key(path)
            .is_some_and(|key| self.cache().invalidate(&key))
    }

    pub async fn upload_parent_photo(
        &self,
        file: PhotoFile,
    ) -> Result<Option<Value>, UploadError> {
        self.upload_photo(PARENT_PHOTO_PATH, file, None).await
    }

    pub async fn upload_child_photo(
        &self,
        child_id: impl Display,
        file: PhotoFile,
    ) -> Result<Option<Value>, UploadError> {
        self.upload_photo(&child_photo_path(child_id), file, None).await
    }

    /// Multipart upload to `path`. `child_id` is sent as a form field only
    /// for endpoints that expect it there rather than in the path.
    ///
    /// On success the cached image for `path` is dropped before returning the
    /// response body (when it is JSON).
    pub async fn upload_photo(
        &self,
        path: &str,
        file: PhotoFile,
        child_id: Option<&str>,
    ) -> Result<Option<Value>, UploadError> {
        let token = self
            .inner
            .tokens
            .bearer_token()
            .await
            .ok_or(UploadError::SessionExpired)?;
        if file.bytes.is_empty() {
            return Err(UploadError::MissingFile);
        }

        let upload = PhotoUpload {
            file_name: file
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
            mime_type: file
                .mime_type
                .filter(|mime| !mime.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            bytes: file.bytes,
            child_id: child_id.map(str::to_string),
        };

        let url = self.inner.config.base_url.join(path);
        let response = self.inner.transport.upload_photo(&url, &token, upload).await?;
        let body = if response.is_json() {
            serde_json::from_slice::<Value>(&response.bytes).ok()
        } else {
            None
        };

        if !response.is_success() {
            return Err(UploadError::Rejected {
                status: response.status,
                message: upload_error_message(body.as_ref()),
                body,
            });
        }

        self.invalidate(path);
        log::debug!("[ImageResolver] uploaded photo to {}", path);
        Ok(body)
    }

    fn base(&self) -> &str {
        self.inner.config.base_url.as_str()
    }
}

/// `detail` (a string, or a validation list of `{msg}` entries joined by
/// newlines), then `message`, then a generic fallback.
fn upload_error_message(body: Option<&Value>) -> String {
    let Some(body) = body else {
        return UPLOAD_FAILED.to_string();
    };

    match body.get("detail") {
        Some(Value::String(detail)) if !detail.is_empty() => {
            return detail.clone();
        }
        Some(Value::Array(items)) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if !messages.is_empty() {
                return messages.join("\n");
            }
        }
        _ => {}
    }

    body.get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .unwrap_or(UPLOAD_FAILED)
        .to_string()
}
