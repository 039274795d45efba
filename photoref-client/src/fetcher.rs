//! Authorized retrieval of images behind protected API paths.

use crate::cache::ResolutionCache;
use crate::config::ApiBase;
use crate::extract::extract_image;
use crate::paths::to_protected_path;
use crate::session::TokenProvider;
use crate::transport::{ImageTransport, TransportError};

use std::sync::Arc;
use thiserror::Error;

/// Reasons a protected image could not be resolved. These never leave the
/// fetcher; callers only see `None`.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no session token available")]
    MissingToken,

    #[error("server responded with status {0}")]
    Status(u16),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("response did not contain an image payload")]
    NoImagePayload,
}

#[derive(Debug, Clone)]
pub struct AuthorizedFetcher {
    base: ApiBase,
    cache: Arc<ResolutionCache>,
    tokens: Arc<dyn TokenProvider>,
    transport: Arc<dyn ImageTransport>,
}

impl AuthorizedFetcher {
    pub fn new(
        base: ApiBase,
        cache: Arc<ResolutionCache>,
        tokens: Arc<dyn TokenProvider>,
        transport: Arc<dyn ImageTransport>,
    ) -> Self {
        Self {
            base,
            cache,
            tokens,
            transport,
        }
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    /// Cache key for `path`: the `path?query` form, so a base-prefixed URL
    /// and its relative path share one entry.
    pub fn cache_key(&self, path: &str) -> Option<String> {
        to_protected_path(self.base.as_str(), Some(path), None)
    }

    /// Resolve `path` to a canonical data URI, sharing any fetch already in
    /// flight for it. Every failure is reported as `None`.
    pub async fn fetch_data_uri(&self, path: &str) -> Option<String> {
        let Some(key) = self.cache_key(path) else {
            log::debug!("[AuthorizedFetcher] not a protected path: {:?}", path);
            return None;
        };
        let fetcher = self.clone();
        let fetch_key = key.clone();
        self.cache
            .resolve_with(&key, move || async move {
                match fetcher.try_fetch(&fetch_key).await {
                    Ok(data_uri) => Some(data_uri),
                    Err(err) => {
                        log::debug!(
                            "[AuthorizedFetcher] {} unresolved: {}",
                            fetch_key,
                            err
                        );
                        None
                    }
                }
            })
            .await
    }

    /// `protected_path` is a [`Self::cache_key`], so it always starts with `/`.
    async fn try_fetch(&self, protected_path: &str) -> Result<String, ResolveError> {
        let token = self
            .tokens
            .bearer_token()
            .await
            .ok_or(ResolveError::MissingToken)?;

        let url = self.base.join(protected_path);
        let body = self.transport.get_protected(&url, &token).await?;
        if !body.is_success() {
            return Err(ResolveError::Status(body.status));
        }
        extract_image(&body).ok_or(ResolveError::NoImagePayload)
    }
}
