//! Bearer token access for authorized image requests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt::Debug;
use tokio::sync::RwLock;

/// Lifetime assumed for a token saved without any expiry information.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::hours(1);

/// Source of the current session token. Implementations swallow their own
/// failures: an unreadable store is the same as being logged out.
#[async_trait]
pub trait TokenProvider: Send + Sync + Debug {
    async fn bearer_token(&self) -> Option<String>;
}

/// Expiry information as it arrives from a login response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenExpiry {
    ExpiresAt(DateTime<Utc>),
    ExpiresIn(Duration),
    #[default]
    Default,
}

impl TokenExpiry {
    /// Prefer an absolute expiry over a relative one when both are present.
    pub fn from_parts(
        expires_at: Option<DateTime<Utc>>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        match (expires_at, expires_in_secs) {
            (Some(at), _) => TokenExpiry::ExpiresAt(at),
            (None, Some(secs)) if secs > 0 => {
                TokenExpiry::ExpiresIn(Duration::seconds(secs))
            }
            _ => TokenExpiry::Default,
        }
    }

    fn deadline(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TokenExpiry::ExpiresAt(at) => at,
            TokenExpiry::ExpiresIn(lifetime) => now + lifetime,
            TokenExpiry::Default => now + DEFAULT_TOKEN_LIFETIME,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// In-memory session token with expiry. Reading an expired token clears it.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: RwLock<Option<StoredToken>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save_token(&self, token: impl Into<String>, expiry: TokenExpiry) {
        let expires_at = expiry.deadline(Utc::now());
        *self.inner.write().await = Some(StoredToken {
            token: token.into(),
            expires_at,
        });
    }

    pub async fn token(&self) -> Option<String> {
        self.token_at(Utc::now()).await
    }

    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.as_ref().map(|stored| stored.expires_at)
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    async fn token_at(&self, now: DateTime<Utc>) -> Option<String> {
        {
            let guard = self.inner.read().await;
            match guard.as_ref() {
                None => return None,
                Some(stored) if now < stored.expires_at => {
                    return Some(stored.token.clone());
                }
                Some(_) => {}
            }
        }
        log::debug!("[SessionStore] Token expired, clearing session");
        let mut guard = self.inner.write().await;
        if guard.as_ref().is_some_and(|stored| now >= stored.expires_at) {
            *guard = None;
        }
        None
    }
}

#[async_trait]
impl TokenProvider for SessionStore {
    async fn bearer_token(&self) -> Option<String> {
        self.token().await
    }
}
