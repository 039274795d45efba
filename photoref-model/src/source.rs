//! The displayable source handed back to UI collaborators.

use serde::{Deserialize, Serialize};

/// Headers a renderer must send when loading [`ResolvedImageSource::uri`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationHeader {
    #[serde(rename = "Authorization")]
    pub authorization: String,
}

impl AuthorizationHeader {
    pub fn bearer(token: &str) -> Self {
        Self {
            authorization: format!("Bearer {token}"),
        }
    }
}

/// `{ uri, headers? }`: either an inline data URI or an absolute URL that may
/// require a bearer header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedImageSource {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<AuthorizationHeader>,
}

impl ResolvedImageSource {
    pub fn inline(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            headers: None,
        }
    }

    pub fn with_bearer(uri: impl Into<String>, token: &str) -> Self {
        Self {
            uri: uri.into(),
            headers: Some(AuthorizationHeader::bearer(token)),
        }
    }

    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .as_ref()
            .map(|headers| headers.authorization.as_str())
    }
}
