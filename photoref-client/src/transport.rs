//! HTTP seam between the resolver and the backend.

use crate::config::ResolverConfig;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use std::borrow::Cow;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// A fully buffered response. Extractors each read it independently, so one
/// failed interpretation never consumes the body for the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBody {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FetchedBody {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|value| value.contains("application/json"))
    }

    async fn from_response(response: Response) -> Result<Self, TransportError> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        Ok(Self {
            status,
            content_type,
            bytes,
        })
    }
}

/// A photo ready to be posted as multipart form data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub child_id: Option<String>,
}

#[async_trait]
pub trait ImageTransport: Send + Sync + Debug {
    /// `GET url` with `Authorization: Bearer <token>` and `Accept: */*`.
    async fn get_protected(
        &self,
        url: &str,
        token: &str,
    ) -> Result<FetchedBody, TransportError>;

    /// Multipart `POST url` carrying the photo under the `file` field.
    async fn upload_photo(
        &self,
        url: &str,
        token: &str,
        upload: PhotoUpload,
    ) -> Result<FetchedBody, TransportError>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ResolverConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(agent) = config.user_agent.as_deref() {
            builder = builder.user_agent(agent);
        }
        let client = builder.build().map_err(TransportError::Client)?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageTransport for HttpTransport {
    async fn get_protected(
        &self,
        url: &str,
        token: &str,
    ) -> Result<FetchedBody, TransportError> {
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "*/*")
            .send()
            .await?;
        FetchedBody::from_response(response).await
    }

    async fn upload_photo(
        &self,
        url: &str,
        token: &str,
        upload: PhotoUpload,
    ) -> Result<FetchedBody, TransportError> {
        let PhotoUpload {
            file_name,
            mime_type,
            bytes,
            child_id,
        } = upload;

        let mut form = Form::new();
        if let Some(child_id) = child_id {
            form = form.text("child_id", child_id);
        }
        let part = Part::bytes(bytes).file_name(file_name).mime_str(&mime_type)?;
        form = form.part("file", part);

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await?;
        FetchedBody::from_response(response).await
    }
}
