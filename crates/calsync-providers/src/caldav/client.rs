//! HTTP client for CalDAV operations.
//!
//! Basic credentials are sent with every request rather than after a 401
//! challenge.

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::trace;

use crate::error::{ProviderError, ProviderResult};

use super::config::CalDavConfig;

const NAME: &str = "caldav";

/// Conditional header attached to a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    None,
    /// `If-Match` with a known ETag.
    IfMatch(String),
    /// `If-None-Match: *`, used to create without overwriting.
    IfNoneMatchAny,
}

impl Precondition {
    /// `If-Match` when a version tag is known, otherwise unconditional.
    pub fn if_match(tag: Option<&str>) -> Self {
        match tag {
            Some(tag) => Self::IfMatch(tag.to_string()),
            None => Self::None,
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::None => request,
            Self::IfMatch(tag) => request.header("If-Match", tag),
            Self::IfNoneMatchAny => request.header("If-None-Match", "*"),
        }
    }
}

/// HTTP client for CalDAV operations.
#[derive(Debug)]
pub struct CalDavClient {
    client: Client,
    config: CalDavConfig,
}

impl CalDavClient {
    pub fn new(config: CalDavConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ProviderError::unknown(format!("failed to create HTTP client: {}", e))
                    .with_provider(NAME)
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &CalDavConfig {
        &self.config
    }

    fn request(&self, method: &str, url: &str) -> ProviderResult<RequestBuilder> {
        let method = Method::from_bytes(method.as_bytes()).map_err(|_| {
            ProviderError::unknown(format!("invalid HTTP method: {}", method)).with_provider(NAME)
        })?;
        trace!(method = %method, url = %url, "sending request");
        Ok(self
            .client
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password)))
    }

    async fn xml(&self, method: &str, url: &str, body: String, depth: u8) -> ProviderResult<String> {
        let response = self
            .request(method, url)?
            .header("Content-Type", "application/xml; charset=utf-8")
            .header("Depth", depth.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| ProviderError::from(e).with_provider(NAME))?;
        self.text(response).await
    }

    /// Performs a PROPFIND request and returns the multistatus body.
    pub async fn propfind(&self, url: &str, body: String, depth: u8) -> ProviderResult<String> {
        self.xml("PROPFIND", url, body, depth).await
    }

    /// Performs a REPORT request (calendar-query or calendar-multiget).
    pub async fn report(&self, url: &str, body: String) -> ProviderResult<String> {
        self.xml("REPORT", url, body, 1).await
    }

    /// Uploads a calendar object. The response is returned as is so the
    /// caller can read the status and `ETag`.
    pub async fn put(&self, url: &str, ics: String, precondition: &Precondition) -> ProviderResult<Response> {
        let request = self
            .request("PUT", url)?
            .header("Content-Type", "text/calendar; charset=utf-8")
            .body(ics);
        precondition
            .apply(request)
            .send()
            .await
            .map_err(|e| ProviderError::from(e).with_provider(NAME))
    }

    pub async fn delete(&self, url: &str, precondition: &Precondition) -> ProviderResult<Response> {
        let request = self.request("DELETE", url)?;
        precondition
            .apply(request)
            .send()
            .await
            .map_err(|e| ProviderError::from(e).with_provider(NAME))
    }

    /// Reads a successful body, classifying anything else by status.
    pub async fn text(&self, response: Response) -> ProviderResult<String> {
        let status = response.status();
        trace!(status = %status, "received response");
        if status.is_success() || status == StatusCode::MULTI_STATUS {
            return response
                .text()
                .await
                .map_err(|e| ProviderError::from(e).with_provider(NAME));
        }
        Err(Self::error_from_response(response).await)
    }

    pub async fn error_from_response(response: Response) -> ProviderError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ProviderError::from_status(status, body).with_provider(NAME)
    }
}
