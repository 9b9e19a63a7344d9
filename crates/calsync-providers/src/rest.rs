//! Shared request layer for token-based REST providers.
//!
//! A [`BearerSession`] holds one account's tokens, keeps them fresh through
//! the [`AuthEngine`], and retries a request exactly once after a forced
//! refresh when the API answers 401.

use std::sync::Arc;
use std::time::Duration;

use calsync_core::OAuthTokenData;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::{AuthEngine, OAuthProvider};
use crate::error::{ProviderError, ProviderResult};

/// Receives `(source_id, tokens)` whenever a provider refreshes its tokens.
///
/// Persisting them is the caller's job.
pub type TokenSink = Arc<dyn Fn(&str, &OAuthTokenData) + Send + Sync>;

/// One signed-in account on a token-based API.
pub struct BearerSession {
    name: &'static str,
    oauth: OAuthProvider,
    engine: Arc<AuthEngine>,
    source_id: String,
    tenant_id: Option<String>,
    token: Mutex<Option<Arc<OAuthTokenData>>>,
    sink: Option<TokenSink>,
    http: reqwest::Client,
}

impl std::fmt::Debug for BearerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerSession")
            .field("name", &self.name)
            .field("source_id", &self.source_id)
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

impl BearerSession {
    pub fn new(
        name: &'static str,
        oauth: OAuthProvider,
        engine: Arc<AuthEngine>,
        source_id: impl Into<String>,
        tokens: Option<OAuthTokenData>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::unknown(format!("failed to create HTTP client: {}", e))
                    .with_provider(name)
            })?;

        Ok(Self {
            name,
            oauth,
            engine,
            source_id: source_id.into(),
            tenant_id: None,
            token: Mutex::new(tokens.map(Arc::new)),
            sink: None,
            http,
        })
    }

    pub fn with_tenant_id(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn with_sink(mut self, sink: Option<TokenSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn engine(&self) -> &Arc<AuthEngine> {
        &self.engine
    }

    pub async fn has_token(&self) -> bool {
        self.token.lock().await.is_some()
    }

    /// Returns a token that is valid for at least the expiry skew.
    pub async fn valid_token(&self) -> ProviderResult<Arc<OAuthTokenData>> {
        let mut slot = self.token.lock().await;
        let Some(current) = slot.as_ref() else {
            return Err(ProviderError::auth("not signed in").with_provider(self.name));
        };

        let valid = self
            .engine
            .ensure_valid_token(self.oauth, current, self.tenant_id.as_deref())
            .await
            .map_err(|e| e.with_provider(self.name))?;

        if !Arc::ptr_eq(current, &valid) {
            *slot = Some(Arc::clone(&valid));
            self.publish(&valid);
        }
        Ok(valid)
    }

    /// Refreshes after the API rejected `rejected`.
    ///
    /// When another request already replaced that token, the replacement is
    /// returned without a second refresh.
    async fn force_refresh(&self, rejected: &Arc<OAuthTokenData>) -> ProviderResult<Arc<OAuthTokenData>> {
        let mut slot = self.token.lock().await;
        let Some(current) = slot.as_ref() else {
            return Err(ProviderError::auth("not signed in").with_provider(self.name));
        };
        if !Arc::ptr_eq(current, rejected) {
            return Ok(Arc::clone(current));
        }

        let refreshed = Arc::new(
            self.engine
                .refresh(self.oauth, current, self.tenant_id.as_deref())
                .await
                .map_err(|e| e.with_provider(self.name))?,
        );
        *slot = Some(Arc::clone(&refreshed));
        self.publish(&refreshed);
        Ok(refreshed)
    }

    fn publish(&self, token: &OAuthTokenData) {
        if let Some(ref sink) = self.sink {
            sink(&self.source_id, token);
        }
    }

    /// Sends an authenticated request, retrying once after a 401.
    ///
    /// `build` is called with the HTTP client and the bearer token. Any
    /// status other than a second 401 is returned to the caller.
    pub async fn send<F>(&self, build: F) -> ProviderResult<Response>
    where
        F: Fn(&reqwest::Client, &str) -> RequestBuilder,
    {
        let token = self.valid_token().await?;
        let response = build(&self.http, &token.access_token)
            .send()
            .await
            .map_err(|e| ProviderError::from(e).with_provider(self.name))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(provider = self.name, "access token rejected, refreshing once");
        let token = self.force_refresh(&token).await?;
        let response = build(&self.http, &token.access_token)
            .send()
            .await
            .map_err(|e| ProviderError::from(e).with_provider(self.name))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(provider = self.name, "access token rejected after refresh");
            return Err(self.error_from_response(response).await);
        }
        Ok(response)
    }

    /// Sends a request and decodes a successful JSON body.
    pub async fn get_json<T, F>(&self, build: F) -> ProviderResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client, &str) -> RequestBuilder,
    {
        let response = self.send(build).await?;
        self.json(response).await
    }

    /// Decodes a JSON body, turning error statuses into [`ProviderError`]s.
    pub async fn json<T: DeserializeOwned>(&self, response: Response) -> ProviderResult<T> {
        if !response.status().is_success() {
            return Err(self.error_from_response(response).await);
        }
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from(e).with_provider(self.name))?;
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::parse(format!("failed to parse response: {}", e))
                .with_provider(self.name)
                .with_source(e)
        })
    }

    /// Classifies a non-success response by status.
    pub async fn error_from_response(&self, response: Response) -> ProviderError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ProviderError::from_status(status, body).with_provider(self.name)
    }

    /// Forgets the tokens and returns them, e.g. for revocation.
    pub async fn clear(&self) -> Option<Arc<OAuthTokenData>> {
        self.token.lock().await.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthEngineConfig, OAuthClientConfig};
    use crate::error::ProviderErrorCode;
    use std::sync::Mutex as StdMutex;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine(server: &MockServer) -> Arc<AuthEngine> {
        let google = OAuthClientConfig::google()
            .with_client_id("cid")
            .with_endpoints(format!("{}/auth", server.uri()), format!("{}/token", server.uri()));
        Arc::new(AuthEngine::new(AuthEngineConfig::default().with_google(google)).unwrap())
    }

    fn session(server: &MockServer, sink: Option<TokenSink>) -> BearerSession {
        let tokens = OAuthTokenData::new("stale-access", Some("refresh".to_string()), 3600);
        BearerSession::new(
            "google",
            OAuthProvider::Google,
            engine(server),
            "work",
            Some(tokens),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_sink(sink)
    }

    async fn mount_token_endpoint(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-access",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn retries_once_after_401() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .and(header("authorization", "Bearer stale-access"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .and(header("authorization", "Bearer fresh-access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let sink: TokenSink = Arc::new(move |source: &str, tokens: &OAuthTokenData| {
            recorder
                .lock()
                .unwrap()
                .push((source.to_string(), tokens.access_token.clone()));
        });
        let session = session(&server, Some(sink));

        let url = format!("{}/data", server.uri());
        let body: serde_json::Value = session
            .get_json(|http, token| http.get(&url).bearer_auth(token))
            .await
            .unwrap();

        assert_eq!(body["ok"], true);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[("work".to_string(), "fresh-access".to_string())]);
    }

    #[tokio::test]
    async fn second_401_is_an_auth_error() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let session = session(&server, None);
        let url = format!("{}/data", server.uri());
        let err = session
            .send(|http, token| http.get(&url).bearer_auth(token))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Auth);
        assert_eq!(err.provider(), Some("google"));
    }

    #[tokio::test]
    async fn other_statuses_are_returned_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(412))
            .mount(&server)
            .await;

        let session = session(&server, None);
        let url = format!("{}/data", server.uri());
        let response = session
            .send(|http, token| http.delete(&url).bearer_auth(token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn cleared_session_is_not_signed_in() {
        let server = MockServer::start().await;
        let session = session(&server, None);
        assert!(session.clear().await.is_some());
        let err = session.valid_token().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Auth);
    }
}
