//! The OAuth 2.0 authorization-code engine with PKCE.
//!
//! # Flow Overview
//!
//! 1. [`AuthEngine::start_flow`] starts a loopback listener, generates PKCE
//!    material and a random `state`, records a pending request and opens the
//!    authorization URL in the browser. It returns right away.
//! 2. The provider redirects the browser to the listener, which forwards the
//!    query to [`AuthEngine::handle_callback`].
//! 3. The pending request is consumed, the code is exchanged for tokens and
//!    an [`AuthEvent`] is delivered to every subscriber.
//!
//! The engine also refreshes and revokes tokens on behalf of the providers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use calsync_core::OAuthTokenData;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ProviderError, ProviderResult};

use super::config::{AuthEngineConfig, OAuthClientConfig, OAuthProvider};
use super::loopback::{CallbackParams, LoopbackServer};
use super::pending::{PendingOAuthRequest, PendingRequests};
use super::pkce::{PkceChallenge, generate_state};

/// Opens authorization URLs for the user.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Opens URLs with the desktop's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

/// Identifies a subscription returned by [`AuthEngine::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Options for [`AuthEngine::start_flow`].
#[derive(Debug, Clone, Default)]
pub struct FlowOptions {
    /// Microsoft tenant; `common` when unset.
    pub tenant_id: Option<String>,
    /// Source the resulting tokens belong to, echoed in the [`AuthEvent`].
    pub source_id: Option<String>,
}

impl FlowOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }
}

/// What the caller gets back from a started flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStart {
    pub authorization_url: String,
    pub state: String,
    pub redirect_uri: String,
}

/// Why a flow failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureKind {
    /// The provider redirected back with an `error` parameter.
    Denied,
    /// The callback lacked `code` or `state`, or was not a valid URL.
    InvalidCallback,
    /// The state is unknown, already used or too old.
    Expired,
    /// The token endpoint rejected the code.
    Exchange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub kind: AuthFailureKind,
    pub message: String,
}

/// Lifecycle notification delivered to subscribers.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    Success {
        provider: OAuthProvider,
        tokens: OAuthTokenData,
        /// Account email or principal name, when it could be looked up.
        account: Option<String>,
        source_id: Option<String>,
    },
    Failure {
        /// `None` when the callback could not be tied to a flow.
        provider: Option<OAuthProvider>,
        error: AuthFailure,
        source_id: Option<String>,
    },
}

impl AuthEvent {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    fn failure(
        provider: Option<OAuthProvider>,
        kind: AuthFailureKind,
        message: impl Into<String>,
        source_id: Option<String>,
    ) -> Self {
        Self::Failure {
            provider,
            error: AuthFailure {
                kind,
                message: message.into(),
            },
            source_id,
        }
    }
}

/// Response from a token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

/// Error body from a token endpoint.
#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

type Subscribers = Vec<(SubscriptionId, mpsc::UnboundedSender<AuthEvent>)>;

/// OAuth engine shared by every token-based provider.
pub struct AuthEngine {
    config: AuthEngineConfig,
    http: reqwest::Client,
    pending: PendingRequests,
    listener: tokio::sync::Mutex<Option<LoopbackServer>>,
    subscribers: Mutex<Subscribers>,
    next_subscription: AtomicU64,
    browser: Arc<dyn BrowserLauncher>,
}

impl std::fmt::Debug for AuthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthEngine")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl AuthEngine {
    /// Creates an engine that opens the system browser.
    pub fn new(config: AuthEngineConfig) -> ProviderResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ProviderError::unknown(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            pending: PendingRequests::new(config.pending_ttl),
            config,
            http,
            listener: tokio::sync::Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            browser: Arc::new(SystemBrowser),
        })
    }

    /// Replaces the browser launcher.
    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn config(&self) -> &AuthEngineConfig {
        &self.config
    }

    /// Number of flows waiting for their callback.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Starts an authorization flow and returns without waiting for it.
    pub async fn start_flow(
        self: &Arc<Self>,
        provider: OAuthProvider,
        options: FlowOptions,
    ) -> ProviderResult<FlowStart> {
        let client = self.config.client(provider);
        let client_id = client.require_client_id(provider)?.to_string();

        let purged = self.pending.purge_expired(Utc::now());
        if purged > 0 {
            debug!(purged, "dropped expired OAuth requests");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let redirect_uri = {
            let mut listener = self.listener.lock().await;
            if let Some(previous) = listener.take() {
                debug!(port = previous.port(), "stopping previous loopback listener");
                previous.stop();
            }
            let server = LoopbackServer::start(
                self.config.port_range,
                &self.config.callback_path,
                self.config.shutdown_grace,
                tx,
            )
            .await
            .map_err(|e| e.with_provider(provider.as_str()))?;
            let redirect_uri = server.redirect_uri().to_string();
            *listener = Some(server);
            redirect_uri
        };
        self.spawn_callback_pump(rx);

        let pkce = PkceChallenge::generate();
        let state = generate_state();
        let authorization_url = build_authorization_url(
            client,
            &client_id,
            options.tenant_id.as_deref(),
            &redirect_uri,
            &pkce,
            &state,
        )?;

        self.pending.insert(
            state.clone(),
            PendingOAuthRequest {
                provider,
                code_verifier: pkce.verifier,
                created_at: Utc::now(),
                redirect_uri: redirect_uri.clone(),
                tenant_id: options.tenant_id,
                source_id: options.source_id,
            },
        );

        info!(provider = %provider, redirect_uri = %redirect_uri, "starting OAuth flow, opening browser");
        if let Err(e) = self.browser.open(&authorization_url) {
            warn!(error = %e, url = %authorization_url, "failed to open browser, open the URL manually");
        }

        Ok(FlowStart {
            authorization_url,
            state,
            redirect_uri,
        })
    }

    fn spawn_callback_pump(self: &Arc<Self>, mut rx: mpsc::UnboundedReceiver<CallbackParams>) {
        let engine: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(params) = rx.recv().await {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.handle_callback(params).await;
            }
        });
    }

    /// Handles a redirect from the custom URI scheme.
    pub async fn handle_protocol_callback(&self, uri: &str) -> AuthEvent {
        let parsed = match Url::parse(uri) {
            Ok(url) if url.scheme() == self.config.protocol_scheme => url,
            Ok(url) => {
                let event = AuthEvent::failure(
                    None,
                    AuthFailureKind::InvalidCallback,
                    format!("unexpected callback scheme `{}`", url.scheme()),
                    None,
                );
                self.emit(&event);
                return event;
            }
            Err(e) => {
                let event = AuthEvent::failure(
                    None,
                    AuthFailureKind::InvalidCallback,
                    format!("invalid callback URI: {}", e),
                    None,
                );
                self.emit(&event);
                return event;
            }
        };
        self.handle_callback(CallbackParams::from_url(&parsed)).await
    }

    /// Completes a flow from its redirect parameters.
    ///
    /// The resulting event is delivered to subscribers and also returned.
    pub async fn handle_callback(&self, params: CallbackParams) -> AuthEvent {
        let event = self.complete_flow(params).await;
        match &event {
            AuthEvent::Success { provider, account, .. } => {
                info!(provider = %provider, account = account.as_deref().unwrap_or("unknown"), "OAuth flow completed");
            }
            AuthEvent::Failure { error, .. } => {
                warn!(kind = ?error.kind, message = %error.message, "OAuth flow failed");
            }
        }
        self.emit(&event);
        event
    }

    async fn complete_flow(&self, params: CallbackParams) -> AuthEvent {
        if let Some(error) = params.error {
            let message = match params.error_description {
                Some(description) => format!("authorization denied: {} ({})", error, description),
                None => format!("authorization denied: {}", error),
            };
            return AuthEvent::failure(None, AuthFailureKind::Denied, message, None);
        }

        let (Some(code), Some(state)) = (params.code, params.state) else {
            return AuthEvent::failure(
                None,
                AuthFailureKind::InvalidCallback,
                "callback is missing the authorization code or state",
                None,
            );
        };

        let Some(request) = self.pending.take(&state) else {
            return AuthEvent::failure(
                None,
                AuthFailureKind::Expired,
                "authorization request expired or was already used, start again",
                None,
            );
        };

        let provider = request.provider;
        let source_id = request.source_id.clone();
        match self.exchange_code(&request, &code).await {
            Ok(tokens) => {
                let account = self
                    .lookup_account(provider, &tokens)
                    .await
                    .unwrap_or_else(|e| {
                        debug!(provider = %provider, error = %e, "account lookup failed");
                        None
                    });
                AuthEvent::Success {
                    provider,
                    tokens,
                    account,
                    source_id,
                }
            }
            Err(e) => AuthEvent::failure(
                Some(provider),
                AuthFailureKind::Exchange,
                e.message().to_string(),
                source_id,
            ),
        }
    }

    async fn exchange_code(
        &self,
        request: &PendingOAuthRequest,
        code: &str,
    ) -> ProviderResult<OAuthTokenData> {
        let client = self.config.client(request.provider);
        let client_id = client.require_client_id(request.provider)?;

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", request.code_verifier.as_str()),
            ("client_id", client_id),
            ("redirect_uri", request.redirect_uri.as_str()),
        ];
        if let Some(ref secret) = client.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let url = client.token_url_for(request.tenant_id.as_deref());
        debug!(provider = %request.provider, "exchanging authorization code");
        let response = self.http.post(&url).form(&params).send().await?;
        let token = parse_token_response(response, None).await?;
        Ok(token)
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// The returned value replaces `token` entirely; the old refresh token is
    /// carried over when the response does not include a new one.
    pub async fn refresh(
        &self,
        provider: OAuthProvider,
        token: &OAuthTokenData,
        tenant_id: Option<&str>,
    ) -> ProviderResult<OAuthTokenData> {
        let Some(refresh_token) = token.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            return Err(ProviderError::auth("no refresh token available, sign in again")
                .with_provider(provider.as_str()));
        };
        let client = self.config.client(provider);
        let client_id = client.require_client_id(provider)?;

        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
        ];
        if let Some(ref secret) = client.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let url = client.token_url_for(tenant_id);
        let response = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::from(e).with_provider(provider.as_str()))?;
        let refreshed = parse_token_response(response, Some(token))
            .await
            .map_err(|e| e.with_provider(provider.as_str()))?;

        info!(provider = %provider, expires_at = %refreshed.expires_at, "refreshed access token");
        Ok(refreshed)
    }

    /// Returns `token` itself while it is valid, or a refreshed replacement.
    pub async fn ensure_valid_token(
        &self,
        provider: OAuthProvider,
        token: &Arc<OAuthTokenData>,
        tenant_id: Option<&str>,
    ) -> ProviderResult<Arc<OAuthTokenData>> {
        if !token.is_token_expired() {
            return Ok(Arc::clone(token));
        }
        debug!(provider = %provider, "access token expired, refreshing");
        self.refresh(provider, token, tenant_id).await.map(Arc::new)
    }

    /// Revokes `token` at the provider, if it has a revocation endpoint.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn revoke(&self, provider: OAuthProvider, token: &OAuthTokenData) {
        let Some(ref url) = self.config.client(provider).revoke_url else {
            debug!(provider = %provider, "provider has no revocation endpoint");
            return;
        };
        let value = token
            .refresh_token
            .as_deref()
            .unwrap_or(token.access_token.as_str());

        match self.http.post(url).form(&[("token", value)]).send().await {
            Ok(response) if response.status().is_success() => {
                info!(provider = %provider, "revoked token");
            }
            Ok(response) => {
                warn!(provider = %provider, status = %response.status(), "token revocation rejected");
            }
            Err(e) => {
                warn!(provider = %provider, error = %e, "token revocation failed");
            }
        }
    }

    async fn lookup_account(
        &self,
        provider: OAuthProvider,
        tokens: &OAuthTokenData,
    ) -> ProviderResult<Option<String>> {
        let Some(ref url) = self.config.client(provider).userinfo_url else {
            return Ok(None);
        };
        let response = self
            .http
            .get(url)
            .bearer_auth(&tokens.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::from_status(response.status().as_u16(), ""));
        }
        let body: serde_json::Value = response.json().await?;
        Ok(["email", "mail", "userPrincipalName"]
            .iter()
            .find_map(|key| body.get(*key).and_then(|v| v.as_str()))
            .map(str::to_string))
    }

    /// Registers a subscriber for [`AuthEvent`]s.
    pub fn subscribe(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<AuthEvent>) {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock_subscribers().push((id, tx));
        (id, rx)
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: &AuthEvent) {
        self.lock_subscribers()
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    /// Stops the loopback listener if one is running.
    pub async fn stop_listener(&self) {
        if let Some(server) = self.listener.lock().await.take() {
            server.stop();
        }
    }

    /// Stops the listener and forgets pending flows and subscribers.
    pub async fn teardown(&self) {
        self.stop_listener().await;
        self.pending.clear();
        self.lock_subscribers().clear();
        debug!("auth engine torn down");
    }
}

fn build_authorization_url(
    client: &OAuthClientConfig,
    client_id: &str,
    tenant_id: Option<&str>,
    redirect_uri: &str,
    pkce: &PkceChallenge,
    state: &str,
) -> ProviderResult<String> {
    let mut url = Url::parse(&client.auth_url_for(tenant_id))
        .map_err(|e| ProviderError::unknown(format!("invalid authorization URL: {}", e)))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &client.scopes.join(" "))
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", pkce.method())
            .append_pair("state", state);
        for (key, value) in &client.extra_auth_params {
            query.append_pair(key, value);
        }
    }
    Ok(url.into())
}

async fn parse_token_response(
    response: reqwest::Response,
    previous: Option<&OAuthTokenData>,
) -> ProviderResult<OAuthTokenData> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let detail: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
        let reason = detail
            .error_description
            .or(detail.error)
            .unwrap_or_else(|| format!("token endpoint returned {}", status));
        if status.is_server_error() {
            return Err(ProviderError::from_status(status.as_u16(), reason));
        }
        return Err(ProviderError::auth(format!("token request failed ({}): {}", status, reason)));
    }

    let parsed: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| ProviderError::parse(format!("invalid token response: {}", e)).with_source(e))?;

    let refresh_token = parsed
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| previous.and_then(|p| p.refresh_token.clone()));
    let mut token = OAuthTokenData::new(
        parsed.access_token,
        refresh_token,
        parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
    );
    token.scope = parsed.scope.or_else(|| previous.and_then(|p| p.scope.clone()));
    if let Some(token_type) = parsed.token_type {
        token.token_type = token_type;
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoBrowser;

    impl BrowserLauncher for NoBrowser {
        fn open(&self, _url: &str) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn engine_for(server: &MockServer) -> AuthEngine {
        let google = OAuthClientConfig::google()
            .with_client_id("test-client")
            .with_endpoints(format!("{}/auth", server.uri()), format!("{}/token", server.uri()))
            .with_revoke_url(Some(format!("{}/revoke", server.uri())))
            .with_userinfo_url(None);
        let config = AuthEngineConfig::default()
            .with_google(google)
            .with_port_range(42840, 42860);
        AuthEngine::new(config).unwrap().with_browser(Arc::new(NoBrowser))
    }

    fn expired_token() -> OAuthTokenData {
        OAuthTokenData::issued_at(
            Utc::now() - chrono::Duration::hours(2),
            "old-access",
            Some("old-refresh".to_string()),
            3600,
        )
    }

    #[tokio::test]
    async fn valid_token_is_returned_as_is() {
        let server = MockServer::start().await;
        let engine = engine_for(&server);
        let token = Arc::new(OAuthTokenData::new("access", Some("refresh".to_string()), 3600));

        let same = engine
            .ensure_valid_token(OAuthProvider::Google, &token, None)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&token, &same));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_keeps_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine_for(&server);
        let token = Arc::new(expired_token());
        let fresh = engine
            .ensure_valid_token(OAuthProvider::Google, &token, None)
            .await
            .unwrap();

        assert!(!Arc::ptr_eq(&token, &fresh));
        assert_eq!(fresh.access_token, "new-access");
        assert_eq!(fresh.refresh_token.as_deref(), Some("old-refresh"));
        assert!(fresh.expires_at > token.expires_at);
        assert!(!fresh.is_token_expired());
    }

    #[tokio::test]
    async fn rejected_refresh_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let engine = engine_for(&server);
        let err = engine
            .refresh(OAuthProvider::Google, &expired_token(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ProviderErrorCode::Auth);
        assert!(err.message().contains("expired or revoked"));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails() {
        let server = MockServer::start().await;
        let engine = engine_for(&server);
        let token = OAuthTokenData::new("access", None, -10);
        assert!(engine.refresh(OAuthProvider::Google, &token, None).await.is_err());
    }

    #[tokio::test]
    async fn error_callback_is_denied_without_state_lookup() {
        let server = MockServer::start().await;
        let engine = engine_for(&server);
        let (_id, mut rx) = engine.subscribe();

        let event = engine
            .handle_callback(CallbackParams {
                error: Some("access_denied".to_string()),
                error_description: Some("The user cancelled".to_string()),
                ..CallbackParams::default()
            })
            .await;

        match event {
            AuthEvent::Failure { error, .. } => {
                assert_eq!(error.kind, AuthFailureKind::Denied);
                assert!(error.message.contains("The user cancelled"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!rx.recv().await.unwrap().is_success());
    }

    #[tokio::test]
    async fn unknown_state_is_expired() {
        let server = MockServer::start().await;
        let engine = engine_for(&server);
        let event = engine
            .handle_callback(CallbackParams {
                code: Some("ABC".to_string()),
                state: Some("never-issued".to_string()),
                ..CallbackParams::default()
            })
            .await;
        match event {
            AuthEvent::Failure { error, .. } => assert_eq!(error.kind, AuthFailureKind::Expired),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_code_is_invalid() {
        let server = MockServer::start().await;
        let engine = engine_for(&server);
        let event = engine
            .handle_callback(CallbackParams {
                state: Some("s".to_string()),
                ..CallbackParams::default()
            })
            .await;
        match event {
            AuthEvent::Failure { error, .. } => {
                assert_eq!(error.kind, AuthFailureKind::InvalidCallback)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn wrong_protocol_scheme_is_rejected() {
        let server = MockServer::start().await;
        let engine = engine_for(&server);
        let event = engine
            .handle_protocol_callback("https://evil.example/callback?code=a&state=b")
            .await;
        assert!(!event.is_success());
    }

    #[tokio::test]
    async fn start_flow_without_client_id_fails_fast() {
        let mut config = AuthEngineConfig::default().with_port_range(42861, 42870);
        config.microsoft.client_id = None;
        let engine = Arc::new(AuthEngine::new(config).unwrap().with_browser(Arc::new(NoBrowser)));

        let err = engine
            .start_flow(OAuthProvider::Microsoft, FlowOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ProviderErrorCode::Auth);
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn authorization_url_carries_pkce_and_extras() {
        let server = MockServer::start().await;
        let engine = Arc::new(engine_for(&server));
        let flow = engine
            .start_flow(OAuthProvider::Google, FlowOptions::new().with_source_id("work"))
            .await
            .unwrap();

        let url = Url::parse(&flow.authorization_url).unwrap();
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "test-client");
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["state"], flow.state);
        assert_eq!(query["redirect_uri"], flow.redirect_uri);
        assert_eq!(query["access_type"], "offline");
        assert_eq!(query["prompt"], "consent");
        assert_eq!(engine.pending_count(), 1);

        engine.teardown().await;
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let server = MockServer::start().await;
        let engine = engine_for(&server);
        let (id, mut rx) = engine.subscribe();
        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));

        engine.handle_callback(CallbackParams::default()).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn revoke_failure_is_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        let engine = engine_for(&server);
        engine.revoke(OAuthProvider::Google, &expired_token()).await;
        // Microsoft has no revocation endpoint.
        engine.revoke(OAuthProvider::Microsoft, &expired_token()).await;
    }
}
