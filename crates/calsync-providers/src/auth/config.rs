//! OAuth client and engine configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};

/// Build-time Google client id, overridable at runtime with the same variable.
pub const GOOGLE_CLIENT_ID_ENV: &str = "CALSYNC_GOOGLE_CLIENT_ID";
/// Build-time Microsoft client id, overridable at runtime with the same variable.
pub const MICROSOFT_CLIENT_ID_ENV: &str = "CALSYNC_MICROSOFT_CLIENT_ID";

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

const MICROSOFT_AUTH_URL: &str = "https://login.microsoftonline.com/{tenant}/oauth2/v2.0/authorize";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token";
const MICROSOFT_USERINFO_URL: &str = "https://graph.microsoft.com/v1.0/me";

/// Tenant used when a Microsoft flow does not name one.
pub const DEFAULT_MICROSOFT_TENANT: &str = "common";

/// Default loopback port range.
pub const DEFAULT_PORT_RANGE: (u16, u16) = (42813, 42823);
/// Path served by the loopback listener.
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";
/// Pending requests older than this are discarded.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(10 * 60);
/// Delay between serving the callback page and stopping the listener.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);
/// Custom URI scheme accepted by `handle_protocol_callback`.
pub const DEFAULT_PROTOCOL_SCHEME: &str = "calsync";
/// Timeout for token endpoint requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth identity providers the engine knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Microsoft,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoints, scopes and client credentials for one OAuth provider.
///
/// Microsoft URLs contain a `{tenant}` placeholder filled per flow.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthClientConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    /// Revocation endpoint; `None` when the provider has none.
    pub revoke_url: Option<String>,
    /// Endpoint returning the account identity after sign-in.
    pub userinfo_url: Option<String>,
    pub scopes: Vec<String>,
    /// Provider-specific authorization URL parameters.
    pub extra_auth_params: Vec<(String, String)>,
}

impl fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("revoke_url", &self.revoke_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl OAuthClientConfig {
    /// Google Calendar defaults.
    pub fn google() -> Self {
        Self {
            client_id: default_client_id(GOOGLE_CLIENT_ID_ENV, option_env!("CALSYNC_GOOGLE_CLIENT_ID")),
            client_secret: None,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            revoke_url: Some(GOOGLE_REVOKE_URL.to_string()),
            userinfo_url: Some(GOOGLE_USERINFO_URL.to_string()),
            scopes: vec![
                "https://www.googleapis.com/auth/calendar".to_string(),
                "openid".to_string(),
                "email".to_string(),
            ],
            extra_auth_params: vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
        }
    }

    /// Microsoft identity platform defaults for Graph calendars.
    pub fn microsoft() -> Self {
        Self {
            client_id: default_client_id(
                MICROSOFT_CLIENT_ID_ENV,
                option_env!("CALSYNC_MICROSOFT_CLIENT_ID"),
            ),
            client_secret: None,
            auth_url: MICROSOFT_AUTH_URL.to_string(),
            token_url: MICROSOFT_TOKEN_URL.to_string(),
            revoke_url: None,
            userinfo_url: Some(MICROSOFT_USERINFO_URL.to_string()),
            scopes: vec![
                "offline_access".to_string(),
                "User.Read".to_string(),
                "Calendars.ReadWrite".to_string(),
            ],
            extra_auth_params: vec![
                ("prompt".to_string(), "select_account".to_string()),
                ("response_mode".to_string(), "query".to_string()),
            ],
        }
    }

    pub fn for_provider(provider: OAuthProvider) -> Self {
        match provider {
            OAuthProvider::Google => Self::google(),
            OAuthProvider::Microsoft => Self::microsoft(),
        }
    }

    /// Overrides the client id. Empty values are ignored.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        if !client_id.trim().is_empty() {
            self.client_id = Some(client_id);
        }
        self
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.client_secret = Some(secret);
        }
        self
    }

    /// Points the auth, token and revoke endpoints somewhere else.
    pub fn with_endpoints(mut self, auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self
    }

    pub fn with_revoke_url(mut self, url: Option<String>) -> Self {
        self.revoke_url = url;
        self
    }

    pub fn with_userinfo_url(mut self, url: Option<String>) -> Self {
        self.userinfo_url = url;
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Returns the client id, or an auth error when none is configured.
    pub fn require_client_id(&self, provider: OAuthProvider) -> ProviderResult<&str> {
        self.client_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::auth(format!("no OAuth client id configured for {}", provider))
                    .with_provider(provider.as_str())
            })
    }

    pub fn auth_url_for(&self, tenant: Option<&str>) -> String {
        fill_tenant(&self.auth_url, tenant)
    }

    pub fn token_url_for(&self, tenant: Option<&str>) -> String {
        fill_tenant(&self.token_url, tenant)
    }
}

fn fill_tenant(template: &str, tenant: Option<&str>) -> String {
    let tenant = tenant
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_MICROSOFT_TENANT);
    template.replace("{tenant}", tenant)
}

/// Runtime environment first, then the value baked in at build time.
fn default_client_id(var: &str, built_in: Option<&'static str>) -> Option<String> {
    std::env::var(var)
        .ok()
        .or_else(|| built_in.map(str::to_string))
        .filter(|id| !id.trim().is_empty())
}

/// Configuration for the [`AuthEngine`](super::AuthEngine).
#[derive(Debug, Clone)]
pub struct AuthEngineConfig {
    pub google: OAuthClientConfig,
    pub microsoft: OAuthClientConfig,
    /// Inclusive range of loopback ports, tried in ascending order.
    pub port_range: (u16, u16),
    pub callback_path: String,
    pub pending_ttl: Duration,
    pub shutdown_grace: Duration,
    pub protocol_scheme: String,
    pub http_timeout: Duration,
}

impl Default for AuthEngineConfig {
    fn default() -> Self {
        Self {
            google: OAuthClientConfig::google(),
            microsoft: OAuthClientConfig::microsoft(),
            port_range: DEFAULT_PORT_RANGE,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            pending_ttl: DEFAULT_PENDING_TTL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            protocol_scheme: DEFAULT_PROTOCOL_SCHEME.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl AuthEngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_google(mut self, config: OAuthClientConfig) -> Self {
        self.google = config;
        self
    }

    pub fn with_microsoft(mut self, config: OAuthClientConfig) -> Self {
        self.microsoft = config;
        self
    }

    pub fn with_port_range(mut self, start: u16, end: u16) -> Self {
        self.port_range = (start, end);
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn client(&self, provider: OAuthProvider) -> &OAuthClientConfig {
        match provider {
            OAuthProvider::Google => &self.google,
            OAuthProvider::Microsoft => &self.microsoft,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ProviderResult<()> {
        if self.port_range.0 == 0 || self.port_range.0 > self.port_range.1 {
            return Err(ProviderError::unknown(format!(
                "invalid loopback port range {}-{}",
                self.port_range.0, self.port_range.1
            )));
        }
        if !self.callback_path.starts_with('/') {
            return Err(ProviderError::unknown("callback path must start with '/'"));
        }
        for (provider, client) in [
            (OAuthProvider::Google, &self.google),
            (OAuthProvider::Microsoft, &self.microsoft),
        ] {
            for endpoint in [&client.auth_url, &client.token_url] {
                let filled = fill_tenant(endpoint, None);
                url::Url::parse(&filled).map_err(|e| {
                    ProviderError::unknown(format!("invalid {} endpoint {}: {}", provider, endpoint, e))
                })?;
            }
        }
        Ok(())
    }
}
