//! Calendar source configuration and credential types.
//!
//! A [`CalendarSource`] is owned by the caller. The engine reads it to build
//! a provider and hands refreshed [`OAuthTokenData`] back through a callback
//! rather than writing to the source itself.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seconds before `expires_at` at which a token is already treated as expired.
pub const TOKEN_EXPIRY_SKEW_SECS: i64 = 5 * 60;

/// Default refresh interval for a source, in minutes.
pub const DEFAULT_REFRESH_INTERVAL_MINUTES: u32 = 15;

/// The kind of backend a source talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Outlook,
    CalDav,
}

impl ProviderKind {
    /// Returns the lowercase name used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Outlook => "outlook",
            Self::CalDav => "caldav",
        }
    }

    /// Returns `true` for providers that authenticate with OAuth.
    pub fn uses_oauth(&self) -> bool {
        matches!(self, Self::Google | Self::Outlook)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// OAuth tokens for one account.
///
/// Refresh replaces the whole value; fields are never merged in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokenData {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry instant.
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
}

impl OAuthTokenData {
    /// Creates token data issued now, expiring `expires_in_secs` from now.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: i64,
    ) -> Self {
        Self::issued_at(Utc::now(), access_token, refresh_token, expires_in_secs)
    }

    /// Creates token data issued at `now`.
    ///
    /// A negative lifetime is clamped to zero so `issued_at <= expires_at`.
    pub fn issued_at(
        now: DateTime<Utc>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: now + Duration::seconds(expires_in_secs.max(0)),
            scope: None,
            token_type: default_token_type(),
            issued_at: now,
        }
    }

    /// Builder method to set the granted scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Builder method to set the token type.
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// Returns `true` if the token must be refreshed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at - Duration::seconds(TOKEN_EXPIRY_SKEW_SECS)
    }

    /// Returns `true` if the token must be refreshed now.
    pub fn is_token_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns `true` if a refresh token is available.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for OAuthTokenData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokenData")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Basic-auth credentials for a CalDAV server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalDavCredentials {
    pub server_url: String,
    pub username: String,
    /// Application-specific password.
    pub password: String,
}

impl fmt::Debug for CalDavCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalDavCredentials")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Errors found while validating a [`CalendarSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("calendar source id must not be empty")]
    EmptyId,

    #[error("source `{0}` uses caldav but has no caldav credentials")]
    MissingCalDavCredentials(String),

    #[error("source `{id}` has an invalid server url: {source}")]
    InvalidServerUrl {
        id: String,
        #[source]
        source: url::ParseError,
    },

    #[error("source `{0}` has an empty caldav username")]
    MissingUsername(String),
}

fn default_enabled() -> bool {
    true
}

fn default_refresh_interval() -> u32 {
    DEFAULT_REFRESH_INTERVAL_MINUTES
}

/// One configured calendar account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSource {
    pub id: String,
    /// Human-readable label.
    #[serde(default)]
    pub name: Option<String>,
    pub provider: ProviderKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Calendars to sync. Empty means the provider's default selection.
    #[serde(default)]
    pub selected_calendars: Vec<String>,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_minutes: u32,
    /// Microsoft tenant (`common` when unset).
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub tokens: Option<OAuthTokenData>,
    #[serde(default)]
    pub caldav: Option<CalDavCredentials>,
}

impl CalendarSource {
    /// Creates an enabled source with no credentials.
    pub fn new(id: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            provider,
            enabled: true,
            selected_calendars: Vec::new(),
            refresh_interval_minutes: DEFAULT_REFRESH_INTERVAL_MINUTES,
            tenant_id: None,
            tokens: None,
            caldav: None,
        }
    }

    /// Builder method to attach OAuth tokens.
    pub fn with_tokens(mut self, tokens: OAuthTokenData) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Builder method to attach CalDAV credentials.
    pub fn with_caldav(
        mut self,
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.caldav = Some(CalDavCredentials {
            server_url: server_url.into(),
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Builder method to select calendars.
    pub fn with_selected_calendars(mut self, ids: Vec<String>) -> Self {
        self.selected_calendars = ids;
        self
    }

    /// Builder method to enable or disable the source.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the label, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Checks that the source carries what its provider needs.
    ///
    /// OAuth sources without tokens are valid: they still need a sign-in.
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.id.trim().is_empty() {
            return Err(SourceError::EmptyId);
        }

        if self.provider == ProviderKind::CalDav {
            let creds = self
                .caldav
                .as_ref()
                .ok_or_else(|| SourceError::MissingCalDavCredentials(self.id.clone()))?;
            url::Url::parse(&creds.server_url).map_err(|source| SourceError::InvalidServerUrl {
                id: self.id.clone(),
                source,
            })?;
            if creds.username.trim().is_empty() {
                return Err(SourceError::MissingUsername(self.id.clone()));
            }
        }

        Ok(())
    }
}
