//! Error taxonomy for provider operations.
//!
//! Every failure is classified into a [`ProviderErrorCode`]. Classification
//! looks at the HTTP status first, then at transport flags, and only falls
//! back to message heuristics when neither is available. Users never see
//! the raw error text: [`ProviderErrorCode::user_message`] gives the notice
//! that goes into provider status and write results.

use std::fmt;
use thiserror::Error;

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Credentials missing, expired or rejected.
    Auth,
    /// Connection failed or the server had a 5xx error.
    Network,
    /// Too many requests.
    RateLimit,
    /// Calendar or event does not exist.
    NotFound,
    /// The account lacks access, or the provider does not allow the operation.
    Permission,
    /// Response could not be decoded.
    Parse,
    /// The server did not answer in time.
    Timeout,
    /// Anything that does not fit elsewhere.
    Unknown,
    /// The caller cancelled the operation.
    Cancelled,
}

impl ProviderErrorCode {
    /// Returns true if this error is transient and the operation may be retried.
    ///
    /// Informational only; providers never retry on their own beyond the
    /// single refresh-and-retry on HTTP 401.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::Timeout)
    }

    /// Returns the snake_case name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::NotFound => "not_found",
            Self::Permission => "permission",
            Self::Parse => "parse",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns the message shown to users for this category.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Auth => "Sign-in expired. Reconnect this calendar account.",
            Self::Network => "Could not reach the calendar server. Check your connection.",
            Self::RateLimit => "The calendar service is busy. Sync will resume shortly.",
            Self::NotFound => "The calendar or event no longer exists.",
            Self::Permission => "This account does not have permission for that calendar.",
            Self::Parse => "The calendar server sent data that could not be read.",
            Self::Timeout => "The calendar server took too long to respond.",
            Self::Unknown => "Something went wrong while syncing this calendar.",
            Self::Cancelled => "Sync was cancelled.",
        }
    }

    /// Maps an HTTP status code to a category.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Auth,
            403 => Self::Permission,
            404 | 410 => Self::NotFound,
            408 | 504 => Self::Timeout,
            429 => Self::RateLimit,
            500..=599 => Self::Network,
            _ => Self::Unknown,
        }
    }

    /// Guesses a category from free-form error text.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["401", "unauthorized", "invalid_grant", "invalid_token", "token expired"]) {
            Self::Auth
        } else if has(&["403", "forbidden", "permission", "access denied"]) {
            Self::Permission
        } else if has(&["429", "rate limit", "too many requests", "quota"]) {
            Self::RateLimit
        } else if has(&["timed out", "timeout"]) {
            Self::Timeout
        } else if has(&["404", "not found", "410", "gone"]) {
            Self::NotFound
        } else if has(&[
            "network",
            "connection",
            "dns",
            "econnrefused",
            "econnreset",
            "unreachable",
        ]) {
            Self::Network
        } else if has(&["parse", "invalid json", "malformed", "unexpected token", "xml"]) {
            Self::Parse
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while interacting with a calendar provider.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    /// Technical message, for logs.
    message: String,
    /// The provider that generated this error (e.g., "google", "caldav").
    provider: Option<String>,
    /// HTTP status, when the error came from a response.
    status: Option<u16>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            status: None,
            source: None,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Auth, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimit, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Permission, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Parse, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Timeout, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Unknown, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ProviderErrorCode::Cancelled, "operation cancelled")
    }

    /// Creates an error from an HTTP status and the response body.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, truncate(&body, 300))
        };
        let mut err = Self::new(ProviderErrorCode::from_status(status), message);
        err.status = Some(status);
        err
    }

    /// Creates an error by classifying free-form text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ProviderErrorCode::from_message(&message), message)
    }

    /// Sets the provider name for this error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns the HTTP status this error was built from, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Returns the category-derived message for users.
    pub fn user_message(&self) -> &'static str {
        self.code.user_message()
    }

    /// Returns a copy without the source chain.
    pub fn detached(&self) -> Self {
        Self {
            code: self.code,
            message: self.message.clone(),
            provider: self.provider.clone(),
            status: self.status,
            source: None,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            ProviderErrorCode::Timeout
        } else if err.is_connect() || err.is_request() {
            ProviderErrorCode::Network
        } else if err.is_decode() {
            ProviderErrorCode::Parse
        } else if let Some(status) = err.status() {
            ProviderErrorCode::from_status(status.as_u16())
        } else {
            match ProviderErrorCode::from_message(&err.to_string()) {
                ProviderErrorCode::Unknown => ProviderErrorCode::Network,
                code => code,
            }
        };
        let status = err.status().map(|s| s.as_u16());
        let mut mapped = Self::new(code, format!("request failed: {}", err)).with_source(err);
        mapped.status = status;
        mapped
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
