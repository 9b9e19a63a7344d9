//! Google Calendar provider configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProviderError, ProviderResult};

/// Client id and secret read from a Google Cloud Console credentials file.
#[derive(Clone, PartialEq, Eq)]
pub struct GoogleClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for GoogleClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Structure of Google's OAuth credentials JSON file.
///
/// Supports the Cloud Console layout with an `installed` or `web` section
/// and the flat layout with `client_id`/`client_secret` at the root.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl GoogleClientCredentials {
    /// Loads credentials from a Google Cloud Console JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ProviderError::not_found(format!(
                "failed to read credentials file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parses credentials from a Google credentials JSON string.
    pub fn from_json(json: &str) -> ProviderResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| ProviderError::parse(format!("failed to parse credentials JSON: {}", e)))?;

        if let Some(nested) = file.installed.or(file.web) {
            return Ok(Self {
                client_id: nested.client_id,
                client_secret: nested.client_secret,
            });
        }
        match (file.client_id, file.client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(Self {
                client_id,
                client_secret,
            }),
            _ => Err(ProviderError::parse(
                "credentials file must contain an 'installed'/'web' section or 'client_id'/'client_secret'",
            )),
        }
    }
}

/// Configuration for the Google Calendar provider.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// Calendar API base URL.
    pub api_base: String,

    /// Calendars read when neither the caller nor the source selects any.
    ///
    /// Defaults to the primary calendar.
    pub calendar_ids: Vec<String>,

    /// Request timeout.
    pub timeout: Duration,

    /// Number of items requested per page.
    pub page_size: u32,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_base: Self::DEFAULT_API_BASE.to_string(),
            calendar_ids: vec!["primary".to_string()],
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

impl GoogleConfig {
    /// Base URL for Google Calendar API v3.
    pub const DEFAULT_API_BASE: &'static str = "https://www.googleapis.com/calendar/v3";

    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default page size; the API allows up to 2500.
    pub const DEFAULT_PAGE_SIZE: u32 = 250;

    pub fn new() -> Self {
        Self::default()
    }

    /// Points the provider at another API root, e.g. a test server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_calendar_ids(mut self, ids: Vec<String>) -> Self {
        self.calendar_ids = ids;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ProviderResult<()> {
        url::Url::parse(&self.api_base)
            .map_err(|e| ProviderError::unknown(format!("invalid API base URL: {}", e)))?;
        if self.page_size == 0 {
            return Err(ProviderError::unknown("page size must be positive"));
        }
        Ok(())
    }
}
