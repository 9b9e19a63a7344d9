//! CalDAV provider configuration.

use std::time::Duration;

use calsync_core::CalDavCredentials;
use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// Configuration for the CalDAV provider.
#[derive(Clone)]
pub struct CalDavConfig {
    /// Server root used for discovery. Relative hrefs resolve against it.
    pub url: Url,

    pub username: String,

    /// Application-specific password.
    pub password: String,

    /// Whether to verify TLS certificates.
    pub verify_tls: bool,

    /// Request timeout.
    pub timeout: Duration,

    /// User agent string.
    pub user_agent: String,
}

impl std::fmt::Debug for CalDavConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalDavConfig")
            .field("url", &self.url.as_str())
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("verify_tls", &self.verify_tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CalDavConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Creates a configuration for `url` with the given credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(
        url: impl AsRef<str>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> ProviderResult<Self> {
        let url = Url::parse(url.as_ref()).map_err(|e| {
            ProviderError::unknown(format!("invalid CalDAV server URL: {}", e)).with_provider("caldav")
        })?;
        Ok(Self {
            url,
            username: username.into(),
            password: password.into(),
            verify_tls: true,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("calsync/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Builds a configuration from a source's stored credentials.
    pub fn from_credentials(credentials: &CalDavCredentials) -> ProviderResult<Self> {
        Self::new(
            &credentials.server_url,
            credentials.username.clone(),
            credentials.password.clone(),
        )
    }

    /// Disables TLS verification (for testing only).
    pub fn with_insecure_tls(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Resolves an href from a response against the server URL.
    pub fn resolve(&self, href: &str) -> String {
        self.url
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_credentials() {
        let creds = CalDavCredentials {
            server_url: "https://caldav.example.com/dav/".to_string(),
            username: "user".to_string(),
            password: "app-pass".to_string(),
        };
        let config = CalDavConfig::from_credentials(&creds).unwrap();
        assert_eq!(config.url.as_str(), "https://caldav.example.com/dav/");
        assert!(config.verify_tls);
        assert!(!format!("{:?}", config).contains("app-pass"));
    }

    #[test]
    fn invalid_url_returns_error() {
        assert!(CalDavConfig::new("not a valid url", "u", "p").is_err());
    }

    #[test]
    fn resolves_hrefs() {
        let config = CalDavConfig::new("https://caldav.example.com/dav/", "u", "p").unwrap();
        assert_eq!(
            config.resolve("work/"),
            "https://caldav.example.com/dav/work/"
        );
        assert_eq!(
            config.resolve("/calendars/user/personal/"),
            "https://caldav.example.com/calendars/user/personal/"
        );
        assert_eq!(
            config.resolve("https://other.example.com/cal/"),
            "https://other.example.com/cal/"
        );
    }
}
