//! Outlook (Microsoft Graph) provider configuration.

use std::time::Duration;

use crate::error::{ProviderError, ProviderResult};

/// Configuration for the Outlook provider.
#[derive(Debug, Clone)]
pub struct OutlookConfig {
    /// Graph API base URL, including the version segment.
    pub api_base: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Value sent as `$top`.
    pub page_size: u32,
}

impl Default for OutlookConfig {
    fn default() -> Self {
        Self {
            api_base: Self::DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

impl OutlookConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://graph.microsoft.com/v1.0";

    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub const DEFAULT_PAGE_SIZE: u32 = 100;

    pub fn new() -> Self {
        Self::default()
    }

    /// Points the provider at another API root, e.g. a test server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
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

    pub fn validate(&self) -> ProviderResult<()> {
        url::Url::parse(&self.api_base)
            .map_err(|e| ProviderError::unknown(format!("invalid API base URL: {}", e)))?;
        if self.page_size == 0 {
            return Err(ProviderError::unknown("page size must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = OutlookConfig::default();
        assert_eq!(config.api_base, "https://graph.microsoft.com/v1.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_config() {
        assert!(OutlookConfig::new().with_api_base("::").validate().is_err());
        assert!(OutlookConfig::new().with_page_size(0).validate().is_err());
    }
}
