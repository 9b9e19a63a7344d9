//! Source manager: one cached provider per configured calendar source.
//!
//! The manager turns a [`CalendarSource`] into a ready [`CalendarProvider`]
//! and keeps it for later calls, so tokens refreshed by one call are reused
//! by the next. Sources that cannot be served (disabled, invalid, or whose
//! provider is not compiled in) still get a provider: an
//! [`ErrorProvider`] that reports why.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use calsync_core::{CalendarSource, ProviderKind};
use tracing::{debug, info, warn};

#[cfg(feature = "oauth")]
use crate::auth::AuthEngine;
#[cfg(feature = "caldav")]
use crate::caldav::{CalDavConfig, CalDavProvider};
use crate::error::{ProviderError, ProviderResult};
#[cfg(feature = "google")]
use crate::google::{GoogleConfig, GoogleProvider};
#[cfg(feature = "outlook")]
use crate::outlook::{OutlookConfig, OutlookProvider};
use crate::provider::{CalendarProvider, ErrorProvider};
#[cfg(feature = "oauth")]
use crate::rest::TokenSink;

type ProviderMap = HashMap<String, Arc<dyn CalendarProvider>>;

/// Creates and caches providers keyed by source id.
pub struct SourceManager {
    #[cfg(feature = "oauth")]
    engine: Option<Arc<AuthEngine>>,
    #[cfg(feature = "oauth")]
    sink: Option<TokenSink>,
    #[cfg(feature = "google")]
    google: GoogleConfig,
    #[cfg(feature = "outlook")]
    outlook: OutlookConfig,
    providers: Mutex<ProviderMap>,
}

impl std::fmt::Debug for SourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceManager")
            .field("sources", &self.source_ids())
            .finish_non_exhaustive()
    }
}

impl Default for SourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceManager {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "oauth")]
            engine: None,
            #[cfg(feature = "oauth")]
            sink: None,
            #[cfg(feature = "google")]
            google: GoogleConfig::default(),
            #[cfg(feature = "outlook")]
            outlook: OutlookConfig::default(),
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the engine used by OAuth providers for refreshes.
    #[cfg(feature = "oauth")]
    pub fn with_auth_engine(mut self, engine: Arc<AuthEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the callback that receives refreshed tokens.
    #[cfg(feature = "oauth")]
    pub fn with_token_sink(mut self, sink: TokenSink) -> Self {
        self.sink = Some(sink);
        self
    }

    #[cfg(feature = "google")]
    pub fn with_google_config(mut self, config: GoogleConfig) -> Self {
        self.google = config;
        self
    }

    #[cfg(feature = "outlook")]
    pub fn with_outlook_config(mut self, config: OutlookConfig) -> Self {
        self.outlook = config;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProviderMap> {
        self.providers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the provider for `source`, creating it on first use.
    pub fn provider_for(&self, source: &CalendarSource) -> Arc<dyn CalendarProvider> {
        if let Some(provider) = self.lock().get(&source.id) {
            return Arc::clone(provider);
        }

        let provider = self.build(source);
        let mut providers = self.lock();
        // Another caller may have built one meanwhile; keep the first.
        Arc::clone(providers.entry(source.id.clone()).or_insert(provider))
    }

    /// Returns the cached provider for `source_id`, if any.
    pub fn get(&self, source_id: &str) -> Option<Arc<dyn CalendarProvider>> {
        self.lock().get(source_id).cloned()
    }

    /// Ids of every source with a cached provider.
    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Disconnects and drops the provider for `source_id`.
    ///
    /// Returns `false` when no provider was cached.
    pub async fn remove(&self, source_id: &str) -> bool {
        let removed = self.lock().remove(source_id);
        match removed {
            Some(provider) => {
                provider.disconnect().await;
                debug!(source = %source_id, "removed provider");
                true
            }
            None => false,
        }
    }

    /// Disconnects every provider and empties the cache.
    pub async fn dispose_all(&self) {
        let providers: Vec<_> = self.lock().drain().collect();
        let count = providers.len();
        for (_, provider) in providers {
            provider.disconnect().await;
        }
        info!(count, "disposed all providers");
    }

    fn build(&self, source: &CalendarSource) -> Arc<dyn CalendarProvider> {
        let kind = source.provider.as_str();
        if !source.enabled {
            debug!(source = %source.id, provider = kind, "source is disabled");
            return Arc::new(ErrorProvider::disabled(kind));
        }

        if let Err(e) = source.validate() {
            warn!(source = %source.id, error = %e, "invalid calendar source");
            let err = ProviderError::unknown(e.to_string()).with_source(e);
            return Arc::new(ErrorProvider::new(kind, err));
        }

        match self.create(source) {
            Ok(provider) => {
                info!(source = %source.id, provider = kind, "created provider");
                provider
            }
            Err(e) => {
                warn!(source = %source.id, provider = kind, error = %e, "failed to create provider");
                Arc::new(ErrorProvider::new(kind, e))
            }
        }
    }

    fn create(&self, source: &CalendarSource) -> ProviderResult<Arc<dyn CalendarProvider>> {
        match source.provider {
            #[cfg(feature = "google")]
            ProviderKind::Google => {
                let provider =
                    GoogleProvider::new(self.google.clone(), source, self.engine()?, self.sink.clone())?;
                Ok(Arc::new(provider))
            }
            #[cfg(feature = "outlook")]
            ProviderKind::Outlook => {
                let provider = OutlookProvider::new(
                    self.outlook.clone(),
                    source,
                    self.engine()?,
                    self.sink.clone(),
                )?;
                Ok(Arc::new(provider))
            }
            #[cfg(feature = "caldav")]
            ProviderKind::CalDav => {
                let credentials = source.caldav.as_ref().ok_or_else(|| {
                    ProviderError::auth(format!("source `{}` has no CalDAV credentials", source.id))
                })?;
                let config = CalDavConfig::from_credentials(credentials)?;
                let provider = CalDavProvider::new(config)?
                    .with_selected_calendars(source.selected_calendars.clone());
                Ok(Arc::new(provider))
            }
            #[allow(unreachable_patterns)]
            other => Err(ProviderError::unknown(format!(
                "{} support is not compiled in",
                other
            ))),
        }
    }

    #[cfg(feature = "oauth")]
    fn engine(&self) -> ProviderResult<Arc<AuthEngine>> {
        self.engine
            .clone()
            .ok_or_else(|| ProviderError::auth("no OAuth engine configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::provider::FetchOptions;
    use crate::status::ConnectionState;

    #[tokio::test]
    async fn disabled_source_gets_a_disabled_provider() {
        let manager = SourceManager::new();
        let source = CalendarSource::new("work", ProviderKind::CalDav)
            .with_caldav("https://dav.example.com/", "me", "pw")
            .with_enabled(false);

        let provider = manager.provider_for(&source);
        assert_eq!(provider.status().state, ConnectionState::Disabled);
        assert!(provider.get_events(FetchOptions::new()).await.is_err());
    }

    #[test]
    fn providers_are_cached_per_source() {
        let manager = SourceManager::new();
        let source = CalendarSource::new("work", ProviderKind::CalDav)
            .with_caldav("https://dav.example.com/", "me", "pw");

        let first = manager.provider_for(&source);
        let second = manager.provider_for(&source);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.source_ids(), vec!["work".to_string()]);
    }

    #[tokio::test]
    async fn invalid_source_reports_an_error() {
        let manager = SourceManager::new();
        let source = CalendarSource::new("broken", ProviderKind::CalDav);

        let provider = manager.provider_for(&source);
        assert!(provider.status().is_error());
        let err = provider.list_calendars().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Unknown);
    }

    #[cfg(feature = "google")]
    #[tokio::test]
    async fn oauth_source_without_engine_is_an_auth_error() {
        let manager = SourceManager::new();
        let provider = manager.provider_for(&CalendarSource::new("g", ProviderKind::Google));
        assert_eq!(provider.name(), "google");
        let err = provider.get_events(FetchOptions::new()).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Auth);
    }

    #[tokio::test]
    async fn remove_and_dispose() {
        let manager = SourceManager::new();
        for id in ["a", "b", "c"] {
            manager.provider_for(
                &CalendarSource::new(id, ProviderKind::CalDav)
                    .with_caldav("https://dav.example.com/", "me", "pw"),
            );
        }

        assert!(manager.remove("a").await);
        assert!(!manager.remove("a").await);
        assert!(manager.get("a").is_none());

        manager.dispose_all().await;
        assert!(manager.source_ids().is_empty());
    }
}
