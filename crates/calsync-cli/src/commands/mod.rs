//! Command implementations.

#[cfg(feature = "oauth")]
pub mod auth;
pub mod calendars;
pub mod config;
pub mod events;
pub mod sources;

use std::path::PathBuf;
use std::sync::Arc;

use calsync_core::CalendarSource;
use calsync_providers::{CalendarProvider, SourceManager};

use crate::config::CliConfig;
use crate::error::CliResult;

/// Loaded configuration plus the engine objects commands share.
pub struct Context {
    pub config: CliConfig,
    /// File that edits and refreshed tokens are written to.
    pub path: PathBuf,
    manager: SourceManager,
    #[cfg(feature = "oauth")]
    engine: Arc<calsync_providers::auth::AuthEngine>,
}

impl Context {
    pub fn new(config: CliConfig, path: PathBuf) -> CliResult<Self> {
        #[cfg(feature = "oauth")]
        {
            let engine = Arc::new(calsync_providers::auth::AuthEngine::new(
                config.auth_engine_config()?,
            )?);
            let manager = SourceManager::new()
                .with_auth_engine(Arc::clone(&engine))
                .with_token_sink(token_sink(path.clone()));
            Ok(Self {
                config,
                path,
                manager,
                engine,
            })
        }
        #[cfg(not(feature = "oauth"))]
        {
            Ok(Self {
                config,
                path,
                manager: SourceManager::new(),
            })
        }
    }

    #[cfg(feature = "oauth")]
    pub fn engine(&self) -> &Arc<calsync_providers::auth::AuthEngine> {
        &self.engine
    }

    /// The provider for the configured source `id`.
    pub fn provider(&self, id: &str) -> CliResult<(CalendarSource, Arc<dyn CalendarProvider>)> {
        let source = self.config.source(id)?;
        let provider = self.manager.provider_for(&source);
        Ok((source, provider))
    }

    /// Disconnects every provider and stops the sign-in listener.
    pub async fn shutdown(&self) {
        self.manager.dispose_all().await;
        #[cfg(feature = "oauth")]
        self.engine.teardown().await;
    }
}

/// Persists refreshed tokens into the configuration file.
#[cfg(feature = "oauth")]
fn token_sink(path: PathBuf) -> calsync_providers::TokenSink {
    Arc::new(move |source_id: &str, tokens: &calsync_core::OAuthTokenData| {
        match crate::config::save_tokens(&path, source_id, tokens) {
            Ok(()) => tracing::debug!(source = %source_id, "stored refreshed tokens"),
            Err(e) => tracing::warn!(source = %source_id, error = %e, "could not store refreshed tokens"),
        }
    })
}
