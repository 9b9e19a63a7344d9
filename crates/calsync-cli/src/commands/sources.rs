//! Source management commands.

use calsync_core::{CalendarSource, ProviderKind};
use calsync_providers::ConnectionState;

use super::Context;
use crate::config::{self, CliConfig};
use crate::error::{CliError, CliResult};

/// What `sources add` was given on the command line.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub id: String,
    pub provider: ProviderKind,
    pub name: Option<String>,
    pub tenant: Option<String>,
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub calendars: Vec<String>,
}

impl NewSource {
    /// Builds and validates the source to store.
    pub fn into_source(self) -> CliResult<CalendarSource> {
        let mut source = CalendarSource::new(self.id, self.provider)
            .with_selected_calendars(self.calendars);
        source.name = self.name;

        match self.provider {
            ProviderKind::CalDav => {
                let (Some(url), Some(user), Some(password)) =
                    (self.server_url, self.username, self.password)
                else {
                    return Err(CliError::Config(
                        "CalDAV sources need --server-url, --username and --password".to_string(),
                    ));
                };
                source = source.with_caldav(url, user, password);
            }
            ProviderKind::Outlook => source.tenant_id = self.tenant,
            ProviderKind::Google => {}
        }

        source.validate()?;
        Ok(source)
    }
}

/// List configured sources.
pub fn list(config: &CliConfig) {
    if config.sources.is_empty() {
        println!("No sources configured. Add one with `calsync sources add`.");
        return;
    }

    for source in &config.sources {
        let state = if !source.enabled {
            "disabled"
        } else if source.provider.uses_oauth() && source.tokens.is_none() {
            "signed out"
        } else {
            "enabled"
        };
        println!(
            "{:<16} {:<8} {:<10} {}",
            source.id,
            source.provider.as_str(),
            state,
            source.display_name()
        );
        if !source.selected_calendars.is_empty() {
            println!("{:<16} calendars: {}", "", source.selected_calendars.join(", "));
        }
    }
}

/// Add a source to the configuration file.
pub fn add(ctx: &Context, new: NewSource) -> CliResult<()> {
    if ctx.config.sources.iter().any(|s| s.id == new.id) {
        return Err(CliError::Config(format!("source `{}` already exists", new.id)));
    }
    let source = new.into_source()?;
    config::add_source(&ctx.path, &source)?;

    println!("Added source `{}`.", source.id);
    if source.provider.uses_oauth() {
        println!("Sign in with: calsync auth login {}", source.id);
    }
    Ok(())
}

/// Remove a source and its stored tokens.
pub async fn remove(ctx: &Context, id: &str) -> CliResult<()> {
    #[cfg(feature = "oauth")]
    if let Ok(source) = ctx.config.source(id)
        && let Some(ref tokens) = source.tokens
    {
        let provider = match source.provider {
            ProviderKind::Google => Some(calsync_providers::auth::OAuthProvider::Google),
            ProviderKind::Outlook => Some(calsync_providers::auth::OAuthProvider::Microsoft),
            ProviderKind::CalDav => None,
        };
        if let Some(provider) = provider {
            ctx.engine().revoke(provider, tokens).await;
        }
    }

    if !config::remove_source(&ctx.path, id)? {
        return Err(CliError::UnknownSource(id.to_string()));
    }
    println!("Removed source `{}`.", id);
    Ok(())
}

/// Enable or disable a source.
pub fn set_enabled(ctx: &Context, id: &str, enabled: bool) -> CliResult<()> {
    if !ctx.config.sources.iter().any(|s| s.id == id) {
        return Err(CliError::UnknownSource(id.to_string()));
    }
    config::set_enabled(&ctx.path, id, enabled)?;
    println!(
        "Source `{}` {}.",
        id,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Connect to every enabled source and print its status.
///
/// Returns an error if any source failed to connect.
pub async fn check(ctx: &Context) -> CliResult<()> {
    let sources = ctx.config.enabled_sources()?;
    if sources.is_empty() {
        println!("No enabled sources.");
        return Ok(());
    }

    let mut failed = 0;
    for source in sources {
        let (_, provider) = ctx.provider(&source.id)?;
        let connected = provider.connect().await;
        let status = provider.status();

        if connected && status.state != ConnectionState::Error {
            println!("{:<16} ok", source.id);
        } else {
            failed += 1;
            let message = status
                .message
                .unwrap_or_else(|| "could not connect".to_string());
            println!("{:<16} {}: {}", source.id, status.state.as_str(), message);
        }
    }

    if failed > 0 {
        return Err(CliError::Config(format!("{} source(s) failed to connect", failed)));
    }
    Ok(())
}
