//! CLI configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/calsync/config.toml` by default. Sources are an array of
//! tables; refreshed tokens are written back into their source entry.
//!
//! Credential values (OAuth `client_id` / `client_secret`, CalDAV
//! `password`) support secret references:
//! - `pass::path/in/store` resolved via `pass show`
//! - `env::VAR_NAME` resolved from the environment
//! - plain text used as-is
//!
//! ```toml
//! [oauth.google]
//! client_id = "env::GOOGLE_CLIENT_ID"
//! # or a Cloud Console download:
//! # credentials_file = "/home/alice/.config/calsync/client_secret.json"
//!
//! [[sources]]
//! id = "nextcloud"
//! provider = "caldav"
//!
//! [sources.caldav]
//! server_url = "https://cloud.example.com/remote.php/dav/"
//! username = "alice"
//! password = "pass::nextcloud/calsync"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use calsync_core::{CalendarSource, OAuthTokenData, TimeWindow};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use toml_edit::{ArrayOfTables, DocumentMut, Item, Table};
use tracing::debug;

use crate::error::{CliError, CliResult};
use crate::secret;

const REDACTED: &str = "[redacted]";

// ---------------------------------------------------------------------------
// CliConfig (config.toml)
// ---------------------------------------------------------------------------

/// Configuration for the calsync CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Debug mode.
    pub debug: bool,

    /// OAuth client settings.
    pub oauth: OAuthSettings,

    /// Default fetch window.
    pub sync: SyncSettings,

    /// Configured calendar accounts.
    pub sources: Vec<CalendarSource>,
}

/// OAuth client settings per identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub google: Option<OAuthClientSettings>,
    pub microsoft: Option<OAuthClientSettings>,

    /// Loopback port range for the redirect listener, as `[first, last]`.
    pub port_range: Option<(u16, u16)>,
}

/// Client registration overrides for one identity provider.
///
/// Unset values fall back to the built-in client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthClientSettings {
    /// OAuth client ID (supports `pass::` and `env::` prefixes).
    pub client_id: Option<String>,

    /// OAuth client secret (supports `pass::` and `env::` prefixes).
    pub client_secret: Option<String>,

    /// Google Cloud Console credentials JSON (Google only).
    ///
    /// `client_id` and `client_secret` above take precedence over the file.
    pub credentials_file: Option<PathBuf>,
}

/// Default time window for `events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub lookbehind_days: i64,
    pub lookahead_days: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            lookbehind_days: 1,
            lookahead_days: 30,
        }
    }
}

impl SyncSettings {
    /// The window around now these settings describe.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::around(
            Utc::now(),
            Duration::days(self.lookbehind_days),
            Duration::days(self.lookahead_days),
        )
    }
}

impl CliConfig {
    /// Loads configuration from `path`, or from the default path.
    ///
    /// A missing default file yields the default configuration; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    debug!(path = %path.display(), "no configuration file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| CliError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calsync")
    }

    /// Returns the source `id` with its secret references resolved.
    pub fn source(&self, id: &str) -> CliResult<CalendarSource> {
        let source = self
            .sources
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| CliError::UnknownSource(id.to_string()))?;
        resolve_source(source)
    }

    /// Every enabled source, resolved.
    pub fn enabled_sources(&self) -> CliResult<Vec<CalendarSource>> {
        self.sources
            .iter()
            .filter(|s| s.enabled)
            .map(resolve_source)
            .collect()
    }

    /// Checks every source and rejects duplicate ids.
    pub fn validate(&self) -> CliResult<()> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.id.as_str()) {
                return Err(CliError::Config(format!("duplicate source id `{}`", source.id)));
            }
        }
        if self.sync.lookbehind_days < 0 || self.sync.lookahead_days <= 0 {
            return Err(CliError::Config(
                "sync.lookbehind_days must be >= 0 and sync.lookahead_days > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// A copy safe to print: tokens and inline passwords are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for source in &mut copy.sources {
            if let Some(ref mut tokens) = source.tokens {
                tokens.access_token = REDACTED.to_string();
                if tokens.refresh_token.is_some() {
                    tokens.refresh_token = Some(REDACTED.to_string());
                }
            }
            if let Some(ref mut caldav) = source.caldav
                && !secret::is_reference(&caldav.password)
            {
                caldav.password = REDACTED.to_string();
            }
        }
        for client in [&mut copy.oauth.google, &mut copy.oauth.microsoft]
            .into_iter()
            .flatten()
        {
            if let Some(ref mut value) = client.client_secret
                && !secret::is_reference(value)
            {
                *value = REDACTED.to_string();
            }
        }
        copy
    }

    /// Builds the OAuth engine configuration, resolving client secrets.
    #[cfg(feature = "oauth")]
    pub fn auth_engine_config(&self) -> CliResult<calsync_providers::auth::AuthEngineConfig> {
        use calsync_providers::auth::{AuthEngineConfig, OAuthClientConfig};

        if let Some(path) = self
            .oauth
            .microsoft
            .as_ref()
            .and_then(|m| m.credentials_file.as_ref())
        {
            return Err(CliError::Config(format!(
                "oauth.microsoft.credentials_file ({}) is not supported, set client_id instead",
                path.display()
            )));
        }

        let google = self.oauth.google.as_ref();
        let mut config = AuthEngineConfig::default()
            .with_google(client_config(
                OAuthClientConfig::google(),
                google,
                google_file_credentials(google)?,
            )?)
            .with_microsoft(client_config(
                OAuthClientConfig::microsoft(),
                self.oauth.microsoft.as_ref(),
                None,
            )?);
        if let Some((first, last)) = self.oauth.port_range {
            config = config.with_port_range(first, last);
        }
        Ok(config)
    }
}

/// Client id and secret from `oauth.google.credentials_file`, if set.
#[cfg(feature = "oauth")]
fn google_file_credentials(
    settings: Option<&OAuthClientSettings>,
) -> CliResult<Option<(String, String)>> {
    let Some(path) = settings.and_then(|s| s.credentials_file.as_ref()) else {
        return Ok(None);
    };
    #[cfg(feature = "google")]
    {
        let creds = calsync_providers::google::GoogleClientCredentials::from_file(path)?;
        debug!(path = %path.display(), "loaded Google client credentials");
        Ok(Some((creds.client_id, creds.client_secret)))
    }
    #[cfg(not(feature = "google"))]
    {
        Err(CliError::Config(format!(
            "{}: Google support is not compiled in",
            path.display()
        )))
    }
}

#[cfg(feature = "oauth")]
fn client_config(
    base: calsync_providers::auth::OAuthClientConfig,
    settings: Option<&OAuthClientSettings>,
    from_file: Option<(String, String)>,
) -> CliResult<calsync_providers::auth::OAuthClientConfig> {
    let mut config = base;
    if let Some((id, secret)) = from_file {
        config = config.with_client_id(id).with_client_secret(secret);
    }
    let Some(settings) = settings else {
        return Ok(config);
    };
    if let Some(id) = secret::resolve_opt(settings.client_id.as_deref())? {
        config = config.with_client_id(id);
    }
    if let Some(value) = secret::resolve_opt(settings.client_secret.as_deref())? {
        config = config.with_client_secret(value);
    }
    Ok(config)
}

fn resolve_source(source: &CalendarSource) -> CliResult<CalendarSource> {
    let mut resolved = source.clone();
    if let Some(ref mut caldav) = resolved.caldav {
        caldav.password = secret::resolve(&caldav.password).map_err(|e| {
            CliError::Config(format!("source `{}`: cannot resolve password: {}", source.id, e))
        })?;
    }
    resolved.validate()?;
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// In-place edits of config.toml (comments and layout are preserved)
// ---------------------------------------------------------------------------

fn read_document(path: &Path) -> CliResult<DocumentMut> {
    let content = if path.exists() {
        std::fs::read_to_string(path)?
    } else {
        String::new()
    };
    content
        .parse::<DocumentMut>()
        .map_err(|e| CliError::Config(format!("failed to parse {}: {}", path.display(), e)))
}

fn write_document(path: &Path, doc: &DocumentMut) -> CliResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, doc.to_string())?;
    debug!(path = %path.display(), "configuration written");
    Ok(())
}

/// Serializes `value` into a standalone TOML table.
fn to_table<T: Serialize>(value: &T) -> CliResult<Table> {
    let text = toml::to_string(value)
        .map_err(|e| CliError::Config(format!("failed to serialize: {}", e)))?;
    let doc = text
        .parse::<DocumentMut>()
        .map_err(|e| CliError::Config(format!("failed to serialize: {}", e)))?;
    Ok(doc.as_table().clone())
}

fn sources_mut(doc: &mut DocumentMut) -> CliResult<&mut ArrayOfTables> {
    if !doc.contains_key("sources") {
        doc["sources"] = Item::ArrayOfTables(ArrayOfTables::new());
    }
    doc["sources"]
        .as_array_of_tables_mut()
        .ok_or_else(|| CliError::Config("`sources` must be an array of tables".to_string()))
}

fn find_source<'a>(sources: &'a mut ArrayOfTables, id: &str) -> Option<&'a mut Table> {
    sources
        .iter_mut()
        .find(|table| table.get("id").and_then(|v| v.as_str()) == Some(id))
}

/// Stores `tokens` in the entry for `source_id`.
pub fn save_tokens(path: &Path, source_id: &str, tokens: &OAuthTokenData) -> CliResult<()> {
    let mut doc = read_document(path)?;
    let table = to_table(tokens)?;
    let entry = find_source(sources_mut(&mut doc)?, source_id)
        .ok_or_else(|| CliError::UnknownSource(source_id.to_string()))?;
    entry["tokens"] = Item::Table(table);
    write_document(path, &doc)
}

/// Removes the tokens of `source_id`. Returns `false` if it had none.
pub fn clear_tokens(path: &Path, source_id: &str) -> CliResult<bool> {
    let mut doc = read_document(path)?;
    let entry = find_source(sources_mut(&mut doc)?, source_id)
        .ok_or_else(|| CliError::UnknownSource(source_id.to_string()))?;
    let removed = entry.remove("tokens").is_some();
    if removed {
        write_document(path, &doc)?;
    }
    Ok(removed)
}

/// Appends `source`. Fails if its id is already taken.
pub fn add_source(path: &Path, source: &CalendarSource) -> CliResult<()> {
    source.validate()?;
    let mut doc = read_document(path)?;
    let table = to_table(source)?;
    let sources = sources_mut(&mut doc)?;
    if find_source(sources, &source.id).is_some() {
        return Err(CliError::Config(format!("source `{}` already exists", source.id)));
    }
    sources.push(table);
    write_document(path, &doc)
}

/// Removes the source `id`. Returns `false` when there was none.
pub fn remove_source(path: &Path, id: &str) -> CliResult<bool> {
    let mut doc = read_document(path)?;
    let sources = sources_mut(&mut doc)?;
    let index = sources
        .iter()
        .position(|table| table.get("id").and_then(|v| v.as_str()) == Some(id));
    match index {
        Some(index) => {
            sources.remove(index);
            write_document(path, &doc)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Turns a source on or off.
pub fn set_enabled(path: &Path, id: &str, enabled: bool) -> CliResult<()> {
    let mut doc = read_document(path)?;
    let entry = find_source(sources_mut(&mut doc)?, id)
        .ok_or_else(|| CliError::UnknownSource(id.to_string()))?;
    entry["enabled"] = toml_edit::value(enabled);
    write_document(path, &doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calsync_core::ProviderKind;

    const SAMPLE: &str = r#"
# personal calendars
debug = false

[sync]
lookahead_days = 7

[[sources]]
id = "nextcloud"
provider = "caldav"
selected_calendars = ["/dav/calendars/alice/work/"]

[sources.caldav]
server_url = "https://cloud.example.com/remote.php/dav/"
username = "alice"
password = "env::_CALSYNC_TEST_DAV_PASSWORD"

[[sources]]
id = "work"
provider = "outlook"
tenant_id = "contoso"
"#;

    fn write_sample(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn parses_sources() {
        let config: CliConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].provider, ProviderKind::CalDav);
        assert_eq!(config.sources[1].tenant_id.as_deref(), Some("contoso"));
        assert!(config.sources[1].enabled);
        assert_eq!(config.sync.lookahead_days, 7);
        assert_eq!(config.sync.lookbehind_days, 1);
        config.validate().unwrap();
    }

    #[test]
    fn resolves_password_references() {
        unsafe {
            std::env::set_var("_CALSYNC_TEST_DAV_PASSWORD", "app-pass");
        }
        let config: CliConfig = toml::from_str(SAMPLE).unwrap();
        let source = config.source("nextcloud").unwrap();
        assert_eq!(source.caldav.unwrap().password, "app-pass");
        unsafe {
            std::env::remove_var("_CALSYNC_TEST_DAV_PASSWORD");
        }

        assert!(matches!(config.source("missing"), Err(CliError::UnknownSource(_))));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let config: CliConfig = toml::from_str(
            "[[sources]]\nid = \"a\"\nprovider = \"google\"\n[[sources]]\nid = \"a\"\nprovider = \"outlook\"\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn tokens_are_written_back_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);

        let tokens = OAuthTokenData::new("access", Some("refresh".to_string()), 3600);
        save_tokens(&path, "work", &tokens).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# personal calendars"));

        let reloaded = CliConfig::load_from(&path).unwrap();
        let stored = reloaded.sources[1].tokens.as_ref().unwrap();
        assert_eq!(stored.access_token, "access");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(stored.expires_at, tokens.expires_at);
        assert!(reloaded.sources[0].tokens.is_none());

        assert!(clear_tokens(&path, "work").unwrap());
        assert!(!clear_tokens(&path, "work").unwrap());
        assert!(CliConfig::load_from(&path).unwrap().sources[1].tokens.is_none());
    }

    #[test]
    fn saving_tokens_for_unknown_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        let tokens = OAuthTokenData::new("access", None, 3600);
        assert!(matches!(
            save_tokens(&path, "nope", &tokens),
            Err(CliError::UnknownSource(_))
        ));
    }

    #[test]
    fn add_and_remove_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let source = CalendarSource::new("radicale", ProviderKind::CalDav).with_caldav(
            "http://localhost:5232/",
            "bob",
            "pass::radicale/bob",
        );
        add_source(&path, &source).unwrap();
        assert!(add_source(&path, &source).is_err());

        let config = CliConfig::load_from(&path).unwrap();
        assert_eq!(config.sources, vec![source]);

        set_enabled(&path, "radicale", false).unwrap();
        assert!(!CliConfig::load_from(&path).unwrap().sources[0].enabled);

        assert!(remove_source(&path, "radicale").unwrap());
        assert!(!remove_source(&path, "radicale").unwrap());
        assert!(CliConfig::load_from(&path).unwrap().sources.is_empty());
    }

    #[test]
    fn redaction_masks_inline_secrets_only() {
        let mut config: CliConfig = toml::from_str(SAMPLE).unwrap();
        config.sources[1].tokens = Some(OAuthTokenData::new("access", Some("refresh".into()), 60));
        config.oauth.google = Some(OAuthClientSettings {
            client_id: Some("id.apps.googleusercontent.com".to_string()),
            client_secret: Some("inline-secret".to_string()),
            ..Default::default()
        });

        let dumped = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!dumped.contains("inline-secret"));
        assert!(!dumped.contains("\"access\""));
        assert!(dumped.contains("env::_CALSYNC_TEST_DAV_PASSWORD"));
        assert!(dumped.contains("id.apps.googleusercontent.com"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CliConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[cfg(feature = "oauth")]
    #[test]
    fn engine_config_uses_overrides() {
        use calsync_providers::auth::OAuthProvider;

        let config: CliConfig = toml::from_str(
            "[oauth]\nport_range = [43000, 43010]\n[oauth.microsoft]\nclient_id = \"ms-client\"\n",
        )
        .unwrap();
        let engine = config.auth_engine_config().unwrap();
        assert_eq!(engine.port_range, (43000, 43010));
        assert_eq!(
            engine.client(OAuthProvider::Microsoft).client_id.as_deref(),
            Some("ms-client")
        );
    }

    #[cfg(feature = "google")]
    #[test]
    fn google_credentials_file_feeds_engine_config() {
        use calsync_providers::auth::OAuthProvider;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("client_secret.json");
        std::fs::write(
            &file,
            r#"{"installed": {"client_id": "file-id.apps.googleusercontent.com", "client_secret": "file-secret"}}"#,
        )
        .unwrap();

        let mut config = CliConfig::default();
        config.oauth.google = Some(OAuthClientSettings {
            credentials_file: Some(file.clone()),
            ..Default::default()
        });
        let engine = config.auth_engine_config().unwrap();
        let google = engine.client(OAuthProvider::Google);
        assert_eq!(google.client_id.as_deref(), Some("file-id.apps.googleusercontent.com"));
        assert_eq!(google.client_secret.as_deref(), Some("file-secret"));

        // An explicit client id wins over the file.
        config.oauth.google = Some(OAuthClientSettings {
            client_id: Some("explicit-id".to_string()),
            credentials_file: Some(file),
            ..Default::default()
        });
        let engine = config.auth_engine_config().unwrap();
        let google = engine.client(OAuthProvider::Google);
        assert_eq!(google.client_id.as_deref(), Some("explicit-id"));
        assert_eq!(google.client_secret.as_deref(), Some("file-secret"));
    }

    #[cfg(feature = "google")]
    #[test]
    fn unreadable_credentials_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CliConfig::default();
        config.oauth.google = Some(OAuthClientSettings {
            credentials_file: Some(dir.path().join("absent.json")),
            ..Default::default()
        });
        assert!(config.auth_engine_config().is_err());
    }
}
