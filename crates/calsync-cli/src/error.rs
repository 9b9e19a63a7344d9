//! CLI error types.

use std::fmt;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI.
#[derive(Debug)]
pub enum CliError {
    /// Configuration error.
    Config(String),
    /// Provider error.
    Provider(calsync_providers::ProviderError),
    /// IO error.
    Io(std::io::Error),
    /// Authentication required or failed.
    Auth(String),
    /// No source with this id.
    UnknownSource(String),
    /// A create, update or delete was rejected.
    Write(String),
    /// Timed out waiting for something (sign-in, ...).
    Timeout(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Provider(err) => write!(f, "{}\n  {}", err.user_message(), err),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Auth(msg) => write!(f, "authentication failed: {}", msg),
            Self::UnknownSource(id) => write!(f, "no source named `{}` in the configuration", id),
            Self::Write(msg) => write!(f, "write failed: {}", msg),
            Self::Timeout(msg) => write!(f, "timeout: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Provider(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<calsync_providers::ProviderError> for CliError {
    fn from(err: calsync_providers::ProviderError) -> Self {
        Self::Provider(err)
    }
}

impl From<calsync_core::SourceError> for CliError {
    fn from(err: calsync_core::SourceError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<calsync_core::TracingError> for CliError {
    fn from(err: calsync_core::TracingError) -> Self {
        Self::Config(err.to_string())
    }
}
