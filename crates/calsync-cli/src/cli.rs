//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// calsync - One view over Google, Outlook and CalDAV calendars
#[derive(Debug, Parser)]
#[command(name = "calsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CALSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in to or out of an OAuth source
    #[cfg(feature = "oauth")]
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Manage calendar sources
    Sources {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// List the calendars of a source
    Calendars {
        /// Source id
        source: String,
    },

    /// Read and write events
    Events {
        #[command(subcommand)]
        action: EventAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Sign-in actions.
#[cfg(feature = "oauth")]
#[derive(Debug, Subcommand)]
pub enum AuthAction {
    /// Run the browser sign-in and store the tokens
    Login {
        /// Source id
        source: String,

        /// Seconds to wait for the browser redirect
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Revoke and forget the stored tokens
    Logout {
        /// Source id
        source: String,
    },
}

/// Provider kinds accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderArg {
    Google,
    Outlook,
    Caldav,
}

impl From<ProviderArg> for calsync_core::ProviderKind {
    fn from(value: ProviderArg) -> Self {
        match value {
            ProviderArg::Google => Self::Google,
            ProviderArg::Outlook => Self::Outlook,
            ProviderArg::Caldav => Self::CalDav,
        }
    }
}

/// Source management actions.
#[derive(Debug, Subcommand)]
pub enum SourceAction {
    /// List configured sources
    List,

    /// Add a source
    Add {
        /// Unique source id
        id: String,

        /// Backend type
        #[arg(long, value_enum)]
        provider: ProviderArg,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Microsoft tenant (Outlook)
        #[arg(long)]
        tenant: Option<String>,

        /// Server URL (CalDAV)
        #[arg(long)]
        server_url: Option<String>,

        /// Username (CalDAV)
        #[arg(long)]
        username: Option<String>,

        /// Password or secret reference such as `pass::dav/me` (CalDAV)
        #[arg(long)]
        password: Option<String>,

        /// Calendar to sync (can be repeated)
        #[arg(long = "calendar", action = clap::ArgAction::Append)]
        calendars: Vec<String>,
    },

    /// Remove a source and its tokens
    Remove {
        /// Source id
        id: String,
    },

    /// Enable a source
    Enable {
        id: String,
    },

    /// Disable a source
    Disable {
        id: String,
    },

    /// Connect to every enabled source and report its status
    Check,
}

/// Event actions.
#[derive(Debug, Subcommand)]
pub enum EventAction {
    /// List events from one source or all enabled sources
    List {
        /// Source id (all enabled sources when omitted)
        source: Option<String>,

        /// Read only this calendar (can be repeated)
        #[arg(long = "calendar", action = clap::ArgAction::Append)]
        calendars: Vec<String>,

        /// Days to look ahead (overrides the configuration)
        #[arg(long)]
        days: Option<i64>,

        /// Maximum number of events per calendar
        #[arg(long)]
        limit: Option<usize>,

        /// Keep recurring series unexpanded
        #[arg(long)]
        no_expand: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Create an event
    Create {
        /// Source id
        source: String,

        /// Calendar id
        #[arg(long)]
        calendar: String,

        /// Event title
        #[arg(long)]
        summary: String,

        /// Start, RFC 3339 (`2025-02-05T10:00:00Z`) or a date for all-day events
        #[arg(long)]
        start: String,

        /// End, same format as the start; inclusive for all-day events
        #[arg(long)]
        end: String,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Change an event's title, location or description
    Update {
        /// Source id
        source: String,

        /// Event uid or provider id
        event: String,

        #[arg(long)]
        summary: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Overwrite even if the event changed remotely (Outlook only)
        #[arg(long)]
        force: bool,
    },

    /// Delete an event
    Delete {
        /// Source id
        source: String,

        /// Event uid or provider id
        event: String,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration with secrets masked
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
