//! Provider connection status and change notification.

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use crate::error::{ProviderError, ProviderErrorCode};

/// Connection state of a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Syncing,
    Error,
    Disabled,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Syncing => "syncing",
            Self::Error => "error",
            Self::Disabled => "disabled",
        }
    }
}

/// Snapshot of a provider's status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderStatus {
    pub state: ConnectionState,
    /// Category of the last error, while in [`ConnectionState::Error`].
    pub error_code: Option<ProviderErrorCode>,
    /// User-facing notice derived from `error_code`.
    pub message: Option<String>,
    /// The last successful sync time, if any.
    pub last_sync: Option<DateTime<Utc>>,
    /// Number of events returned by the last sync.
    pub last_event_count: usize,
}

impl ProviderStatus {
    /// Returns `true` in the error state.
    pub fn is_error(&self) -> bool {
        self.state == ConnectionState::Error
    }
}

/// Owns a provider's status and broadcasts every transition.
#[derive(Debug)]
pub struct StatusTracker {
    provider: String,
    tx: watch::Sender<ProviderStatus>,
}

impl StatusTracker {
    pub fn new(provider: impl Into<String>) -> Self {
        Self::with_initial(provider, ProviderStatus::default())
    }

    /// Creates a tracker that starts disabled.
    pub fn disabled(provider: impl Into<String>) -> Self {
        Self::with_initial(
            provider,
            ProviderStatus {
                state: ConnectionState::Disabled,
                ..ProviderStatus::default()
            },
        )
    }

    fn with_initial(provider: impl Into<String>, initial: ProviderStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            provider: provider.into(),
            tx,
        }
    }

    /// Returns the current status.
    pub fn current(&self) -> ProviderStatus {
        self.tx.borrow().clone()
    }

    /// Returns a receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<ProviderStatus> {
        self.tx.subscribe()
    }

    /// Moves to `state`, clearing any previous error.
    pub fn set_state(&self, state: ConnectionState) {
        self.tx.send_if_modified(|status| {
            let changed = status.state != state || status.error_code.is_some();
            status.state = state;
            status.error_code = None;
            status.message = None;
            changed
        });
        debug!(provider = %self.provider, state = state.as_str(), "provider state changed");
    }

    /// Records a completed sync and returns to idle.
    pub fn synced(&self, event_count: usize) {
        self.tx.send_modify(|status| {
            status.state = ConnectionState::Idle;
            status.error_code = None;
            status.message = None;
            status.last_sync = Some(Utc::now());
            status.last_event_count = event_count;
        });
    }

    /// Moves to the error state with the category-derived notice.
    ///
    /// Cancellation is not an error for status purposes and returns to idle.
    pub fn fail(&self, err: &ProviderError) {
        if err.code() == ProviderErrorCode::Cancelled {
            self.set_state(ConnectionState::Idle);
            return;
        }
        self.tx.send_modify(|status| {
            status.state = ConnectionState::Error;
            status.error_code = Some(err.code());
            status.message = Some(err.user_message().to_string());
        });
    }
}
