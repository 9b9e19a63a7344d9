//! CalendarProvider trait definition.
//!
//! This module defines the [`CalendarProvider`] trait, the capability
//! contract every calendar backend implements, together with the option
//! and result types that cross it.
//!
//! Reads are mandatory. Writes are optional: a provider advertises them
//! through [`CalendarProvider::supports_write`], and the default write
//! methods report that the operation is not supported.

use std::future::Future;
use std::pin::Pin;

use calsync_core::{CanonicalEvent, EventChanges, TimeWindow};
use chrono::{Duration, Utc};
use futures::future::join_all;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::status::{ProviderStatus, StatusTracker};

/// Default look-behind when no time window is given.
pub const DEFAULT_LOOKBEHIND_DAYS: i64 = 1;
/// Default look-ahead when no time window is given.
pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 30;

/// A calendar as listed by a provider. Fetched on demand, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarListEntry {
    /// Unique identifier for the calendar (CalDAV: absolute collection URL).
    pub id: String,
    /// Human-readable name of the calendar.
    pub name: String,
    /// Display color, when the provider reports one.
    pub color: Option<String>,
    pub is_primary: bool,
    /// Whether the account may create and modify events in this calendar.
    pub writable: bool,
    pub description: Option<String>,
    /// IANA timezone of the calendar.
    pub timezone: Option<String>,
}

impl CalendarListEntry {
    /// Creates a read-only, non-primary entry.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: None,
            is_primary: false,
            writable: false,
            description: None,
            timezone: None,
        }
    }

    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        self
    }

    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Options for fetching events.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Time window to fetch events for. Defaults to one day back, 30 days ahead.
    pub time_window: Option<TimeWindow>,
    /// Calendars to read. `None` means the source's selection, or all.
    pub calendar_ids: Option<Vec<String>>,
    /// Maximum number of events per calendar.
    pub max_results: Option<usize>,
    /// Whether to expand recurring events into instances.
    pub expand_recurring: bool,
    /// Checked before each calendar and between pages.
    pub cancel: Option<CancellationToken>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            time_window: None,
            calendar_ids: None,
            max_results: None,
            expand_recurring: true,
            cancel: None,
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn with_expand_recurring(mut self, expand: bool) -> Self {
        self.expand_recurring = expand;
        self
    }

    pub fn with_calendar_ids(mut self, ids: Vec<String>) -> Self {
        self.calendar_ids = Some(ids);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Returns the requested window or the default one around now.
    pub fn window(&self) -> TimeWindow {
        self.time_window.clone().unwrap_or_else(|| {
            TimeWindow::around(
                Utc::now(),
                Duration::days(DEFAULT_LOOKBEHIND_DAYS),
                Duration::days(DEFAULT_LOOKAHEAD_DAYS),
            )
        })
    }

    /// Returns `true` once the caller has cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Returns a cancellation error if the caller has cancelled.
    pub fn check_cancelled(&self) -> ProviderResult<()> {
        if self.is_cancelled() {
            Err(ProviderError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Picks the calendars to read: explicit ids, then `selected`, then `fallback`.
    pub fn resolve_calendar_ids(&self, selected: &[String], fallback: Vec<String>) -> Vec<String> {
        match self.calendar_ids {
            Some(ref ids) if !ids.is_empty() => ids.clone(),
            _ if !selected.is_empty() => selected.to_vec(),
            _ => fallback,
        }
    }
}

/// Options for update operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// After a version conflict, retry once without the version check.
    ///
    /// Only honoured by providers that support it (Outlook); never the default.
    pub force: bool,
}

impl WriteOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Outcome of a create, update or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    pub success: bool,
    /// Authoritative post-write event, with a refreshed version tag.
    pub event: Option<CanonicalEvent>,
    /// User-facing error message.
    pub error: Option<String>,
    pub error_code: Option<ProviderErrorCode>,
    /// The remote resource changed since the caller read it.
    pub conflict: bool,
}

impl WriteResult {
    /// A successful write that returns the stored event.
    pub fn written(event: CanonicalEvent) -> Self {
        Self {
            success: true,
            event: Some(event),
            error: None,
            error_code: None,
            conflict: false,
        }
    }

    /// A successful delete.
    pub fn deleted() -> Self {
        Self {
            success: true,
            event: None,
            error: None,
            error_code: None,
            conflict: false,
        }
    }

    /// A write rejected because the remote version moved on.
    pub fn conflict() -> Self {
        Self {
            success: false,
            event: None,
            error: Some("The event was changed elsewhere. Refresh and try again.".to_string()),
            error_code: None,
            conflict: true,
        }
    }

    /// A write that failed for any other reason.
    pub fn failed(err: &ProviderError) -> Self {
        Self {
            success: false,
            event: None,
            error: Some(err.user_message().to_string()),
            error_code: Some(err.code()),
            conflict: false,
        }
    }

    /// The default result for providers without write support.
    pub fn unsupported(provider: &str) -> Self {
        Self::failed(&ProviderError::permission(format!(
            "{} does not support writing events",
            provider
        )))
    }
}

/// A boxed future for async trait methods.
///
/// Keeps the trait object-safe so providers can be stored as
/// `Arc<dyn CalendarProvider>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The capability contract for calendar providers.
///
/// Implementations must be `Send + Sync`; the source manager shares them
/// behind `Arc`. Every status transition goes through the provider's
/// [`StatusTracker`] so that [`CalendarProvider::subscribe_status`]
/// listeners see it.
pub trait CalendarProvider: Send + Sync {
    /// Returns the provider type (`google`, `outlook`, `caldav`).
    fn name(&self) -> &str;

    /// Validates (and if needed refreshes) credentials.
    ///
    /// Idempotent. Returns `false` and moves to the error state on failure.
    fn connect(&self) -> BoxFuture<'_, bool>;

    /// Drops credentials and cached state.
    fn disconnect(&self) -> BoxFuture<'_, ()>;

    /// Lists the calendars the account can see.
    fn list_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<CalendarListEntry>>>;

    /// Fetches events from the requested calendars.
    ///
    /// Calendars are read concurrently. A failing calendar is logged and
    /// contributes no events; it does not fail the call.
    fn get_events(&self, options: FetchOptions) -> BoxFuture<'_, ProviderResult<Vec<CanonicalEvent>>>;

    /// Returns the current status.
    fn status(&self) -> ProviderStatus;

    /// Returns a receiver notified on every status change.
    fn subscribe_status(&self) -> watch::Receiver<ProviderStatus>;

    /// Whether this provider implements writes at all.
    fn supports_write(&self) -> bool {
        false
    }

    /// Whether events can be written to `calendar_id` (or anywhere, if `None`).
    fn can_write_to_calendar(&self, _calendar_id: Option<String>) -> BoxFuture<'_, bool> {
        Box::pin(async { false })
    }

    /// Creates `event` in `calendar_id`.
    fn create_event(&self, _calendar_id: String, _event: CanonicalEvent) -> BoxFuture<'_, WriteResult> {
        let result = WriteResult::unsupported(self.name());
        Box::pin(async move { result })
    }

    /// Applies `changes` to the remote copy of `event`.
    ///
    /// The event's version tag, when present, guards the update.
    fn update_event(
        &self,
        _event: CanonicalEvent,
        _changes: EventChanges,
        _options: WriteOptions,
    ) -> BoxFuture<'_, WriteResult> {
        let result = WriteResult::unsupported(self.name());
        Box::pin(async move { result })
    }

    /// Deletes the remote copy of `event`. Already-deleted events succeed.
    fn delete_event(&self, _event: CanonicalEvent) -> BoxFuture<'_, WriteResult> {
        let result = WriteResult::unsupported(self.name());
        Box::pin(async move { result })
    }
}

/// Reads several calendars concurrently and merges the results.
///
/// Cancellation is checked before each calendar starts and once more after
/// all have finished. A calendar that fails with anything but cancellation
/// is logged and skipped.
pub async fn fetch_calendars<F, Fut>(
    provider: &str,
    calendar_ids: &[String],
    options: &FetchOptions,
    fetch: F,
) -> ProviderResult<Vec<CanonicalEvent>>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = ProviderResult<Vec<CanonicalEvent>>>,
{
    options.check_cancelled()?;

    let tasks = calendar_ids.iter().map(|id| {
        let fut = fetch(id.clone());
        async move {
            if options.is_cancelled() {
                return Err((id.clone(), ProviderError::cancelled()));
            }
            fut.await.map_err(|e| (id.clone(), e))
        }
    });

    let results = join_all(tasks).await;
    options.check_cancelled()?;

    let mut events = Vec::new();
    for result in results {
        match result {
            Ok(batch) => events.extend(batch),
            Err((_, err)) if err.code() == ProviderErrorCode::Cancelled => return Err(err),
            Err((calendar, err)) => {
                warn!(provider = %provider, calendar = %calendar, error = %err, "Failed to fetch calendar");
            }
        }
    }

    debug!(provider = %provider, calendars = calendar_ids.len(), count = events.len(), "Fetched events");
    Ok(events)
}

/// A provider that always reports a fixed error.
///
/// Stands in for a source whose provider could not be built (a missing
/// feature, bad credentials, an invalid server URL) or that is disabled.
#[derive(Debug)]
pub struct ErrorProvider {
    name: String,
    error: ProviderError,
    status: StatusTracker,
}

impl ErrorProvider {
    pub fn new(name: impl Into<String>, error: ProviderError) -> Self {
        let name = name.into();
        let status = StatusTracker::new(name.clone());
        status.fail(&error);
        Self {
            error: error.with_provider(name.clone()),
            name,
            status,
        }
    }

    /// A provider for a source the user turned off.
    pub fn disabled(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            error: ProviderError::permission("calendar source is disabled").with_provider(name.clone()),
            status: StatusTracker::disabled(name.clone()),
            name,
        }
    }
}

impl CalendarProvider for ErrorProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { false })
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    fn list_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<CalendarListEntry>>> {
        let error = self.error.detached();
        Box::pin(async move { Err(error) })
    }

    fn get_events(&self, _options: FetchOptions) -> BoxFuture<'_, ProviderResult<Vec<CanonicalEvent>>> {
        let error = self.error.detached();
        Box::pin(async move { Err(error) })
    }

    fn status(&self) -> ProviderStatus {
        self.status.current()
    }

    fn subscribe_status(&self) -> watch::Receiver<ProviderStatus> {
        self.status.subscribe()
    }
}
