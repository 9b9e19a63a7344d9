//! Google Calendar provider implementation.
//!
//! This module implements the [`CalendarProvider`] trait for Google Calendar
//! API v3, including partial updates guarded by the event ETag.

use std::sync::Arc;

use calsync_core::{CalendarSource, CanonicalEvent, EventChanges};
use reqwest::StatusCode;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::auth::{AuthEngine, OAuthProvider};
use crate::error::{ProviderError, ProviderResult};
use crate::provider::{
    BoxFuture, CalendarListEntry, CalendarProvider, FetchOptions, WriteOptions, WriteResult,
    fetch_calendars,
};
use crate::rest::{BearerSession, TokenSink};
use crate::status::{ConnectionState, ProviderStatus, StatusTracker};

use super::api::{
    ApiCalendar, ApiEvent, ApiEventWrite, CalendarListResponse, EventListResponse,
    is_writable_role,
};
use super::config::GoogleConfig;

const NAME: &str = "google";

/// Google Calendar provider for one account.
#[derive(Debug)]
pub struct GoogleProvider {
    config: GoogleConfig,
    selected_calendars: Vec<String>,
    session: BearerSession,
    status: StatusTracker,
}

impl GoogleProvider {
    /// Creates a provider for `source`. Tokens come from the source; no
    /// network call is made until [`CalendarProvider::connect`].
    pub fn new(
        config: GoogleConfig,
        source: &CalendarSource,
        engine: Arc<AuthEngine>,
        sink: Option<TokenSink>,
    ) -> ProviderResult<Self> {
        config.validate().map_err(|e| e.with_provider(NAME))?;
        let session = BearerSession::new(
            NAME,
            OAuthProvider::Google,
            engine,
            source.id.clone(),
            source.tokens.clone(),
            config.timeout,
        )?
        .with_sink(sink);

        Ok(Self {
            selected_calendars: source.selected_calendars.clone(),
            config,
            session,
            status: StatusTracker::new(NAME),
        })
    }

    fn calendar_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.config.api_base,
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!(
            "{}/{}",
            self.calendar_url(calendar_id),
            urlencoding::encode(event_id)
        )
    }

    async fn connect_impl(&self) -> bool {
        self.status.set_state(ConnectionState::Connecting);
        match self.session.valid_token().await {
            Ok(_) => {
                self.status.set_state(ConnectionState::Idle);
                true
            }
            Err(e) => {
                self.status.fail(&e);
                false
            }
        }
    }

    async fn list_calendars_impl(&self) -> ProviderResult<Vec<CalendarListEntry>> {
        let url = format!("{}/users/me/calendarList", self.config.api_base);
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page: CalendarListResponse = self
                .session
                .get_json(|http, token| {
                    let mut request = http
                        .get(&url)
                        .bearer_auth(token)
                        .query(&[("maxResults", self.config.page_size.to_string())]);
                    if let Some(ref page) = page_token {
                        request = request.query(&[("pageToken", page)]);
                    }
                    request
                })
                .await?;

            entries.extend(page.items.into_iter().map(ApiCalendar::into_entry));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = entries.len(), "listed Google calendars");
        Ok(entries)
    }

    /// Fetches every page of one calendar.
    async fn fetch_calendar(
        &self,
        calendar_id: String,
        options: &FetchOptions,
    ) -> ProviderResult<Vec<CanonicalEvent>> {
        let window = options.window();
        let url = self.calendar_url(&calendar_id);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            options.check_cancelled()?;
            let page: EventListResponse = self
                .session
                .get_json(|http, token| {
                    let mut request = http.get(&url).bearer_auth(token).query(&[
                        ("timeMin", window.start.to_rfc3339()),
                        ("timeMax", window.end.to_rfc3339()),
                        ("singleEvents", options.expand_recurring.to_string()),
                        ("maxResults", self.config.page_size.to_string()),
                    ]);
                    // orderBy=startTime is only accepted for expanded results
                    if options.expand_recurring {
                        request = request.query(&[("orderBy", "startTime")]);
                    }
                    if let Some(ref page) = page_token {
                        request = request.query(&[("pageToken", page)]);
                    }
                    request
                })
                .await?;

            let writable = is_writable_role(page.access_role.as_deref());
            events.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.into_canonical(&calendar_id, writable)),
            );

            if let Some(max) = options.max_results
                && events.len() >= max
            {
                events.truncate(max);
                break;
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(calendar = %calendar_id, count = events.len(), "fetched Google events");
        Ok(events)
    }

    async fn get_events_impl(&self, options: FetchOptions) -> ProviderResult<Vec<CanonicalEvent>> {
        self.session.valid_token().await?;
        self.status.set_state(ConnectionState::Syncing);

        let calendar_ids =
            options.resolve_calendar_ids(&self.selected_calendars, self.config.calendar_ids.clone());
        fetch_calendars(NAME, &calendar_ids, &options, |id| {
            self.fetch_calendar(id, &options)
        })
        .await
    }

    async fn can_write_impl(&self, calendar_id: Option<String>) -> bool {
        let calendars = match self.list_calendars_impl().await {
            Ok(calendars) => calendars,
            Err(e) => {
                debug!(error = %e, "cannot determine calendar writability");
                return false;
            }
        };
        match calendar_id.as_deref() {
            // "primary" is an alias Google accepts in place of the real id
            Some("primary") => calendars.iter().any(|c| c.is_primary && c.writable),
            Some(id) => calendars.iter().any(|c| c.id == id && c.writable),
            None => calendars.iter().any(|c| c.writable),
        }
    }

    /// Turns a write response into a [`WriteResult`].
    async fn finish_write(
        &self,
        calendar_id: &str,
        response: ProviderResult<reqwest::Response>,
    ) -> WriteResult {
        let response = match response {
            Ok(response) => response,
            Err(e) => return self.write_failed(e),
        };
        if response.status() == StatusCode::PRECONDITION_FAILED {
            info!(calendar = %calendar_id, "write rejected, event changed remotely");
            return WriteResult::conflict();
        }

        let api: ApiEvent = match self.session.json(response).await {
            Ok(api) => api,
            Err(e) => return self.write_failed(e),
        };
        match api.into_canonical(calendar_id, true) {
            Some(event) => WriteResult::written(event),
            None => self.write_failed(ProviderError::parse("write response has no event times")),
        }
    }

    fn write_failed(&self, err: ProviderError) -> WriteResult {
        self.status.fail(&err);
        WriteResult::failed(&err)
    }

    async fn create_impl(&self, calendar_id: String, event: CanonicalEvent) -> WriteResult {
        let body = ApiEventWrite::from_event(&event);
        let url = self.calendar_url(&calendar_id);
        let response = self
            .session
            .send(|http, token| http.post(&url).bearer_auth(token).json(&body))
            .await;
        self.finish_write(&calendar_id, response).await
    }

    async fn update_impl(&self, event: CanonicalEvent, changes: EventChanges) -> WriteResult {
        let (calendar_id, event_id) = match locate(&event) {
            Ok(ids) => ids,
            Err(e) => return self.write_failed(e),
        };
        if changes.is_empty() {
            return WriteResult::written(event);
        }

        let body = ApiEventWrite::from_changes(&changes);
        let url = self.event_url(&calendar_id, &event_id);
        let version = event.version_tag().map(str::to_string);
        let response = self
            .session
            .send(|http, token| {
                let mut request = http.patch(&url).bearer_auth(token).json(&body);
                if let Some(ref tag) = version {
                    request = request.header("If-Match", tag);
                }
                request
            })
            .await;
        self.finish_write(&calendar_id, response).await
    }

    async fn delete_impl(&self, event: CanonicalEvent) -> WriteResult {
        let (calendar_id, event_id) = match locate(&event) {
            Ok(ids) => ids,
            Err(e) => return self.write_failed(e),
        };
        let url = self.event_url(&calendar_id, &event_id);
        let version = event.version_tag().map(str::to_string);
        let response = self
            .session
            .send(|http, token| {
                let mut request = http.delete(&url).bearer_auth(token);
                if let Some(ref tag) = version {
                    request = request.header("If-Match", tag);
                }
                request
            })
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return self.write_failed(e),
        };
        match response.status() {
            status if status.is_success() => WriteResult::deleted(),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                debug!(event = %event_id, "event already deleted");
                WriteResult::deleted()
            }
            StatusCode::PRECONDITION_FAILED => WriteResult::conflict(),
            _ => {
                let err = self.session.error_from_response(response).await;
                self.write_failed(err)
            }
        }
    }
}

/// Returns the calendar and event ids a write must address.
fn locate(event: &CanonicalEvent) -> ProviderResult<(String, String)> {
    let event_id = event
        .sync
        .provider_event_id
        .clone()
        .ok_or_else(|| ProviderError::not_found("event has no Google event id").with_provider(NAME))?;
    let calendar_id = event
        .sync
        .provider_calendar_id
        .clone()
        .unwrap_or_else(|| "primary".to_string());
    Ok((calendar_id, event_id))
}

impl CalendarProvider for GoogleProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn connect(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.connect_impl())
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.session.clear().await;
            self.status.set_state(ConnectionState::Idle);
        })
    }

    fn list_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<CalendarListEntry>>> {
        Box::pin(async move {
            self.list_calendars_impl().await.inspect_err(|e| self.status.fail(e))
        })
    }

    fn get_events(&self, options: FetchOptions) -> BoxFuture<'_, ProviderResult<Vec<CanonicalEvent>>> {
        Box::pin(async move {
            match self.get_events_impl(options).await {
                Ok(events) => {
                    self.status.synced(events.len());
                    Ok(events)
                }
                Err(e) => {
                    self.status.fail(&e);
                    Err(e)
                }
            }
        })
    }

    fn status(&self) -> ProviderStatus {
        self.status.current()
    }

    fn subscribe_status(&self) -> watch::Receiver<ProviderStatus> {
        self.status.subscribe()
    }

    fn supports_write(&self) -> bool {
        true
    }

    fn can_write_to_calendar(&self, calendar_id: Option<String>) -> BoxFuture<'_, bool> {
        Box::pin(self.can_write_impl(calendar_id))
    }

    fn create_event(&self, calendar_id: String, event: CanonicalEvent) -> BoxFuture<'_, WriteResult> {
        Box::pin(self.create_impl(calendar_id, event))
    }

    fn update_event(
        &self,
        event: CanonicalEvent,
        changes: EventChanges,
        _options: WriteOptions,
    ) -> BoxFuture<'_, WriteResult> {
        Box::pin(self.update_impl(event, changes))
    }

    fn delete_event(&self, event: CanonicalEvent) -> BoxFuture<'_, WriteResult> {
        Box::pin(self.delete_impl(event))
    }
}
