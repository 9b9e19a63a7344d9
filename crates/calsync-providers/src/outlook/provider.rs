//! Outlook provider on Microsoft Graph v1.0.

use std::collections::HashSet;
use std::sync::Arc;

use calsync_core::{CalendarSource, CanonicalEvent, EventChanges};
use reqwest::StatusCode;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::auth::{AuthEngine, OAuthProvider};
use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::provider::{
    BoxFuture, CalendarListEntry, CalendarProvider, FetchOptions, WriteOptions, WriteResult,
    fetch_calendars,
};
use crate::rest::{BearerSession, TokenSink};
use crate::status::{ConnectionState, ProviderStatus, StatusTracker};

use super::api::{GraphCalendar, GraphEvent, GraphEventWrite, GraphPage, query_time};
use super::config::OutlookConfig;

const NAME: &str = "outlook";

const PREFER_UTC: &str = "outlook.timezone=\"UTC\"";

/// Outlook provider for one Microsoft account.
#[derive(Debug)]
pub struct OutlookProvider {
    config: OutlookConfig,
    selected_calendars: Vec<String>,
    session: BearerSession,
    status: StatusTracker,
}

impl OutlookProvider {
    /// Creates a provider for `source`. The source's tenant is used for
    /// token refreshes.
    pub fn new(
        config: OutlookConfig,
        source: &CalendarSource,
        engine: Arc<AuthEngine>,
        sink: Option<TokenSink>,
    ) -> ProviderResult<Self> {
        config.validate().map_err(|e| e.with_provider(NAME))?;
        let session = BearerSession::new(
            NAME,
            OAuthProvider::Microsoft,
            engine,
            source.id.clone(),
            source.tokens.clone(),
            config.timeout,
        )?
        .with_tenant_id(source.tenant_id.clone())
        .with_sink(sink);

        Ok(Self {
            selected_calendars: source.selected_calendars.clone(),
            config,
            session,
            status: StatusTracker::new(NAME),
        })
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/me/events/{}", self.config.api_base, urlencoding::encode(event_id))
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

    /// Follows `@odata.nextLink` until the collection is exhausted.
    ///
    /// `first` builds the initial request; later pages use the link as is.
    async fn collect_pages<T, F>(&self, first: F, options: Option<&FetchOptions>) -> ProviderResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
        F: Fn(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    {
        let mut items = Vec::new();
        let mut page: GraphPage<T> = self.session.get_json(&first).await?;
        loop {
            items.extend(page.value);
            if let Some(max) = options.and_then(|o| o.max_results)
                && items.len() >= max
            {
                items.truncate(max);
                break;
            }
            let Some(next) = page.next_link else {
                break;
            };
            if let Some(options) = options {
                options.check_cancelled()?;
            }
            page = self
                .session
                .get_json(|http, token| {
                    http.get(&next)
                        .bearer_auth(token)
                        .header("Prefer", PREFER_UTC)
                })
                .await?;
        }
        Ok(items)
    }

    async fn list_calendars_impl(&self) -> ProviderResult<Vec<CalendarListEntry>> {
        let url = format!("{}/me/calendars", self.config.api_base);
        let calendars: Vec<GraphCalendar> = self
            .collect_pages(
                |http, token| {
                    http.get(&url)
                        .bearer_auth(token)
                        .query(&[("$top", self.config.page_size.to_string())])
                },
                None,
            )
            .await?;
        debug!(count = calendars.len(), "listed Outlook calendars");
        Ok(calendars.into_iter().map(GraphCalendar::into_entry).collect())
    }

    /// Resolves the calendars to read. With no selection the account's
    /// default calendar is used.
    async fn calendar_ids(&self, options: &FetchOptions) -> ProviderResult<Vec<String>> {
        let ids = options.resolve_calendar_ids(&self.selected_calendars, Vec::new());
        if !ids.is_empty() {
            return Ok(ids);
        }
        let url = format!("{}/me/calendar", self.config.api_base);
        let default: GraphCalendar = self
            .session
            .get_json(|http, token| http.get(&url).bearer_auth(token))
            .await?;
        Ok(vec![default.id])
    }

    /// Ids of the calendars the account may edit, listed once per fetch.
    ///
    /// A failed listing leaves events read-only; auth and cancellation
    /// errors still abort the fetch.
    async fn writable_calendars(&self, options: &FetchOptions) -> ProviderResult<HashSet<String>> {
        options.check_cancelled()?;
        match self.list_calendars_impl().await {
            Ok(calendars) => Ok(calendars
                .into_iter()
                .filter(|c| c.writable)
                .map(|c| c.id)
                .collect()),
            Err(e) if matches!(e.code(), ProviderErrorCode::Auth | ProviderErrorCode::Cancelled) => {
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "cannot list calendars, events are marked read-only");
                Ok(HashSet::new())
            }
        }
    }

    async fn fetch_calendar(
        &self,
        calendar_id: String,
        options: &FetchOptions,
        writable: &HashSet<String>,
    ) -> ProviderResult<Vec<CanonicalEvent>> {
        let window = options.window();
        let start = query_time(window.start);
        let end = query_time(window.end);
        let top = self.config.page_size.to_string();
        let base = format!(
            "{}/me/calendars/{}",
            self.config.api_base,
            urlencoding::encode(&calendar_id)
        );

        let items: Vec<GraphEvent> = if options.expand_recurring {
            let url = format!("{}/calendarView", base);
            self.collect_pages(
                |http, token| {
                    http.get(&url)
                        .bearer_auth(token)
                        .header("Prefer", PREFER_UTC)
                        .query(&[
                            ("startDateTime", start.as_str()),
                            ("endDateTime", end.as_str()),
                            ("$top", top.as_str()),
                        ])
                },
                Some(options),
            )
            .await?
        } else {
            // Series masters come back unexpanded; filter on the window bounds instead.
            let url = format!("{}/events", base);
            let filter = format!(
                "end/dateTime ge '{}' and start/dateTime lt '{}'",
                start, end
            );
            self.collect_pages(
                |http, token| {
                    http.get(&url)
                        .bearer_auth(token)
                        .header("Prefer", PREFER_UTC)
                        .query(&[("$filter", filter.as_str()), ("$top", top.as_str())])
                },
                Some(options),
            )
            .await?
        };

        // canEdit is per calendar; instances inherit it.
        let writable = writable.contains(&calendar_id);
        let events: Vec<CanonicalEvent> = items
            .into_iter()
            .filter_map(|item| item.into_canonical(&calendar_id, writable))
            .collect();
        debug!(calendar = %calendar_id, count = events.len(), "fetched Outlook events");
        Ok(events)
    }

    async fn get_events_impl(&self, options: FetchOptions) -> ProviderResult<Vec<CanonicalEvent>> {
        self.session.valid_token().await?;
        self.status.set_state(ConnectionState::Syncing);

        let calendar_ids = self.calendar_ids(&options).await?;
        let writable = self.writable_calendars(&options).await?;
        fetch_calendars(NAME, &calendar_ids, &options, |id| {
            self.fetch_calendar(id, &options, &writable)
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
            Some(id) => calendars.iter().any(|c| c.id == id && c.writable),
            None => calendars.iter().any(|c| c.is_primary && c.writable),
        }
    }

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

        let api: GraphEvent = match self.session.json(response).await {
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
        let body = GraphEventWrite::from_event(&event);
        let url = format!(
            "{}/me/calendars/{}/events",
            self.config.api_base,
            urlencoding::encode(&calendar_id)
        );
        let response = self
            .session
            .send(|http, token| {
                http.post(&url)
                    .bearer_auth(token)
                    .header("Prefer", PREFER_UTC)
                    .json(&body)
            })
            .await;
        self.finish_write(&calendar_id, response).await
    }

    async fn patch(
        &self,
        url: &str,
        body: &GraphEventWrite,
        version: Option<&str>,
    ) -> ProviderResult<reqwest::Response> {
        self.session
            .send(|http, token| {
                let mut request = http
                    .patch(url)
                    .bearer_auth(token)
                    .header("Prefer", PREFER_UTC)
                    .json(body);
                if let Some(tag) = version {
                    request = request.header("If-Match", tag);
                }
                request
            })
            .await
    }

    async fn update_impl(
        &self,
        event: CanonicalEvent,
        changes: EventChanges,
        options: WriteOptions,
    ) -> WriteResult {
        let (calendar_id, event_id) = match locate(&event) {
            Ok(ids) => ids,
            Err(e) => return self.write_failed(e),
        };
        if changes.is_empty() {
            return WriteResult::written(event);
        }

        let body = GraphEventWrite::from_changes(&event, &changes);
        let url = self.event_url(&event_id);
        let mut response = self.patch(&url, &body, event.version_tag()).await;

        if options.force
            && matches!(response, Ok(ref r) if r.status() == StatusCode::PRECONDITION_FAILED)
        {
            warn!(event = %event_id, "overwriting remotely changed event");
            response = self.patch(&url, &body, None).await;
        }
        self.finish_write(&calendar_id, response).await
    }

    async fn delete_impl(&self, event: CanonicalEvent) -> WriteResult {
        let (_, event_id) = match locate(&event) {
            Ok(ids) => ids,
            Err(e) => return self.write_failed(e),
        };
        let url = self.event_url(&event_id);
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

fn locate(event: &CanonicalEvent) -> ProviderResult<(String, String)> {
    let event_id = event
        .sync
        .provider_event_id
        .clone()
        .ok_or_else(|| ProviderError::not_found("event has no Graph event id").with_provider(NAME))?;
    let calendar_id = event.sync.provider_calendar_id.clone().unwrap_or_default();
    Ok((calendar_id, event_id))
}

impl CalendarProvider for OutlookProvider {
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
        options: WriteOptions,
    ) -> BoxFuture<'_, WriteResult> {
        Box::pin(self.update_impl(event, changes, options))
    }

    fn delete_event(&self, event: CanonicalEvent) -> BoxFuture<'_, WriteResult> {
        Box::pin(self.delete_impl(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthEngineConfig, OAuthClientConfig};
    use calsync_core::{EventTime, OAuthTokenData, ProviderKind, SyncMetadata, Transparency};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, selected: &[&str]) -> OutlookProvider {
        let engine = Arc::new(AuthEngine::new(AuthEngineConfig::default()).unwrap());
        let source = CalendarSource::new("work", ProviderKind::Outlook)
            .with_tokens(OAuthTokenData::new("token", Some("refresh".to_string()), 3600))
            .with_selected_calendars(selected.iter().map(|s| s.to_string()).collect());
        OutlookProvider::new(
            OutlookConfig::new().with_api_base(server.uri()),
            &source,
            engine,
            None,
        )
        .unwrap()
    }

    fn graph_event(id: &str, change_key: &str) -> serde_json::Value {
        json!({
            "id": id,
            "changeKey": change_key,
            "subject": id,
            "start": {"dateTime": "2025-02-05T10:00:00.0000000", "timeZone": "UTC"},
            "end": {"dateTime": "2025-02-05T11:00:00.0000000", "timeZone": "UTC"}
        })
    }

    fn stored_event(tag: &str) -> CanonicalEvent {
        let at = Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap();
        CanonicalEvent::new("evt1", EventTime::from_utc(at), EventTime::from_utc(at)).with_sync(
            SyncMetadata {
                provider_event_id: Some("evt1".to_string()),
                provider_calendar_id: Some("cal1".to_string()),
                version_tag: Some(tag.to_string()),
                can_edit: true,
                ..SyncMetadata::default()
            },
        )
    }

    async fn mount_calendars(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/me/calendars"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"id": "cal1", "name": "Calendar", "isDefaultCalendar": true, "canEdit": true}]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn follows_next_link_in_calendar_view() {
        let server = MockServer::start().await;
        mount_calendars(&server).await;
        Mock::given(method("GET"))
            .and(path("/me/calendars/cal1/calendarView"))
            .and(query_param("$skip", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [graph_event("b", "k2")]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me/calendars/cal1/calendarView"))
            .and(header("Prefer", PREFER_UTC))
            .and(query_param("$top", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [graph_event("a", "k1")],
                "@odata.nextLink": format!("{}/me/calendars/cal1/calendarView?$skip=1", server.uri())
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let provider = provider(&server, &["cal1"]);
        let events = provider.get_events(FetchOptions::new()).await.unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(events[0].sync.can_edit);
        assert_eq!(provider.status().last_event_count, 2);
    }

    #[tokio::test]
    async fn lists_calendars_once_per_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/calendars"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"id": "cal1", "name": "Calendar", "isDefaultCalendar": true, "canEdit": true},
                    {"id": "cal2", "name": "Team", "canEdit": true},
                    {"id": "cal3", "name": "Holidays", "canEdit": false}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        for id in ["cal1", "cal2", "cal3"] {
            Mock::given(method("GET"))
                .and(path(format!("/me/calendars/{}/calendarView", id)))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "value": [graph_event(id, "k1")]
                })))
                .mount(&server)
                .await;
        }

        let provider = provider(&server, &["cal1", "cal2", "cal3"]);
        let mut events = provider.get_events(FetchOptions::new()).await.unwrap();
        events.sort_by(|a, b| a.summary.cmp(&b.summary));
        let editable: Vec<_> = events.iter().map(|e| e.sync.can_edit).collect();
        assert_eq!(editable, vec![true, true, false]);
        // `expect(1)` on the listing is verified when the server drops.
    }

    #[tokio::test]
    async fn listing_failure_leaves_events_read_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/calendars"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me/calendars/cal1/calendarView"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [graph_event("a", "k1")]
            })))
            .mount(&server)
            .await;

        let provider = provider(&server, &["cal1"]);
        let events = provider.get_events(FetchOptions::new()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].sync.can_edit);
    }

    #[tokio::test]
    async fn create_timed_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/calendars/cal1/events"))
            .respond_with(ResponseTemplate::new(201).set_body_json(graph_event("new1", "k1")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server, &[]);
        let start = Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap();
        let event = CanonicalEvent::new(
            "",
            EventTime::from_utc(start),
            EventTime::from_utc(start + chrono::Duration::hours(1)),
        )
        .with_summary("Review");
        let result = provider.create_event("cal1".to_string(), event).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(
            result.event.unwrap().sync.provider_event_id.as_deref(),
            Some("new1")
        );

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["start"]["dateTime"], "2025-02-05T10:00:00.0000000");
        assert_eq!(body["end"]["dateTime"], "2025-02-05T11:00:00.0000000");
        assert_eq!(body["subject"], "Review");
    }

    #[tokio::test]
    async fn default_calendar_when_none_selected() {
        let server = MockServer::start().await;
        mount_calendars(&server).await;
        Mock::given(method("GET"))
            .and(path("/me/calendar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "cal1", "name": "Calendar"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me/calendars/cal1/events"))
            .and(header_exists("Prefer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [graph_event("master", "k1")]
            })))
            .mount(&server)
            .await;

        let provider = provider(&server, &[]);
        let events = provider
            .get_events(FetchOptions::new().with_expand_recurring(false))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sync.provider_calendar_id.as_deref(), Some("cal1"));
    }

    #[tokio::test]
    async fn conflict_without_force() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/me/events/evt1"))
            .and(header("If-Match", "k-old"))
            .respond_with(ResponseTemplate::new(412))
            .mount(&server)
            .await;

        let provider = provider(&server, &[]);
        let result = provider
            .update_event(
                stored_event("k-old"),
                EventChanges::new().with_summary("Renamed"),
                WriteOptions::default(),
            )
            .await;
        assert!(result.conflict);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn force_retries_without_if_match() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/me/events/evt1"))
            .and(header("If-Match", "k-old"))
            .respond_with(ResponseTemplate::new(412))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/me/events/evt1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(graph_event("evt1", "k-new")))
            .mount(&server)
            .await;

        let provider = provider(&server, &[]);
        let result = provider
            .update_event(
                stored_event("k-old"),
                EventChanges::new().with_transparency(Transparency::Transparent),
                WriteOptions::forced(),
            )
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.event.unwrap().version_tag(), Some("k-new"));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].headers.get("If-Match").is_none());
        let body: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(body, json!({"showAs": "free"}));
    }

    #[tokio::test]
    async fn delete_missing_event_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/me/events/evt1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = provider(&server, &[]);
        assert!(provider.delete_event(stored_event("k")).await.success);
    }

    #[tokio::test]
    async fn refreshes_once_on_unauthorized() {
        let server = MockServer::start().await;
        let microsoft = OAuthClientConfig::microsoft()
            .with_client_id("cid")
            .with_endpoints(
                format!("{}/{{tenant}}/authorize", server.uri()),
                format!("{}/{{tenant}}/token", server.uri()),
            );
        let engine =
            Arc::new(AuthEngine::new(AuthEngineConfig::default().with_microsoft(microsoft)).unwrap());
        let mut source = CalendarSource::new("work", ProviderKind::Outlook)
            .with_tokens(OAuthTokenData::new("stale", Some("refresh".to_string()), 3600));
        source.tenant_id = Some("contoso".to_string());
        let provider = OutlookProvider::new(
            OutlookConfig::new().with_api_base(server.uri()),
            &source,
            engine,
            None,
        )
        .unwrap();

        Mock::given(method("POST"))
            .and(path("/contoso/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me/calendars"))
            .and(header("Authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me/calendars"))
            .and(header("Authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;

        assert!(provider.list_calendars().await.unwrap().is_empty());
    }
}
