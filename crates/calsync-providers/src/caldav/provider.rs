//! CalDAV calendar provider implementation.

use std::collections::HashMap;

use calsync_core::{CanonicalEvent, EventChanges};
use reqwest::{Response, StatusCode};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::ics::{parse_calendar_data, to_ics};
use crate::provider::{
    BoxFuture, CalendarListEntry, CalendarProvider, FetchOptions, WriteOptions, WriteResult,
    fetch_calendars,
};
use crate::status::{ConnectionState, ProviderStatus, StatusTracker};

use super::client::{CalDavClient, Precondition};
use super::config::CalDavConfig;
use super::xml::{
    Ns, calendar_multiget_body, calendar_query_body, calendars_body, home_set_body,
    parse_calendars, parse_href_property, parse_objects, principal_body,
};

const NAME: &str = "caldav";

/// CalDAV calendar provider.
///
/// Calendars are found through the principal's `calendar-home-set`. Event
/// resources are addressed by absolute URL and guarded by their ETag.
#[derive(Debug)]
pub struct CalDavProvider {
    client: CalDavClient,
    selected_calendars: Vec<String>,
    /// Resolved `calendar-home-set`, discovered once.
    home_set: Mutex<Option<String>>,
    /// Writability per calendar URL from the last listing.
    writable: Mutex<HashMap<String, bool>>,
    status: StatusTracker,
}

impl CalDavProvider {
    pub fn new(config: CalDavConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: CalDavClient::new(config)?,
            selected_calendars: Vec::new(),
            home_set: Mutex::new(None),
            writable: Mutex::new(HashMap::new()),
            status: StatusTracker::new(NAME),
        })
    }

    /// Restricts reads to these calendars (URLs or hrefs).
    pub fn with_selected_calendars(mut self, ids: Vec<String>) -> Self {
        self.selected_calendars = ids;
        self
    }

    fn config(&self) -> &CalDavConfig {
        self.client.config()
    }

    async fn connect_impl(&self) -> bool {
        self.status.set_state(ConnectionState::Connecting);
        let result = match principal_body() {
            Ok(body) => self.client.propfind(self.config().url.as_str(), body, 0).await,
            Err(e) => Err(e),
        };
        match result {
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

    async fn home_set(&self) -> ProviderResult<String> {
        let mut cached = self.home_set.lock().await;
        if let Some(ref home) = *cached {
            return Ok(home.clone());
        }
        let home = self.discover_home_set().await.map_err(|e| match e.code() {
            ProviderErrorCode::Auth | ProviderErrorCode::Cancelled => e,
            _ => ProviderError::not_found(format!("calendar discovery failed: {}", e.message()))
                .with_provider(NAME),
        })?;
        info!(home = %home, "discovered calendar home");
        *cached = Some(home.clone());
        Ok(home)
    }

    async fn discover_home_set(&self) -> ProviderResult<String> {
        let root = self.config().url.to_string();
        let xml = self.client.propfind(&root, principal_body()?, 0).await?;
        let principal = parse_href_property(&xml, Ns::Dav, "current-user-principal")
            .ok_or_else(|| ProviderError::not_found("server reported no current-user-principal"))?;
        let principal = self.config().resolve(&principal);
        debug!(principal = %principal, "found principal");

        let xml = self.client.propfind(&principal, home_set_body()?, 0).await?;
        let home = parse_href_property(&xml, Ns::CalDav, "calendar-home-set")
            .ok_or_else(|| ProviderError::not_found("principal has no calendar-home-set"))?;
        Ok(self.config().resolve(&home))
    }

    async fn list_calendars_impl(&self) -> ProviderResult<Vec<CalendarListEntry>> {
        let home = self.home_set().await?;
        let xml = self.client.propfind(&home, calendars_body()?, 1).await?;

        let entries: Vec<CalendarListEntry> = parse_calendars(&xml)
            .into_iter()
            .map(|c| {
                let id = self.config().resolve(&c.href);
                let name = c
                    .display_name
                    .unwrap_or_else(|| last_segment(&c.href).to_string());
                let mut entry = CalendarListEntry::new(id, name).with_writable(c.writable);
                entry.color = c.color;
                entry.description = c.description;
                entry
            })
            .collect();

        let mut writable = self.writable.lock().await;
        writable.clear();
        writable.extend(entries.iter().map(|e| (e.id.clone(), e.writable)));

        debug!(count = entries.len(), "listed CalDAV calendars");
        Ok(entries)
    }

    async fn calendar_urls(&self, options: &FetchOptions) -> ProviderResult<Vec<String>> {
        let ids = options.resolve_calendar_ids(&self.selected_calendars, Vec::new());
        if !ids.is_empty() {
            return Ok(ids.iter().map(|id| self.config().resolve(id)).collect());
        }
        Ok(self
            .list_calendars_impl()
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect())
    }

    async fn fetch_calendar(
        &self,
        calendar_url: String,
        options: &FetchOptions,
    ) -> ProviderResult<Vec<CanonicalEvent>> {
        options.check_cancelled()?;
        let window = options.window();
        let body = calendar_query_body(window.start, window.end, options.expand_recurring)?;
        let xml = self.client.report(&calendar_url, body).await?;
        let can_edit = self
            .writable
            .lock()
            .await
            .get(&calendar_url)
            .copied()
            .unwrap_or(true);

        let mut events = Vec::new();
        for object in parse_objects(&xml) {
            let href = self.config().resolve(&object.href);
            for mut event in parse_calendar_data(&object.data) {
                event.sync.provider_event_id = Some(href.clone());
                event.sync.provider_calendar_id = Some(calendar_url.clone());
                event.sync.version_tag = object.etag.clone();
                event.sync.can_edit = can_edit;
                events.push(event);
            }
        }
        if let Some(max) = options.max_results {
            events.truncate(max);
        }

        debug!(calendar = %calendar_url, count = events.len(), "fetched CalDAV events");
        Ok(events)
    }

    async fn get_events_impl(&self, options: FetchOptions) -> ProviderResult<Vec<CanonicalEvent>> {
        self.status.set_state(ConnectionState::Syncing);
        let urls = self.calendar_urls(&options).await?;
        fetch_calendars(NAME, &urls, &options, |url| self.fetch_calendar(url, &options)).await
    }

    async fn can_write_impl(&self, calendar_id: Option<String>) -> bool {
        let calendars = match self.list_calendars_impl().await {
            Ok(calendars) => calendars,
            Err(e) => {
                debug!(error = %e, "cannot determine calendar writability");
                return false;
            }
        };
        match calendar_id {
            Some(id) => {
                let url = self.config().resolve(&id);
                calendars.iter().any(|c| c.id == url && c.writable)
            }
            None => calendars.iter().any(|c| c.writable),
        }
    }

    fn write_failed(&self, err: ProviderError) -> WriteResult {
        self.status.fail(&err);
        WriteResult::failed(&err)
    }

    /// Turns a PUT response into a [`WriteResult`].
    ///
    /// The new ETag comes from the response header, or from a multiget when
    /// the server omits it.
    async fn finish_put(
        &self,
        resource_url: &str,
        calendar_url: &str,
        mut event: CanonicalEvent,
        response: ProviderResult<Response>,
    ) -> WriteResult {
        let response = match response {
            Ok(response) => response,
            Err(e) => return self.write_failed(e),
        };
        match response.status() {
            StatusCode::PRECONDITION_FAILED => {
                info!(resource = %resource_url, "write rejected, resource changed or exists");
                return WriteResult::conflict();
            }
            status if !status.is_success() => {
                let err = CalDavClient::error_from_response(response).await;
                return self.write_failed(err);
            }
            _ => {}
        }

        event.sync.provider_event_id = Some(resource_url.to_string());
        event.sync.provider_calendar_id = Some(calendar_url.to_string());
        event.sync.can_edit = true;
        event.sync.version_tag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if event.sync.version_tag.is_none() {
            match self.fetch_stored(resource_url, calendar_url).await {
                Ok(Some(stored)) => {
                    event.sync.version_tag = stored.sync.version_tag.clone();
                    event = CanonicalEvent { sync: event.sync, ..stored };
                }
                Ok(None) => warn!(resource = %resource_url, "stored resource not returned"),
                Err(e) => warn!(resource = %resource_url, error = %e, "failed to read back stored resource"),
            }
        }
        WriteResult::written(event)
    }

    /// Reads one resource back with calendar-multiget.
    async fn fetch_stored(
        &self,
        resource_url: &str,
        calendar_url: &str,
    ) -> ProviderResult<Option<CanonicalEvent>> {
        let href = url::Url::parse(resource_url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| resource_url.to_string());
        let xml = self
            .client
            .report(calendar_url, calendar_multiget_body(&[href.as_str()])?)
            .await?;
        let Some(object) = parse_objects(&xml).into_iter().next() else {
            return Ok(None);
        };
        Ok(parse_calendar_data(&object.data).into_iter().next().map(|mut event| {
            event.sync.version_tag = object.etag;
            event
        }))
    }

    async fn create_impl(&self, calendar_id: String, mut event: CanonicalEvent) -> WriteResult {
        if event.uid.trim().is_empty() {
            event.uid = uuid::Uuid::new_v4().to_string();
        }
        let calendar_url = self.config().resolve(&calendar_id);
        let resource_url = format!(
            "{}/{}.ics",
            calendar_url.trim_end_matches('/'),
            urlencoding::encode(&event.uid)
        );
        let response = self
            .client
            .put(&resource_url, to_ics(&event), &Precondition::IfNoneMatchAny)
            .await;
        self.finish_put(&resource_url, &calendar_url, event, response).await
    }

    async fn update_impl(&self, event: CanonicalEvent, changes: EventChanges) -> WriteResult {
        let (calendar_url, resource_url) = match locate(&event) {
            Ok(ids) => ids,
            Err(e) => return self.write_failed(e),
        };
        if event.sync.is_recurring_instance {
            return self.write_failed(
                ProviderError::permission("changing a single occurrence is not supported")
                    .with_provider(NAME),
            );
        }
        if changes.is_empty() {
            return WriteResult::written(event);
        }

        let mut updated = event.clone();
        changes.apply_to(&mut updated);
        let response = self
            .client
            .put(
                &resource_url,
                to_ics(&updated),
                &Precondition::if_match(event.version_tag()),
            )
            .await;
        self.finish_put(&resource_url, &calendar_url, updated, response).await
    }

    async fn delete_impl(&self, event: CanonicalEvent) -> WriteResult {
        let (_, resource_url) = match locate(&event) {
            Ok(ids) => ids,
            Err(e) => return self.write_failed(e),
        };
        let response = match self
            .client
            .delete(&resource_url, &Precondition::if_match(event.version_tag()))
            .await
        {
            Ok(response) => response,
            Err(e) => return self.write_failed(e),
        };
        match response.status() {
            status if status.is_success() => WriteResult::deleted(),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                debug!(resource = %resource_url, "resource already deleted");
                WriteResult::deleted()
            }
            StatusCode::PRECONDITION_FAILED => WriteResult::conflict(),
            _ => {
                let err = CalDavClient::error_from_response(response).await;
                self.write_failed(err)
            }
        }
    }
}

/// Returns the calendar URL and resource URL a write must address.
fn locate(event: &CanonicalEvent) -> ProviderResult<(String, String)> {
    let resource = event
        .sync
        .provider_event_id
        .clone()
        .ok_or_else(|| ProviderError::not_found("event has no CalDAV resource URL").with_provider(NAME))?;
    let calendar = event
        .sync
        .provider_calendar_id
        .clone()
        .unwrap_or_else(|| parent_collection(&resource));
    Ok((calendar, resource))
}

fn parent_collection(resource: &str) -> String {
    match resource.rfind('/') {
        Some(index) => resource[..=index].to_string(),
        None => resource.to_string(),
    }
}

fn last_segment(href: &str) -> &str {
    href.trim_end_matches('/').rsplit('/').next().unwrap_or(href)
}

impl CalendarProvider for CalDavProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn connect(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.connect_impl())
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            *self.home_set.lock().await = None;
            self.writable.lock().await.clear();
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

#[cfg(test)]
mod tests {
    use super::*;
    use calsync_core::{EventTime, SyncMetadata};
    use chrono::{NaiveDate, TimeZone, Utc};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> CalDavProvider {
        let config = CalDavConfig::new(format!("{}/", server.uri()), "alice", "app-pass").unwrap();
        CalDavProvider::new(config).unwrap()
    }

    fn multistatus(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(207).set_body_string(format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">{}</d:multistatus>"#,
            body
        ))
    }

    async fn mount_discovery(server: &MockServer) {
        Mock::given(method("PROPFIND"))
            .and(path("/"))
            .respond_with(multistatus(
                r#"<d:response><d:href>/</d:href><d:propstat><d:prop>
                <d:current-user-principal><d:href>/principals/alice/</d:href></d:current-user-principal>
                </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"#,
            ))
            .mount(server)
            .await;
        Mock::given(method("PROPFIND"))
            .and(path("/principals/alice/"))
            .respond_with(multistatus(
                r#"<d:response><d:href>/principals/alice/</d:href><d:propstat><d:prop>
                <c:calendar-home-set><d:href>/calendars/alice/</d:href></c:calendar-home-set>
                </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"#,
            ))
            .mount(server)
            .await;
        Mock::given(method("PROPFIND"))
            .and(path("/calendars/alice/"))
            .and(header("Depth", "1"))
            .respond_with(multistatus(
                r#"<d:response><d:href>/calendars/alice/work/</d:href><d:propstat><d:prop>
                <d:displayname>Work</d:displayname>
                <d:resourcetype><d:collection/><c:calendar/></d:resourcetype>
                </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>
                <d:response><d:href>/calendars/alice/inbox/</d:href><d:propstat><d:prop>
                <d:resourcetype><d:collection/></d:resourcetype>
                </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"#,
            ))
            .mount(server)
            .await;
    }

    fn stored_event(server: &MockServer, etag: &str) -> CanonicalEvent {
        let at = Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap();
        CanonicalEvent::new("evt1", EventTime::from_utc(at), EventTime::from_utc(at)).with_sync(
            SyncMetadata {
                provider_event_id: Some(format!("{}/calendars/alice/work/evt1.ics", server.uri())),
                provider_calendar_id: Some(format!("{}/calendars/alice/work/", server.uri())),
                version_tag: Some(etag.to_string()),
                can_edit: true,
                ..SyncMetadata::default()
            },
        )
    }

    #[tokio::test]
    async fn discovers_and_lists_calendars() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;

        let provider = provider(&server);
        assert!(provider.connect().await);
        let calendars = provider.list_calendars().await.unwrap();
        assert_eq!(calendars.len(), 1);
        assert_eq!(calendars[0].id, format!("{}/calendars/alice/work/", server.uri()));
        assert_eq!(calendars[0].name, "Work");
        assert!(calendars[0].writable);
    }

    #[tokio::test]
    async fn missing_home_set_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("PROPFIND"))
            .respond_with(multistatus(""))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let err = provider.list_calendars().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::NotFound);
        assert!(provider.status().is_error());
    }

    #[tokio::test]
    async fn fetches_events_with_etags() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("REPORT"))
            .and(path("/calendars/alice/work/"))
            .and(body_string_contains("c:expand"))
            .respond_with(multistatus(
                r#"<d:response><d:href>/calendars/alice/work/evt1.ics</d:href><d:propstat><d:prop>
<d:getetag>"e1"</d:getetag>
<c:calendar-data>BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:evt1
DTSTART:20250205T100000Z
DTEND:20250205T110000Z
SUMMARY:Standup
END:VEVENT
END:VCALENDAR
</c:calendar-data></d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>
<d:response><d:href>/calendars/alice/work/holiday.ics</d:href><d:propstat><d:prop>
<d:getetag>"e2"</d:getetag>
<c:calendar-data>BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:holiday
DTSTART;VALUE=DATE:20250210
DTEND;VALUE=DATE:20250212
SUMMARY:Offsite
END:VEVENT
END:VCALENDAR
</c:calendar-data></d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"#,
            ))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let events = provider.get_events(FetchOptions::new()).await.unwrap();
        assert_eq!(events.len(), 2);

        let standup = events.iter().find(|e| e.uid == "evt1").unwrap();
        assert_eq!(standup.version_tag(), Some("\"e1\""));
        assert_eq!(
            standup.sync.provider_event_id,
            Some(format!("{}/calendars/alice/work/evt1.ics", server.uri()))
        );

        let offsite = events.iter().find(|e| e.uid == "holiday").unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 2, 11).unwrap();
        assert_eq!(offsite.end, EventTime::AllDay(end));
        assert_eq!(provider.status().last_event_count, 2);
    }

    #[tokio::test]
    async fn create_uses_if_none_match_and_returns_etag() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/calendars/alice/work/new-1.ics"))
            .and(header("If-None-Match", "*"))
            .and(body_string_contains("UID:new-1"))
            .respond_with(ResponseTemplate::new(201).insert_header("ETag", "\"n1\""))
            .mount(&server)
            .await;

        let at = Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap();
        let event = CanonicalEvent::new("new-1", EventTime::from_utc(at), EventTime::from_utc(at));
        let provider = provider(&server);
        let result = provider
            .create_event(format!("{}/calendars/alice/work/", server.uri()), event)
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.event.unwrap().version_tag(), Some("\"n1\""));
    }

    #[tokio::test]
    async fn uid_collision_is_a_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(412))
            .mount(&server)
            .await;

        let at = Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap();
        let event = CanonicalEvent::new("dup", EventTime::from_utc(at), EventTime::from_utc(at));
        let result = provider(&server)
            .create_event("/calendars/alice/work/".to_string(), event)
            .await;
        assert!(result.conflict);
    }

    #[tokio::test]
    async fn etag_is_read_back_when_missing() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("REPORT"))
            .and(path("/calendars/alice/work/"))
            .and(body_string_contains("calendar-multiget"))
            .respond_with(multistatus(
                r#"<d:response><d:href>/calendars/alice/work/evt1.ics</d:href><d:propstat><d:prop>
<d:getetag>"fresh"</d:getetag>
<c:calendar-data>BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:evt1
DTSTART:20250205T100000Z
DTEND:20250205T110000Z
SUMMARY:Renamed
END:VEVENT
END:VCALENDAR
</c:calendar-data></d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"#,
            ))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let result = provider
            .update_event(
                stored_event(&server, "\"old\""),
                EventChanges::new().with_summary("Renamed"),
                WriteOptions::default(),
            )
            .await;
        assert!(result.success, "{:?}", result.error);
        let event = result.event.unwrap();
        assert_eq!(event.version_tag(), Some("\"fresh\""));
        assert_eq!(event.summary, "Renamed");
    }

    #[tokio::test]
    async fn stale_etag_is_a_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/calendars/alice/work/evt1.ics"))
            .and(header("If-Match", "\"old\""))
            .respond_with(ResponseTemplate::new(412))
            .mount(&server)
            .await;

        let result = provider(&server)
            .update_event(
                stored_event(&server, "\"old\""),
                EventChanges::new().with_summary("Renamed"),
                WriteOptions::default(),
            )
            .await;
        assert!(!result.success);
        assert!(result.conflict);
    }

    #[tokio::test]
    async fn single_occurrence_update_is_refused() {
        let server = MockServer::start().await;
        let mut event = stored_event(&server, "\"e\"");
        event.sync.is_recurring_instance = true;

        let result = provider(&server)
            .update_event(event, EventChanges::new().with_summary("x"), WriteOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.error_code, Some(ProviderErrorCode::Permission));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_missing_resource_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/calendars/alice/work/evt1.ics"))
            .and(header("If-Match", "\"e\""))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = provider(&server).delete_event(stored_event(&server, "\"e\"")).await;
        assert!(result.success);
    }

    #[test]
    fn path_helpers() {
        assert_eq!(parent_collection("https://h/cal/work/a.ics"), "https://h/cal/work/");
        assert_eq!(last_segment("/calendars/alice/work/"), "work");
    }
}
