//! Google Calendar v3 wire types and their canonical conversions.

use calsync_core::{
    Attendee, CanonicalEvent, EventChanges, EventStatus, EventTime, ResponseStatus, SyncMetadata,
    Transparency,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::provider::CalendarListEntry;

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventListResponse {
    #[serde(default)]
    pub items: Vec<ApiEvent>,
    pub next_page_token: Option<String>,
    /// The caller's role on the calendar.
    pub access_role: Option<String>,
}

/// A single event from the Google Calendar API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiEvent {
    pub id: Option<String>,
    #[serde(rename = "iCalUID")]
    pub ical_uid: Option<String>,
    pub etag: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<ApiEventTime>,
    pub end: Option<ApiEventTime>,
    pub html_link: Option<String>,
    pub status: Option<String>,
    pub transparency: Option<String>,
    pub recurring_event_id: Option<String>,
    pub recurrence: Option<Vec<String>>,
    pub organizer: Option<ApiAttendee>,
    pub attendees: Option<Vec<ApiAttendee>>,
    pub guests_can_modify: Option<bool>,
}

/// Event time as sent and received by the API.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiEventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiAttendee {
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
}

/// Response from the calendarList endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CalendarListResponse {
    #[serde(default)]
    pub items: Vec<ApiCalendar>,
    pub next_page_token: Option<String>,
}

/// A calendar from the calendar list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiCalendar {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    pub summary_override: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub primary: bool,
    pub time_zone: Option<String>,
    pub background_color: Option<String>,
    pub access_role: Option<String>,
}

/// Body of an insert or patch request. Unset fields are omitted.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiEventWrite {
    #[serde(rename = "iCalUID", skip_serializing_if = "Option::is_none")]
    pub ical_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<ApiEventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<ApiEventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparency: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<ApiAttendee>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Vec<String>>,
}

pub(crate) fn is_writable_role(role: Option<&str>) -> bool {
    matches!(role, Some("owner" | "writer"))
}

impl ApiCalendar {
    pub fn into_entry(self) -> CalendarListEntry {
        let writable = is_writable_role(self.access_role.as_deref());
        let name = self.summary_override.unwrap_or(self.summary);
        let mut entry = CalendarListEntry::new(self.id, name)
            .with_primary(self.primary)
            .with_writable(writable);
        entry.color = self.background_color;
        entry.description = self.description;
        entry.timezone = self.time_zone;
        entry
    }
}

fn parse_status(status: Option<&str>) -> EventStatus {
    match status {
        Some("tentative") => EventStatus::Tentative,
        Some("cancelled") => EventStatus::Cancelled,
        _ => EventStatus::Confirmed,
    }
}

fn status_to_wire(status: EventStatus) -> &'static str {
    status.as_str()
}

fn transparency_to_wire(transparency: Transparency) -> &'static str {
    match transparency {
        Transparency::Opaque => "opaque",
        Transparency::Transparent => "transparent",
    }
}

fn parse_response(status: Option<&str>) -> ResponseStatus {
    match status {
        Some("accepted") => ResponseStatus::Accepted,
        Some("declined") => ResponseStatus::Declined,
        Some("tentative") => ResponseStatus::Tentative,
        _ => ResponseStatus::NeedsAction,
    }
}

fn response_to_wire(status: ResponseStatus) -> &'static str {
    match status {
        ResponseStatus::Accepted => "accepted",
        ResponseStatus::Declined => "declined",
        ResponseStatus::Tentative => "tentative",
        ResponseStatus::NeedsAction => "needsAction",
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| warn!(value, error = %e, "failed to parse date"))
        .ok()
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| warn!(value, error = %e, "failed to parse datetime"))
        .ok()
}

fn attendee_from_api(attendee: ApiAttendee) -> Option<Attendee> {
    let email = attendee.email?;
    let mut converted = Attendee::new(email).with_response(parse_response(attendee.response_status.as_deref()));
    converted.name = attendee.display_name;
    Some(converted)
}

fn attendee_to_api(attendee: &Attendee) -> ApiAttendee {
    ApiAttendee {
        email: Some(attendee.email.clone()),
        display_name: attendee.name.clone(),
        response_status: Some(response_to_wire(attendee.response).to_string()),
    }
}

/// Wire form of a start time.
pub(crate) fn time_to_api(time: &EventTime, timezone: Option<&str>) -> ApiEventTime {
    match time {
        EventTime::AllDay(date) => ApiEventTime {
            date: Some(date.format("%Y-%m-%d").to_string()),
            ..ApiEventTime::default()
        },
        EventTime::DateTime(dt) => ApiEventTime {
            date_time: Some(dt.to_rfc3339()),
            time_zone: timezone.map(str::to_string),
            ..ApiEventTime::default()
        },
    }
}

/// Wire form of a canonical end time; all-day ends become exclusive.
pub(crate) fn end_to_api(end: &EventTime, timezone: Option<&str>) -> ApiEventTime {
    time_to_api(&end.to_exclusive_end(), timezone)
}

fn recurrence_to_api(rule: &str) -> Vec<String> {
    vec![format!("RRULE:{}", rule.trim_start_matches("RRULE:"))]
}

impl ApiEvent {
    /// Converts to the canonical model. Returns `None` for events without
    /// usable times.
    pub fn into_canonical(self, calendar_id: &str, calendar_writable: bool) -> Option<CanonicalEvent> {
        let id = self.id?;
        let start_wire = self.start.unwrap_or_default();
        let end_wire = self.end.unwrap_or_default();

        let (start, end) = match (start_wire.date_time.as_deref(), start_wire.date.as_deref()) {
            (Some(dt), _) => {
                let start = parse_datetime(dt)?;
                let end = end_wire
                    .date_time
                    .as_deref()
                    .and_then(parse_datetime)
                    .unwrap_or(start);
                (EventTime::from_utc(start), EventTime::from_utc(end))
            }
            (None, Some(date)) => {
                let start = parse_date(date)?;
                let end = end_wire
                    .date
                    .as_deref()
                    .and_then(parse_date)
                    .map(|d| EventTime::from_exclusive_end(d, start))
                    .unwrap_or(EventTime::AllDay(start));
                (EventTime::AllDay(start), end)
            }
            (None, None) => {
                warn!(event = %id, "event has no start time");
                return None;
            }
        };

        let uid = self.ical_uid.clone().unwrap_or_else(|| id.clone());
        let mut event = CanonicalEvent::new(uid, start, end)
            .with_summary(self.summary.unwrap_or_default())
            .with_status(parse_status(self.status.as_deref()));
        event.description = self.description;
        event.location = self.location;
        event.transparency = match self.transparency.as_deref() {
            Some("transparent") => Transparency::Transparent,
            _ => Transparency::Opaque,
        };
        event.organizer = self.organizer.and_then(attendee_from_api);
        event.attendees = self
            .attendees
            .unwrap_or_default()
            .into_iter()
            .filter_map(attendee_from_api)
            .collect();
        event.recurrence_rule = self.recurrence.unwrap_or_default().into_iter().find_map(|line| {
            line.strip_prefix("RRULE:").map(str::to_string)
        });
        event.timezone = start_wire.time_zone;
        event.html_link = self.html_link;
        event.sync = SyncMetadata {
            provider_event_id: Some(id),
            provider_calendar_id: Some(calendar_id.to_string()),
            version_tag: self.etag,
            can_edit: calendar_writable || self.guests_can_modify.unwrap_or(false),
            is_recurring_instance: self.recurring_event_id.is_some(),
            recurring_master_id: self.recurring_event_id,
        };
        Some(event)
    }
}

impl ApiEventWrite {
    /// Full body for creating `event`.
    pub fn from_event(event: &CanonicalEvent) -> Self {
        let tz = event.timezone.as_deref();
        Self {
            ical_uid: Some(event.uid.clone()).filter(|uid| !uid.is_empty()),
            summary: Some(event.summary.clone()),
            description: event.description.clone(),
            location: event.location.clone(),
            start: Some(time_to_api(&event.start, tz)),
            end: Some(end_to_api(&event.end, tz)),
            status: Some(status_to_wire(event.status)),
            transparency: Some(transparency_to_wire(event.transparency)),
            attendees: (!event.attendees.is_empty())
                .then(|| event.attendees.iter().map(attendee_to_api).collect()),
            recurrence: event.recurrence_rule.as_deref().map(recurrence_to_api),
        }
    }

    /// Partial body carrying only the changed fields.
    pub fn from_changes(changes: &EventChanges) -> Self {
        Self {
            ical_uid: None,
            summary: changes.summary.clone(),
            description: changes.description.clone(),
            location: changes.location.clone(),
            start: changes.start.as_ref().map(|t| time_to_api(t, None)),
            end: changes.end.as_ref().map(|t| end_to_api(t, None)),
            status: changes.status.map(status_to_wire),
            transparency: changes.transparency.map(transparency_to_wire),
            attendees: changes
                .attendees
                .as_ref()
                .map(|list| list.iter().map(attendee_to_api).collect()),
            recurrence: changes.recurrence_rule.as_deref().map(recurrence_to_api),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn timed_event() {
        let json = r#"{
            "id": "evt1",
            "iCalUID": "evt1@google.com",
            "etag": "\"3181161784712000\"",
            "summary": "Standup",
            "start": {"dateTime": "2025-02-05T10:00:00+01:00", "timeZone": "Europe/Paris"},
            "end": {"dateTime": "2025-02-05T10:15:00+01:00"},
            "status": "tentative",
            "transparency": "transparent",
            "recurringEventId": "master1",
            "attendees": [
                {"email": "a@example.com", "responseStatus": "accepted"},
                {"email": "b@example.com", "displayName": "B", "responseStatus": "needsAction"}
            ]
        }"#;
        let api: ApiEvent = serde_json::from_str(json).unwrap();
        let event = api.into_canonical("primary", true).unwrap();

        assert_eq!(event.uid, "evt1@google.com");
        assert_eq!(
            event.start,
            EventTime::from_utc(Utc.with_ymd_and_hms(2025, 2, 5, 9, 0, 0).unwrap())
        );
        assert_eq!(event.status, EventStatus::Tentative);
        assert_eq!(event.transparency, Transparency::Transparent);
        assert_eq!(event.timezone.as_deref(), Some("Europe/Paris"));
        assert_eq!(event.attendees.len(), 2);
        assert_eq!(event.attendees[0].response, ResponseStatus::Accepted);
        assert_eq!(event.sync.provider_event_id.as_deref(), Some("evt1"));
        assert_eq!(event.version_tag(), Some("\"3181161784712000\""));
        assert!(event.sync.is_recurring_instance);
        assert_eq!(event.sync.recurring_master_id.as_deref(), Some("master1"));
        assert!(event.sync.can_edit);
    }

    #[test]
    fn all_day_end_is_made_inclusive() {
        let json = r#"{
            "id": "evt2",
            "start": {"date": "2025-02-10"},
            "end": {"date": "2025-02-11"}
        }"#;
        let api: ApiEvent = serde_json::from_str(json).unwrap();
        let event = api.into_canonical("primary", false).unwrap();
        assert!(event.is_all_day());
        assert_eq!(event.start, EventTime::AllDay(date(2025, 2, 10)));
        assert_eq!(event.end, EventTime::AllDay(date(2025, 2, 10)));
        assert_eq!(event.uid, "evt2");
        assert!(!event.sync.can_edit);
    }

    #[test]
    fn unknown_values_fall_back() {
        let json = r#"{
            "id": "evt3",
            "start": {"dateTime": "2025-02-05T10:00:00Z"},
            "end": {"dateTime": "2025-02-05T11:00:00Z"},
            "status": "weird",
            "transparency": "unknown"
        }"#;
        let event = serde_json::from_str::<ApiEvent>(json)
            .unwrap()
            .into_canonical("c", false)
            .unwrap();
        assert_eq!(event.status, EventStatus::Confirmed);
        assert_eq!(event.transparency, Transparency::Opaque);
    }

    #[test]
    fn cancelled_event_is_kept() {
        let json = r#"{
            "id": "evt4",
            "status": "cancelled",
            "start": {"dateTime": "2025-02-05T10:00:00Z"},
            "end": {"dateTime": "2025-02-05T11:00:00Z"}
        }"#;
        let event = serde_json::from_str::<ApiEvent>(json)
            .unwrap()
            .into_canonical("c", false)
            .unwrap();
        assert_eq!(event.status, EventStatus::Cancelled);
    }

    #[test]
    fn event_without_times_is_skipped() {
        let api: ApiEvent = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert!(api.into_canonical("c", false).is_none());
    }

    #[test]
    fn write_body_uses_exclusive_end() {
        let day = date(2025, 2, 10);
        let event = CanonicalEvent::new("uid-1", EventTime::AllDay(day), EventTime::AllDay(day))
            .with_summary("Holiday");
        let body = serde_json::to_value(ApiEventWrite::from_event(&event)).unwrap();
        assert_eq!(body["start"]["date"], "2025-02-10");
        assert_eq!(body["end"]["date"], "2025-02-11");
        assert_eq!(body["iCalUID"], "uid-1");
        assert_eq!(body["status"], "confirmed");
        assert!(body.get("attendees").is_none());
    }

    #[test]
    fn patch_body_only_has_changes() {
        let changes = EventChanges::new()
            .with_summary("Renamed")
            .with_status(EventStatus::Cancelled);
        let body = serde_json::to_value(ApiEventWrite::from_changes(&changes)).unwrap();
        let object = body.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(body["summary"], "Renamed");
        assert_eq!(body["status"], "cancelled");
    }

    #[test]
    fn calendar_entry_roles() {
        let json = r##"{
            "items": [
                {"id": "me@example.com", "summary": "Me", "primary": true, "accessRole": "owner", "backgroundColor": "#9fe1e7"},
                {"id": "holidays", "summary": "Holidays", "summaryOverride": "Public holidays", "accessRole": "reader"}
            ]
        }"##;
        let list: CalendarListResponse = serde_json::from_str(json).unwrap();
        let entries: Vec<_> = list.items.into_iter().map(ApiCalendar::into_entry).collect();
        assert!(entries[0].is_primary && entries[0].writable);
        assert_eq!(entries[0].color.as_deref(), Some("#9fe1e7"));
        assert!(!entries[1].writable);
        assert_eq!(entries[1].name, "Public holidays");
    }
}
