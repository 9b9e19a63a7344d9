//! Microsoft Graph v1.0 calendar wire types and conversions.
//!
//! Requests carry `Prefer: outlook.timezone="UTC"`, so every `dateTime` read
//! here is a naive UTC timestamp.

use calsync_core::{
    Attendee, CanonicalEvent, EventChanges, EventStatus, EventTime, Importance, ResponseStatus,
    SyncMetadata, Transparency,
};
use chrono::{NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::provider::CalendarListEntry;

use super::recurrence::{PatternedRecurrence, from_rrule, to_rrule};

/// A page of a Graph collection.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphPage<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphCalendar {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub hex_color: Option<String>,
    #[serde(default)]
    pub is_default_calendar: bool,
    #[serde(default)]
    pub can_edit: bool,
}

impl GraphCalendar {
    pub fn into_entry(self) -> CalendarListEntry {
        let mut entry = CalendarListEntry::new(self.id, self.name)
            .with_primary(self.is_default_calendar)
            .with_writable(self.can_edit);
        entry.color = self.hex_color.filter(|c| !c.is_empty());
        entry
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphDateTime {
    pub date_time: String,
    pub time_zone: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphEmailAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphRecipient {
    #[serde(default)]
    pub email_address: GraphEmailAddress,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub(crate) struct GraphResponse {
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphAttendee {
    #[serde(default)]
    pub email_address: GraphEmailAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GraphResponse>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphBody {
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphLocation {
    #[serde(default)]
    pub display_name: String,
}

/// An event as returned by Graph.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphEvent {
    pub id: String,
    #[serde(rename = "iCalUId")]
    pub ical_uid: Option<String>,
    #[serde(rename = "@odata.etag")]
    pub etag: Option<String>,
    pub change_key: Option<String>,
    pub subject: Option<String>,
    pub body: Option<GraphBody>,
    pub body_preview: Option<String>,
    pub location: Option<GraphLocation>,
    pub start: Option<GraphDateTime>,
    pub end: Option<GraphDateTime>,
    #[serde(default)]
    pub is_all_day: bool,
    pub show_as: Option<String>,
    pub importance: Option<String>,
    #[serde(default)]
    pub is_cancelled: bool,
    pub response_status: Option<GraphResponse>,
    pub organizer: Option<GraphRecipient>,
    #[serde(default)]
    pub attendees: Vec<GraphAttendee>,
    pub recurrence: Option<PatternedRecurrence>,
    pub series_master_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub web_link: Option<String>,
    pub original_start_time_zone: Option<String>,
}

/// Body of a create or PATCH request. Unset fields are omitted.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphEventWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<GraphBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GraphLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<GraphDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<GraphDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_all_day: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_as: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<GraphAttendee>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<PatternedRecurrence>,
}

fn parse_graph_datetime(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| warn!(value, error = %e, "failed to parse Graph dateTime"))
        .ok()
}

/// Graph writes seven fractional digits (100 ns ticks).
fn format_graph_datetime(value: NaiveDateTime) -> String {
    format!(
        "{}.{:07}",
        value.format("%Y-%m-%dT%H:%M:%S"),
        value.nanosecond() / 100
    )
}

fn graph_time(time: &EventTime) -> GraphDateTime {
    let naive = match time {
        EventTime::DateTime(dt) => dt.naive_utc(),
        EventTime::AllDay(date) => date.and_time(chrono::NaiveTime::MIN),
    };
    GraphDateTime {
        date_time: format_graph_datetime(naive),
        time_zone: "UTC".to_string(),
    }
}

fn importance_from_wire(value: Option<&str>) -> Importance {
    match value {
        Some("low") => Importance::Low,
        Some("high") => Importance::High,
        _ => Importance::Normal,
    }
}

fn importance_to_wire(importance: Importance) -> &'static str {
    match importance {
        Importance::Low => "low",
        Importance::Normal => "normal",
        Importance::High => "high",
    }
}

fn response_from_wire(value: Option<&str>) -> ResponseStatus {
    match value {
        Some("accepted" | "organizer") => ResponseStatus::Accepted,
        Some("declined") => ResponseStatus::Declined,
        Some("tentativelyAccepted") => ResponseStatus::Tentative,
        _ => ResponseStatus::NeedsAction,
    }
}

fn response_to_wire(status: ResponseStatus) -> &'static str {
    match status {
        ResponseStatus::Accepted => "accepted",
        ResponseStatus::Declined => "declined",
        ResponseStatus::Tentative => "tentativelyAccepted",
        ResponseStatus::NeedsAction => "notResponded",
    }
}

/// Graph folds status and transparency into `showAs`.
fn show_as(status: EventStatus, transparency: Transparency) -> &'static str {
    match (status, transparency) {
        (_, Transparency::Transparent) => "free",
        (EventStatus::Tentative, _) => "tentative",
        _ => "busy",
    }
}

fn recipient_to_attendee(recipient: GraphEmailAddress, response: Option<&str>) -> Option<Attendee> {
    let email = recipient.address.filter(|a| !a.is_empty())?;
    let mut attendee = Attendee::new(email).with_response(response_from_wire(response));
    attendee.name = recipient.name.filter(|n| !n.is_empty());
    Some(attendee)
}

fn attendee_to_graph(attendee: &Attendee) -> GraphAttendee {
    GraphAttendee {
        email_address: GraphEmailAddress {
            name: attendee.name.clone(),
            address: Some(attendee.email.clone()),
        },
        status: Some(GraphResponse {
            response: Some(response_to_wire(attendee.response).to_string()),
        }),
        kind: Some("required".to_string()),
    }
}

impl GraphEvent {
    /// Converts to the canonical model. Returns `None` for events without
    /// usable times.
    pub fn into_canonical(self, calendar_id: &str, calendar_writable: bool) -> Option<CanonicalEvent> {
        let start = parse_graph_datetime(&self.start.as_ref()?.date_time)?;
        let end = self
            .end
            .as_ref()
            .and_then(|e| parse_graph_datetime(&e.date_time))
            .unwrap_or(start);

        let (start, end) = if self.is_all_day {
            let start_date: NaiveDate = start.date();
            (
                EventTime::AllDay(start_date),
                EventTime::from_exclusive_end(end.date(), start_date),
            )
        } else {
            (
                EventTime::from_utc(start.and_utc()),
                EventTime::from_utc(end.and_utc()),
            )
        };

        let response = self.response_status.as_ref().and_then(|r| r.response.as_deref());
        let status = if self.is_cancelled {
            EventStatus::Cancelled
        } else if response == Some("tentativelyAccepted")
            || self.show_as.as_deref() == Some("tentative")
        {
            EventStatus::Tentative
        } else {
            EventStatus::Confirmed
        };

        let uid = self.ical_uid.clone().unwrap_or_else(|| self.id.clone());
        let mut event = CanonicalEvent::new(uid, start, end)
            .with_summary(self.subject.unwrap_or_default())
            .with_status(status);

        event.description = self
            .body
            .map(|b| b.content)
            .filter(|c| !c.trim().is_empty())
            .or(self.body_preview.filter(|p| !p.is_empty()));
        event.location = self
            .location
            .map(|l| l.display_name)
            .filter(|l| !l.is_empty());
        event.transparency = match self.show_as.as_deref() {
            Some("free") => Transparency::Transparent,
            _ => Transparency::Opaque,
        };
        event.importance = importance_from_wire(self.importance.as_deref());
        event.organizer = self
            .organizer
            .and_then(|o| recipient_to_attendee(o.email_address, Some("organizer")));
        event.attendees = self
            .attendees
            .into_iter()
            .filter_map(|a| {
                let response = a.status.and_then(|s| s.response);
                recipient_to_attendee(a.email_address, response.as_deref())
            })
            .collect();
        event.recurrence_rule = self.recurrence.as_ref().and_then(to_rrule);
        event.timezone = self.original_start_time_zone;
        event.html_link = self.web_link;

        let is_instance = matches!(self.kind.as_deref(), Some("occurrence" | "exception"));
        event.sync = SyncMetadata {
            provider_event_id: Some(self.id),
            provider_calendar_id: Some(calendar_id.to_string()),
            version_tag: self.etag.or(self.change_key),
            can_edit: calendar_writable,
            recurring_master_id: self.series_master_id,
            is_recurring_instance: is_instance,
        };
        Some(event)
    }
}

impl GraphEventWrite {
    /// Full body for creating `event`.
    pub fn from_event(event: &CanonicalEvent) -> Self {
        Self {
            subject: Some(event.summary.clone()),
            body: event.description.as_ref().map(|d| GraphBody {
                content_type: "text".to_string(),
                content: d.clone(),
            }),
            location: event.location.as_ref().map(|l| GraphLocation {
                display_name: l.clone(),
            }),
            start: Some(graph_time(&event.start)),
            end: Some(graph_time(&event.end.to_exclusive_end())),
            is_all_day: Some(event.is_all_day()),
            show_as: Some(show_as(event.status, event.transparency)),
            importance: Some(importance_to_wire(event.importance)),
            attendees: (!event.attendees.is_empty())
                .then(|| event.attendees.iter().map(attendee_to_graph).collect()),
            recurrence: event
                .recurrence_rule
                .as_deref()
                .and_then(|rule| from_rrule(rule, event.start.date())),
        }
    }

    /// Partial body for `changes` applied to `current`.
    ///
    /// `current` supplies context Graph needs alongside a change, such as
    /// the all-day flag when times move.
    pub fn from_changes(current: &CanonicalEvent, changes: &EventChanges) -> Self {
        let mut merged = current.clone();
        changes.apply_to(&mut merged);

        let times_changed = changes.start.is_some() || changes.end.is_some();
        let show_as_changed = changes.status.is_some() || changes.transparency.is_some();

        Self {
            subject: changes.summary.clone(),
            body: changes.description.as_ref().map(|d| GraphBody {
                content_type: "text".to_string(),
                content: d.clone(),
            }),
            location: changes.location.as_ref().map(|l| GraphLocation {
                display_name: l.clone(),
            }),
            start: times_changed.then(|| graph_time(&merged.start)),
            end: times_changed.then(|| graph_time(&merged.end.to_exclusive_end())),
            is_all_day: times_changed.then(|| merged.is_all_day()),
            show_as: show_as_changed.then(|| show_as(merged.status, merged.transparency)),
            importance: changes.importance.map(importance_to_wire),
            attendees: changes
                .attendees
                .as_ref()
                .map(|list| list.iter().map(attendee_to_graph).collect()),
            recurrence: changes
                .recurrence_rule
                .as_deref()
                .and_then(|rule| from_rrule(rule, merged.start.date())),
        }
    }
}

/// Formats a window bound for `calendarView` and `$filter`.
pub(crate) fn query_time(value: chrono::DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%SZ").to_string()
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
            "@odata.etag": "W/\"DwAAABYAAAB\"",
            "id": "AAMkAD=",
            "iCalUId": "040000008200E00074C5B7101A82E008",
            "changeKey": "DwAAABYAAAB",
            "subject": "Planning",
            "bodyPreview": "Agenda",
            "body": {"contentType": "html", "content": ""},
            "start": {"dateTime": "2025-02-05T09:00:00.0000000", "timeZone": "UTC"},
            "end": {"dateTime": "2025-02-05T10:00:00.0000000", "timeZone": "UTC"},
            "isAllDay": false,
            "showAs": "free",
            "importance": "high",
            "isCancelled": false,
            "responseStatus": {"response": "tentativelyAccepted", "time": "0001-01-01T00:00:00Z"},
            "organizer": {"emailAddress": {"name": "Alex", "address": "alex@contoso.com"}},
            "attendees": [
                {"type": "required", "status": {"response": "declined"}, "emailAddress": {"address": "sam@contoso.com"}}
            ],
            "type": "occurrence",
            "seriesMasterId": "MASTER=",
            "webLink": "https://outlook.office365.com/owa/?itemid=AAMkAD"
        }"#;
        let event = serde_json::from_str::<GraphEvent>(json)
            .unwrap()
            .into_canonical("cal1", true)
            .unwrap();

        assert_eq!(event.uid, "040000008200E00074C5B7101A82E008");
        assert_eq!(
            event.start,
            EventTime::from_utc(Utc.with_ymd_and_hms(2025, 2, 5, 9, 0, 0).unwrap())
        );
        assert_eq!(event.status, EventStatus::Tentative);
        assert_eq!(event.transparency, Transparency::Transparent);
        assert_eq!(event.importance, Importance::High);
        assert_eq!(event.description.as_deref(), Some("Agenda"));
        assert_eq!(event.organizer.as_ref().unwrap().email, "alex@contoso.com");
        assert_eq!(event.attendees[0].response, ResponseStatus::Declined);
        assert_eq!(event.version_tag(), Some("W/\"DwAAABYAAAB\""));
        assert!(event.sync.is_recurring_instance);
        assert_eq!(event.sync.recurring_master_id.as_deref(), Some("MASTER="));
    }

    #[test]
    fn all_day_end_is_made_inclusive() {
        let json = r#"{
            "id": "a",
            "changeKey": "ck1",
            "start": {"dateTime": "2025-02-10T00:00:00.0000000", "timeZone": "UTC"},
            "end": {"dateTime": "2025-02-12T00:00:00.0000000", "timeZone": "UTC"},
            "isAllDay": true
        }"#;
        let event = serde_json::from_str::<GraphEvent>(json)
            .unwrap()
            .into_canonical("cal1", false)
            .unwrap();
        assert_eq!(event.start, EventTime::AllDay(date(2025, 2, 10)));
        assert_eq!(event.end, EventTime::AllDay(date(2025, 2, 11)));
        assert_eq!(event.version_tag(), Some("ck1"));
    }

    #[test]
    fn cancelled_and_unknown_values() {
        let json = r#"{
            "id": "c",
            "start": {"dateTime": "2025-02-10T08:00:00", "timeZone": "UTC"},
            "end": {"dateTime": "2025-02-10T09:00:00", "timeZone": "UTC"},
            "isCancelled": true,
            "showAs": "workingElsewhere",
            "importance": "urgent"
        }"#;
        let event = serde_json::from_str::<GraphEvent>(json)
            .unwrap()
            .into_canonical("cal1", false)
            .unwrap();
        assert_eq!(event.status, EventStatus::Cancelled);
        assert_eq!(event.transparency, Transparency::Opaque);
        assert_eq!(event.importance, Importance::Normal);
    }

    #[test]
    fn create_body_for_all_day() {
        let day = date(2025, 2, 10);
        let event = CanonicalEvent::new("u", EventTime::AllDay(day), EventTime::AllDay(day))
            .with_summary("Offsite");
        let body = serde_json::to_value(GraphEventWrite::from_event(&event)).unwrap();
        assert_eq!(body["start"]["dateTime"], "2025-02-10T00:00:00.0000000");
        assert_eq!(body["end"]["dateTime"], "2025-02-11T00:00:00.0000000");
        assert_eq!(body["isAllDay"], true);
        assert_eq!(body["showAs"], "busy");
    }

    #[test]
    fn create_body_for_timed_event() {
        let start = Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap();
        let end = start + chrono::Duration::milliseconds(90 * 60 * 1000 + 250);
        let event = CanonicalEvent::new("u", EventTime::from_utc(start), EventTime::from_utc(end))
            .with_summary("Review");
        let body = serde_json::to_value(GraphEventWrite::from_event(&event)).unwrap();
        assert_eq!(body["start"]["dateTime"], "2025-02-05T10:00:00.0000000");
        assert_eq!(body["end"]["dateTime"], "2025-02-05T11:30:00.2500000");
        assert_eq!(body["start"]["timeZone"], "UTC");
        assert_eq!(body["isAllDay"], false);
    }

    #[test]
    fn written_datetime_parses_back() {
        let at = date(2025, 2, 5).and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(parse_graph_datetime(&format_graph_datetime(at)), Some(at));
    }

    #[test]
    fn tentative_show_as_reads_back_tentative() {
        let at = Utc.with_ymd_and_hms(2025, 2, 5, 9, 0, 0).unwrap();
        let event = CanonicalEvent::new("u", EventTime::from_utc(at), EventTime::from_utc(at))
            .with_status(EventStatus::Tentative);
        let body = serde_json::to_value(GraphEventWrite::from_event(&event)).unwrap();
        assert_eq!(body["showAs"], "tentative");

        let json = r#"{
            "id": "t",
            "start": {"dateTime": "2025-02-05T09:00:00.0000000", "timeZone": "UTC"},
            "end": {"dateTime": "2025-02-05T09:30:00.0000000", "timeZone": "UTC"},
            "showAs": "tentative"
        }"#;
        let read = serde_json::from_str::<GraphEvent>(json)
            .unwrap()
            .into_canonical("cal1", true)
            .unwrap();
        assert_eq!(read.status, EventStatus::Tentative);
        assert_eq!(read.transparency, Transparency::Opaque);
    }

    #[test]
    fn patch_body_only_has_changes() {
        let at = Utc.with_ymd_and_hms(2025, 2, 5, 9, 0, 0).unwrap();
        let event = CanonicalEvent::new("u", EventTime::from_utc(at), EventTime::from_utc(at));
        let changes = EventChanges::new().with_transparency(Transparency::Transparent);
        let body = serde_json::to_value(GraphEventWrite::from_changes(&event, &changes)).unwrap();
        assert_eq!(body, serde_json::json!({"showAs": "free"}));
    }

    #[test]
    fn calendars() {
        let json = r##"{
            "value": [
                {"id": "c1", "name": "Calendar", "hexColor": "#e74856", "isDefaultCalendar": true, "canEdit": true},
                {"id": "c2", "name": "Birthdays", "hexColor": "", "canEdit": false}
            ],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/me/calendars?$skip=2"
        }"##;
        let page: GraphPage<GraphCalendar> = serde_json::from_str(json).unwrap();
        assert!(page.next_link.is_some());
        let entries: Vec<_> = page.value.into_iter().map(GraphCalendar::into_entry).collect();
        assert!(entries[0].is_primary && entries[0].writable);
        assert!(entries[1].color.is_none());
    }
}
