//! Canonical event model shared by every provider.
//!
//! Providers convert their wire formats into [`CanonicalEvent`] on read and
//! back on write. The event carries [`SyncMetadata`] so that a later update
//! or delete can be addressed to the right remote resource and guarded by
//! the version tag the provider handed out.

use serde::{Deserialize, Serialize};

use crate::time::EventTime;

/// Confirmation status of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Tentative => "tentative",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Whether the event blocks time on a free/busy view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transparency {
    #[default]
    Opaque,
    Transparent,
}

/// Importance (priority) of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

/// An attendee's response to an invitation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Accepted,
    Declined,
    Tentative,
    #[default]
    NeedsAction,
}

/// An organizer or attendee of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Email address.
    pub email: String,
    /// Display name, if known.
    pub name: Option<String>,
    /// Response to the invitation.
    #[serde(default)]
    pub response: ResponseStatus,
}

impl Attendee {
    /// Creates an attendee with the given email and no response yet.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            response: ResponseStatus::NeedsAction,
        }
    }

    /// Builder method to set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder method to set the response status.
    pub fn with_response(mut self, response: ResponseStatus) -> Self {
        self.response = response;
        self
    }
}

/// Provider-side bookkeeping attached to every canonical event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Identifier of the event on the provider (Google/Graph id, CalDAV href).
    pub provider_event_id: Option<String>,
    /// Identifier of the calendar that holds the event.
    pub provider_calendar_id: Option<String>,
    /// Opaque version tag (ETag or change key) used for optimistic concurrency.
    pub version_tag: Option<String>,
    /// Whether the current account may modify the event.
    pub can_edit: bool,
    /// Identifier of the recurring series master, for instances.
    pub recurring_master_id: Option<String>,
    /// Whether this event is a single occurrence of a recurring series.
    pub is_recurring_instance: bool,
}

/// The provider-independent representation of a calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// Stable event identifier (iCalendar UID where available).
    pub uid: String,
    /// Event start.
    pub start: EventTime,
    /// Event end. Inclusive for all-day events.
    pub end: EventTime,
    /// Title.
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub transparency: Transparency,
    #[serde(default)]
    pub importance: Importance,
    pub organizer: Option<Attendee>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    /// Recurrence rule body, without the `RRULE:` prefix.
    pub recurrence_rule: Option<String>,
    /// IANA timezone the event was authored in, when the provider reports one.
    pub timezone: Option<String>,
    /// Link to the event in the provider's web UI.
    pub html_link: Option<String>,
    #[serde(default)]
    pub sync: SyncMetadata,
}

impl CanonicalEvent {
    /// Creates a confirmed, opaque event with an empty summary.
    pub fn new(uid: impl Into<String>, start: EventTime, end: EventTime) -> Self {
        Self {
            uid: uid.into(),
            start,
            end,
            summary: String::new(),
            description: None,
            location: None,
            status: EventStatus::Confirmed,
            transparency: Transparency::Opaque,
            importance: Importance::Normal,
            organizer: None,
            attendees: Vec::new(),
            recurrence_rule: None,
            timezone: None,
            html_link: None,
            sync: SyncMetadata::default(),
        }
    }

    /// Returns `true` for all-day events.
    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    /// Builder method to set the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Builder method to set the status.
    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder method to set the sync metadata.
    pub fn with_sync(mut self, sync: SyncMetadata) -> Self {
        self.sync = sync;
        self
    }

    /// Returns the stored version tag, if any.
    pub fn version_tag(&self) -> Option<&str> {
        self.sync.version_tag.as_deref()
    }
}

/// A partial update to an event. Only the fields that are `Some` change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventChanges {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    pub status: Option<EventStatus>,
    pub transparency: Option<Transparency>,
    pub importance: Option<Importance>,
    pub attendees: Option<Vec<Attendee>>,
    pub recurrence_rule: Option<String>,
}

impl EventChanges {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when no field is set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets both bounds at once.
    pub fn with_times(mut self, start: EventTime, end: EventTime) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_transparency(mut self, transparency: Transparency) -> Self {
        self.transparency = Some(transparency);
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Applies the changes to `event` in place.
    pub fn apply_to(&self, event: &mut CanonicalEvent) {
        if let Some(ref summary) = self.summary {
            event.summary = summary.clone();
        }
        if let Some(ref description) = self.description {
            event.description = Some(description.clone());
        }
        if let Some(ref location) = self.location {
            event.location = Some(location.clone());
        }
        if let Some(ref start) = self.start {
            event.start = start.clone();
        }
        if let Some(ref end) = self.end {
            event.end = end.clone();
        }
        if let Some(status) = self.status {
            event.status = status;
        }
        if let Some(transparency) = self.transparency {
            event.transparency = transparency;
        }
        if let Some(importance) = self.importance {
            event.importance = importance;
        }
        if let Some(ref attendees) = self.attendees {
            event.attendees = attendees.clone();
        }
        if let Some(ref rule) = self.recurrence_rule {
            event.recurrence_rule = Some(rule.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn sample() -> CanonicalEvent {
        CanonicalEvent::new(
            "evt-1",
            EventTime::from_utc(Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap()),
            EventTime::from_utc(Utc.with_ymd_and_hms(2025, 2, 5, 11, 0, 0).unwrap()),
        )
        .with_summary("Standup")
    }

    #[test]
    fn defaults() {
        let event = sample();
        assert_eq!(event.status, EventStatus::Confirmed);
        assert_eq!(event.transparency, Transparency::Opaque);
        assert_eq!(event.importance, Importance::Normal);
        assert!(!event.is_all_day());
        assert!(event.version_tag().is_none());
    }

    #[test]
    fn all_day_is_derived_from_start() {
        let day = NaiveDate::from_ymd_opt(2025, 2, 10).unwrap();
        let event = CanonicalEvent::new("a", EventTime::from_date(day), EventTime::from_date(day));
        assert!(event.is_all_day());
    }

    #[test]
    fn apply_changes_only_touches_set_fields() {
        let mut event = sample().with_location("Room 1");
        let changes = EventChanges::new()
            .with_summary("Retro")
            .with_status(EventStatus::Tentative);

        changes.apply_to(&mut event);

        assert_eq!(event.summary, "Retro");
        assert_eq!(event.status, EventStatus::Tentative);
        assert_eq!(event.location.as_deref(), Some("Room 1"));
    }

    #[test]
    fn empty_changes() {
        assert!(EventChanges::new().is_empty());
        assert!(!EventChanges::new().with_summary("x").is_empty());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&EventStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        let json = serde_json::to_string(&ResponseStatus::NeedsAction).unwrap();
        assert_eq!(json, "\"needs_action\"");
    }
}
