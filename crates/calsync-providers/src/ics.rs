//! iCalendar (RFC 5545) adapter for CalDAV resources.
//!
//! [`parse_calendar_data`] turns a `calendar-data` body into canonical
//! events and [`to_ics`] renders one event as a single-VEVENT calendar.
//! All-day ends are exclusive on the wire and inclusive in the canonical
//! model.

use calsync_core::{
    Attendee, CanonicalEvent, EventStatus, EventTime, Importance, ResponseStatus, SyncMetadata,
    Transparency,
};
use chrono::{Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::parser::{Component as ParsedComponent, Property as ParsedProperty, read_calendar, unfold};
use icalendar::{CalendarDateTime, Component, DatePerhapsTime, EventLike, Property, ValueType};
use tracing::{debug, warn};

/// Parses every VEVENT in `data`. Components without a UID or DTSTART are
/// skipped; unparsable input yields no events.
pub fn parse_calendar_data(data: &str) -> Vec<CanonicalEvent> {
    let unfolded = unfold(data);
    let calendar = match read_calendar(&unfolded) {
        Ok(calendar) => calendar,
        Err(e) => {
            warn!(error = %e, "failed to parse calendar data");
            return Vec::new();
        }
    };

    calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(parse_vevent)
        .collect()
}

fn parse_vevent(vevent: &ParsedComponent<'_>) -> Option<CanonicalEvent> {
    let uid = vevent.find_prop("UID")?.val.to_string();
    let (start, timezone) = to_event_time(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);

    let end = match vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time)
    {
        Some((EventTime::AllDay(end), _)) => EventTime::from_exclusive_end(end, start.date()),
        Some((end, _)) => end,
        None => end_from_duration(vevent, &start),
    };

    let mut event = CanonicalEvent::new(uid.clone(), start, end).with_summary(
        vevent
            .find_prop("SUMMARY")
            .map(text_value)
            .unwrap_or_default(),
    );
    event.description = vevent.find_prop("DESCRIPTION").map(text_value);
    event.location = vevent.find_prop("LOCATION").map(text_value);
    event.status = match vevent.find_prop("STATUS").map(|p| p.val.as_ref()) {
        Some("TENTATIVE") => EventStatus::Tentative,
        Some("CANCELLED") => EventStatus::Cancelled,
        _ => EventStatus::Confirmed,
    };
    event.transparency = match vevent.find_prop("TRANSP").map(|p| p.val.as_ref()) {
        Some("TRANSPARENT") => Transparency::Transparent,
        _ => Transparency::Opaque,
    };
    event.importance = vevent
        .find_prop("PRIORITY")
        .and_then(|p| p.val.as_ref().trim().parse::<u8>().ok())
        .map(importance_from_priority)
        .unwrap_or_default();
    event.organizer = vevent.find_prop("ORGANIZER").map(parse_attendee);
    event.attendees = vevent
        .properties
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .map(parse_attendee)
        .collect();
    event.recurrence_rule = vevent.find_prop("RRULE").map(|p| p.val.to_string());
    event.timezone = timezone;
    event.html_link = vevent.find_prop("URL").map(|p| p.val.to_string());

    let is_instance = vevent.find_prop("RECURRENCE-ID").is_some();
    event.sync = SyncMetadata {
        recurring_master_id: is_instance.then_some(uid),
        is_recurring_instance: is_instance,
        ..SyncMetadata::default()
    };

    debug!(uid = %event.uid, start = ?event.start, "parsed VEVENT");
    Some(event)
}

/// Converts a parsed time, returning the TZID it was written in.
///
/// Floating times are read as UTC. Unknown TZIDs are read as UTC with a
/// warning.
fn to_event_time(value: DatePerhapsTime) -> (EventTime, Option<String>) {
    match value {
        DatePerhapsTime::Date(date) => (EventTime::AllDay(date), None),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => (EventTime::from_utc(dt), None),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            (EventTime::from_utc(naive.and_utc()), None)
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            (zoned(date_time, &tzid), Some(tzid))
        }
    }
}

fn zoned(naive: NaiveDateTime, tzid: &str) -> EventTime {
    match tzid.parse::<Tz>() {
        Ok(tz) => match tz.from_local_datetime(&naive).earliest() {
            Some(dt) => EventTime::from_local(dt),
            // skipped by a DST jump
            None => EventTime::from_utc(Utc.from_utc_datetime(&naive)),
        },
        Err(_) => {
            warn!(tzid, "unknown TZID, reading time as UTC");
            EventTime::from_utc(naive.and_utc())
        }
    }
}

fn end_from_duration(vevent: &ParsedComponent<'_>, start: &EventTime) -> EventTime {
    let duration = vevent
        .find_prop("DURATION")
        .and_then(|p| parse_duration(p.val.as_ref()));
    match (start, duration) {
        (EventTime::DateTime(dt), Some(d)) => EventTime::from_utc(*dt + d),
        (EventTime::AllDay(date), Some(d)) if d.num_days() > 0 => {
            EventTime::AllDay(*date + Duration::days(d.num_days() - 1))
        }
        _ => start.clone(),
    }
}

/// Parses an RFC 5545 duration such as `PT1H30M`, `P1D` or `-P1W`.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (negative, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let rest = rest.strip_prefix('P')?;

    let mut total = Duration::zero();
    let mut number = String::new();
    let mut in_time = false;
    for c in rest.chars() {
        match c {
            '0'..='9' => number.push(c),
            'T' => in_time = true,
            unit => {
                let n: i64 = number.parse().ok()?;
                number.clear();
                total += match (unit, in_time) {
                    ('W', false) => Duration::weeks(n),
                    ('D', false) => Duration::days(n),
                    ('H', true) => Duration::hours(n),
                    ('M', true) => Duration::minutes(n),
                    ('S', true) => Duration::seconds(n),
                    _ => return None,
                };
            }
        }
    }
    if !number.is_empty() {
        return None;
    }
    Some(if negative { -total } else { total })
}

fn importance_from_priority(priority: u8) -> Importance {
    match priority {
        1..=4 => Importance::High,
        6..=9 => Importance::Low,
        _ => Importance::Normal,
    }
}

fn priority_from_importance(importance: Importance) -> Option<&'static str> {
    match importance {
        Importance::High => Some("1"),
        Importance::Normal => None,
        Importance::Low => Some("9"),
    }
}

fn parse_attendee(prop: &ParsedProperty<'_>) -> Attendee {
    let value = prop.val.as_ref();
    let email = value
        .strip_prefix("mailto:")
        .or_else(|| value.strip_prefix("MAILTO:"))
        .unwrap_or(value)
        .to_string();

    let param = |key: &str| {
        prop.params
            .iter()
            .find(|p| p.key == key)
            .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
    };

    let response = match param("PARTSTAT").as_deref() {
        Some("ACCEPTED") => ResponseStatus::Accepted,
        Some("DECLINED") => ResponseStatus::Declined,
        Some("TENTATIVE") => ResponseStatus::Tentative,
        _ => ResponseStatus::NeedsAction,
    };

    let mut attendee = Attendee::new(email).with_response(response);
    attendee.name = param("CN");
    attendee
}

fn partstat(response: ResponseStatus) -> &'static str {
    match response {
        ResponseStatus::Accepted => "ACCEPTED",
        ResponseStatus::Declined => "DECLINED",
        ResponseStatus::Tentative => "TENTATIVE",
        ResponseStatus::NeedsAction => "NEEDS-ACTION",
    }
}

fn text_value(prop: &ParsedProperty<'_>) -> String {
    unescape_text(prop.val.as_ref())
}

/// Reverses RFC 5545 TEXT escaping.
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn add_time(vevent: &mut icalendar::Event, name: &str, time: &EventTime) {
    match time {
        EventTime::AllDay(date) => {
            let mut prop = Property::new(name, date.format("%Y%m%d").to_string());
            prop.append_parameter(ValueType::Date);
            vevent.append_property(prop);
        }
        EventTime::DateTime(dt) => {
            vevent.add_property(name, dt.format("%Y%m%dT%H%M%SZ").to_string());
        }
    }
}

fn add_person(vevent: &mut icalendar::Event, name: &str, person: &Attendee, with_partstat: bool) {
    let mut prop = Property::new(name, format!("mailto:{}", person.email));
    if let Some(ref cn) = person.name {
        prop.add_parameter("CN", cn);
    }
    if with_partstat {
        prop.add_parameter("PARTSTAT", partstat(person.response));
    }
    vevent.append_multi_property(prop);
}

/// Renders `event` as a VCALENDAR holding one VEVENT.
///
/// Times are written in UTC; an all-day end is written exclusive.
pub fn to_ics(event: &CanonicalEvent) -> String {
    let mut vevent = icalendar::Event::new();
    vevent.uid(&event.uid);
    vevent.add_property("DTSTAMP", Utc::now().format("%Y%m%dT%H%M%SZ").to_string());
    vevent.summary(&event.summary);
    add_time(&mut vevent, "DTSTART", &event.start);
    add_time(&mut vevent, "DTEND", &event.end.to_exclusive_end());

    if let Some(ref description) = event.description {
        vevent.description(description);
    }
    if let Some(ref location) = event.location {
        vevent.location(location);
    }
    match event.status {
        EventStatus::Confirmed => {}
        EventStatus::Tentative => {
            vevent.add_property("STATUS", "TENTATIVE");
        }
        EventStatus::Cancelled => {
            vevent.add_property("STATUS", "CANCELLED");
        }
    }
    if event.transparency == Transparency::Transparent {
        vevent.add_property("TRANSP", "TRANSPARENT");
    }
    if let Some(priority) = priority_from_importance(event.importance) {
        vevent.add_property("PRIORITY", priority);
    }
    if let Some(ref rule) = event.recurrence_rule {
        vevent.add_property("RRULE", rule);
    }
    if let Some(ref link) = event.html_link {
        vevent.add_property("URL", link);
    }
    if let Some(ref organizer) = event.organizer {
        let mut prop = Property::new("ORGANIZER", format!("mailto:{}", organizer.email));
        if let Some(ref cn) = organizer.name {
            prop.add_parameter("CN", cn);
        }
        vevent.append_property(prop);
    }
    for attendee in &event.attendees {
        add_person(&mut vevent, "ATTENDEE", attendee, true);
    }

    let mut calendar = icalendar::Calendar::new();
    calendar.push(vevent.done());
    calendar.done().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn timed_event_with_people() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Test//Test//EN\r\n\
BEGIN:VEVENT\r\n\
UID:team-1@example.com\r\n\
DTSTART:20250205T100000Z\r\n\
DTEND:20250205T110000Z\r\n\
SUMMARY:Team Meeting\r\n\
DESCRIPTION:Line one\\nLine two\r\n\
LOCATION:Room A\r\n\
STATUS:TENTATIVE\r\n\
TRANSP:TRANSPARENT\r\n\
PRIORITY:2\r\n\
ORGANIZER;CN=Alex:mailto:alex@example.com\r\n\
ATTENDEE;CN=Sam;PARTSTAT=DECLINED:mailto:sam@example.com\r\n\
ATTENDEE;PARTSTAT=ACCEPTED:mailto:kim@example.com\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let events = parse_calendar_data(ics);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.uid, "team-1@example.com");
        assert_eq!(event.summary, "Team Meeting");
        assert_eq!(event.description.as_deref(), Some("Line one\nLine two"));
        assert_eq!(event.status, EventStatus::Tentative);
        assert_eq!(event.transparency, Transparency::Transparent);
        assert_eq!(event.importance, Importance::High);
        let organizer = event.organizer.as_ref().unwrap();
        assert_eq!(organizer.email, "alex@example.com");
        assert_eq!(organizer.name.as_deref(), Some("Alex"));
        assert_eq!(event.attendees.len(), 2);
        assert_eq!(event.attendees[0].response, ResponseStatus::Declined);
        assert_eq!(event.attendees[1].response, ResponseStatus::Accepted);
    }

    #[test]
    fn all_day_end_is_inclusive() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:holiday\r\n\
DTSTART;VALUE=DATE:20250210\r\n\
DTEND;VALUE=DATE:20250211\r\n\
SUMMARY:Company Holiday\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let event = &parse_calendar_data(ics)[0];
        assert_eq!(event.start, EventTime::AllDay(date(2025, 2, 10)));
        assert_eq!(event.end, EventTime::AllDay(date(2025, 2, 10)));
    }

    #[test]
    fn tzid_is_resolved() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:zoned\r\n\
DTSTART;TZID=Europe/Paris:20250205T100000\r\n\
DURATION:PT1H30M\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let event = &parse_calendar_data(ics)[0];
        let start = Utc.with_ymd_and_hms(2025, 2, 5, 9, 0, 0).unwrap();
        assert_eq!(event.start, EventTime::from_utc(start));
        assert_eq!(event.end, EventTime::from_utc(start + Duration::minutes(90)));
        assert_eq!(event.timezone.as_deref(), Some("Europe/Paris"));
    }

    #[test]
    fn expanded_instance_links_to_master() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:weekly\r\n\
RECURRENCE-ID:20250212T100000Z\r\n\
DTSTART:20250212T100000Z\r\n\
DTEND:20250212T103000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let event = &parse_calendar_data(ics)[0];
        assert!(event.sync.is_recurring_instance);
        assert_eq!(event.sync.recurring_master_id.as_deref(), Some("weekly"));
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_calendar_data("not a calendar").is_empty());
    }

    #[test]
    fn generated_all_day_body_round_trips() {
        let day = date(2025, 2, 28);
        let event = CanonicalEvent::new("offsite-1", EventTime::AllDay(day), EventTime::AllDay(day))
            .with_summary("Offsite")
            .with_status(EventStatus::Tentative);

        let ics = to_ics(&event);
        assert!(ics.contains("DTSTART;VALUE=DATE:20250228"));
        assert!(ics.contains("DTEND;VALUE=DATE:20250301"));

        let parsed = &parse_calendar_data(&ics)[0];
        assert_eq!(parsed.uid, "offsite-1");
        assert_eq!(parsed.end, EventTime::AllDay(day));
        assert_eq!(parsed.status, EventStatus::Tentative);
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("PT1H30M"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("P1D"), Some(Duration::days(1)));
        assert_eq!(parse_duration("-P1W"), Some(-Duration::weeks(1)));
        assert_eq!(parse_duration("P1DT2H"), Some(Duration::hours(26)));
        assert!(parse_duration("1H").is_none());
        assert!(parse_duration("PT5").is_none());
    }

    #[test]
    fn priority_mapping() {
        assert_eq!(importance_from_priority(1), Importance::High);
        assert_eq!(importance_from_priority(5), Importance::Normal);
        assert_eq!(importance_from_priority(9), Importance::Low);
        assert_eq!(importance_from_priority(0), Importance::Normal);
    }
}
