//! Event commands.

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use calsync_core::{CanonicalEvent, EventChanges, EventTime, TimeWindow};
use calsync_providers::{CalendarProvider, FetchOptions, WriteOptions, WriteResult};

use super::Context;
use crate::error::{CliError, CliResult};

/// Arguments of `events list`.
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub source: Option<String>,
    pub calendars: Vec<String>,
    pub days: Option<i64>,
    pub limit: Option<usize>,
    pub expand: bool,
    pub json: bool,
}

/// An event tagged with the source it came from, as printed by `--json`.
#[derive(Debug, Serialize)]
struct SourcedEvent<'a> {
    source: &'a str,
    #[serde(flatten)]
    event: &'a CanonicalEvent,
}

/// List events from one source, or from every enabled source.
///
/// With a single source a fetch error is returned; across all sources a
/// failing source is reported and skipped.
pub async fn list(ctx: &Context, args: ListArgs) -> CliResult<()> {
    let window = match args.days {
        Some(days) => TimeWindow::around(
            Utc::now(),
            Duration::days(ctx.config.sync.lookbehind_days),
            Duration::days(days),
        ),
        None => ctx.config.sync.window(),
    };

    let mut options = FetchOptions::new()
        .with_time_window(window)
        .with_expand_recurring(args.expand);
    if let Some(limit) = args.limit {
        options = options.with_max_results(limit);
    }
    if !args.calendars.is_empty() {
        options = options.with_calendar_ids(args.calendars.clone());
    }

    let source_ids: Vec<String> = match args.source {
        Some(ref id) => vec![id.clone()],
        None => ctx
            .config
            .enabled_sources()?
            .into_iter()
            .map(|s| s.id)
            .collect(),
    };

    let mut events: Vec<(String, CanonicalEvent)> = Vec::new();
    for id in &source_ids {
        let (_, provider) = ctx.provider(id)?;
        match provider.get_events(options.clone()).await {
            Ok(fetched) => {
                debug!(source = %id, count = fetched.len(), "fetched events");
                events.extend(fetched.into_iter().map(|e| (id.clone(), e)));
            }
            Err(e) if args.source.is_some() => return Err(e.into()),
            Err(e) => {
                warn!(source = %id, error = %e, "skipping source");
                eprintln!("{}: {}", id, e.user_message());
            }
        }
    }

    events.sort_by(|(_, a), (_, b)| {
        a.start
            .to_utc_datetime()
            .cmp(&b.start.to_utc_datetime())
            .then_with(|| a.summary.cmp(&b.summary))
    });

    if args.json {
        let view: Vec<SourcedEvent<'_>> = events
            .iter()
            .map(|(source, event)| SourcedEvent { source, event })
            .collect();
        let text = serde_json::to_string_pretty(&view)
            .map_err(|e| CliError::Config(format!("failed to serialize events: {}", e)))?;
        println!("{}", text);
        return Ok(());
    }

    if events.is_empty() {
        println!("No events.");
        return Ok(());
    }
    let show_source = source_ids.len() > 1;
    for (source, event) in &events {
        println!("{}", format_event(event, show_source.then_some(source.as_str())));
    }
    Ok(())
}

/// One line per event: date, time span, title and optional source.
fn format_event(event: &CanonicalEvent, source: Option<&str>) -> String {
    let when = match (&event.start, &event.end) {
        (EventTime::AllDay(start), EventTime::AllDay(end)) if start == end => {
            format!("{}  all day    ", start.format("%a %d %b"))
        }
        (EventTime::AllDay(start), EventTime::AllDay(end)) => {
            format!("{}  until {}", start.format("%a %d %b"), end.format("%d %b"))
        }
        (start, end) => {
            let start = start.to_utc_datetime().with_timezone(&Local);
            let end = end.to_utc_datetime().with_timezone(&Local);
            format!(
                "{}  {}-{}",
                start.format("%a %d %b"),
                start.format("%H:%M"),
                end.format("%H:%M")
            )
        }
    };

    let mut line = format!("{}  {}", when, event.summary);
    if let Some(ref location) = event.location {
        line.push_str(&format!(" @ {}", location));
    }
    if let Some(source) = source {
        line.push_str(&format!(" [{}]", source));
    }
    line
}

/// Parses an RFC 3339 timestamp or a `YYYY-MM-DD` date.
pub fn parse_time(value: &str) -> CliResult<EventTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(EventTime::from_utc(dt.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(EventTime::from_date)
        .map_err(|_| {
            CliError::Config(format!(
                "`{}` is neither an RFC 3339 time nor a YYYY-MM-DD date",
                value
            ))
        })
}

/// Parses a start/end pair; both must be dates or both times, and in order.
pub fn parse_span(start: &str, end: &str) -> CliResult<(EventTime, EventTime)> {
    let start = parse_time(start)?;
    let end = parse_time(end)?;
    if start.is_all_day() != end.is_all_day() {
        return Err(CliError::Config(
            "start and end must both be dates or both be times".to_string(),
        ));
    }
    let ordered = match (&start, &end) {
        (EventTime::AllDay(s), EventTime::AllDay(e)) => s <= e,
        _ => start.to_utc_datetime() < end.to_utc_datetime(),
    };
    if !ordered {
        return Err(CliError::Config("the end must come after the start".to_string()));
    }
    Ok((start, end))
}

/// Arguments of `events create`.
#[derive(Debug, Clone)]
pub struct CreateArgs {
    pub source: String,
    pub calendar: String,
    pub summary: String,
    pub start: String,
    pub end: String,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// Create an event and print its provider id.
pub async fn create(ctx: &Context, args: CreateArgs) -> CliResult<()> {
    let (start, end) = parse_span(&args.start, &args.end)?;
    let (_, provider) = ctx.provider(&args.source)?;
    ensure_writable(provider.as_ref())?;

    let mut event = CanonicalEvent::new("", start, end).with_summary(args.summary);
    if let Some(location) = args.location {
        event = event.with_location(location);
    }
    if let Some(description) = args.description {
        event = event.with_description(description);
    }

    let result = provider.create_event(args.calendar, event).await;
    let stored = written(result)?;
    match stored.and_then(|e| e.sync.provider_event_id) {
        Some(id) => println!("Created event {}.", id),
        None => println!("Created event."),
    }
    Ok(())
}

/// Arguments of `events update`.
#[derive(Debug, Clone)]
pub struct UpdateArgs {
    pub source: String,
    pub event: String,
    pub summary: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub force: bool,
}

/// Change an event found by uid or provider id.
pub async fn update(ctx: &Context, args: UpdateArgs) -> CliResult<()> {
    let mut changes = EventChanges::new();
    if let Some(summary) = args.summary {
        changes = changes.with_summary(summary);
    }
    if let Some(location) = args.location {
        changes = changes.with_location(location);
    }
    if let Some(description) = args.description {
        changes = changes.with_description(description);
    }
    if changes.is_empty() {
        return Err(CliError::Config(
            "nothing to change, pass --summary, --location or --description".to_string(),
        ));
    }

    let (_, provider) = ctx.provider(&args.source)?;
    ensure_writable(provider.as_ref())?;
    let event = find_event(ctx, provider.as_ref(), &args.event).await?;

    let options = if args.force {
        WriteOptions::forced()
    } else {
        WriteOptions::default()
    };
    let result = provider.update_event(event, changes, options).await;
    written(result)?;
    println!("Updated event {}.", args.event);
    Ok(())
}

/// Delete an event found by uid or provider id.
pub async fn delete(ctx: &Context, source: &str, event_id: &str) -> CliResult<()> {
    let (_, provider) = ctx.provider(source)?;
    ensure_writable(provider.as_ref())?;
    let event = find_event(ctx, provider.as_ref(), event_id).await?;

    let result = provider.delete_event(event).await;
    written(result)?;
    println!("Deleted event {}.", event_id);
    Ok(())
}

fn ensure_writable(provider: &dyn CalendarProvider) -> CliResult<()> {
    if provider.supports_write() {
        Ok(())
    } else {
        Err(CliError::Write(format!(
            "{} does not support writing events",
            provider.name()
        )))
    }
}

/// Looks the event up in the configured window.
///
/// A provider id match wins over a uid match, since recurring instances
/// share their series uid.
async fn find_event(
    ctx: &Context,
    provider: &dyn CalendarProvider,
    id: &str,
) -> CliResult<CanonicalEvent> {
    let options = FetchOptions::new().with_time_window(ctx.config.sync.window());
    let events = provider.get_events(options).await?;
    pick_event(events, id)
        .ok_or_else(|| CliError::Write(format!("no event `{}` in the sync window", id)))
}

fn pick_event(events: Vec<CanonicalEvent>, id: &str) -> Option<CanonicalEvent> {
    let mut by_uid = None;
    for event in events {
        if event.sync.provider_event_id.as_deref() == Some(id) {
            return Some(event);
        }
        if by_uid.is_none() && event.uid == id {
            by_uid = Some(event);
        }
    }
    by_uid
}

/// Turns a write outcome into the stored event or an error.
fn written(result: WriteResult) -> CliResult<Option<CanonicalEvent>> {
    if result.success {
        return Ok(result.event);
    }
    if result.conflict {
        return Err(CliError::Write(
            "the event changed on the server since it was read; list it again and retry"
                .to_string(),
        ));
    }
    Err(CliError::Write(
        result.error.unwrap_or_else(|| "unknown error".to_string()),
    ))
}
