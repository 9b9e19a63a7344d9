//! Translation between Graph `patternedRecurrence` and RRULE text.
//!
//! Covers DAILY/WEEKLY/MONTHLY/YEARLY with INTERVAL, BYDAY (optionally with
//! an ordinal), BYMONTHDAY, BYMONTH, COUNT and UNTIL. Anything else is not
//! representable on one side or the other and maps to `None`.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PatternedRecurrence {
    pub pattern: RecurrencePattern,
    pub range: RecurrenceRange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RecurrencePattern {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "one")]
    pub interval: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub month: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub day_of_month: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RecurrenceRange {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub number_of_occurrences: u32,
}

fn one() -> u32 {
    1
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

const DAYS: [(&str, &str); 7] = [
    ("MO", "monday"),
    ("TU", "tuesday"),
    ("WE", "wednesday"),
    ("TH", "thursday"),
    ("FR", "friday"),
    ("SA", "saturday"),
    ("SU", "sunday"),
];

const INDEXES: [(i32, &str); 5] = [
    (1, "first"),
    (2, "second"),
    (3, "third"),
    (4, "fourth"),
    (-1, "last"),
];

fn day_to_rrule(day: &str) -> Option<&'static str> {
    DAYS.iter()
        .find(|(_, graph)| graph.eq_ignore_ascii_case(day))
        .map(|(code, _)| *code)
}

fn day_to_graph(code: &str) -> Option<&'static str> {
    DAYS.iter().find(|(c, _)| *c == code).map(|(_, graph)| *graph)
}

fn weekday_to_graph(day: Weekday) -> &'static str {
    DAYS[day.num_days_from_monday() as usize].1
}

fn index_to_ordinal(index: Option<&str>) -> i32 {
    INDEXES
        .iter()
        .find(|(_, name)| Some(*name) == index)
        .map(|(n, _)| *n)
        .unwrap_or(1)
}

fn ordinal_to_index(ordinal: i32) -> Option<&'static str> {
    INDEXES.iter().find(|(n, _)| *n == ordinal).map(|(_, name)| *name)
}

/// Renders a Graph recurrence as an RRULE body (no `RRULE:` prefix).
pub(crate) fn to_rrule(recurrence: &PatternedRecurrence) -> Option<String> {
    let pattern = &recurrence.pattern;
    let days = || -> Vec<&'static str> {
        pattern
            .days_of_week
            .iter()
            .filter_map(|d| day_to_rrule(d))
            .collect()
    };

    let mut parts: Vec<String> = Vec::new();
    match pattern.kind.as_str() {
        "daily" => parts.push("FREQ=DAILY".to_string()),
        "weekly" => {
            parts.push("FREQ=WEEKLY".to_string());
            let days = days();
            if !days.is_empty() {
                parts.push(format!("BYDAY={}", days.join(",")));
            }
        }
        "absoluteMonthly" => {
            parts.push("FREQ=MONTHLY".to_string());
            parts.push(format!("BYMONTHDAY={}", pattern.day_of_month));
        }
        "relativeMonthly" => {
            parts.push("FREQ=MONTHLY".to_string());
            parts.push(ordinal_days(pattern.index.as_deref(), &days()));
        }
        "absoluteYearly" => {
            parts.push("FREQ=YEARLY".to_string());
            parts.push(format!("BYMONTH={}", pattern.month));
            parts.push(format!("BYMONTHDAY={}", pattern.day_of_month));
        }
        "relativeYearly" => {
            parts.push("FREQ=YEARLY".to_string());
            parts.push(format!("BYMONTH={}", pattern.month));
            parts.push(ordinal_days(pattern.index.as_deref(), &days()));
        }
        other => {
            warn!(pattern = other, "unsupported recurrence pattern");
            return None;
        }
    }

    if pattern.interval > 1 {
        parts.push(format!("INTERVAL={}", pattern.interval));
    }

    match recurrence.range.kind.as_str() {
        "numbered" if recurrence.range.number_of_occurrences > 0 => {
            parts.push(format!("COUNT={}", recurrence.range.number_of_occurrences));
        }
        "endDate" => {
            if let Some(end) = recurrence
                .range
                .end_date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            {
                parts.push(format!("UNTIL={}", end.format("%Y%m%d")));
            }
        }
        _ => {}
    }

    Some(parts.join(";"))
}

fn ordinal_days(index: Option<&str>, days: &[&str]) -> String {
    let ordinal = index_to_ordinal(index);
    let days: Vec<String> = days.iter().map(|d| format!("{}{}", ordinal, d)).collect();
    format!("BYDAY={}", days.join(","))
}

/// A BYDAY entry such as `MO` or `-1FR`.
fn parse_byday(value: &str) -> Option<(Option<i32>, &'static str)> {
    let split = value.len().checked_sub(2)?;
    let (ordinal, code) = value.split_at(split);
    let day = day_to_graph(&code.to_ascii_uppercase())?;
    let ordinal = if ordinal.is_empty() {
        None
    } else {
        Some(ordinal.trim_start_matches('+').parse().ok()?)
    };
    Some((ordinal, day))
}

fn parse_until(value: &str) -> Option<NaiveDate> {
    let date = value.get(..8)?;
    NaiveDate::parse_from_str(date, "%Y%m%d").ok()
}

/// Builds a Graph recurrence from an RRULE body for an event starting on
/// `start`.
pub(crate) fn from_rrule(rule: &str, start: NaiveDate) -> Option<PatternedRecurrence> {
    let rule = rule.trim().trim_start_matches("RRULE:");
    let mut freq = None;
    let mut interval = 1;
    let mut by_day: Vec<(Option<i32>, &'static str)> = Vec::new();
    let mut by_month_day = None;
    let mut by_month = None;
    let mut count = None;
    let mut until = None;

    for part in rule.split(';').filter(|p| !p.is_empty()) {
        let (key, value) = part.split_once('=')?;
        match key.to_ascii_uppercase().as_str() {
            "FREQ" => freq = Some(value.to_ascii_uppercase()),
            "INTERVAL" => interval = value.parse().ok()?,
            "BYDAY" => {
                by_day = value.split(',').map(parse_byday).collect::<Option<Vec<_>>>()?;
            }
            "BYMONTHDAY" => by_month_day = Some(value.parse::<u32>().ok()?),
            "BYMONTH" => by_month = Some(value.parse::<u32>().ok()?),
            "COUNT" => count = Some(value.parse::<u32>().ok()?),
            "UNTIL" => until = Some(parse_until(value)?),
            "WKST" => {}
            other => {
                warn!(part = other, "unsupported RRULE part");
                return None;
            }
        }
    }

    let days: Vec<String> = by_day.iter().map(|(_, d)| d.to_string()).collect();
    let ordinal = by_day.iter().find_map(|(n, _)| *n);

    let mut pattern = RecurrencePattern {
        interval,
        ..RecurrencePattern::default()
    };
    match freq.as_deref()? {
        "DAILY" => pattern.kind = "daily".to_string(),
        "WEEKLY" => {
            pattern.kind = "weekly".to_string();
            pattern.days_of_week = if days.is_empty() {
                vec![weekday_to_graph(start.weekday()).to_string()]
            } else {
                days
            };
        }
        "MONTHLY" => match ordinal {
            Some(n) => {
                pattern.kind = "relativeMonthly".to_string();
                pattern.index = Some(ordinal_to_index(n)?.to_string());
                pattern.days_of_week = days;
            }
            None => {
                pattern.kind = "absoluteMonthly".to_string();
                pattern.day_of_month = by_month_day.unwrap_or(start.day());
            }
        },
        "YEARLY" => {
            pattern.month = by_month.unwrap_or(start.month());
            match ordinal {
                Some(n) => {
                    pattern.kind = "relativeYearly".to_string();
                    pattern.index = Some(ordinal_to_index(n)?.to_string());
                    pattern.days_of_week = days;
                }
                None => {
                    pattern.kind = "absoluteYearly".to_string();
                    pattern.day_of_month = by_month_day.unwrap_or(start.day());
                }
            }
        }
        other => {
            warn!(freq = other, "unsupported RRULE frequency");
            return None;
        }
    }

    let start_date = Some(start.format("%Y-%m-%d").to_string());
    let range = match (count, until) {
        (Some(n), _) => RecurrenceRange {
            kind: "numbered".to_string(),
            start_date,
            number_of_occurrences: n,
            ..RecurrenceRange::default()
        },
        (None, Some(end)) => RecurrenceRange {
            kind: "endDate".to_string(),
            start_date,
            end_date: Some(end.format("%Y-%m-%d").to_string()),
            ..RecurrenceRange::default()
        },
        (None, None) => RecurrenceRange {
            kind: "noEnd".to_string(),
            start_date,
            ..RecurrenceRange::default()
        },
    };

    Some(PatternedRecurrence { pattern, range })
}
