//! XML utilities for CalDAV WebDAV operations.
//!
//! Request bodies are written with [`quick_xml::Writer`]. Responses are read
//! with a namespace-aware reader into a small element tree, so `DAV:` and
//! CalDAV elements match whatever prefix the server picked.
//!
//! Malformed responses are not rejected: parsing stops at the first syntax
//! error and whatever was read up to that point is used.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Writer};
use tracing::warn;

use crate::error::{ProviderError, ProviderResult};

/// DAV namespace
pub const DAV_NS: &str = "DAV:";
/// CalDAV namespace
pub const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";
/// Apple iCal namespace (calendar-color)
pub const APPLE_NS: &str = "http://apple.com/ns/ical/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ns {
    Dav,
    CalDav,
    Apple,
    Other,
}

impl Ns {
    fn resolve(result: &ResolveResult<'_>) -> Self {
        match result {
            ResolveResult::Bound(Namespace(ns)) => match *ns {
                b"DAV:" => Self::Dav,
                b"urn:ietf:params:xml:ns:caldav" => Self::CalDav,
                b"http://apple.com/ns/ical/" => Self::Apple,
                _ => Self::Other,
            },
            _ => Self::Other,
        }
    }
}

/// A parsed XML element with its text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub ns: Ns,
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn new(ns: Ns, name: impl Into<String>) -> Self {
        Self {
            ns,
            name: name.into(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    fn is(&self, ns: Ns, name: &str) -> bool {
        self.ns == ns && self.name == name
    }

    pub fn child(&self, ns: Ns, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(ns, name))
    }

    pub fn children<'a>(&'a self, ns: Ns, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.is(ns, name))
    }

    /// Trimmed text, `None` when empty.
    pub fn text(&self) -> Option<String> {
        let text = self.text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Parses `xml` into a tree rooted at a synthetic document element.
///
/// Elements left open by a syntax error or truncation are closed so the
/// partial tree stays usable.
pub fn parse_tree(xml: &str) -> Element {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack = vec![Element::new(Ns::Other, "#document")];

    loop {
        let (ns, event) = match reader.read_resolved_event() {
            Ok((ns, event)) => (Ns::resolve(&ns), event),
            Err(e) => {
                warn!(error = %e, "malformed XML, keeping partial result");
                break;
            }
        };
        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                stack.push(Element::new(ns, name));
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                attach(&mut stack, Element::new(ns, name));
            }
            Event::End(_) => close(&mut stack),
            Event::Text(e) => match e.unescape() {
                Ok(text) => push_text(&mut stack, &text),
                Err(e) => {
                    warn!(position = reader.buffer_position(), error = %e, "malformed XML, keeping partial result");
                    break;
                }
            },
            Event::CData(e) => push_text(&mut stack, &String::from_utf8_lossy(&e)),
            Event::Eof => break,
            _ => {}
        }
    }

    while stack.len() > 1 {
        close(&mut stack);
    }
    stack
        .pop()
        .unwrap_or_else(|| Element::new(Ns::Other, "#document"))
}

fn attach(stack: &mut [Element], element: Element) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    }
}

fn close(stack: &mut Vec<Element>) {
    if stack.len() > 1
        && let Some(element) = stack.pop()
    {
        attach(stack, element);
    }
}

fn push_text(stack: &mut [Element], text: &str) {
    if let Some(top) = stack.last_mut() {
        top.text.push_str(text);
    }
}

/// One `<response>` of a multistatus, with the properties of its
/// successful propstats merged.
#[derive(Debug)]
struct DavResponse<'a> {
    href: String,
    props: Vec<&'a Element>,
}

impl DavResponse<'_> {
    fn prop(&self, ns: Ns, name: &str) -> Option<&Element> {
        self.props.iter().copied().find(|p| p.is(ns, name))
    }
}

fn responses(root: &Element) -> Vec<DavResponse<'_>> {
    let Some(multistatus) = root.child(Ns::Dav, "multistatus") else {
        return Vec::new();
    };
    multistatus
        .children(Ns::Dav, "response")
        .filter_map(|response| {
            let href = response.child(Ns::Dav, "href")?.text()?;
            let props = response
                .children(Ns::Dav, "propstat")
                .filter(|propstat| is_ok_status(propstat))
                .filter_map(|propstat| propstat.child(Ns::Dav, "prop"))
                .flat_map(|prop| prop.children.iter())
                .collect();
            Some(DavResponse { href, props })
        })
        .collect()
}

fn is_ok_status(propstat: &Element) -> bool {
    match propstat.child(Ns::Dav, "status").and_then(Element::text) {
        Some(status) => status.split_whitespace().nth(1).is_some_and(|code| code.starts_with('2')),
        None => true,
    }
}

/// Returns the `<href>` inside the first successful `ns:name` property,
/// e.g. `current-user-principal` or `calendar-home-set`.
pub fn parse_href_property(xml: &str, ns: Ns, name: &str) -> Option<String> {
    let root = parse_tree(xml);
    responses(&root)
        .iter()
        .find_map(|r| r.prop(ns, name)?.child(Ns::Dav, "href")?.text())
}

/// A calendar collection found in the home set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCalendar {
    pub href: String,
    pub display_name: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub writable: bool,
}

/// Parses a depth-1 PROPFIND of the home set, keeping calendar collections.
pub fn parse_calendars(xml: &str) -> Vec<DiscoveredCalendar> {
    let root = parse_tree(xml);
    responses(&root)
        .into_iter()
        .filter(|r| {
            r.prop(Ns::Dav, "resourcetype")
                .is_some_and(|t| t.child(Ns::CalDav, "calendar").is_some())
        })
        .map(|r| DiscoveredCalendar {
            display_name: r.prop(Ns::Dav, "displayname").and_then(Element::text),
            color: r.prop(Ns::Apple, "calendar-color").and_then(Element::text),
            description: r
                .prop(Ns::CalDav, "calendar-description")
                .and_then(Element::text),
            writable: r
                .prop(Ns::Dav, "current-user-privilege-set")
                .is_none_or(grants_write),
            href: r.href,
        })
        .collect()
}

fn grants_write(privileges: &Element) -> bool {
    privileges
        .children(Ns::Dav, "privilege")
        .flat_map(|p| p.children.iter())
        .any(|p| p.ns == Ns::Dav && matches!(p.name.as_str(), "write" | "write-content" | "all"))
}

/// One calendar object resource from a REPORT response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarObject {
    pub href: String,
    /// ETag exactly as sent, quotes included.
    pub etag: Option<String>,
    pub data: String,
}

/// Parses a calendar-query or calendar-multiget response.
pub fn parse_objects(xml: &str) -> Vec<CalendarObject> {
    let root = parse_tree(xml);
    responses(&root)
        .into_iter()
        .filter_map(|r| {
            let data = r.prop(Ns::CalDav, "calendar-data")?.text()?;
            Some(CalendarObject {
                etag: r.prop(Ns::Dav, "getetag").and_then(Element::text),
                href: r.href,
                data,
            })
        })
        .collect()
}

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn build(write: impl FnOnce(&mut XmlWriter) -> std::io::Result<()>) -> ProviderResult<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write(&mut writer).map_err(|e| ProviderError::unknown(format!("failed to write XML: {}", e)))?;
    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| ProviderError::unknown(format!("failed to write XML: {}", e)))
}

fn open(name: &str) -> BytesStart<'_> {
    let mut element = BytesStart::new(name);
    element.push_attribute(("xmlns:d", DAV_NS));
    element.push_attribute(("xmlns:c", CALDAV_NS));
    element.push_attribute(("xmlns:ic", APPLE_NS));
    element
}

/// PROPFIND body requesting the given prefixed property names
/// (`d:`, `c:` and `ic:` are declared).
pub fn propfind_body(props: &[&str]) -> ProviderResult<String> {
    build(|w| {
        w.write_event(Event::Start(open("d:propfind")))?;
        w.write_event(Event::Start(BytesStart::new("d:prop")))?;
        for prop in props {
            w.write_event(Event::Empty(BytesStart::new(*prop)))?;
        }
        w.write_event(Event::End(BytesEnd::new("d:prop")))?;
        w.write_event(Event::End(BytesEnd::new("d:propfind")))?;
        Ok(())
    })
}

pub fn principal_body() -> ProviderResult<String> {
    propfind_body(&["d:current-user-principal"])
}

pub fn home_set_body() -> ProviderResult<String> {
    propfind_body(&["c:calendar-home-set"])
}

pub fn calendars_body() -> ProviderResult<String> {
    propfind_body(&[
        "d:displayname",
        "d:resourcetype",
        "d:current-user-privilege-set",
        "c:calendar-description",
        "ic:calendar-color",
    ])
}

/// calendar-query REPORT for VEVENTs overlapping `[start, end)`.
///
/// With `expand`, the server returns recurring events as instances.
pub fn calendar_query_body(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    expand: bool,
) -> ProviderResult<String> {
    let start = format_icalendar_datetime(start);
    let end = format_icalendar_datetime(end);
    build(|w| {
        w.write_event(Event::Start(open("c:calendar-query")))?;
        w.write_event(Event::Start(BytesStart::new("d:prop")))?;
        w.write_event(Event::Empty(BytesStart::new("d:getetag")))?;
        if expand {
            w.write_event(Event::Start(BytesStart::new("c:calendar-data")))?;
            let mut range = BytesStart::new("c:expand");
            range.push_attribute(("start", start.as_str()));
            range.push_attribute(("end", end.as_str()));
            w.write_event(Event::Empty(range))?;
            w.write_event(Event::End(BytesEnd::new("c:calendar-data")))?;
        } else {
            w.write_event(Event::Empty(BytesStart::new("c:calendar-data")))?;
        }
        w.write_event(Event::End(BytesEnd::new("d:prop")))?;

        w.write_event(Event::Start(BytesStart::new("c:filter")))?;
        let mut vcalendar = BytesStart::new("c:comp-filter");
        vcalendar.push_attribute(("name", "VCALENDAR"));
        w.write_event(Event::Start(vcalendar))?;
        let mut vevent = BytesStart::new("c:comp-filter");
        vevent.push_attribute(("name", "VEVENT"));
        w.write_event(Event::Start(vevent))?;
        let mut range = BytesStart::new("c:time-range");
        range.push_attribute(("start", start.as_str()));
        range.push_attribute(("end", end.as_str()));
        w.write_event(Event::Empty(range))?;
        w.write_event(Event::End(BytesEnd::new("c:comp-filter")))?;
        w.write_event(Event::End(BytesEnd::new("c:comp-filter")))?;
        w.write_event(Event::End(BytesEnd::new("c:filter")))?;

        w.write_event(Event::End(BytesEnd::new("c:calendar-query")))?;
        Ok(())
    })
}

/// calendar-multiget REPORT for specific resources.
pub fn calendar_multiget_body(hrefs: &[&str]) -> ProviderResult<String> {
    build(|w| {
        w.write_event(Event::Start(open("c:calendar-multiget")))?;
        w.write_event(Event::Start(BytesStart::new("d:prop")))?;
        w.write_event(Event::Empty(BytesStart::new("d:getetag")))?;
        w.write_event(Event::Empty(BytesStart::new("c:calendar-data")))?;
        w.write_event(Event::End(BytesEnd::new("d:prop")))?;
        for href in hrefs {
            w.write_event(Event::Start(BytesStart::new("d:href")))?;
            w.write_event(Event::Text(BytesText::new(href)))?;
            w.write_event(Event::End(BytesEnd::new("d:href")))?;
        }
        w.write_event(Event::End(BytesEnd::new("c:calendar-multiget")))?;
        Ok(())
    })
}

/// Formats a datetime for iCalendar time-range filters (UTC format).
fn format_icalendar_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}
