//! Outlook calendar provider on Microsoft Graph.
//!
//! [`OutlookProvider`] reads through `calendarView` so recurring series
//! come back as instances, and writes with PATCH guarded by the event's
//! change key. A forced update retries once without `If-Match`.

mod api;
mod config;
mod provider;
mod recurrence;

pub use config::OutlookConfig;
pub use provider::OutlookProvider;
