//! Core types: canonical events, time, calendar sources, tracing

pub mod event;
pub mod source;
pub mod time;
pub mod tracing;

pub use event::{
    Attendee, CanonicalEvent, EventChanges, EventStatus, Importance, ResponseStatus, SyncMetadata,
    Transparency,
};
pub use source::{
    CalDavCredentials, CalendarSource, OAuthTokenData, ProviderKind, SourceError,
    TOKEN_EXPIRY_SKEW_SECS,
};
pub use time::{EventTime, TimeWindow};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
