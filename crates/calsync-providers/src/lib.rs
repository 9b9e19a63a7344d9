//! CalendarProvider trait, OAuth engine and provider implementations.
//!
//! This crate connects calendar accounts to one canonical event model:
//!
//! - [`CalendarProvider`] - The capability contract every backend implements
//! - [`auth::AuthEngine`] - OAuth 2.0 + PKCE with a loopback listener
//! - [`google`], [`outlook`] - Token-based REST providers
//! - [`caldav`] - CalDAV provider with ICS conversion
//! - [`SourceManager`] - One cached provider per calendar source
//! - [`ProviderError`] - Error taxonomy shared by all providers
//!
//! # Architecture
//!
//! ```text
//!  Google API        Microsoft Graph      CalDAV server
//!      │                   │                   │
//!      │   BearerSession + AuthEngine          │ Basic auth
//!      ▼                   ▼                   ▼
//!  GoogleProvider     OutlookProvider     CalDavProvider
//!      └──────────── CalendarProvider ─────────┘
//!                          │
//!                          ▼
//!                   CanonicalEvent
//! ```
//!
//! # Example
//!
//! ```ignore
//! use calsync_providers::{FetchOptions, SourceManager};
//!
//! let manager = SourceManager::new().with_auth_engine(engine);
//! let provider = manager.provider_for(&source);
//! let events = provider.get_events(FetchOptions::new()).await?;
//! ```

#[cfg(feature = "oauth")]
pub mod auth;
#[cfg(feature = "caldav")]
pub mod caldav;
pub mod error;
#[cfg(feature = "google")]
pub mod google;
#[cfg(feature = "caldav")]
pub mod ics;
pub mod manager;
#[cfg(feature = "outlook")]
pub mod outlook;
pub mod provider;
#[cfg(feature = "oauth")]
pub mod rest;
pub mod status;

// Re-export main types at crate root
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use manager::SourceManager;
pub use provider::{
    BoxFuture, CalendarListEntry, CalendarProvider, ErrorProvider, FetchOptions, WriteOptions,
    WriteResult, fetch_calendars,
};
#[cfg(feature = "oauth")]
pub use rest::TokenSink;
pub use status::{ConnectionState, ProviderStatus, StatusTracker};
