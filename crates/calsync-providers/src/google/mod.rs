//! Google Calendar provider implementation.
//!
//! This module provides a [`GoogleProvider`] that reads and writes events
//! through Google Calendar API v3.
//!
//! # Features
//!
//! - Bearer tokens from the shared [`AuthEngine`](crate::auth::AuthEngine),
//!   refreshed ahead of expiry and once more after a 401
//! - `nextPageToken` pagination
//! - Server-side recurring event expansion (`singleEvents`)
//! - Partial updates (PATCH) guarded by the event ETag

mod api;
mod config;
mod provider;

pub use config::{GoogleClientCredentials, GoogleConfig};
pub use provider::GoogleProvider;
