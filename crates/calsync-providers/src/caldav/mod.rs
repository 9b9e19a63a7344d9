//! CalDAV calendar provider implementation.
//!
//! This module provides a [`CalDavProvider`] for RFC 4791 servers
//! (Nextcloud, Fastmail, iCloud, Radicale, ...).
//!
//! # Features
//!
//! - Principal and `calendar-home-set` discovery
//! - Basic authentication with application passwords
//! - `calendar-query` REPORT with optional server-side expansion
//! - ETag-guarded writes (`If-Match`, `If-None-Match: *`)

mod client;
mod config;
mod provider;
mod xml;

pub use config::CalDavConfig;
pub use provider::CalDavProvider;
