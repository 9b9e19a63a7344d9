//! In-flight authorization requests, keyed by `state`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::config::OAuthProvider;

/// What the engine remembers between starting a flow and its callback.
#[derive(Clone)]
pub struct PendingOAuthRequest {
    pub provider: OAuthProvider,
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
    /// The redirect URI sent in the authorization request.
    pub redirect_uri: String,
    pub tenant_id: Option<String>,
    pub source_id: Option<String>,
}

impl std::fmt::Debug for PendingOAuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOAuthRequest")
            .field("provider", &self.provider)
            .field("created_at", &self.created_at)
            .field("redirect_uri", &self.redirect_uri)
            .field("tenant_id", &self.tenant_id)
            .field("source_id", &self.source_id)
            .finish_non_exhaustive()
    }
}

/// Single-use map of pending requests with a fixed time to live.
#[derive(Debug)]
pub struct PendingRequests {
    ttl: chrono::Duration,
    entries: Mutex<HashMap<String, PendingOAuthRequest>>,
}

impl PendingRequests {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::minutes(10)),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingOAuthRequest>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, request: &PendingOAuthRequest, now: DateTime<Utc>) -> bool {
        now - request.created_at > self.ttl
    }

    /// Stores a request. A second insert under the same state replaces the first.
    pub fn insert(&self, state: String, request: PendingOAuthRequest) {
        self.lock().insert(state, request);
    }

    /// Removes and returns the request for `state`.
    ///
    /// Returns `None` for unknown, already consumed or expired states; an
    /// expired entry is removed as well.
    pub fn take_at(&self, state: &str, now: DateTime<Utc>) -> Option<PendingOAuthRequest> {
        let request = self.lock().remove(state)?;
        if self.is_expired(&request, now) {
            debug!(provider = %request.provider, "discarding expired OAuth request");
            return None;
        }
        Some(request)
    }

    pub fn take(&self, state: &str) -> Option<PendingOAuthRequest> {
        self.take_at(state, Utc::now())
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, request| now - request.created_at <= self.ttl);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
