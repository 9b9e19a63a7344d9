//! Loopback HTTP listener receiving the OAuth redirect.
//!
//! Binds `127.0.0.1` on the first free port of a configured range and
//! serves a single route. A hit carrying `state` or `error` is forwarded
//! over a channel, answered with a static page, and schedules the listener
//! to stop after a short grace period so the browser receives the page
//! first. Other hits are answered and otherwise ignored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>calsync</title></head>\
<body><h1>Authorization complete</h1><p>You can close this window and return to the application.</p></body></html>";

const FAILURE_PAGE: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>calsync</title></head>\
<body><h1>Authorization failed</h1><p>You can close this window and try again from the application.</p></body></html>";

const WAITING_PAGE: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>calsync</title></head>\
<body><p>Waiting for the authorization redirect.</p></body></html>";

/// Query parameters of an authorization redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Picks the known parameters out of a decoded query map.
    pub fn from_query(mut query: HashMap<String, String>) -> Self {
        Self {
            code: query.remove("code"),
            state: query.remove("state"),
            error: query.remove("error"),
            error_description: query.remove("error_description"),
        }
    }

    /// Parses a full callback URL, such as a custom-scheme redirect.
    pub fn from_url(url: &url::Url) -> Self {
        Self::from_query(url.query_pairs().into_owned().collect())
    }

    fn is_success(&self) -> bool {
        self.error.is_none() && self.code.is_some()
    }

    /// Whether this looks like an authorization server redirect.
    fn is_redirect(&self) -> bool {
        self.state.is_some() || self.error.is_some()
    }
}

#[derive(Clone)]
struct LoopbackState {
    tx: mpsc::UnboundedSender<CallbackParams>,
    shutdown: Arc<Notify>,
    grace: Duration,
}

/// A running loopback listener.
#[derive(Debug)]
pub struct LoopbackServer {
    port: u16,
    redirect_uri: String,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl LoopbackServer {
    /// Binds the first free port in `port_range` and starts serving `path`.
    pub async fn start(
        port_range: (u16, u16),
        path: &str,
        grace: Duration,
        tx: mpsc::UnboundedSender<CallbackParams>,
    ) -> ProviderResult<Self> {
        let (listener, port) = bind_loopback(port_range).await?;
        let shutdown = Arc::new(Notify::new());
        let state = LoopbackState {
            tx,
            shutdown: Arc::clone(&shutdown),
            grace,
        };

        let app = Router::new()
            .route(path, get(handle_redirect))
            .with_state(state);

        let signal = Arc::clone(&shutdown);
        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.notified().await });
            if let Err(e) = server.await {
                warn!(error = %e, "loopback listener failed");
            }
            debug!(port, "loopback listener stopped");
        });

        Ok(Self {
            port,
            redirect_uri: format!("http://127.0.0.1:{}{}", port, path),
            shutdown,
            handle,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The redirect URI to put in the authorization request.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the listener immediately.
    pub fn stop(self) {
        self.shutdown.notify_one();
        self.handle.abort();
    }
}

async fn bind_loopback(port_range: (u16, u16)) -> ProviderResult<(TcpListener, u16)> {
    for port in port_range.0..=port_range.1 {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                debug!(port, "bound loopback listener");
                return Ok((listener, port));
            }
            Err(e) => debug!(port, error = %e, "loopback port unavailable"),
        }
    }
    Err(ProviderError::network(format!(
        "no available loopback port in range {}-{}",
        port_range.0, port_range.1
    )))
}

async fn handle_redirect(
    State(state): State<LoopbackState>,
    Query(query): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let params = CallbackParams::from_query(query);
    if !params.is_redirect() {
        debug!("ignoring callback hit without state or error");
        return Html(WAITING_PAGE);
    }

    let page = if params.is_success() {
        SUCCESS_PAGE
    } else {
        FAILURE_PAGE
    };

    if state.tx.send(params).is_err() {
        warn!("OAuth callback received after the flow was abandoned");
    }

    let shutdown = state.shutdown;
    let grace = state.grace;
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        shutdown.notify_one();
    });

    Html(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_from_query() {
        let query: HashMap<String, String> = [
            ("code", "ABC"),
            ("state", "xyz"),
            ("scope", "openid"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let params = CallbackParams::from_query(query);
        assert_eq!(params.code.as_deref(), Some("ABC"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(params.error.is_none());
        assert!(params.is_success());
    }

    #[test]
    fn params_from_custom_scheme_url() {
        let url = url::Url::parse(
            "calsync://oauth/callback?error=access_denied&error_description=User%20said%20no",
        )
        .unwrap();
        let params = CallbackParams::from_url(&url);
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("User said no"));
        assert!(!params.is_success());
    }

    #[tokio::test]
    async fn forwards_callback_and_stops() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let server = LoopbackServer::start((42900, 42910), "/callback", Duration::from_millis(10), tx)
            .await
            .unwrap();
        assert!(server.redirect_uri().ends_with("/callback"));

        let url = format!("{}?code=ABC&state=s1", server.redirect_uri());
        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert!(body.contains("Authorization complete"));

        let params = rx.recv().await.unwrap();
        assert_eq!(params.code.as_deref(), Some("ABC"));
        assert_eq!(params.state.as_deref(), Some("s1"));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !server.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn stray_hit_keeps_listener_running() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let server = LoopbackServer::start((42911, 42920), "/callback", Duration::from_millis(10), tx)
            .await
            .unwrap();

        let body = reqwest::get(server.redirect_uri()).await.unwrap().text().await.unwrap();
        assert!(body.contains("Waiting"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!server.is_finished());
        assert!(rx.try_recv().is_err());

        let url = format!("{}?code=ABC&state=s1", server.redirect_uri());
        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert!(body.contains("Authorization complete"));
        assert_eq!(rx.recv().await.unwrap().state.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn skips_occupied_ports() {
        let blocker = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let busy = blocker.local_addr().unwrap().port();

        let (tx, _rx) = mpsc::unbounded_channel();
        match LoopbackServer::start((busy, busy), "/callback", Duration::from_millis(10), tx).await {
            Err(err) => assert_eq!(err.code(), crate::error::ProviderErrorCode::Network),
            Ok(_) => panic!("bound an occupied port"),
        }
    }
}
