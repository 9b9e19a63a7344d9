//! OAuth 2.0 authorization-code flow with PKCE and a loopback listener.
//!
//! The engine has no knowledge of calendar providers; the Google and
//! Outlook providers borrow it to obtain and refresh bearer tokens.

mod config;
mod engine;
mod loopback;
mod pending;
mod pkce;

pub use config::{
    AuthEngineConfig, DEFAULT_CALLBACK_PATH, DEFAULT_MICROSOFT_TENANT, DEFAULT_PORT_RANGE,
    GOOGLE_CLIENT_ID_ENV, MICROSOFT_CLIENT_ID_ENV, OAuthClientConfig, OAuthProvider,
};
pub use engine::{
    AuthEngine, AuthEvent, AuthFailure, AuthFailureKind, BrowserLauncher, FlowOptions, FlowStart,
    SubscriptionId, SystemBrowser,
};
pub use loopback::CallbackParams;
pub use pending::PendingOAuthRequest;
pub use pkce::{PkceChallenge, compute_challenge, generate_state};
