//! Sign-in commands.

use std::time::Duration;

use tracing::{debug, info};

use calsync_core::{CalendarSource, ProviderKind};
use calsync_providers::auth::{AuthEvent, FlowOptions, OAuthProvider};

use super::Context;
use crate::config;
use crate::error::{CliError, CliResult};

fn oauth_provider(source: &CalendarSource) -> CliResult<OAuthProvider> {
    match source.provider {
        ProviderKind::Google => Ok(OAuthProvider::Google),
        ProviderKind::Outlook => Ok(OAuthProvider::Microsoft),
        ProviderKind::CalDav => Err(CliError::Config(format!(
            "source `{}` uses CalDAV credentials, there is nothing to sign in to",
            source.id
        ))),
    }
}

/// Run the browser sign-in for `source_id` and store the tokens.
///
/// Waits for the redirect until `timeout` elapses or Ctrl-C is pressed.
pub async fn login(ctx: &Context, source_id: &str, timeout: Duration) -> CliResult<()> {
    let source = ctx.config.source(source_id)?;
    let provider = oauth_provider(&source)?;
    let engine = ctx.engine();

    let (subscription, mut rx) = engine.subscribe();

    let mut options = FlowOptions::new().with_source_id(source.id.clone());
    if let Some(ref tenant) = source.tenant_id {
        options = options.with_tenant_id(tenant.clone());
    }

    let flow = match engine.start_flow(provider, options).await {
        Ok(flow) => flow,
        Err(e) => {
            engine.unsubscribe(subscription);
            return Err(e.into());
        }
    };
    debug!(redirect_uri = %flow.redirect_uri, "sign-in flow started");

    println!("Signing in to {} ({})...", source.display_name(), provider.as_str());
    println!();
    println!("A browser window should open. If it does not, visit:");
    println!();
    println!("  {}", flow.authorization_url);
    println!();

    let outcome = tokio::select! {
        event = wait_for(&mut rx, &source.id) => event,
        _ = tokio::time::sleep(timeout) => Err(CliError::Timeout(format!(
            "no sign-in completed within {}s",
            timeout.as_secs()
        ))),
        _ = tokio::signal::ctrl_c() => Err(CliError::Auth("sign-in interrupted".to_string())),
    };

    engine.unsubscribe(subscription);
    engine.stop_listener().await;

    match outcome? {
        AuthEvent::Success {
            tokens, account, ..
        } => {
            config::save_tokens(&ctx.path, &source.id, &tokens)?;
            info!(source = %source.id, "stored new tokens");
            match account {
                Some(account) => println!("Signed in as {}.", account),
                None => println!("Signed in."),
            }
            println!("Tokens saved to {}", ctx.path.display());
            Ok(())
        }
        AuthEvent::Failure { error, .. } => Err(CliError::Auth(error.message)),
    }
}

/// Returns the first event that belongs to `source_id`.
async fn wait_for(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<AuthEvent>,
    source_id: &str,
) -> CliResult<AuthEvent> {
    while let Some(event) = rx.recv().await {
        let event_source = match &event {
            AuthEvent::Success { source_id, .. } | AuthEvent::Failure { source_id, .. } => {
                source_id.as_deref()
            }
        };
        match event_source {
            Some(id) if id != source_id => {
                debug!(other = %id, "ignoring sign-in event for another source");
            }
            _ => return Ok(event),
        }
    }
    Err(CliError::Auth("sign-in listener closed".to_string()))
}

/// Revoke the stored tokens of `source_id` and remove them from the file.
pub async fn logout(ctx: &Context, source_id: &str) -> CliResult<()> {
    let source = ctx.config.source(source_id)?;
    let provider = oauth_provider(&source)?;

    if let Some(ref tokens) = source.tokens {
        ctx.engine().revoke(provider, tokens).await;
    }

    if config::clear_tokens(&ctx.path, &source.id)? {
        println!("Signed out of {}.", source.display_name());
    } else {
        println!("{} had no stored tokens.", source.display_name());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_source_kinds_to_identity_providers() {
        let google = CalendarSource::new("g", ProviderKind::Google);
        let outlook = CalendarSource::new("o", ProviderKind::Outlook);
        let dav = CalendarSource::new("d", ProviderKind::CalDav);
        assert_eq!(oauth_provider(&google).unwrap(), OAuthProvider::Google);
        assert_eq!(oauth_provider(&outlook).unwrap(), OAuthProvider::Microsoft);
        assert!(matches!(oauth_provider(&dav), Err(CliError::Config(_))));
    }
}
