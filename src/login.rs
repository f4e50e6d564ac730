//! Session bootstrap: the interactive login flow.
//!
//! Runs once, on a fresh handle with no session applied: land on the
//! portal, fill the credential form, submit, wait for the post-login
//! location, then export and persist the session blob. This is the only
//! code path that ever writes the session file.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::config::{Selectors, Timing};
use crate::error::{Error, SessionError, SurfaceError};
use crate::retry::{self, RetryPolicy};
use crate::session::SessionState;
use crate::surface::{Surface, SurfaceProvider};

/// How often the post-login location is re-checked.
const LOCATION_POLL: Duration = Duration::from_millis(500);

/// Operator credentials for the bootstrap flow.
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Log in through a fresh handle and persist the exported session.
///
/// Retries the whole flow with the same bounded policy channel
/// initialization uses; a flow that never completes is a fatal
/// [`SessionError::LoginFailed`].
pub async fn bootstrap(
    provider: &Arc<dyn SurfaceProvider>,
    credentials: &Credentials,
    portal: &Url,
    session_path: &Path,
    timing: &Timing,
    selectors: &Selectors,
) -> Result<SessionState, Error> {
    tracing::info!(portal = %portal, username = %credentials.username, "starting login flow");
    let surface = provider.open(None).await.map_err(Error::Surface)?;

    let policy = RetryPolicy::new(timing.init_attempts, timing.init_backoff);
    let outcome = retry::with_backoff(policy, "login", || {
        attempt(&surface, credentials, portal, timing, selectors)
    })
    .await;
    surface.close().await;

    let data = outcome.map_err(|e| SessionError::LoginFailed {
        reason: e.to_string(),
    })?;

    let state = SessionState::new(data);
    state.save(session_path).map_err(Error::Session)?;
    tracing::info!("login complete, session persisted");
    Ok(state)
}

/// One pass through the login form.
async fn attempt(
    surface: &Arc<dyn Surface>,
    credentials: &Credentials,
    portal: &Url,
    timing: &Timing,
    selectors: &Selectors,
) -> Result<serde_json::Value, SurfaceError> {
    surface.navigate(portal.as_str(), timing.nav_timeout).await?;
    surface
        .wait_for(&selectors.username_field, timing.surface_timeout)
        .await?;
    surface
        .fill(&selectors.username_field, &credentials.username)
        .await?;
    surface
        .fill(
            &selectors.password_field,
            credentials.password.expose_secret(),
        )
        .await?;
    surface.click(&selectors.login_submit).await?;
    wait_for_location(surface, &selectors.post_login_fragment, timing.nav_timeout).await?;
    surface.export_session().await
}

/// Wait until the handle's location contains `fragment`.
async fn wait_for_location(
    surface: &Arc<dyn Surface>,
    fragment: &str,
    timeout: Duration,
) -> Result<(), SurfaceError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if surface.current_location().await?.contains(fragment) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(SurfaceError::Timeout {
                operation: "post-login wait",
                timeout,
            });
        }
        tokio::time::sleep(LOCATION_POLL).await;
    }
}
