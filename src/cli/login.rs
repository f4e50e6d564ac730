//! The `login` subcommand: explicit session bootstrap.

use std::sync::Arc;

use secrecy::SecretString;

use crate::config::{Selectors, Timing};
use crate::login::{Credentials, bootstrap};
use crate::surface::SurfaceProvider;
use crate::surface::cdp::CdpProvider;

use super::{LoginArgs, resolve_session_path};

pub async fn run_login_command(args: LoginArgs) -> anyhow::Result<()> {
    let session_path = resolve_session_path(args.session.clone());
    let credentials = Credentials {
        username: args.username.clone(),
        password: SecretString::from(args.password.clone()),
    };

    let provider: Arc<dyn SurfaceProvider> =
        Arc::new(CdpProvider::start(&args.browser.to_config()).await?);
    let result = bootstrap(
        &provider,
        &credentials,
        &args.portal,
        &session_path,
        &Timing::default(),
        &Selectors::default(),
    )
    .await;
    provider.close().await;

    let state = result?;
    println!(
        "Session saved to {} (captured {}).",
        session_path.display(),
        state.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}
