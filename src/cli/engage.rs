//! The `engage` subcommand: reaction-only mode.

use std::sync::Arc;

use crate::config::{Selectors, Timing};
use crate::engage::EngageLoop;
use crate::session::SessionState;
use crate::surface::SurfaceProvider;
use crate::surface::cdp::CdpProvider;

use super::{EngageArgs, interrupt, resolve_session_path};

pub async fn run_engage_command(args: EngageArgs) -> anyhow::Result<()> {
    let session_path = resolve_session_path(args.session.clone());
    let session = SessionState::load(&session_path)?;

    let timing = Timing::default();
    let selectors = Selectors::default();
    let provider: Arc<dyn SurfaceProvider> =
        Arc::new(CdpProvider::start(&args.browser.to_config()).await?);

    let outcome = async {
        let surface = provider.open(Some(&session)).await?;
        if let Err(e) = surface.navigate(args.target.as_str(), timing.nav_timeout).await {
            surface.close().await;
            return Err(e);
        }
        Ok(surface)
    }
    .await;

    let surface = match outcome {
        Ok(surface) => surface,
        Err(e) => {
            provider.close().await;
            return Err(e.into());
        }
    };

    tracing::info!(target = %args.target, "watching thread, interrupt to stop");
    // Let the thread view settle before the first poll.
    tokio::time::sleep(timing.engage_poll).await;
    EngageLoop::new(surface, timing, selectors)
        .run(interrupt())
        .await;
    provider.close().await;
    Ok(())
}
