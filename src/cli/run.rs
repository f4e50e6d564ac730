//! The `run` subcommand: the dispatch pool.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::config::{Config, Selectors, Timing};
use crate::corpus::MessageCorpus;
use crate::login::{self, Credentials};
use crate::pool::{Supervisor, origin_root};
use crate::session::SessionState;
use crate::surface::SurfaceProvider;
use crate::surface::cdp::CdpProvider;

use super::{RunArgs, interrupt, parse_targets, resolve_session_path};

pub async fn run_dispatch_command(args: RunArgs) -> anyhow::Result<()> {
    let corpus = MessageCorpus::parse(&args.messages)?.into_shared();
    tracing::info!(messages = corpus.len(), "corpus parsed");

    let targets = parse_targets(&args.targets)?;
    let tabs = Config::clamp_tabs(args.tabs);
    if tabs != args.tabs {
        tracing::warn!(requested = args.tabs, using = tabs, "tab count clamped");
    }

    let mut timing = Timing::default();
    if let Some(secs) = args.refresh_secs {
        timing = timing.with_refresh_interval(Duration::from_secs(secs));
    }
    let config = Config {
        targets,
        tabs_per_target: tabs,
        session_path: resolve_session_path(args.session.clone()),
        timing,
        selectors: Selectors::default(),
        browser: args.browser.to_config(),
    };

    let provider: Arc<dyn SurfaceProvider> = Arc::new(CdpProvider::start(&config.browser).await?);

    let session = match prepare_session(&provider, &args, &config).await {
        Ok(session) => session,
        Err(e) => {
            provider.close().await;
            return Err(e);
        }
    };

    tracing::info!(
        targets = config.targets.len(),
        tabs_per_target = config.tabs_per_target,
        "starting dispatch pool, interrupt to stop"
    );
    Supervisor::new(provider, corpus, Some(session), config)
        .run(interrupt())
        .await?;
    Ok(())
}

/// Load the persisted session, or bootstrap one when credentials allow it.
async fn prepare_session(
    provider: &Arc<dyn SurfaceProvider>,
    args: &RunArgs,
    config: &Config,
) -> anyhow::Result<SessionState> {
    if SessionState::exists(&config.session_path) {
        tracing::info!(path = %config.session_path.display(), "using existing session state");
        return Ok(SessionState::load(&config.session_path)?);
    }

    match (&args.username, &args.password) {
        (Some(username), Some(password)) => {
            let credentials = Credentials {
                username: username.clone(),
                password: SecretString::from(password.clone()),
            };
            let portal = url::Url::parse(&origin_root(&config.targets[0]))?;
            Ok(login::bootstrap(
                provider,
                &credentials,
                &portal,
                &config.session_path,
                &config.timing,
                &config.selectors,
            )
            .await?)
        }
        _ => anyhow::bail!(
            "no session state at {} and no credentials for a first-run login",
            config.session_path.display()
        ),
    }
}
