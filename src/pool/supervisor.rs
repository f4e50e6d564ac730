//! Pool supervision: one dispatch loop per channel, all-or-nothing.
//!
//! The supervisor runs the pool in generations. A generation ends when any
//! one loop reports a fatal [`DispatchError`]: the remaining loops are
//! cancelled, every handle is released, and a fresh pool is built from
//! scratch. The triggering failure is treated as possibly systemic, so
//! there is no per-channel replacement. Externally requested shutdown takes
//! the same teardown path and then releases the browsing context.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::config::Config;
use crate::corpus::MessageCorpus;
use crate::error::Error;
use crate::session::SessionState;
use crate::surface::{Surface, SurfaceProvider};

use super::dispatch::{DispatchError, DispatchLoop};
use super::{Channel, build_pool};

/// What ended a pool generation.
enum GenerationEnd {
    /// A dispatch loop reached its terminal state (or panicked).
    Failure(Option<Result<DispatchError, tokio::task::JoinError>>),
    /// External interruption.
    Shutdown,
}

/// Runs the channel pool until externally interrupted.
pub struct Supervisor {
    provider: Arc<dyn SurfaceProvider>,
    corpus: Arc<MessageCorpus>,
    session: Option<SessionState>,
    config: Config,
}

impl Supervisor {
    pub fn new(
        provider: Arc<dyn SurfaceProvider>,
        corpus: Arc<MessageCorpus>,
        session: Option<SessionState>,
        config: Config,
    ) -> Self {
        Self {
            provider,
            corpus,
            session,
            config,
        }
    }

    /// Run pool generations until `shutdown` resolves.
    ///
    /// Returns `Err` only for fatal startup conditions (a build that admits
    /// no channel). Dispatch failures never escape: they are converted into
    /// rebuilds here.
    pub async fn run<F>(self, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut generation: u64 = 0;

        loop {
            generation += 1;
            let channels = match build_pool(
                &self.provider,
                self.session.as_ref(),
                &self.config.targets,
                self.config.tabs_per_target,
                &self.config.timing,
                &self.config.selectors,
            )
            .await
            {
                Ok(channels) => channels,
                Err(e) => {
                    self.provider.close().await;
                    return Err(e.into());
                }
            };

            let handles: Vec<Arc<dyn Surface>> = channels
                .iter()
                .map(|channel| Arc::clone(&channel.surface))
                .collect();
            let mut tasks = self.spawn_loops(channels);
            tracing::info!(generation, channels = handles.len(), "pool generation running");

            let end = tokio::select! {
                joined = tasks.join_next() => GenerationEnd::Failure(joined),
                _ = &mut shutdown => GenerationEnd::Shutdown,
            };

            // Cancel the siblings and wait for every task to actually
            // finish before any handle is touched.
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            for surface in &handles {
                surface.close().await;
            }

            match end {
                GenerationEnd::Failure(Some(Ok(error))) => {
                    tracing::warn!(
                        generation,
                        channel = %error.channel(),
                        error = %error,
                        "dispatch failure, rebuilding the pool"
                    );
                }
                GenerationEnd::Failure(Some(Err(join_error))) => {
                    tracing::warn!(generation, error = %join_error, "dispatch task aborted abnormally, rebuilding the pool");
                }
                GenerationEnd::Failure(None) => {
                    // JoinSet drained without a result; only reachable if
                    // every task was already gone. Rebuild regardless.
                    tracing::warn!(generation, "pool drained unexpectedly, rebuilding");
                }
                GenerationEnd::Shutdown => {
                    tracing::info!(generation, "shutdown requested, pool stopped");
                    self.provider.close().await;
                    return Ok(());
                }
            }
        }
    }

    fn spawn_loops(&self, channels: Vec<Channel>) -> JoinSet<DispatchError> {
        let mut tasks = JoinSet::new();
        for channel in channels {
            let dispatch = DispatchLoop::new(
                channel,
                Arc::clone(&self.corpus),
                self.config.timing.clone(),
                self.config.selectors.clone(),
            );
            tasks.spawn(dispatch.run());
        }
        tasks
    }
}
