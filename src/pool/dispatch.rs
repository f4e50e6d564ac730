//! The per-channel dispatch loop.
//!
//! A loop cycles the shared corpus into its channel forever: send, pace,
//! advance, wrap. Two things interrupt the cycle: the periodic view refresh
//! once `refresh_interval` has elapsed, and a composer that stopped being
//! visible, which gets a best-effort nudge rather than an error. Everything
//! else that goes wrong is fatal to the loop and, through the supervisor,
//! to the whole pool generation.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::{Selectors, Timing};
use crate::corpus::MessageCorpus;
use crate::error::SurfaceError;

use super::Channel;

/// Fatal outcome of a dispatch loop. Ends the pool generation.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("channel {channel} failed to refresh its view: {source}")]
    Refresh {
        channel: Uuid,
        #[source]
        source: SurfaceError,
    },

    #[error("channel {channel} could not check its composer: {source}")]
    SurfaceCheck {
        channel: Uuid,
        #[source]
        source: SurfaceError,
    },

    #[error("channel {channel} failed to send: {source}")]
    Send {
        channel: Uuid,
        #[source]
        source: SurfaceError,
    },
}

impl DispatchError {
    /// The channel the failure originated on.
    pub fn channel(&self) -> Uuid {
        match self {
            Self::Refresh { channel, .. }
            | Self::SurfaceCheck { channel, .. }
            | Self::Send { channel, .. } => *channel,
        }
    }
}

/// Unbounded send cycle over one channel.
pub struct DispatchLoop {
    channel: Channel,
    corpus: Arc<MessageCorpus>,
    timing: Timing,
    selectors: Selectors,
}

impl DispatchLoop {
    pub fn new(
        channel: Channel,
        corpus: Arc<MessageCorpus>,
        timing: Timing,
        selectors: Selectors,
    ) -> Self {
        Self {
            channel,
            corpus,
            timing,
            selectors,
        }
    }

    /// Run until a fatal error or external cancellation. Never returns
    /// voluntarily otherwise.
    pub async fn run(mut self) -> DispatchError {
        tracing::info!(
            channel = %self.channel.id,
            target = %self.channel.target,
            "dispatch loop started"
        );
        loop {
            if let Err(fatal) = self.step().await {
                tracing::warn!(channel = %self.channel.id, error = %fatal, "dispatch loop failed");
                return fatal;
            }
        }
    }

    /// One iteration of the state machine.
    async fn step(&mut self) -> Result<(), DispatchError> {
        if self.channel.cycle_started.elapsed() >= self.timing.refresh_interval {
            return self.refresh().await;
        }

        let visible = self
            .channel
            .surface
            .is_visible(&self.selectors.composer)
            .await
            .map_err(|source| DispatchError::SurfaceCheck {
                channel: self.channel.id,
                source,
            })?;
        if !visible {
            self.recover().await;
            return Ok(());
        }

        self.submit().await?;
        self.channel.cursor = self.corpus.next_index(self.channel.cursor);
        tokio::time::sleep(self.timing.send_pacing).await;
        Ok(())
    }

    /// Reload the channel's view and re-wait for the composer. A single
    /// bounded attempt; the cursor does not move.
    async fn refresh(&mut self) -> Result<(), DispatchError> {
        tracing::debug!(channel = %self.channel.id, "refreshing channel view");
        let surface = &self.channel.surface;
        let outcome = async {
            surface.reload(self.timing.nav_timeout).await?;
            surface
                .wait_for(&self.selectors.composer, self.timing.surface_timeout)
                .await
        }
        .await;

        match outcome {
            Ok(()) => {
                self.channel.cycle_started = tokio::time::Instant::now();
                Ok(())
            }
            Err(source) => Err(DispatchError::Refresh {
                channel: self.channel.id,
                source,
            }),
        }
    }

    /// The composer is not presentable: nudge it, skip this message, and
    /// let the next iteration try again.
    async fn recover(&mut self) {
        if let Err(e) = self
            .channel
            .surface
            .press_key(&self.selectors.composer, &self.selectors.confirm_key)
            .await
        {
            tracing::debug!(channel = %self.channel.id, error = %e, "recovery keystroke failed");
        }
        tokio::time::sleep(self.timing.recovery_pause).await;
        self.channel.cursor = self.corpus.next_index(self.channel.cursor);
    }

    /// Submit the message at the cursor through the composer.
    async fn submit(&mut self) -> Result<(), DispatchError> {
        let message = self.corpus.message(self.channel.cursor);
        let surface = &self.channel.surface;
        let composer = &self.selectors.composer;

        let outcome = async {
            surface.click(composer).await?;
            surface.fill(composer, message).await?;
            surface.press_key(composer, &self.selectors.confirm_key).await
        }
        .await;

        match outcome {
            Ok(()) => {
                tracing::debug!(
                    channel = %self.channel.id,
                    cursor = self.channel.cursor,
                    "message sent"
                );
                Ok(())
            }
            Err(source) => Err(DispatchError::Send {
                channel: self.channel.id,
                source,
            }),
        }
    }
}
