//! Engagement mode: react to incoming messages, never send any.
//!
//! An independent entry point on a single channel. The loop polls the
//! thread view on a fixed interval, and every newly observed message gets a
//! bounded burst of reaction attempts. Per-attempt failures are swallowed
//! (a message that cannot be reacted to is simply left alone) and the burst
//! stops early as soon as no reaction affordance can be found.

use std::future::Future;
use std::sync::Arc;

use crate::config::{Selectors, Timing};
use crate::error::SurfaceError;
use crate::surface::{ElementRef, Surface};

/// Reacts to new messages on one channel until interrupted.
pub struct EngageLoop {
    surface: Arc<dyn Surface>,
    timing: Timing,
    selectors: Selectors,
    /// Message elements observed so far; only growth beyond this is "new".
    seen: usize,
}

impl EngageLoop {
    pub fn new(surface: Arc<dyn Surface>, timing: Timing, selectors: Selectors) -> Self {
        Self {
            surface,
            timing,
            selectors,
            seen: 0,
        }
    }

    /// Poll-and-react until `shutdown` resolves. The handle is released on
    /// the way out.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!("engagement loop started");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("engagement loop stopped");
                    self.surface.close().await;
                    return;
                }
                _ = tokio::time::sleep(self.timing.engage_poll) => {
                    if let Err(e) = self.tick().await {
                        tracing::warn!(error = %e, "engagement poll failed, will retry");
                    }
                }
            }
        }
    }

    /// One poll: look for growth in the message list and react to the tail.
    async fn tick(&mut self) -> Result<(), SurfaceError> {
        let items = self
            .surface
            .query_all(&self.selectors.message_item)
            .await?;
        if items.len() <= self.seen {
            return Ok(());
        }

        let fresh = items.len() - self.seen;
        tracing::info!(fresh, total = items.len(), "new messages observed");
        for element in items.iter().skip(self.seen).copied() {
            self.react(element).await;
        }
        self.seen = items.len();
        Ok(())
    }

    /// Burst up to `max_reactions` reactions onto one message element,
    /// stopping early once no affordance is found.
    async fn react(&self, element: ElementRef) {
        for attempt in 0..self.timing.max_reactions {
            if let Err(e) = self.surface.hover(element).await {
                tracing::debug!(attempt, error = %e, "hover failed, leaving message alone");
                return;
            }
            let affordance = match self.find_affordance(element).await {
                Ok(Some(affordance)) => affordance,
                Ok(None) => {
                    tracing::debug!(attempt, "no reaction affordance, stopping early");
                    return;
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "affordance lookup failed");
                    return;
                }
            };

            if let Err(e) = self.surface.click_element(affordance).await {
                tracing::debug!(attempt, error = %e, "reaction affordance rejected the click");
                continue;
            }
            if let Err(e) = self.pick_reaction().await {
                tracing::debug!(attempt, error = %e, "reaction pick failed");
            }
        }
    }

    /// Find a child of `element` whose labelling attribute marks it as a
    /// reaction affordance.
    async fn find_affordance(
        &self,
        element: ElementRef,
    ) -> Result<Option<ElementRef>, SurfaceError> {
        let candidates = self
            .surface
            .query_within(element, &self.selectors.reaction_button)
            .await?;
        for candidate in candidates {
            let label = self
                .surface
                .attribute(candidate, &self.selectors.label_attribute)
                .await?
                .unwrap_or_default()
                .to_lowercase();
            if self
                .selectors
                .reaction_markers
                .iter()
                .any(|marker| label.contains(marker))
            {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Click the concrete reaction once the affordance opened it.
    async fn pick_reaction(&self) -> Result<(), SurfaceError> {
        let targets = self
            .surface
            .query_all(&self.selectors.reaction_target)
            .await?;
        match targets.first() {
            Some(target) => self.surface.click_element(*target).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::surface::testing::{FakeSurface, event_log, events_snapshot};

    fn engage(surface: Arc<FakeSurface>) -> EngageLoop {
        EngageLoop::new(surface, Timing::default(), Selectors::default())
    }

    // --- New messages get reactions ---

    #[tokio::test]
    async fn test_new_messages_trigger_reactions() {
        let events = event_log();
        let surface = FakeSurface::new(0, Arc::clone(&events));
        surface.message_elements.store(2, Ordering::SeqCst);
        surface.reaction_rounds.store(3, Ordering::SeqCst);

        let mut engage = engage(Arc::clone(&surface));
        engage.tick().await.unwrap();

        let hovers = events_snapshot(&events)
            .iter()
            .filter(|e| e.starts_with("hover:"))
            .count();
        assert!(hovers >= 2, "both fresh messages were visited");
    }

    // --- Early stop when no affordance exists ---

    #[tokio::test]
    async fn test_no_affordance_stops_early() {
        let events = event_log();
        let surface = FakeSurface::new(0, Arc::clone(&events));
        surface.message_elements.store(1, Ordering::SeqCst);
        // reaction_rounds stays 0: no affordance ever appears.

        let mut engage = engage(Arc::clone(&surface));
        engage.tick().await.unwrap();

        let hovers = events_snapshot(&events)
            .iter()
            .filter(|e| e.starts_with("hover:"))
            .count();
        assert_eq!(hovers, 1, "exactly one attempt before the early stop");
    }

    // --- Reaction attempts are bounded ---

    #[tokio::test]
    async fn test_reactions_bounded_per_message() {
        let events = event_log();
        let surface = FakeSurface::new(0, Arc::clone(&events));
        surface.message_elements.store(1, Ordering::SeqCst);
        surface.reaction_rounds.store(u32::MAX, Ordering::SeqCst);

        let mut engage = engage(Arc::clone(&surface));
        engage.tick().await.unwrap();

        let hovers = events_snapshot(&events)
            .iter()
            .filter(|e| e.starts_with("hover:"))
            .count();
        assert_eq!(hovers, Timing::default().max_reactions as usize);
    }

    // --- Unchanged message count does nothing ---

    #[tokio::test]
    async fn test_unchanged_count_is_quiet() {
        let events = event_log();
        let surface = FakeSurface::new(0, Arc::clone(&events));
        surface.message_elements.store(2, Ordering::SeqCst);
        surface.reaction_rounds.store(1, Ordering::SeqCst);

        let mut engage = engage(Arc::clone(&surface));
        engage.tick().await.unwrap();
        let hovers_after_first = events_snapshot(&events)
            .iter()
            .filter(|e| e.starts_with("hover:"))
            .count();

        engage.tick().await.unwrap();
        let hovers_after_second = events_snapshot(&events)
            .iter()
            .filter(|e| e.starts_with("hover:"))
            .count();
        assert_eq!(hovers_after_first, hovers_after_second);
    }

    // --- Only the tail of the list is treated as fresh ---

    #[tokio::test]
    async fn test_only_new_tail_is_reacted_to() {
        let events = event_log();
        let surface = FakeSurface::new(0, Arc::clone(&events));
        surface.message_elements.store(3, Ordering::SeqCst);

        let mut engage = engage(Arc::clone(&surface));
        engage.tick().await.unwrap();
        let baseline = events_snapshot(&events)
            .iter()
            .filter(|e| e.starts_with("hover:"))
            .count();

        // One more message arrives.
        surface.message_elements.store(4, Ordering::SeqCst);
        engage.tick().await.unwrap();
        let after = events_snapshot(&events)
            .iter()
            .filter(|e| e.starts_with("hover:"))
            .count();
        assert_eq!(after - baseline, 1, "only the new message was visited");
    }

    // --- Shutdown releases the handle ---

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_surface() {
        let events = event_log();
        let surface = FakeSurface::new(0, Arc::clone(&events));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let run = tokio::spawn(engage(Arc::clone(&surface)).run(async {
            let _ = stop_rx.await;
        }));
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        stop_tx.send(()).unwrap();
        run.await.unwrap();

        assert!(surface.closed.load(Ordering::SeqCst));
    }
}
