//! Channel lifecycle: building a pool of initialized channels.
//!
//! Every (target, tab) pair gets its own handle and its own bounded
//! initialization attempts; pairs that never become ready are excluded and
//! the rest of the pool proceeds. Only a pool with zero survivors is fatal.

use std::sync::Arc;

use url::Url;

use crate::config::{Selectors, Timing};
use crate::error::{InitError, PoolError};
use crate::retry::{self, RetryPolicy};
use crate::session::SessionState;
use crate::surface::SurfaceProvider;

use super::Channel;

/// Root of a target's origin, used as the known-good landing location
/// before navigating to the thread itself.
pub fn origin_root(target: &Url) -> String {
    let origin = target.origin();
    if origin.is_tuple() {
        format!("{}/", origin.ascii_serialization())
    } else {
        target.as_str().to_string()
    }
}

/// Build the channel pool for one generation.
///
/// All (target, tab) initializations run concurrently; each failure is
/// absorbed as an [`InitError`] log line. An empty result is the caller's
/// signal to stop.
pub async fn build_pool(
    provider: &Arc<dyn SurfaceProvider>,
    session: Option<&SessionState>,
    targets: &[Url],
    tabs_per_target: usize,
    timing: &Timing,
    selectors: &Selectors,
) -> Result<Vec<Channel>, PoolError> {
    let pairs: Vec<(Url, usize)> = targets
        .iter()
        .flat_map(|target| (0..tabs_per_target).map(move |tab| (target.clone(), tab)))
        .collect();

    tracing::info!(
        targets = targets.len(),
        tabs_per_target,
        total = pairs.len(),
        "initializing channel pool"
    );

    let attempts = pairs
        .iter()
        .map(|(target, tab)| init_channel(provider, session, target, *tab, timing, selectors));
    let channels: Vec<Channel> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .flatten()
        .collect();

    if channels.is_empty() {
        return Err(PoolError::Empty);
    }
    tracing::info!(
        admitted = channels.len(),
        excluded = pairs.len() - channels.len(),
        "channel pool ready"
    );
    Ok(channels)
}

/// Initialize one (target, tab) pair. `None` means the pair is excluded.
async fn init_channel(
    provider: &Arc<dyn SurfaceProvider>,
    session: Option<&SessionState>,
    target: &Url,
    tab: usize,
    timing: &Timing,
    selectors: &Selectors,
) -> Option<Channel> {
    let surface = match provider.open(session).await {
        Ok(surface) => surface,
        Err(source) => {
            let err = InitError {
                target: target.to_string(),
                tab,
                attempts: 0,
                source,
            };
            tracing::warn!(error = %err, "could not open a handle, excluding pair");
            return None;
        }
    };

    let landing = origin_root(target);
    let policy = RetryPolicy::new(timing.init_attempts, timing.init_backoff);
    let outcome = retry::with_backoff(policy, "channel initialization", || {
        let surface = Arc::clone(&surface);
        let landing = landing.clone();
        async move {
            surface.navigate(&landing, timing.nav_timeout).await?;
            surface.navigate(target.as_str(), timing.nav_timeout).await?;
            surface
                .wait_for(&selectors.composer, timing.surface_timeout)
                .await
        }
    })
    .await;

    match outcome {
        Ok(()) => {
            let channel = Channel::new(target.clone(), surface);
            tracing::info!(channel = %channel.id, target = %target, tab, "channel ready");
            Some(channel)
        }
        Err(source) => {
            let err = InitError {
                target: target.to_string(),
                tab,
                attempts: timing.init_attempts,
                source,
            };
            tracing::warn!(error = %err, "excluding pair from pool");
            surface.close().await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::surface::testing::{FakeProvider, FakeSurface, event_log, events_snapshot};

    fn timing_for_tests() -> Timing {
        Timing {
            init_backoff: std::time::Duration::from_millis(1),
            ..Timing::default()
        }
    }

    fn urls(raw: &[&str]) -> Vec<Url> {
        raw.iter().map(|u| Url::parse(u).unwrap()).collect()
    }

    // --- origin_root ---

    #[test]
    fn test_origin_root_strips_path() {
        let target = Url::parse("https://chat.example/t/42?x=1").unwrap();
        assert_eq!(origin_root(&target), "https://chat.example/");
    }

    // --- Full pool admitted ---

    #[tokio::test]
    async fn test_all_pairs_admitted() {
        let events = event_log();
        let provider: Arc<dyn SurfaceProvider> =
            Arc::new(FakeProvider::plain(Arc::clone(&events)));

        let channels = build_pool(
            &provider,
            None,
            &urls(&["https://chat.example/t/1", "https://chat.example/t/2"]),
            2,
            &timing_for_tests(),
            &Selectors::default(),
        )
        .await
        .unwrap();

        assert_eq!(channels.len(), 4);
        // Landing first, then the target, for every pair.
        let events = events_snapshot(&events);
        let landings = events
            .iter()
            .filter(|e| e.contains("navigate") && e.ends_with("https://chat.example/"))
            .count();
        assert_eq!(landings, 4);
    }

    // --- One pair permanently failing is non-fatal ---

    #[tokio::test]
    async fn test_failing_pair_excluded_rest_admitted() {
        let events = event_log();
        let log = Arc::clone(&events);
        let fake = Arc::new(FakeProvider::new(Arc::clone(&events), move |id, _| {
            let surface = FakeSurface::new(id, Arc::clone(&log));
            if id == 0 {
                surface.fail_wait_for.store(true, Ordering::SeqCst);
            }
            surface
        }));
        let provider: Arc<dyn SurfaceProvider> = fake.clone();

        let channels = build_pool(
            &provider,
            None,
            &urls(&["https://chat.example/t/1", "https://chat.example/t/2"]),
            2,
            &timing_for_tests(),
            &Selectors::default(),
        )
        .await
        .unwrap();

        assert_eq!(channels.len(), 3);
        assert_eq!(fake.opened.load(Ordering::SeqCst), 4);
        // The excluded pair's handle was released.
        assert!(events_snapshot(&events).contains(&"close:0".to_string()));
    }

    // --- Retry happens before exclusion ---

    #[tokio::test]
    async fn test_initialization_retries_three_times() {
        let events = event_log();
        let log = Arc::clone(&events);
        let fake = Arc::new(FakeProvider::new(Arc::clone(&events), move |id, _| {
            let surface = FakeSurface::new(id, Arc::clone(&log));
            surface.fail_wait_for.store(true, Ordering::SeqCst);
            surface
        }));
        let provider: Arc<dyn SurfaceProvider> = fake.clone();

        let result = build_pool(
            &provider,
            None,
            &urls(&["https://chat.example/t/1"]),
            1,
            &timing_for_tests(),
            &Selectors::default(),
        )
        .await;

        assert!(matches!(result, Err(PoolError::Empty)));
        let waits = events_snapshot(&events)
            .iter()
            .filter(|e| e.starts_with("wait_for"))
            .count();
        assert_eq!(waits, 3);
    }

    // --- Open failure excludes the pair without retries ---

    #[tokio::test]
    async fn test_open_failure_excludes_pair() {
        let events = event_log();
        let fake = Arc::new(FakeProvider::plain(Arc::clone(&events)));
        fake.fail_open_for.lock().unwrap().insert(0);
        let provider: Arc<dyn SurfaceProvider> = fake.clone();

        let channels = build_pool(
            &provider,
            None,
            &urls(&["https://chat.example/t/1"]),
            2,
            &timing_for_tests(),
            &Selectors::default(),
        )
        .await
        .unwrap();

        assert_eq!(channels.len(), 1);
    }

    // --- Session blob reaches the provider ---

    #[tokio::test]
    async fn test_session_passed_to_every_open() {
        let events = event_log();
        let fake = Arc::new(FakeProvider::plain(Arc::clone(&events)));
        let provider: Arc<dyn SurfaceProvider> = fake.clone();
        let session = SessionState::new(serde_json::json!({"cookies": []}));

        let channels = build_pool(
            &provider,
            Some(&session),
            &urls(&["https://chat.example/t/1"]),
            3,
            &timing_for_tests(),
            &Selectors::default(),
        )
        .await
        .unwrap();

        assert_eq!(channels.len(), 3);
        assert_eq!(fake.sessions_seen.load(Ordering::SeqCst), 3);
    }
}
