//! Remote interaction surface abstraction.
//!
//! The orchestrator never talks to a browser, a DOM, or a wire protocol.
//! It talks to [`Surface`] (one handle = one tab bound to one thread view)
//! and [`SurfaceProvider`] (owns the shared browsing context and mints
//! handles). Selectors are opaque strings; element handles are opaque ids.
//!
//! The one concrete implementation lives in [`cdp`]; everything else in the
//! crate is written against the traits.

pub mod cdp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SurfaceError;
use crate::session::SessionState;

/// Opaque handle to an element previously returned by a query.
///
/// Valid only against the surface that produced it, and only until that
/// surface navigates or reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef(pub u64);

/// One interaction handle on the remote surface.
///
/// Every method is a suspension point and carries either an explicit bound
/// or the adapter's per-call default; exceeding a bound is an ordinary
/// [`SurfaceError`], not a distinct condition.
#[async_trait]
pub trait Surface: Send + Sync {
    /// Navigate this handle to `url`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), SurfaceError>;

    /// Reload the current view.
    async fn reload(&self, timeout: Duration) -> Result<(), SurfaceError>;

    /// Wait until `selector` matches at least one element.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), SurfaceError>;

    /// Whether `selector` currently matches a visible element.
    async fn is_visible(&self, selector: &str) -> Result<bool, SurfaceError>;

    /// Click the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<(), SurfaceError>;

    /// Replace the content of the first element matching `selector`.
    async fn fill(&self, selector: &str, text: &str) -> Result<(), SurfaceError>;

    /// Send a key to the first element matching `selector`.
    async fn press_key(&self, selector: &str, key: &str) -> Result<(), SurfaceError>;

    /// All elements currently matching `selector`, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<ElementRef>, SurfaceError>;

    /// Elements matching `selector` inside a previously returned element.
    async fn query_within(
        &self,
        element: ElementRef,
        selector: &str,
    ) -> Result<Vec<ElementRef>, SurfaceError>;

    /// Read an attribute from an element, `None` when absent.
    async fn attribute(
        &self,
        element: ElementRef,
        name: &str,
    ) -> Result<Option<String>, SurfaceError>;

    /// Hover an element (reveals hover-only affordances).
    async fn hover(&self, element: ElementRef) -> Result<(), SurfaceError>;

    /// Click a previously returned element.
    async fn click_element(&self, element: ElementRef) -> Result<(), SurfaceError>;

    /// Current location of the handle's view.
    async fn current_location(&self) -> Result<String, SurfaceError>;

    /// Export the authenticated-session payload visible to this handle.
    async fn export_session(&self) -> Result<serde_json::Value, SurfaceError>;

    /// Release the handle. Idempotent; errors are swallowed and logged.
    async fn close(&self);
}

/// Owner of the shared browsing context.
///
/// Only the channel lifecycle manager calls [`SurfaceProvider::open`];
/// dispatch loops use handles but never create or destroy them.
#[async_trait]
pub trait SurfaceProvider: Send + Sync {
    /// Open a fresh handle, applying `session` when one is given.
    async fn open(
        &self,
        session: Option<&SessionState>,
    ) -> Result<Arc<dyn Surface>, SurfaceError>;

    /// Release the shared browsing context. Called once, at shutdown.
    async fn close(&self);
}
