//! Channel pool: lifecycle, per-channel dispatch, and supervision.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          Supervisor                            │
//! │                                                                │
//! │  build_pool ──► [Channel] [Channel] [Channel]   (generation N) │
//! │                     │         │         │                      │
//! │               DispatchLoop DispatchLoop DispatchLoop           │
//! │                     │         │         │                      │
//! │                     └────── JoinSet ────┘                      │
//! │                               │                                │
//! │            first fatal error ─┴─► abort all, drain,            │
//! │            release handles, rebuild (generation N+1)           │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failure in any one loop is assumed possibly systemic (an invalidated
//! session looks identical to a dead tab from in here), so recovery is
//! always a full-generation rebuild, never a single-channel replacement.

mod builder;
mod dispatch;
mod supervisor;

pub use builder::{build_pool, origin_root};
pub use dispatch::{DispatchError, DispatchLoop};
pub use supervisor::Supervisor;

use std::sync::Arc;

use url::Url;
use uuid::Uuid;

use crate::surface::Surface;

/// One delivery path: a target thread bound to one interaction handle.
///
/// Owned by exactly one [`DispatchLoop`] while running. The surface handle
/// is shared with the supervisor, which releases it once the loop is
/// confirmed cancelled.
pub struct Channel {
    pub id: Uuid,
    pub target: Url,
    pub surface: Arc<dyn Surface>,
    /// Index of the next corpus message, advanced round-robin.
    pub(crate) cursor: usize,
    /// Start of the current send cycle; reset on every refresh.
    pub(crate) cycle_started: tokio::time::Instant,
}

impl Channel {
    pub(crate) fn new(target: Url, surface: Arc<dyn Surface>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            surface,
            cursor: 0,
            cycle_started: tokio::time::Instant::now(),
        }
    }

    /// Current corpus cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
