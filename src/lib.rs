//! threadcast: cycle a message corpus into persistent conversation threads.
//!
//! The core is a concurrent dispatch orchestrator: a parsed corpus is
//! shared across a pool of channels (one browser tab per channel), each
//! driven by an unbounded send loop with periodic view refreshes. A fatal
//! failure on any channel tears down and rebuilds the whole pool, on the
//! assumption that the failure may be systemic. All remote interaction
//! goes through the capability traits in [`surface`]; the DevTools adapter
//! there is the only code that knows what a browser is.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod engage;
pub mod error;
pub mod login;
pub mod pool;
pub mod retry;
pub mod session;
pub mod surface;

pub use config::{Config, Selectors, Timing};
pub use corpus::MessageCorpus;
pub use engage::EngageLoop;
pub use error::{Error, Result};
pub use pool::{Channel, DispatchError, DispatchLoop, Supervisor, build_pool};
pub use session::SessionState;
pub use surface::{ElementRef, Surface, SurfaceProvider};
