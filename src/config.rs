//! Runtime configuration: timing knobs, selector constants, and target set.
//!
//! Selectors are opaque strings handed to the interaction surface; the core
//! never interprets them. Every timing value has the default the system was
//! tuned with and can be overridden per deployment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Inclusive bounds for tabs-per-target.
pub const MIN_TABS: usize = 1;
pub const MAX_TABS: usize = 5;

/// Timing knobs for dispatch, initialization, and engagement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timing {
    /// How long a channel sends before its view is reloaded.
    pub refresh_interval: Duration,
    /// Minimum pause between two sends on one channel.
    pub send_pacing: Duration,
    /// Bound for navigation and reload calls.
    pub nav_timeout: Duration,
    /// Bound for waiting on a required element.
    pub surface_timeout: Duration,
    /// Attempts when initializing a channel (includes the first).
    pub init_attempts: u32,
    /// Fixed pause between initialization attempts.
    pub init_backoff: Duration,
    /// Pause after a failed composer-visibility check.
    pub recovery_pause: Duration,
    /// Poll interval of the engagement loop.
    pub engage_poll: Duration,
    /// Upper bound on reaction attempts per observed message.
    pub max_reactions: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            send_pacing: Duration::from_millis(10),
            nav_timeout: Duration::from_secs(60),
            surface_timeout: Duration::from_secs(30),
            init_attempts: 3,
            init_backoff: Duration::from_secs(2),
            recovery_pause: Duration::from_millis(20),
            engage_poll: Duration::from_secs(2),
            max_reactions: 10,
        }
    }
}

impl Timing {
    /// Override the refresh threshold (the reload-every-60s default is a
    /// policy value, not a protocol requirement).
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_send_pacing(mut self, pacing: Duration) -> Self {
        self.send_pacing = pacing;
        self
    }
}

/// Selector constants for the remote surface. Opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selectors {
    /// The message composer a channel types into.
    pub composer: String,
    /// One incoming message element in a thread view.
    pub message_item: String,
    /// Candidate reaction affordances within a message element.
    pub reaction_button: String,
    /// Attribute whose value identifies what a candidate button does.
    pub label_attribute: String,
    /// Label substrings that mark a candidate as a reaction affordance.
    pub reaction_markers: Vec<String>,
    /// The concrete reaction to pick once the affordance is open.
    pub reaction_target: String,
    /// Key used to confirm/submit the composer.
    pub confirm_key: String,
    /// Login form fields.
    pub username_field: String,
    pub password_field: String,
    pub login_submit: String,
    /// Location fragment that signals a completed login.
    pub post_login_fragment: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            composer: r#"div[role="textbox"]"#.to_string(),
            message_item: r#"div[role="article"]"#.to_string(),
            reaction_button: "button".to_string(),
            label_attribute: "aria-label".to_string(),
            reaction_markers: vec![
                "react".to_string(),
                "emoji".to_string(),
                "like".to_string(),
            ],
            reaction_target: r#"div[role="menu"] button"#.to_string(),
            confirm_key: "Enter".to_string(),
            username_field: r#"input[name="username"]"#.to_string(),
            password_field: r#"input[name="password"]"#.to_string(),
            login_submit: r#"button[type="submit"]"#.to_string(),
            post_login_fragment: "/home".to_string(),
        }
    }
}

/// Browser process settings for the DevTools surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Browser binary to launch.
    pub binary: String,
    /// Remote-debugging port the browser is told to listen on.
    pub debug_port: u16,
    /// Attach to an already-running DevTools HTTP endpoint instead of
    /// launching (e.g. "http://127.0.0.1:9222").
    pub attach_to: Option<String>,
    pub headless: bool,
    /// Extra stability flags passed at launch.
    pub launch_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary: "chromium".to_string(),
            debug_port: 9222,
            attach_to: None,
            headless: true,
            launch_args: vec![
                "--disable-dev-shm-usage".to_string(),
                "--no-sandbox".to_string(),
                "--disable-gpu".to_string(),
                "--disable-extensions".to_string(),
                "--disable-background-networking".to_string(),
                "--mute-audio".to_string(),
            ],
        }
    }
}

/// Resolved runtime configuration for a dispatch run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Target thread locations, one channel group per entry.
    pub targets: Vec<Url>,
    /// Channels opened per target, clamped to `[MIN_TABS, MAX_TABS]`.
    pub tabs_per_target: usize,
    /// Path of the persisted session blob.
    pub session_path: PathBuf,
    pub timing: Timing,
    pub selectors: Selectors,
    pub browser: BrowserConfig,
}

impl Config {
    /// Clamp a requested tab count into the supported range.
    pub fn clamp_tabs(requested: usize) -> usize {
        requested.clamp(MIN_TABS, MAX_TABS)
    }

    /// Default location of the session blob, under the user's home
    /// directory when one exists.
    pub fn default_session_path() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".threadcast").join("session.json"))
            .unwrap_or_else(|| PathBuf::from("threadcast-session.json"))
    }
}
