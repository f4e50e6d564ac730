//! CLI command handling.
//!
//! Subcommands:
//! - `run`: parse the corpus, bootstrap or load a session, and drive the
//!   dispatch pool until interrupted
//! - `engage`: react to incoming messages on one thread, sending nothing
//! - `login`: run the login flow and persist the session blob

mod engage;
mod login;
mod run;

pub use engage::run_engage_command;
pub use login::run_login_command;
pub use run::run_dispatch_command;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::config::{BrowserConfig, Config};

#[derive(Parser, Debug)]
#[command(name = "threadcast")]
#[command(about = "Cycle a message corpus into persistent conversation threads")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the dispatch pool until interrupted
    Run(RunArgs),

    /// React to incoming messages on one thread without sending
    Engage(EngageArgs),

    /// Log in and persist a session blob for later runs
    Login(LoginArgs),
}

/// Browser settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct BrowserArgs {
    /// Browser binary to launch
    #[arg(long, default_value = "chromium", env = "THREADCAST_BROWSER")]
    pub browser: String,

    /// Attach to a running DevTools endpoint instead of launching
    #[arg(long, env = "THREADCAST_DEVTOOLS")]
    pub attach: Option<String>,

    /// Remote-debugging port for a launched browser
    #[arg(long, default_value_t = 9222)]
    pub debug_port: u16,

    /// Run the browser headless
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    pub headless: bool,
}

impl BrowserArgs {
    pub fn to_config(&self) -> BrowserConfig {
        BrowserConfig {
            binary: self.browser.clone(),
            debug_port: self.debug_port,
            attach_to: self.attach.clone(),
            headless: self.headless,
            ..BrowserConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Target thread locations, comma-separated
    #[arg(long)]
    pub targets: String,

    /// Inline message block, or the path of a corpus file
    #[arg(long)]
    pub messages: String,

    /// Tabs per target, clamped to 1-5
    #[arg(long, default_value_t = 1)]
    pub tabs: usize,

    /// Path of the session blob
    #[arg(long)]
    pub session: Option<PathBuf>,

    /// Override the channel refresh interval, in seconds
    #[arg(long)]
    pub refresh_secs: Option<u64>,

    /// Username for automatic first-run login
    #[arg(long, env = "THREADCAST_USERNAME")]
    pub username: Option<String>,

    /// Password for automatic first-run login
    #[arg(long, env = "THREADCAST_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(flatten)]
    pub browser: BrowserArgs,
}

#[derive(Args, Debug)]
pub struct EngageArgs {
    /// Thread to watch
    #[arg(long)]
    pub target: Url,

    /// Path of the session blob
    #[arg(long)]
    pub session: Option<PathBuf>,

    #[command(flatten)]
    pub browser: BrowserArgs,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Login portal location
    #[arg(long)]
    pub portal: Url,

    #[arg(long, env = "THREADCAST_USERNAME")]
    pub username: String,

    #[arg(long, env = "THREADCAST_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Path of the session blob
    #[arg(long)]
    pub session: Option<PathBuf>,

    #[command(flatten)]
    pub browser: BrowserArgs,
}

/// Split a comma-separated target list into validated locations.
pub(crate) fn parse_targets(raw: &str) -> anyhow::Result<Vec<Url>> {
    let targets = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| Url::parse(t).with_context(|| format!("invalid target location: {t}")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    anyhow::ensure!(!targets.is_empty(), "no target locations provided");
    Ok(targets)
}

pub(crate) fn resolve_session_path(arg: Option<PathBuf>) -> PathBuf {
    arg.unwrap_or_else(Config::default_session_path)
}

/// Resolves when the process receives an interrupt.
pub(crate) async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "interrupt listener failed, running until killed");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Target list parsing ---

    #[test]
    fn test_parse_targets_splits_and_trims() {
        let targets =
            parse_targets("https://chat.example/t/1, https://chat.example/t/2 ,").unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].path(), "/t/2");
    }

    #[test]
    fn test_parse_targets_rejects_empty_list() {
        assert!(parse_targets("  , ,").is_err());
    }

    #[test]
    fn test_parse_targets_rejects_invalid_location() {
        assert!(parse_targets("not a url").is_err());
    }

    // --- Argument surface ---

    #[test]
    fn test_run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "threadcast",
            "run",
            "--targets",
            "https://chat.example/t/1",
            "--messages",
            "hi & hello",
            "--tabs",
            "3",
            "--headless",
            "false",
        ])
        .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("expected the run subcommand");
        };
        assert_eq!(args.tabs, 3);
        assert!(!args.browser.headless);
        assert!(args.session.is_none());
    }

    #[test]
    fn test_engage_arguments_require_target() {
        assert!(Cli::try_parse_from(["threadcast", "engage"]).is_err());
    }

    #[test]
    fn test_browser_args_to_config() {
        let cli = Cli::try_parse_from([
            "threadcast",
            "engage",
            "--target",
            "https://chat.example/t/1",
            "--attach",
            "http://127.0.0.1:9333",
        ])
        .unwrap();
        let Command::Engage(args) = cli.command else {
            panic!("expected the engage subcommand");
        };
        let config = args.browser.to_config();
        assert_eq!(config.attach_to.as_deref(), Some("http://127.0.0.1:9333"));
        assert!(config.headless);
        assert!(!config.launch_args.is_empty());
    }
}
