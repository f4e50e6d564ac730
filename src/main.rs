//! threadcast binary entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use threadcast::cli::{Cli, Command, run_dispatch_command, run_engage_command, run_login_command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("threadcast=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_dispatch_command(args).await,
        Command::Engage(args) => run_engage_command(args).await,
        Command::Login(args) => run_login_command(args).await,
    }
}
