//! Binary entry point for mnemo-rs.
//!
//! Logging goes to stderr so stdout stays clean for the stdio transport.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mnemo_rs::cli::{Cli, execute};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("mnemo_rs={default_level}"))),
        )
        .with_writer(std::io::stderr)
        .init();

    execute(cli).await?;
    Ok(())
}
