mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{command, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let path = command::run(cli.command).await?;
    println!("Files saved to `{}`", path.display());

    Ok(())
}
