mod cli;
mod config;
mod controller;
mod error;
mod exporter;
mod fetcher;
mod matcher;
mod metrics;
mod output;
mod providers;
mod scheduler;
mod schemas;
mod server;
mod store;
#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level()))
        .init();

    output::print_banner();

    info!("Starting CILens exporter - GitLab CI/CD metrics");
    cli.execute().await?;

    Ok(())
}
