//! Binary entry point: parse CLI flags, initialize logging, and dispatch to
//! either the hub or an agent.

use anyhow::{Context, Result};
use clap::Parser;

use routehub::cli::{Cli, Command};
use routehub::config::Config;
use routehub::{agent, hub::Hub};

#[tokio::main]
async fn main() -> Result<()> {
    routehub::logging::init();
    let cli = Cli::parse();

    match Config::from(cli.command) {
        Config::Hub(config) => Hub::run(config).await.context("hub exited with an error"),
        Config::Agent(config) => agent::run_agent(config)
            .await
            .context("agent exited with an error"),
    }
}
