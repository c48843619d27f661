//! Command-line surface: the two subcommands named in spec.md §6.
//!
//! Grounded on `examples/Tonksthebear-trybotster/cli/src/main.rs`'s
//! `clap::{Parser, Subcommand}` usage for the derive style.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "routehub", version, about = "Request-routing gateway for OpenAI-compatible inference")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the hub: HTTP ingress plus the worker registry and dispatcher.
    Server {
        /// Address to listen on.
        #[arg(long, default_value = ":9090")]
        listen: String,
    },
    /// Run a worker agent that connects out to a hub.
    Agent {
        /// Hub address to dial, e.g. `localhost:9090`.
        #[arg(long)]
        hub: String,
        /// Base URL of the local upstream inference engine.
        #[arg(long, default_value = "http://localhost:5000")]
        inference: String,
        /// Authorization header to attach to upstream requests. Falls back
        /// to the `INFERENCE_AUTHORIZATION` environment variable.
        #[arg(long)]
        inference_authorization: Option<String>,
        /// Name this worker advertises to the hub.
        #[arg(long, default_value = "worker")]
        name: String,
    },
}
