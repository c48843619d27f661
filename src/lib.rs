//! Core library for `routehub`: a request-routing gateway for
//! OpenAI-compatible language-model inference.
//!
//! The binary entry point (`main.rs`) is a thin wrapper that parses CLI
//! arguments and dispatches to either [`hub::Hub::run`] or
//! [`agent::run_agent`]. Everything else lives here so it can be exercised
//! from integration tests without spawning a subprocess.

pub mod agent;
pub mod cli;
pub mod config;
pub mod envelope;
pub mod error;
pub mod hub;
pub mod logging;

pub use config::{AgentConfig, Config, HubConfig};
pub use error::{AgentError, BusError, HubError};
pub use hub::Hub;
