//! Assembles [`HubConfig`]/[`AgentConfig`] from parsed CLI flags, with an
//! environment-variable fallback for the upstream authorization secret.
//!
//! Grounded on `examples/Tonksthebear-trybotster/cli/src/config.rs`'s plain
//! struct-with-defaults shape and spec.md §6's CLI surface.

use crate::cli::Command;

/// Configuration for the `server` (hub) subcommand.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address to bind, in `host:port` form. A bare `:port` (the Go
    /// original's convention for "all interfaces") is expanded to
    /// `0.0.0.0:port` since Rust's socket address parser requires a host.
    pub listen: String,
}

/// Configuration for the `agent` (worker) subcommand.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub hub: String,
    pub inference: String,
    pub inference_authorization: Option<String>,
    pub name: String,
}

pub enum Config {
    Hub(HubConfig),
    Agent(AgentConfig),
}

impl From<Command> for Config {
    fn from(command: Command) -> Self {
        match command {
            Command::Server { listen } => Config::Hub(HubConfig {
                listen: normalize_listen_addr(listen),
            }),
            Command::Agent {
                hub,
                inference,
                inference_authorization,
                name,
            } => Config::Agent(AgentConfig {
                hub,
                inference,
                inference_authorization: inference_authorization
                    .or_else(|| std::env::var("INFERENCE_AUTHORIZATION").ok()),
                name,
            }),
        }
    }
}

fn normalize_listen_addr(listen: String) -> String {
    if let Some(port) = listen.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        listen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_port_listen_addr_expands_to_all_interfaces() {
        assert_eq!(normalize_listen_addr(":9090".to_string()), "0.0.0.0:9090");
    }

    #[test]
    fn explicit_host_listen_addr_is_left_alone() {
        assert_eq!(
            normalize_listen_addr("127.0.0.1:9090".to_string()),
            "127.0.0.1:9090"
        );
    }

    #[test]
    fn inference_authorization_falls_back_to_env_var() {
        std::env::set_var("INFERENCE_AUTHORIZATION", "Bearer test-token");
        let config: Config = Command::Agent {
            hub: "localhost:9090".to_string(),
            inference: "http://localhost:5000".to_string(),
            inference_authorization: None,
            name: "worker".to_string(),
        }
        .into();
        match config {
            Config::Agent(cfg) => {
                assert_eq!(cfg.inference_authorization.as_deref(), Some("Bearer test-token"));
            }
            Config::Hub(_) => panic!("expected agent config"),
        }
        std::env::remove_var("INFERENCE_AUTHORIZATION");
    }
}
