//! The Agent: outbound connector, handshake, ping responder, and the
//! upstream HTTP bridge.

pub mod connector;
pub mod upstream;

pub use connector::{run as run_agent, run_until as run_agent_until};
