//! Error kinds shared across the envelope, hub, and agent components.
//!
//! Mirrors the `ChannelError` idiom used elsewhere in this codebase's
//! lineage: plain enums with a hand-written `Display` and
//! `std::error::Error`, rather than a derive-macro error crate. `?`
//! composes across layers via the `From` impls below.

use std::fmt;

/// Errors from the envelope/MessageBus layer (spec: TransportClosed,
/// TransportWriteError, Cancelled).
#[derive(Debug)]
pub enum BusError {
    /// The peer closed the transport, or the bus was closed locally.
    TransportClosed,
    /// A write to the underlying transport failed.
    TransportWrite(String),
    /// The caller's cancellation token fired while waiting.
    Cancelled,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportClosed => write!(f, "transport closed"),
            Self::TransportWrite(msg) => write!(f, "transport write failed: {msg}"),
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for BusError {}

impl BusError {
    /// Whether this error indicates the peer's connection is gone, as
    /// opposed to a transient or local condition. Used by the Hub's
    /// retry-on-worker-loss path (spec §4.2).
    pub fn indicates_peer_gone(&self) -> bool {
        matches!(self, Self::TransportClosed | Self::TransportWrite(_))
    }
}

/// Errors surfaced by the Hub's dispatch and registry logic (spec:
/// ProtocolViolation, NoCapableWorker, MalformedRequest).
#[derive(Debug)]
pub enum HubError {
    /// No worker in the registry advertises the requested model (or the
    /// registry is empty).
    NoCapableWorker {
        /// The model that was requested, if the pool was non-empty.
        model: Option<String>,
    },
    /// The request body could not be parsed as a completion request.
    Malformed(String),
    /// The peer sent an unexpected message type during a handshake.
    ProtocolViolation(String),
    /// The underlying bus operation failed.
    Dispatch(BusError),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCapableWorker { model: Some(_) } => {
                write!(f, "No workers available for model")
            }
            Self::NoCapableWorker { model: None } => write!(f, "No workers available"),
            Self::Malformed(msg) => write!(f, "malformed request: {msg}"),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
            Self::Dispatch(err) => write!(f, "dispatch failed: {err}"),
        }
    }
}

impl std::error::Error for HubError {}

impl From<BusError> for HubError {
    fn from(err: BusError) -> Self {
        Self::Dispatch(err)
    }
}

/// Errors surfaced by the Agent's upstream bridge and handshake.
#[derive(Debug)]
pub enum AgentError {
    /// The upstream inference server returned a non-200 status.
    Upstream(reqwest::StatusCode),
    /// The registration handshake with the Hub failed.
    Handshake(String),
    /// The underlying bus operation failed.
    Transport(BusError),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream(status) => write!(f, "upstream returned unexpected status: {status}"),
            Self::Handshake(msg) => write!(f, "handshake failed: {msg}"),
            Self::Transport(err) => write!(f, "transport error: {err}"),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<BusError> for AgentError {
    fn from(err: BusError) -> Self {
        Self::Transport(err)
    }
}
