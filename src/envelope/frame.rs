//! Wire frame types for the multiplexed request/reply protocol.
//!
//! Every message exchanged over the bidirectional Hub<->Agent transport is
//! an [`Envelope`]: a `{type, id, message}` JSON object. `message`'s shape
//! is determined by `type`; the per-type payload structs below are kept
//! loosely typed (`serde_json::Value` inside [`Envelope`] itself) so the
//! bus can route frames without deserializing their bodies, and typed only
//! at the point where a specific frame is consumed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The closed set of wire message tags (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    ServerInfo,
    WorkerInfo,
    Ack,
    Ping,
    CompletionsRequest,
    CompletionsResponse,
    CompletionsDone,
}

/// A single frame on the wire: `{"type": ..., "id": ..., "message": ...}`.
///
/// `id` threads a request to its replies. Unsolicited notifications still
/// carry one — if the sender didn't choose one, [`Envelope::new`] mints a
/// fresh UUID v4 so buffering by id never collides with a prior exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub id: String,
    pub message: Value,
}

impl Envelope {
    /// Build a frame with a fresh correlation id.
    pub fn new(kind: MessageKind, message: Value) -> Self {
        Self {
            kind,
            id: new_id(),
            message,
        }
    }

    /// Build a frame that replies to (or otherwise correlates with) an
    /// existing id.
    pub fn with_id(kind: MessageKind, id: impl Into<String>, message: Value) -> Self {
        Self {
            kind,
            id: id.into(),
            message,
        }
    }

    /// Deserialize `message` into a concrete payload type.
    pub fn parse<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.message.clone())
    }
}

/// Mint a fresh 128-bit random correlation id rendered as text.
///
/// Collision probability is negligible; the [`super::bus::MessageBus`]
/// collision check (spec §4.1) exists only to make the invariant explicit.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// `server_info` payload: the Hub's greeting sent immediately after a
/// worker's WebSocket upgrade completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_name: String,
    pub server_version: String,
    pub message: String,
}

/// `worker_info` payload: a worker's self-description sent in response to
/// `server_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_name: String,
    pub available_models: Vec<Model>,
}

/// `ack` payload. For ping replies, `message` is always the literal string
/// `"pong"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    pub message: String,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn pong() -> Self {
        Self {
            ok: true,
            message: "pong".to_string(),
        }
    }
}

/// A model descriptor, deduplicated by `(owned_by, id)` across the worker
/// pool (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

/// Response envelope for `GET /v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListModelsResponse {
    pub object: String,
    pub data: Vec<Model>,
}

impl ListModelsResponse {
    pub fn new(data: Vec<Model>) -> Self {
        Self {
            object: "list".to_string(),
            data,
        }
    }
}

/// The OpenAI-compatible completion request, passed through to the upstream
/// inference engine verbatim (spec GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionsRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// The OpenAI-compatible completion (or streaming delta) object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionsResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    pub choices: Vec<CompletionsChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionsChoice {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
