//! The Agent's HTTP bridge to the local upstream inference engine.
//!
//! Grounded line-for-line on `examples/original_source/agent/openai.go`:
//! `queryModels` becomes [`query_models`], `handleCompletions` becomes
//! [`handle_completions`], including the `data: ` prefix strip, the
//! `[DONE]` sentinel skip, and the trailing `completions_done` frame.

use std::sync::Arc;

use futures_util::TryStreamExt;
use serde_json::json;
use tokio::io::AsyncBufReadExt;

use crate::config::AgentConfig;
use crate::envelope::{CompletionsRequest, Envelope, ListModelsResponse, MessageBus, MessageKind, Model};
use crate::error::AgentError;

/// `GET /v1/models` against the upstream engine at agent startup.
pub async fn query_models(
    client: &reqwest::Client,
    config: &AgentConfig,
) -> Result<Vec<Model>, AgentError> {
    let endpoint = format!("{}/v1/models", config.inference.trim_end_matches('/'));
    let mut request = client.get(&endpoint);
    if let Some(auth) = &config.inference_authorization {
        request = request.header(reqwest::header::AUTHORIZATION, auth);
    }

    let response = request
        .send()
        .await
        .map_err(|e| AgentError::Handshake(format!("failed to query upstream models: {e}")))?;

    if !response.status().is_success() {
        return Err(AgentError::Upstream(response.status()));
    }

    let models: ListModelsResponse = response
        .json()
        .await
        .map_err(|e| AgentError::Handshake(format!("failed to decode models response: {e}")))?;
    Ok(models.data)
}

/// Handles one `completions_request` frame: POSTs it upstream and streams
/// (or forwards in one shot) the reply back onto the bus under the same
/// correlation id. Spawned as an independent task per request so a slow
/// completion never blocks the next one (spec §4.3's "work loop").
pub async fn handle_completions(
    client: reqwest::Client,
    config: Arc<AgentConfig>,
    bus: Arc<MessageBus>,
    request_id: String,
    req: CompletionsRequest,
) {
    let endpoint = format!("{}/v1/completions", config.inference.trim_end_matches('/'));
    let mut http_req = client.post(&endpoint).json(&req);
    if let Some(auth) = &config.inference_authorization {
        http_req = http_req.header(reqwest::header::AUTHORIZATION, auth);
    }

    let response = match http_req.send().await {
        Ok(resp) => resp,
        Err(e) => {
            log::warn!("failed to send completions request upstream: {e}");
            return;
        }
    };

    if !response.status().is_success() {
        // Acknowledged weakness (spec §4.3/§9): no failure frame is sent,
        // the Hub hangs on this id until the HTTP client's context cancels.
        log::warn!("upstream returned unexpected status: {}", response.status());
        return;
    }

    if !req.stream {
        match response.json::<serde_json::Value>().await {
            Ok(body) => send_frame(&bus, &request_id, body).await,
            Err(e) => log::warn!("failed to decode upstream completion: {e}"),
        }
        return;
    }

    stream_completions(&bus, &request_id, response).await;
}

async fn stream_completions(bus: &Arc<MessageBus>, request_id: &str, response: reqwest::Response) {
    let byte_stream = response
        .bytes_stream()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
    let reader = tokio_util::io::StreamReader::new(byte_stream);
    let mut lines = tokio::io::BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::warn!("failed to read upstream response body: {e}");
                break;
            }
        };

        let Some(payload) = line.strip_prefix("data: ") else {
            continue;
        };
        if payload == "[DONE]" {
            break;
        }

        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => send_frame(bus, request_id, value).await,
            Err(e) => log::warn!("skipping unparseable upstream chunk: {e}"),
        }
    }

    let done = Envelope::with_id(MessageKind::CompletionsDone, request_id, json!("done"));
    if let Err(e) = bus.send(&done).await {
        log::warn!("failed to send completions_done: {e}");
    }
}

async fn send_frame(bus: &Arc<MessageBus>, request_id: &str, message: serde_json::Value) {
    let frame = Envelope::with_id(MessageKind::CompletionsResponse, request_id, message);
    if let Err(e) = bus.send(&frame).await {
        log::warn!("failed to send completions_response: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(base: &str) -> AgentConfig {
        AgentConfig {
            hub: "127.0.0.1:9090".to_string(),
            inference: base.to_string(),
            inference_authorization: None,
            name: "test-worker".to_string(),
        }
    }

    #[tokio::test]
    async fn query_models_decodes_the_model_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"id": "gpt-2", "object": "model", "created": 0, "owned_by": "openai"}],
            })))
            .mount(&server)
            .await;

        let config = config_for(&server.uri());
        let client = reqwest::Client::new();
        let models = query_models(&client, &config).await.expect("models");
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "gpt-2");
    }

    #[tokio::test]
    async fn query_models_reports_non_200_as_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = config_for(&server.uri());
        let client = reqwest::Client::new();
        let err = query_models(&client, &config).await.unwrap_err();
        assert!(matches!(err, AgentError::Upstream(_)));
    }
}
