//! End-to-end coverage reproducing spec.md §8's six literal scenarios: an
//! empty hub, an agent registering, a non-streaming completion, a 503 for
//! an unknown model, a streaming completion, and agent disconnect cleanup.
//!
//! Grounded on `examples/original_source/tests/e2e_test.go`'s `TestE2E`
//! shape (dummy inference server + real hub + real agent over a real
//! socket), rebuilt with `wiremock` standing in for the upstream inference
//! engine and a real `routehub::hub::Hub` bound to an ephemeral port.

use routehub::config::AgentConfig;
use routehub::envelope::ListModelsResponse;
use routehub::hub::{liveness, Hub};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn start_hub() -> (std::sync::Arc<Hub>, std::net::SocketAddr) {
    let (hub, listener) = Hub::bind("127.0.0.1:0").await.expect("bind hub");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(liveness::run(hub.clone(), hub.cancel.child_token()));
    let router = hub.clone().into_router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve hub");
    });
    (hub, addr)
}

async fn start_dummy_inference_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{"id": "gpt-2", "object": "model", "created": 0, "owned_by": "openai"}],
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(body_string_contains("\"stream\":true"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "lmrouter is a language model router"
                .split(' ')
                .map(|token| {
                    format!(
                        "data: {}\n",
                        json!({
                            "id": "cmpl-0000",
                            "object": "text_completion",
                            "created": 0,
                            "choices": [{"index": 0, "finish_reason": null, "text": token}],
                        })
                    )
                })
                .collect::<String>(),
            "text/event-stream",
        ))
        .priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cmpl-0000",
            "object": "text_completion",
            "created": 0,
            "choices": [{"index": 0, "finish_reason": "length", "text": "Hello, world!"}],
        })))
        .priority(5)
        .mount(&server)
        .await;

    server
}

#[tokio::test]
async fn empty_hub_reports_no_workers_and_no_models() {
    let (_hub, addr) = start_hub().await;
    let client = reqwest::Client::new();

    let workers: serde_json::Value = client
        .get(format!("http://{addr}/internal/v1/workers"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(workers, json!([]));

    let models: ListModelsResponse = client
        .get(format!("http://{addr}/v1/models"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(models.data.len(), 0);
}

#[tokio::test]
async fn full_lifecycle_register_complete_stream_and_disconnect() {
    let (_hub, addr) = start_hub().await;
    let inference = start_dummy_inference_server().await;
    let client = reqwest::Client::new();

    let agent_shutdown = CancellationToken::new();
    let agent_config = AgentConfig {
        hub: addr.to_string(),
        inference: inference.uri(),
        inference_authorization: None,
        name: "test-worker".to_string(),
    };
    let agent_shutdown_for_task = agent_shutdown.clone();
    let agent_task = tokio::spawn(async move {
        routehub::agent::run_agent_until(agent_config, agent_shutdown_for_task)
            .await
            .expect("agent run");
    });

    // Give the agent time to dial, handshake, and register.
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    let workers: Vec<serde_json::Value> = client
        .get(format!("http://{addr}/internal/v1/workers"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0]["info"]["worker_name"], "test-worker");
    assert_eq!(workers[0]["info"]["available_models"].as_array().unwrap().len(), 1);

    let models: ListModelsResponse = client
        .get(format!("http://{addr}/v1/models"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(models.data.len(), 1);
    assert_eq!(models.data[0].id, "gpt-2");

    // Non-streaming completion.
    let resp = client
        .post(format!("http://{addr}/v1/completions"))
        .json(&json!({"model": "gpt-2", "prompt": "Hello,"}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["choices"][0]["text"], "Hello, world!");

    // Unknown model is rejected before dispatch.
    let resp = client
        .post(format!("http://{addr}/v1/completions"))
        .json(&json!({"model": "unknown-model", "prompt": "Hello,"}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    // Streaming completion: exactly 6 SSE parts, each a decodable response.
    let resp = client
        .post(format!("http://{addr}/v1/completions"))
        .json(&json!({"model": "gpt-2", "prompt": "lmrouter is", "stream": true}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let text = resp.text().await.expect("body text");
    let parts: Vec<&str> = text
        .split("\n\n")
        .filter(|chunk| chunk.starts_with("data: "))
        .collect();
    assert_eq!(parts.len(), 6);
    for part in &parts {
        let payload = part.trim_start_matches("data: ");
        let decoded: serde_json::Value = serde_json::from_str(payload).expect("valid json chunk");
        assert!(decoded["choices"][0]["text"].is_string());
    }

    // Disconnect the agent; the registry and model index drain promptly.
    agent_shutdown.cancel();
    agent_task.await.expect("agent task");
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let workers: Vec<serde_json::Value> = client
        .get(format!("http://{addr}/internal/v1/workers"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(workers.len(), 0);

    let models: ListModelsResponse = client
        .get(format!("http://{addr}/v1/models"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(models.data.len(), 0);
}
