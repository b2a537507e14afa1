//! End-to-end proxy tests against a mocked upstream provider: forwarding,
//! streaming relay fidelity, and ledger settlement.

use ai_firewall::admission::RequestContext;
use ai_firewall::api::{create_router, AppState};
use ai_firewall::config::Config;
use ai_firewall::relay::SettlementGuard;
use ai_firewall::settlement::Settler;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use budget_ledger::{InMemoryLedger, SpendLedger};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use token_meter::{PricingTable, TokenMeter};
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INTERNAL_KEY: &str = "test-internal-key";
const UPSTREAM_KEY: &str = "upstream-provider-key";

fn test_config(upstream_url: &str) -> Config {
    let mut config = Config::default();
    config.auth.internal_api_key = INTERNAL_KEY.into();
    config.upstream.base_url = upstream_url.into();
    config.upstream.api_key = UPSTREAM_KEY.into();
    config
}

fn test_app(config: &Config, ledger: Arc<dyn SpendLedger>) -> axum::Router {
    create_router(AppState::new(config, ledger).unwrap())
}

fn chat_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {INTERNAL_KEY}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

/// Poll the ledger until the user's spend reaches `target` (settlement is
/// detached from the response path, so it lands slightly after the body).
async fn wait_for_spend(ledger: &InMemoryLedger, target: f64) -> f64 {
    let day = Utc::now().date_naive();
    for _ in 0..200 {
        let spent = ledger.spent("default", day).await.unwrap();
        if spent > 0.0 && spent >= target - 1e-9 {
            return spent;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    ledger.spent("default", day).await.unwrap()
}

fn sse_event(json: serde_json::Value) -> String {
    format!("data: {json}\n\n")
}

#[tokio::test]
async fn test_non_streaming_forwards_and_settles_from_usage() {
    let mock_server = MockServer::start().await;

    let upstream_body = serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hello!"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 100, "completion_tokens": 200, "total_tokens": 300}
    });

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", format!("Bearer {UPSTREAM_KEY}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(&upstream_body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let app = test_app(&test_config(&mock_server.uri()), ledger.clone());

    let response = app
        .oneshot(chat_request(serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": false
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "Hello!");

    // gpt-4o: 100/1k * 0.0025 + 200/1k * 0.0100
    let expected = PricingTable::builtin().cost("gpt-4o", 100, 200);
    let spent = wait_for_spend(&ledger, expected).await;
    assert!(
        (spent - expected).abs() < 1e-9,
        "expected {expected}, ledger has {spent}"
    );
}

#[tokio::test]
async fn test_streaming_relays_bytes_verbatim() {
    let mock_server = MockServer::start().await;

    let mut sse = String::new();
    for fragment in ["Hello", ", ", "world"] {
        sse.push_str(&sse_event(serde_json::json!({
            "choices": [{"index": 0, "delta": {"content": fragment}}]
        })));
    }
    sse.push_str("data: [DONE]\n\n");

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse.clone().into_bytes(), "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let app = test_app(&test_config(&mock_server.uri()), ledger.clone());

    let response = app
        .oneshot(chat_request(serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": true
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );

    // Total bytes forwarded equal total bytes received, in order
    let relayed = body_bytes(response).await;
    assert_eq!(relayed, sse.as_bytes());

    // No usage in the stream: output tokens are estimated from the fragments
    let meter = TokenMeter::new("cl100k_base").unwrap();
    let input_tokens =
        meter.count_messages(&[serde_json::json!({"role": "user", "content": "Hi"})]);
    let output_tokens = meter.count_text("Hello, world");
    let expected = PricingTable::builtin().cost("gpt-4o", input_tokens, output_tokens);

    let spent = wait_for_spend(&ledger, expected).await;
    assert!(
        (spent - expected).abs() < 1e-9,
        "expected {expected}, ledger has {spent}"
    );
}

#[tokio::test]
async fn test_streaming_prefers_reported_usage() {
    let mock_server = MockServer::start().await;

    let mut sse = sse_event(serde_json::json!({
        "choices": [{"index": 0, "delta": {"content": "Hi there"}}]
    }));
    sse.push_str(&sse_event(serde_json::json!({
        "choices": [],
        "usage": {"prompt_tokens": 10, "completion_tokens": 40}
    })));
    sse.push_str("data: [DONE]\n\n");

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse.into_bytes(), "text/event-stream"))
        .mount(&mock_server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let app = test_app(&test_config(&mock_server.uri()), ledger.clone());

    let response = app
        .oneshot(chat_request(serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": true
        })))
        .await
        .unwrap();
    body_bytes(response).await;

    let expected = PricingTable::builtin().cost("gpt-4o", 10, 40);
    let spent = wait_for_spend(&ledger, expected).await;
    assert!((spent - expected).abs() < 1e-9);
}

#[tokio::test]
async fn test_stream_without_sentinel_still_settles() {
    let mock_server = MockServer::start().await;

    // Connection closes without data: [DONE]
    let sse = sse_event(serde_json::json!({
        "choices": [{"index": 0, "delta": {"content": "partial answer"}}]
    }));

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse.into_bytes(), "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let app = test_app(&test_config(&mock_server.uri()), ledger.clone());

    let response = app
        .oneshot(chat_request(serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": true
        })))
        .await
        .unwrap();
    body_bytes(response).await;

    let spent = wait_for_spend(&ledger, 1e-12).await;
    assert!(spent > 0.0, "abnormal stream end must still be billed");
}

#[tokio::test]
async fn test_client_disconnect_bills_partial_output() {
    // Drive the guard directly: three observed events out of a longer
    // stream, then the guard is dropped as on client disconnect.
    let ledger = Arc::new(InMemoryLedger::new());
    let meter = TokenMeter::new("cl100k_base").unwrap();
    let pricing = Arc::new(PricingTable::builtin());
    let settler = Arc::new(Settler::new(
        ledger.clone(),
        meter.clone(),
        pricing.clone(),
    ));

    let day = Utc::now().date_naive();
    let ctx = RequestContext {
        user: "default".into(),
        model: "gpt-4o".into(),
        stream: true,
        day,
        input_tokens: 10,
    };

    let mut guard = SettlementGuard::new(settler, ctx);
    for fragment in ["one ", "two ", "three"] {
        let event = sse_event(serde_json::json!({
            "choices": [{"index": 0, "delta": {"content": fragment}}]
        }));
        guard.observe(&bytes::Bytes::from(event));
    }
    drop(guard);

    let output_tokens = meter.count_text("one two three");
    let expected = pricing.cost("gpt-4o", 10, output_tokens);
    let spent = wait_for_spend(&ledger, expected).await;
    assert!(
        (spent - expected).abs() < 1e-9,
        "three observed events must be billed, not zero and not the full stream"
    );
}

#[tokio::test]
async fn test_upstream_error_status_passes_through_unbilled() {
    let mock_server = MockServer::start().await;

    let error_body = serde_json::json!({
        "error": {"message": "model overloaded", "type": "server_error"}
    });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(&error_body))
        .mount(&mock_server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let app = test_app(&test_config(&mock_server.uri()), ledger.clone());

    let response = app
        .oneshot(chat_request(serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": false
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"]["message"], "model overloaded");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let day = Utc::now().date_naive();
    assert_eq!(ledger.spent("default", day).await.unwrap(), 0.0);
}

#[tokio::test]
async fn test_unknown_model_uses_default_pricing() {
    let mock_server = MockServer::start().await;

    let upstream_body = serde_json::json!({
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}}],
        "usage": {"prompt_tokens": 1000, "completion_tokens": 1000}
    });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&upstream_body))
        .mount(&mock_server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let app = test_app(&test_config(&mock_server.uri()), ledger.clone());

    let response = app
        .oneshot(chat_request(serde_json::json!({
            "model": "mystery-9000",
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();

    // Neither tokenizer nor pricing raise on an unknown model
    assert_eq!(response.status(), StatusCode::OK);

    // Default pricing: $0.0100/1k in + $0.0300/1k out
    let expected = 0.0100 + 0.0300;
    let spent = wait_for_spend(&ledger, expected).await;
    assert!((spent - expected).abs() < 1e-9);
}

#[tokio::test]
async fn test_settlement_overshoot_blocks_next_request() {
    let mock_server = MockServer::start().await;

    // Actual cost $0.20: 20k completion tokens at gpt-4o's $0.0100/1k
    let upstream_body = serde_json::json!({
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "long answer"}}],
        "usage": {"prompt_tokens": 0, "completion_tokens": 20000}
    });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&upstream_body))
        .mount(&mock_server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let day = Utc::now().date_naive();
    ledger.record("default", day, 4.90).await.unwrap();

    let app = test_app(&test_config(&mock_server.uri()), ledger.clone());

    // Pre-flight estimate is tiny, so 4.90 + estimate < 5.00: admitted
    let response = app
        .clone()
        .oneshot(chat_request(serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Settlement pushes the entry past the cap: 4.90 + 0.20 = 5.10
    let spent = wait_for_spend(&ledger, 5.10).await;
    assert!((spent - 5.10).abs() < 1e-9, "ledger should be 5.10, got {spent}");

    // The next request is rejected even though it would cost almost nothing
    let response = app
        .oneshot(chat_request(serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "x"}]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn test_concurrent_settlements_do_not_lose_updates() {
    let mock_server = MockServer::start().await;

    // Each request costs $0.10: 10k completion tokens at $0.0100/1k
    let upstream_body = serde_json::json!({
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}}],
        "usage": {"prompt_tokens": 0, "completion_tokens": 10000}
    });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&upstream_body))
        .mount(&mock_server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let app = test_app(&test_config(&mock_server.uri()), ledger.clone());

    let request = || {
        chat_request(serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Hi"}]
        }))
    };

    // Both admitted against the same pre-update snapshot
    let (first, second) = tokio::join!(
        app.clone().oneshot(request()),
        app.clone().oneshot(request()),
    );
    assert_eq!(first.unwrap().status(), StatusCode::OK);
    assert_eq!(second.unwrap().status(), StatusCode::OK);

    // The final entry is the sum of both true costs
    let spent = wait_for_spend(&ledger, 0.20).await;
    assert!(
        (spent - 0.20).abs() < 1e-9,
        "increments must not be lost, got {spent}"
    );
}
