//! End-to-end scenarios against real adapters, wire-mocked at the HTTP layer.

use llm_router::{
    CompletionRequest, ComplexityTier, FinishReason, Message, ProviderConfig, ProviderKind,
    RequestMetadata, Router, RouterConfig, RoutingStrategy, CancelToken,
};
use serde_json::json;
use std::collections::HashMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry(config: &mut RouterConfig) {
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 2;
}

#[tokio::test]
async fn happy_path_single_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 2, "completion_tokens": 3, "total_tokens": 5},
        })))
        .mount(&server)
        .await;

    let config = RouterConfig::new(vec![
        ProviderConfig::new("a", ProviderKind::Groq)
            .with_api_key("gsk-test")
            .with_base_url(server.uri()),
    ]);
    let mut router = Router::new(config);
    router.initialize().await.unwrap();

    let request = CompletionRequest::new(vec![Message::user("hi")])
        .with_model("llama-3.1-8b-instant");
    let response = router.complete(&request).await.unwrap();

    assert_eq!(response.content, "hello");
    assert_eq!(response.provider, "a");
    assert!(!response.metadata.fallback_used);
    assert_eq!(response.usage.total, 5);
    assert_eq!(response.finish_reason, FinishReason::Stop);

    let metrics = router.get_metrics();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.successful_requests, 1);
    assert_eq!(metrics.total_tokens, 5);
    assert_eq!(metrics.average_latency_ms, response.latency_ms as f64);
}

#[tokio::test]
async fn fallback_on_rate_limit() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limit exceeded"))
        .mount(&server_a)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "ok"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2},
        })))
        .mount(&server_b)
        .await;

    let mut config = RouterConfig::new(vec![
        ProviderConfig::new("a", ProviderKind::Groq)
            .with_api_key("gsk-a")
            .with_base_url(server_a.uri())
            .with_priority(1),
        ProviderConfig::new("b", ProviderKind::Groq)
            .with_api_key("gsk-b")
            .with_base_url(server_b.uri())
            .with_priority(2),
    ]);
    config.retry.max_retries = 1;
    fast_retry(&mut config);

    let mut router = Router::new(config);
    router.initialize().await.unwrap();

    let request = CompletionRequest::new(vec![Message::user("hi")]);
    let response = router.complete(&request).await.unwrap();

    assert_eq!(response.provider, "b");
    assert_eq!(response.content, "ok");
    assert!(response.metadata.fallback_used);
    assert!(response
        .metadata
        .fallback_reason
        .as_deref()
        .unwrap_or("")
        .contains("rate limit"));

    let metrics = router.get_metrics();
    assert_eq!(metrics.successful_requests, 1);
    assert_eq!(metrics.failed_requests, 0);
    let health = router.health_check().await;
    assert!(health.contains_key("a"));
    assert!(health.contains_key("b"));
}

#[tokio::test]
async fn all_providers_fail_returns_aggregate_error() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server_a)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server_b)
        .await;

    let mut config = RouterConfig::new(vec![
        ProviderConfig::new("a", ProviderKind::Groq)
            .with_api_key("gsk-a")
            .with_base_url(server_a.uri())
            .with_priority(1),
        ProviderConfig::new("b", ProviderKind::Groq)
            .with_api_key("gsk-b")
            .with_base_url(server_b.uri())
            .with_priority(2),
    ]);
    config.retry.max_retries = 0;
    fast_retry(&mut config);

    let mut router = Router::new(config);
    router.initialize().await.unwrap();

    let request = CompletionRequest::new(vec![Message::user("hi")]);
    let err = router.complete(&request).await.unwrap_err();

    assert_eq!(err.code, llm_router::ErrorCode::ProviderUnavailable);
    let metrics = router.get_metrics();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.successful_requests, 0);
    assert_eq!(metrics.failed_requests, 1);
}

#[tokio::test]
async fn complexity_routing_prefers_quality_tier_provider() {
    let quality = MockServer::start().await;
    let cheap = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "detailed answer"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30},
        })))
        .mount(&quality)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "should not be used"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2},
        })))
        .mount(&cheap)
        .await;

    let mut config = RouterConfig::new(vec![
        ProviderConfig::new("quality", ProviderKind::Groq)
            .with_api_key("gsk-quality")
            .with_base_url(quality.uri()),
        ProviderConfig::new("cheap", ProviderKind::Groq)
            .with_api_key("gsk-cheap")
            .with_base_url(cheap.uri()),
    ]);
    config.routing_strategy = RoutingStrategy::Complexity;
    let mut tiers = HashMap::new();
    tiers.insert(ComplexityTier::Complex, vec!["quality".to_string()]);
    config.complexity_tiers = tiers;

    let mut router = Router::new(config);
    router.initialize().await.unwrap();

    let long_text = format!("```\n{}\n```", "x".repeat(15_000));
    let request = CompletionRequest::new(vec![Message::user(long_text)]);
    let response = router.complete(&request).await.unwrap();

    assert_eq!(response.provider, "quality");
    assert_eq!(response.content, "detailed answer");
}

#[tokio::test]
async fn cancellation_stops_stream_before_further_chunks() {
    let server = MockServer::start().await;
    let sse_body = "data: {\"choices\":[{\"delta\":{\"content\":\"he\"}}]}\n\n\
                     data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n\n\
                     data: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let config = RouterConfig::new(vec![
        ProviderConfig::new("a", ProviderKind::Groq)
            .with_api_key("gsk-a")
            .with_base_url(server.uri()),
    ]);
    let mut router = Router::new(config);
    router.initialize().await.unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();

    let request = CompletionRequest::new(vec![Message::user("hi")]);
    let chunks = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let chunks_clone = chunks.clone();
    let response = router
        .stream(&request, move |c: &str| chunks_clone.lock().unwrap().push(c.to_string()), cancel)
        .await
        .unwrap();

    assert_eq!(response.finish_reason, FinishReason::Cancelled);
    assert!(chunks.lock().unwrap().is_empty());

    let metrics = router.get_metrics();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.successful_requests, 0);
    assert_eq!(metrics.failed_requests, 1);
}

#[tokio::test]
async fn vision_request_fails_immediately_without_capable_provider() {
    let server = MockServer::start().await;
    // No mock registered: if the router ever called out to this server the test
    // would fail on an unexpected request, proving no retry was attempted.

    let config = RouterConfig::new(vec![
        ProviderConfig::new("local", ProviderKind::Ollama).with_base_url(server.uri()),
    ]);
    let mut router = Router::new(config);
    router.initialize().await.unwrap();

    let request = CompletionRequest::new(vec![Message::user("describe this")]).with_metadata(RequestMetadata {
        requires_vision: true,
        ..Default::default()
    });
    let images = vec![llm_router::ImagePart {
        media_type: llm_router::ImageMediaType::Png,
        data: "Zm9v".to_string(),
    }];

    let err = router
        .complete_with_vision(&request, images)
        .await
        .unwrap_err();

    assert_eq!(err.code, llm_router::ErrorCode::ProviderUnavailable);
    let metrics = router.get_metrics();
    assert_eq!(metrics.total_requests, 0);
}
