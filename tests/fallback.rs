use flyergen::{
    AspectRatio, CancellationToken, ErrorCode, GenerationRequest, ImageProviderFactory, MapEnv,
    ProviderType,
};
use httpmock::{
    Method::{GET, POST},
    MockServer,
};
use std::sync::Arc;

const PNG: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, b'I', b'H', b'D', b'R',
];

const IDEOGRAM_PATH: &str = "/v1/ideogram-v3/generate";
const HF_PATH: &str = "/models/black-forest-labs/FLUX.1-schnell";

/// Ideogram (priority 100) ahead of Hugging Face (priority 60), both pointed
/// at the mock server, with millisecond backoff.
fn factory(server: &MockServer, extra: &[(&str, &str)]) -> ImageProviderFactory {
    let base = server.base_url();
    let env = MapEnv::from_pairs([
        ("IDEOGRAM_API_KEY", "ideo-key"),
        ("IDEOGRAM_BASE_URL", base.as_str()),
        ("HF_TOKEN", "hf-key"),
        ("HUGGINGFACE_BASE_URL", base.as_str()),
        ("IMAGE_RETRY_MAX_ATTEMPTS", "2"),
        ("IMAGE_RETRY_BASE_DELAY_MS", "1"),
        ("IMAGE_RETRY_MAX_DELAY_MS", "5"),
    ]);
    for (key, value) in extra {
        env.set(*key, *value);
    }
    ImageProviderFactory::with_env(Arc::new(env)).unwrap()
}

async fn hf_success(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST).path(HF_PATH);
            then.status(200).header("content-type", "image/png").body(PNG);
        })
        .await
}

#[tokio::test]
async fn transient_outage_retries_then_falls_back() {
    let server = MockServer::start_async().await;
    let ideogram = server
        .mock_async(|when, then| {
            when.method(POST).path(IDEOGRAM_PATH);
            then.status(503).body("upstream overloaded");
        })
        .await;
    let hf = hf_success(&server).await;

    let factory = factory(&server, &[]);
    assert_eq!(
        factory.get_available_providers(),
        vec![ProviderType::Ideogram, ProviderType::HuggingFace]
    );

    let result = factory
        .generate_image(&GenerationRequest::new("Street food festival"), None)
        .await
        .unwrap();

    ideogram.assert_calls_async(2).await;
    hf.assert_calls_async(1).await;
    assert_eq!(result.provider, ProviderType::HuggingFace);
    assert_eq!(result.image_data, PNG);

    let circuits = factory.get_circuit_status();
    assert_eq!(circuits[&ProviderType::Ideogram].failure_count, 1);
    assert_eq!(circuits[&ProviderType::HuggingFace].failure_count, 0);
}

#[tokio::test]
async fn expired_download_url_falls_back_to_next_provider() {
    let server = MockServer::start_async().await;
    let ideogram = server
        .mock_async(|when, then| {
            when.method(POST).path(IDEOGRAM_PATH);
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    serde_json::json!({
                        "data": [{ "url": server.url("/ephemeral/expired.png"), "seed": 1 }]
                    })
                    .to_string(),
                );
        })
        .await;
    let download = server
        .mock_async(|when, then| {
            when.method(GET).path("/ephemeral/expired.png");
            then.status(403).body("Request has expired");
        })
        .await;
    let hf = hf_success(&server).await;

    let factory = factory(&server, &[]);
    let result = factory
        .generate_image(&GenerationRequest::new("Neighborhood cleanup day"), None)
        .await
        .unwrap();

    assert_eq!(result.provider, ProviderType::HuggingFace);
    ideogram.assert_calls_async(1).await;
    download.assert_calls_async(1).await;
    hf.assert_calls_async(1).await;
    assert_eq!(
        factory.get_circuit_status()[&ProviderType::Ideogram].failure_count,
        1
    );
}

#[tokio::test]
async fn credential_failure_aborts_without_fallback() {
    let server = MockServer::start_async().await;
    let ideogram = server
        .mock_async(|when, then| {
            when.method(POST).path(IDEOGRAM_PATH);
            then.status(401)
                .header("content-type", "application/json")
                .body(r#"{"message":"Invalid API key"}"#);
        })
        .await;
    let hf = hf_success(&server).await;

    let factory = factory(&server, &[]);
    let err = factory
        .generate_image(&GenerationRequest::new("Open mic night"), None)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::InvalidApiKey);
    assert_eq!(err.provider, Some(ProviderType::Ideogram));
    ideogram.assert_calls_async(1).await;
    hf.assert_calls_async(0).await;
}

#[tokio::test]
async fn unsupported_ratio_moves_on_without_calling_the_vendor() {
    let server = MockServer::start_async().await;
    let ideogram = server
        .mock_async(|when, then| {
            when.method(POST).path(IDEOGRAM_PATH);
            then.status(500);
        })
        .await;
    let hf = hf_success(&server).await;

    let factory = factory(&server, &[]);
    let request =
        GenerationRequest::new("Poetry reading").with_aspect_ratio(AspectRatio::Portrait5x7);
    let result = factory.generate_image(&request, None).await.unwrap();

    assert_eq!(result.provider, ProviderType::HuggingFace);
    assert_eq!((result.metadata.width, result.metadata.height), (1120, 1568));
    ideogram.assert_calls_async(0).await;
    hf.assert_calls_async(1).await;
}

#[tokio::test]
async fn open_circuit_is_skipped_on_the_next_request() {
    let server = MockServer::start_async().await;
    let ideogram = server
        .mock_async(|when, then| {
            when.method(POST).path(IDEOGRAM_PATH);
            then.status(500).body("internal error");
        })
        .await;
    let hf = hf_success(&server).await;

    let factory = factory(&server, &[("IMAGE_CIRCUIT_FAILURE_THRESHOLD", "1")]);
    let request = GenerationRequest::new("Board game night");

    for _ in 0..2 {
        let result = factory.generate_image(&request, None).await.unwrap();
        assert_eq!(result.provider, ProviderType::HuggingFace);
    }

    // GENERATION_FAILED is not retried, and the second request never tries Ideogram.
    ideogram.assert_calls_async(1).await;
    hf.assert_calls_async(2).await;
    assert!(factory.get_circuit_status()[&ProviderType::Ideogram].open);
}

#[tokio::test]
async fn runtime_registry_changes_survive_generation() {
    let server = MockServer::start_async().await;
    let base = server.base_url();
    let qwen = server
        .mock_async(|when, then| {
            when.method(POST).path("/models/Qwen/Qwen-Image");
            then.status(200).header("content-type", "image/png").body(PNG);
        })
        .await;
    let ideogram = server
        .mock_async(|when, then| {
            when.method(POST).path(IDEOGRAM_PATH);
            then.status(500);
        })
        .await;

    let factory = factory(
        &server,
        &[
            ("QWEN_API_KEY", "qwen-key"),
            ("QWEN_BASE_URL", base.as_str()),
            ("QWEN_ENABLED", "false"),
        ],
    );
    let registry = factory.registry();
    registry.enable_provider(ProviderType::Qwen).unwrap();
    registry.set_priority(ProviderType::Ideogram, 1).unwrap();

    let result = factory
        .generate_image(&GenerationRequest::new("Chess club open night"), None)
        .await
        .unwrap();

    assert_eq!(result.provider, ProviderType::Qwen);
    qwen.assert_calls_async(1).await;
    ideogram.assert_calls_async(0).await;
    assert_eq!(
        factory.get_available_providers(),
        vec![
            ProviderType::Qwen,
            ProviderType::HuggingFace,
            ProviderType::Ideogram
        ]
    );
    assert_eq!(
        registry
            .get_provider_config(ProviderType::Ideogram)
            .map(|c| c.priority),
        Some(1)
    );
}

#[tokio::test]
async fn preferred_provider_is_tried_first() {
    let server = MockServer::start_async().await;
    let ideogram = server
        .mock_async(|when, then| {
            when.method(POST).path(IDEOGRAM_PATH);
            then.status(500);
        })
        .await;
    let hf = hf_success(&server).await;

    let factory = factory(&server, &[]);
    let result = factory
        .generate_image(
            &GenerationRequest::new("Trivia night"),
            Some(ProviderType::HuggingFace),
        )
        .await
        .unwrap();

    assert_eq!(result.provider, ProviderType::HuggingFace);
    ideogram.assert_calls_async(0).await;
    hf.assert_calls_async(1).await;
}

#[tokio::test]
async fn everything_failing_surfaces_the_last_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(IDEOGRAM_PATH);
            then.status(503);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(HF_PATH);
            then.status(429).body(r#"{"error":"too many requests"}"#);
        })
        .await;

    let factory = factory(&server, &[]);
    let err = factory
        .generate_image(&GenerationRequest::new("Bake sale"), None)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::RateLimited);
    assert_eq!(err.provider, Some(ProviderType::HuggingFace));
}

#[tokio::test]
async fn cancelled_request_reports_cancellation() {
    let server = MockServer::start_async().await;
    let hf = hf_success(&server).await;
    let factory = factory(&server, &[]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = factory
        .generate_image_with_cancel(&GenerationRequest::new("Yard sale"), None, &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::Cancelled);
    hf.assert_calls_async(0).await;
}

#[tokio::test]
async fn health_report_reflects_probe_results_and_last_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(IDEOGRAM_PATH);
            then.status(401).body(r#"{"message":"Invalid API key"}"#);
        })
        .await;
    let hf = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(HF_PATH)
                .body_includes("\"inputs\":\"test\"");
            then.status(200).header("content-type", "image/png").body(PNG);
        })
        .await;

    let factory = factory(&server, &[]);
    let _ = factory
        .generate_image(&GenerationRequest::new("Movie night"), None)
        .await;

    let health = factory.get_providers_health().await;
    hf.assert_calls_async(1).await;

    let ideogram = &health[&ProviderType::Ideogram];
    assert!(!ideogram.healthy);
    assert!(ideogram.available);
    assert!(ideogram
        .last_error
        .as_deref()
        .unwrap()
        .contains("INVALID_API_KEY"));

    let hugging_face = &health[&ProviderType::HuggingFace];
    assert!(hugging_face.healthy);
    assert!(!hugging_face.circuit_open);
    assert!(hugging_face.last_error.is_none());
}
