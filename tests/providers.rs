use base64::{engine::general_purpose::STANDARD, Engine as _};
use flyergen::providers::{
    FalIdeogramProvider, FalQwenProvider, HuggingFaceProvider, IdeogramProvider, QwenProvider,
};
use flyergen::{
    AspectRatio, ErrorCode, GenerationRequest, ImageProvider, ProviderConfig, ProviderType,
    QualityTier,
};
use httpmock::{
    Method::{GET, POST},
    MockServer,
};
use reqwest::Client;
use serde_json::json;

const PNG: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, b'I', b'H', b'D', b'R',
];
const JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
const WEBP: &[u8] = b"RIFF\x24\x00\x00\x00WEBPVP8 ";

fn config(provider: ProviderType, key: &str, server: &MockServer) -> ProviderConfig {
    ProviderConfig::new(provider)
        .with_api_key(key)
        .with_base_url(server.base_url())
}

#[tokio::test]
async fn ideogram_round_trip_returns_downloaded_bytes() {
    let server = MockServer::start_async().await;
    let generate = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/ideogram-v3/generate")
                .header("api-key", "ideo-key")
                .body_includes("name=\"prompt\"")
                .body_includes("Spring fair at the community garden")
                .body_includes("name=\"aspect_ratio\"")
                .body_includes("9x16")
                .body_includes("DEFAULT");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "created": "2026-03-01T10:00:00Z",
                        "data": [{
                            "url": server.url("/ephemeral/flyer.png"),
                            "seed": 4242,
                            "resolution": "736x1312",
                            "is_image_safe": true,
                            "style_type": "DESIGN",
                        }]
                    })
                    .to_string(),
                );
        })
        .await;
    let download = server
        .mock_async(|when, then| {
            when.method(GET).path("/ephemeral/flyer.png");
            then.status(200).header("content-type", "image/png").body(PNG);
        })
        .await;

    let provider = IdeogramProvider::new(
        config(ProviderType::Ideogram, "ideo-key", &server),
        Client::new(),
    );
    let request = GenerationRequest::new("Spring fair at the community garden")
        .with_aspect_ratio(AspectRatio::Portrait9x16)
        .with_quality(QualityTier::Fast)
        .with_style("flyer");

    let result = provider.generate_image(&request).await.unwrap();

    generate.assert_async().await;
    download.assert_async().await;
    assert_eq!(result.image_data, PNG);
    assert_eq!(result.mime_type, "image/png");
    assert_eq!(result.provider, ProviderType::Ideogram);
    assert_eq!(result.seed, Some(4242));
    assert_eq!((result.metadata.width, result.metadata.height), (736, 1312));
    // Fast on a tall ratio is rendered and billed at standard.
    assert_eq!(result.metadata.quality, QualityTier::Standard);
    assert_eq!(result.cost, 0.06);
}

#[tokio::test]
async fn hugging_face_binary_body_keeps_vendor_content_type() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/models/black-forest-labs/FLUX.1-schnell")
                .header("authorization", "Bearer hf-key")
                .body_includes("\"inputs\":\"Halloween costume party\"")
                .body_includes("\"width\":1760")
                .body_includes("\"height\":992")
                .body_includes("\"seed\":7");
            then.status(200).header("content-type", "image/jpeg").body(JPEG);
        })
        .await;

    let provider = HuggingFaceProvider::new(
        config(ProviderType::HuggingFace, "hf-key", &server),
        Client::new(),
    );
    let request = GenerationRequest::new("Halloween costume party")
        .with_aspect_ratio(AspectRatio::Landscape16x9)
        .with_seed(7);

    let result = provider.generate_image(&request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(result.image_data, JPEG);
    assert_eq!(result.mime_type, "image/jpeg");
    assert_eq!(result.file_extension(), "jpg");
    assert_eq!(result.seed, Some(7));
}

#[tokio::test]
async fn qwen_drops_seed_instead_of_failing() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/models/Qwen/Qwen-Image");
            then.status(200).header("content-type", "image/png").body(PNG);
        })
        .await;

    let provider = QwenProvider::new(
        config(ProviderType::Qwen, "qwen-key", &server),
        Client::new(),
    );
    let request = GenerationRequest::new("Farmers market opening day").with_seed(99);

    let result = provider.generate_image(&request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(result.provider, ProviderType::Qwen);
    assert_eq!(result.seed, None);
    assert_eq!(result.image_data, PNG);
}

#[tokio::test]
async fn fal_qwen_decodes_data_uri_without_second_request() {
    let server = MockServer::start_async().await;
    let data_uri = format!("data:image/png;base64,{}", STANDARD.encode(PNG));
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/fal-ai/qwen-image")
                .header("authorization", "Key fal-key")
                .body_includes("\"image_size\"")
                .body_includes("\"num_inference_steps\":30")
                .body_includes("\"sync_mode\":true");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "images": [{
                            "url": data_uri,
                            "width": 1184,
                            "height": 1480,
                            "content_type": "image/png"
                        }],
                        "seed": 31337,
                        "timings": {"inference": 2.1},
                        "has_nsfw_concepts": [false],
                        "prompt": "Book club mixer"
                    })
                    .to_string(),
                );
        })
        .await;

    let provider = FalQwenProvider::new(
        config(ProviderType::FalQwen, "fal-key", &server),
        Client::new(),
    );
    let request = GenerationRequest::new("Book club mixer")
        .with_aspect_ratio(AspectRatio::Portrait4x5)
        .with_option("sync_mode", json!(true));

    let result = provider.generate_image(&request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(result.image_data, PNG);
    assert_eq!(result.mime_type, "image/png");
    assert_eq!(result.seed, Some(31337));
    assert_eq!((result.metadata.width, result.metadata.height), (1184, 1480));
    assert_eq!(result.provider_data["timings"]["inference"], json!(2.1));
}

#[tokio::test]
async fn fal_ideogram_downloads_from_cdn_url() {
    let server = MockServer::start_async().await;
    let generate = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/fal-ai/ideogram/v3")
                .header("authorization", "Key fal-key")
                .body_includes("\"rendering_speed\":\"BALANCED\"")
                .body_includes("\"width\":1048")
                .body_includes("\"height\":1672");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "images": [{ "url": server.url("/cdn/out.webp") }],
                        "seed": 5
                    })
                    .to_string(),
                );
        })
        .await;
    let download = server
        .mock_async(|when, then| {
            when.method(GET).path("/cdn/out.webp");
            then.status(200).header("content-type", "image/webp").body(WEBP);
        })
        .await;

    let provider = FalIdeogramProvider::new(
        config(ProviderType::FalIdeogram, "fal-key", &server),
        Client::new(),
    );
    let request = GenerationRequest::new("Charity 5k run")
        .with_aspect_ratio(AspectRatio::Portrait10x16)
        .with_quality(QualityTier::Fast);

    let result = provider.generate_image(&request).await.unwrap();

    generate.assert_async().await;
    download.assert_async().await;
    assert_eq!(result.image_data, WEBP);
    assert_eq!(result.mime_type, "image/webp");
    assert_eq!(result.file_extension(), "webp");
    assert_eq!((result.metadata.width, result.metadata.height), (1048, 1672));
}

#[tokio::test]
async fn vendor_statuses_map_to_error_codes() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/models/black-forest-labs/FLUX.1-schnell");
            then.status(429)
                .header("content-type", "application/json")
                .body(r#"{"error":"Rate limit reached, slow down"}"#);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/ideogram-v3/generate");
            then.status(401)
                .header("content-type", "application/json")
                .body(r#"{"message":"Invalid API key"}"#);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/fal-ai/qwen-image");
            then.status(403)
                .header("content-type", "application/json")
                .body(r#"{"detail":"User is locked. Reason: Exhausted balance, quota exceeded"}"#);
        })
        .await;

    let hf = HuggingFaceProvider::new(
        config(ProviderType::HuggingFace, "hf", &server),
        Client::new(),
    );
    let err = hf.generate_image(&GenerationRequest::new("x")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::RateLimited);
    assert!(err.retryable);
    assert_eq!(err.provider, Some(ProviderType::HuggingFace));
    assert!(err.message.contains("Rate limit reached"));

    let ideogram = IdeogramProvider::new(
        config(ProviderType::Ideogram, "bad", &server),
        Client::new(),
    );
    let err = ideogram
        .generate_image(&GenerationRequest::new("x"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidApiKey);
    assert!(!err.retryable);

    let fal = FalQwenProvider::new(config(ProviderType::FalQwen, "fal", &server), Client::new());
    let err = fal.generate_image(&GenerationRequest::new("x")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::QuotaExceeded);
}

#[tokio::test]
async fn json_where_image_expected_is_a_generation_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/models/black-forest-labs/FLUX.1-schnell");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"error":"unexpected"}"#);
        })
        .await;

    let hf = HuggingFaceProvider::new(
        config(ProviderType::HuggingFace, "hf", &server),
        Client::new(),
    );
    let err = hf.generate_image(&GenerationRequest::new("x")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::GenerationFailed);
    assert!(!err.retryable);
}

#[tokio::test]
async fn invalid_requests_never_reach_the_vendor() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/ideogram-v3/generate");
            then.status(500);
        })
        .await;

    let provider = IdeogramProvider::new(
        config(ProviderType::Ideogram, "k", &server),
        Client::new(),
    );

    let err = provider
        .generate_image(&GenerationRequest::new("a".repeat(4001)))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PromptTooLong);

    let err = provider
        .generate_image(&GenerationRequest::new("x").with_aspect_ratio(AspectRatio::Portrait5x7))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::UnsupportedAspectRatio);

    mock.assert_calls_async(0).await;
}
