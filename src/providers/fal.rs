//! Fal.ai synchronous endpoint (`https://fal.run/<model>`), shared by every
//! model hosted there.

use crate::{
    config::ProviderConfig,
    error::Result,
    models::ProviderType,
    providers::{http, FetchedImage},
};
use reqwest::{header::AUTHORIZATION, Client};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(crate) struct FalResponse {
    #[serde(default)]
    pub images: Vec<FalImage>,
    pub seed: Option<u64>,
    pub timings: Option<Value>,
    pub has_nsfw_concepts: Option<Vec<bool>>,
    pub prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FalImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub content_type: Option<String>,
}

pub(crate) struct FalOutput {
    pub response: FalResponse,
    pub image: FetchedImage,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

pub(crate) async fn run(
    client: &Client,
    provider: ProviderType,
    config: &ProviderConfig,
    api_key: &str,
    model: &str,
    payload: &Value,
) -> Result<FalOutput> {
    let url = format!("{}/{}", config.endpoint_base(), model.trim_start_matches('/'));
    log::debug!("Fal.ai payload for {}: {}", model, payload);

    let response = client
        .post(&url)
        .header(AUTHORIZATION, format!("Key {}", api_key))
        .timeout(config.timeout)
        .json(payload)
        .send()
        .await
        .map_err(|e| http::transport_error(provider, e))?;

    if !response.status().is_success() {
        return Err(http::error_from_response(provider, response).await);
    }

    let mut body: FalResponse = response
        .json()
        .await
        .map_err(|e| http::malformed(provider, e))?;

    if body
        .has_nsfw_concepts
        .as_ref()
        .map_or(false, |flags| flags.first() == Some(&true))
    {
        log::warn!("⚠️  {} flagged the image as NSFW", provider);
    }

    if body.images.is_empty() {
        return Err(http::malformed(provider, "no images in response"));
    }
    let first = body.images.remove(0);

    // Sync mode returns a data URI; otherwise this is a CDN download.
    let mut image = http::fetch_image(client, provider, &first.url, config.timeout).await?;
    if let Some(reported) = first.content_type.as_deref() {
        if reported.starts_with("image/") {
            image.mime_type = reported.to_string();
        }
    }

    Ok(FalOutput {
        response: body,
        image,
        width: first.width,
        height: first.height,
    })
}
