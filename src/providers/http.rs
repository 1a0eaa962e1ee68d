//! HTTP plumbing shared by the vendor adapters: status classification,
//! transport error mapping, and turning URLs, data URIs, base64 strings and
//! raw bodies into image bytes.

use crate::error::{ErrorCode, GenerationError, Result};
use crate::models::ProviderType;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header::CONTENT_TYPE, Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

const MAX_ERROR_BODY: usize = 500;

/// The raw vendor reply behind a classified error.
#[derive(Debug, thiserror::Error)]
#[error("HTTP {status}: {body}")]
pub struct VendorHttpError {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

fn mentions_quota(lower: &str) -> bool {
    [
        "quota",
        "exhausted balance",
        "insufficient",
        "credits",
        "billing",
        "payment required",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

fn mentions_prompt_length(lower: &str) -> bool {
    lower.contains("prompt")
        && ["too long", "exceed", "maximum length", "max length", "too many"]
            .iter()
            .any(|needle| lower.contains(needle))
}

/// Pulls a human readable message out of a JSON error envelope, falling back
/// to the raw text.
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
        for key in ["error", "message", "detail"] {
            match json.get(key) {
                Some(Value::String(s)) => return s.clone(),
                Some(Value::Object(obj)) => {
                    if let Some(Value::String(s)) = obj.get("message") {
                        return s.clone();
                    }
                }
                Some(Value::Array(items)) => {
                    let joined: Vec<String> = items
                        .iter()
                        .filter_map(|item| {
                            item.get("msg")
                                .or_else(|| item.get("message"))
                                .and_then(Value::as_str)
                                .map(String::from)
                        })
                        .collect();
                    if !joined.is_empty() {
                        return joined.join("; ");
                    }
                }
                _ => {}
            }
        }
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

/// Default HTTP status → error code mapping. Adapters may special-case a
/// vendor's own signals before falling back to this.
pub fn classify_status(provider: ProviderType, status: StatusCode, body: &str) -> GenerationError {
    let lower = body.to_ascii_lowercase();
    let code = match status.as_u16() {
        401 => ErrorCode::InvalidApiKey,
        403 if mentions_quota(&lower) => ErrorCode::QuotaExceeded,
        403 => ErrorCode::Unauthorized,
        402 => ErrorCode::QuotaExceeded,
        429 if mentions_quota(&lower) => ErrorCode::QuotaExceeded,
        429 => ErrorCode::RateLimited,
        400 | 413 | 422 if mentions_prompt_length(&lower) => ErrorCode::PromptTooLong,
        400 | 422 if lower.contains("aspect") => ErrorCode::UnsupportedAspectRatio,
        400 | 413 | 422 => ErrorCode::InvalidParameters,
        408 | 504 => ErrorCode::Timeout,
        502 | 503 => ErrorCode::ServiceUnavailable,
        500..=599 => ErrorCode::GenerationFailed,
        _ if mentions_quota(&lower) => ErrorCode::QuotaExceeded,
        _ => ErrorCode::UnknownError,
    };
    // Generic 5xx keeps the retryable flag; the retry allowlist still decides.
    let retryable = code.default_retryable() || status.is_server_error();

    GenerationError::new(
        code,
        format!(
            "{} request failed ({}): {}",
            provider.display_name(),
            status.as_u16(),
            extract_error_message(body)
        ),
    )
    .with_provider(provider)
    .with_retryable(retryable)
    .with_source(VendorHttpError {
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY).collect(),
    })
}

/// Status mapping for the second hop that fetches a generated image. The
/// vendor's credentials are not involved there, so access errors from a CDN
/// or an expired signed URL never read as credential failures.
pub fn classify_download_status(
    provider: ProviderType,
    status: StatusCode,
    body: &str,
) -> GenerationError {
    let code = match status.as_u16() {
        429 => ErrorCode::RateLimited,
        408 | 504 => ErrorCode::Timeout,
        502 | 503 => ErrorCode::ServiceUnavailable,
        _ => ErrorCode::GenerationFailed,
    };
    let retryable = code.default_retryable() || status.is_server_error();

    GenerationError::new(
        code,
        format!(
            "{} image download failed ({}): {}",
            provider.display_name(),
            status.as_u16(),
            extract_error_message(body)
        ),
    )
    .with_provider(provider)
    .with_retryable(retryable)
    .with_source(VendorHttpError {
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY).collect(),
    })
}

pub fn transport_error(provider: ProviderType, err: reqwest::Error) -> GenerationError {
    let code = if err.is_timeout() {
        ErrorCode::Timeout
    } else if err.is_connect() || err.is_request() {
        ErrorCode::NetworkError
    } else if err.is_decode() || err.is_body() {
        ErrorCode::GenerationFailed
    } else {
        ErrorCode::UnknownError
    };
    GenerationError::new(
        code,
        format!("{} transport error: {}", provider.display_name(), err),
    )
    .with_provider(provider)
    .with_source(err)
}

/// Reads a failed response and classifies it.
pub async fn error_from_response(provider: ProviderType, response: Response) -> GenerationError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    log::debug!("{} returned {}: {}", provider, status, body);
    classify_status(provider, status, &body)
}

/// A success-shaped response that did not contain what we needed.
pub fn malformed(provider: ProviderType, detail: impl std::fmt::Display) -> GenerationError {
    GenerationError::new(
        ErrorCode::GenerationFailed,
        format!("{} returned an unexpected response: {}", provider.display_name(), detail),
    )
    .with_provider(provider)
    .with_retryable(false)
}

pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else {
        None
    }
}

fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|raw| raw.split(';').next().unwrap_or(raw).trim().to_ascii_lowercase())
        .filter(|mime| !mime.is_empty())
}

fn resolve_mime(reported: Option<String>, bytes: &[u8]) -> String {
    match reported {
        Some(mime) if mime.starts_with("image/") => mime,
        _ => sniff_mime(bytes).unwrap_or("image/png").to_string(),
    }
}

/// Turns a successful binary response into image bytes.
pub async fn read_image_body(provider: ProviderType, response: Response) -> Result<FetchedImage> {
    let reported = content_type(&response);
    if reported.as_deref() == Some("application/json") {
        let body = response.text().await.unwrap_or_default();
        return Err(malformed(
            provider,
            format!("expected image bytes, got JSON: {}", extract_error_message(&body)),
        ));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(provider, e))?;
    if bytes.is_empty() {
        return Err(malformed(provider, "empty image body"));
    }
    Ok(FetchedImage {
        mime_type: resolve_mime(reported, &bytes),
        bytes: bytes.to_vec(),
    })
}

pub fn decode_base64_image(
    provider: ProviderType,
    payload: &str,
    mime_hint: Option<&str>,
) -> Result<FetchedImage> {
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| malformed(provider, format!("invalid base64 image: {}", e)))?;
    if bytes.is_empty() {
        return Err(malformed(provider, "empty base64 image"));
    }
    let mime_type = match mime_hint {
        Some(mime) if mime.starts_with("image/") => mime.to_string(),
        _ => sniff_mime(&bytes).unwrap_or("image/png").to_string(),
    };
    Ok(FetchedImage { bytes, mime_type })
}

/// Decodes `data:image/png;base64,....`.
pub fn decode_data_uri(provider: ProviderType, uri: &str) -> Result<FetchedImage> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| malformed(provider, "not a data URI"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| malformed(provider, "data URI without payload"))?;
    if !header.ends_with(";base64") {
        return Err(malformed(provider, "data URI is not base64 encoded"));
    }
    let mime = header.trim_end_matches(";base64");
    decode_base64_image(provider, payload, Some(mime))
}

/// Second round trip: downloads the image a vendor pointed us at.
pub async fn fetch_image(
    client: &Client,
    provider: ProviderType,
    url: &str,
    timeout: Duration,
) -> Result<FetchedImage> {
    if url.starts_with("data:") {
        return decode_data_uri(provider, url);
    }
    log::debug!("Downloading {} image from {}", provider, url);
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        log::debug!("{} image download returned {}: {}", provider, status, body);
        return Err(classify_download_status(provider, status, &body));
    }
    read_image_body(provider, response).await
}
