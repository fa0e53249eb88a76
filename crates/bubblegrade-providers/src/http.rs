//! Request plumbing shared by the HTTP recognizers.

use base64::{engine::general_purpose::STANDARD, Engine};

use bubblegrade_core::error::RecognitionError;
use bubblegrade_core::image::SheetImage;

pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Build the HTTP client every recognizer uses.
pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .expect("failed to build HTTP client")
}

/// Base64 payload of the image for inline embedding.
pub(crate) fn encode_image(image: &SheetImage) -> String {
    STANDARD.encode(&image.bytes)
}

/// Send a prepared request and map transport and HTTP failures.
///
/// `error_message` pulls the human-readable message out of the provider's
/// error body, if it has the provider's shape.
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    model: &str,
    error_message: fn(&str) -> Option<String>,
) -> Result<reqwest::Response, RecognitionError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            RecognitionError::Timeout(DEFAULT_TIMEOUT_SECS)
        } else {
            RecognitionError::NetworkError(e.to_string())
        }
    })?;

    let status = response.status().as_u16();
    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5)
            * 1000;
        return Err(RecognitionError::RateLimited {
            retry_after_ms: retry_after,
        });
    }
    if status == 401 || status == 403 {
        let body = response.text().await.unwrap_or_default();
        return Err(RecognitionError::AuthenticationFailed(
            error_message(&body).unwrap_or(body),
        ));
    }
    if status == 404 {
        return Err(RecognitionError::ModelNotFound(model.to_string()));
    }
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or(body);
        return Err(RecognitionError::ApiError { status, message });
    }
    Ok(response)
}

/// Decode a successful response body.
pub(crate) async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, RecognitionError> {
    response
        .json()
        .await
        .map_err(|e| RecognitionError::MalformedResponse(format!("failed to parse response: {e}")))
}

/// Extract `error.message` from the common `{"error": {"message": ...}}` shape.
pub(crate) fn nested_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}
