//! Recognition error types.
//!
//! These represent failures at the boundary with the external recognition
//! service. They are defined in `bubblegrade-core` so callers can classify
//! them (retry prompt vs. configuration problem) without string matching.

use thiserror::Error;

/// Errors that can occur while reading a sheet through a recognition service.
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The service replied, but not with a usable answer mapping.
    #[error("malformed recognition response: {0}")]
    MalformedResponse(String),

    /// The captured image has no data.
    #[error("image is empty: {0}")]
    EmptyImage(String),
}

impl RecognitionError {
    /// Returns `true` if capturing again may succeed. Configuration problems
    /// (bad key, unknown model) will not go away by retrying.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RecognitionError::AuthenticationFailed(_) | RecognitionError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            RecognitionError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }

    /// Message suitable for showing to the person holding the sheet.
    pub fn user_message(&self) -> String {
        if self.is_retryable() {
            format!("Failed to process the answer sheet ({self}). Please capture it again.")
        } else {
            format!("Failed to process the answer sheet ({self}). Check the provider configuration.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(RecognitionError::Timeout(30).is_retryable());
        assert!(RecognitionError::MalformedResponse("x".into()).is_retryable());
        assert!(!RecognitionError::AuthenticationFailed("bad".into()).is_retryable());
        assert_eq!(
            RecognitionError::RateLimited {
                retry_after_ms: 5000
            }
            .retry_after_ms(),
            Some(5000)
        );
    }

    #[test]
    fn user_message_mentions_retry() {
        let msg = RecognitionError::NetworkError("reset".into()).user_message();
        assert!(msg.contains("capture it again"));
        let msg = RecognitionError::ModelNotFound("m".into()).user_message();
        assert!(msg.contains("configuration"));
    }
}
