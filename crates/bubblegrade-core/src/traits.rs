//! Core trait definitions for sheet recognition services.
//!
//! Implemented by the `bubblegrade-providers` crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RecognitionError;
use crate::image::SheetImage;
use crate::model::SheetLayout;

/// Trait for multimodal backends that read answers off a sheet image.
///
/// One call is one attempt; retrying is left to the person capturing.
#[async_trait]
pub trait SheetRecognizer: Send + Sync {
    /// Human-readable provider name (e.g. "gemini").
    fn name(&self) -> &str;

    /// Send the image and return the raw structured reply.
    async fn recognize(
        &self,
        request: &RecognizeRequest,
    ) -> Result<RecognizeResponse, RecognitionError>;

    /// List models this provider can use for recognition.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Request to read one sheet.
#[derive(Debug, Clone)]
pub struct RecognizeRequest {
    /// Model identifier (e.g. "gemini-2.5-flash").
    pub model: String,
    /// The captured sheet.
    pub image: SheetImage,
    /// Layout used to build the prompt and response schema.
    pub layout: SheetLayout,
    /// Ask for pixel coordinates of each mark.
    pub request_locations: bool,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Raw reply from a recognition service, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeResponse {
    /// The reply text, expected to hold a JSON object.
    pub content: String,
    /// Model that actually answered.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub estimated_cost_usd: f64,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
    /// Cost per 1K input tokens in USD.
    pub cost_per_1k_input: f64,
    /// Cost per 1K output tokens in USD.
    pub cost_per_1k_output: f64,
}

impl ModelInfo {
    /// Estimate the cost of a request from its token counts.
    pub fn estimate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 * self.cost_per_1k_input
            + completion_tokens as f64 * self.cost_per_1k_output)
            / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_estimate() {
        let info = ModelInfo {
            id: "m".into(),
            name: "M".into(),
            provider: "p".into(),
            max_context: 1000,
            cost_per_1k_input: 0.5,
            cost_per_1k_output: 1.0,
        };
        let cost = info.estimate_cost(2000, 1000);
        assert!((cost - 2.0).abs() < f64::EPSILON);
    }
}
