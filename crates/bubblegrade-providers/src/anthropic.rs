//! Anthropic Messages API recognizer.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use bubblegrade_core::error::RecognitionError;
use bubblegrade_core::schema::{recognition_prompt, response_schema, SchemaDialect};
use bubblegrade_core::traits::{
    ModelInfo, RecognizeRequest, RecognizeResponse, SheetRecognizer, TokenUsage,
};

use crate::http;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const SYSTEM_PROMPT: &str = "You read shaded bubbles on multiple-choice answer sheets. Respond ONLY with a single JSON object. Do not include explanations or markdown formatting.";

/// Anthropic recognizer. The API has no schema-constrained output here, so
/// the schema travels in the prompt and the JSON is pulled out of the text.
pub struct AnthropicRecognizer {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicRecognizer {
    pub fn new(api_key: &str, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: http::client(),
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Image { source: ImageBlockSource },
    Text { text: String },
}

#[derive(Serialize)]
struct ImageBlockSource {
    #[serde(rename = "type")]
    kind: String,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    usage: AnthropicUsage,
    model: String,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

fn prompt_with_schema(request: &RecognizeRequest) -> String {
    let schema = response_schema(
        &request.layout,
        request.request_locations,
        SchemaDialect::JsonSchema,
    );
    format!(
        "{}\n\nThe reply must be a JSON object matching this JSON Schema:\n{}",
        recognition_prompt(&request.layout, request.request_locations),
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    )
}

#[async_trait]
impl SheetRecognizer for AnthropicRecognizer {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip(self, request), fields(model = %request.model, source = %request.image.source))]
    async fn recognize(
        &self,
        request: &RecognizeRequest,
    ) -> Result<RecognizeResponse, RecognitionError> {
        let start = Instant::now();

        let body = AnthropicRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: vec![
                    ContentBlock::Image {
                        source: ImageBlockSource {
                            kind: "base64".to_string(),
                            media_type: request.image.mime_type.clone(),
                            data: http::encode_image(&request.image),
                        },
                    },
                    ContentBlock::Text {
                        text: prompt_with_schema(request),
                    },
                ],
            }],
        };

        let response = http::send(
            self.client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .json(&body),
            &request.model,
            http::nested_error_message,
        )
        .await?;
        let api_response: AnthropicResponse = http::decode(response).await?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let content: String = api_response
            .content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect();
        if content.trim().is_empty() {
            return Err(RecognitionError::MalformedResponse(
                "reply has no text content".to_string(),
            ));
        }

        let usage = &api_response.usage;
        let total_tokens = usage.input_tokens + usage.output_tokens;
        let estimated_cost = self
            .available_models()
            .iter()
            .find(|m| m.id == api_response.model || m.id == request.model)
            .map(|m| m.estimate_cost(usage.input_tokens, usage.output_tokens))
            .unwrap_or(0.0);

        Ok(RecognizeResponse {
            content,
            model: api_response.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens: usage.input_tokens,
                completion_tokens: usage.output_tokens,
                total_tokens,
                estimated_cost_usd: estimated_cost,
            },
            latency_ms,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "claude-sonnet-4-20250514".into(),
                name: "Claude Sonnet 4".into(),
                provider: "anthropic".into(),
                max_context: 200_000,
                cost_per_1k_input: 0.003,
                cost_per_1k_output: 0.015,
            },
            ModelInfo {
                id: "claude-haiku-4-5-20251001".into(),
                name: "Claude Haiku 4.5".into(),
                provider: "anthropic".into(),
                max_context: 200_000,
                cost_per_1k_input: 0.001,
                cost_per_1k_output: 0.005,
            },
        ]
    }
}
