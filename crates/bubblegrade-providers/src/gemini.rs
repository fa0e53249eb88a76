//! Google Gemini recognizer (the default backend).

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

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini `generateContent` recognizer using structured JSON output.
pub struct GeminiRecognizer {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiRecognizer {
    pub fn new(api_key: &str, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: http::client(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum GeminiPart {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: GeminiUsage,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiReplyContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Deserialize)]
struct GeminiReplyPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[async_trait]
impl SheetRecognizer for GeminiRecognizer {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip(self, request), fields(model = %request.model, source = %request.image.source))]
    async fn recognize(
        &self,
        request: &RecognizeRequest,
    ) -> Result<RecognizeResponse, RecognitionError> {
        let start = Instant::now();

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![
                    GeminiPart::InlineData {
                        inline_data: InlineData {
                            mime_type: request.image.mime_type.clone(),
                            data: http::encode_image(&request.image),
                        },
                    },
                    GeminiPart::Text {
                        text: recognition_prompt(&request.layout, request.request_locations),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: response_schema(
                    &request.layout,
                    request.request_locations,
                    SchemaDialect::Gemini,
                ),
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, request.model
        );
        let response = http::send(
            self.client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .header("content-type", "application/json")
                .json(&body),
            &request.model,
            http::nested_error_message,
        )
        .await?;
        let api_response: GeminiResponse = http::decode(response).await?;

        let latency_ms = start.elapsed().as_millis() as u64;

        let candidate = api_response.candidates.first().ok_or_else(|| {
            let reason = api_response
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.block_reason.clone())
                .unwrap_or_else(|| "no candidates".to_string());
            RecognitionError::MalformedResponse(format!("empty reply: {reason}"))
        })?;
        let content: String = candidate
            .content
            .as_ref()
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default();
        if content.trim().is_empty() {
            let reason = candidate.finish_reason.as_deref().unwrap_or("unknown");
            return Err(RecognitionError::MalformedResponse(format!(
                "reply has no text (finish reason: {reason})"
            )));
        }

        let usage = &api_response.usage_metadata;
        let total_tokens = if usage.total_token_count > 0 {
            usage.total_token_count
        } else {
            usage.prompt_token_count + usage.candidates_token_count
        };
        let estimated_cost = self
            .available_models()
            .iter()
            .find(|m| request.model.starts_with(&m.id))
            .map(|m| m.estimate_cost(usage.prompt_token_count, usage.candidates_token_count))
            .unwrap_or(0.0);

        Ok(RecognizeResponse {
            content,
            model: api_response
                .model_version
                .clone()
                .unwrap_or_else(|| request.model.clone()),
            token_usage: TokenUsage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
                total_tokens,
                estimated_cost_usd: estimated_cost,
            },
            latency_ms,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "gemini-2.5-flash".into(),
                name: "Gemini 2.5 Flash".into(),
                provider: "gemini".into(),
                max_context: 1_048_576,
                cost_per_1k_input: 0.0003,
                cost_per_1k_output: 0.0025,
            },
            ModelInfo {
                id: "gemini-2.5-pro".into(),
                name: "Gemini 2.5 Pro".into(),
                provider: "gemini".into(),
                max_context: 1_048_576,
                cost_per_1k_input: 0.00125,
                cost_per_1k_output: 0.01,
            },
            ModelInfo {
                id: "gemini-2.0-flash".into(),
                name: "Gemini 2.0 Flash".into(),
                provider: "gemini".into(),
                max_context: 1_048_576,
                cost_per_1k_input: 0.0001,
                cost_per_1k_output: 0.0004,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bubblegrade_core::image::SheetImage;
    use bubblegrade_core::model::SheetLayout;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

    fn request() -> RecognizeRequest {
        RecognizeRequest {
            model: "gemini-2.5-flash".into(),
            image: SheetImage {
                bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
                mime_type: "image/jpeg".into(),
                source: "sheet.jpg".into(),
            },
            layout: SheetLayout::new(4, 2),
            request_locations: false,
            max_tokens: 1024,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn successful_recognition() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "{\"1\":\"A\",\"2\":\"N/A\",\"3\":\"MULTIPLE\",\"4\":\"D\"}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 1200, "candidatesTokenCount": 40, "totalTokenCount": 1240},
            "modelVersion": "gemini-2.5-flash"
        });

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": {"responseMimeType": "application/json"},
                "contents": [{"parts": [{"inlineData": {"mimeType": "image/jpeg", "data": "/9j/4A=="}}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let recognizer = GeminiRecognizer::new("test-key", Some(server.uri()));
        let response = recognizer.recognize(&request()).await.unwrap();
        assert!(response.content.contains("\"3\":\"MULTIPLE\""));
        assert_eq!(response.token_usage.prompt_tokens, 1200);
        assert_eq!(response.token_usage.total_tokens, 1240);
        assert!(response.token_usage.estimated_cost_usd > 0.0);
    }

    #[tokio::test]
    async fn blocked_prompt_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [],
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&server)
            .await;

        let recognizer = GeminiRecognizer::new("test-key", Some(server.uri()));
        let err = recognizer.recognize(&request()).await.unwrap_err();
        assert!(matches!(err, RecognitionError::MalformedResponse(ref m) if m.contains("SAFETY")));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn api_error_message_is_extracted() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": 400, "message": "Request payload size exceeds the limit", "status": "INVALID_ARGUMENT"}
            })))
            .mount(&server)
            .await;

        let recognizer = GeminiRecognizer::new("test-key", Some(server.uri()));
        let err = recognizer.recognize(&request()).await.unwrap_err();
        match err {
            RecognitionError::ApiError { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("payload size"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn forbidden_is_authentication_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let recognizer = GeminiRecognizer::new("bad-key", Some(server.uri()));
        let err = recognizer.recognize(&request()).await.unwrap_err();
        assert!(err.to_string().contains("authentication"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn rate_limiting() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let recognizer = GeminiRecognizer::new("test-key", Some(server.uri()));
        let err = recognizer.recognize(&request()).await.unwrap_err();
        assert_eq!(err.retry_after_ms(), Some(7000));
    }

    #[tokio::test]
    async fn unknown_model() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let recognizer = GeminiRecognizer::new("test-key", Some(server.uri()));
        let err = recognizer.recognize(&request()).await.unwrap_err();
        assert!(matches!(err, RecognitionError::ModelNotFound(ref m) if m == "gemini-2.5-flash"));
    }
}
