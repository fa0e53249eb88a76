//! OpenAI Chat Completions recognizer.

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

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const SYSTEM_PROMPT: &str = "You read shaded bubbles on multiple-choice answer sheets and reply with JSON only.";

/// OpenAI-compatible vision recognizer with structured outputs.
pub struct OpenAiRecognizer {
    api_key: String,
    base_url: String,
    org_id: Option<String>,
    client: reqwest::Client,
}

impl OpenAiRecognizer {
    pub fn new(api_key: &str, base_url: Option<String>, org_id: Option<String>) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            org_id,
            client: http::client(),
        }
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<OpenAiMessage>,
    response_format: serde_json::Value,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
    model: String,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

/// `response_format` block. Strict mode needs every property required, which
/// the located variant (optional coordinates) does not satisfy.
fn response_format(request: &RecognizeRequest) -> serde_json::Value {
    serde_json::json!({
        "type": "json_schema",
        "json_schema": {
            "name": "answer_sheet",
            "strict": !request.request_locations,
            "schema": response_schema(
                &request.layout,
                request.request_locations,
                SchemaDialect::JsonSchema,
            ),
        }
    })
}

#[async_trait]
impl SheetRecognizer for OpenAiRecognizer {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %request.model, source = %request.image.source))]
    async fn recognize(
        &self,
        request: &RecognizeRequest,
    ) -> Result<RecognizeResponse, RecognitionError> {
        let start = Instant::now();

        let data_url = format!(
            "data:{};base64,{}",
            request.image.mime_type,
            http::encode_image(&request.image)
        );
        let body = OpenAiRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![
                OpenAiMessage {
                    role: "system".to_string(),
                    content: vec![ContentPart::Text {
                        text: SYSTEM_PROMPT.to_string(),
                    }],
                },
                OpenAiMessage {
                    role: "user".to_string(),
                    content: vec![
                        ContentPart::Text {
                            text: recognition_prompt(&request.layout, request.request_locations),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl { url: data_url },
                        },
                    ],
                },
            ],
            response_format: response_format(request),
        };

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json");
        if let Some(org) = &self.org_id {
            req = req.header("OpenAI-Organization", org);
        }

        let response =
            http::send(req.json(&body), &request.model, http::nested_error_message).await?;
        let api_response: OpenAiResponse = http::decode(response).await?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let message = api_response
            .choices
            .first()
            .map(|c| &c.message)
            .ok_or_else(|| RecognitionError::MalformedResponse("no choices in reply".into()))?;
        if let Some(refusal) = &message.refusal {
            return Err(RecognitionError::MalformedResponse(format!(
                "model refused: {refusal}"
            )));
        }
        let content = message.content.clone().unwrap_or_default();
        if content.trim().is_empty() {
            return Err(RecognitionError::MalformedResponse(
                "reply has no text content".into(),
            ));
        }

        let usage = &api_response.usage;
        let estimated_cost = self
            .available_models()
            .iter()
            .find(|m| api_response.model.starts_with(&m.id))
            .map(|m| m.estimate_cost(usage.prompt_tokens, usage.completion_tokens))
            .unwrap_or(0.0);

        Ok(RecognizeResponse {
            content,
            model: api_response.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
                estimated_cost_usd: estimated_cost,
            },
            latency_ms,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "gpt-4o".into(),
                name: "GPT-4o".into(),
                provider: "openai".into(),
                max_context: 128_000,
                cost_per_1k_input: 0.0025,
                cost_per_1k_output: 0.01,
            },
            ModelInfo {
                id: "gpt-4.1-mini".into(),
                name: "GPT-4.1 mini".into(),
                provider: "openai".into(),
                max_context: 1_047_576,
                cost_per_1k_input: 0.0004,
                cost_per_1k_output: 0.0016,
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

    fn request(request_locations: bool) -> RecognizeRequest {
        RecognizeRequest {
            model: "gpt-4o".into(),
            image: SheetImage {
                bytes: b"hello".to_vec(),
                mime_type: "image/png".into(),
                source: "sheet.png".into(),
            },
            layout: SheetLayout::new(3, 3),
            request_locations,
            max_tokens: 1024,
            temperature: 0.0,
        }
    }

    #[test]
    fn strict_only_without_locations() {
        assert_eq!(response_format(&request(false))["json_schema"]["strict"], true);
        assert_eq!(response_format(&request(true))["json_schema"]["strict"], false);
    }

    #[tokio::test]
    async fn successful_recognition() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"1\":\"A\",\"2\":\"C\",\"3\":\"N/A\"}"}}],
            "model": "gpt-4o-2024-08-06",
            "usage": {"prompt_tokens": 900, "completion_tokens": 30, "total_tokens": 930}
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "response_format": {"type": "json_schema"},
                "messages": [{}, {"content": [{"type": "text"}, {"type": "image_url", "image_url": {"url": "data:image/png;base64,aGVsbG8="}}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let recognizer = OpenAiRecognizer::new("test-key", Some(server.uri()), None);
        let response = recognizer.recognize(&request(false)).await.unwrap();
        assert!(response.content.contains("\"2\":\"C\""));
        assert_eq!(response.model, "gpt-4o-2024-08-06");
        assert_eq!(response.token_usage.total_tokens, 930);
        assert!(response.token_usage.estimated_cost_usd > 0.0);
    }

    #[tokio::test]
    async fn refusal_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": null, "refusal": "cannot help"}}],
                "model": "gpt-4o"
            })))
            .mount(&server)
            .await;

        let recognizer = OpenAiRecognizer::new("test-key", Some(server.uri()), None);
        let err = recognizer.recognize(&request(false)).await.unwrap_err();
        assert!(err.to_string().contains("cannot help"));
    }

    #[tokio::test]
    async fn organization_header_is_sent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("OpenAI-Organization", "org-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{}"}}],
                "model": "gpt-4o"
            })))
            .mount(&server)
            .await;

        let recognizer =
            OpenAiRecognizer::new("test-key", Some(server.uri()), Some("org-123".into()));
        assert!(recognizer.recognize(&request(true)).await.is_ok());
    }

    #[tokio::test]
    async fn server_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let recognizer = OpenAiRecognizer::new("test-key", Some(server.uri()), None);
        let err = recognizer.recognize(&request(false)).await.unwrap_err();
        assert!(matches!(err, RecognitionError::ApiError { status: 503, .. }));
        assert!(err.is_retryable());
    }
}
