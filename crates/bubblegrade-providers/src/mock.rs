//! Mock recognizer for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use bubblegrade_core::error::RecognitionError;
use bubblegrade_core::traits::{
    ModelInfo, RecognizeRequest, RecognizeResponse, SheetRecognizer, TokenUsage,
};

/// A scripted recognizer for exercising grading without real API calls.
///
/// Queued replies are consumed in order; once the queue is empty every call
/// returns the default reply.
pub struct MockRecognizer {
    queue: Mutex<VecDeque<Result<String, RecognitionError>>>,
    default_reply: String,
    call_count: AtomicU32,
    last_request: Mutex<Option<RecognizeRequest>>,
}

impl MockRecognizer {
    /// A recognizer that reads every sheet as blank.
    pub fn new() -> Self {
        Self::with_fixed_response("{}")
    }

    /// A recognizer that always returns the same reply text.
    pub fn with_fixed_response(reply: &str) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default_reply: reply.to_string(),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Queue a reply text for the next unanswered call.
    pub fn push_reply(&self, reply: &str) -> &Self {
        self.queue.lock().unwrap().push_back(Ok(reply.to_string()));
        self
    }

    /// Queue a failure for the next unanswered call.
    pub fn push_error(&self, error: RecognitionError) -> &Self {
        self.queue.lock().unwrap().push_back(Err(error));
        self
    }

    /// Number of calls made to this recognizer.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// The last request received.
    pub fn last_request(&self) -> Option<RecognizeRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SheetRecognizer for MockRecognizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn recognize(
        &self,
        request: &RecognizeRequest,
    ) -> Result<RecognizeResponse, RecognitionError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap() = Some(request.clone());

        let next = self.queue.lock().unwrap().pop_front();
        let content = match next {
            Some(reply) => reply?,
            None => self.default_reply.clone(),
        };

        let prompt_tokens = (request.image.bytes.len() / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32; // rough estimate
        Ok(RecognizeResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                estimated_cost_usd: 0.0,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
        }]
    }
}
