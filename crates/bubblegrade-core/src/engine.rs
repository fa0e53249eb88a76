//! Scan orchestrator.
//!
//! Sends sheet images to a recognizer, normalizes the replies and grades
//! them. Every sheet gets exactly one recognition attempt; batches run with
//! bounded parallelism and collect per-sheet failures.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::RecognitionError;
use crate::grading::{grade, GradeSummary};
use crate::image::SheetImage;
use crate::model::{AnswerKey, RecognizedAnswers, SheetLayout};
use crate::recognition::{normalize_response, NormalizationIssue};
use crate::traits::{RecognizeRequest, SheetRecognizer, TokenUsage};

/// Configuration for the scan engine.
#[derive(Debug, Clone)]
pub struct ScanEngineConfig {
    /// Model identifier passed to the recognizer.
    pub model: String,
    /// Sheet layout used for prompts and grading.
    pub layout: SheetLayout,
    /// Ask the recognizer for mark coordinates.
    pub request_locations: bool,
    /// Maximum concurrent recognition calls in a batch.
    pub parallelism: usize,
    /// Sampling temperature.
    pub temperature: f64,
    /// Max tokens for the reply.
    pub max_tokens: u32,
}

impl Default for ScanEngineConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            layout: SheetLayout::default(),
            request_locations: false,
            parallelism: 2,
            temperature: 0.0,
            max_tokens: 8192,
        }
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self, source: &str);
    fn on_scan_complete(&self, entry: &BatchEntry);
    fn on_scan_error(&self, source: &str, error: &RecognitionError);
    fn on_batch_complete(&self, total: usize, graded: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_scan_start(&self, _: &str) {}
    fn on_scan_complete(&self, _: &BatchEntry) {}
    fn on_scan_error(&self, _: &str, _: &RecognitionError) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// A recognized sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    /// Where the image came from.
    pub source: String,
    /// Normalized answers.
    pub answers: RecognizedAnswers,
    /// Reply values that were coerced to unanswered.
    pub issues: Vec<NormalizationIssue>,
    /// Model that answered.
    pub model: String,
    pub token_usage: TokenUsage,
    pub latency_ms: u64,
}

/// One graded sheet of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
    pub scan: Scan,
    pub summary: GradeSummary,
}

/// One sheet of a batch that could not be read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub source: String,
    pub error: String,
    pub retryable: bool,
}

/// Outcome of grading many sheets against one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Graded sheets, in input order.
    pub entries: Vec<BatchEntry>,
    /// Sheets that failed recognition, in input order.
    pub failures: Vec<BatchFailure>,
    pub duration_ms: u64,
}

impl BatchReport {
    /// Mean percentage over graded sheets.
    pub fn mean_percentage(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries.iter().map(|e| e.summary.percentage).sum::<f64>() / self.entries.len() as f64
    }
}

/// The scan engine.
pub struct ScanEngine {
    recognizer: Arc<dyn SheetRecognizer>,
    config: ScanEngineConfig,
}

impl ScanEngine {
    pub fn new(recognizer: Arc<dyn SheetRecognizer>, config: ScanEngineConfig) -> Self {
        Self { recognizer, config }
    }

    pub fn config(&self) -> &ScanEngineConfig {
        &self.config
    }

    /// Read one sheet. Exactly one recognizer call.
    pub async fn scan(&self, image: &SheetImage) -> Result<Scan, RecognitionError> {
        scan_with(self.recognizer.as_ref(), &self.config, image).await
    }

    /// Read and grade one sheet.
    pub async fn grade_image(
        &self,
        image: &SheetImage,
        key: &AnswerKey,
    ) -> Result<BatchEntry, RecognitionError> {
        let scan = self.scan(image).await?;
        let summary = grade(key, &scan.answers, self.config.layout.total_questions);
        Ok(BatchEntry { scan, summary })
    }

    /// Read and grade many sheets against the same key.
    pub async fn grade_batch(
        &self,
        images: Vec<SheetImage>,
        key: &AnswerKey,
        progress: &dyn ProgressReporter,
    ) -> BatchReport {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let total = images.len();

        let mut futures = FuturesUnordered::new();
        for (index, image) in images.into_iter().enumerate() {
            let recognizer = Arc::clone(&self.recognizer);
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();

            futures.push(async move {
                let source = image.source.clone();
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        progress.on_scan_start(&source);
                        scan_with(recognizer.as_ref(), &config, &image).await
                    }
                    Err(_) => Err(RecognitionError::NetworkError("semaphore closed".into())),
                };
                (index, source, result)
            });
        }

        let mut entries = Vec::new();
        let mut failures = Vec::new();

        while let Some((index, source, result)) = futures.next().await {
            match result {
                Ok(scan) => {
                    let summary = grade(key, &scan.answers, self.config.layout.total_questions);
                    let entry = BatchEntry { scan, summary };
                    progress.on_scan_complete(&entry);
                    entries.push((index, entry));
                }
                Err(e) => {
                    tracing::error!("recognition failed for {source}: {e}");
                    progress.on_scan_error(&source, &e);
                    failures.push((
                        index,
                        BatchFailure {
                            source,
                            error: e.to_string(),
                            retryable: e.is_retryable(),
                        },
                    ));
                }
            }
        }

        entries.sort_by_key(|(i, _)| *i);
        failures.sort_by_key(|(i, _)| *i);

        let elapsed = start.elapsed();
        progress.on_batch_complete(total, entries.len(), failures.len(), elapsed);

        BatchReport {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            entries: entries.into_iter().map(|(_, e)| e).collect(),
            failures: failures.into_iter().map(|(_, f)| f).collect(),
            duration_ms: elapsed.as_millis() as u64,
        }
    }
}

async fn scan_with(
    recognizer: &dyn SheetRecognizer,
    config: &ScanEngineConfig,
    image: &SheetImage,
) -> Result<Scan, RecognitionError> {
    if image.bytes.is_empty() {
        return Err(RecognitionError::EmptyImage(image.source.clone()));
    }

    let request = RecognizeRequest {
        model: config.model.clone(),
        image: image.clone(),
        layout: config.layout,
        request_locations: config.request_locations,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    };

    let response = recognizer.recognize(&request).await?;
    let normalized = normalize_response(&response.content, config.layout.total_questions)?;

    for issue in &normalized.issues {
        tracing::warn!(
            "{}: question {} had unrecognized value {}, treated as unanswered",
            image.source,
            issue.question,
            issue.raw
        );
    }

    Ok(Scan {
        source: image.source.clone(),
        answers: normalized.answers,
        issues: normalized.issues,
        model: response.model,
        token_usage: response.token_usage,
        latency_ms: response.latency_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::model::{AnswerValue, Choice};
    use crate::traits::{ModelInfo, RecognizeResponse};

    /// Replies based on the image source name.
    struct ScriptedRecognizer {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SheetRecognizer for ScriptedRecognizer {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn recognize(
            &self,
            request: &RecognizeRequest,
        ) -> Result<RecognizeResponse, RecognitionError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let content = match request.image.source.as_str() {
                "perfect" => r#"{"1": "A", "2": "B", "3": "C"}"#,
                "garbled" => r#"{"1": "Z", "2": "MULTIPLE", "3": "C"}"#,
                "down" => return Err(RecognitionError::NetworkError("down".into())),
                _ => "not json",
            };
            Ok(RecognizeResponse {
                content: content.to_string(),
                model: request.model.clone(),
                token_usage: TokenUsage::default(),
                latency_ms: 1,
            })
        }

        fn available_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    fn engine() -> (Arc<ScriptedRecognizer>, ScanEngine) {
        let recognizer = Arc::new(ScriptedRecognizer {
            calls: AtomicU32::new(0),
        });
        let config = ScanEngineConfig {
            layout: SheetLayout::new(3, 3),
            ..Default::default()
        };
        (recognizer.clone(), ScanEngine::new(recognizer, config))
    }

    fn image(source: &str) -> SheetImage {
        SheetImage {
            bytes: vec![0xFF, 0xD8, 0xFF],
            mime_type: "image/jpeg".into(),
            source: source.into(),
        }
    }

    #[tokio::test]
    async fn scan_normalizes_reply() {
        let (_, engine) = engine();
        let scan = engine.scan(&image("garbled")).await.unwrap();
        assert_eq!(scan.answers.value(1), AnswerValue::Unanswered);
        assert_eq!(scan.answers.value(2), AnswerValue::Ambiguous);
        assert_eq!(scan.issues.len(), 1);
    }

    #[tokio::test]
    async fn malformed_reply_is_an_error() {
        let (_, engine) = engine();
        let err = engine.scan(&image("other")).await.unwrap_err();
        assert!(matches!(err, RecognitionError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn failed_call_is_not_retried() {
        let (recognizer, engine) = engine();
        assert!(engine.scan(&image("down")).await.is_err());
        assert_eq!(recognizer.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn empty_image_never_reaches_recognizer() {
        let (recognizer, engine) = engine();
        let mut empty = image("perfect");
        empty.bytes.clear();
        assert!(matches!(
            engine.scan(&empty).await,
            Err(RecognitionError::EmptyImage(_))
        ));
        assert_eq!(recognizer.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn batch_keeps_input_order_and_collects_failures() {
        let (recognizer, engine) = engine();
        let key = AnswerKey::from_sequence("ABC").unwrap();
        let report = engine
            .grade_batch(
                vec![image("perfect"), image("down"), image("garbled")],
                &key,
                &NoopReporter,
            )
            .await;

        assert_eq!(recognizer.calls.load(Ordering::Relaxed), 3);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].scan.source, "perfect");
        assert_eq!(report.entries[0].summary.percentage, 100.0);
        assert_eq!(report.entries[1].scan.source, "garbled");
        assert_eq!(report.entries[1].summary.correct_count, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source, "down");
        assert!(report.failures[0].retryable);
        assert!((report.mean_percentage() - 66.65).abs() < 0.01);
    }

    #[tokio::test]
    async fn grade_image_uses_key() {
        let (_, engine) = engine();
        let key: AnswerKey = [(1, Choice::A), (3, Choice::E)].into_iter().collect();
        let entry = engine.grade_image(&image("perfect"), &key).await.unwrap();
        assert_eq!(entry.summary.total_graded, 2);
        assert_eq!(entry.summary.correct_count, 1);
    }
}
