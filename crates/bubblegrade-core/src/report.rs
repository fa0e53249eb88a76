//! Graded result records with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grading::{grade, GradeSummary, ScoreBand};
use crate::model::{AnswerKey, RecognizedAnswers};

/// A saved, graded sheet.
///
/// Owns snapshots of the key and the answers it was graded with, so later
/// edits to the live key never change a saved record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedResult {
    /// Time-ordered unique identifier.
    pub id: Uuid,
    /// When the result was saved.
    pub created_at: DateTime<Utc>,
    /// Human-readable local timestamp.
    pub timestamp: String,
    /// Optional student label.
    #[serde(default)]
    pub student: Option<String>,
    /// Optional exam or sheet name.
    #[serde(default)]
    pub sheet_name: Option<String>,
    /// Where the image came from.
    #[serde(default)]
    pub source: Option<String>,
    /// Recognition model used.
    #[serde(default)]
    pub model: Option<String>,
    pub correct_count: u32,
    pub total_graded: u32,
    pub percentage: f64,
    /// Number of questions on the sheet when graded.
    pub total_questions: u32,
    pub answer_key: AnswerKey,
    pub recognized: RecognizedAnswers,
}

/// Optional labels attached when saving a result.
#[derive(Debug, Clone, Default)]
pub struct ResultLabels {
    pub student: Option<String>,
    pub sheet_name: Option<String>,
    pub source: Option<String>,
    pub model: Option<String>,
}

impl GradedResult {
    /// Build a record from a grading summary and the inputs that produced it.
    pub fn new(
        summary: &GradeSummary,
        key: &AnswerKey,
        recognized: &RecognizedAnswers,
        total_questions: u32,
        labels: ResultLabels,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            created_at: now,
            timestamp: now
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            student: labels.student,
            sheet_name: labels.sheet_name,
            source: labels.source,
            model: labels.model,
            correct_count: summary.correct_count,
            total_graded: summary.total_graded,
            percentage: summary.percentage,
            total_questions,
            answer_key: key.clone(),
            recognized: recognized.clone(),
        }
    }

    /// Grade the stored answers against the stored key again.
    pub fn summary(&self) -> GradeSummary {
        grade(&self.answer_key, &self.recognized, self.total_questions)
    }

    /// Grade the stored answers against a different key. The record itself
    /// is left untouched.
    pub fn regrade(&self, key: &AnswerKey) -> GradeSummary {
        grade(key, &self.recognized, self.total_questions)
    }

    pub fn band(&self) -> ScoreBand {
        ScoreBand::for_percentage(self.percentage)
    }

    /// Label used in listings.
    pub fn display_name(&self) -> &str {
        self.student
            .as_deref()
            .or(self.source.as_deref())
            .unwrap_or("(unnamed)")
    }

    /// Save the result as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize result")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write result to {}", path.display()))?;
        Ok(())
    }

    /// Load a result from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read result from {}", path.display()))?;
        let result: GradedResult = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse result from {}", path.display()))?;
        Ok(result)
    }
}
