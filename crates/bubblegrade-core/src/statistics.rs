//! Aggregate statistics over saved results.
//!
//! Includes a simple item analysis: for every question, how often it was
//! answered correctly among the sheets whose key graded it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grading::Verdict;
use crate::model::AnswerValue;
use crate::report::GradedResult;

/// Statistics for a single question across results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionStats {
    /// Results whose key graded this question.
    pub attempts: u32,
    /// Of those, how many were correct.
    pub correct: u32,
    /// Read as no bubble shaded.
    pub blank: u32,
    /// Read as more than one bubble shaded.
    pub ambiguous: u32,
}

impl QuestionStats {
    pub fn correct_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.correct as f64 / self.attempts as f64
        }
    }
}

/// Summary over a set of saved results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub count: usize,
    pub mean_percentage: f64,
    pub median_percentage: f64,
    pub min_percentage: f64,
    pub max_percentage: f64,
    /// Results per score band.
    pub bands: BTreeMap<String, usize>,
    /// Item analysis keyed by question number.
    pub per_question: BTreeMap<u32, QuestionStats>,
}

impl HistoryStats {
    /// Questions sorted from hardest to easiest (lowest correct rate first),
    /// limited to `limit` entries.
    pub fn hardest_questions(&self, limit: usize) -> Vec<(u32, &QuestionStats)> {
        let mut questions: Vec<(u32, &QuestionStats)> = self
            .per_question
            .iter()
            .filter(|(_, s)| s.attempts > 0)
            .map(|(q, s)| (*q, s))
            .collect();
        questions.sort_by(|a, b| {
            a.1.correct_rate()
                .partial_cmp(&b.1.correct_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        questions.truncate(limit);
        questions
    }
}

/// Compute statistics from saved results. Each result is regraded against its
/// own stored key, so the analysis reflects what was saved.
pub fn compute_history_stats(results: &[GradedResult]) -> HistoryStats {
    let mut bands: BTreeMap<String, usize> = ["high", "medium", "low"]
        .iter()
        .map(|b| (b.to_string(), 0))
        .collect();
    let mut per_question: BTreeMap<u32, QuestionStats> = BTreeMap::new();

    for result in results {
        *bands.entry(result.band().as_str().to_string()).or_default() += 1;

        for outcome in result.summary().outcomes {
            if outcome.verdict == Verdict::NotInKey {
                continue;
            }
            let stats = per_question
                .entry(outcome.question)
                .or_insert(QuestionStats {
                    attempts: 0,
                    correct: 0,
                    blank: 0,
                    ambiguous: 0,
                });
            stats.attempts += 1;
            match outcome.verdict {
                Verdict::Correct => stats.correct += 1,
                _ => match outcome.recognized {
                    AnswerValue::Unanswered => stats.blank += 1,
                    AnswerValue::Ambiguous => stats.ambiguous += 1,
                    AnswerValue::Choice(_) => {}
                },
            }
        }
    }

    let mut percentages: Vec<f64> = results.iter().map(|r| r.percentage).collect();
    percentages.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let count = percentages.len();
    let (mean, median, min, max) = if count == 0 {
        (0.0, 0.0, 0.0, 0.0)
    } else {
        let mean = percentages.iter().sum::<f64>() / count as f64;
        let median = if count % 2 == 1 {
            percentages[count / 2]
        } else {
            (percentages[count / 2 - 1] + percentages[count / 2]) / 2.0
        };
        (mean, median, percentages[0], percentages[count - 1])
    };

    HistoryStats {
        count,
        mean_percentage: mean,
        median_percentage: median,
        min_percentage: min,
        max_percentage: max,
        bands,
        per_question,
    }
}
