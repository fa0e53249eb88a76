//! Answer-key grading.
//!
//! Compares recognized answers against an answer key. Only questions the key
//! sets to a concrete choice count toward the score; a recognized answer is
//! correct only when it is exactly that choice.

use serde::{Deserialize, Serialize};

use crate::model::{AnswerKey, AnswerValue, Choice, RecognizedAnswers};

/// Per-question classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The key has no answer for this question; it is not scored.
    NotInKey,
    Correct,
    Incorrect,
}

/// The outcome for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question: u32,
    /// The key's answer, if set.
    pub expected: Option<Choice>,
    /// What was read off the sheet.
    pub recognized: AnswerValue,
    pub verdict: Verdict,
}

/// Coarse performance band used for colouring scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreBand {
    High,
    Medium,
    Low,
}

impl ScoreBand {
    pub fn for_percentage(percentage: f64) -> Self {
        if percentage >= 80.0 {
            ScoreBand::High
        } else if percentage >= 60.0 {
            ScoreBand::Medium
        } else {
            ScoreBand::Low
        }
    }

    /// Lower-case name, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreBand::High => "high",
            ScoreBand::Medium => "medium",
            ScoreBand::Low => "low",
        }
    }
}

/// Result of grading one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeSummary {
    /// Gradable questions answered correctly.
    pub correct_count: u32,
    /// Questions the key sets to a concrete choice.
    pub total_graded: u32,
    /// `100 * correct / total`, one decimal place; 0 when nothing is graded.
    pub percentage: f64,
    /// Gradable questions answered with a different choice, blank or multiple.
    pub incorrect_count: u32,
    /// Gradable questions read as no bubble shaded.
    pub blank_count: u32,
    /// Gradable questions read as more than one bubble shaded.
    pub ambiguous_count: u32,
    /// One entry per question in `1..=total_questions`.
    pub outcomes: Vec<QuestionOutcome>,
}

impl GradeSummary {
    pub fn band(&self) -> ScoreBand {
        ScoreBand::for_percentage(self.percentage)
    }

    pub fn outcome(&self, question: u32) -> Option<&QuestionOutcome> {
        self.outcomes.iter().find(|o| o.question == question)
    }
}

/// Grade `recognized` against `key` for questions `1..=total_questions`.
///
/// Recognized answers outside the gradable set are ignored, gradable
/// questions missing from `recognized` are incorrect.
pub fn grade(key: &AnswerKey, recognized: &RecognizedAnswers, total_questions: u32) -> GradeSummary {
    let mut outcomes = Vec::with_capacity(total_questions as usize);
    let mut correct_count = 0u32;
    let mut total_graded = 0u32;
    let mut blank_count = 0u32;
    let mut ambiguous_count = 0u32;

    for question in 1..=total_questions {
        let expected = key.get(question);
        let value = recognized.value(question);

        let verdict = match expected {
            None => Verdict::NotInKey,
            Some(choice) => {
                total_graded += 1;
                if value.matches(choice) {
                    correct_count += 1;
                    Verdict::Correct
                } else {
                    match value {
                        AnswerValue::Unanswered => blank_count += 1,
                        AnswerValue::Ambiguous => ambiguous_count += 1,
                        AnswerValue::Choice(_) => {}
                    }
                    Verdict::Incorrect
                }
            }
        };

        outcomes.push(QuestionOutcome {
            question,
            expected,
            recognized: value,
            verdict,
        });
    }

    GradeSummary {
        correct_count,
        total_graded,
        percentage: percentage(correct_count, total_graded),
        incorrect_count: total_graded - correct_count,
        blank_count,
        ambiguous_count,
        outcomes,
    }
}

/// `100 * correct / total`, rounded half away from zero to one decimal.
pub fn percentage(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = correct as f64 * 100.0 / total as f64;
    (raw * 10.0).round() / 10.0
}
