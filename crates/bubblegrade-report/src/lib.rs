//! bubblegrade-report: Result and history reports.
//!
//! Renders graded sheets and saved history as self-contained HTML pages or
//! Markdown.

use bubblegrade_core::grading::{QuestionOutcome, Verdict};
use bubblegrade_core::model::{AnswerValue, SheetLayout};
use bubblegrade_core::report::GradedResult;

pub mod html;
pub mod markdown;

/// How a question is shown. Blank and multiple marks score the same as a
/// wrong choice but are displayed distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Correct,
    Incorrect,
    Blank,
    Multiple,
    NotInKey,
}

impl OutcomeKind {
    pub fn of(outcome: &QuestionOutcome) -> Self {
        match (outcome.verdict, outcome.recognized) {
            (Verdict::NotInKey, _) => OutcomeKind::NotInKey,
            (Verdict::Correct, _) => OutcomeKind::Correct,
            (Verdict::Incorrect, AnswerValue::Unanswered) => OutcomeKind::Blank,
            (Verdict::Incorrect, AnswerValue::Ambiguous) => OutcomeKind::Multiple,
            (Verdict::Incorrect, AnswerValue::Choice(_)) => OutcomeKind::Incorrect,
        }
    }

    /// CSS class name.
    pub fn class(&self) -> &'static str {
        match self {
            OutcomeKind::Correct => "correct",
            OutcomeKind::Incorrect => "incorrect",
            OutcomeKind::Blank => "blank",
            OutcomeKind::Multiple => "multiple",
            OutcomeKind::NotInKey => "not-in-key",
        }
    }
}

/// Layout used to break a saved result into column blocks.
fn result_layout(result: &GradedResult) -> SheetLayout {
    SheetLayout::new(
        result.total_questions,
        SheetLayout::default().questions_per_column,
    )
}
