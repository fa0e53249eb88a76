//! Markdown rendering, for pasting into notes or issue trackers.

use bubblegrade_core::report::GradedResult;
use bubblegrade_core::statistics::compute_history_stats;

use crate::{result_layout, OutcomeKind};

fn marker(kind: OutcomeKind) -> &'static str {
    match kind {
        OutcomeKind::Correct => "✓",
        OutcomeKind::Incorrect => "✗",
        OutcomeKind::Blank => "✗ (blank)",
        OutcomeKind::Multiple => "✗ (multiple)",
        OutcomeKind::NotInKey => "",
    }
}

fn cell(s: &str) -> String {
    s.replace('|', "\\|")
}

/// Render one graded sheet.
pub fn result_to_markdown(result: &GradedResult) -> String {
    let summary = result.summary();
    let mut md = String::new();

    md.push_str(&format!("# {}\n\n", cell(result.display_name())));
    if let Some(name) = &result.sheet_name {
        md.push_str(&format!("- Sheet: {}\n", cell(name)));
    }
    md.push_str(&format!("- Saved: {}\n", result.timestamp));
    if let Some(model) = &result.model {
        md.push_str(&format!("- Model: {model}\n"));
    }
    md.push_str(&format!(
        "- Score: **{}/{}** ({:.1}%)\n",
        result.correct_count, result.total_graded, result.percentage
    ));
    md.push_str(&format!(
        "- Blank: {}, multiple: {}\n\n",
        summary.blank_count, summary.ambiguous_count
    ));

    for (i, range) in result_layout(result).column_ranges().into_iter().enumerate() {
        md.push_str(&format!(
            "## Questions {}-{} (block {})\n\n",
            range.start(),
            range.end(),
            i + 1
        ));
        md.push_str("| # | Read | Key | |\n|---|---|---|---|\n");
        for question in range {
            let Some(outcome) = summary.outcome(question) else {
                continue;
            };
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                question,
                outcome.recognized.as_str(),
                outcome.expected.map(|c| c.as_str()).unwrap_or("-"),
                marker(OutcomeKind::of(outcome))
            ));
        }
        md.push('\n');
    }
    md
}

/// Render saved results, newest first, with summary statistics.
pub fn history_to_markdown(results: &[GradedResult]) -> String {
    let stats = compute_history_stats(results);
    let mut md = String::from("# Scan history\n\n");

    if results.is_empty() {
        md.push_str("No saved results.\n");
        return md;
    }

    md.push_str(&format!(
        "{} result(s), mean {:.1}%, median {:.1}%, range {:.1}%-{:.1}%\n\n",
        stats.count,
        stats.mean_percentage,
        stats.median_percentage,
        stats.min_percentage,
        stats.max_percentage
    ));

    let mut recent: Vec<&GradedResult> = results.iter().collect();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

    md.push_str("| Saved | Student | Sheet | Score | % |\n|---|---|---|---|---|\n");
    for r in recent {
        md.push_str(&format!(
            "| {} | {} | {} | {}/{} | {:.1}% |\n",
            r.timestamp,
            cell(r.display_name()),
            cell(r.sheet_name.as_deref().unwrap_or("-")),
            r.correct_count,
            r.total_graded,
            r.percentage
        ));
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use bubblegrade_core::grading::grade;
    use bubblegrade_core::model::{AnswerKey, AnswerValue, Choice, RecognizedAnswers};
    use bubblegrade_core::report::ResultLabels;

    fn make_result(student: &str, answers: &[(u32, AnswerValue)]) -> GradedResult {
        let key = AnswerKey::from_sequence("ABC").unwrap();
        let recognized: RecognizedAnswers = answers.iter().copied().collect();
        let summary = grade(&key, &recognized, 3);
        GradedResult::new(
            &summary,
            &key,
            &recognized,
            3,
            ResultLabels {
                student: Some(student.into()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn result_table() {
        let result = make_result(
            "Ana|B",
            &[
                (1, AnswerValue::Choice(Choice::A)),
                (2, AnswerValue::Ambiguous),
            ],
        );
        let md = result_to_markdown(&result);
        assert!(md.starts_with("# Ana\\|B\n"));
        assert!(md.contains("**1/3** (33.3%)"));
        assert!(md.contains("| 1 | A | A | ✓ |"));
        assert!(md.contains("| 2 | MULTIPLE | B | ✗ (multiple) |"));
        assert!(md.contains("| 3 | N/A | C | ✗ (blank) |"));
    }

    #[test]
    fn history_summary() {
        let results = vec![
            make_result("Ana", &[(1, AnswerValue::Choice(Choice::A))]),
            make_result(
                "Ben",
                &[
                    (1, AnswerValue::Choice(Choice::A)),
                    (2, AnswerValue::Choice(Choice::B)),
                    (3, AnswerValue::Choice(Choice::C)),
                ],
            ),
        ];
        let md = history_to_markdown(&results);
        assert!(md.contains("2 result(s)"));
        assert!(md.contains("| Ben | - | 3/3 | 100.0% |"));
        assert!(history_to_markdown(&[]).contains("No saved results."));
    }
}
