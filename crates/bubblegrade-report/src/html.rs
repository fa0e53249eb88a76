//! HTML report generator.
//!
//! Produces self-contained HTML files with all CSS inlined.

use anyhow::{Context, Result};
use std::path::Path;

use bubblegrade_core::grading::ScoreBand;
use bubblegrade_core::report::GradedResult;
use bubblegrade_core::statistics::compute_history_stats;

use crate::{result_layout, OutcomeKind};

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn band_class(band: ScoreBand) -> String {
    format!("band-{}", band.as_str())
}

fn page_open(html: &mut String, title: &str) {
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!("<title>{}</title>\n", html_escape(title)));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");
}

/// Generate an HTML page for one graded sheet.
pub fn generate_result_html(result: &GradedResult) -> String {
    let summary = result.summary();
    let mut html = String::new();

    page_open(&mut html, &format!("bubblegrade: {}", result.display_name()));

    // Header
    html.push_str("<header>\n");
    html.push_str(&format!("<h1>{}</h1>\n", html_escape(result.display_name())));
    let mut meta = vec![html_escape(&result.timestamp)];
    if let Some(name) = &result.sheet_name {
        meta.push(format!("Sheet: <strong>{}</strong>", html_escape(name)));
    }
    if let Some(model) = &result.model {
        meta.push(format!("Model: {}", html_escape(model)));
    }
    if let Some(source) = &result.source {
        meta.push(format!("Image: {}", html_escape(source)));
    }
    html.push_str(&format!("<p class=\"meta\">{}</p>\n", meta.join(" | ")));
    html.push_str(&format!(
        "<p class=\"score {}\"><span class=\"big\">{}/{}</span> {:.1}%</p>\n",
        band_class(result.band()),
        result.correct_count,
        result.total_graded,
        result.percentage
    ));
    html.push_str(&format!(
        "<p class=\"meta\">{} incorrect, of which {} blank and {} multiple</p>\n",
        summary.incorrect_count, summary.blank_count, summary.ambiguous_count
    ));
    html.push_str("</header>\n");

    // Per-column breakdown
    html.push_str("<section class=\"columns\">\n");
    for range in result_layout(result).column_ranges() {
        html.push_str("<table class=\"column\">\n");
        html.push_str("<thead><tr><th>#</th><th>Read</th><th>Key</th></tr></thead>\n<tbody>\n");
        for question in range {
            let Some(outcome) = summary.outcome(question) else {
                continue;
            };
            let expected = outcome.expected.map(|c| c.as_str()).unwrap_or("-");
            html.push_str(&format!(
                "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                OutcomeKind::of(outcome).class(),
                question,
                html_escape(outcome.recognized.as_str()),
                expected
            ));
        }
        html.push_str("</tbody></table>\n");
    }
    html.push_str("</section>\n");

    html.push_str(LEGEND);

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&html_escape(
        &serde_json::to_string_pretty(result).unwrap_or_default(),
    ));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Generate an HTML page listing saved results, newest first, with summary
/// statistics.
pub fn generate_history_html(results: &[GradedResult]) -> String {
    let stats = compute_history_stats(results);
    let mut html = String::new();

    page_open(&mut html, "bubblegrade: history");

    html.push_str("<header>\n<h1>Scan history</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">{} result(s) | generated {}</p>\n",
        stats.count,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    if results.is_empty() {
        html.push_str("<p>No saved results.</p>\n");
        html.push_str("</body>\n</html>");
        return html;
    }

    html.push_str("<section class=\"dashboard\">\n<h2>Summary</h2>\n");
    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>Mean</th><th>Median</th><th>Min</th><th>Max</th><th>High</th><th>Medium</th><th>Low</th></tr></thead>\n");
    html.push_str(&format!(
        "<tbody><tr><td>{:.1}%</td><td>{:.1}%</td><td>{:.1}%</td><td>{:.1}%</td><td>{}</td><td>{}</td><td>{}</td></tr></tbody>\n",
        stats.mean_percentage,
        stats.median_percentage,
        stats.min_percentage,
        stats.max_percentage,
        stats.bands.get("high").copied().unwrap_or(0),
        stats.bands.get("medium").copied().unwrap_or(0),
        stats.bands.get("low").copied().unwrap_or(0),
    ));
    html.push_str("</table>\n");

    let hardest = stats.hardest_questions(5);
    if !hardest.is_empty() {
        html.push_str("<h3>Most missed questions</h3>\n<ul>\n");
        for (question, q) in hardest {
            html.push_str(&format!(
                "<li>Question {}: {:.0}% correct ({} of {}; {} blank, {} multiple)</li>\n",
                question,
                q.correct_rate() * 100.0,
                q.correct,
                q.attempts,
                q.blank,
                q.ambiguous
            ));
        }
        html.push_str("</ul>\n");
    }
    html.push_str("</section>\n");

    let mut recent: Vec<&GradedResult> = results.iter().collect();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

    html.push_str("<section class=\"results\">\n<h2>Results</h2>\n");
    html.push_str("<table class=\"results-table\">\n");
    html.push_str("<thead><tr><th>Saved</th><th>Student</th><th>Sheet</th><th>Score</th><th>%</th></tr></thead>\n<tbody>\n");
    for r in recent {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}/{}</td><td class=\"{}\">{:.1}%</td></tr>\n",
            html_escape(&r.timestamp),
            html_escape(r.display_name()),
            html_escape(r.sheet_name.as_deref().unwrap_or("-")),
            r.correct_count,
            r.total_graded,
            band_class(r.band()),
            r.percentage
        ));
    }
    html.push_str("</tbody></table>\n</section>\n");

    html.push_str("</body>\n</html>");
    html
}

fn write_page(html: String, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    Ok(())
}

/// Write a single-result HTML report to a file.
pub fn write_result_html(result: &GradedResult, path: &Path) -> Result<()> {
    write_page(generate_result_html(result), path)
}

/// Write a history HTML report to a file.
pub fn write_history_html(results: &[GradedResult], path: &Path) -> Result<()> {
    write_page(generate_history_html(results), path)
}

const LEGEND: &str = r#"<p class="legend">
<span class="correct">correct</span>
<span class="incorrect">incorrect</span>
<span class="blank">blank (N/A)</span>
<span class="multiple">multiple</span>
<span class="not-in-key">not in key</span>
</p>
"#;

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --correct: #dcfce7; --incorrect: #fde2e2; --blank: #f3f4f6; --multiple: #fef3c7; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --correct: #064e3b; --incorrect: #7f1d1d; --blank: #1f2937; --multiple: #78350f; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
.score .big { font-size: 2.5rem; font-weight: bold; margin-right: 0.5rem; }
.band-high { color: #16a34a; }
.band-medium { color: #ca8a04; }
.band-low { color: #dc2626; }
.columns { display: flex; flex-wrap: wrap; gap: 1rem; }
table { border-collapse: collapse; margin: 1rem 0; }
table.summary, table.results-table { width: 100%; }
th, td { border: 1px solid var(--border); padding: 0.35rem 0.8rem; text-align: left; }
th { background: var(--border); }
.correct { background: var(--correct); }
.incorrect { background: var(--incorrect); }
.blank { background: var(--blank); font-style: italic; }
.multiple { background: var(--multiple); }
.not-in-key { color: #9ca3af; }
.legend span { display: inline-block; padding: 0.2rem 0.6rem; margin-right: 0.3rem; border-radius: 4px; }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use bubblegrade_core::grading::grade;
    use bubblegrade_core::model::{AnswerKey, AnswerValue, Choice, RecognizedAnswers};
    use bubblegrade_core::report::ResultLabels;

    fn make_result(student: &str) -> GradedResult {
        let key = AnswerKey::from_sequence("ABCD-").unwrap();
        let recognized: RecognizedAnswers = [
            (1, AnswerValue::Choice(Choice::A)),
            (2, AnswerValue::Choice(Choice::C)),
            (4, AnswerValue::Ambiguous),
            (5, AnswerValue::Choice(Choice::E)),
        ]
        .into_iter()
        .collect();
        let summary = grade(&key, &recognized, 5);
        GradedResult::new(
            &summary,
            &key,
            &recognized,
            5,
            ResultLabels {
                student: Some(student.into()),
                sheet_name: Some("Quiz <1>".into()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn result_page_marks_each_outcome() {
        let html = generate_result_html(&make_result("Ana"));

        assert!(html.contains("<html"));
        assert!(html.contains("</html>"));
        assert!(html.contains("Ana"));
        assert!(html.contains("1/4"));
        assert!(html.contains("25.0%"));
        assert!(html.contains("<tr class=\"correct\"><td>1</td>"));
        assert!(html.contains("<tr class=\"incorrect\"><td>2</td>"));
        assert!(html.contains("<tr class=\"blank\"><td>3</td><td>N/A</td>"));
        assert!(html.contains("<tr class=\"multiple\"><td>4</td><td>MULTIPLE</td>"));
        assert!(html.contains("<tr class=\"not-in-key\"><td>5</td>"));
        assert!(html.contains("<title>bubblegrade: Ana</title>"));
        assert!(html.contains("class=\"score band-low\""));
    }

    #[test]
    fn labels_are_escaped() {
        let html = generate_result_html(&make_result("<script>alert(1)</script>"));
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("Quiz &lt;1&gt;"));
    }

    #[test]
    fn history_page_lists_results() {
        let results = vec![make_result("Ana"), make_result("Ben")];
        let html = generate_history_html(&results);
        assert!(html.contains("2 result(s)"));
        assert!(html.contains("<title>bubblegrade: history</title>"));
        assert!(html.contains("Ana"));
        assert!(html.contains("Ben"));
        assert!(html.contains("Most missed questions"));
    }

    #[test]
    fn empty_history_page() {
        let html = generate_history_html(&[]);
        assert!(html.contains("No saved results."));
    }

    #[test]
    fn reports_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("result.html");

        write_result_html(&make_result("Ana"), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<html"));

        let history = dir.path().join("history.html");
        write_history_html(&[make_result("Ana")], &history).unwrap();
        assert!(history.exists());
    }
}
