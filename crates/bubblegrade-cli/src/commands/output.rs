//! Printing graded results in the requested format.

use std::path::{Path, PathBuf};

use anyhow::Result;
use comfy_table::{Cell, Table};

use bubblegrade_core::grading::GradeSummary;
use bubblegrade_core::model::SheetLayout;
use bubblegrade_core::report::GradedResult;
use bubblegrade_report::html::write_result_html;
use bubblegrade_report::markdown::result_to_markdown;
use bubblegrade_report::OutcomeKind;

pub const RESULT_FORMATS: &[&str] = &["text", "json", "html", "markdown"];

/// Fail early on an unknown `--format`, before any model is called.
pub fn check_format(format: &str, allowed: &[&str]) -> Result<()> {
    anyhow::ensure!(
        allowed.contains(&format),
        "unknown format '{format}' (expected one of: {})",
        allowed.join(", ")
    );
    Ok(())
}

/// Print or write one graded result.
pub fn emit_result(
    result: &GradedResult,
    summary: &GradeSummary,
    layout: &SheetLayout,
    format: &str,
    output_dir: &Path,
) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(result)?),
        "markdown" => println!("{}", result_to_markdown(result)),
        "html" => {
            let path = html_path(output_dir, result);
            write_result_html(result, &path)?;
            print_score_line(result);
            println!("HTML report: {}", path.display());
        }
        _ => print_result_text(result, summary, layout),
    }
    Ok(())
}

pub fn html_path(output_dir: &Path, result: &GradedResult) -> PathBuf {
    output_dir.join(format!("result-{}.html", result.id))
}

pub fn print_score_line(result: &GradedResult) {
    println!(
        "{}: {}/{} ({:.1}%)",
        result.display_name(),
        result.correct_count,
        result.total_graded,
        result.percentage
    );
}

/// Human-readable result: a header and the sheet as a grid of column blocks.
pub fn print_result_text(result: &GradedResult, summary: &GradeSummary, layout: &SheetLayout) {
    if let Some(student) = &result.student {
        println!("Student: {student}");
    }
    if let Some(sheet) = &result.sheet_name {
        println!("Sheet: {sheet}");
    }
    if let Some(source) = &result.source {
        println!("Image: {source}");
    }
    println!(
        "Score: {}/{} ({:.1}%) [{}]",
        result.correct_count,
        result.total_graded,
        result.percentage,
        result.band().as_str()
    );
    println!(
        "Incorrect: {} (blank {}, multiple {})",
        summary.incorrect_count, summary.blank_count, summary.ambiguous_count
    );

    let ranges = layout.column_ranges();
    let mut table = Table::new();
    table.set_header(
        ranges
            .iter()
            .map(|r| format!("Q{}-{}", r.start(), r.end()))
            .collect::<Vec<_>>(),
    );

    let rows = layout.questions_per_column;
    for row in 0..rows {
        let cells: Vec<Cell> = ranges
            .iter()
            .map(|range| {
                let question = range.start() + row;
                if question > *range.end() {
                    return Cell::new("");
                }
                let Some(outcome) = summary.outcome(question) else {
                    return Cell::new("");
                };
                let read = outcome.recognized.as_str();
                let text = match (OutcomeKind::of(outcome), outcome.expected) {
                    (OutcomeKind::Correct, _) => format!("{question:>2} {read} ✓"),
                    (OutcomeKind::NotInKey, _) => format!("{question:>2} {read}"),
                    (_, Some(expected)) => format!("{question:>2} {read} ✗ ({expected})"),
                    (_, None) => format!("{question:>2} {read} ✗"),
                };
                Cell::new(text)
            })
            .collect();
        table.add_row(cells);
    }

    println!("{table}");
}
