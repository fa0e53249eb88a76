//! The `bubblegrade regrade` command.
//!
//! Grades a stored recognition reply without contacting any model, through
//! the same normalization and session flow as a live capture.

use std::path::PathBuf;

use anyhow::{Context, Result};

use bubblegrade_core::recognition::normalize_response;
use bubblegrade_core::report::{GradedResult, ResultLabels};
use bubblegrade_core::session::{CaptureDisposition, GradingSession};
use bubblegrade_core::store::ResultStore;
use bubblegrade_providers::config::load_config_from;

use super::output::{check_format, emit_result, RESULT_FORMATS};
use super::{open_storage, resolve_key};

pub struct RegradeArgs {
    pub answers: PathBuf,
    pub key: Option<PathBuf>,
    pub student: Option<String>,
    pub save: bool,
    pub format: String,
    pub output: PathBuf,
    pub allow_incomplete: bool,
    pub config: Option<PathBuf>,
}

pub fn execute(args: RegradeArgs) -> Result<()> {
    check_format(&args.format, RESULT_FORMATS)?;

    let config = load_config_from(args.config.as_deref())?;
    let resolved = resolve_key(args.key.as_deref(), &config, args.allow_incomplete)?;
    let layout = resolved.layout;

    let content = std::fs::read_to_string(&args.answers)
        .with_context(|| format!("failed to read answers: {}", args.answers.display()))?;
    let normalized = normalize_response(&content, layout.total_questions)
        .with_context(|| format!("unusable answers in {}", args.answers.display()))?;
    for issue in &normalized.issues {
        eprintln!(
            "Warning: question {} read as {}, treated as unanswered",
            issue.question, issue.raw
        );
    }

    let mut session = GradingSession::with_key(layout, resolved.key.clone());
    let ticket = session.begin_capture()?;
    let summary = match session.complete_capture(ticket, normalized.answers.clone()) {
        CaptureDisposition::Graded(summary) => summary,
        other => anyhow::bail!("answers were not graded: {other:?}"),
    };

    let labels = ResultLabels {
        student: args.student.clone(),
        sheet_name: resolved.name.clone(),
        source: Some(args.answers.display().to_string()),
        model: None,
    };

    let result = if args.save {
        let mut store = ResultStore::load(open_storage(&config)?)?;
        let saved = session.save_result(labels, &mut store)?;
        eprintln!("Saved result {} ({} in history)", saved.id, store.len());
        saved
    } else {
        GradedResult::new(
            &summary,
            &resolved.key,
            &normalized.answers,
            layout.total_questions,
            labels,
        )
    };

    emit_result(&result, &summary, &layout, &args.format, &args.output)
}
