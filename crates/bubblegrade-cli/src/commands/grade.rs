//! The `bubblegrade grade` command.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use bubblegrade_core::engine::{BatchEntry, BatchReport, ProgressReporter, ScanEngine};
use bubblegrade_core::error::RecognitionError;
use bubblegrade_core::image::{image_files_in, BytesSource, FileSource, ImageSource};
use bubblegrade_core::report::{GradedResult, ResultLabels};
use bubblegrade_core::session::{CaptureDisposition, GradingSession};
use bubblegrade_core::store::ResultStore;
use bubblegrade_core::traits::SheetRecognizer;
use bubblegrade_providers::config::load_config_from;
use bubblegrade_providers::BubblegradeConfig;
use bubblegrade_report::html::write_result_html;
use bubblegrade_report::markdown::result_to_markdown;

use super::output::{check_format, emit_result, html_path, RESULT_FORMATS};
use super::{open_storage, resolve_key, ResolvedKey};

pub struct GradeArgs {
    pub image: PathBuf,
    pub key: Option<PathBuf>,
    pub student: Option<String>,
    pub save: bool,
    pub format: String,
    pub output: PathBuf,
    pub model: Option<String>,
    pub locations: bool,
    pub allow_incomplete: bool,
    pub config: Option<PathBuf>,
}

/// Console progress reporter for directory batches.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_scan_start(&self, source: &str) {
        eprintln!("  Reading: {source}");
    }

    fn on_scan_complete(&self, entry: &BatchEntry) {
        eprintln!(
            "  Done: {} {}/{} ({:.1}%) ({}ms)",
            entry.scan.source,
            entry.summary.correct_count,
            entry.summary.total_graded,
            entry.summary.percentage,
            entry.scan.latency_ms,
        );
    }

    fn on_scan_error(&self, source: &str, error: &RecognitionError) {
        eprintln!("  ERROR: {source}: {error}");
    }

    fn on_batch_complete(&self, total: usize, graded: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {graded}/{total} graded, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(args: GradeArgs) -> Result<()> {
    check_format(&args.format, RESULT_FORMATS)?;

    let config = load_config_from(args.config.as_deref())?;
    let resolved = resolve_key(args.key.as_deref(), &config, args.allow_incomplete)?;

    let (provider, model) = config.resolve_model(args.model.as_deref());
    let recognizer: Arc<dyn SheetRecognizer> = Arc::from(config.recognizer(&provider)?);
    let mut engine_config = config.engine_config(&model, resolved.layout);
    engine_config.request_locations |= args.locations;
    let engine = ScanEngine::new(recognizer, engine_config);

    tracing::info!("grading with {provider}/{model}");

    if args.image.is_dir() {
        grade_directory(&engine, &config, &resolved, &args, &provider).await
    } else {
        let source: Box<dyn ImageSource> = if args.image.as_os_str() == "-" {
            let mut bytes = Vec::new();
            std::io::stdin()
                .read_to_end(&mut bytes)
                .context("failed to read image from stdin")?;
            Box::new(BytesSource::new(bytes, "stdin"))
        } else {
            Box::new(FileSource::new(&args.image))
        };
        grade_single(&engine, &config, resolved, source.as_ref(), &args, &provider).await
    }
}

async fn grade_single(
    engine: &ScanEngine,
    config: &BubblegradeConfig,
    resolved: ResolvedKey,
    source: &dyn ImageSource,
    args: &GradeArgs,
    provider: &str,
) -> Result<()> {
    let image = source.acquire()?;
    let layout = resolved.layout;
    let mut session = GradingSession::with_key(layout, resolved.key.clone());

    let ticket = session.begin_capture()?;
    let scan = match engine.scan(&image).await {
        Ok(scan) => scan,
        Err(e) => {
            return match session.fail_capture(ticket, &e) {
                CaptureDisposition::Failed { message, .. } => Err(anyhow::anyhow!(message)),
                _ => Err(e.into()),
            };
        }
    };
    for issue in &scan.issues {
        eprintln!(
            "Warning: question {} read as {}, treated as unanswered",
            issue.question, issue.raw
        );
    }

    let summary = match session.complete_capture(ticket, scan.answers.clone()) {
        CaptureDisposition::Graded(summary) => summary,
        other => anyhow::bail!("capture was not graded: {other:?}"),
    };

    let labels = ResultLabels {
        student: args.student.clone(),
        sheet_name: resolved.name.clone(),
        source: Some(source.describe()),
        model: Some(format!("{provider}/{}", scan.model)),
    };

    let result = if args.save {
        let mut store = ResultStore::load(open_storage(config)?)?;
        let saved = session.save_result(labels, &mut store)?;
        eprintln!("Saved result {} ({} in history)", saved.id, store.len());
        saved
    } else {
        GradedResult::new(
            &summary,
            &resolved.key,
            &scan.answers,
            layout.total_questions,
            labels,
        )
    };

    emit_result(&result, &summary, &layout, &args.format, &args.output)
}

async fn grade_directory(
    engine: &ScanEngine,
    config: &BubblegradeConfig,
    resolved: &ResolvedKey,
    args: &GradeArgs,
    provider: &str,
) -> Result<()> {
    anyhow::ensure!(
        args.student.is_none(),
        "--student cannot be used with a directory; each sheet is labelled with its file name"
    );
    let files = image_files_in(&args.image)?;
    anyhow::ensure!(
        !files.is_empty(),
        "no images found in {}",
        args.image.display()
    );

    let mut images = Vec::with_capacity(files.len());
    for file in &files {
        images.push(FileSource::new(file).acquire()?);
    }

    eprintln!(
        "bubblegrade v{}: grading {} sheet(s) with {provider}/{}",
        env!("CARGO_PKG_VERSION"),
        images.len(),
        engine.config().model
    );
    eprintln!();

    let report = engine
        .grade_batch(images, &resolved.key, &ConsoleReporter)
        .await;

    let results: Vec<GradedResult> = report
        .entries
        .iter()
        .map(|entry| {
            let stem = Path::new(&entry.scan.source)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string());
            GradedResult::new(
                &entry.summary,
                &resolved.key,
                &entry.scan.answers,
                resolved.layout.total_questions,
                ResultLabels {
                    student: stem,
                    sheet_name: resolved.name.clone(),
                    source: Some(entry.scan.source.clone()),
                    model: Some(format!("{provider}/{}", entry.scan.model)),
                },
            )
        })
        .collect();

    if args.save && !results.is_empty() {
        let mut store = ResultStore::load(open_storage(config)?)?;
        for result in &results {
            store.append(result.clone())?;
        }
        eprintln!("Saved {} result(s) ({} in history)", results.len(), store.len());
    }

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "markdown" => {
            for result in &results {
                println!("{}", result_to_markdown(result));
            }
        }
        "html" => {
            for result in &results {
                let path = html_path(&args.output, result);
                write_result_html(result, &path)?;
                eprintln!("HTML report: {}", path.display());
            }
            print_batch_summary(&report, &results);
        }
        _ => print_batch_summary(&report, &results),
    }

    if !report.failures.is_empty() {
        anyhow::bail!(
            "{} of {} sheet(s) could not be read; capture them again",
            report.failures.len(),
            files.len()
        );
    }
    Ok(())
}

fn print_batch_summary(report: &BatchReport, results: &[GradedResult]) {
    let mut table = Table::new();
    table.set_header(vec!["Sheet", "Score", "%", "Blank", "Multiple", "Latency"]);

    for (entry, result) in report.entries.iter().zip(results) {
        table.add_row(vec![
            Cell::new(result.display_name()),
            Cell::new(format!(
                "{}/{}",
                entry.summary.correct_count, entry.summary.total_graded
            )),
            Cell::new(format!("{:.1}%", entry.summary.percentage)),
            Cell::new(entry.summary.blank_count),
            Cell::new(entry.summary.ambiguous_count),
            Cell::new(format!("{}ms", entry.scan.latency_ms)),
        ]);
    }
    for failure in &report.failures {
        table.add_row(vec![
            Cell::new(&failure.source),
            Cell::new("FAILED"),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
        ]);
    }

    println!("{table}");
    if !report.entries.is_empty() {
        println!("Mean: {:.1}%", report.mean_percentage());
    }
}
