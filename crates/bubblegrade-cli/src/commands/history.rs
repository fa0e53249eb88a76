//! The `bubblegrade history` commands.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use bubblegrade_core::statistics::compute_history_stats;
use bubblegrade_core::store::ResultStore;
use bubblegrade_providers::config::load_config_from;
use bubblegrade_report::html::write_history_html;
use bubblegrade_report::markdown::history_to_markdown;

use super::open_storage;
use super::output::check_format;

const HISTORY_FORMATS: &[&str] = &["text", "json", "markdown"];

fn load_store(config_path: Option<PathBuf>) -> Result<ResultStore> {
    let config = load_config_from(config_path.as_deref())?;
    ResultStore::load(open_storage(&config)?)
}

pub fn list(format: String, config_path: Option<PathBuf>) -> Result<()> {
    check_format(&format, HISTORY_FORMATS)?;
    let store = load_store(config_path)?;
    let recent = store.list_recent();

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&recent)?),
        "markdown" => println!("{}", history_to_markdown(store.list_all())),
        _ => {
            if recent.is_empty() {
                println!("No saved results.");
                return Ok(());
            }
            let mut table = Table::new();
            table.set_header(vec!["Saved", "Student", "Sheet", "Score", "%", "Band", "ID"]);
            for r in &recent {
                table.add_row(vec![
                    Cell::new(&r.timestamp),
                    Cell::new(r.display_name()),
                    Cell::new(r.sheet_name.as_deref().unwrap_or("-")),
                    Cell::new(format!("{}/{}", r.correct_count, r.total_graded)),
                    Cell::new(format!("{:.1}%", r.percentage)),
                    Cell::new(r.band().as_str()),
                    Cell::new(&r.id.to_string()[..8]),
                ]);
            }
            println!("{table}");
            println!("{} result(s)", recent.len());
        }
    }
    Ok(())
}

pub fn stats(config_path: Option<PathBuf>) -> Result<()> {
    let store = load_store(config_path)?;
    if store.is_empty() {
        println!("No saved results.");
        return Ok(());
    }
    let stats = compute_history_stats(store.list_all());

    let mut table = Table::new();
    table.set_header(vec!["Results", "Mean", "Median", "Min", "Max", "High", "Medium", "Low"]);
    let band = |name: &str| stats.bands.get(name).copied().unwrap_or(0);
    table.add_row(vec![
        Cell::new(stats.count),
        Cell::new(format!("{:.1}%", stats.mean_percentage)),
        Cell::new(format!("{:.1}%", stats.median_percentage)),
        Cell::new(format!("{:.1}%", stats.min_percentage)),
        Cell::new(format!("{:.1}%", stats.max_percentage)),
        Cell::new(band("high")),
        Cell::new(band("medium")),
        Cell::new(band("low")),
    ]);
    println!("{table}");

    let hardest = stats.hardest_questions(10);
    if !hardest.is_empty() {
        println!("\nMost missed questions:");
        let mut table = Table::new();
        table.set_header(vec!["Question", "Correct", "Blank", "Multiple", "Rate"]);
        for (q, s) in hardest {
            table.add_row(vec![
                Cell::new(q),
                Cell::new(format!("{}/{}", s.correct, s.attempts)),
                Cell::new(s.blank),
                Cell::new(s.ambiguous),
                Cell::new(format!("{:.0}%", s.correct_rate() * 100.0)),
            ]);
        }
        println!("{table}");
    }
    Ok(())
}

pub fn export(output: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let store = load_store(config_path)?;
    write_history_html(store.list_all(), &output)?;
    println!(
        "Exported {} result(s) to {}",
        store.len(),
        output.display()
    );
    Ok(())
}

pub fn clear(config_path: Option<PathBuf>) -> Result<()> {
    let mut store = load_store(config_path)?;
    let count = store.len();
    store.clear()?;
    println!("Cleared {count} result(s)");
    Ok(())
}
