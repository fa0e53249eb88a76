//! The `bubblegrade validate` command.

use std::path::PathBuf;

use anyhow::Result;

use bubblegrade_core::parser::{parse_answer_key, validate_answer_key, KeyWarning};

pub fn execute(key_path: PathBuf) -> Result<()> {
    let file = parse_answer_key(&key_path)?;
    let layout = file.layout;

    println!(
        "Answer key: {} ({} of {} questions set, {} per column)",
        file.name.as_deref().unwrap_or("unnamed"),
        file.key.gradable_in(layout.total_questions),
        layout.total_questions,
        layout.questions_per_column
    );

    let warnings = validate_answer_key(&file.key, &layout);
    for w in &warnings {
        println!("  WARNING: {w}");
    }

    if warnings.contains(&KeyWarning::Empty) {
        anyhow::bail!("{} has no answers", key_path.display());
    }
    if warnings.is_empty() {
        println!("Answer key valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
