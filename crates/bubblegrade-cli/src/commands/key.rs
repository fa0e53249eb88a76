//! The `bubblegrade key` commands.

use std::path::PathBuf;

use anyhow::Result;

use bubblegrade_core::parser::parse_answer_key;
use bubblegrade_core::store::KeyStore;
use bubblegrade_providers::config::load_config_from;

use super::{check_key, open_storage};

pub fn import(file: PathBuf, allow_incomplete: bool, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let key_file = parse_answer_key(&file)?;
    check_key(&key_file.key, &key_file.layout, allow_incomplete)?;

    if key_file.layout.total_questions != config.layout.total_questions {
        eprintln!(
            "Warning: key file describes {} questions but the configured sheet has {}; \
             the configured layout is used when grading with the active key",
            key_file.layout.total_questions, config.layout.total_questions
        );
    }

    let mut store = KeyStore::load(open_storage(&config)?)?;
    let set = key_file.key.gradable_in(config.layout.total_questions);
    store.save(key_file.key)?;
    println!(
        "Saved answer key{} ({} of {} questions set)",
        key_file
            .name
            .map(|n| format!(" '{n}'"))
            .unwrap_or_default(),
        set,
        config.layout.total_questions
    );
    Ok(())
}

pub fn show(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = KeyStore::load(open_storage(&config)?)?;
    let Some(key) = store.get() else {
        println!("No answer key set. Run `bubblegrade key import --file KEY.toml`.");
        return Ok(());
    };

    let layout = config.layout;
    println!(
        "Answer key: {} of {} questions set",
        key.gradable_in(layout.total_questions),
        layout.total_questions
    );
    let sequence = key.to_sequence(layout.total_questions);
    for (range, chunk) in layout
        .column_ranges()
        .iter()
        .zip(sequence.as_bytes().chunks(layout.questions_per_column as usize))
    {
        println!(
            "  {:>3}-{:<3} {}",
            range.start(),
            range.end(),
            String::from_utf8_lossy(chunk)
        );
    }
    Ok(())
}

pub fn clear(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let mut store = KeyStore::load(open_storage(&config)?)?;
    if store.get().is_none() {
        println!("No answer key set.");
        return Ok(());
    }
    store.clear()?;
    println!("Answer key cleared.");
    Ok(())
}
