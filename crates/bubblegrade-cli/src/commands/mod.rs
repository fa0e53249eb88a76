//! Subcommand implementations and the helpers they share.

use std::path::Path;

use anyhow::Result;

use bubblegrade_core::model::{AnswerKey, SheetLayout};
use bubblegrade_core::parser::{parse_answer_key, validate_answer_key, KeyWarning};
use bubblegrade_core::store::{KeyStore, Storage};
use bubblegrade_providers::BubblegradeConfig;

pub mod grade;
pub mod history;
pub mod init;
pub mod key;
pub mod list_models;
pub mod output;
pub mod regrade;
pub mod validate;

/// The key a command grades against.
pub struct ResolvedKey {
    pub name: Option<String>,
    pub layout: SheetLayout,
    pub key: AnswerKey,
}

pub fn open_storage(config: &BubblegradeConfig) -> Result<Storage> {
    Storage::open(&config.data_dir)
}

/// Use the key file if given, otherwise the active key.
pub fn resolve_key(
    key_path: Option<&Path>,
    config: &BubblegradeConfig,
    allow_incomplete: bool,
) -> Result<ResolvedKey> {
    let resolved = match key_path {
        Some(path) => {
            let file = parse_answer_key(path)?;
            ResolvedKey {
                name: file.name,
                layout: file.layout,
                key: file.key,
            }
        }
        None => {
            let store = KeyStore::load(open_storage(config)?)?;
            let Some(key) = store.get() else {
                anyhow::bail!(
                    "no answer key set; run `bubblegrade key import --file KEY.toml` or pass --key"
                );
            };
            ResolvedKey {
                name: None,
                layout: config.layout,
                key: key.clone(),
            }
        }
    };
    check_key(&resolved.key, &resolved.layout, allow_incomplete)?;
    Ok(resolved)
}

/// Refuse empty keys, and incomplete keys unless the user opted in.
pub fn check_key(key: &AnswerKey, layout: &SheetLayout, allow_incomplete: bool) -> Result<()> {
    for warning in validate_answer_key(key, layout) {
        match warning {
            KeyWarning::Empty => anyhow::bail!("{warning}"),
            KeyWarning::Incomplete { .. } if allow_incomplete => {
                eprintln!("Warning: {warning}");
            }
            KeyWarning::Incomplete { .. } => {
                anyhow::bail!("{warning}; pass --allow-incomplete to grade anyway")
            }
        }
    }
    Ok(())
}
