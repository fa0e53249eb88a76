//! TOML answer key parser.
//!
//! Loads answer keys from TOML files and validates them.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{AnswerKey, Choice, SheetLayout};

/// Intermediate TOML structure for parsing answer key files.
#[derive(Debug, Deserialize)]
struct TomlKeyFile {
    #[serde(default)]
    sheet: TomlSheetHeader,
    #[serde(default)]
    answers: BTreeMap<String, String>,
    #[serde(default)]
    sequence: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlSheetHeader {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    total_questions: Option<u32>,
    #[serde(default)]
    questions_per_column: Option<u32>,
}

/// A parsed answer key file.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFile {
    /// Optional name of the exam or sheet.
    pub name: Option<String>,
    /// Sheet layout; defaults to 60 questions in columns of 15.
    pub layout: SheetLayout,
    /// The answers.
    pub key: AnswerKey,
}

/// Parse a single TOML file into a `KeyFile`.
pub fn parse_answer_key(path: &Path) -> Result<KeyFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read answer key file: {}", path.display()))?;

    parse_answer_key_str(&content, path)
}

/// Parse a TOML string into a `KeyFile` (useful for testing).
pub fn parse_answer_key_str(content: &str, source_path: &Path) -> Result<KeyFile> {
    let parsed: TomlKeyFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let defaults = SheetLayout::default();
    let layout = SheetLayout::new(
        parsed
            .sheet
            .total_questions
            .unwrap_or(defaults.total_questions),
        parsed
            .sheet
            .questions_per_column
            .unwrap_or(defaults.questions_per_column),
    );
    layout
        .validate()
        .map_err(|e| anyhow::anyhow!("{}: {e}", source_path.display()))?;

    let mut key = match &parsed.sequence {
        // Leading blanks are unset questions, so only the end is trimmed.
        Some(seq) => AnswerKey::from_sequence(seq.trim_end())
            .map_err(|e| anyhow::anyhow!("{}: {e}", source_path.display()))?,
        None => AnswerKey::new(),
    };

    for (question, option) in &parsed.answers {
        let q: u32 = question.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "{}: '{question}' is not a question number",
                source_path.display()
            )
        })?;
        if option.trim().is_empty() {
            key.unset(q);
            continue;
        }
        let choice: Choice = option
            .parse()
            .map_err(|e: String| anyhow::anyhow!("{}: question {q}: {e}", source_path.display()))?;
        key.set(q, choice);
    }

    if let Some((q, _)) = key
        .iter()
        .find(|(q, _)| *q == 0 || *q > layout.total_questions)
    {
        anyhow::bail!(
            "{}: question {q} is outside 1..={}",
            source_path.display(),
            layout.total_questions
        );
    }

    Ok(KeyFile {
        name: parsed.sheet.name,
        layout,
        key,
    })
}

/// An advisory found while checking an answer key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyWarning {
    /// Some questions have no answer; they will not be graded.
    Incomplete { missing: Vec<u32> },
    /// No question has an answer; every sheet will score 0.
    Empty,
}

impl std::fmt::Display for KeyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyWarning::Incomplete { missing } => write!(
                f,
                "answer key is incomplete: {} question(s) unset ({})",
                missing.len(),
                format_ranges(missing)
            ),
            KeyWarning::Empty => write!(f, "answer key is empty"),
        }
    }
}

/// Check an answer key for common issues.
pub fn validate_answer_key(key: &AnswerKey, layout: &SheetLayout) -> Vec<KeyWarning> {
    let mut warnings = Vec::new();

    if key.gradable_in(layout.total_questions) == 0 {
        warnings.push(KeyWarning::Empty);
        return warnings;
    }

    let missing = key.missing(layout.total_questions);
    if !missing.is_empty() {
        warnings.push(KeyWarning::Incomplete { missing });
    }

    warnings
}

/// Compress sorted question numbers into "1-3, 7, 9-10".
pub fn format_ranges(questions: &[u32]) -> String {
    let mut parts = Vec::new();
    let mut iter = questions.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}-{end}"));
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[sheet]
name = "Midterm"
total_questions = 5
questions_per_column = 5

[answers]
1 = "A"
2 = "b"
3 = "C"
4 = "D"
5 = "E"
"#;

    #[test]
    fn parse_valid_toml() {
        let file = parse_answer_key_str(VALID_TOML, &PathBuf::from("key.toml")).unwrap();
        assert_eq!(file.name.as_deref(), Some("Midterm"));
        assert_eq!(file.layout.total_questions, 5);
        assert_eq!(file.key.get(2), Some(Choice::B));
        assert!(validate_answer_key(&file.key, &file.layout).is_empty());
    }

    #[test]
    fn parse_defaults_to_sixty_questions() {
        let toml = r#"
[answers]
1 = "A"
"#;
        let file = parse_answer_key_str(toml, &PathBuf::from("key.toml")).unwrap();
        assert_eq!(file.layout, SheetLayout::default());
        assert!(file.name.is_none());
    }

    #[test]
    fn sequence_with_overrides() {
        let toml = r#"
sequence = "ABCDE-----"

[sheet]
total_questions = 10

[answers]
6 = "E"
2 = ""
"#;
        let file = parse_answer_key_str(toml, &PathBuf::from("key.toml")).unwrap();
        assert_eq!(file.key.get(1), Some(Choice::A));
        assert_eq!(file.key.get(2), None);
        assert_eq!(file.key.get(6), Some(Choice::E));
        assert_eq!(file.key.len(), 5);
    }

    #[test]
    fn leading_blanks_in_sequence_keep_positions() {
        let toml = r#"
sequence = "  CD"

[sheet]
total_questions = 4
"#;
        let file = parse_answer_key_str(toml, &PathBuf::from("key.toml")).unwrap();
        assert_eq!(file.key.get(1), None);
        assert_eq!(file.key.get(2), None);
        assert_eq!(file.key.get(3), Some(Choice::C));
        assert_eq!(file.key.get(4), Some(Choice::D));
    }

    #[test]
    fn multiline_sequence_ignores_trailing_newline() {
        let toml = "sequence = \"\"\"\nAB-E\n\"\"\"\n\n[sheet]\ntotal_questions = 4\n";
        let file = parse_answer_key_str(toml, &PathBuf::from("key.toml")).unwrap();
        assert_eq!(file.key.get(4), Some(Choice::E));
        assert_eq!(file.key.len(), 3);
    }

    #[test]
    fn invalid_option_is_an_error() {
        let toml = r#"
[answers]
1 = "F"
"#;
        let err = parse_answer_key_str(toml, &PathBuf::from("key.toml")).unwrap_err();
        assert!(err.to_string().contains("question 1"));
    }

    #[test]
    fn question_out_of_range_is_an_error() {
        let toml = r#"
[sheet]
total_questions = 3

[answers]
4 = "A"
"#;
        let err = parse_answer_key_str(toml, &PathBuf::from("key.toml")).unwrap_err();
        assert!(err.to_string().contains("outside 1..=3"));
    }

    #[test]
    fn validate_incomplete_key() {
        let key = AnswerKey::from_sequence("AB-D").unwrap();
        let warnings = validate_answer_key(&key, &SheetLayout::new(6, 6));
        assert_eq!(
            warnings,
            vec![KeyWarning::Incomplete {
                missing: vec![3, 5, 6]
            }]
        );
        assert!(warnings[0].to_string().contains("3 question(s) unset (3, 5-6)"));
    }

    #[test]
    fn validate_empty_key() {
        let warnings = validate_answer_key(&AnswerKey::new(), &SheetLayout::default());
        assert_eq!(warnings, vec![KeyWarning::Empty]);
    }

    #[test]
    fn parse_malformed_toml() {
        let result = parse_answer_key_str("this is not [valid toml }{", &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn parse_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.toml");
        std::fs::write(&path, VALID_TOML).unwrap();
        let file = parse_answer_key(&path).unwrap();
        assert_eq!(file.key.len(), 5);
    }
}
