//! Core data model types for bubblegrade.
//!
//! These types describe what an instructor expects (the answer key), what the
//! recognition service read off a sheet, and the layout of the sheet itself.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One selectable bubble on the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Choice {
    A,
    B,
    C,
    D,
    E,
}

impl Choice {
    /// All choices in sheet order.
    pub const ALL: [Choice; 5] = [Choice::A, Choice::B, Choice::C, Choice::D, Choice::E];

    pub fn as_str(&self) -> &'static str {
        match self {
            Choice::A => "A",
            Choice::B => "B",
            Choice::C => "C",
            Choice::D => "D",
            Choice::E => "E",
        }
    }

    fn from_letter(c: char) -> Option<Choice> {
        match c.to_ascii_uppercase() {
            'A' => Some(Choice::A),
            'B' => Some(Choice::B),
            'C' => Some(Choice::C),
            'D' => Some(Choice::D),
            'E' => Some(Choice::E),
            _ => None,
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Choice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                Choice::from_letter(c).ok_or_else(|| format!("unknown option: {trimmed}"))
            }
            _ => Err(format!("unknown option: {trimmed}")),
        }
    }
}

/// Wire value for "no bubble shaded".
pub const UNANSWERED_WIRE: &str = "N/A";
/// Wire value for "more than one bubble shaded".
pub const AMBIGUOUS_WIRE: &str = "MULTIPLE";

/// A single answer as read from a sheet.
///
/// Serialized as a plain string: `"A"`..`"E"`, `"N/A"` or `"MULTIPLE"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AnswerValue {
    Choice(Choice),
    Unanswered,
    Ambiguous,
}

impl AnswerValue {
    /// The concrete choice, if any.
    pub fn choice(&self) -> Option<Choice> {
        match self {
            AnswerValue::Choice(c) => Some(*c),
            _ => None,
        }
    }

    /// True only when this is exactly the given choice.
    pub fn matches(&self, expected: Choice) -> bool {
        self.choice() == Some(expected)
    }

    /// Parse a value coming from an untrusted source. Anything that is not a
    /// known wire value becomes `Unanswered`.
    pub fn parse_lenient(s: &str) -> AnswerValue {
        s.parse().unwrap_or(AnswerValue::Unanswered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerValue::Choice(c) => c.as_str(),
            AnswerValue::Unanswered => UNANSWERED_WIRE,
            AnswerValue::Ambiguous => AMBIGUOUS_WIRE,
        }
    }
}

impl From<Choice> for AnswerValue {
    fn from(c: Choice) -> Self {
        AnswerValue::Choice(c)
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "" | "N/A" | "NA" | "NONE" => Ok(AnswerValue::Unanswered),
            "MULTIPLE" => Ok(AnswerValue::Ambiguous),
            _ => trimmed.parse::<Choice>().map(AnswerValue::Choice),
        }
    }
}

impl TryFrom<String> for AnswerValue {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AnswerValue> for String {
    fn from(value: AnswerValue) -> Self {
        value.as_str().to_string()
    }
}

/// Pixel position of a detected mark, relative to the image's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

/// A recognized answer plus where it was seen (overlay rendering only).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecognizedMark {
    pub value: AnswerValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl From<AnswerValue> for RecognizedMark {
    fn from(value: AnswerValue) -> Self {
        Self {
            value,
            location: None,
        }
    }
}

/// The instructor-defined correct answers.
///
/// Questions without an entry are unset and never graded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerKey {
    answers: BTreeMap<u32, Choice>,
}

impl AnswerKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, question: u32, choice: Choice) {
        self.answers.insert(question, choice);
    }

    pub fn unset(&mut self, question: u32) {
        self.answers.remove(&question);
    }

    pub fn get(&self, question: u32) -> Option<Choice> {
        self.answers.get(&question).copied()
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Choice)> + '_ {
        self.answers.iter().map(|(q, c)| (*q, *c))
    }

    /// Number of set questions that fall inside `1..=total`.
    pub fn gradable_in(&self, total: u32) -> usize {
        self.answers.range(1..=total).count()
    }

    /// Questions in `1..=total` that have no answer yet.
    pub fn missing(&self, total: u32) -> Vec<u32> {
        (1..=total)
            .filter(|q| !self.answers.contains_key(q))
            .collect()
    }

    pub fn is_complete(&self, total: u32) -> bool {
        self.gradable_in(total) == total as usize
    }

    /// Build a key from a compact letter sequence where position `i` is
    /// question `i + 1`. `-`, `.`, `_` and spaces leave a question unset.
    pub fn from_sequence(sequence: &str) -> Result<Self, String> {
        let mut key = AnswerKey::new();
        for (idx, c) in sequence.chars().enumerate() {
            let question = idx as u32 + 1;
            match c {
                '-' | '.' | '_' | ' ' => {}
                other => {
                    let choice = Choice::from_letter(other).ok_or_else(|| {
                        format!("invalid option '{other}' for question {question}")
                    })?;
                    key.set(question, choice);
                }
            }
        }
        Ok(key)
    }

    /// Render the first `total` questions as a compact sequence.
    pub fn to_sequence(&self, total: u32) -> String {
        (1..=total)
            .map(|q| match self.get(q) {
                Some(c) => c.as_str().chars().next().unwrap_or('-'),
                None => '-',
            })
            .collect()
    }
}

impl FromIterator<(u32, Choice)> for AnswerKey {
    fn from_iter<T: IntoIterator<Item = (u32, Choice)>>(iter: T) -> Self {
        Self {
            answers: iter.into_iter().collect(),
        }
    }
}

/// Answers read off one captured sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecognizedAnswers {
    marks: BTreeMap<u32, RecognizedMark>,
}

impl RecognizedAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, question: u32, mark: impl Into<RecognizedMark>) {
        self.marks.insert(question, mark.into());
    }

    /// The answer for a question; absent questions read as `Unanswered`.
    pub fn value(&self, question: u32) -> AnswerValue {
        self.marks
            .get(&question)
            .map(|m| m.value)
            .unwrap_or(AnswerValue::Unanswered)
    }

    pub fn mark(&self, question: u32) -> Option<&RecognizedMark> {
        self.marks.get(&question)
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &RecognizedMark)> + '_ {
        self.marks.iter().map(|(q, m)| (*q, m))
    }
}

impl FromIterator<(u32, AnswerValue)> for RecognizedAnswers {
    fn from_iter<T: IntoIterator<Item = (u32, AnswerValue)>>(iter: T) -> Self {
        Self {
            marks: iter.into_iter().map(|(q, v)| (q, v.into())).collect(),
        }
    }
}

/// Physical layout of the printed sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLayout {
    /// Number of questions on the sheet.
    #[serde(default = "default_total_questions")]
    pub total_questions: u32,
    /// Questions printed per column block.
    #[serde(default = "default_questions_per_column")]
    pub questions_per_column: u32,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            total_questions: default_total_questions(),
            questions_per_column: default_questions_per_column(),
        }
    }
}

impl SheetLayout {
    pub fn new(total_questions: u32, questions_per_column: u32) -> Self {
        Self {
            total_questions,
            questions_per_column,
        }
    }

    /// Number of column blocks on the sheet.
    pub fn columns(&self) -> u32 {
        if self.questions_per_column == 0 {
            return 0;
        }
        self.total_questions.div_ceil(self.questions_per_column)
    }

    /// Question ranges per column block, e.g. `1..=15, 16..=30, ...`.
    pub fn column_ranges(&self) -> Vec<std::ops::RangeInclusive<u32>> {
        (0..self.columns())
            .map(|col| {
                let start = col * self.questions_per_column + 1;
                let end = ((col + 1) * self.questions_per_column).min(self.total_questions);
                start..=end
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.total_questions == 0 {
            return Err("total_questions must be at least 1".into());
        }
        if self.questions_per_column == 0 {
            return Err("questions_per_column must be at least 1".into());
        }
        Ok(())
    }
}

fn default_total_questions() -> u32 {
    60
}

fn default_questions_per_column() -> u32 {
    15
}
