//! Normalization of recognition replies.
//!
//! Replies come from a non-deterministic service and are untrusted. This is
//! the only place raw JSON is looked at: the output is a closed
//! [`RecognizedAnswers`] where every question in `1..=N` holds a valid value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RecognitionError;
use crate::model::{AnswerValue, Location, RecognizedAnswers, RecognizedMark};

/// A per-question value that could not be understood and was coerced to
/// `Unanswered`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationIssue {
    pub question: u32,
    /// The raw JSON that was rejected.
    pub raw: String,
}

/// Normalized reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub answers: RecognizedAnswers,
    /// Values coerced to `Unanswered`.
    pub issues: Vec<NormalizationIssue>,
    /// Questions with no entry in the reply at all.
    pub missing: Vec<u32>,
    /// Keys that are not question numbers in `1..=N`.
    pub ignored_keys: usize,
}

/// Strip a Markdown code fence around a JSON reply, if present.
///
/// Handles ```` ```json ```` and bare ```` ``` ```` fences, including an
/// unclosed fence at the end of a truncated reply.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[start + 3..];
    // Skip the info string ("json") up to the end of the line.
    let body = match after_fence.find('\n') {
        Some(nl) => &after_fence[nl + 1..],
        None => after_fence,
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parse a reply into answers for questions `1..=total_questions`.
///
/// Fails only when the reply as a whole is unusable (not JSON, or not an
/// object). Individual bad values never fail the call.
pub fn normalize_response(text: &str, total_questions: u32) -> Result<Normalized, RecognitionError> {
    let json = extract_json(text);
    let value: Value = serde_json::from_str(json)
        .map_err(|e| RecognitionError::MalformedResponse(format!("invalid JSON: {e}")))?;
    normalize_value(&value, total_questions)
}

/// Same as [`normalize_response`] for an already-parsed document.
pub fn normalize_value(value: &Value, total_questions: u32) -> Result<Normalized, RecognitionError> {
    let Value::Object(map) = value else {
        return Err(RecognitionError::MalformedResponse(format!(
            "expected a JSON object, got {}",
            json_kind(value)
        )));
    };

    let mut normalized = Normalized::default();

    normalized.ignored_keys = map
        .keys()
        .filter(|k| {
            k.trim()
                .parse::<u32>()
                .map(|q| q == 0 || q > total_questions)
                .unwrap_or(true)
        })
        .count();

    for question in 1..=total_questions {
        let entry = map
            .get(&question.to_string())
            .or_else(|| find_padded_key(map, question));

        let mark = match entry {
            None => {
                normalized.missing.push(question);
                RecognizedMark::from(AnswerValue::Unanswered)
            }
            Some(raw) => match parse_mark(raw) {
                Some(mark) => mark,
                None => {
                    normalized.issues.push(NormalizationIssue {
                        question,
                        raw: raw.to_string(),
                    });
                    RecognizedMark::from(AnswerValue::Unanswered)
                }
            },
        };
        normalized.answers.insert(question, mark);
    }

    if !normalized.issues.is_empty() {
        tracing::warn!(
            "coerced {} unrecognized answer value(s) to {}",
            normalized.issues.len(),
            AnswerValue::Unanswered
        );
    }
    if !normalized.missing.is_empty() {
        tracing::debug!("reply omitted questions {:?}", normalized.missing);
    }

    Ok(normalized)
}

/// Keys like "01" or " 7 " that still name a question.
fn find_padded_key<'a>(map: &'a serde_json::Map<String, Value>, question: u32) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.trim().parse::<u32>().ok() == Some(question))
        .map(|(_, v)| v)
}

/// `None` means the value is not understood.
fn parse_mark(raw: &Value) -> Option<RecognizedMark> {
    match raw {
        Value::Null => Some(AnswerValue::Unanswered.into()),
        Value::String(s) => s.parse::<AnswerValue>().ok().map(RecognizedMark::from),
        Value::Object(obj) => {
            let value = match obj.get("value") {
                None | Some(Value::Null) => AnswerValue::Unanswered,
                Some(Value::String(s)) => s.parse::<AnswerValue>().ok()?,
                Some(_) => return None,
            };
            let location = obj
                .get("coordinates")
                .or_else(|| obj.get("location"))
                .and_then(parse_location);
            Some(RecognizedMark { value, location })
        }
        _ => None,
    }
}

fn parse_location(raw: &Value) -> Option<Location> {
    let x = raw.get("x")?.as_f64()?;
    let y = raw.get("y")?.as_f64()?;
    if x.is_finite() && y.is_finite() {
        Some(Location { x, y })
    } else {
        None
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
