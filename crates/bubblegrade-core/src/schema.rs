//! Recognition prompt and structured-output schema.

use serde_json::{json, Map, Value};

use crate::model::{SheetLayout, AMBIGUOUS_WIRE, UNANSWERED_WIRE};

/// Which flavour of schema the target API understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaDialect {
    /// Standard JSON Schema (OpenAI structured outputs, prompts).
    JsonSchema,
    /// Gemini's OpenAPI subset: upper-case type names, no `additionalProperties`.
    Gemini,
}

impl SchemaDialect {
    fn ty(&self, name: &str) -> Value {
        match self {
            SchemaDialect::JsonSchema => Value::String(name.to_string()),
            SchemaDialect::Gemini => Value::String(name.to_ascii_uppercase()),
        }
    }
}

/// Every value a reply may use for a question.
pub fn answer_wire_values() -> Vec<&'static str> {
    vec!["A", "B", "C", "D", "E", UNANSWERED_WIRE, AMBIGUOUS_WIRE]
}

/// Build the response schema: an object with required keys "1".."N".
pub fn response_schema(layout: &SheetLayout, request_locations: bool, dialect: SchemaDialect) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::with_capacity(layout.total_questions as usize);

    for q in 1..=layout.total_questions {
        let key = q.to_string();
        let value_schema = json!({
            "type": dialect.ty("string"),
            "enum": answer_wire_values(),
            "description": format!(
                "The answer for question {q}. Can be \"A\", \"B\", \"C\", \"D\", \"E\", \"{UNANSWERED_WIRE}\", or \"{AMBIGUOUS_WIRE}\"."
            ),
        });

        let property = if request_locations {
            let mut coordinates = json!({
                "type": dialect.ty("object"),
                "properties": {
                    "x": { "type": dialect.ty("number") },
                    "y": { "type": dialect.ty("number") },
                },
                "required": ["x", "y"],
            });
            let mut object = json!({
                "type": dialect.ty("object"),
                "properties": {
                    "value": value_schema,
                    "coordinates": coordinates.clone(),
                },
                "required": ["value"],
            });
            if dialect == SchemaDialect::JsonSchema {
                coordinates["additionalProperties"] = Value::Bool(false);
                object["properties"]["coordinates"] = coordinates;
                object["additionalProperties"] = Value::Bool(false);
            }
            object
        } else {
            value_schema
        };

        properties.insert(key.clone(), property);
        required.push(Value::String(key));
    }

    let mut schema = json!({
        "type": dialect.ty("object"),
        "properties": Value::Object(properties),
        "required": required,
    });
    if dialect == SchemaDialect::JsonSchema {
        schema["additionalProperties"] = Value::Bool(false);
    }
    schema
}

/// Build the OMR instructions sent alongside the image.
pub fn recognition_prompt(layout: &SheetLayout, request_locations: bool) -> String {
    let total = layout.total_questions;
    let mut grid = String::new();
    for (col, range) in layout.column_ranges().iter().enumerate() {
        grid.push_str(&format!(
            "  - Block {}: questions {}-{}, each followed by options A, B, C, D, E.\n",
            col + 1,
            range.start(),
            range.end()
        ));
    }

    let output_shape = if request_locations {
        format!(
            "Return a JSON object whose keys are the question numbers as strings (\"1\" to \"{total}\"). \
Each value is an object {{\"value\": <answer>, \"coordinates\": {{\"x\": <px>, \"y\": <px>}}}} where \
coordinates are the pixel center of the shaded bubble measured from the top-left of the original image \
(omit coordinates when nothing is shaded)."
        )
    } else {
        format!(
            "Return a JSON object whose keys are the question numbers as strings (\"1\" to \"{total}\") \
and whose values are the answers."
        )
    };

    format!(
        "You are an expert assistant for optical mark recognition (OMR). Analyze the image of an \
answer sheet and extract the answers that were marked.

Answer sheet layout:
- {total} questions in total, arranged in {columns} column blocks of up to {per_column} questions.
{grid}- A bubble counts as shaded when it is at least 60% filled, especially in the center.

Instructions:
1. Locate the rectangular answer sheet in the image even if it is rotated or skewed, and ignore everything around it.
2. For each question from 1 to {total}, determine which option (A, B, C, D or E) is shaded.
3. If no bubble is shaded the answer is \"{UNANSWERED_WIRE}\".
4. If more than one bubble is shaded the answer is \"{AMBIGUOUS_WIRE}\".
5. {output_shape}

Respond with the JSON object only.",
        columns = layout.columns(),
        per_column = layout.questions_per_column,
    )
}
