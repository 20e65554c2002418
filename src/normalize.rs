//! Display text from model responses.
//!
//! Serving backends disagree on the response layout, so a response is first
//! classified into one of the layouts seen in practice and then rendered.
//! Classification order matters: the first matching layout wins.

use serde_json::Value;

/// Shown when a backend returns nothing usable.
pub const EMPTY_RESPONSE: &str = "(empty response)";

/// Keys holding the reply verbatim, checked in this order.
const DIRECT_FIELDS: [&str; 3] = ["output", "result", "raw_text"];

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape<'a> {
    /// null, `""` or `[]`.
    Empty,
    /// The selected prediction: first element of `predictions`, or the scalar
    /// itself. `None` when the list is empty.
    Predictions(Option<&'a Value>),
    /// `choices[0].message.content`, with the whole object kept for when that
    /// path is missing.
    Choices {
        content: Option<&'a Value>,
        raw: &'a Value,
    },
    /// One of `output`, `result`, `raw_text`.
    Field(&'a Value),
    /// An object with none of the known keys.
    Unrecognized(&'a Value),
    /// A list whose elements are all scalars.
    Lines(&'a [Value]),
    /// Anything else.
    Scalar(&'a Value),
}

pub fn classify(value: &Value) -> ResponseShape<'_> {
    match value {
        Value::Null => ResponseShape::Empty,
        Value::String(s) if s.is_empty() => ResponseShape::Empty,
        Value::Array(items) if items.is_empty() => ResponseShape::Empty,
        Value::Object(map) => {
            if let Some(predictions) = map.get("predictions") {
                let selected = match predictions {
                    Value::Array(items) => items.first(),
                    scalar => Some(scalar),
                };
                return ResponseShape::Predictions(selected);
            }
            if map.contains_key("choices") {
                let content = value
                    .pointer("/choices/0/message/content")
                    .filter(|c| !c.is_null());
                return ResponseShape::Choices { content, raw: value };
            }
            if let Some(field) = DIRECT_FIELDS.iter().find_map(|key| map.get(*key)) {
                return ResponseShape::Field(field);
            }
            ResponseShape::Unrecognized(value)
        }
        Value::Array(items) if items.iter().all(is_scalar) => ResponseShape::Lines(items.as_slice()),
        other => ResponseShape::Scalar(other),
    }
}

impl ResponseShape<'_> {
    pub fn render(&self) -> String {
        match self {
            ResponseShape::Empty | ResponseShape::Predictions(None) => EMPTY_RESPONSE.to_string(),
            ResponseShape::Predictions(Some(prediction)) => render_prediction(prediction),
            ResponseShape::Choices {
                content: Some(content),
                ..
            } => stringify(content),
            ResponseShape::Choices { content: None, raw } => to_json(raw),
            ResponseShape::Field(field) => stringify(field),
            ResponseShape::Unrecognized(raw) => to_json(raw),
            ResponseShape::Lines(items) => items.iter().map(stringify).collect::<Vec<_>>().join("\n"),
            ResponseShape::Scalar(value) => stringify(value),
        }
    }
}

/// Display string for any JSON value. Never fails.
pub fn normalize(value: &Value) -> String {
    classify(value).render()
}

fn render_prediction(prediction: &Value) -> String {
    match prediction {
        Value::Object(map) => match ["content", "text"]
            .iter()
            .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
        {
            Some(inner) => stringify(inner),
            None => to_json(prediction),
        },
        other => stringify(other),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Strings unquoted, everything else as JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => to_json(other),
    }
}

fn to_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
