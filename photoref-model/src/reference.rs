//! Loosely-typed photo references as returned by the backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Object fields that may wrap an inline image, in lookup order.
pub const WRAPPER_FIELDS: [&str; 6] =
    ["data", "image", "image_data", "imageData", "base64", "content"];

/// A photo reference in any of the shapes the backend is known to produce:
/// absolute URL, protected relative path, data URI, raw base64 (possibly
/// JSON-quoted), or an object wrapping one of those in a [`WRAPPER_FIELDS`]
/// entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawImageReference {
    #[default]
    Null,
    Text(String),
    Object(Map<String, Value>),
    Other(Value),
}

impl RawImageReference {
    pub fn is_null(&self) -> bool {
        matches!(self, RawImageReference::Null)
    }

    /// The trimmed string when this reference is plain text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawImageReference::Text(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then_some(trimmed)
            }
            _ => None,
        }
    }

    /// The string a normalizer should look at.
    ///
    /// For objects this is the first truthy wrapper field; a truthy field
    /// that is not a string hides any later field and yields `None`.
    pub fn candidate_text(&self) -> Option<&str> {
        match self {
            RawImageReference::Text(text) => Some(text.as_str()),
            RawImageReference::Object(fields) => WRAPPER_FIELDS
                .iter()
                .filter_map(|name| fields.get(*name))
                .find(|value| is_truthy(value))
                .and_then(Value::as_str),
            RawImageReference::Null | RawImageReference::Other(_) => None,
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => {
            number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan())
        }
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl From<Value> for RawImageReference {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawImageReference::Null,
            Value::String(text) => RawImageReference::Text(text),
            Value::Object(fields) => RawImageReference::Object(fields),
            other => RawImageReference::Other(other),
        }
    }
}

impl From<String> for RawImageReference {
    fn from(text: String) -> Self {
        RawImageReference::Text(text)
    }
}

impl From<&str> for RawImageReference {
    fn from(text: &str) -> Self {
        RawImageReference::Text(text.to_string())
    }
}

impl<T> From<Option<T>> for RawImageReference
where
    T: Into<RawImageReference>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}
