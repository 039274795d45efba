//! Interpretations of a protected-endpoint response body, cheapest first.
//!
//! Backends mislabel content: JSON-wrapped or base64 text declared as
//! `image/*`, and binary declared as something else. Each extractor reads the
//! buffered body on its own and the first one producing a data URI wins.

use crate::inline::{
    encode_data_uri, looks_like_image_payload, normalize_image_payload,
    normalize_text,
};
use crate::transport::FetchedBody;

use photoref_model::RawImageReference;
use serde_json::Value;

pub type Extractor = fn(&FetchedBody) -> Option<String>;

/// Extractors in the order they are attempted.
pub const EXTRACTORS: [(&str, Extractor); 3] =
    [("json", from_json), ("text", from_text), ("binary", from_binary)];

pub fn extract_image(body: &FetchedBody) -> Option<String> {
    EXTRACTORS.iter().find_map(|(name, extractor)| {
        let found = extractor(body);
        if found.is_some() {
            log::debug!("[extract] image payload found by {name} extractor");
        }
        found
    })
}

/// The whole body parsed as JSON, whatever the declared content type.
pub fn from_json(body: &FetchedBody) -> Option<String> {
    let value: Value = serde_json::from_slice(&body.bytes).ok()?;
    normalize_image_payload(&RawImageReference::from(value))
}

/// The body as text: JSON-shaped text is parsed leniently (after trimming),
/// otherwise text that looks like a data URI or bare base64 is normalized.
pub fn from_text(body: &FetchedBody) -> Option<String> {
    let text = body.text();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && let Ok(value) = serde_json::from_str::<Value>(trimmed)
        && let Some(found) = normalize_image_payload(&RawImageReference::from(value))
    {
        return Some(found);
    }

    if looks_like_image_payload(trimmed) {
        return normalize_text(trimmed);
    }
    None
}

/// The raw bytes encoded under the declared content type. The normalizer's
/// sniffing corrects a wrong image subtype.
pub fn from_binary(body: &FetchedBody) -> Option<String> {
    if body.bytes.is_empty() {
        return None;
    }
    let data_uri = encode_data_uri(&body.bytes, body.content_type.as_deref());
    normalize_text(&data_uri)
}
