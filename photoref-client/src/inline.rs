//! Detection and canonicalisation of inline image payloads.
//!
//! Backends hand out images inline in several loosely related shapes: a
//! `data:` URI (sometimes with the wrong subtype), bare base64, either of
//! those wrapped in JSON quotes, or an object carrying one of them. Everything
//! that is recognisably inline comes out as `data:<mime>;base64,<payload>`.

use crate::paths::{is_absolute_url, is_data_image_uri, looks_like_protected_path};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::Lazy;
use photoref_model::{RawImageReference, sniff_base64};
use regex::Regex;
use serde_json::Value;

/// Shortest string accepted as bare base64. Shorter strings are far more
/// likely to be opaque tokens or ids than images.
pub const MIN_RAW_BASE64_LEN: usize = 64;

static DATA_URI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^data:(image/[a-z0-9.+-]+)(?:;[^,]*)?;base64,(.*)$")
        .expect("data uri regex should compile")
});

static BASE64_ALPHABET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9+/]+={0,2}$").expect("base64 regex should compile")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+").expect("whitespace regex should compile")
});

/// Canonicalise `raw` into a data URI, or `None` when it is not an inline
/// image (absolute URLs and protected paths included).
pub fn normalize_image_payload(raw: &RawImageReference) -> Option<String> {
    let candidate = raw.candidate_text()?;
    normalize_text(candidate)
}

/// [`normalize_image_payload`] for a plain string.
pub fn normalize_text(candidate: &str) -> Option<String> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return None;
    }

    let unquoted = unquote(trimmed)?;
    let text = unquoted.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(captures) = DATA_URI_PATTERN.captures(text) {
        let declared = captures[1].to_ascii_lowercase();
        let payload = strip_whitespace(&captures[2]);
        if payload.is_empty() {
            return None;
        }
        let mime = sniff_base64(&payload)
            .map(|sniffed| sniffed.as_str().to_string())
            .unwrap_or(declared);
        return Some(format!("data:{mime};base64,{payload}"));
    }

    if is_absolute_url(text) || looks_like_protected_path(text) {
        return None;
    }

    let compact = strip_whitespace(text);
    // Loose `data:image/` strings that missed the strict pattern pass through.
    if is_data_image_uri(&compact) {
        return Some(compact);
    }
    if !is_raw_base64(&compact) {
        return None;
    }
    let mime = sniff_base64(&compact).unwrap_or_default();
    Some(format!("data:{mime};base64,{compact}"))
}

/// Heuristic used on text bodies before handing them to the normalizer.
pub fn looks_like_image_payload(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    if is_data_image_uri(text) {
        return true;
    }
    is_raw_base64(&strip_whitespace(text))
}

/// Encode binary content as a data URI labelled with `content_type`.
///
/// Only the media type essence is kept; a missing type becomes
/// `application/octet-stream`.
pub fn encode_data_uri(bytes: &[u8], content_type: Option<&str>) -> String {
    let essence = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    format!("data:{essence};base64,{}", STANDARD.encode(bytes))
}

fn is_raw_base64(compact: &str) -> bool {
    compact.len() >= MIN_RAW_BASE64_LEN && BASE64_ALPHABET.is_match(compact)
}

fn strip_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, "").into_owned()
}

/// Remove one layer of matching quotes. JSON string decoding is preferred;
/// quoted JSON that is not a string is not an image.
fn unquote(text: &str) -> Option<String> {
    let quoted = (text.starts_with('"') && text.ends_with('"'))
        || (text.starts_with('\'') && text.ends_with('\''));
    if !quoted {
        return Some(text.to_string());
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::String(inner)) => Some(inner),
        Ok(_) => None,
        Err(_) => {
            let inner = if text.len() >= 2 {
                &text[1..text.len() - 1]
            } else {
                ""
            };
            Some(inner.to_string())
        }
    }
}
