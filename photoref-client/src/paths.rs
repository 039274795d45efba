//! Classification of image references into absolute URLs and protected API
//! paths, and conversion between the two.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static ABSOLUTE_URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://").expect("absolute url regex should compile")
});

static DATA_IMAGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^data:image/").expect("data uri regex should compile")
});

static USER_PHOTO_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^/users/.*photo").expect("user photo regex should compile")
});

static CHILD_PHOTO_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^/children/[0-9]+/photo(\b|\?|#|$)")
        .expect("child photo regex should compile")
});

pub fn is_absolute_url(value: &str) -> bool {
    ABSOLUTE_URL_PATTERN.is_match(value)
}

pub fn is_data_image_uri(value: &str) -> bool {
    DATA_IMAGE_PATTERN.is_match(value)
}

/// Whether `value` has the shape of one of the backend's protected photo
/// endpoints (`/users/...photo`, `/children/<id>/photo`).
pub fn looks_like_protected_path(value: &str) -> bool {
    let value = value.trim();
    if !value.starts_with('/') {
        return false;
    }
    USER_PHOTO_PATH.is_match(value) || CHILD_PHOTO_PATH.is_match(value)
}

/// First non-blank of `raw` and `fallback`, trimmed.
pub(crate) fn pick_candidate<'a>(
    raw: Option<&'a str>,
    fallback: Option<&'a str>,
) -> Option<&'a str> {
    [raw, fallback]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// Resolve a reference into a loadable URI. Absolute URLs pass through
/// untouched; anything else is joined onto `base` with a single slash.
pub fn resolve_api_image_uri(
    base: &str,
    raw: Option<&str>,
    fallback: Option<&str>,
) -> Option<String> {
    let value = pick_candidate(raw, fallback)?;
    if is_absolute_url(value) {
        return Some(value.to_string());
    }
    Some(format!(
        "{}/{}",
        base.trim_end_matches('/'),
        value.trim_start_matches('/')
    ))
}

/// Inverse of [`resolve_api_image_uri`]: reduce a reference to the
/// `path?query` that can be re-issued against `base` with credentials.
pub fn to_protected_path(
    base: &str,
    raw: Option<&str>,
    fallback: Option<&str>,
) -> Option<String> {
    let value = pick_candidate(raw, fallback)?;
    if !is_absolute_url(value) {
        return Some(with_leading_slash(value));
    }

    let base = base.trim_end_matches('/');
    if !base.is_empty()
        && let Some(rest) = value.strip_prefix(base)
    {
        return Some(with_leading_slash(rest));
    }

    let url = Url::parse(value).ok()?;
    let mut path = url.path().to_string();
    if let Some(query) = url.query().filter(|query| !query.is_empty()) {
        path.push('?');
        path.push_str(query);
    }
    (!path.is_empty()).then_some(path)
}

fn with_leading_slash(value: &str) -> String {
    if value.starts_with('/') {
        value.to_string()
    } else {
        format!("/{value}")
    }
}
