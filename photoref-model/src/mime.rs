//! Image MIME types and base64 signature sniffing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Image formats recognised from the leading characters of a base64 payload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub enum ImageMime {
    #[default]
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
}

impl ImageMime {
    pub const fn as_str(self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
            ImageMime::Gif => "image/gif",
            ImageMime::Webp => "image/webp",
            ImageMime::Bmp => "image/bmp",
        }
    }

    /// Parse a declared label such as `IMAGE/PNG`. Unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageMime::Jpeg),
            "image/png" => Some(ImageMime::Png),
            "image/gif" => Some(ImageMime::Gif),
            "image/webp" => Some(ImageMime::Webp),
            "image/bmp" | "image/x-ms-bmp" => Some(ImageMime::Bmp),
            _ => None,
        }
    }
}

impl fmt::Display for ImageMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ImageMime> for String {
    fn from(mime: ImageMime) -> Self {
        mime.as_str().to_string()
    }
}

impl TryFrom<String> for ImageMime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ImageMime::from_label(&value)
            .ok_or_else(|| format!("unsupported image mime: {value}"))
    }
}

/// One row of the sniffing table.
///
/// `marker`, when set, must additionally appear within the first
/// [`MARKER_WINDOW`] characters of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Base64Signature {
    pub prefix: &'static str,
    pub marker: Option<&'static str>,
    pub mime: ImageMime,
}

impl Base64Signature {
    const fn new(prefix: &'static str, mime: ImageMime) -> Self {
        Self {
            prefix,
            marker: None,
            mime,
        }
    }

    const fn with_marker(
        prefix: &'static str,
        marker: &'static str,
        mime: ImageMime,
    ) -> Self {
        Self {
            prefix,
            marker: Some(marker),
            mime,
        }
    }

    fn matches(&self, payload: &str) -> bool {
        if !payload.starts_with(self.prefix) {
            return false;
        }
        match self.marker {
            Some(marker) => leading_window(payload).contains(marker),
            None => true,
        }
    }
}

/// Number of leading characters searched for a signature marker.
pub const MARKER_WINDOW: usize = 64;

/// Known signatures, evaluated in order. New formats are appended here.
pub static BASE64_SIGNATURES: &[Base64Signature] = &[
    Base64Signature::new("/9j/", ImageMime::Jpeg),
    Base64Signature::new("iVBORw0KGgo", ImageMime::Png),
    Base64Signature::new("R0lGODdh", ImageMime::Gif),
    Base64Signature::new("R0lGODlh", ImageMime::Gif),
    // RIFF container carrying a WEBP chunk
    Base64Signature::with_marker("UklGR", "V0VCUA", ImageMime::Webp),
    Base64Signature::new("Qk", ImageMime::Bmp),
];

/// Infer the image type of a base64 payload (without any `data:` prefix).
pub fn sniff_base64(payload: &str) -> Option<ImageMime> {
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }
    BASE64_SIGNATURES
        .iter()
        .find(|signature| signature.matches(payload))
        .map(|signature| signature.mime)
}

fn leading_window(payload: &str) -> &str {
    match payload.char_indices().nth(MARKER_WINDOW) {
        Some((idx, _)) => &payload[..idx],
        None => payload,
    }
}
