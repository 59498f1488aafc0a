use crate::engine::EngineError;
use image::RgbImage;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

/// Identity reported when no gallery entry verifies against the probe.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Longest normalized label, in bytes. Keeps `<label>.jpg` well under the
/// common 255-byte file name limit.
pub const MAX_LABEL_BYTES: usize = 200;

/// Normalized, filesystem-safe identity name.
///
/// Whitespace runs and path separators collapse to `_`, characters other than
/// alphanumerics, `_`, `-` and `.` are dropped, and leading/trailing `.` or `_`
/// are stripped. A label is never empty and never longer than
/// [`MAX_LABEL_BYTES`]. Combining marks are not alphanumeric, so decomposed
/// input such as `e\u{301}` loses its accents; precomposed letters are kept.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Label(String);

impl Label {
    pub fn normalize(raw: &str) -> Result<Self, EngineError> {
        let mut out = String::with_capacity(raw.len());
        let mut pending_sep = false;

        for ch in raw.trim().chars() {
            if ch.is_whitespace() || ch == '/' || ch == '\\' {
                pending_sep = true;
                continue;
            }
            if !(ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.')) {
                continue;
            }
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        }

        let trimmed = out.trim_matches(|c| c == '.' || c == '_');
        if trimmed.is_empty() {
            return Err(EngineError::InvalidLabel {
                raw: raw.to_string(),
                reason: "empty after normalization; enter a name to enroll".into(),
            });
        }
        if trimmed.len() > MAX_LABEL_BYTES {
            return Err(EngineError::InvalidLabel {
                raw: raw.to_string(),
                reason: format!("longer than {MAX_LABEL_BYTES} bytes after normalization"),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to one enrolled identity. The image itself is read on demand
/// through the owning [`GalleryStore`](crate::gallery::GalleryStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryEntry {
    pub label: Label,
    pub path: PathBuf,
}

/// A decoded face image submitted for identification or enrollment.
#[derive(Debug, Clone)]
pub struct ProbeImage {
    pixels: RgbImage,
}

impl ProbeImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// Decode encoded image bytes (JPEG, PNG, ...) into an RGB probe.
    pub fn decode(bytes: &[u8]) -> Result<Self, EngineError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| EngineError::InvalidImage(format!("cannot decode image: {e}")))?;
        let probe = Self::new(decoded.to_rgb8());
        if probe.is_empty() {
            return Err(EngineError::InvalidImage("decoded image has no pixels".into()));
        }
        Ok(probe)
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.width() == 0 || self.pixels.height() == 0
    }
}

/// Outcome of a gallery scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Matched(GalleryEntry),
    Unknown,
}

impl MatchResult {
    /// Matched label, or [`UNKNOWN_IDENTITY`].
    pub fn label(&self) -> &str {
        match self {
            MatchResult::Matched(entry) => entry.label.as_str(),
            MatchResult::Unknown => UNKNOWN_IDENTITY,
        }
    }

    pub fn entry(&self) -> Option<&GalleryEntry> {
        match self {
            MatchResult::Matched(entry) => Some(entry),
            MatchResult::Unknown => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched(_))
    }
}

impl Serialize for MatchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("MatchResult", 2)?;
        state.serialize_field("identity", self.label())?;
        state.serialize_field("entry", &self.entry())?;
        state.end()
    }
}

/// Demographic estimate for one face, reduced to a single category each.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeEstimate {
    pub age: f32,
    pub gender: String,
    pub emotion: String,
}

/// Combined answer to an identification request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identification {
    pub attributes: AttributeEstimate,
    pub identity: MatchResult,
}
