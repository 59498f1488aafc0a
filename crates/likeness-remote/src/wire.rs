//! Request and response bodies of the DeepFace HTTP API.

use likeness_core::{CapabilityError, RawAttributes};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute actions requested from `/analyze`.
pub const ANALYZE_ACTIONS: [&str; 3] = ["age", "gender", "emotion"];

const NO_FACE_MARKER: &str = "face could not be detected";

#[derive(Debug, Serialize)]
pub struct VerifyRequest<'a> {
    pub img1: &'a str,
    pub img2: &'a str,
    pub model_name: &'a str,
    pub detector_backend: &'a str,
    pub enforce_detection: bool,
}

#[derive(Debug, Deserialize)]
pub struct VerifyResponse {
    pub verified: bool,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeRequest<'a> {
    pub img: &'a str,
    pub actions: &'a [&'a str],
    pub detector_backend: &'a str,
    pub enforce_detection: bool,
}

/// `/analyze` answers `{"results": [...]}`; older servers return the bare list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AnalyzeResponse {
    Wrapped { results: Vec<FaceAnalysis> },
    Bare(Vec<FaceAnalysis>),
}

impl AnalyzeResponse {
    /// First analyzed face, which is what the matching engine works with.
    pub fn into_first(self) -> Option<FaceAnalysis> {
        let faces = match self {
            AnalyzeResponse::Wrapped { results } => results,
            AnalyzeResponse::Bare(faces) => faces,
        };
        faces.into_iter().next()
    }
}

#[derive(Debug, Deserialize)]
pub struct FaceAnalysis {
    pub age: f32,
    pub gender: HashMap<String, f32>,
    pub emotion: HashMap<String, f32>,
}

impl From<FaceAnalysis> for RawAttributes {
    fn from(face: FaceAnalysis) -> Self {
        RawAttributes {
            age: face.age,
            gender: face.gender,
            emotion: face.emotion,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Map a non-success response to a capability error.
pub fn service_error(status: u16, body: &str) -> CapabilityError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string());

    if message.to_lowercase().contains(NO_FACE_MARKER) {
        CapabilityError::NoFace
    } else {
        CapabilityError::Service { status, message }
    }
}
