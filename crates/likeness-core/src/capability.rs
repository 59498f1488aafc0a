//! External face capabilities consumed by the matching engine.
//!
//! Detection, embedding and verification live behind these traits; the
//! engine only sees a verdict or an attribute distribution.

use image::RgbImage;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("no face detected")]
    NoFace,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned {status}: {message}")]
    Service { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// Raw attribute analysis output for one face.
///
/// Confidence mappings are unordered; values are whatever scale the backend
/// uses (probabilities or percentages).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAttributes {
    pub age: f32,
    pub gender: HashMap<String, f32>,
    pub emotion: HashMap<String, f32>,
}

/// Pairwise same-identity verdict.
pub trait FaceComparer: Send + Sync {
    /// Returns `true` when both images show the same person.
    ///
    /// In tolerant mode, a missing face is reported as `Ok(false)` rather
    /// than [`CapabilityError::NoFace`].
    fn compare(
        &self,
        probe: &RgbImage,
        reference: &RgbImage,
        tolerant: bool,
    ) -> Result<bool, CapabilityError>;
}

/// Single-image age, gender and emotion estimate.
pub trait AttributeAnalyzer: Send + Sync {
    fn analyze(&self, image: &RgbImage, tolerant: bool) -> Result<RawAttributes, CapabilityError>;
}

impl<T: FaceComparer + ?Sized> FaceComparer for &T {
    fn compare(
        &self,
        probe: &RgbImage,
        reference: &RgbImage,
        tolerant: bool,
    ) -> Result<bool, CapabilityError> {
        (**self).compare(probe, reference, tolerant)
    }
}

impl<T: FaceComparer + ?Sized> FaceComparer for Arc<T> {
    fn compare(
        &self,
        probe: &RgbImage,
        reference: &RgbImage,
        tolerant: bool,
    ) -> Result<bool, CapabilityError> {
        (**self).compare(probe, reference, tolerant)
    }
}

impl<T: AttributeAnalyzer + ?Sized> AttributeAnalyzer for &T {
    fn analyze(&self, image: &RgbImage, tolerant: bool) -> Result<RawAttributes, CapabilityError> {
        (**self).analyze(image, tolerant)
    }
}

impl<T: AttributeAnalyzer + ?Sized> AttributeAnalyzer for Arc<T> {
    fn analyze(&self, image: &RgbImage, tolerant: bool) -> Result<RawAttributes, CapabilityError> {
        (**self).analyze(image, tolerant)
    }
}
