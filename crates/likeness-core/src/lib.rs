//! likeness-core — Gallery store and identity matching engine.
//!
//! Scans a gallery of enrolled face images with a pluggable face comparison
//! capability, enrolls new images under normalized labels, and reduces
//! attribute analysis output to a single estimate per category.

pub mod attributes;
pub mod capability;
pub mod engine;
pub mod gallery;
pub mod types;

pub use capability::{AttributeAnalyzer, CapabilityError, FaceComparer, RawAttributes};
pub use engine::{EngineError, EngineOptions, MatchingEngine};
pub use gallery::{FilesystemGallery, GalleryStore, StoreError};
pub use types::{
    AttributeEstimate, GalleryEntry, Identification, Label, MatchResult, ProbeImage,
    UNKNOWN_IDENTITY,
};
