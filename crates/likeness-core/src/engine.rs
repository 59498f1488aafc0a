//! Identity matching engine.
//!
//! Identification is a linear, first-match-wins scan over the gallery.
//! Unreadable entries and comparison failures only skip the entry they
//! concern; the scan itself never fails.

use crate::attributes;
use crate::capability::{AttributeAnalyzer, FaceComparer};
use crate::gallery::{GalleryStore, StoreError};
use crate::types::{GalleryEntry, Identification, Label, MatchResult, ProbeImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid label {raw:?}: {reason}")]
    InvalidLabel { raw: String, reason: String },
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("failed to store gallery entry: {0}")]
    Write(#[source] StoreError),
    #[error("attribute analysis failed: {0}")]
    Analysis(String),
}

/// Options shared by every request handled by one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Ask capabilities not to abort when no face is detected.
    pub tolerant: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { tolerant: true }
    }
}

/// Orchestrates gallery scans and enrollment over a store and two
/// external capabilities.
pub struct MatchingEngine<S, C, A> {
    store: S,
    comparer: C,
    analyzer: A,
    options: EngineOptions,
}

impl<S, C, A> MatchingEngine<S, C, A>
where
    S: GalleryStore,
    C: FaceComparer,
    A: AttributeAnalyzer,
{
    pub fn new(store: S, comparer: C, analyzer: A) -> Self {
        Self {
            store,
            comparer,
            analyzer,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Find the first gallery entry the comparer verifies against `probe`.
    pub fn scan(&self, probe: &ProbeImage) -> MatchResult {
        let entries = match self.store.list_entries() {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(error = %err, "gallery listing failed; reporting unknown identity");
                return MatchResult::Unknown;
            }
        };
        tracing::debug!(entries = entries.len(), "scanning gallery");

        for entry in entries {
            let reference = match self.store.read_image(&entry) {
                Ok(image) => image,
                Err(err) => {
                    tracing::warn!(label = %entry.label, error = %err, "skipping unreadable gallery entry");
                    continue;
                }
            };

            let verified = match self
                .comparer
                .compare(probe.pixels(), &reference, self.options.tolerant)
            {
                Ok(verified) => verified,
                Err(err) => {
                    tracing::warn!(
                        label = %entry.label,
                        error = %err,
                        "comparison failed; treating entry as not verified"
                    );
                    false
                }
            };
            tracing::debug!(label = %entry.label, verified, "compared against gallery entry");

            if verified {
                tracing::info!(label = %entry.label, path = %entry.path.display(), "identity matched");
                return MatchResult::Matched(entry);
            }
        }

        tracing::info!("no gallery entry matched");
        MatchResult::Unknown
    }

    /// Estimate attributes for `probe`, then scan the gallery for its identity.
    pub fn identify(&self, probe: &ProbeImage) -> Result<Identification, EngineError> {
        if probe.is_empty() {
            return Err(EngineError::InvalidImage("probe image has no pixels".into()));
        }

        let raw = self
            .analyzer
            .analyze(probe.pixels(), self.options.tolerant)
            .map_err(|e| EngineError::Analysis(e.to_string()))?;
        let attributes = attributes::summarize(&raw)?;
        tracing::debug!(
            age = attributes.age,
            gender = %attributes.gender,
            emotion = %attributes.emotion,
            "attributes estimated"
        );

        let identity = self.scan(probe);
        Ok(Identification {
            attributes,
            identity,
        })
    }

    /// Store `probe` under the normalized `raw_label`, replacing any image
    /// already enrolled under that label.
    pub fn enroll(&self, raw_label: &str, probe: &ProbeImage) -> Result<GalleryEntry, EngineError> {
        let label = Label::normalize(raw_label)?;
        if probe.is_empty() {
            return Err(EngineError::InvalidImage("probe image has no pixels".into()));
        }

        let entry = self
            .store
            .write_entry(&label, probe.pixels())
            .map_err(EngineError::Write)?;
        tracing::info!(label = %entry.label, path = %entry.path.display(), "enrolled gallery entry");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityError, RawAttributes};
    use image::{Rgb, RgbImage};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory gallery. `None` images model corrupt files.
    #[derive(Default)]
    struct MemoryGallery {
        entries: Mutex<Vec<(Label, Option<RgbImage>)>>,
        fail_listing: bool,
        fail_writes: bool,
    }

    impl MemoryGallery {
        fn with(entries: &[(&str, Option<u8>)]) -> Self {
            let entries = entries
                .iter()
                .map(|(label, shade)| (Label::normalize(label).unwrap(), shade.map(face)))
                .collect();
            Self {
                entries: Mutex::new(entries),
                ..Default::default()
            }
        }

        fn snapshot(&self) -> Vec<(String, Option<u8>)> {
            self.entries
                .lock()
                .unwrap()
                .iter()
                .map(|(label, image)| (label.to_string(), image.as_ref().map(|i| i.get_pixel(0, 0)[0])))
                .collect()
        }
    }

    impl GalleryStore for MemoryGallery {
        fn list_entries(&self) -> Result<Vec<GalleryEntry>, StoreError> {
            if self.fail_listing {
                return Err(StoreError::List {
                    path: PathBuf::from("/gallery"),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                });
            }
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .map(|(label, _)| GalleryEntry {
                    label: label.clone(),
                    path: PathBuf::from(format!("{label}.jpg")),
                })
                .collect())
        }

        fn read_image(&self, entry: &GalleryEntry) -> Result<RgbImage, StoreError> {
            let entries = self.entries.lock().unwrap();
            entries
                .iter()
                .find(|(label, _)| *label == entry.label)
                .and_then(|(_, image)| image.clone())
                .ok_or_else(|| StoreError::UnreadableImage {
                    path: entry.path.clone(),
                    message: "corrupt".into(),
                })
        }

        fn write_entry(&self, label: &Label, pixels: &RgbImage) -> Result<GalleryEntry, StoreError> {
            let path = PathBuf::from(format!("{label}.jpg"));
            if self.fail_writes {
                return Err(StoreError::Write {
                    path,
                    message: "disk full".into(),
                });
            }
            let mut entries = self.entries.lock().unwrap();
            match entries.iter_mut().find(|(existing, _)| existing == label) {
                Some(slot) => slot.1 = Some(pixels.clone()),
                None => entries.push((label.clone(), Some(pixels.clone()))),
            }
            Ok(GalleryEntry {
                label: label.clone(),
                path,
            })
        }
    }

    /// Verifies when both images share the same shade. Shades listed in
    /// `failing` raise instead of answering.
    #[derive(Default)]
    struct ShadeComparer {
        failing: Vec<u8>,
        calls: AtomicUsize,
        tolerant_seen: Mutex<Vec<bool>>,
    }

    impl FaceComparer for ShadeComparer {
        fn compare(
            &self,
            probe: &RgbImage,
            reference: &RgbImage,
            tolerant: bool,
        ) -> Result<bool, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tolerant_seen.lock().unwrap().push(tolerant);
            let shade = reference.get_pixel(0, 0)[0];
            if self.failing.contains(&shade) {
                return Err(CapabilityError::NoFace);
            }
            Ok(probe.get_pixel(0, 0) == reference.get_pixel(0, 0))
        }
    }

    struct FixedAnalyzer {
        result: Option<RawAttributes>,
    }

    impl FixedAnalyzer {
        fn ok() -> Self {
            let mut gender = HashMap::new();
            gender.insert("male".to_string(), 0.3);
            gender.insert("female".to_string(), 0.7);
            let mut emotion = HashMap::new();
            emotion.insert("neutral".to_string(), 60.0);
            emotion.insert("happy".to_string(), 40.0);
            Self {
                result: Some(RawAttributes {
                    age: 27.0,
                    gender,
                    emotion,
                }),
            }
        }

        fn failing() -> Self {
            Self { result: None }
        }
    }

    impl AttributeAnalyzer for FixedAnalyzer {
        fn analyze(&self, _image: &RgbImage, _tolerant: bool) -> Result<RawAttributes, CapabilityError> {
            self.result
                .clone()
                .ok_or_else(|| CapabilityError::Transport("connection refused".into()))
        }
    }

    fn face(shade: u8) -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([shade, shade, shade]))
    }

    fn probe(shade: u8) -> ProbeImage {
        ProbeImage::new(face(shade))
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let comparer = ShadeComparer::default();
        let engine = MatchingEngine::new(MemoryGallery::default(), &comparer, FixedAnalyzer::ok());

        let result = engine.scan(&probe(10));
        assert_eq!(result, MatchResult::Unknown);
        assert_eq!(result.label(), "unknown");
        assert_eq!(comparer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_first_match_wins() {
        let gallery = MemoryGallery::with(&[("stranger", Some(1)), ("first", Some(7)), ("second", Some(7))]);
        let comparer = ShadeComparer::default();
        let engine = MatchingEngine::new(gallery, &comparer, FixedAnalyzer::ok());

        let result = engine.scan(&probe(7));
        assert_eq!(result.label(), "first");
        assert_eq!(result.entry().map(|e| e.path.clone()), Some(PathBuf::from("first.jpg")));
        // Scan stops at the first verified entry.
        assert_eq!(comparer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_matched_entry_verifies_against_probe() {
        let gallery = MemoryGallery::with(&[("a", Some(3)), ("b", Some(9)), ("c", Some(5))]);
        let comparer = ShadeComparer::default();
        let engine = MatchingEngine::new(gallery, &comparer, FixedAnalyzer::ok());

        let target = probe(9);
        let result = engine.scan(&target);
        let entry = result.entry().unwrap();
        let stored = engine.store().read_image(entry).unwrap();
        assert!(comparer.compare(target.pixels(), &stored, true).unwrap());
    }

    #[test]
    fn test_corrupt_entry_is_skipped() {
        let gallery = MemoryGallery::with(&[("A", None), ("B", Some(42))]);
        let comparer = ShadeComparer::default();
        let engine = MatchingEngine::new(gallery, &comparer, FixedAnalyzer::ok());

        assert_eq!(engine.scan(&probe(42)).label(), "B");
        assert_eq!(comparer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_comparison_failure_is_not_verified() {
        let gallery = MemoryGallery::with(&[("noface", Some(99)), ("later", Some(42))]);
        let comparer = ShadeComparer {
            failing: vec![99],
            ..Default::default()
        };
        let engine = MatchingEngine::new(gallery, &comparer, FixedAnalyzer::ok());

        assert_eq!(engine.scan(&probe(42)).label(), "later");
        assert_eq!(comparer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_all_comparisons_failing_is_unknown() {
        let gallery = MemoryGallery::with(&[("one", Some(42)), ("two", Some(42))]);
        let comparer = ShadeComparer {
            failing: vec![42],
            ..Default::default()
        };
        let engine = MatchingEngine::new(gallery, &comparer, FixedAnalyzer::ok());

        assert_eq!(engine.scan(&probe(42)), MatchResult::Unknown);
        assert_eq!(comparer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listing_failure_is_unknown() {
        let gallery = MemoryGallery {
            fail_listing: true,
            ..MemoryGallery::with(&[("x", Some(1))])
        };
        let engine = MatchingEngine::new(gallery, ShadeComparer::default(), FixedAnalyzer::ok());
        assert_eq!(engine.scan(&probe(1)), MatchResult::Unknown);
    }

    #[test]
    fn test_tolerant_flag_reaches_comparer() {
        let gallery = MemoryGallery::with(&[("x", Some(1))]);
        let comparer = ShadeComparer::default();
        let engine = MatchingEngine::new(gallery, &comparer, FixedAnalyzer::ok())
            .with_options(EngineOptions { tolerant: false });

        engine.scan(&probe(2));
        assert_eq!(*comparer.tolerant_seen.lock().unwrap(), vec![false]);
    }

    #[test]
    fn test_identify_combines_attributes_and_identity() {
        let gallery = MemoryGallery::with(&[("alice", Some(11)), ("bob", Some(22))]);
        let engine = MatchingEngine::new(gallery, ShadeComparer::default(), FixedAnalyzer::ok());

        let identification = engine.identify(&probe(22)).unwrap();
        assert_eq!(identification.attributes.age, 27.0);
        assert_eq!(identification.attributes.gender, "female");
        assert_eq!(identification.attributes.emotion, "neutral");
        assert_eq!(identification.identity.label(), "bob");
    }

    #[test]
    fn test_identify_unknown_still_reports_attributes() {
        let engine = MatchingEngine::new(MemoryGallery::default(), ShadeComparer::default(), FixedAnalyzer::ok());
        let identification = engine.identify(&probe(5)).unwrap();
        assert_eq!(identification.identity, MatchResult::Unknown);
        assert_eq!(identification.attributes.gender, "female");
    }

    #[test]
    fn test_identify_analysis_failure_is_fatal() {
        let gallery = MemoryGallery::with(&[("alice", Some(11))]);
        let comparer = ShadeComparer::default();
        let engine = MatchingEngine::new(gallery, &comparer, FixedAnalyzer::failing());

        let err = engine.identify(&probe(11)).unwrap_err();
        assert!(matches!(err, EngineError::Analysis(_)));
        assert_eq!(comparer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_identify_rejects_empty_probe() {
        let engine = MatchingEngine::new(MemoryGallery::default(), ShadeComparer::default(), FixedAnalyzer::ok());
        let err = engine.identify(&ProbeImage::new(RgbImage::new(0, 0))).unwrap_err();
        assert!(matches!(err, EngineError::InvalidImage(_)));
    }

    #[test]
    fn test_enroll_rejects_blank_labels() {
        let gallery = MemoryGallery::with(&[("alice", Some(1))]);
        let engine = MatchingEngine::new(gallery, ShadeComparer::default(), FixedAnalyzer::ok());

        for raw in ["", "   "] {
            let err = engine.enroll(raw, &probe(2)).unwrap_err();
            assert!(matches!(err, EngineError::InvalidLabel { .. }));
        }
        assert_eq!(engine.store().snapshot(), vec![("alice".to_string(), Some(1))]);
    }

    #[test]
    fn test_enroll_normalizes_label() {
        let engine = MatchingEngine::new(MemoryGallery::default(), ShadeComparer::default(), FixedAnalyzer::ok());
        let entry = engine.enroll("  Mary Jane ", &probe(3)).unwrap();
        assert_eq!(entry.label.as_str(), "Mary_Jane");
        assert_eq!(engine.store().snapshot(), vec![("Mary_Jane".to_string(), Some(3))]);
    }

    #[test]
    fn test_enroll_twice_is_idempotent() {
        let engine = MatchingEngine::new(MemoryGallery::default(), ShadeComparer::default(), FixedAnalyzer::ok());
        engine.enroll("carol", &probe(8)).unwrap();
        let once = engine.store().snapshot();
        engine.enroll("carol", &probe(8)).unwrap();
        assert_eq!(engine.store().snapshot(), once);
        assert_eq!(once.len(), 1);
    }

    #[test]
    fn test_enroll_overwrites_existing_label() {
        let engine = MatchingEngine::new(MemoryGallery::default(), ShadeComparer::default(), FixedAnalyzer::ok());
        engine.enroll("dave", &probe(10)).unwrap();
        engine.enroll("dave", &probe(20)).unwrap();
        assert_eq!(engine.store().snapshot(), vec![("dave".to_string(), Some(20))]);

        // The replacement is what identification now matches.
        assert_eq!(engine.scan(&probe(20)).label(), "dave");
        assert_eq!(engine.scan(&probe(10)), MatchResult::Unknown);
    }

    #[test]
    fn test_enroll_rejects_empty_image() {
        let engine = MatchingEngine::new(MemoryGallery::default(), ShadeComparer::default(), FixedAnalyzer::ok());
        let err = engine
            .enroll("erin", &ProbeImage::new(RgbImage::new(0, 0)))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidImage(_)));
        assert!(engine.store().snapshot().is_empty());
    }

    #[test]
    fn test_enroll_propagates_write_failure() {
        let gallery = MemoryGallery {
            fail_writes: true,
            ..Default::default()
        };
        let engine = MatchingEngine::new(gallery, ShadeComparer::default(), FixedAnalyzer::ok());
        let err = engine.enroll("frank", &probe(1)).unwrap_err();
        assert!(matches!(err, EngineError::Write(StoreError::Write { .. })));
        assert!(engine.store().snapshot().is_empty());
    }
}
