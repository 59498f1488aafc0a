//! Human-readable and JSON renderings of engine results.

use likeness_core::{GalleryEntry, Identification};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct IdentifyReport<'a> {
    image: &'a Path,
    #[serde(flatten)]
    identification: &'a Identification,
}

pub fn identification_text(image: &Path, result: &Identification) -> String {
    let attrs = &result.attributes;
    let mut out = format!(
        "{}\n  identity: {}\n  age:      {:.0}\n  gender:   {}\n  emotion:  {}",
        image.display(),
        result.identity.label(),
        attrs.age,
        attrs.gender,
        attrs.emotion,
    );
    if let Some(entry) = result.identity.entry() {
        out.push_str(&format!("\n  matched:  {}", entry.path.display()));
    }
    out
}

pub fn identification_json(image: &Path, result: &Identification) -> serde_json::Result<String> {
    serde_json::to_string(&IdentifyReport {
        image,
        identification: result,
    })
}

pub fn enrolled_text(entry: &GalleryEntry) -> String {
    format!("Enrolled {} as {}", entry.path.display(), entry.label)
}

pub fn entries_text(entries: &[GalleryEntry]) -> String {
    if entries.is_empty() {
        return "No faces enrolled".to_string();
    }
    entries
        .iter()
        .map(|e| format!("{}\t{}", e.label, e.path.display()))
        .collect::<Vec<_>>()
        .join("\n")
}
