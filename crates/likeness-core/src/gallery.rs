//! Gallery store holding one representative image per identity label.
//!
//! Reads are per entry and may fail independently; a write replaces the
//! whole entry or leaves it untouched. Nothing here provides snapshot
//! isolation across a scan: an enroll landing mid-scan may or may not be
//! observed by that scan.

use crate::types::{GalleryEntry, Label};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageReader, RgbImage};
use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

const IMAGE_EXTENSION: &str = "jpg";
const JPEG_QUALITY: u8 = 95;
#[cfg(unix)]
const ENTRY_MODE: u32 = 0o644;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to list gallery {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unreadable gallery image {path}: {message}")]
    UnreadableImage { path: PathBuf, message: String },
    #[error("failed to write gallery image {path}: {message}")]
    Write { path: PathBuf, message: String },
}

/// Durable mapping from label to one face image.
pub trait GalleryStore: Send + Sync {
    /// Enumerate entries in a stable order.
    fn list_entries(&self) -> Result<Vec<GalleryEntry>, StoreError>;

    /// Load the stored image for `entry`.
    fn read_image(&self, entry: &GalleryEntry) -> Result<RgbImage, StoreError>;

    /// Persist `pixels` under `label`, replacing any previous image.
    fn write_entry(&self, label: &Label, pixels: &RgbImage) -> Result<GalleryEntry, StoreError>;
}

/// Gallery backed by a directory of `<label>.jpg` files.
///
/// Any non-hidden regular file in the directory is listed; files that do not
/// decode surface as [`StoreError::UnreadableImage`] at read time.
#[derive(Debug, Clone)]
pub struct FilesystemGallery {
    dir: PathBuf,
}

impl FilesystemGallery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the image for `label` is written to.
    pub fn entry_path(&self, label: &Label) -> PathBuf {
        self.dir.join(format!("{label}.{IMAGE_EXTENSION}"))
    }

    fn list_error(&self, source: io::Error) -> StoreError {
        StoreError::List {
            path: self.dir.clone(),
            source,
        }
    }

    /// Turn directory items into gallery entries.
    ///
    /// An item that cannot be read is logged and skipped so that one bad
    /// entry does not hide the rest of the gallery.
    fn collect_entries<I>(&self, items: I) -> Vec<GalleryEntry>
    where
        I: IntoIterator<Item = io::Result<PathBuf>>,
    {
        let mut entries = Vec::new();
        for item in items {
            let path = match item {
                Ok(path) => path,
                Err(err) => {
                    tracing::warn!(dir = %self.dir.display(), error = %err, "skipping unreadable gallery directory entry");
                    continue;
                }
            };

            // Skips in-flight temporary files as well as dotfiles.
            let hidden = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'));
            if hidden || !path.is_file() {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                tracing::debug!(path = %path.display(), "skipping gallery file with non-UTF-8 name");
                continue;
            };
            match Label::normalize(stem) {
                Ok(label) => entries.push(GalleryEntry { label, path }),
                Err(_) => {
                    tracing::debug!(path = %path.display(), "skipping gallery file without a usable label");
                }
            }
        }

        self.one_per_label(entries)
    }

    /// Keep a single entry per label, sorted by path.
    ///
    /// Several files can normalize to the same label (`Mary Jane.png` and
    /// `Mary_Jane.jpg`). The file `write_entry` targets wins; otherwise the
    /// first path in sort order does.
    fn one_per_label(&self, mut entries: Vec<GalleryEntry>) -> Vec<GalleryEntry> {
        entries.sort_by_cached_key(|e| (e.path != self.entry_path(&e.label), e.path.clone()));

        let mut seen = HashSet::new();
        entries.retain(|entry| {
            if seen.insert(entry.label.clone()) {
                return true;
            }
            tracing::warn!(
                label = %entry.label,
                path = %entry.path.display(),
                "ignoring gallery file that duplicates an existing label"
            );
            false
        });

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }
}

impl GalleryStore for FilesystemGallery {
    fn list_entries(&self) -> Result<Vec<GalleryEntry>, StoreError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(dir = %self.dir.display(), "gallery directory missing; treating as empty");
                return Ok(Vec::new());
            }
            Err(err) => return Err(self.list_error(err)),
        };

        Ok(self.collect_entries(read_dir.map(|item| item.map(|e| e.path()))))
    }

    fn read_image(&self, entry: &GalleryEntry) -> Result<RgbImage, StoreError> {
        let unreadable = |message: String| StoreError::UnreadableImage {
            path: entry.path.clone(),
            message,
        };

        let image = ImageReader::open(&entry.path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| unreadable(e.to_string()))?
            .decode()
            .map_err(|e| unreadable(e.to_string()))?;

        Ok(image.to_rgb8())
    }

    fn write_entry(&self, label: &Label, pixels: &RgbImage) -> Result<GalleryEntry, StoreError> {
        let path = self.entry_path(label);
        let write_error = |message: String| StoreError::Write {
            path: path.clone(),
            message,
        };

        fs::create_dir_all(&self.dir).map_err(|e| write_error(e.to_string()))?;

        // Encode next to the target, then rename over it.
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| write_error(e.to_string()))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
            pixels
                .write_with_encoder(encoder)
                .map_err(|e| write_error(e.to_string()))?;
            writer.flush().map_err(|e| write_error(e.to_string()))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| write_error(e.to_string()))?;

        // Temp files are created owner-only; gallery images are plain data.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(ENTRY_MODE))
                .map_err(|e| write_error(e.to_string()))?;
        }

        tmp.persist(&path)
            .map_err(|e| write_error(e.error.to_string()))?;

        tracing::debug!(label = %label, path = %path.display(), "gallery entry written");

        Ok(GalleryEntry {
            label: label.clone(),
            path,
        })
    }
}
