//! File-based blob storage for clipboard images
//!
//! Images are stored as PNG files outside the database:
//! `<data_dir>/images/<year>/<month>/img_<timestamp>_<hash6>.png`, with a
//! numeric suffix when that name is already taken.
//! Entries record the path relative to the data directory, always with `/`
//! separators, so the data directory can be moved without rewriting rows.

use chrono::{DateTime, Utc};
use glob::glob;
use image::RgbaImage;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use super::database::HistoryStore;
use super::image::{encode_png, from_rgba_image};
use super::text::compute_hash;
use super::types::CapturedImage;
use crate::error::Result;

/// Directory under the data dir that holds all image blobs.
pub const IMAGES_DIR_NAME: &str = "images";
const SHORT_HASH_LEN: usize = 6;

/// Unreferenced files younger than this are left alone by the orphan sweep.
/// A capture writes its file before the row that references it exists.
pub const ORPHAN_MIN_AGE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct BlobStore {
    data_dir: PathBuf,
    base: PathBuf,
}

impl BlobStore {
    /// Blob store rooted at `<data_dir>/images`. The directory is created lazily.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let base = data_dir.join(IMAGES_DIR_NAME);
        Self { data_dir, base }
    }

    /// Absolute path for a stored relative path.
    pub fn full_path(&self, relative_path: &str) -> PathBuf {
        relative_path
            .split(['/', '\\'])
            .filter(|part| !part.is_empty())
            .fold(self.data_dir.clone(), |acc, part| acc.join(part))
    }

    /// Write `image` as PNG and return its path relative to the data dir.
    ///
    /// `captured_at_ms` places the file in its year/month directory and names it.
    /// Every call creates a new file; an existing blob is never overwritten.
    pub fn save(&self, image: &CapturedImage, captured_at_ms: i64) -> Result<String> {
        let captured_at =
            DateTime::<Utc>::from_timestamp_millis(captured_at_ms).unwrap_or_else(Utc::now);
        let hash = compute_hash(&image.rgba);

        let dir = format!("{}/{}", IMAGES_DIR_NAME, captured_at.format("%Y/%m"));
        let stem = format!(
            "img_{}_{}",
            captured_at.format("%Y%m%d_%H%M%S_%3f"),
            &hash[..SHORT_HASH_LEN]
        );
        fs::create_dir_all(self.full_path(&dir))?;

        let png = encode_png(image)?;
        let mut attempt = 0u32;
        loop {
            let relative = match attempt {
                0 => format!("{}/{}.png", dir, stem),
                n => format!("{}/{}_{}.png", dir, stem, n),
            };
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.full_path(&relative))
            {
                Ok(mut file) => {
                    file.write_all(&png)?;
                    debug!(path = %relative, size = png.len(), "Stored image blob");
                    return Ok(relative);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Decode a stored image at full resolution.
    pub fn load(&self, relative_path: &str) -> Option<CapturedImage> {
        let path = self.full_path(relative_path);
        match image::open(&path) {
            Ok(img) => from_rgba_image(img.to_rgba8()),
            Err(e) => {
                warn!(path = %relative_path, error = %e, "Failed to load image blob");
                None
            }
        }
    }

    /// Decode and downscale to fit within `max_size`, preserving aspect ratio.
    pub fn load_thumbnail(&self, relative_path: &str, max_size: (u32, u32)) -> Option<RgbaImage> {
        let path = self.full_path(relative_path);
        let img = image::open(&path)
            .map_err(|e| debug!(path = %relative_path, error = %e, "Thumbnail unavailable"))
            .ok()?;
        Some(img.thumbnail(max_size.0, max_size.1).to_rgba8())
    }

    /// Remove a blob. Returns true if a file was deleted; a missing file is not an error.
    pub fn delete(&self, relative_path: &str) -> bool {
        let path = self.full_path(relative_path);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %relative_path, "Deleted image blob");
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %relative_path, error = %e, "Failed to delete image blob");
                false
            }
        }
    }

    /// Remove a blob unless a row in `store` still points at it.
    pub fn delete_if_unreferenced(&self, relative_path: &str, store: &HistoryStore) -> Result<bool> {
        if store.is_image_referenced(relative_path)? {
            debug!(path = %relative_path, "Image blob still referenced, keeping it");
            return Ok(false);
        }
        Ok(self.delete(relative_path))
    }

    /// Every regular file under the blob base.
    fn stored_files(&self) -> Vec<PathBuf> {
        if !self.base.exists() {
            return Vec::new();
        }
        // Escape the base so glob metacharacters in the data dir match literally.
        let pattern = format!(
            "{}/**/*",
            glob::Pattern::escape(&self.base.to_string_lossy())
        );
        match glob(&pattern) {
            Ok(paths) => paths
                .filter_map(|p| p.ok())
                .filter(|p| p.is_file())
                .collect(),
            Err(e) => {
                warn!(error = %e, pattern = %pattern, "Failed to glob image blobs");
                Vec::new()
            }
        }
    }

    /// Total size of all stored blobs in bytes.
    pub fn get_total_size_bytes(&self) -> u64 {
        self.stored_files()
            .iter()
            .filter_map(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .sum()
    }

    fn relative_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.data_dir).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Delete every stored file whose relative path is not in `valid_paths`.
    ///
    /// `valid_paths` must be read from the store at `snapshot_at`, before this
    /// call. Files modified less than [`ORPHAN_MIN_AGE`] before the snapshot
    /// are kept, since their rows may not have been inserted yet.
    /// Returns the number of files removed.
    pub fn cleanup_orphans(&self, valid_paths: &HashSet<String>, snapshot_at: SystemTime) -> usize {
        let valid: HashSet<String> = valid_paths.iter().map(|p| p.replace('\\', "/")).collect();
        let cutoff = snapshot_at
            .checked_sub(ORPHAN_MIN_AGE)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut removed = 0;
        for path in self.stored_files() {
            let Some(relative) = self.relative_of(&path) else {
                continue;
            };
            if valid.contains(&relative) {
                continue;
            }
            let settled = fs::metadata(&path)
                .and_then(|m| m.modified())
                .is_ok_and(|modified| modified < cutoff);
            if !settled {
                debug!(path = %relative, "Skipping unreferenced blob still in its grace period");
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %relative, "Removed orphaned image blob");
                    removed += 1;
                }
                Err(e) => warn!(path = %relative, error = %e, "Failed to remove orphaned blob"),
            }
        }

        if removed > 0 {
            info!(removed, "Swept orphaned image blobs");
        }
        removed
    }
}
