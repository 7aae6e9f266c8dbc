//! Recall service
//!
//! The surface a presentation layer talks to: history queries, pin and
//! delete, paste-back, settings propagation and storage stats. All methods
//! take `&self` and are safe to call from any thread.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use super::blob_store::BlobStore;
use super::clipboard::{write_entry, ClipboardBackend};
use super::database::{HistoryStore, SearchQuery, DB_FILE_NAME};
use super::monitor::{CaptureMonitor, CapturePipeline, MonitorControl};
use super::retention::{release_blobs, run_cycle, CleanupReport, RetentionManager};
use super::types::ClipboardEntry;
use crate::config::{Config, SharedConfig};
use crate::error::{HistoryError, Result};

/// Storage usage for the settings screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub entries: usize,
    pub blob_bytes: u64,
    pub max_storage_mb: u64,
}

#[derive(Debug, Clone)]
pub struct History {
    data_dir: PathBuf,
    store: HistoryStore,
    blobs: BlobStore,
    config: SharedConfig,
}

impl History {
    /// Create the data directory if needed and open the store inside it.
    pub fn open(data_dir: impl Into<PathBuf>, config: SharedConfig) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|source| HistoryError::DataDir {
            path: data_dir.clone(),
            source,
        })?;

        let store = HistoryStore::open(data_dir.join(DB_FILE_NAME))?;
        let blobs = BlobStore::new(&data_dir);
        info!(data_dir = %data_dir.display(), "Clipboard history ready");

        Ok(Self {
            data_dir,
            store,
            blobs,
            config,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Capture pipeline wired to this history, with switches from the current config.
    pub fn capture_pipeline(&self) -> CapturePipeline {
        let control = MonitorControl::new(&self.config.read());
        CapturePipeline::new(self.store.clone(), self.blobs.clone(), control)
    }

    pub fn start_retention(&self) -> std::io::Result<RetentionManager> {
        RetentionManager::start(self.store.clone(), self.blobs.clone(), self.config.clone())
    }

    /// Run one retention cycle now.
    pub fn run_cleanup(&self) -> CleanupReport {
        let config = self.config.read().clone();
        run_cycle(&self.store, &self.blobs, &config)
    }

    pub fn recent(&self, limit: usize, offset: usize) -> Result<Vec<ClipboardEntry>> {
        self.store.get_recent(limit, offset)
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<ClipboardEntry>> {
        self.store.search(query)
    }

    pub fn pin(&self, id: i64) -> Result<()> {
        self.store.pin(id)
    }

    pub fn unpin(&self, id: i64) -> Result<()> {
        self.store.unpin(id)
    }

    pub fn set_favorite(&self, id: i64, favorite: bool) -> Result<()> {
        self.store.set_favorite(id, favorite)
    }

    /// Delete a row, pinned or not, and its image blob if no other row uses it.
    #[instrument(skip(self))]
    pub fn delete_entry(&self, id: i64) -> Result<()> {
        let entry = self.store.get_by_id(id)?.ok_or(HistoryError::NotFound(id))?;
        self.store.delete(id)?;
        if let Some(path) = entry.image_path.as_deref() {
            self.blobs.delete_if_unreferenced(path, &self.store)?;
        }
        Ok(())
    }

    /// Delete every non-pinned row and the blobs only they referenced.
    pub fn clear(&self) -> Result<usize> {
        let referenced_before = self.store.get_image_paths()?;
        let deleted = self.store.delete_all()?;
        let released = release_blobs(&self.store, &self.blobs, &referenced_before);
        debug!(deleted, released, "Cleared history");
        Ok(deleted)
    }

    /// Put an entry back on the clipboard.
    ///
    /// With a running monitor, the resulting clipboard change is not captured
    /// again.
    #[instrument(skip(self, backend, monitor))]
    pub fn paste_entry(
        &self,
        id: i64,
        backend: &mut dyn ClipboardBackend,
        monitor: Option<&MonitorControl>,
    ) -> Result<()> {
        let entry = self.store.get_by_id(id)?.ok_or(HistoryError::NotFound(id))?;

        if let Some(control) = monitor {
            control.set_suppress_next();
        }
        if let Err(e) = write_entry(backend, &entry, &self.blobs) {
            // Nothing was written, so the next change is a real copy.
            if let Some(control) = monitor {
                control.take_suppress_next();
            }
            return Err(e);
        }

        self.store.update_last_used(id)?;
        info!(id, content_type = %entry.content_type, "Pasted clipboard entry");
        Ok(())
    }

    /// Make saved settings live: shared config, monitor switches and hotkey.
    pub fn apply_settings(&self, config: Config, monitor: Option<&CaptureMonitor>) {
        let previous_hotkey = {
            let mut current = self.config.write();
            std::mem::replace(&mut *current, config.clone()).hotkey
        };

        if let Some(monitor) = monitor {
            monitor.update_blacklist(&config.blacklisted_apps);
            monitor.set_deduplicate(config.deduplicate_consecutive);
            if previous_hotkey != config.hotkey {
                monitor.set_hotkey(config.hotkey.clone());
            }
        }
        info!(
            max_entries = config.max_entries,
            max_age_days = config.max_age_days,
            hotkey = %config.hotkey.display(),
            "Applied settings"
        );
    }

    pub fn stats(&self) -> Result<HistoryStats> {
        Ok(HistoryStats {
            entries: self.store.get_count()?,
            blob_bytes: self.blobs.get_total_size_bytes(),
            max_storage_mb: self.config.read().max_storage_mb,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::clipboard::fake::{FakeClipboard, Written};
    use crate::clipboard_history::monitor::CaptureOutcome;
    use crate::clipboard_history::source_app::SourceResolver;
    use crate::clipboard_history::types::{CapturedImage, ContentType, NewEntry, SourceInfo};
    use std::time::Duration;
    use tempfile::TempDir;

    struct NoSource;

    impl SourceResolver for NoSource {
        fn resolve(&self) -> SourceInfo {
            SourceInfo::default()
        }
    }

    fn open() -> (TempDir, History) {
        let dir = tempfile::tempdir().unwrap();
        let history = History::open(dir.path().join("data"), Config::default().into_shared()).unwrap();
        (dir, history)
    }

    fn insert_text(history: &History, text: &str) -> i64 {
        history
            .store()
            .insert(&NewEntry::text(text.to_string(), ContentType::Text))
            .unwrap()
    }

    fn insert_image(history: &History, seed: u8) -> (i64, String) {
        let image = CapturedImage::new(1, 1, vec![seed, seed, seed, 255]).unwrap();
        let mut entry = NewEntry::image(image.clone());
        let path = history.blobs().save(&image, entry.created_at).unwrap();
        entry.image_path = Some(path.clone());
        (history.store().insert(&entry).unwrap(), path)
    }

    #[test]
    fn test_open_creates_data_dir() {
        let (dir, history) = open();
        assert!(dir.path().join("data").join(DB_FILE_NAME).is_file());
        assert_eq!(history.data_dir(), dir.path().join("data"));
    }

    #[test]
    fn test_open_fails_when_data_dir_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let err = History::open(blocker.join("data"), Config::default().into_shared()).unwrap_err();
        assert!(matches!(err, HistoryError::DataDir { .. }), "got {:?}", err);
    }

    #[test]
    fn test_delete_entry_removes_blob_even_when_pinned() {
        let (_dir, history) = open();
        let (id, path) = insert_image(&history, 3);
        history.pin(id).unwrap();

        history.delete_entry(id).unwrap();

        assert!(history.store().get_by_id(id).unwrap().is_none());
        assert!(!history.blobs().full_path(&path).exists());
        assert!(matches!(history.delete_entry(id), Err(HistoryError::NotFound(_))));
    }

    fn copy_image(clipboard: &mut FakeClipboard, image: &CapturedImage) {
        let mut state = clipboard.state.lock();
        state.files = None;
        state.html = None;
        state.text = None;
        state.image = Some(image.clone());
        state.token += 1;
    }

    fn stored(outcome: CaptureOutcome) -> i64 {
        match outcome {
            CaptureOutcome::Stored(id) => id,
            other => panic!("expected stored, got {:?}", other),
        }
    }

    #[test]
    fn test_deleting_one_capture_keeps_repeat_capture_image() {
        let (_dir, history) = open();
        let pipeline = history.capture_pipeline().with_grace(Duration::ZERO);
        let mut clipboard = FakeClipboard::default();
        let image = CapturedImage::new(2, 2, vec![40; 16]).unwrap();

        // Image, text, same image: not consecutive, so both images are stored.
        copy_image(&mut clipboard, &image);
        let first = stored(pipeline.process_change(&mut clipboard, &NoSource));
        clipboard.state.lock().copy_text("between");
        stored(pipeline.process_change(&mut clipboard, &NoSource));
        copy_image(&mut clipboard, &image);
        let second = stored(pipeline.process_change(&mut clipboard, &NoSource));

        let path_of = |id: i64| {
            history
                .store()
                .get_by_id(id)
                .unwrap()
                .unwrap()
                .image_path
                .unwrap()
        };
        let (first_path, second_path) = (path_of(first), path_of(second));
        assert_ne!(first_path, second_path);

        history.delete_entry(first).unwrap();

        assert!(!history.blobs().full_path(&first_path).exists());
        assert!(history.blobs().full_path(&second_path).is_file());
        let mut target = FakeClipboard::default();
        history.paste_entry(second, &mut target, None).unwrap();
        assert_eq!(target.state.lock().written, vec![Written::Image(image)]);
    }

    #[test]
    fn test_delete_entry_keeps_blob_shared_with_another_row() {
        let (_dir, history) = open();
        let (first, path) = insert_image(&history, 4);
        let image = CapturedImage::new(1, 1, vec![4, 4, 4, 255]).unwrap();
        let mut entry = NewEntry::image(image);
        entry.image_path = Some(path.clone());
        let second = history.store().insert(&entry).unwrap();

        history.delete_entry(first).unwrap();
        assert!(history.blobs().full_path(&path).is_file());

        history.delete_entry(second).unwrap();
        assert!(!history.blobs().full_path(&path).exists());
    }

    #[test]
    fn test_clear_keeps_pinned_and_their_blobs() {
        let (_dir, history) = open();
        let (pinned, pinned_path) = insert_image(&history, 1);
        history.pin(pinned).unwrap();
        let (_loose, loose_path) = insert_image(&history, 2);
        insert_text(&history, "text");

        assert_eq!(history.clear().unwrap(), 2);

        let remaining = history.recent(10, 0).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, pinned);
        assert!(history.blobs().full_path(&pinned_path).is_file());
        assert!(!history.blobs().full_path(&loose_path).exists());
    }

    #[test]
    fn test_paste_text_updates_last_used_and_suppresses_recapture() {
        let (_dir, history) = open();
        let id = insert_text(&history, "paste me");
        let pipeline = history.capture_pipeline().with_grace(Duration::ZERO);
        let mut clipboard = FakeClipboard::default();

        history
            .paste_entry(id, &mut clipboard, Some(pipeline.control()))
            .unwrap();

        assert_eq!(
            clipboard.state.lock().written,
            vec![Written::Text("paste me".to_string())]
        );
        let entry = history.store().get_by_id(id).unwrap().unwrap();
        assert!(entry.last_used_at.is_some());

        assert_eq!(
            pipeline.process_change(&mut clipboard, &NoSource),
            CaptureOutcome::Suppressed
        );
        assert_eq!(history.store().get_count().unwrap(), 1);
    }

    #[test]
    fn test_failed_paste_does_not_swallow_next_copy() {
        let (_dir, history) = open();
        let (id, path) = insert_image(&history, 9);
        std::fs::remove_file(history.blobs().full_path(&path)).unwrap();
        let pipeline = history.capture_pipeline().with_grace(Duration::ZERO);
        let mut clipboard = FakeClipboard::default();

        assert!(history
            .paste_entry(id, &mut clipboard, Some(pipeline.control()))
            .is_err());

        clipboard.state.lock().copy_text("real copy");
        assert!(matches!(
            pipeline.process_change(&mut clipboard, &NoSource),
            CaptureOutcome::Stored(_)
        ));
    }

    #[test]
    fn test_paste_unknown_id() {
        let (_dir, history) = open();
        let mut clipboard = FakeClipboard::default();
        let err = history.paste_entry(42, &mut clipboard, None).unwrap_err();
        assert!(matches!(err, HistoryError::NotFound(42)));
        assert!(clipboard.state.lock().written.is_empty());
    }

    #[test]
    fn test_apply_settings_updates_shared_config() {
        let (_dir, history) = open();
        let mut config = Config::default();
        config.max_entries = 10;
        config.blacklisted_apps = vec!["Secrets.app".to_string()];

        history.apply_settings(config.clone(), None);

        assert_eq!(*history.config().read(), config);

        struct Secrets;
        impl SourceResolver for Secrets {
            fn resolve(&self) -> SourceInfo {
                SourceInfo {
                    app: Some("secrets.app".to_string()),
                    window: None,
                }
            }
        }

        let pipeline = history.capture_pipeline().with_grace(Duration::ZERO);
        let mut clipboard = FakeClipboard::default();
        clipboard.state.lock().copy_text("x");
        assert_eq!(
            pipeline.process_change(&mut clipboard, &Secrets),
            CaptureOutcome::Blacklisted
        );
    }

    #[test]
    fn test_stats() {
        let (_dir, history) = open();
        insert_text(&history, "one");
        insert_image(&history, 5);

        let stats = history.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert!(stats.blob_bytes > 0);
        assert_eq!(stats.max_storage_mb, Config::default().max_storage_mb);
    }
}
