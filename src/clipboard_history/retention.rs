//! Periodic retention: count eviction, age eviction, orphan blob sweep.

use std::collections::HashSet;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info};

use super::blob_store::BlobStore;
use super::database::HistoryStore;
use crate::config::{Config, SharedConfig};
use crate::error::ResultExt;

/// Rows and files removed by one cleanup cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub evicted_by_count: usize,
    pub evicted_by_age: usize,
    pub orphans_removed: usize,
}

/// Delete the blobs in `referenced_before` that no row points at any more.
///
/// Call after deleting rows, with the paths read before the delete. Paths
/// written by concurrent captures are not in that set and are never touched.
pub(super) fn release_blobs(
    store: &HistoryStore,
    blobs: &BlobStore,
    referenced_before: &HashSet<String>,
) -> usize {
    let Some(still_referenced) = store.get_image_paths().warn_on_err() else {
        return 0;
    };
    referenced_before
        .difference(&still_referenced)
        .filter(|path| blobs.delete(path))
        .count()
}

/// Run one cleanup cycle.
///
/// Steps run in a fixed order and a failing step does not stop the next one.
pub fn run_cycle(store: &HistoryStore, blobs: &BlobStore, config: &Config) -> CleanupReport {
    let mut report = CleanupReport::default();
    let referenced_before = store.get_image_paths().warn_on_err();

    if let Some(count) = store.get_count().warn_on_err() {
        if count > config.max_entries {
            report.evicted_by_count = store
                .delete_oldest(config.max_entries)
                .warn_on_err()
                .unwrap_or(0);
        }
    }

    if let Some(max_age) = config.max_age() {
        let cutoff = (chrono::Utc::now() - max_age).timestamp_millis();
        report.evicted_by_age = store.delete_older_than(cutoff).warn_on_err().unwrap_or(0);
    }

    if let Some(before) = &referenced_before {
        report.orphans_removed = release_blobs(store, blobs, before);
    }

    // Snapshot the referenced set before walking the disk.
    let snapshot_at = SystemTime::now();
    if let Some(valid_paths) = store.get_image_paths().warn_on_err() {
        report.orphans_removed += blobs.cleanup_orphans(&valid_paths, snapshot_at);
    }

    info!(
        evicted_by_count = report.evicted_by_count,
        evicted_by_age = report.evicted_by_age,
        orphans_removed = report.orphans_removed,
        "Retention cycle complete"
    );
    report
}

/// Time left until the next cycle is due.
fn remaining_wait(since_last_cycle: Duration, interval: Duration) -> Duration {
    interval.saturating_sub(since_last_cycle)
}

enum RetentionSignal {
    Reschedule,
    Cancel,
}

/// Background retention schedule.
///
/// A cycle runs as soon as the manager starts, then once per configured
/// interval. The interval and limits are re-read from the shared config each
/// time.
pub struct RetentionManager {
    signal_tx: Option<Sender<RetentionSignal>>,
    thread: Option<JoinHandle<()>>,
}

impl RetentionManager {
    pub fn start(store: HistoryStore, blobs: BlobStore, config: SharedConfig) -> std::io::Result<Self> {
        let (signal_tx, signal_rx) = mpsc::channel::<RetentionSignal>();

        let thread = thread::Builder::new()
            .name("clipboard-retention".to_string())
            .spawn(move || loop {
                let snapshot = config.read().clone();
                run_cycle(&store, &blobs, &snapshot);
                let last_cycle = Instant::now();

                loop {
                    let interval = config.read().cleanup_interval();
                    let wait = remaining_wait(last_cycle.elapsed(), interval);
                    debug!(wait_secs = wait.as_secs(), "Next retention cycle scheduled");
                    match signal_rx.recv_timeout(wait) {
                        Ok(RetentionSignal::Reschedule) => continue,
                        Err(RecvTimeoutError::Timeout) => break,
                        // Cancelled, or the manager was dropped.
                        Ok(RetentionSignal::Cancel) | Err(RecvTimeoutError::Disconnected) => {
                            return
                        }
                    }
                }
            })?;

        Ok(Self {
            signal_tx: Some(signal_tx),
            thread: Some(thread),
        })
    }

    /// Recompute the next due time from the current config interval.
    ///
    /// A cycle runs right away if the new interval has already passed since
    /// the last one.
    pub fn reschedule(&self) {
        if let Some(tx) = &self.signal_tx {
            let _ = tx.send(RetentionSignal::Reschedule);
        }
    }

    /// Stop future cycles. A cycle already in progress runs to completion.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.signal_tx.take() {
            let _ = tx.send(RetentionSignal::Cancel);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Retention thread panicked");
            }
            debug!("Retention manager cancelled");
        }
    }
}

impl Drop for RetentionManager {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::types::{CapturedImage, ContentType, NewEntry};
    use chrono::Utc;
    use tempfile::TempDir;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn setup() -> (TempDir, HistoryStore, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("history.db")).unwrap();
        let blobs = BlobStore::new(dir.path());
        (dir, store, blobs)
    }

    fn insert_text(store: &HistoryStore, text: &str, created_at: i64) -> i64 {
        store
            .insert(&NewEntry::text(text.to_string(), ContentType::Text).with_created_at(created_at))
            .unwrap()
    }

    fn backdate(blobs: &BlobStore, relative: &str) {
        let file = std::fs::File::options()
            .write(true)
            .open(blobs.full_path(relative))
            .unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();
    }

    fn config_with(max_entries: usize, max_age_days: i64) -> Config {
        Config {
            max_entries,
            max_age_days,
            ..Config::default()
        }
    }

    #[test]
    fn test_count_eviction_spares_pinned() {
        let (_dir, store, blobs) = setup();
        let base = Utc::now().timestamp_millis() - 1000;
        for i in 0..3 {
            let id = insert_text(&store, &format!("pinned {i}"), base + i);
            store.pin(id).unwrap();
        }
        for i in 0..10 {
            insert_text(&store, &format!("loose {i}"), base + 10 + i);
        }

        let report = run_cycle(&store, &blobs, &config_with(5, 0));

        assert_eq!(report.evicted_by_count, 8);
        let remaining = store.get_recent(100, 0).unwrap();
        assert_eq!(remaining.len(), 5);
        assert_eq!(remaining.iter().filter(|e| e.is_pinned).count(), 3);
        let loose: Vec<_> = remaining
            .iter()
            .filter(|e| !e.is_pinned)
            .map(|e| e.content_text.clone().unwrap())
            .collect();
        assert_eq!(loose, vec!["loose 9", "loose 8"]);
    }

    #[test]
    fn test_under_limit_evicts_nothing() {
        let (_dir, store, blobs) = setup();
        let now = Utc::now().timestamp_millis();
        insert_text(&store, "a", now);
        insert_text(&store, "b", now);

        let report = run_cycle(&store, &blobs, &config_with(5, 0));
        assert_eq!(report, CleanupReport::default());
        assert_eq!(store.get_count().unwrap(), 2);
    }

    #[test]
    fn test_age_eviction_spares_pinned() {
        let (_dir, store, blobs) = setup();
        let two_days_ago = Utc::now().timestamp_millis() - 2 * DAY_MS;
        let old = insert_text(&store, "old", two_days_ago);
        let old_pinned = insert_text(&store, "old pinned", two_days_ago);
        store.pin(old_pinned).unwrap();
        let fresh = insert_text(&store, "fresh", Utc::now().timestamp_millis());

        let report = run_cycle(&store, &blobs, &config_with(100, 1));

        assert_eq!(report.evicted_by_age, 1);
        assert!(store.get_by_id(old).unwrap().is_none());
        assert!(store.get_by_id(old_pinned).unwrap().is_some());
        assert!(store.get_by_id(fresh).unwrap().is_some());
    }

    #[test]
    fn test_non_positive_age_disables_age_eviction() {
        let (_dir, store, blobs) = setup();
        let ancient = Utc::now().timestamp_millis() - 400 * DAY_MS;
        insert_text(&store, "ancient", ancient);

        run_cycle(&store, &blobs, &config_with(100, 0));
        run_cycle(&store, &blobs, &config_with(100, -3));
        assert_eq!(store.get_count().unwrap(), 1);
    }

    #[test]
    fn test_orphan_sweep_keeps_referenced_blobs() {
        let (_dir, store, blobs) = setup();
        let now = Utc::now().timestamp_millis();
        let image = CapturedImage::new(1, 1, vec![1, 2, 3, 255]).unwrap();

        let kept_path = blobs.save(&image, now).unwrap();
        let mut entry = NewEntry::image(image.clone()).with_created_at(now);
        entry.image_path = Some(kept_path.clone());
        store.insert(&entry).unwrap();

        let other = CapturedImage::new(1, 1, vec![4, 5, 6, 255]).unwrap();
        let orphan_path = blobs.save(&other, now).unwrap();
        backdate(&blobs, &orphan_path);

        let report = run_cycle(&store, &blobs, &config_with(100, 0));

        assert_eq!(report.orphans_removed, 1);
        assert!(blobs.full_path(&kept_path).is_file());
        assert!(!blobs.full_path(&orphan_path).exists());
    }

    #[test]
    fn test_evicted_image_blob_is_swept_same_cycle() {
        let (_dir, store, blobs) = setup();
        let old = Utc::now().timestamp_millis() - 3 * DAY_MS;
        let image = CapturedImage::new(1, 1, vec![7, 7, 7, 255]).unwrap();
        let path = blobs.save(&image, old).unwrap();
        let mut entry = NewEntry::image(image).with_created_at(old);
        entry.image_path = Some(path.clone());
        store.insert(&entry).unwrap();

        let report = run_cycle(&store, &blobs, &config_with(100, 1));

        assert_eq!(report.evicted_by_age, 1);
        assert_eq!(report.orphans_removed, 1);
        assert!(!blobs.full_path(&path).exists());
    }

    #[test]
    fn test_sweep_spares_capture_that_has_not_inserted_its_row_yet() {
        let (_dir, store, blobs) = setup();
        let now = Utc::now().timestamp_millis();
        let image = CapturedImage::new(1, 1, vec![9, 8, 7, 255]).unwrap();

        // The capture has written its file; the insert comes after the sweep.
        let path = blobs.save(&image, now).unwrap();
        let report = run_cycle(&store, &blobs, &config_with(100, 0));
        assert_eq!(report.orphans_removed, 0);

        let mut entry = NewEntry::image(image).with_created_at(now);
        entry.image_path = Some(path.clone());
        let id = store.insert(&entry).unwrap();

        assert!(blobs.full_path(&path).is_file());
        let row = store.get_by_id(id).unwrap().unwrap();
        assert!(blobs.load(row.image_path.as_deref().unwrap()).is_some());
    }

    #[test]
    fn test_snapshot_taken_before_capture_keeps_captured_blob() {
        let (_dir, store, blobs) = setup();
        let snapshot_at = SystemTime::now();
        let valid_paths = store.get_image_paths().unwrap();

        let now = Utc::now().timestamp_millis();
        let image = CapturedImage::new(1, 1, vec![1, 1, 1, 255]).unwrap();
        let path = blobs.save(&image, now).unwrap();
        let mut entry = NewEntry::image(image).with_created_at(now);
        entry.image_path = Some(path.clone());
        store.insert(&entry).unwrap();

        assert_eq!(blobs.cleanup_orphans(&valid_paths, snapshot_at), 0);
        assert!(blobs.full_path(&path).is_file());
    }

    #[test]
    fn test_remaining_wait_follows_lowered_interval() {
        let minute = Duration::from_secs(60);
        assert_eq!(remaining_wait(10 * minute, 30 * minute), 20 * minute);
        // Lowered below the time already waited: due now.
        assert_eq!(remaining_wait(10 * minute, 5 * minute), Duration::ZERO);
        assert_eq!(remaining_wait(Duration::ZERO, minute), minute);
    }

    #[test]
    fn test_reschedule_does_not_run_extra_cycle() {
        let (_dir, store, blobs) = setup();
        let first = insert_text(&store, "first", Utc::now().timestamp_millis() - 5 * DAY_MS);
        let config = config_with(100, 1).into_shared();
        let mut manager = RetentionManager::start(store.clone(), blobs, config.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.get_by_id(first).unwrap().is_some() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(store.get_by_id(first).unwrap().is_none(), "startup cycle must run");
        let stale = insert_text(&store, "stale", Utc::now().timestamp_millis() - 5 * DAY_MS);

        config.write().cleanup_interval_minutes = 5;
        manager.reschedule();
        std::thread::sleep(Duration::from_millis(200));
        assert!(store.get_by_id(stale).unwrap().is_some());

        let started = Instant::now();
        manager.cancel();
        assert!(started.elapsed() < Duration::from_secs(5));
        // Safe after cancel.
        manager.reschedule();
    }

    #[test]
    fn test_manager_runs_immediately_and_cancels() {
        let (_dir, store, blobs) = setup();
        let old = Utc::now().timestamp_millis() - 5 * DAY_MS;
        insert_text(&store, "stale", old);

        let config = config_with(100, 1).into_shared();
        let mut manager = RetentionManager::start(store.clone(), blobs, config).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.get_count().unwrap() != 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(store.get_count().unwrap(), 0);

        let started = Instant::now();
        manager.cancel();
        assert!(started.elapsed() < Duration::from_secs(5), "cancel must not wait out the interval");
    }
}
