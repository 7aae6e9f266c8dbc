//! Config file watcher
//!
//! Emits a reload event after the config file is created or modified, so a
//! running process picks up settings saved by another front end.

use notify::{recommended_watcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Quiet period after the last file event before a reload is emitted.
/// Editors often write a file in several steps.
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Event emitted when config needs to be reloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigReloadEvent {
    Reload,
}

/// Watches the config file's directory and emits debounced reload events.
pub struct ConfigWatcher {
    stop: Arc<AtomicBool>,
    watcher_thread: Option<thread::JoinHandle<()>>,
}

impl ConfigWatcher {
    /// Start watching `config_path`.
    ///
    /// The parent directory is watched so the file may be created or replaced
    /// after startup.
    pub fn start(config_path: PathBuf) -> notify::Result<(Self, Receiver<ConfigReloadEvent>)> {
        let watch_path = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&watch_path)?;

        let (watch_tx, watch_rx) = channel();
        let mut watcher = recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = watch_tx.send(res);
        })?;
        watcher.watch(&watch_path, RecursiveMode::NonRecursive)?;

        info!(
            path = %watch_path.display(),
            target = %config_path.display(),
            "Config watcher started"
        );

        let (tx, rx) = channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let watcher_thread = thread::Builder::new()
            .name("config-watcher".to_string())
            .spawn(move || watch_loop(watcher, watch_rx, &config_path, tx, &stop_flag))?;

        Ok((
            Self {
                stop,
                watcher_thread: Some(watcher_thread),
            },
            rx,
        ))
    }
}

fn watch_loop(
    _watcher: RecommendedWatcher,
    watch_rx: Receiver<notify::Result<notify::Event>>,
    config_path: &Path,
    tx: Sender<ConfigReloadEvent>,
    stop: &AtomicBool,
) {
    let file_name = config_path.file_name();
    let mut pending_since: Option<Instant> = None;

    while !stop.load(Ordering::Acquire) {
        match watch_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Ok(event)) => {
                let is_config_change = event
                    .paths
                    .iter()
                    .any(|path| path.file_name() == file_name);
                let is_relevant_event = matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                );
                if is_config_change && is_relevant_event {
                    debug!(kind = ?event.kind, "Config file event");
                    pending_since = Some(Instant::now());
                }
            }
            Ok(Err(e)) => warn!(error = %e, watcher = "config", "File watcher error"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if pending_since.is_some_and(|since| since.elapsed() >= DEBOUNCE) {
            pending_since = None;
            info!("Config file changed, emitting reload event");
            if tx.send(ConfigReloadEvent::Reload).is_err() {
                break;
            }
        }
    }

    info!(watcher = "config", "Config watcher shutting down");
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.watcher_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emits_one_reload_for_a_burst_of_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let (_watcher, rx) = ConfigWatcher::start(path.clone()).unwrap();

        std::fs::write(&path, "{}").unwrap();
        std::fs::write(&path, r#"{"max_entries": 10}"#).unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(10)),
            Ok(ConfigReloadEvent::Reload)
        );
        assert!(rx.recv_timeout(DEBOUNCE * 2).is_err());
    }

    #[test]
    fn test_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let (_watcher, rx) = ConfigWatcher::start(dir.path().join("config.json")).unwrap();

        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        assert!(rx.recv_timeout(DEBOUNCE * 3).is_err());
    }

    #[test]
    fn test_drop_stops_thread() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, _rx) = ConfigWatcher::start(dir.path().join("config.json")).unwrap();
        let started = Instant::now();
        drop(watcher);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
