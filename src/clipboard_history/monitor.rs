//! Clipboard monitoring
//!
//! A dedicated thread polls the clipboard change token, drains global hotkey
//! events and runs the capture pipeline for every change. The pipeline itself
//! is a plain synchronous method so it can be driven without a thread.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use super::blob_store::BlobStore;
use super::change_detection::ChangeDetector;
use super::clipboard::ClipboardBackend;
use super::database::HistoryStore;
use super::extractor::extract;
use super::source_app::SourceResolver;
use super::types::NewEntry;
use crate::config::{Config, HotkeyConfig};
use crate::error::{HistoryError, Result, ResultExt};
use crate::hotkeys::{HotkeyCoordinator, HotkeyHandler};

/// Loop tick for change-token polling and hotkey draining.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Delay between a change notification and reading the payload. Some
/// producers fill clipboard formats across several calls.
pub const CAPTURE_GRACE: Duration = Duration::from_millis(30);

/// What happened to one clipboard change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Our own paste-back write.
    Suppressed,
    Paused,
    Blacklisted,
    /// Nothing capturable on the clipboard.
    Empty,
    Duplicate,
    Stored(i64),
    Failed,
}

#[derive(Debug)]
struct MonitorFlags {
    paused: AtomicBool,
    suppress_next: AtomicBool,
    deduplicate: AtomicBool,
    stop: AtomicBool,
    /// Lowercased application names.
    blacklist: RwLock<HashSet<String>>,
}

/// Cross-thread switches read by the capture pipeline.
///
/// Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct MonitorControl {
    flags: Arc<MonitorFlags>,
}

impl MonitorControl {
    pub fn new(config: &Config) -> Self {
        let control = Self {
            flags: Arc::new(MonitorFlags {
                paused: AtomicBool::new(false),
                suppress_next: AtomicBool::new(false),
                deduplicate: AtomicBool::new(config.deduplicate_consecutive),
                stop: AtomicBool::new(false),
                blacklist: RwLock::new(HashSet::new()),
            }),
        };
        control.update_blacklist(&config.blacklisted_apps);
        control
    }

    pub fn pause(&self) {
        self.flags.paused.store(true, Ordering::Release);
        info!("Clipboard capture paused");
    }

    pub fn resume(&self) {
        self.flags.paused.store(false, Ordering::Release);
        info!("Clipboard capture resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::Acquire)
    }

    /// Ignore the next clipboard change. Call right before writing to the
    /// clipboard ourselves.
    pub fn set_suppress_next(&self) {
        self.flags.suppress_next.store(true, Ordering::Release);
    }

    pub fn update_blacklist(&self, apps: &[String]) {
        let names: HashSet<String> = apps
            .iter()
            .map(|app| app.trim().to_lowercase())
            .filter(|app| !app.is_empty())
            .collect();
        debug!(count = names.len(), "Updated capture blacklist");
        *self.flags.blacklist.write() = names;
    }

    pub fn set_deduplicate(&self, enabled: bool) {
        self.flags.deduplicate.store(enabled, Ordering::Release);
    }

    fn is_blacklisted(&self, app: &str) -> bool {
        self.flags.blacklist.read().contains(&app.to_lowercase())
    }

    /// Clear a pending suppression and report whether one was set.
    pub fn take_suppress_next(&self) -> bool {
        self.flags.suppress_next.swap(false, Ordering::AcqRel)
    }

    fn deduplicate(&self) -> bool {
        self.flags.deduplicate.load(Ordering::Acquire)
    }

    fn stop_requested(&self) -> bool {
        self.flags.stop.load(Ordering::Acquire)
    }
}

/// Per-change capture: suppress, pause, provenance, blacklist, extract,
/// dedupe, persist.
#[derive(Debug, Clone)]
pub struct CapturePipeline {
    store: HistoryStore,
    blobs: BlobStore,
    control: MonitorControl,
    grace: Duration,
}

impl CapturePipeline {
    pub fn new(store: HistoryStore, blobs: BlobStore, control: MonitorControl) -> Self {
        Self {
            store,
            blobs,
            control,
            grace: CAPTURE_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn control(&self) -> &MonitorControl {
        &self.control
    }

    /// Handle one clipboard change notification.
    ///
    /// Never fails: every error is logged and reported as an outcome so the
    /// monitor loop keeps running.
    pub fn process_change<B: ClipboardBackend + ?Sized>(
        &self,
        backend: &mut B,
        resolver: &dyn SourceResolver,
    ) -> CaptureOutcome {
        if self.control.take_suppress_next() {
            debug!("Skipping clipboard change written by paste-back");
            return CaptureOutcome::Suppressed;
        }
        if self.control.is_paused() {
            return CaptureOutcome::Paused;
        }

        if !self.grace.is_zero() {
            thread::sleep(self.grace);
        }

        let source = resolver.resolve();
        if let Some(app) = source.app.as_deref() {
            if self.control.is_blacklisted(app) {
                debug!(app, "Dropping clipboard change from blacklisted app");
                return CaptureOutcome::Blacklisted;
            }
        }

        let Some(entry) = extract(backend) else {
            debug!("Clipboard change had no capturable content");
            return CaptureOutcome::Empty;
        };
        let entry = entry.with_source(source);

        if self.control.deduplicate()
            && self
                .store
                .is_duplicate(entry.content_hash())
                .warn_on_err()
                .unwrap_or(false)
        {
            debug!(
                content_type = %entry.content_type(),
                "Dropping duplicate of most recent entry"
            );
            return CaptureOutcome::Duplicate;
        }

        let content_type = entry.content_type();
        match self.persist(entry) {
            Ok(id) => {
                debug!(id, content_type = %content_type, "Stored clipboard entry");
                CaptureOutcome::Stored(id)
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Failed to store clipboard entry");
                CaptureOutcome::Failed
            }
        }
    }

    fn persist(&self, mut entry: NewEntry) -> Result<i64> {
        if let Some(image) = entry.image.take() {
            entry.image_path = Some(self.blobs.save(&image, entry.created_at)?);
        }

        self.store.insert(&entry).inspect_err(|_| {
            if let Some(path) = &entry.image_path {
                // With the store unreachable the file is left for the orphan sweep.
                let _ = self.blobs.delete_if_unreferenced(path, &self.store);
            }
        })
    }
}

/// Recall shortcut to register on the monitor thread.
pub struct HotkeySetup {
    pub config: HotkeyConfig,
    pub handler: HotkeyHandler,
}

enum MonitorCommand {
    SetHotkey(HotkeyConfig),
}

/// Running capture thread.
///
/// Dropping the monitor stops it.
pub struct CaptureMonitor {
    control: MonitorControl,
    commands: Sender<MonitorCommand>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureMonitor {
    /// Spawn the monitor thread.
    ///
    /// The clipboard backend is created on the monitor thread through
    /// `backend_factory`; failing to create it fails `start`.
    pub fn start<F>(
        pipeline: CapturePipeline,
        backend_factory: F,
        resolver: Box<dyn SourceResolver>,
        hotkey: Option<HotkeySetup>,
    ) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn ClipboardBackend>> + Send + 'static,
    {
        let control = pipeline.control().clone();
        let (commands, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);

        let thread = thread::Builder::new()
            .name("clipboard-monitor".to_string())
            .spawn(move || {
                let backend = match backend_factory() {
                    Ok(backend) => {
                        let _ = ready_tx.send(Ok(()));
                        backend
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                monitor_loop(pipeline, backend, resolver, hotkey, command_rx);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(HistoryError::Clipboard(
                    "monitor thread exited during startup".to_string(),
                ));
            }
        }

        info!(poll_interval_ms = POLL_INTERVAL.as_millis() as u64, "Clipboard monitor started");
        Ok(Self {
            control,
            commands,
            thread: Some(thread),
        })
    }

    pub fn control(&self) -> &MonitorControl {
        &self.control
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn set_suppress_next(&self) {
        self.control.set_suppress_next();
    }

    pub fn update_blacklist(&self, apps: &[String]) {
        self.control.update_blacklist(apps);
    }

    pub fn set_deduplicate(&self, enabled: bool) {
        self.control.set_deduplicate(enabled);
    }

    /// Rebind the recall shortcut on the monitor thread.
    pub fn set_hotkey(&self, config: HotkeyConfig) {
        if self.commands.send(MonitorCommand::SetHotkey(config)).is_err() {
            warn!("Clipboard monitor is not running, hotkey change ignored");
        }
    }

    /// Ask the loop to exit and wait for it. No entry is stored after this
    /// returns.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.control.flags.stop.store(true, Ordering::Release);
        if thread.join().is_err() {
            error!("Clipboard monitor thread panicked");
        }
        info!("Clipboard monitor stopped");
    }
}

impl Drop for CaptureMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor_loop(
    pipeline: CapturePipeline,
    mut backend: Box<dyn ClipboardBackend>,
    resolver: Box<dyn SourceResolver>,
    hotkey: Option<HotkeySetup>,
    commands: Receiver<MonitorCommand>,
) {
    let control = pipeline.control().clone();
    let mut hotkeys = hotkey.and_then(register_hotkey);
    let mut detector = ChangeDetector::new();

    loop {
        pump_thread_messages();

        // Shortcut presses are observed before any clipboard change queued after them.
        if let Some(coordinator) = &hotkeys {
            while let Ok(event) = global_hotkey::GlobalHotKeyEvent::receiver().try_recv() {
                coordinator.handle_event(event.id, event.state);
            }
        }

        loop {
            match commands.try_recv() {
                Ok(MonitorCommand::SetHotkey(config)) => match hotkeys.as_mut() {
                    Some(coordinator) => {
                        let _ = coordinator.set_hotkey(&config);
                    }
                    None => warn!("Global hotkeys unavailable, ignoring hotkey change"),
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    control.flags.stop.store(true, Ordering::Release);
                    break;
                }
            }
        }

        if control.stop_requested() {
            break;
        }

        if let Some(token) = backend.change_token() {
            if detector.observe(token) {
                let outcome = pipeline.process_change(backend.as_mut(), resolver.as_ref());
                trace!(?outcome, "Processed clipboard change");
            }
        }

        thread::sleep(POLL_INTERVAL);
    }

    // Unregister on the thread that registered.
    drop(hotkeys.take());
    debug!("Clipboard monitor loop exited");
}

fn register_hotkey(
    setup: HotkeySetup,
) -> Option<HotkeyCoordinator<global_hotkey::GlobalHotKeyManager>> {
    let manager = match global_hotkey::GlobalHotKeyManager::new() {
        Ok(manager) => manager,
        Err(e) => {
            warn!(error = %e, "Global hotkeys unavailable");
            return None;
        }
    };
    let mut coordinator = HotkeyCoordinator::new(manager, setup.handler);
    // Failure is logged by the coordinator; the loop runs without a shortcut.
    let _ = coordinator.set_hotkey(&setup.config);
    Some(coordinator)
}

/// Hotkey notifications on Windows arrive on this thread's message queue.
#[cfg(windows)]
fn pump_thread_messages() {
    use winapi::um::winuser::{DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE};

    // SAFETY: MSG is plain data; PeekMessageW fills it before we read it.
    unsafe {
        let mut msg: MSG = std::mem::zeroed();
        while PeekMessageW(&mut msg, std::ptr::null_mut(), 0, 0, PM_REMOVE) != 0 {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

#[cfg(not(windows))]
fn pump_thread_messages() {}
