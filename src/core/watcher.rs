use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};

use super::events::{EventKind, RawNotification};
use super::filter::ExtensionFilter;
use super::pipeline::{shared_filter, Pipeline, SharedFilter};
use super::queue::QueueProducer;
use crate::config::AppConfig;
use crate::error::WatchError;
use crate::store::EventStore;

/// How often the observation thread wakes up to check for `stop`.
const WAKE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchState {
    Idle,
    Watching,
}

/// One directory-watch lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSession {
    pub root_path: PathBuf,
    pub recursive: bool,
    pub extension_filter: ExtensionFilter,
}

struct Running {
    session: WatchSession,
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    /// Loss recorded by this session's thread; never outlives the session.
    lost: Arc<Mutex<Option<WatchError>>>,
    handle: JoinHandle<()>,
}

impl Running {
    fn take_lost(&self) -> Option<WatchError> {
        self.lost.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take()
    }

    /// Signals the thread and waits for it to exit.
    fn finish(self) -> WatchSession {
        self.stop.store(true, Ordering::SeqCst);
        if self.handle.join().is_err() {
            tracing::error!(root = %self.session.root_path.display(), "observation thread panicked");
        }
        self.session
    }
}

/// Watches one root on a dedicated thread and feeds admitted events into
/// the delivery queue and the store.
///
/// `Idle --start--> Watching --stop--> Idle`; `start` while watching and
/// `stop` while idle are no-ops.
pub struct DirectoryMonitor {
    store: Option<EventStore>,
    producer: QueueProducer,
    filter: SharedFilter,
    debounce: Duration,
    running: Option<Running>,
}

impl DirectoryMonitor {
    pub fn new(producer: QueueProducer, store: Option<EventStore>) -> Self {
        Self {
            store,
            producer,
            filter: shared_filter(ExtensionFilter::All),
            debounce: Duration::ZERO,
            running: None,
        }
    }

    pub fn with_config(config: &AppConfig, producer: QueueProducer, store: Option<EventStore>) -> Self {
        let mut monitor = Self::new(producer, store);
        monitor.debounce = config.watcher.debounce();
        monitor.set_extension_filter(ExtensionFilter::from_option(
            config.watcher.extension_filter.as_deref(),
        ));
        monitor
    }

    /// Starts watching `root`. Returns immediately; observation runs on its own thread.
    pub fn start<P: AsRef<Path>>(&mut self, root: P, recursive: bool) -> Result<WatchSession, WatchError> {
        self.reap_if_lost();

        if let Some(running) = &self.running {
            tracing::info!(root = %running.session.root_path.display(), "already watching");
            return Ok(running.session.clone());
        }

        let root = validate_root(root.as_ref())?;
        let session = WatchSession {
            root_path: root.clone(),
            recursive,
            extension_filter: self.extension_filter(),
        };

        let stop = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), WatchError>>(1);

        let pipeline = Pipeline::new(self.store.clone(), self.producer.clone(), self.filter.clone())
            .with_debounce(self.debounce);
        let thread_stop = stop.clone();
        let thread_alive = alive.clone();
        let lost = Arc::new(Mutex::new(None));
        let thread_lost = lost.clone();
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        let handle = thread::Builder::new()
            .name("filewatch-monitor".to_string())
            .spawn(move || {
                observe(root, mode, pipeline, thread_stop, thread_lost, ready_tx);
                thread_alive.store(false, Ordering::SeqCst);
            })
            .map_err(|err| WatchError::Notify(notify::Error::io(err)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(WatchError::invalid_path(&session.root_path, "observation thread exited during startup"));
            }
        }

        tracing::info!(root = %session.root_path.display(), recursive, "watch started");

        self.running = Some(Running {
            session: session.clone(),
            stop,
            alive,
            lost,
            handle,
        });
        Ok(session)
    }

    /// Stops watching and waits for the observation thread to exit.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            tracing::debug!("stop called while idle");
            return;
        };

        let session = running.finish();
        tracing::info!(root = %session.root_path.display(), "watch stopped");
    }

    pub fn state(&self) -> WatchState {
        match &self.running {
            Some(running) if running.alive.load(Ordering::SeqCst) => WatchState::Watching,
            _ => WatchState::Idle,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.state() == WatchState::Watching
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<WatchSession> {
        match self.state() {
            WatchState::Watching => self.running.as_ref().map(|r| r.session.clone()),
            WatchState::Idle => None,
        }
    }

    /// Returns the current session's lost-watch error once; the monitor is
    /// `Idle` afterwards. A loss from an earlier session is never reported.
    pub fn take_error(&mut self) -> Option<WatchError> {
        let err = self.running.as_ref().and_then(Running::take_lost)?;
        if let Some(running) = self.running.take() {
            running.finish();
        }
        Some(err)
    }

    /// Replaces the extension filter. Already-delivered events are unaffected.
    pub fn set_extension_filter(&mut self, filter: ExtensionFilter) {
        tracing::info!(filter = %filter, "extension filter set");
        if let Some(running) = &mut self.running {
            running.session.extension_filter = filter.clone();
        }
        *self.filter.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = filter;
    }

    pub fn extension_filter(&self) -> ExtensionFilter {
        self.filter
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Discards a session whose thread has already exited, along with any
    /// loss it recorded.
    fn reap_if_lost(&mut self) {
        let finished = matches!(&self.running, Some(r) if !r.alive.load(Ordering::SeqCst));
        if finished {
            if let Some(running) = self.running.take() {
                if let Some(err) = running.take_lost() {
                    tracing::debug!("discarding unreported loss: {}", err);
                }
                running.finish();
            }
        }
    }
}

impl Drop for DirectoryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn validate_root(root: &Path) -> Result<PathBuf, WatchError> {
    let canonical = fs::canonicalize(root)
        .map_err(|err| WatchError::invalid_path(root, err.to_string()))?;
    if !canonical.is_dir() {
        return Err(WatchError::invalid_path(root, "not a directory"));
    }
    fs::read_dir(&canonical).map_err(|err| WatchError::invalid_path(root, err.to_string()))?;
    Ok(canonical)
}

/// Body of the observation thread.
fn observe(
    root: PathBuf,
    mode: RecursiveMode,
    mut pipeline: Pipeline,
    stop: Arc<AtomicBool>,
    lost: Arc<Mutex<Option<WatchError>>>,
    ready: mpsc::SyncSender<Result<(), WatchError>>,
) {
    let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();

    let mut watcher: RecommendedWatcher = match notify::recommended_watcher(move |res| {
        // Receiver gone means the thread is exiting.
        let _ = tx.send(res);
    }) {
        Ok(w) => w,
        Err(err) => {
            let _ = ready.send(Err(WatchError::Notify(err)));
            return;
        }
    };

    if let Err(err) = watcher.watch(&root, mode) {
        let _ = ready.send(Err(WatchError::invalid_path(&root, err.to_string())));
        return;
    }
    let _ = ready.send(Ok(()));

    let lose = |reason: String| {
        tracing::error!(root = %root.display(), "watch lost: {}", reason);
        *lost.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(WatchError::WatchLost {
            root: root.clone(),
            reason,
        });
    };

    while !stop.load(Ordering::SeqCst) {
        match rx.recv_timeout(WAKE_INTERVAL) {
            Ok(Ok(event)) => {
                for raw in translate(&event) {
                    pipeline.process(raw);
                }
            }
            Ok(Err(err)) => {
                lose(err.to_string());
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                if !root.is_dir() {
                    lose("watch root no longer exists".to_string());
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                lose("notify channel disconnected".to_string());
                break;
            }
        }
    }

    tracing::debug!("observation thread finished");
}

/// Maps one notify event to zero or more raw notifications.
///
/// Renames are reported as a deletion of the old name and a creation of the
/// new one; the combined rename event that some backends also emit is skipped.
pub fn translate(event: &notify::Event) -> Vec<RawNotification> {
    use notify::EventKind as Kind;

    event
        .paths
        .iter()
        .filter_map(|path| {
            let (kind, is_directory) = match event.kind {
                Kind::Create(CreateKind::Folder) => (EventKind::Created, true),
                Kind::Create(CreateKind::File) => (EventKind::Created, false),
                Kind::Create(_) => (EventKind::Created, path.is_dir()),
                Kind::Modify(ModifyKind::Name(RenameMode::From)) => (EventKind::Deleted, false),
                Kind::Modify(ModifyKind::Name(RenameMode::To)) => (EventKind::Created, path.is_dir()),
                Kind::Modify(ModifyKind::Name(RenameMode::Both)) => return None,
                Kind::Modify(ModifyKind::Name(_)) => {
                    if path.exists() {
                        (EventKind::Created, path.is_dir())
                    } else {
                        (EventKind::Deleted, false)
                    }
                }
                Kind::Modify(_) => (EventKind::Modified, path.is_dir()),
                Kind::Remove(RemoveKind::Folder) => (EventKind::Deleted, true),
                Kind::Remove(_) => (EventKind::Deleted, false),
                Kind::Access(_) | Kind::Any | Kind::Other => return None,
            };
            Some(RawNotification::new(path.clone(), kind, is_directory))
        })
        .collect()
}
