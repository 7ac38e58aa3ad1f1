use crate::config::{self, Config};
use crate::session::SearchSession;
use crate::source::SourceProvider;
use anyhow::Result;
use clap::ValueEnum;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_MAX_BATCH: usize = 1000;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum WatchMode {
    Off,
    /// Watch when the platform allows it, otherwise continue without.
    Auto,
    On,
}

#[derive(Clone, Copy, Debug)]
pub struct WatchConfig {
    pub mode: WatchMode,
    pub debounce: Duration,
    pub max_batch: usize,
}

impl WatchConfig {
    pub fn new(mode: WatchMode, debounce_ms: u64) -> Self {
        Self {
            mode,
            debounce: Duration::from_millis(debounce_ms.max(1)),
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

/// A change to the workspace that may affect the route set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(PathBuf),
    Deleted(PathBuf),
    Saved(PathBuf),
    ConfigChanged(Config),
    /// The watcher lost track of events; everything is re-read.
    Rescan,
}

/// Turns file-system events into [`ChangeEvent`]s and applies them to a
/// session.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    config_root: PathBuf,
    explicit_config: Option<PathBuf>,
    config_paths: Vec<PathBuf>,
}

impl ChangeNotifier {
    pub fn new(config_root: PathBuf, explicit_config: Option<PathBuf>) -> Self {
        let explicit_config = explicit_config.map(crate::util::canonical_or_self);
        let config_paths = match &explicit_config {
            Some(path) => vec![path.clone()],
            None => config::candidate_paths(&config_root),
        };
        Self {
            config_root,
            explicit_config,
            config_paths,
        }
    }

    pub fn is_config_path(&self, path: &Path) -> bool {
        self.config_paths.iter().any(|candidate| candidate == path)
    }

    /// Maps one notify event to change events. Touching a config file
    /// reloads it; a config that fails to load is logged and dropped so the
    /// current patterns stay in effect.
    pub fn classify(&self, event: &Event) -> Vec<ChangeEvent> {
        if event.paths.iter().any(|path| self.is_config_path(path)) {
            return match Config::load(&self.config_root, self.explicit_config.as_deref()) {
                Ok(config) => vec![ChangeEvent::ConfigChanged(config)],
                Err(err) => {
                    tracing::warn!(error = %err, "config reload failed, keeping current patterns");
                    Vec::new()
                }
            };
        }
        let paths = event.paths.iter().cloned();
        match event.kind {
            EventKind::Create(_) => paths.map(ChangeEvent::Created).collect(),
            EventKind::Remove(_) => paths.map(ChangeEvent::Deleted).collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                paths.map(ChangeEvent::Deleted).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                paths.map(ChangeEvent::Created).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let mut out = Vec::new();
                let mut paths = paths;
                if let Some(from) = paths.next() {
                    out.push(ChangeEvent::Deleted(from));
                }
                out.extend(paths.map(ChangeEvent::Created));
                out
            }
            EventKind::Modify(ModifyKind::Name(_)) => paths
                .map(|path| {
                    if path.exists() {
                        ChangeEvent::Created(path)
                    } else {
                        ChangeEvent::Deleted(path)
                    }
                })
                .collect(),
            EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
            EventKind::Modify(_) => paths.map(ChangeEvent::Saved).collect(),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }

    pub fn apply<S: SourceProvider>(session: &mut SearchSession<S>, event: ChangeEvent) -> bool {
        Self::apply_batch(session, vec![event])
    }

    /// Applies a batch and refreshes at most once. Events for files outside
    /// the roots or patterns are ignored. Returns whether a refresh ran.
    pub fn apply_batch<S: SourceProvider>(
        session: &mut SearchSession<S>,
        events: Vec<ChangeEvent>,
    ) -> bool {
        let mut dirty = false;
        for event in events {
            match event {
                ChangeEvent::Created(path) => {
                    if session.is_eligible(&path) {
                        tracing::debug!(path = %path.display(), "controller file created");
                        dirty = true;
                    }
                }
                ChangeEvent::Deleted(path) | ChangeEvent::Saved(path) => {
                    if session.is_eligible(&path) {
                        tracing::debug!(path = %path.display(), "controller file changed");
                        session.invalidate(&path);
                        dirty = true;
                    }
                }
                ChangeEvent::ConfigChanged(config) => match session.apply_config(&config) {
                    Ok(()) => {
                        tracing::info!("file patterns reloaded");
                        dirty = true;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "invalid file patterns, keeping current ones");
                    }
                },
                ChangeEvent::Rescan => {
                    session.store_mut().index_mut().dispose();
                    dirty = true;
                }
            }
        }
        if dirty {
            session.refresh();
        }
        dirty
    }
}

/// Events collected during one debounce window.
struct PendingBatch {
    events: Vec<ChangeEvent>,
    max_batch: usize,
}

impl PendingBatch {
    fn new(max_batch: usize) -> Self {
        Self {
            events: Vec::new(),
            max_batch: max_batch.max(1),
        }
    }

    /// Drops duplicates. Past `max_batch` file events, or on an explicit
    /// rescan, the file events collapse into one `Rescan`; config changes
    /// are always kept.
    fn push(&mut self, event: ChangeEvent) {
        if self.events.contains(&event) {
            return;
        }
        let is_config = matches!(event, ChangeEvent::ConfigChanged(_));
        if !is_config && self.events.contains(&ChangeEvent::Rescan) {
            return;
        }
        if event == ChangeEvent::Rescan || (!is_config && self.events.len() >= self.max_batch) {
            self.events
                .retain(|pending| matches!(pending, ChangeEvent::ConfigChanged(_)));
            self.events.push(ChangeEvent::Rescan);
            return;
        }
        self.events.push(event);
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn take(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.events)
    }
}

pub struct WatchHandle {
    stop: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let _ = self.stop.send(());
    }
}

/// Watches `roots` and hands each debounced batch to `on_batch`, which
/// forwards it to the thread that owns the session. Returning `false` from
/// `on_batch` stops the watcher.
pub fn start<F>(
    roots: Vec<PathBuf>,
    notifier: ChangeNotifier,
    config: WatchConfig,
    on_batch: F,
) -> Result<Option<WatchHandle>>
where
    F: FnMut(Vec<ChangeEvent>) -> bool + Send + 'static,
{
    if config.mode == WatchMode::Off {
        return Ok(None);
    }
    let (ready_tx, ready_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        run_loop(roots, notifier, config, stop_rx, ready_tx, on_batch);
    });
    match ready_rx.recv_timeout(Duration::from_secs(2)) {
        Ok(Ok(())) => Ok(Some(WatchHandle {
            stop: stop_tx,
            thread: Some(handle),
        })),
        Ok(Err(err)) => Err(err),
        Err(_) => Ok(Some(WatchHandle {
            stop: stop_tx,
            thread: Some(handle),
        })),
    }
}

fn run_loop<F>(
    roots: Vec<PathBuf>,
    notifier: ChangeNotifier,
    config: WatchConfig,
    stop_rx: Receiver<()>,
    ready: Sender<Result<()>>,
    mut on_batch: F,
) where
    F: FnMut(Vec<ChangeEvent>) -> bool,
{
    let (_watcher, event_rx) = match try_start_watcher(&roots, &notifier) {
        Ok(value) => {
            let _ = ready.send(Ok(()));
            value
        }
        Err(err) => {
            if config.mode == WatchMode::On {
                let _ = ready.send(Err(err));
            } else {
                tracing::warn!(error = %err, "file watching unavailable, continuing without it");
                let _ = ready.send(Ok(()));
            }
            return;
        }
    };
    tracing::info!(
        roots = roots.len(),
        debounce_ms = config.debounce.as_millis() as u64,
        "watching for changes"
    );

    let mut pending = PendingBatch::new(config.max_batch);
    let mut last_event = Instant::now();
    loop {
        if stop_requested(&stop_rx) {
            return;
        }
        let timeout = if pending.is_empty() {
            POLL_INTERVAL
        } else {
            config.debounce
        };
        match event_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                if event.need_rescan() {
                    pending.push(ChangeEvent::Rescan);
                } else {
                    for change in notifier.classify(&event) {
                        pending.push(change);
                    }
                }
                last_event = Instant::now();
            }
            Ok(Err(err)) => tracing::warn!(error = %err, "watch error"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }

        if !pending.is_empty() && last_event.elapsed() >= config.debounce {
            let batch = pending.take();
            tracing::debug!(events = batch.len(), "flushing change batch");
            if !on_batch(batch) {
                return;
            }
        }
    }
}

fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    match stop_rx.try_recv() {
        Ok(()) => true,
        Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

fn try_start_watcher(
    roots: &[PathBuf],
    notifier: &ChangeNotifier,
) -> Result<(RecommendedWatcher, Receiver<notify::Result<Event>>)> {
    let (event_tx, event_rx) = mpsc::channel();
    let handler = move |res| {
        let _ = event_tx.send(res);
    };
    let mut watcher = notify::recommended_watcher(handler)?;
    for root in roots {
        watcher.watch(root, RecursiveMode::Recursive)?;
    }
    // An explicit config file may live outside every root.
    for path in &notifier.config_paths {
        if roots.iter().any(|root| path.starts_with(root)) {
            continue;
        }
        if let Some(parent) = path.parent().filter(|parent| parent.is_dir()) {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }
    }
    Ok((watcher, event_rx))
}
