//! Debounced recursive filesystem watcher.
//!
//! Raw events from the native backend are folded into a per-path deadline
//! map; a path's callback fires only once no new write has arrived for the
//! debounce window. Remove and rename-away cancel a pending deadline, and
//! directory events never reach the sink. Events for a path whose deadline
//! already fired simply arm a new one (the file is being rewritten and a
//! re-ingest is wanted).

use anyhow::Context;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::warn;

/// Receiver of stable-file notifications.
pub trait FileSink: Send + Sync {
    /// Called once per quiet period for each write-complete file.
    /// Invoked outside any watcher lock; the path may already be gone by
    /// the time the callee stats it.
    fn on_stable(&self, path: &Path);
}

/// Recursive watcher with per-path debounce.
pub struct Watcher {
    native: Option<RecommendedWatcher>,
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Watch `root` recursively. The root must already exist; subdirectories
    /// created later inherit watch status from the native backend's
    /// recursive mode.
    pub fn new(root: &Path, debounce: Duration, sink: Arc<dyn FileSink>) -> anyhow::Result<Self> {
        anyhow::ensure!(
            root.is_dir(),
            "watch root {} does not exist",
            root.display()
        );

        let (event_tx, event_rx) = unbounded();
        let mut native = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                let _ = event_tx.send(result);
            },
            notify::Config::default(),
        )
        .context("failed to create filesystem watcher")?;
        native
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", root.display()))?;

        let (stop_tx, stop_rx) = bounded(1);
        let thread = thread::Builder::new()
            .name("outpost-watcher".to_string())
            .spawn(move || debounce_loop(event_rx, stop_rx, debounce, sink))
            .context("failed to spawn watcher thread")?;

        Ok(Self {
            native: Some(native),
            stop_tx,
            thread: Some(thread),
        })
    }

    /// Release the native handles and cancel all pending debounce timers.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the native watcher closes the event channel; the stop
        // signal covers the case where the loop is mid-wait.
        self.native.take();
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

fn debounce_loop(
    event_rx: Receiver<notify::Result<Event>>,
    stop_rx: Receiver<()>,
    debounce: Duration,
    sink: Arc<dyn FileSink>,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        // Block until the next event, the earliest deadline, or shutdown.
        let received = match pending.values().min().copied() {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(event_rx) -> msg => Some(msg),
                    default(wait) => None,
                }
            }
            None => {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(event_rx) -> msg => Some(msg),
                }
            }
        };

        match received {
            Some(Ok(Ok(event))) => apply_event(&event, debounce, &mut pending),
            Some(Ok(Err(err))) => warn!(error = %err, "watch backend error"),
            // Native watcher dropped: nothing more will arrive.
            Some(Err(_)) => break,
            None => {}
        }

        let now = Instant::now();
        let ripe: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in ripe {
            pending.remove(&path);
            sink.on_stable(&path);
        }
    }
}

fn apply_event(event: &Event, debounce: Duration, pending: &mut HashMap<PathBuf, Instant>) {
    match &event.kind {
        // Recursive mode already covers newly created directories.
        EventKind::Create(CreateKind::Folder) => {}
        EventKind::Create(_) => arm(&event.paths, debounce, pending),
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Other) => arm(&event.paths, debounce, pending),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => cancel(&event.paths, pending),
            RenameMode::To => arm(&event.paths, debounce, pending),
            RenameMode::Both => {
                if let Some(from) = event.paths.first() {
                    pending.remove(from);
                }
                if let Some(to) = event.paths.get(1) {
                    arm(std::slice::from_ref(to), debounce, pending);
                }
            }
            RenameMode::Any | RenameMode::Other => cancel(&event.paths, pending),
        },
        EventKind::Modify(ModifyKind::Metadata(_)) => {}
        EventKind::Remove(_) => cancel(&event.paths, pending),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }
}

fn arm(paths: &[PathBuf], debounce: Duration, pending: &mut HashMap<PathBuf, Instant>) {
    let deadline = Instant::now() + debounce;
    for path in paths {
        // Directory events never reach the sink.
        if path.is_dir() {
            continue;
        }
        pending.insert(path.clone(), deadline);
    }
}

fn cancel(paths: &[PathBuf], pending: &mut HashMap<PathBuf, Instant>) {
    for path in paths {
        pending.remove(path);
    }
}
