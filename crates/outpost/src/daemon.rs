//! Daemon composition and lifecycle.
//!
//! `Daemon` owns every component - store, API client, watcher, ingester,
//! pruner, reaper - and wires the watcher's stable-file callback into the
//! store. There are no process-wide singletons: construct, run, stop.

use crate::config::Config;
use crate::ingest::{Ingester, Uploader};
use crate::pruner::{PruneConfig, Pruner};
use crate::reaper::OrphanReaper;
use crate::watcher::{FileSink, Watcher};
use anyhow::Context;
use chrono::{DateTime, Utc};
use outpost_store::{is_sidecar_path, Store};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Registers stable files into the store. Implements the watcher callback
/// and doubles as the initial-scan visitor.
struct Registrar {
    store: Arc<Store>,
    /// Lowercased dotted extensions; empty means accept everything.
    allowed_extensions: Vec<String>,
}

impl Registrar {
    fn extension_allowed(&self, path: &Path) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        let Some(ext) = path.extension() else {
            return false;
        };
        let dotted = format!(".{}", ext.to_string_lossy().to_lowercase());
        self.allowed_extensions.iter().any(|allowed| allowed == &dotted)
    }
}

impl FileSink for Registrar {
    fn on_stable(&self, path: &Path) {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "stat failed");
                return;
            }
        };
        if meta.is_dir() {
            return;
        }
        if !self.extension_allowed(path) {
            debug!(path = %path.display(), "extension not allowed, ignoring");
            return;
        }

        let mod_time: DateTime<Utc> = meta
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        let path_str = path.to_string_lossy().into_owned();
        let is_meta = is_sidecar_path(&path_str);

        match self
            .store
            .register_file(&path_str, meta.len(), mod_time, is_meta)
        {
            Ok(()) => info!(path = %path_str, size = meta.len(), "detected"),
            Err(err) => error!(path = %path_str, error = %err, "failed to register file"),
        }
    }
}

/// The running daemon. Dropping it without calling [`Daemon::stop`] still
/// shuts the components down through their own drops, but `stop` joins
/// everything in a deterministic order.
pub struct Daemon {
    store: Arc<Store>,
    watcher: Option<Watcher>,
    ingester: Option<Ingester>,
    pruner: Option<Pruner>,
    reaper: Option<OrphanReaper>,
    initial_scan: Option<JoinHandle<()>>,
}

impl Daemon {
    /// Build and start every component. The only fatal errors are the ones
    /// nothing can run without: the store, the watch directory, and the
    /// filesystem watcher itself.
    pub fn start(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(
            Store::open(&config.db_path, config.expect_sidecar()).with_context(|| {
                format!("failed to open state store at {}", config.db_path.display())
            })?,
        );

        std::fs::create_dir_all(&config.watch_path).with_context(|| {
            format!(
                "failed to create watch directory {}",
                config.watch_path.display()
            )
        })?;

        let client = outpost_api::Client::new(
            config.endpoint.clone(),
            config.api_timeout(),
            config.auth_token(),
        )
        .context("failed to build API client")?;

        let uploader = Arc::new(Uploader::new(
            config.device_id.clone(),
            config.watch_path.clone(),
            Arc::clone(&store),
            client,
            config.upload_orphan_sidecars,
        ));

        let ingester = Ingester::start(
            Arc::clone(&store),
            uploader,
            config.ingest_check_interval(),
            config.ingest_batch_size(),
            config.ingest_worker_count(),
        );

        let (high, low) = config.watermark_percents();
        let pruner = Pruner::start(
            Arc::clone(&store),
            PruneConfig {
                max_bytes: config.max_data_bytes(),
                high_watermark_percent: high,
                low_watermark_percent: low,
                batch_size: config.prune_batch_size(),
            },
            config.prune_check_interval(),
        );

        let reaper = OrphanReaper::start(Arc::clone(&store), config.orphan_check_interval());

        let registrar = Arc::new(Registrar {
            store: Arc::clone(&store),
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
        });

        let watcher = Watcher::new(
            &config.watch_path,
            config.debounce_duration(),
            registrar.clone() as Arc<dyn FileSink>,
        )
        .context("failed to start filesystem watcher")?;

        // Catch anything written while the daemon was down.
        let scan_root = config.watch_path.clone();
        let initial_scan = thread::Builder::new()
            .name("outpost-scan".to_string())
            .spawn(move || {
                info!(root = %scan_root.display(), "performing initial scan");
                for entry in WalkDir::new(&scan_root) {
                    match entry {
                        Ok(entry) if entry.file_type().is_file() => {
                            registrar.on_stable(entry.path());
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "initial scan entry error"),
                    }
                }
            })
            .context("failed to spawn initial scan")?;

        info!(
            watch_path = %config.watch_path.display(),
            endpoint = %config.endpoint,
            workers = config.ingest_worker_count(),
            "daemon started"
        );

        Ok(Self {
            store,
            watcher: Some(watcher),
            ingester: Some(ingester),
            pruner: Some(pruner),
            reaper: Some(reaper),
            initial_scan: Some(initial_scan),
        })
    }

    /// The shared store, primarily for inspection in tests.
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// Stop every component and wait for it: the watcher first so no new
    /// files are registered, then the workers drain, then the periodic
    /// tasks exit on their stop signal. In-flight HTTP calls are bounded
    /// by the API timeout, so this returns in bounded time.
    pub fn stop(mut self) {
        info!("stopping daemon");
        if let Some(watcher) = self.watcher.take() {
            watcher.close();
        }
        if let Some(scan) = self.initial_scan.take() {
            let _ = scan.join();
        }
        if let Some(ingester) = self.ingester.take() {
            ingester.stop();
        }
        if let Some(reaper) = self.reaper.take() {
            reaper.stop();
        }
        if let Some(pruner) = self.pruner.take() {
            pruner.stop();
        }
        info!("daemon stopped");
    }
}
