//! Disk budget enforcement.
//!
//! The pruner keeps the managed byte total inside a hysteresis band: a
//! cycle starts when usage exceeds the high watermark and evicts
//! least-recently-modified UPLOADED records until usage falls to the low
//! watermark. Records that are not UPLOADED are never touched; when the
//! budget is blown and nothing is safe to delete, the cycle stops with a
//! back-pressure warning and the disk stays over budget.

use crossbeam_channel::{bounded, select, tick, Sender};
use outpost_store::Store;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

/// Eviction parameters derived from the daemon configuration.
#[derive(Debug, Clone)]
pub struct PruneConfig {
    /// Disk budget in bytes.
    pub max_bytes: u64,
    /// Start evicting above this percentage of the budget.
    pub high_watermark_percent: u32,
    /// Stop evicting at or below this percentage of the budget.
    pub low_watermark_percent: u32,
    /// Candidates fetched per eviction batch.
    pub batch_size: usize,
}

impl PruneConfig {
    fn high_bytes(&self) -> u64 {
        watermark_bytes(self.max_bytes, self.high_watermark_percent)
    }

    fn low_bytes(&self) -> u64 {
        watermark_bytes(self.max_bytes, self.low_watermark_percent)
    }
}

fn watermark_bytes(max_bytes: u64, percent: u32) -> u64 {
    (max_bytes as u128 * percent as u128 / 100) as u64
}

/// Periodic pruner task handle.
pub struct Pruner {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Pruner {
    pub fn start(store: Arc<Store>, config: PruneConfig, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("outpost-pruner".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => prune_cycle(&store, &config),
                        recv(stop_rx) -> _ => break,
                    }
                }
            })
            .expect("failed to spawn pruner");
        Self {
            stop_tx,
            thread: Some(thread),
        }
    }

    pub fn stop(mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Run one eviction cycle. Exposed so tests can drive the pruner without
/// its timer.
pub fn prune_cycle(store: &Store, config: &PruneConfig) {
    let high = config.high_bytes();
    let low = config.low_bytes();

    let mut current = match store.get_total_size() {
        Ok(size) => size,
        Err(err) => {
            error!(error = %err, "failed to read managed size");
            return;
        }
    };

    if current <= high {
        return;
    }

    info!(
        current_bytes = current,
        max_bytes = config.max_bytes,
        high_watermark_bytes = high,
        low_watermark_bytes = low,
        "high watermark exceeded, starting eviction"
    );

    while current > low {
        let candidates = match store.get_prune_candidates(config.batch_size) {
            Ok(candidates) => candidates,
            Err(err) => {
                error!(error = %err, "failed to fetch prune candidates");
                return;
            }
        };

        // Nothing UPLOADED to sacrifice: deleting anything else would lose
        // data, so hold and let the warning surface the pressure.
        if candidates.is_empty() {
            warn!(
                current_bytes = current,
                "disk budget exceeded but no uploaded files to evict, back-pressure active"
            );
            return;
        }

        let mut deleted = 0usize;
        for record in candidates {
            match std::fs::remove_file(&record.path) {
                Ok(()) => {}
                // Already gone counts as evicted.
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    error!(path = %record.path, error = %err, "failed to delete file");
                    continue;
                }
            }

            if let Err(err) = store.remove_file(&record.path) {
                error!(path = %record.path, error = %err, "failed to remove record");
                continue;
            }

            info!(path = %record.path, size = record.size, "pruned");
            current = current.saturating_sub(record.size);
            deleted += 1;

            if current <= low {
                break;
            }
        }

        if deleted == 0 {
            error!("no candidate could be evicted this batch, aborting cycle");
            break;
        }
    }

    info!(final_bytes = current, "eviction cycle complete");
}
