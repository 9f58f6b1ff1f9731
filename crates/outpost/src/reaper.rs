//! Orphan reaper.
//!
//! Records waiting for a partner that never arrives must not wait forever.
//! Every tick, AWAITING_PARTNER records older than the derived timeout are
//! advanced to ORPHAN, after which the ingester treats them like any other
//! pending file.

use crossbeam_channel::{bounded, select, tick, Sender};
use outpost_store::Store;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

const MIN_SLACK: Duration = Duration::from_secs(60);

/// Timeout for a reaper running at `interval`: the interval minus a slack
/// of max(1 minute, interval / 5), floored at 1 minute so a tight cadence
/// cannot orphan files that are merely seconds old.
pub fn reap_timeout(interval: Duration) -> Duration {
    let slack = (interval / 5).max(MIN_SLACK);
    interval.saturating_sub(slack).max(MIN_SLACK)
}

/// Periodic reaper task handle.
pub struct OrphanReaper {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl OrphanReaper {
    pub fn start(store: Arc<Store>, interval: Duration) -> Self {
        let timeout = reap_timeout(interval);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("outpost-reaper".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => match store.mark_orphans(timeout) {
                            Ok(0) => {}
                            Ok(reaped) => debug!(reaped, "marked waiting files as orphans"),
                            Err(err) => error!(error = %err, "failed to mark orphans"),
                        },
                        recv(stop_rx) -> _ => break,
                    }
                }
            })
            .expect("failed to spawn reaper");
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
