//! Upload pipeline coordination.
//!
//! One producer loop polls the store for ready records and feeds a bounded
//! job channel; a fixed pool of workers drains it. An in-flight path set
//! keeps a record from being queued twice while a worker still holds it.

pub mod uploader;

pub use uploader::Uploader;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use outpost_store::{FileRecord, Store};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, warn};

/// Running ingester: producer loop plus worker pool.
pub struct Ingester {
    stop_tx: Sender<()>,
    producer: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl Ingester {
    /// Spawn the worker pool and the polling producer.
    ///
    /// `batch_size` bounds both the per-tick fetch and the job channel
    /// depth, so a slow pool pushes back on the producer instead of
    /// growing a queue.
    pub fn start(
        store: Arc<Store>,
        uploader: Arc<Uploader>,
        interval: Duration,
        batch_size: usize,
        worker_count: usize,
    ) -> Self {
        let (job_tx, job_rx) = bounded::<FileRecord>(batch_size.max(1));
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let in_flight: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        let mut workers = Vec::with_capacity(worker_count.max(1));
        for n in 0..worker_count.max(1) {
            let job_rx = job_rx.clone();
            let uploader = Arc::clone(&uploader);
            let in_flight = Arc::clone(&in_flight);
            let handle = thread::Builder::new()
                .name(format!("outpost-ingest-{n}"))
                .spawn(move || worker_loop(job_rx, uploader, in_flight))
                .expect("failed to spawn ingest worker");
            workers.push(handle);
        }

        let producer = thread::Builder::new()
            .name("outpost-ingest-producer".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => poll_once(&store, &job_tx, &in_flight, batch_size),
                        recv(stop_rx) -> _ => break,
                    }
                }
                // Dropping the sender lets the workers drain and exit.
                drop(job_tx);
            })
            .expect("failed to spawn ingest producer");

        Self {
            stop_tx,
            producer: Some(producer),
            workers,
        }
    }

    /// Stop polling, drain queued jobs, and join every worker.
    pub fn stop(mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(producer) = self.producer.take() {
            let _ = producer.join();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn poll_once(
    store: &Store,
    job_tx: &Sender<FileRecord>,
    in_flight: &Mutex<HashSet<String>>,
    batch_size: usize,
) {
    let records = match store.get_pending_files(batch_size) {
        Ok(records) => records,
        Err(err) => {
            error!(error = %err, "failed to fetch pending files");
            return;
        }
    };

    for record in records {
        {
            let mut set = in_flight.lock().expect("in-flight set poisoned");
            if !set.insert(record.path.clone()) {
                continue;
            }
        }

        let path = record.path.clone();
        match job_tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                in_flight
                    .lock()
                    .expect("in-flight set poisoned")
                    .remove(&path);
                warn!(path = %path, "ingest job queue full, skipping until next tick");
            }
            Err(TrySendError::Disconnected(_)) => return,
        }
    }
}

fn worker_loop(
    job_rx: Receiver<FileRecord>,
    uploader: Arc<Uploader>,
    in_flight: Arc<Mutex<HashSet<String>>>,
) {
    for record in job_rx.iter() {
        uploader.process(&record);
        in_flight
            .lock()
            .expect("in-flight set poisoned")
            .remove(&record.path);
    }
}
