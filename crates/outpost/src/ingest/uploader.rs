//! Per-record upload pipeline.
//!
//! checksum -> handshake -> streamed PUT -> confirm -> local commit. The
//! record is only marked UPLOADED after the confirm round-trip succeeds;
//! every failure before that leaves it PENDING for the next poll tick.

use crate::metadata::extract_path_context;
use chrono::Utc;
use outpost_api::types::upload_url_path;
use outpost_api::{Client, ConfirmRequest, IngestRequest, IngestStatus};
use outpost_store::{FileRecord, Store};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Executes the upload pipeline for single records.
pub struct Uploader {
    device_id: String,
    watch_root: PathBuf,
    store: Arc<Store>,
    client: Client,
    upload_orphan_sidecars: bool,
}

impl Uploader {
    pub fn new(
        device_id: String,
        watch_root: PathBuf,
        store: Arc<Store>,
        client: Client,
        upload_orphan_sidecars: bool,
    ) -> Self {
        Self {
            device_id,
            watch_root,
            store,
            client,
            upload_orphan_sidecars,
        }
    }

    /// Run the full pipeline for one record. Errors are logged, never
    /// propagated: a failed record stays PENDING and is retried on the
    /// next poll tick.
    pub fn process(&self, record: &FileRecord) {
        // A paired sidecar is committed by its datum's worker.
        if record.is_sidecar() {
            if let Some(partner) = &record.partner_path {
                debug!(path = %record.path, partner = %partner, "sidecar rides with its datum, skipping");
                return;
            }
            if !self.upload_orphan_sidecars {
                debug!(path = %record.path, "orphan sidecar upload disabled, skipping");
                return;
            }
        }

        let device_context = self.load_device_context(record);

        let checksum = match checksum_file(Path::new(&record.path)) {
            Ok(checksum) => checksum,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %record.path, "file vanished before upload, dropping record");
                if let Err(err) = self.store.remove_file(&record.path) {
                    error!(path = %record.path, error = %err, "failed to drop vanished record");
                }
                return;
            }
            Err(err) => {
                error!(path = %record.path, error = %err, "checksum failed");
                return;
            }
        };

        let (context, metadata) =
            extract_path_context(&self.watch_root, Path::new(&record.path));
        let filename = Path::new(&record.path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| record.path.clone());

        let request = IngestRequest {
            device_id: self.device_id.clone(),
            filename,
            file_size_bytes: record.size,
            sha256_checksum: checksum,
            context,
            metadata,
            device_context,
            timestamp: Utc::now(),
        };

        let handshake = match self.client.ingest(&request) {
            Ok(response) => response,
            Err(err) => {
                error!(path = %record.path, error = %err, "ingest request failed");
                return;
            }
        };

        let upload_start = Instant::now();
        if let Err(err) = self.client.upload(&handshake.upload_url, Path::new(&record.path)) {
            error!(path = %record.path, error = %err, "upload failed");
            // Best effort: tell the remote the handshake is dead.
            let failure = ConfirmRequest {
                handshake_id: handshake.handshake_id,
                status: IngestStatus::Failed,
                error_message: Some(err.to_string()),
                uploaded_path: None,
            };
            if let Err(err) = self.client.confirm(&failure) {
                debug!(path = %record.path, error = %err, "failure report not delivered");
            }
            return;
        }

        let confirm = ConfirmRequest {
            handshake_id: handshake.handshake_id.clone(),
            status: IngestStatus::Success,
            error_message: None,
            uploaded_path: upload_url_path(&handshake.upload_url),
        };
        if let Err(err) = self.client.confirm(&confirm) {
            // Not marked uploaded locally: the record is retried, and the
            // remote is expected to dedupe by checksum + device + filename.
            error!(
                path = %record.path,
                handshake_id = %handshake.handshake_id,
                error = %err,
                "confirm failed, will retry"
            );
            return;
        }

        match self.store.mark_uploaded(&record.path) {
            Ok(()) => {
                info!(
                    path = %record.path,
                    size = record.size,
                    elapsed_ms = upload_start.elapsed().as_millis() as u64,
                    "upload complete"
                );
                if let Some(partner) = &record.partner_path {
                    if let Err(err) = self.store.mark_uploaded(partner) {
                        error!(partner = %partner, error = %err, "failed to mark partner uploaded");
                    }
                }
            }
            Err(err) => {
                error!(path = %record.path, error = %err, "failed to mark uploaded");
            }
        }
    }

    /// Parse the paired sidecar into a free-form mapping. Absent or
    /// unparseable sidecars degrade to an empty map.
    fn load_device_context(
        &self,
        record: &FileRecord,
    ) -> serde_json::Map<String, serde_json::Value> {
        let Some(partner) = &record.partner_path else {
            return serde_json::Map::new();
        };
        if !outpost_store::is_sidecar_path(partner) {
            return serde_json::Map::new();
        }

        match std::fs::read(partner) {
            Ok(raw) => match serde_json::from_slice(&raw) {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(_) => {
                    warn!(partner = %partner, "sidecar is not a JSON object, ignoring");
                    serde_json::Map::new()
                }
                Err(err) => {
                    warn!(partner = %partner, error = %err, "failed to parse sidecar");
                    serde_json::Map::new()
                }
            },
            Err(err) => {
                warn!(partner = %partner, error = %err, "failed to read sidecar");
                serde_json::Map::new()
            }
        }
    }
}

/// Streamed SHA-256 of a file's bytes, hex encoded.
fn checksum_file(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
