//! Wire types for the ingestion protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Payload for initiating a file ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Opaque identifier of the edge device.
    pub device_id: String,
    /// Base name of the file being uploaded.
    pub filename: String,
    pub file_size_bytes: u64,
    /// Hex-encoded SHA-256 of the file bytes, for integrity verification.
    pub sha256_checksum: String,
    /// Directory components between the watch root and the file,
    /// e.g. `["cam1", "2023"]`.
    pub context: Vec<String>,
    /// Directory-indexed metadata, e.g. `{"dir_0": "cam1", "dir_1": "2023"}`.
    pub metadata: BTreeMap<String, String>,
    /// Free-form context parsed from the paired sidecar; empty when there
    /// is no sidecar or it failed to parse.
    pub device_context: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Response to a successful ingest request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Session id for this upload transaction, echoed back on confirm.
    pub handshake_id: String,
    /// One-shot URL to PUT the file bytes to.
    pub upload_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Final outcome of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestStatus {
    Success,
    Failed,
}

/// Payload finalizing the ingestion transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub handshake_id: String,
    pub status: IngestStatus,
    /// Error details when status is FAILED.
    pub error_message: Option<String>,
    /// Path component of the upload URL, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_path: Option<String>,
}

/// Extract the path component of an upload URL for the confirm body.
pub fn upload_url_path(upload_url: &str) -> Option<String> {
    url::Url::parse(upload_url)
        .ok()
        .map(|u| u.path().to_string())
}
