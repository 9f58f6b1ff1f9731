//! Daemon configuration.
//!
//! The config file is a JSON document. A missing file yields the defaults;
//! an invalid individual value (bad duration string, zero workers,
//! inverted watermarks) logs a warning and falls back to its documented
//! default rather than aborting the daemon.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_ENDPOINT: &str = "https://ingest.example.com";
pub const DEFAULT_MAX_DATA_SIZE_GB: f64 = 1.0;
pub const DEFAULT_INGEST_CHECK_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_INGEST_BATCH_SIZE: usize = 10;
pub const DEFAULT_INGEST_WORKER_COUNT: usize = 5;
pub const DEFAULT_PRUNE_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_PRUNE_BATCH_SIZE: usize = 50;
pub const DEFAULT_PRUNE_HIGH_WATERMARK_PERCENT: u32 = 90;
pub const DEFAULT_PRUNE_LOW_WATERMARK_PERCENT: u32 = 75;
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DEBOUNCE_DURATION: Duration = Duration::from_millis(500);
pub const DEFAULT_ORPHAN_CHECK_INTERVAL: Duration = Duration::from_secs(300);

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Whether a datum file is expected to arrive with a JSON sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidecarStrategy {
    /// Datum files wait in AWAITING_PARTNER until the sidecar arrives
    /// (or the orphan reaper times them out).
    Strict,
    /// Datum files are uploadable immediately; sidecars still pair when
    /// they do show up.
    None,
}

/// Daemon configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Opaque identifier included in every ingest request.
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Base URL of the remote ingestion API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token for the remote API; empty means unauthenticated.
    #[serde(default)]
    pub auth_token: String,

    /// Root of the recursive watch; created if absent.
    #[serde(default = "default_watch_path")]
    pub watch_path: PathBuf,

    /// Path to the SQLite catalog.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Optional log file; logs always go to stderr as well.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Disk budget in GiB for everything under management.
    #[serde(default = "default_max_data_size_gb")]
    pub max_data_size_gb: f64,

    #[serde(default = "default_prune_high_watermark_percent")]
    pub prune_high_watermark_percent: u32,

    #[serde(default = "default_prune_low_watermark_percent")]
    pub prune_low_watermark_percent: u32,

    /// Duration string, e.g. "1m".
    #[serde(default = "default_prune_check_interval")]
    pub prune_check_interval: String,

    #[serde(default = "default_prune_batch_size")]
    pub prune_batch_size: usize,

    /// Duration string, e.g. "2s".
    #[serde(default = "default_ingest_check_interval")]
    pub ingest_check_interval: String,

    /// Job channel depth; also the poll batch size.
    #[serde(default = "default_ingest_batch_size")]
    pub ingest_batch_size: usize,

    #[serde(default = "default_ingest_worker_count")]
    pub ingest_worker_count: usize,

    /// Per-request HTTP deadline, e.g. "30s".
    #[serde(default = "default_api_timeout")]
    pub api_timeout: String,

    /// Watcher stability window, e.g. "500ms".
    #[serde(default = "default_debounce_duration")]
    pub debounce_duration: String,

    /// Orphan reaper cadence, e.g. "5m".
    #[serde(default = "default_orphan_check_interval")]
    pub orphan_check_interval: String,

    #[serde(default = "default_sidecar_strategy")]
    pub sidecar_strategy: SidecarStrategy,

    /// When false, an orphaned sidecar is skipped instead of being
    /// uploaded as if it were data.
    #[serde(default = "default_upload_orphan_sidecars")]
    pub upload_orphan_sidecars: bool,

    /// When non-empty, only files with these extensions are registered
    /// (e.g. [".jpg", ".png", ".json"]).
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

fn default_device_id() -> String {
    "dev-001".to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_watch_path() -> PathBuf {
    PathBuf::from("./data")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./outpost.db")
}

fn default_max_data_size_gb() -> f64 {
    DEFAULT_MAX_DATA_SIZE_GB
}

fn default_prune_high_watermark_percent() -> u32 {
    DEFAULT_PRUNE_HIGH_WATERMARK_PERCENT
}

fn default_prune_low_watermark_percent() -> u32 {
    DEFAULT_PRUNE_LOW_WATERMARK_PERCENT
}

fn default_prune_check_interval() -> String {
    "1m".to_string()
}

fn default_prune_batch_size() -> usize {
    DEFAULT_PRUNE_BATCH_SIZE
}

fn default_ingest_check_interval() -> String {
    "2s".to_string()
}

fn default_ingest_batch_size() -> usize {
    DEFAULT_INGEST_BATCH_SIZE
}

fn default_ingest_worker_count() -> usize {
    DEFAULT_INGEST_WORKER_COUNT
}

fn default_api_timeout() -> String {
    "30s".to_string()
}

fn default_debounce_duration() -> String {
    "500ms".to_string()
}

fn default_orphan_check_interval() -> String {
    "5m".to_string()
}

fn default_sidecar_strategy() -> SidecarStrategy {
    SidecarStrategy::None
}

fn default_upload_orphan_sidecars() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        serde_json::from_str("{}").expect("empty config must deserialize to defaults")
    }
}

impl Config {
    /// Load configuration from a JSON file. A missing file returns the
    /// defaults; the caller may decide to persist them.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config {}", path.display()))
            }
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Write the configuration to a JSON file, pretty-printed.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write config {}", path.display()))
    }

    pub fn expect_sidecar(&self) -> bool {
        self.sidecar_strategy == SidecarStrategy::Strict
    }

    pub fn auth_token(&self) -> Option<String> {
        if self.auth_token.is_empty() {
            None
        } else {
            Some(self.auth_token.clone())
        }
    }

    /// Disk budget in bytes.
    pub fn max_data_bytes(&self) -> u64 {
        (self.max_data_size_gb.max(0.0) * GIB) as u64
    }

    /// Hysteresis band as (high, low) percentages. An inverted or
    /// out-of-range band falls back to the defaults.
    pub fn watermark_percents(&self) -> (u32, u32) {
        let high = self.prune_high_watermark_percent;
        let low = self.prune_low_watermark_percent;
        if high == 0 || high > 100 || low == 0 || low >= high {
            warn!(
                high = self.prune_high_watermark_percent,
                low = self.prune_low_watermark_percent,
                "invalid watermark band, using defaults"
            );
            return (
                DEFAULT_PRUNE_HIGH_WATERMARK_PERCENT,
                DEFAULT_PRUNE_LOW_WATERMARK_PERCENT,
            );
        }
        (high, low)
    }

    pub fn ingest_check_interval(&self) -> Duration {
        duration_or(
            &self.ingest_check_interval,
            "ingest_check_interval",
            DEFAULT_INGEST_CHECK_INTERVAL,
        )
    }

    pub fn prune_check_interval(&self) -> Duration {
        duration_or(
            &self.prune_check_interval,
            "prune_check_interval",
            DEFAULT_PRUNE_CHECK_INTERVAL,
        )
    }

    pub fn api_timeout(&self) -> Duration {
        duration_or(&self.api_timeout, "api_timeout", DEFAULT_API_TIMEOUT)
    }

    pub fn debounce_duration(&self) -> Duration {
        duration_or(
            &self.debounce_duration,
            "debounce_duration",
            DEFAULT_DEBOUNCE_DURATION,
        )
    }

    pub fn orphan_check_interval(&self) -> Duration {
        duration_or(
            &self.orphan_check_interval,
            "orphan_check_interval",
            DEFAULT_ORPHAN_CHECK_INTERVAL,
        )
    }

    pub fn ingest_worker_count(&self) -> usize {
        if self.ingest_worker_count == 0 {
            warn!("ingest_worker_count must be positive, using default");
            DEFAULT_INGEST_WORKER_COUNT
        } else {
            self.ingest_worker_count
        }
    }

    pub fn ingest_batch_size(&self) -> usize {
        if self.ingest_batch_size == 0 {
            warn!("ingest_batch_size must be positive, using default");
            DEFAULT_INGEST_BATCH_SIZE
        } else {
            self.ingest_batch_size
        }
    }

    pub fn prune_batch_size(&self) -> usize {
        if self.prune_batch_size == 0 {
            warn!("prune_batch_size must be positive, using default");
            DEFAULT_PRUNE_BATCH_SIZE
        } else {
            self.prune_batch_size
        }
    }
}

fn duration_or(raw: &str, option: &str, default: Duration) -> Duration {
    match parse_duration(raw) {
        Some(parsed) => parsed,
        None => {
            warn!(option, value = raw, default = ?default, "invalid duration, using default");
            default
        }
    }
}

/// Parse a human-readable duration string: "500ms", "2s", "1.5m", "24h".
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (value, scale_ms) = if let Some(v) = raw.strip_suffix("ms") {
        (v, 1.0)
    } else if let Some(v) = raw.strip_suffix('s') {
        (v, 1_000.0)
    } else if let Some(v) = raw.strip_suffix('m') {
        (v, 60_000.0)
    } else if let Some(v) = raw.strip_suffix('h') {
        (v, 3_600_000.0)
    } else {
        return None;
    };

    let value: f64 = value.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(value * scale_ms / 1000.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.device_id, "dev-001");
        assert!(!cfg.expect_sidecar());
        assert_eq!(cfg.ingest_check_interval(), Duration::from_secs(2));
        assert_eq!(cfg.debounce_duration(), Duration::from_millis(500));
        assert_eq!(cfg.watermark_percents(), (90, 75));
        assert_eq!(cfg.max_data_bytes(), 1024 * 1024 * 1024);
        assert!(cfg.upload_orphan_sidecars);
        assert!(cfg.auth_token().is_none());
    }

    #[test]
    fn parse_duration_suffixes() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration("1.5m"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("-2s"), None);
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn invalid_values_fall_back() {
        let cfg = Config {
            ingest_check_interval: "never".to_string(),
            ingest_worker_count: 0,
            prune_high_watermark_percent: 40,
            prune_low_watermark_percent: 80,
            ..Config::default()
        };
        assert_eq!(cfg.ingest_check_interval(), DEFAULT_INGEST_CHECK_INTERVAL);
        assert_eq!(cfg.ingest_worker_count(), DEFAULT_INGEST_WORKER_COUNT);
        assert_eq!(
            cfg.watermark_percents(),
            (
                DEFAULT_PRUNE_HIGH_WATERMARK_PERCENT,
                DEFAULT_PRUNE_LOW_WATERMARK_PERCENT
            )
        );
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::load(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn save_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("outpost.json");

        let cfg = Config {
            device_id: "edge-42".to_string(),
            sidecar_strategy: SidecarStrategy::Strict,
            allowed_extensions: vec![".png".to_string(), ".json".to_string()],
            ..Config::default()
        };
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.device_id, "edge-42");
        assert!(loaded.expect_sidecar());
        assert_eq!(loaded.allowed_extensions.len(), 2);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("outpost.json");
        std::fs::write(&path, r#"{"device_id": "edge-7", "sidecar_strategy": "strict"}"#).unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.device_id, "edge-7");
        assert!(cfg.expect_sidecar());
        assert_eq!(cfg.ingest_batch_size, DEFAULT_INGEST_BATCH_SIZE);
    }
}
