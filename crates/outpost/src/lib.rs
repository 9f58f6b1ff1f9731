//! Outpost - edge-resident file ingestion daemon
//!
//! Outpost watches a directory tree for newly produced files (camera
//! imagery with optional JSON sidecars), records them durably in a local
//! SQLite catalog, and transfers them to a remote ingestion service through
//! a three-phase handshake. Local disk is a bounded buffer: once a file's
//! transfer is confirmed it becomes eligible for eviction; otherwise it is
//! retained through restarts and outages.
//!
//! # Architecture
//!
//! ```text
//! Filesystem ──► Watcher ──► Store ◄── Pruner ──► Filesystem (delete)
//!                   │          ▲  │
//!                   │ (scan)   │  │ pending
//!                   └──────────┘  ▼
//!                              Ingester ──► remote ingestion API
//! ```
//!
//! One invariant ties the components together: no record ever permits local
//! deletion before remote durability is confirmed.

pub mod config;
pub mod daemon;
pub mod ingest;
pub mod logging;
pub mod metadata;
pub mod pruner;
pub mod reaper;
pub mod watcher;

pub use config::Config;
pub use daemon::Daemon;
pub use watcher::{FileSink, Watcher};
