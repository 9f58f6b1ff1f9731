//! Outpost Store - durable file catalog for the ingestion daemon
//!
//! The store is the single source of truth for every file under management:
//! which files exist, whether they have been uploaded, and how datum files
//! pair with their JSON sidecars.
//!
//! # Lifecycle
//!
//! ```text
//! (detected, no partner)      AWAITING_PARTNER
//!                                    │ reaper timeout
//!        partner arrives             ▼
//!    ┌──────────────────────►     ORPHAN ───┐
//!    │                                      │
//! (detected, partner present)               │
//!    │                                      ▼
//!    ▼                                  uploaded
//! PENDING ──── upload confirmed ────► UPLOADED ──► pruner removes record
//! ```
//!
//! UPLOADED is terminal; only [`Store::remove_file`] leaves it.

pub mod error;
pub mod record;
pub mod store;

pub use error::{Result, StoreError};
pub use record::{is_sidecar_path, sidecar_path, FileRecord, FileStatus};
pub use store::Store;
