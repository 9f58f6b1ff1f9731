//! Client for the remote ingestion API.
//!
//! The daemon consumes exactly three operations: an ingest request that
//! returns a one-shot upload URL, a raw PUT of the file bytes to that URL,
//! and a confirmation of the outcome. The structures here mirror the
//! service's wire format.

pub mod client;
pub mod error;
pub mod types;

pub use client::Client;
pub use error::{ApiError, Result};
pub use types::{ConfirmRequest, IngestRequest, IngestResponse, IngestStatus};
