//! Shared logging setup for the daemon binary.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "outpost=info,outpost_store=info,outpost_api=info";
const VERBOSE_LOG_FILTER: &str = "outpost=debug,outpost_store=debug,outpost_api=debug";

/// Initialize tracing with a stderr layer and, when `log_path` is set, an
/// append-only file layer. `RUST_LOG` overrides the built-in filter.
pub fn init(log_path: Option<&Path>, verbose: bool) -> Result<()> {
    let default_filter = if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(stderr_filter),
    );

    match log_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let file_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter));
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Arc::new(file))
                        .with_ansi(false)
                        .with_filter(file_filter),
                )
                .init();
        }
        None => registry.init(),
    }

    Ok(())
}
