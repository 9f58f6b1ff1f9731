//! Outpost daemon entrypoint.
//!
//! Usage:
//!     outpostd --config /etc/outpost/outpost.json

use clap::Parser;
use outpost::{logging, Config, Daemon};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "outpostd", about = "Edge file ingestion daemon")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "outpost.json")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    logging::init(config.log_path.as_deref(), args.verbose)?;

    // Persist the defaults so the operator has something to edit.
    if !args.config.exists() {
        if let Err(err) = config.save(&args.config) {
            tracing::warn!(error = %err, "could not write default config");
        }
    }

    let daemon = Daemon::start(config)?;

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })?;
    let _ = shutdown_rx.recv();

    daemon.stop();
    Ok(())
}
