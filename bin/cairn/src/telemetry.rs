//! Logging initialization.

use anyhow::{anyhow, Result};
use tracing::Level;

/// Installs the global fmt subscriber with verbosity `v` (0-4).
pub(crate) fn init(v: u8) -> Result<()> {
    let level = match v {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))
}
