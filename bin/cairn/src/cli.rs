//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Arguments of the `cairn` binary.
#[derive(Parser, Debug)]
#[command(version, about = "Streams canonical storage-mutation events")]
pub(crate) struct Cli {
    /// Verbosity level (0-4)
    #[arg(long, short, action = ArgAction::Count)]
    pub(crate) v: u8,
    /// The stream to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Stream selection.
#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Follow a chain endpoint and stream live operations.
    Live {
        /// The JSON-RPC endpoint URL.
        #[arg(long, env = "CAIRN_RPC_URL")]
        rpc_url: String,
        /// Last already-processed block number; streaming starts after it.
        #[arg(long, default_value_t = 0)]
        start_block: u64,
    },
    /// Replay an archived capture.
    Replay {
        /// Path to the tar archive.
        #[arg(long)]
        archive: PathBuf,
        /// Number of blocks per emitted batch.
        #[arg(long, default_value_t = 16)]
        batch_size: usize,
    },
}
