//! Operator CLI: follow a chain endpoint or replay an archived capture,
//! printing the canonical operation stream as JSON lines.

use anyhow::Result;
use cairn_events::BatchStream;
use cairn_rpc::{AlloyChainProvider, ChainFollower};
use cairn_tar::ArchiveReplayer;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod cli;
mod telemetry;

const LOG_TARGET: &str = "cairn";

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = cli::Cli::parse();
    telemetry::init(cfg.v)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    match cfg.command {
        cli::Command::Live { rpc_url, start_block } => {
            let url = reqwest::Url::parse(&rpc_url)?;
            let provider = AlloyChainProvider::new_http(url);
            info!(target: LOG_TARGET, start_block, "following chain");
            drain(ChainFollower::new(provider, start_block, cancel)).await
        }
        cli::Command::Replay { archive, batch_size } => {
            let file = std::fs::File::open(&archive)?;
            info!(target: LOG_TARGET, archive = %archive.display(), "replaying archive");
            drain(ArchiveReplayer::new(file, batch_size, cancel)).await
        }
    }
}

/// Prints every operation of the stream as one JSON line annotated with its
/// block number.
async fn drain(mut stream: impl BatchStream) -> Result<()> {
    while let Some(item) = stream.next_batch().await {
        let batch = item?;
        for block in &batch.blocks {
            for operation in &block.operations {
                println!(
                    "{}",
                    serde_json::json!({ "block": block.number, "operation": operation })
                );
            }
        }
    }
    info!(target: LOG_TARGET, "stream finished");
    Ok(())
}
