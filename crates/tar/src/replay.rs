//! Replay of archived per-block operation logs.

use async_trait::async_trait;
use cairn_events::{BatchResult, BatchStream, Block, BlockBatch, Operation, StreamError};
use std::io::Read;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Replays an archived capture as the canonical batch stream.
///
/// The archive is a sequential tar stream of `block-<number>.json.zst`
/// entries, each body a zstd-compressed sequence of strict-schema operation
/// records. A dedicated blocking task scans the archive and offers batches
/// through a depth-1 channel, so at most one batch is buffered ahead of the
/// consumer, and a consumer that stops pulling (or cancels) halts the scan
/// without reading further entries.
#[derive(Debug)]
pub struct ArchiveReplayer {
    /// Batches offered by the scan task.
    batches: mpsc::Receiver<BatchResult>,
    /// Set once the stream has ended.
    done: bool,
}

impl ArchiveReplayer {
    /// Spawns the scan over `archive`, regrouping blocks into batches of
    /// `batch_size` (at least 1). Must be called within a tokio runtime.
    pub fn new<R>(archive: R, batch_size: usize, cancel: CancellationToken) -> Self
    where
        R: Read + Send + 'static,
    {
        let (batch_tx, batches) = mpsc::channel(1);
        tokio::task::spawn_blocking(move || scan_archive(archive, batch_size, cancel, batch_tx));
        Self { batches, done: false }
    }
}

#[async_trait]
impl BatchStream for ArchiveReplayer {
    async fn next_batch(&mut self) -> Option<BatchResult> {
        if self.done {
            return None;
        }
        match self.batches.recv().await {
            Some(Ok(batch)) => Some(Ok(batch)),
            Some(Err(err)) => {
                self.done = true;
                Some(Err(err))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

/// Scans the archive sequentially, offering batches until the archive ends,
/// an error is offered, the consumer disengages, or `cancel` fires.
fn scan_archive<R: Read>(
    archive: R,
    batch_size: usize,
    cancel: CancellationToken,
    batches: mpsc::Sender<BatchResult>,
) {
    let batch_size = batch_size.max(1);
    let mut archive = tar::Archive::new(archive);
    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(err) => {
            let _ = batches
                .blocking_send(Err(StreamError::Format(format!("failed to open archive: {err}"))));
            return;
        }
    };

    let mut blocks = Vec::new();
    for entry in entries {
        if cancel.is_cancelled() {
            return;
        }

        let block = match read_entry(entry) {
            Ok(block) => block,
            Err(err) => {
                let _ = batches.blocking_send(Err(err));
                return;
            }
        };
        trace!(target: "archive_replayer", number = block.number, "decoded block entry");
        blocks.push(block);

        if blocks.len() >= batch_size {
            let batch = BlockBatch { blocks: std::mem::take(&mut blocks) };
            debug!(target: "archive_replayer", blocks = batch.blocks.len(), "offering batch");
            if batches.blocking_send(Ok(batch)).is_err() {
                // Receiver dropped: the consumer stopped early.
                return;
            }
        }
    }

    if !blocks.is_empty() {
        let _ = batches.blocking_send(Ok(BlockBatch { blocks }));
    }
}

/// Reads one archive entry into a [Block].
fn read_entry<R: Read>(entry: std::io::Result<tar::Entry<'_, R>>) -> Result<Block, StreamError> {
    let entry = entry
        .map_err(|err| StreamError::Format(format!("failed to read archive header: {err}")))?;
    let name = {
        let path = entry
            .path()
            .map_err(|err| StreamError::Format(format!("failed to read entry name: {err}")))?;
        path.to_string_lossy().into_owned()
    };
    let number = parse_block_number(&name).ok_or_else(|| {
        StreamError::Format(format!("entry name {name:?} does not match block-<number>.json.zst"))
    })?;

    let records = zstd::stream::read::Decoder::new(entry).map_err(|err| {
        StreamError::Decode(format!("failed to open compressed entry {name:?}: {err}"))
    })?;

    let mut operations = Vec::new();
    for record in serde_json::Deserializer::from_reader(records).into_iter::<Operation>() {
        let operation = record.map_err(|err| {
            StreamError::Decode(format!("invalid operation record in {name:?}: {err}"))
        })?;
        operations.push(operation);
    }
    Ok(Block { number, operations })
}

/// Parses `block-<digits>.json.zst`, returning the digits as a number.
fn parse_block_number(name: &str) -> Option<u64> {
    let digits = name.strip_prefix("block-")?.strip_suffix(".json.zst")?;
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
