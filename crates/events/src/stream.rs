//! The lazy pull protocol shared by every batch producer.

use crate::BlockBatch;
use async_trait::async_trait;

/// Terminal error kinds of a batch stream.
///
/// Any error offered by a producer ends its sequence; nothing follows it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Failure in the RPC transport or network layer.
    #[error("transport error: {0}")]
    Transport(String),
    /// Compression, binary or text decoding failure, including
    /// strict-schema violations and oversize payloads.
    #[error("decode error: {0}")]
    Decode(String),
    /// An archive entry violated the container format.
    #[error("archive format error: {0}")]
    Format(String),
    /// The caller requested a stop. Producers translate this into end of
    /// stream; consumers never observe it as an item.
    #[error("stream cancelled")]
    Cancelled,
}

/// The item offered by a [BatchStream].
pub type BatchResult = Result<BlockBatch, StreamError>;

/// A single-producer, single-consumer lazy pull sequence of block batches.
///
/// The producer computes one batch, offers it, and the consumer decides
/// whether to continue; at most one batch is buffered ahead of the consumer
/// regardless of total stream length. Implementations fuse: after an `Err`
/// item or a `None`, every further call returns `None`. Retry and backoff
/// policy is internal to each producer, not part of the protocol. A single
/// stream instance must not be driven by more than one concurrent consumer.
#[async_trait]
pub trait BatchStream {
    /// Pulls the next batch, or `None` once the stream is finished.
    async fn next_batch(&mut self) -> Option<BatchResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Block;

    /// A scripted stream that fuses after offering an error.
    struct ScriptedStream {
        items: Vec<BatchResult>,
        done: bool,
    }

    #[async_trait]
    impl BatchStream for ScriptedStream {
        async fn next_batch(&mut self) -> Option<BatchResult> {
            if self.done || self.items.is_empty() {
                return None;
            }
            let item = self.items.remove(0);
            if item.is_err() {
                self.done = true;
            }
            Some(item)
        }
    }

    #[tokio::test]
    async fn test_error_terminates_sequence() {
        let batch = BlockBatch { blocks: vec![Block { number: 1, operations: vec![] }] };
        let mut stream = ScriptedStream {
            items: vec![
                Ok(batch),
                Err(StreamError::Decode("bad record".to_string())),
                Ok(BlockBatch::default()),
            ],
            done: false,
        };
        assert!(stream.next_batch().await.unwrap().is_ok());
        assert_eq!(
            stream.next_batch().await,
            Some(Err(StreamError::Decode("bad record".to_string())))
        );
        assert_eq!(stream.next_batch().await, None);
    }
}
