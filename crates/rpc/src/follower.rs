//! The live chain follower.

use crate::{
    params::{
        ENTITY_EXPIRED_TOPIC, HEAD_POLL_INTERVAL, MAX_BLOCKS_PER_FETCH, PROCESSOR_ADDRESS,
    },
    provider::{ChainProvider, RawBlock, RawReceipt},
    tx::{numeric_attribute_map, string_attribute_map, CairnTransaction},
};
use alloy_primitives::B256;
use async_trait::async_trait;
use cairn_events::{
    BatchResult, BatchStream, Block, BlockBatch, Op, OpChangeOwner, OpCreate, OpExtendBtl,
    OpUpdate, Operation, StreamError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Follows the chain head and reconstructs the canonical operation stream
/// from processor transactions and their receipt logs.
///
/// Each pull covers the window `[cursor + 1, head]`, capped to
/// [MAX_BLOCKS_PER_FETCH] blocks; when caught up with the head the follower
/// sleeps [HEAD_POLL_INTERVAL] and polls again, indefinitely. Cancellation
/// is observed at the loop top and during the tail-wait; a cancelled stream
/// ends without an error item and issues no further requests.
#[derive(Debug)]
pub struct ChainFollower<P> {
    /// The chain data source.
    provider: P,
    /// Last fully processed block number.
    cursor: u64,
    /// Cooperative stop signal supplied by the caller.
    cancel: CancellationToken,
    /// Set once the stream has ended; no further provider calls are made.
    done: bool,
}

impl<P: ChainProvider> ChainFollower<P> {
    /// Creates a follower resuming after the `last_processed` block number.
    pub const fn new(provider: P, last_processed: u64, cancel: CancellationToken) -> Self {
        Self { provider, cursor: last_processed, cancel, done: false }
    }

    /// Fetches and reconstructs the next block window. Returns `Ok(None)`
    /// when cancelled.
    async fn next_window(&mut self) -> Result<Option<BlockBatch>, StreamError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }

            let head = self.provider.head_number().await.map_err(|err| {
                StreamError::Transport(format!("failed to fetch chain head: {err}"))
            })?;

            if head <= self.cursor {
                trace!(target: "chain_follower", cursor = self.cursor, head, "waiting for new blocks");
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(HEAD_POLL_INTERVAL) => continue,
                }
            }

            let start = self.cursor + 1;
            let end = head.min(self.cursor + MAX_BLOCKS_PER_FETCH);

            let provider = &self.provider;
            let (blocks, receipts) = tokio::try_join!(
                async move {
                    provider.blocks_by_range(start, end).await.map_err(|err| {
                        StreamError::Transport(format!(
                            "failed to fetch blocks [{start}, {end}]: {err}"
                        ))
                    })
                },
                async move {
                    provider.receipts_by_range(start, end).await.map_err(|err| {
                        StreamError::Transport(format!(
                            "failed to fetch receipts [{start}, {end}]: {err}"
                        ))
                    })
                },
            )?;
            if blocks.len() != receipts.len() {
                return Err(StreamError::Transport(format!(
                    "window [{start}, {end}] returned {} blocks but {} receipt lists",
                    blocks.len(),
                    receipts.len()
                )));
            }
            debug!(target: "chain_follower", start, end, "fetched block window");

            let mut batch = BlockBatch { blocks: Vec::with_capacity(blocks.len()) };
            for (block, block_receipts) in blocks.iter().zip(receipts.iter()) {
                batch.blocks.push(reconstruct_block(block, block_receipts)?);
            }

            self.cursor = end;
            return Ok(Some(batch));
        }
    }
}

#[async_trait]
impl<P> BatchStream for ChainFollower<P>
where
    P: ChainProvider + Send + Sync,
{
    async fn next_batch(&mut self) -> Option<BatchResult> {
        if self.done {
            return None;
        }
        match self.next_window().await {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                error!(target: "chain_follower", %err, "live stream terminated");
                Some(Err(err))
            }
        }
    }
}

/// Rebuilds one block's operation sequence from its raw transactions and
/// receipts.
///
/// Expiry signals are scanned first from the first transaction's receipt
/// logs with a scan-local operation counter. Then, per processor
/// transaction with a successful receipt, the decoded payload entries are
/// emitted in list order with per-kind operation indices; creation entries
/// take their keys positionally from the receipt's creation log events.
fn reconstruct_block(block: &RawBlock, receipts: &[RawReceipt]) -> Result<Block, StreamError> {
    let mut operations = Vec::new();

    if let Some(first) = receipts.first() {
        let mut expire_index = 0u64;
        for log in &first.logs {
            if log.topics.first() == Some(&ENTITY_EXPIRED_TOPIC) && log.data.len() >= 32 {
                let key = B256::from_slice(&log.data[..32]);
                operations.push(Operation::new(0, expire_index, Op::Expire(key)));
                expire_index += 1;
            }
        }
    }

    for (tx_index, transaction) in block.transactions.iter().enumerate() {
        if transaction.to != Some(PROCESSOR_ADDRESS) {
            continue;
        }
        let receipt = receipts.get(tx_index).ok_or_else(|| {
            StreamError::Decode(format!(
                "block {} has no receipt for transaction {tx_index}",
                block.number
            ))
        })?;
        if !receipt.is_success() {
            continue;
        }

        let decoded = CairnTransaction::decode_payload(&transaction.data).map_err(|err| {
            StreamError::Decode(format!(
                "transaction {tx_index} of block {}: {err}",
                block.number
            ))
        })?;

        let created = receipt.created_entities();
        if created.len() != decoded.create.len() {
            return Err(StreamError::Decode(format!(
                "transaction {tx_index} of block {} emitted {} creation logs for {} create entries",
                block.number,
                created.len(),
                decoded.create.len()
            )));
        }

        let tx_index = tx_index as u64;
        for (op_index, (create, key)) in decoded.create.iter().zip(created).enumerate() {
            operations.push(Operation::new(
                tx_index,
                op_index as u64,
                Op::Create(OpCreate {
                    key,
                    content_type: create.content_type.clone(),
                    btl: create.btl,
                    owner: transaction.from,
                    content: create.payload.clone(),
                    string_attributes: string_attribute_map(&create.string_attributes),
                    numeric_attributes: numeric_attribute_map(&create.numeric_attributes),
                }),
            ));
        }
        for (op_index, update) in decoded.update.iter().enumerate() {
            operations.push(Operation::new(
                tx_index,
                op_index as u64,
                Op::Update(OpUpdate {
                    key: update.entity_key,
                    content_type: update.content_type.clone(),
                    btl: update.btl,
                    owner: transaction.from,
                    content: update.payload.clone(),
                    string_attributes: string_attribute_map(&update.string_attributes),
                    numeric_attributes: numeric_attribute_map(&update.numeric_attributes),
                }),
            ));
        }
        for (op_index, extend) in decoded.extend.iter().enumerate() {
            operations.push(Operation::new(
                tx_index,
                op_index as u64,
                Op::ExtendBtl(OpExtendBtl {
                    key: extend.entity_key,
                    btl: extend.number_of_blocks,
                }),
            ));
        }
        for (op_index, change) in decoded.change_owner.iter().enumerate() {
            operations.push(Operation::new(
                tx_index,
                op_index as u64,
                Op::ChangeOwner(OpChangeOwner { key: change.entity_key, owner: change.new_owner }),
            ));
        }
        // Decoded delete entries are not emitted: deletion reaches the
        // stream only as expiry log signals.
    }

    Ok(Block { number: block.number, operations })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        params::ENTITY_CREATED_TOPIC,
        provider::{RawLog, RawTransaction},
        test_utils::{TestChainProvider, TestProviderError},
        tx::{encode_payload, CairnCreate, ExtendBtl as RawExtendBtl},
    };
    use alloy_primitives::{address, b256, Address, Bytes};
    use std::sync::{atomic::Ordering, Arc};

    fn empty_block(number: u64) -> (RawBlock, Vec<RawReceipt>) {
        (RawBlock { number, transactions: vec![] }, vec![])
    }

    fn creation_log(key: B256) -> RawLog {
        RawLog { topics: vec![ENTITY_CREATED_TOPIC, key], data: Bytes::new() }
    }

    fn expiry_log(key: B256) -> RawLog {
        RawLog { topics: vec![ENTITY_EXPIRED_TOPIC], data: Bytes::copy_from_slice(key.as_slice()) }
    }

    fn follower(
        provider: Arc<TestChainProvider>,
        last_processed: u64,
    ) -> (ChainFollower<Arc<TestChainProvider>>, CancellationToken) {
        let cancel = CancellationToken::new();
        (ChainFollower::new(provider, last_processed, cancel.clone()), cancel)
    }

    #[tokio::test]
    async fn test_window_capped_to_fifty_blocks() {
        let mut provider = TestChainProvider::new(120);
        for number in 1..=120 {
            let (block, receipts) = empty_block(number);
            provider.insert_block(block, receipts);
        }
        let provider = Arc::new(provider);
        let (mut follower, _cancel) = follower(provider.clone(), 0);

        let first = follower.next_batch().await.unwrap().unwrap();
        assert_eq!(first.blocks.len(), 50);
        assert_eq!(first.blocks.first().unwrap().number, 1);
        assert_eq!(first.blocks.last().unwrap().number, 50);
        assert_eq!(provider.block_range_calls.load(Ordering::SeqCst), 1);

        let second = follower.next_batch().await.unwrap().unwrap();
        assert_eq!(second.blocks.first().unwrap().number, 51);
        assert_eq!(second.blocks.last().unwrap().number, 100);

        let third = follower.next_batch().await.unwrap().unwrap();
        assert_eq!(third.blocks.len(), 20);
        assert_eq!(third.blocks.last().unwrap().number, 120);
        assert_eq!(provider.block_range_calls.load(Ordering::SeqCst), 3);
        assert_eq!(provider.receipt_range_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_early_stop_issues_no_further_calls() {
        let mut provider = TestChainProvider::new(200);
        for number in 1..=200 {
            let (block, receipts) = empty_block(number);
            provider.insert_block(block, receipts);
        }
        let provider = Arc::new(provider);
        let (mut follower, _cancel) = follower(provider.clone(), 0);

        assert!(follower.next_batch().await.unwrap().is_ok());
        drop(follower);

        assert_eq!(provider.head_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.block_range_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.receipt_range_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skips_foreign_and_failed_transactions() {
        let sender = address!("1212121212121212121212121212121212121212");
        let keys = [
            b256!("0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a"),
            b256!("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b"),
        ];
        let payload = CairnTransaction {
            create: vec![
                CairnCreate { btl: 10, content_type: "text/plain".to_string(), ..Default::default() },
                CairnCreate { btl: 20, content_type: "text/plain".to_string(), ..Default::default() },
            ],
            ..Default::default()
        };
        let data = Bytes::from(encode_payload(&payload));

        let block = RawBlock {
            number: 1,
            transactions: vec![
                // Not addressed to the processor.
                RawTransaction {
                    to: Some(Address::ZERO),
                    from: sender,
                    data: data.clone(),
                },
                // Addressed to the processor but reverted.
                RawTransaction {
                    to: Some(PROCESSOR_ADDRESS),
                    from: sender,
                    data: data.clone(),
                },
                RawTransaction { to: Some(PROCESSOR_ADDRESS), from: sender, data },
            ],
        };
        let receipts = vec![
            RawReceipt::default(),
            RawReceipt { status: 0, logs: vec![creation_log(keys[0]), creation_log(keys[1])] },
            RawReceipt { status: 1, logs: vec![creation_log(keys[0]), creation_log(keys[1])] },
        ];

        let mut provider = TestChainProvider::new(1);
        provider.insert_block(block, receipts);
        let (mut follower, _cancel) = follower(Arc::new(provider), 0);

        let batch = follower.next_batch().await.unwrap().unwrap();
        let operations = &batch.blocks[0].operations;
        assert_eq!(operations.len(), 2);
        for (index, (operation, key)) in operations.iter().zip(keys).enumerate() {
            assert_eq!(operation.tx_index, 2);
            assert_eq!(operation.op_index, index as u64);
            match &operation.op {
                Op::Create(create) => {
                    assert_eq!(create.key, key);
                    assert_eq!(create.owner, sender);
                }
                other => panic!("expected create, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_emits_all_decoded_operation_kinds() {
        let sender = address!("3434343434343434343434343434343434343434");
        let entity = b256!("0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c");
        let payload = CairnTransaction {
            update: vec![crate::tx::CairnUpdate {
                entity_key: entity,
                content_type: "text/plain".to_string(),
                btl: 5,
                payload: Bytes::from_static(b"next"),
                string_attributes: vec![],
                numeric_attributes: vec![],
            }],
            delete: vec![entity],
            extend: vec![RawExtendBtl { entity_key: entity, number_of_blocks: 7 }],
            change_owner: vec![crate::tx::ChangeOwner {
                entity_key: entity,
                new_owner: sender,
            }],
            ..Default::default()
        };
        let block = RawBlock {
            number: 9,
            transactions: vec![RawTransaction {
                to: Some(PROCESSOR_ADDRESS),
                from: sender,
                data: Bytes::from(encode_payload(&payload)),
            }],
        };
        let receipts = vec![RawReceipt { status: 1, logs: vec![] }];

        let mut provider = TestChainProvider::new(9);
        provider.insert_block(block, receipts);
        let (mut follower, _cancel) = follower(Arc::new(provider), 8);

        let batch = follower.next_batch().await.unwrap().unwrap();
        let operations = &batch.blocks[0].operations;
        // Update, ExtendBtl and ChangeOwner each start their own op_index
        // sequence; decoded deletes are never emitted.
        assert_eq!(operations.len(), 3);
        assert!(matches!(&operations[0].op, Op::Update(update) if update.key == entity));
        assert!(matches!(&operations[1].op, Op::ExtendBtl(extend) if extend.btl == 7));
        assert!(matches!(&operations[2].op, Op::ChangeOwner(change) if change.owner == sender));
        assert!(operations.iter().all(|operation| operation.op_index == 0));
    }

    #[tokio::test]
    async fn test_synthesizes_expiry_operations_from_first_receipt() {
        let keys = [
            b256!("0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d"),
            b256!("0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e"),
        ];
        let block = RawBlock {
            number: 4,
            transactions: vec![RawTransaction {
                to: Some(Address::ZERO),
                from: Address::ZERO,
                data: Bytes::new(),
            }],
        };
        let receipts = vec![RawReceipt {
            status: 1,
            logs: vec![
                expiry_log(keys[0]),
                // Too little data to carry an entity key.
                RawLog { topics: vec![ENTITY_EXPIRED_TOPIC], data: Bytes::from_static(b"short") },
                creation_log(keys[1]),
                expiry_log(keys[1]),
            ],
        }];

        let mut provider = TestChainProvider::new(4);
        provider.insert_block(block, receipts);
        let (mut follower, _cancel) = follower(Arc::new(provider), 3);

        let batch = follower.next_batch().await.unwrap().unwrap();
        let operations = &batch.blocks[0].operations;
        assert_eq!(
            operations,
            &vec![
                Operation::new(0, 0, Op::Expire(keys[0])),
                Operation::new(0, 1, Op::Expire(keys[1])),
            ]
        );
    }

    #[tokio::test]
    async fn test_creation_log_mismatch_is_decode_error() {
        let payload = CairnTransaction {
            create: vec![CairnCreate::default(), CairnCreate::default()],
            ..Default::default()
        };
        let block = RawBlock {
            number: 2,
            transactions: vec![RawTransaction {
                to: Some(PROCESSOR_ADDRESS),
                from: Address::ZERO,
                data: Bytes::from(encode_payload(&payload)),
            }],
        };
        let receipts = vec![RawReceipt {
            status: 1,
            logs: vec![creation_log(b256!(
                "0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f"
            ))],
        }];

        let mut provider = TestChainProvider::new(2);
        provider.insert_block(block, receipts);
        let (mut follower, _cancel) = follower(Arc::new(provider), 1);

        let err = follower.next_batch().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Decode(_)));
        assert_eq!(follower.next_batch().await, None);
    }

    #[tokio::test]
    async fn test_undecodable_payload_aborts_stream() {
        let block = RawBlock {
            number: 3,
            transactions: vec![RawTransaction {
                to: Some(PROCESSOR_ADDRESS),
                from: Address::ZERO,
                data: Bytes::from_static(b"garbage"),
            }],
        };
        let receipts = vec![RawReceipt { status: 1, logs: vec![] }];

        let mut provider = TestChainProvider::new(3);
        provider.insert_block(block, receipts);
        let provider = Arc::new(provider);
        let (mut follower, _cancel) = follower(provider.clone(), 2);

        let err = follower.next_batch().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Decode(_)));

        // The stream is fused: no item and no further provider calls.
        let calls = provider.head_calls.load(Ordering::SeqCst);
        assert_eq!(follower.next_batch().await, None);
        assert_eq!(provider.head_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_transport_failure_ends_stream_with_error() {
        let provider = Arc::new(TestChainProvider::new(5).failing(TestProviderError::Unavailable));
        let (mut follower, _cancel) = follower(provider, 0);

        let err = follower.next_batch().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Transport(_)));
        assert_eq!(follower.next_batch().await, None);
    }

    #[tokio::test]
    async fn test_cancelled_before_poll_yields_none() {
        let provider = Arc::new(TestChainProvider::new(10));
        let (mut follower, cancel) = follower(provider.clone(), 0);
        cancel.cancel();

        assert_eq!(follower.next_batch().await, None);
        assert_eq!(provider.head_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tail_wait_is_cancellable_and_not_an_error() {
        let provider = Arc::new(TestChainProvider::new(7));
        let (mut follower, cancel) = follower(provider.clone(), 7);

        let handle = tokio::spawn(async move { follower.next_batch().await });
        tokio::time::sleep(HEAD_POLL_INTERVAL * 3).await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), None);
        assert!(provider.head_calls.load(Ordering::SeqCst) >= 1);
    }
}
