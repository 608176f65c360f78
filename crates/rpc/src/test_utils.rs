//! Scripted chain provider for follower tests.

use crate::provider::{ChainProvider, RawBlock, RawReceipt};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// A scripted [ChainProvider] recording per-method call counts.
#[derive(Debug, Default)]
pub(crate) struct TestChainProvider {
    /// The chain head returned by every head query.
    pub(crate) head: u64,
    /// Scripted blocks.
    pub(crate) blocks: Vec<RawBlock>,
    /// Receipt lists keyed by block number.
    pub(crate) receipts: Vec<(u64, Vec<RawReceipt>)>,
    /// When set, every method fails with this error.
    pub(crate) failure: Option<TestProviderError>,
    /// Number of head queries issued.
    pub(crate) head_calls: AtomicU64,
    /// Number of block range fetches issued.
    pub(crate) block_range_calls: AtomicU64,
    /// Number of receipt range fetches issued.
    pub(crate) receipt_range_calls: AtomicU64,
}

impl TestChainProvider {
    /// Creates an empty provider reporting the given head.
    pub(crate) fn new(head: u64) -> Self {
        Self { head, ..Default::default() }
    }

    /// Scripts a block and its receipts.
    pub(crate) fn insert_block(&mut self, block: RawBlock, receipts: Vec<RawReceipt>) {
        self.receipts.push((block.number, receipts));
        self.blocks.push(block);
    }

    /// Makes every method fail with the given error.
    pub(crate) fn failing(mut self, error: TestProviderError) -> Self {
        self.failure = Some(error);
        self
    }

    fn check_failure(&self) -> Result<(), TestProviderError> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Error type of the [TestChainProvider].
#[derive(Debug, Clone, thiserror::Error)]
pub(crate) enum TestProviderError {
    /// The scripted endpoint is down.
    #[error("endpoint unavailable")]
    Unavailable,
    /// The requested block is not scripted.
    #[error("block {0} not scripted")]
    BlockNotFound(u64),
}

#[async_trait]
impl ChainProvider for TestChainProvider {
    type Error = TestProviderError;

    async fn head_number(&self) -> Result<u64, Self::Error> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.head)
    }

    async fn blocks_by_range(&self, start: u64, end: u64) -> Result<Vec<RawBlock>, Self::Error> {
        self.block_range_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        (start..=end)
            .map(|number| {
                self.blocks
                    .iter()
                    .find(|block| block.number == number)
                    .cloned()
                    .ok_or(TestProviderError::BlockNotFound(number))
            })
            .collect()
    }

    async fn receipts_by_range(
        &self,
        start: u64,
        end: u64,
    ) -> Result<Vec<Vec<RawReceipt>>, Self::Error> {
        self.receipt_range_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        (start..=end)
            .map(|number| {
                self.receipts
                    .iter()
                    .find(|(block, _)| *block == number)
                    .map(|(_, receipts)| receipts.clone())
                    .ok_or(TestProviderError::BlockNotFound(number))
            })
            .collect()
    }
}
