//! The transport seam between the live follower and a chain endpoint.

use crate::params::ENTITY_CREATED_TOPIC;
use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A log entry of a transaction receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    /// Indexed topics; the first identifies the event.
    pub topics: Vec<B256>,
    /// Unindexed log data.
    pub data: Bytes,
}

/// A transaction receipt as returned by `eth_getBlockReceipts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReceipt {
    /// Execution status; 1 on success.
    #[serde(with = "alloy_serde::quantity")]
    pub status: u64,
    /// Logs emitted during execution.
    pub logs: Vec<RawLog>,
}

impl RawReceipt {
    /// Whether the transaction executed successfully.
    pub fn is_success(&self) -> bool {
        self.status == 1
    }

    /// Entity keys of the creation log events, in emission order.
    pub fn created_entities(&self) -> Vec<B256> {
        self.logs
            .iter()
            .filter(|log| log.topics.first() == Some(&ENTITY_CREATED_TOPIC))
            .filter_map(|log| log.topics.get(1).copied())
            .collect()
    }
}

/// A transaction of a fetched block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Destination address; `None` for contract creation.
    pub to: Option<Address>,
    /// Sender address.
    pub from: Address,
    /// Raw calldata.
    #[serde(rename = "input")]
    pub data: Bytes,
}

/// A block with full transactions as returned by `eth_getBlockByNumber`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBlock {
    /// The block number.
    #[serde(with = "alloy_serde::quantity")]
    pub number: u64,
    /// Transactions in block order.
    pub transactions: Vec<RawTransaction>,
}

/// Read access to the chain data the follower consumes.
///
/// Implementations take `&self` so the block and receipt fetches of one
/// round can run concurrently against a single provider instance.
#[async_trait]
pub trait ChainProvider {
    /// The provider's error type.
    type Error: Display + Send + Sync;

    /// Returns the current chain head number.
    async fn head_number(&self) -> Result<u64, Self::Error>;

    /// Fetches the blocks of `[start, end]` (inclusive) with full
    /// transactions, ascending.
    async fn blocks_by_range(&self, start: u64, end: u64) -> Result<Vec<RawBlock>, Self::Error>;

    /// Fetches the receipts of every block in `[start, end]` (inclusive),
    /// ascending, one list per block.
    async fn receipts_by_range(
        &self,
        start: u64,
        end: u64,
    ) -> Result<Vec<Vec<RawReceipt>>, Self::Error>;
}

#[async_trait]
impl<P: ChainProvider + Send + Sync> ChainProvider for std::sync::Arc<P> {
    type Error = P::Error;

    async fn head_number(&self) -> Result<u64, Self::Error> {
        self.as_ref().head_number().await
    }

    async fn blocks_by_range(&self, start: u64, end: u64) -> Result<Vec<RawBlock>, Self::Error> {
        self.as_ref().blocks_by_range(start, end).await
    }

    async fn receipts_by_range(
        &self,
        start: u64,
        end: u64,
    ) -> Result<Vec<Vec<RawReceipt>>, Self::Error> {
        self.as_ref().receipts_by_range(start, end).await
    }
}
