//! [ChainProvider] backed by batched requests over an alloy RPC client.

use crate::provider::{ChainProvider, RawBlock, RawReceipt};
use alloy_primitives::U64;
use alloy_rpc_client::{ClientBuilder, ReqwestClient, Waiter};
use alloy_transport::{RpcError, TransportErrorKind};
use async_trait::async_trait;

/// A [ChainProvider] over Ethereum JSON-RPC, issuing one batched request
/// per call kind per round with block numbers as canonical hex quantities.
///
/// Any per-element failure inside a batch fails the whole round; the
/// follower owns retry policy.
#[derive(Debug, Clone)]
pub struct AlloyChainProvider {
    /// The inner RPC client.
    client: ReqwestClient,
}

impl AlloyChainProvider {
    /// Creates a new provider from an existing client.
    pub const fn new(client: ReqwestClient) -> Self {
        Self { client }
    }

    /// Creates a new provider for the given HTTP endpoint.
    pub fn new_http(url: reqwest::Url) -> Self {
        Self::new(ClientBuilder::default().http(url))
    }
}

#[async_trait]
impl ChainProvider for AlloyChainProvider {
    type Error = RpcError<TransportErrorKind>;

    async fn head_number(&self) -> Result<u64, Self::Error> {
        let head: U64 = self.client.request("eth_blockNumber", ()).await?;
        Ok(head.to())
    }

    async fn blocks_by_range(&self, start: u64, end: u64) -> Result<Vec<RawBlock>, Self::Error> {
        let mut batch = self.client.new_batch();
        let mut waiters: Vec<Waiter<RawBlock>> = Vec::with_capacity((end - start + 1) as usize);
        for number in start..=end {
            waiters.push(batch.add_call("eth_getBlockByNumber", &(U64::from(number), true))?);
        }
        batch.send().await?;

        let mut blocks = Vec::with_capacity(waiters.len());
        for waiter in waiters {
            blocks.push(waiter.await?);
        }
        Ok(blocks)
    }

    async fn receipts_by_range(
        &self,
        start: u64,
        end: u64,
    ) -> Result<Vec<Vec<RawReceipt>>, Self::Error> {
        let mut batch = self.client.new_batch();
        let mut waiters: Vec<Waiter<Vec<RawReceipt>>> =
            Vec::with_capacity((end - start + 1) as usize);
        for number in start..=end {
            waiters.push(batch.add_call("eth_getBlockReceipts", &(U64::from(number),))?);
        }
        batch.send().await?;

        let mut receipts = Vec::with_capacity(waiters.len());
        for waiter in waiters {
            receipts.push(waiter.await?);
        }
        Ok(receipts)
    }
}
