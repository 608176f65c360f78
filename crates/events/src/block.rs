//! Block and batch containers for the canonical event stream.

use crate::Operation;
use serde::{Deserialize, Serialize};

/// One block's worth of operations.
///
/// Operations appear in construction order (expiry scan first, then
/// per-transaction entries) and are never re-sorted. Blocks without any
/// qualifying transaction still appear in their batch with an empty
/// operation list, so numbers stay contiguous across the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The block number.
    pub number: u64,
    /// Ordered operations extracted from the block.
    pub operations: Vec<Operation>,
}

/// An ordered group of consecutive blocks, the flow-control unit between a
/// producer and its consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBatch {
    /// The blocks of the batch, ascending by number.
    pub blocks: Vec<Block>,
}
