//! Protocol constants shared by the follower and the payload codec.

use alloy_primitives::{address, Address, B256};
use alloy_sol_types::{sol, SolEvent};
use std::time::Duration;

sol! {
    /// Emitted once per entity stored by a processor transaction; the
    /// assigned entity key is the indexed topic.
    event CairnEntityCreated(bytes32 indexed entityKey, uint256 expirationBlock);

    /// Emitted when a stored entity's block-to-live reaches zero; the
    /// entity key is the first word of the data section.
    event CairnEntityExpired(bytes32 entityKey, uint256 expirationBlock);
}

/// Destination address marking a transaction as a storage-mutation
/// transaction.
pub const PROCESSOR_ADDRESS: Address = address!("00000000000000000000000000000061726b6976");

/// Topic of the entity-created log event.
pub const ENTITY_CREATED_TOPIC: B256 = CairnEntityCreated::SIGNATURE_HASH;

/// Topic of the entity-expired log event.
pub const ENTITY_EXPIRED_TOPIC: B256 = CairnEntityExpired::SIGNATURE_HASH;

/// Maximum number of blocks fetched per live round.
pub const MAX_BLOCKS_PER_FETCH: u64 = 50;

/// Fixed tail-wait between head polls when no new blocks exist.
pub const HEAD_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum decompressed size of a transaction payload.
pub const MAX_DECODED_PAYLOAD_BYTES: u64 = 20 * 1024 * 1024;
