//! The canonical storage-mutation operation and its wire encoding.

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single storage mutation extracted from one block.
///
/// `tx_index` is the position of the originating transaction within its
/// block, `op_index` the position of the entry within its own per-kind
/// operation list; together they order operations deterministically within
/// a block. Expire operations are synthesized from receipt logs rather than
/// decoded from a transaction: they carry `tx_index` 0 and an `op_index`
/// assigned by the expiry scan, which may collide with the indices of real
/// first-transaction operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOperation", into = "RawOperation")]
pub struct Operation {
    /// Position of the originating transaction within its block.
    pub tx_index: u64,
    /// Position of the entry within its per-kind operation list.
    pub op_index: u64,
    /// The populated variant.
    pub op: Op,
}

impl Operation {
    /// Creates a new operation.
    pub const fn new(tx_index: u64, op_index: u64, op: Op) -> Self {
        Self { tx_index, op_index, op }
    }
}

/// The closed set of operation variants.
///
/// Exactly one variant is populated per [Operation]; the sum type makes any
/// other state unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Removes the entity addressed by the key.
    Delete(B256),
    /// The entity's lifetime reached zero; synthesized from receipt logs.
    Expire(B256),
    /// Stores a new entity. The key is assigned by the processor and
    /// recovered from the creation log event, not supplied by the sender.
    Create(OpCreate),
    /// Replaces an existing entity's content and attributes.
    Update(OpUpdate),
    /// Extends an entity's block-to-live.
    ExtendBtl(OpExtendBtl),
    /// Transfers ownership of an entity.
    ChangeOwner(OpChangeOwner),
}

/// Payload of a [Op::Create] operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpCreate {
    /// The entity key.
    pub key: B256,
    /// MIME-style content type of the entity content.
    pub content_type: String,
    /// Remaining lifetime in blocks.
    pub btl: u64,
    /// The owning address.
    pub owner: Address,
    /// The entity content.
    pub content: Bytes,
    /// String attributes used for indexing.
    pub string_attributes: BTreeMap<String, String>,
    /// Numeric attributes used for indexing.
    pub numeric_attributes: BTreeMap<String, u64>,
}

/// Payload of a [Op::Update] operation. Carries the same fields as
/// [OpCreate], addressing an entity that already exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpUpdate {
    /// The entity key.
    pub key: B256,
    /// MIME-style content type of the entity content.
    pub content_type: String,
    /// Remaining lifetime in blocks.
    pub btl: u64,
    /// The owning address.
    pub owner: Address,
    /// The entity content.
    pub content: Bytes,
    /// String attributes used for indexing.
    pub string_attributes: BTreeMap<String, String>,
    /// Numeric attributes used for indexing.
    pub numeric_attributes: BTreeMap<String, u64>,
}

/// Payload of a [Op::ExtendBtl] operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpExtendBtl {
    /// The entity key.
    pub key: B256,
    /// Number of blocks added to the entity's lifetime.
    pub btl: u64,
}

/// Payload of a [Op::ChangeOwner] operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpChangeOwner {
    /// The entity key.
    pub key: B256,
    /// The new owning address.
    pub owner: Address,
}

/// Error constructing an [Operation] from its wire form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    /// The record populated a number of variants other than one.
    #[error("operation record populates {0} variants, expected exactly one")]
    VariantCount(usize),
}

/// Wire form of [Operation]: the populated variant is tagged by field
/// presence. Decoding rejects unknown fields and anything other than
/// exactly one populated variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOperation {
    tx_index: u64,
    op_index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delete: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expire: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    create: Option<OpCreate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    update: Option<OpUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extend_btl: Option<OpExtendBtl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    change_owner: Option<OpChangeOwner>,
}

impl From<Operation> for RawOperation {
    fn from(operation: Operation) -> Self {
        let mut raw = Self {
            tx_index: operation.tx_index,
            op_index: operation.op_index,
            delete: None,
            expire: None,
            create: None,
            update: None,
            extend_btl: None,
            change_owner: None,
        };
        match operation.op {
            Op::Delete(key) => raw.delete = Some(key),
            Op::Expire(key) => raw.expire = Some(key),
            Op::Create(create) => raw.create = Some(create),
            Op::Update(update) => raw.update = Some(update),
            Op::ExtendBtl(extend) => raw.extend_btl = Some(extend),
            Op::ChangeOwner(change) => raw.change_owner = Some(change),
        }
        raw
    }
}

impl TryFrom<RawOperation> for Operation {
    type Error = OperationError;

    fn try_from(raw: RawOperation) -> Result<Self, Self::Error> {
        let RawOperation {
            tx_index,
            op_index,
            delete,
            expire,
            create,
            update,
            extend_btl,
            change_owner,
        } = raw;
        let variants = [
            delete.map(Op::Delete),
            expire.map(Op::Expire),
            create.map(Op::Create),
            update.map(Op::Update),
            extend_btl.map(Op::ExtendBtl),
            change_owner.map(Op::ChangeOwner),
        ];
        let mut populated = variants.into_iter().flatten();
        let op = populated.next().ok_or(OperationError::VariantCount(0))?;
        let extra = populated.count();
        if extra > 0 {
            return Err(OperationError::VariantCount(extra + 1));
        }
        Ok(Self { tx_index, op_index, op })
    }
}
