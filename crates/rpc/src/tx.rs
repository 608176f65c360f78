//! Decoding of the compressed storage transaction payload.

use crate::params::MAX_DECODED_PAYLOAD_BYTES;
use alloy_primitives::{Address, Bytes, B256};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};
use std::{collections::BTreeMap, io::Read};

/// A decoded storage transaction: the ordered operation lists a processor
/// transaction applies atomically.
///
/// Create entries carry no key; keys are assigned on-chain and surface
/// through creation log events in the receipt. Update and Delete entries
/// fail the whole transaction when the entity does not exist, so a
/// successful receipt implies every entry applied.
///
/// The wire form is the brotli-compressed RLP encoding of the five lists in
/// this declared field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct CairnTransaction {
    /// Entities to store.
    pub create: Vec<CairnCreate>,
    /// Entities to replace.
    pub update: Vec<CairnUpdate>,
    /// Entity keys to remove.
    pub delete: Vec<B256>,
    /// Lifetime extensions.
    pub extend: Vec<ExtendBtl>,
    /// Ownership transfers.
    pub change_owner: Vec<ChangeOwner>,
}

/// A single entity-creation entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct CairnCreate {
    /// Number of blocks the entity lives for.
    pub btl: u64,
    /// MIME-style content type of the payload.
    pub content_type: String,
    /// The entity content.
    pub payload: Bytes,
    /// Ordered string attribute pairs.
    pub string_attributes: Vec<StringAttribute>,
    /// Ordered numeric attribute pairs.
    pub numeric_attributes: Vec<NumericAttribute>,
}

/// A single entity-update entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct CairnUpdate {
    /// Key of the entity to replace.
    pub entity_key: B256,
    /// MIME-style content type of the payload.
    pub content_type: String,
    /// Number of blocks the entity lives for after the update.
    pub btl: u64,
    /// The replacement content.
    pub payload: Bytes,
    /// Ordered string attribute pairs.
    pub string_attributes: Vec<StringAttribute>,
    /// Ordered numeric attribute pairs.
    pub numeric_attributes: Vec<NumericAttribute>,
}

/// A lifetime-extension entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct ExtendBtl {
    /// Key of the entity to extend.
    pub entity_key: B256,
    /// Number of blocks added to the lifetime.
    pub number_of_blocks: u64,
}

/// An ownership-transfer entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct ChangeOwner {
    /// Key of the entity to transfer.
    pub entity_key: B256,
    /// The new owner.
    pub new_owner: Address,
}

/// An ordered string attribute pair. The same key may also appear in the
/// numeric list, never twice within the string list.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct StringAttribute {
    /// The attribute key.
    pub key: String,
    /// The attribute value.
    pub value: String,
}

/// An ordered numeric attribute pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct NumericAttribute {
    /// The attribute key.
    pub key: String,
    /// The attribute value.
    pub value: u64,
}

/// Collapses ordered string attribute pairs into the canonical map form;
/// the last write wins on a duplicate key.
pub fn string_attribute_map(attributes: &[StringAttribute]) -> BTreeMap<String, String> {
    attributes.iter().map(|attribute| (attribute.key.clone(), attribute.value.clone())).collect()
}

/// Collapses ordered numeric attribute pairs into the canonical map form;
/// the last write wins on a duplicate key.
pub fn numeric_attribute_map(attributes: &[NumericAttribute]) -> BTreeMap<String, u64> {
    attributes.iter().map(|attribute| (attribute.key.clone(), attribute.value)).collect()
}

/// Failure decoding a storage transaction payload. Any variant fails the
/// whole containing transaction and, with it, the batch being built.
#[derive(Debug, thiserror::Error)]
pub enum PayloadDecodeError {
    /// The brotli stream was malformed or truncated.
    #[error("failed to decompress payload: {0}")]
    Decompress(#[from] std::io::Error),
    /// The decompressed payload exceeded [MAX_DECODED_PAYLOAD_BYTES].
    #[error("decompressed payload exceeds {MAX_DECODED_PAYLOAD_BYTES} bytes")]
    OversizePayload,
    /// The decompressed bytes were not a valid storage transaction.
    #[error("failed to decode payload: {0}")]
    Rlp(#[from] alloy_rlp::Error),
}

impl CairnTransaction {
    /// Decompresses and decodes the raw payload of a processor transaction.
    pub fn decode_payload(input: &[u8]) -> Result<Self, PayloadDecodeError> {
        let mut decompressed = Vec::new();
        brotli::Decompressor::new(input, 4096)
            .take(MAX_DECODED_PAYLOAD_BYTES + 1)
            .read_to_end(&mut decompressed)?;
        if decompressed.len() as u64 > MAX_DECODED_PAYLOAD_BYTES {
            return Err(PayloadDecodeError::OversizePayload);
        }

        let mut buf = decompressed.as_slice();
        let transaction = Self::decode(&mut buf)?;
        if !buf.is_empty() {
            return Err(alloy_rlp::Error::Custom("trailing bytes after payload").into());
        }
        Ok(transaction)
    }
}

#[cfg(test)]
pub(crate) fn encode_payload(transaction: &CairnTransaction) -> Vec<u8> {
    use std::io::Write;

    let encoded = alloy_rlp::encode(transaction);
    let mut compressed = Vec::new();
    let mut writer = brotli::CompressorWriter::new(&mut compressed, 4096, 5, 22);
    writer.write_all(&encoded).unwrap();
    drop(writer);
    compressed
}
