#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod params;

mod tx;
pub use tx::{
    numeric_attribute_map, string_attribute_map, CairnCreate, CairnTransaction, CairnUpdate,
    ChangeOwner, ExtendBtl, NumericAttribute, PayloadDecodeError, StringAttribute,
};

mod provider;
pub use provider::{ChainProvider, RawBlock, RawLog, RawReceipt, RawTransaction};

mod alloy_provider;
pub use alloy_provider::AlloyChainProvider;

mod follower;
pub use follower::ChainFollower;

#[cfg(test)]
mod test_utils;
