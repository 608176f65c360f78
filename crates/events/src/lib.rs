#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod operation;
pub use operation::{
    Op, OpChangeOwner, OpCreate, OpExtendBtl, OpUpdate, Operation, OperationError,
};

mod block;
pub use block::{Block, BlockBatch};

mod stream;
pub use stream::{BatchResult, BatchStream, StreamError};
