//! Convenient re-exports for downstream crates.

pub use crate::block::{Block, BLOCK_BYTES, BLOCK_CAPACITY};
pub use crate::cursor::RecordPtr;
pub use crate::error::{Error, Result};
pub use crate::hash::{hash_record, seed_from};
pub use crate::key::{compare, KeyMode};
pub use crate::record::{Record, RECORD_BYTES, TEXT_LEN};
