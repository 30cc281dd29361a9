#![forbid(unsafe_code)]
//! minirel-core: record/block layout, flat-address cursors, key comparison
//! and record hashing for the minirel engine.
//!
//! Everything here is pure data manipulation. File handling lives in
//! `minirel-io`, the operators in `minirel-operators`.

pub mod block;
pub mod cursor;
pub mod error;
pub mod hash;
pub mod key;
pub mod prelude;
pub mod record;

pub use block::{Block, BLOCK_BYTES, BLOCK_CAPACITY};
pub use cursor::RecordPtr;
pub use error::{Error, Result};
pub use hash::{hash_record, seed_from};
pub use key::{compare, KeyMode};
pub use record::{Record, RECORD_BYTES, TEXT_LEN};
