#![forbid(unsafe_code)]
//! minirel-operators: external-memory relational operators.
//!
//! Every operator works through a caller-sized [`Buffer`] of block slots,
//! the only working memory it may touch, and reports how many block I/Os it
//! performed. All of them are pure file-to-file transforms:
//!
//! - [`sort`]: multi-pass k-way external merge sort
//! - [`eliminate_duplicates`]: duplicate elimination, strategy chosen by
//!   input size relative to the buffer
//! - [`hash_join`]: in-memory probe with recursive bucket partitioning
//! - [`merge_join`]: sort-merge join with a disk-resident sliding window
//!
//! A budget below three blocks (one staging slot plus at least two working
//! slots) is rejected before any I/O happens.

pub mod buffer;
pub mod distinct;
pub mod error;
pub mod join;
pub mod sort;
mod stage;

pub use buffer::Buffer;
pub use distinct::{eliminate_duplicates, DistinctStats};
pub use error::{OpError, Result};
pub use join::{hash_join, merge_join, JoinStats};
pub use sort::{sort, sort_buffer, SortStats};

/// Smallest workable memory budget: one output slot and two merge slots.
pub const MIN_MEM_BLOCKS: usize = 3;

pub(crate) fn check_budget(nmem_blocks: usize) -> Result<()> {
    if nmem_blocks < MIN_MEM_BLOCKS {
        return Err(OpError::Config(format!(
            "memory budget of {nmem_blocks} block(s) is below the {MIN_MEM_BLOCKS}-block minimum"
        )));
    }
    Ok(())
}
