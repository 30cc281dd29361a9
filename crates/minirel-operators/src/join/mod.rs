//! Equi-joins over block files.

pub mod hash;
pub mod merge;

use serde::Serialize;

pub use hash::hash_join;
pub use merge::merge_join;

/// Counters reported by [`hash_join`] and [`merge_join`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JoinStats {
    /// Matching pairs written to the output.
    pub pairs: u64,
    /// Total block reads and writes.
    pub block_ios: u64,
}
