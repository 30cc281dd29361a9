#![forbid(unsafe_code)]
//! minirel-io: blocking block-file primitives for the minirel operators.
//!
//! Files are flat concatenations of serialized [`minirel_core::Block`]
//! pages; every read/write here moves whole blocks and reports how many
//! block I/Os it performed so operators can keep their cost counters exact.

pub mod dump;
pub mod error;
pub mod file;
pub mod gen;
pub mod scratch;

pub use error::{Error, Result};
pub use file::{exists, size_in_blocks, BlockFile};
pub use scratch::ScratchFile;
