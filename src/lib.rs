#![forbid(unsafe_code)]
//! Umbrella crate re-exporting the minirel engine pieces for integration
//! tests and benches.

pub use minirel_core as core;
pub use minirel_io as io;
pub use minirel_operators as operators;
