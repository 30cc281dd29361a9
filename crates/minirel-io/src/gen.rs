//! Random test-file generation.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use minirel_core::{Block, Record, BLOCK_CAPACITY, TEXT_LEN};

use crate::error::Result;
use crate::file::BlockFile;

/// Fraction of generated records marked as tombstones.
const INVALID_RATIO: f64 = 0.02;

/// Write `blocks` full blocks of random records: sequential ids, numeric
/// keys uniform in `0..100_000`, random lowercase text, ~2% invalid.
/// A fixed `seed` makes the file reproducible.
pub fn generate_file(path: &Path, blocks: u64, seed: Option<u64>) -> Result<()> {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let mut out = BlockFile::create(path)?;
    let mut block = Block::default();
    let mut recid: u32 = 0;
    for b in 0..blocks {
        block.block_id = b as u32;
        block.reserved = BLOCK_CAPACITY as u32;
        block.valid = true;
        for slot in 0..BLOCK_CAPACITY {
            recid += 1;
            let mut text = [0u8; TEXT_LEN];
            let len = rng.gen_range(1..TEXT_LEN);
            for byte in text.iter_mut().take(len) {
                *byte = b'a' + rng.gen_range(0u8..26);
            }
            block.entries[slot] = Record {
                id: recid,
                num: rng.gen_range(0..100_000),
                text,
                valid: !rng.gen_bool(INVALID_RATIO),
            };
        }
        out.write_blocks(std::slice::from_ref(&block))?;
    }
    tracing::debug!(path = %path.display(), blocks, "generated block file");
    Ok(())
}
