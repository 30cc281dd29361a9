//! Human-readable listing of a block file.

use std::io::Write;
use std::path::Path;

use minirel_core::Block;

use crate::error::Result;
use crate::file::{size_in_blocks, BlockFile};

/// Print every valid record of every block to `out`, one line per record.
pub fn dump<W: Write>(path: &Path, out: &mut W) -> Result<()> {
    let blocks = size_in_blocks(path)?;
    let mut file = BlockFile::open(path)?;
    let mut block = Block::default();
    for _ in 0..blocks {
        file.read_blocks(std::slice::from_mut(&mut block))?;
        for rec in block.entries.iter().take(block.reserved as usize) {
            if rec.valid {
                writeln!(
                    out,
                    "block {:>5}  id {:>8}  num {:>6}  text {}",
                    block.block_id,
                    rec.id,
                    rec.num,
                    rec.text_lossy()
                )?;
            }
        }
    }
    Ok(())
}
