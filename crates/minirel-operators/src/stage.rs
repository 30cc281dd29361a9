//! Output staging: append records into a buffer slot, flushing full blocks.

use minirel_core::Record;
use minirel_io::BlockFile;

use crate::buffer::Buffer;
use crate::error::Result;

/// Prepare `slot` as an output staging block.
pub(crate) fn init_output(buf: &mut Buffer, slot: usize) {
    let block = buf.block_mut(slot);
    block.clear();
    block.valid = true;
    block.block_id = 0;
}

/// Append one record to the staging block, writing it out when full.
/// Returns the block I/Os performed (0 or 1).
pub(crate) fn emit_record(
    buf: &mut Buffer,
    slot: usize,
    file: &mut BlockFile,
    rec: Record,
) -> Result<u64> {
    buf.block_mut(slot).append(rec);
    if buf.block(slot).is_full() {
        let ios = file.write_blocks(std::slice::from_ref(buf.block(slot)))?;
        let block = buf.block_mut(slot);
        block.block_id += 1;
        block.clear();
        return Ok(ios as u64);
    }
    Ok(0)
}

/// Append a joined pair as two consecutive entries. The block capacity is
/// even, so a pair never straddles a flush boundary.
pub(crate) fn emit_pair(
    buf: &mut Buffer,
    slot: usize,
    file: &mut BlockFile,
    outer: Record,
    inner: Record,
) -> Result<u64> {
    buf.block_mut(slot).append(outer);
    buf.block_mut(slot).append(inner);
    if buf.block(slot).is_full() {
        let ios = file.write_blocks(std::slice::from_ref(buf.block(slot)))?;
        let block = buf.block_mut(slot);
        block.block_id += 1;
        block.clear();
        return Ok(ios as u64);
    }
    Ok(0)
}

/// Write out a partially filled staging block, if any.
pub(crate) fn flush_partial(buf: &mut Buffer, slot: usize, file: &mut BlockFile) -> Result<u64> {
    if buf.block(slot).reserved != 0 {
        let ios = file.write_blocks(std::slice::from_ref(buf.block(slot)))?;
        buf.block_mut(slot).block_id += 1;
        Ok(ios as u64)
    } else {
        Ok(0)
    }
}
