//! Duplicate elimination with three size-selected strategies.
//!
//! With `memSize = nmem_blocks - 1` slots reserved for data and one for
//! output:
//!
//! - input fits in `memSize` blocks → load it whole and drop duplicates
//!   through a hash index, emitting survivors in scan order;
//! - input is exactly `nmem_blocks` blocks → load it whole, sort in place,
//!   and compact away adjacent duplicates, streaming the result out through
//!   the freed first block;
//! - anything larger → external merge sort whose final pass suppresses
//!   records equal to the last one written.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use minirel_core::{compare, hash_record, seed_from, KeyMode, RecordPtr, BLOCK_CAPACITY};
use minirel_io::{size_in_blocks, BlockFile};

use crate::buffer::Buffer;
use crate::check_budget;
use crate::error::Result;
use crate::sort::merge::DedupState;
use crate::sort::{external_sort_passes, sort_buffer};
use crate::stage::{emit_record, flush_partial, init_output};

/// Counters reported by [`eliminate_duplicates`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DistinctStats {
    /// Records kept (one per distinct key).
    pub unique: u64,
    /// Total block reads and writes.
    pub block_ios: u64,
}

/// Remove records with equal keys from `input`, writing the survivors to
/// `output`. Invalid records never participate and are never emitted.
pub fn eliminate_duplicates(
    input: &Path,
    mode: KeyMode,
    nmem_blocks: usize,
    output: &Path,
) -> Result<DistinctStats> {
    check_budget(nmem_blocks)?;
    let mem_size = nmem_blocks - 1;
    let file_size = size_in_blocks(input)?;
    let mut stats = DistinctStats::default();
    debug!(
        input = %input.display(),
        blocks = file_size,
        budget = nmem_blocks,
        "duplicate elimination"
    );
    if file_size == 0 {
        BlockFile::create(output)?;
        return Ok(stats);
    }

    let mut buf = Buffer::new(nmem_blocks);
    if file_size <= mem_size as u64 {
        hash_elimination(
            input,
            file_size as usize,
            output,
            mode,
            &mut buf,
            mem_size,
            &mut stats,
        )?;
    } else if file_size == nmem_blocks as u64 {
        exact_fit(input, output, mode, &mut buf, nmem_blocks, &mut stats)?;
    } else {
        let mut state = DedupState::default();
        let sort_stats = external_sort_passes(
            &mut buf,
            input,
            mode,
            nmem_blocks,
            output,
            "ed",
            Some(&mut state),
        )?;
        stats.unique = state.unique;
        stats.block_ios = sort_stats.block_ios;
    }
    Ok(stats)
}

/// Whole input resident: hash every valid record, keep the first of each
/// key. Output order is the scan order, not sorted.
fn hash_elimination(
    input: &Path,
    size: usize,
    output: &Path,
    mode: KeyMode,
    buf: &mut Buffer,
    mem_size: usize,
    stats: &mut DistinctStats,
) -> Result<()> {
    let mut out = BlockFile::create(output)?;
    init_output(buf, mem_size);

    let mut inf = BlockFile::open(input)?;
    stats.block_ios += inf.read_blocks(&mut buf.slots_mut()[..size])? as u64;

    let bucket_count = size * BLOCK_CAPACITY;
    let seed = seed_from(&input.to_string_lossy());
    let mut index: Vec<Vec<RecordPtr>> = vec![Vec::new(); bucket_count];

    let mut ptr = RecordPtr::ZERO;
    let end = RecordPtr::from_flat(bucket_count - 1);
    while ptr <= end {
        if !buf.block(ptr.slot as usize).valid {
            // Invalid blocks are skipped wholesale; jump to their last
            // slot so the increment lands on the next block.
            ptr = RecordPtr::new(ptr.slot, (BLOCK_CAPACITY - 1) as u32);
        } else {
            let record = buf.record(ptr);
            if record.valid {
                let bucket = hash_record(seed, &record, bucket_count as u32, mode) as usize;
                let duplicate = index[bucket]
                    .iter()
                    .any(|&p| compare(&record, &buf.record(p), mode) == std::cmp::Ordering::Equal);
                if !duplicate {
                    index[bucket].push(ptr);
                    stats.unique += 1;
                    stats.block_ios += emit_record(buf, mem_size, &mut out, record)?;
                }
            }
        }
        if ptr == end {
            break;
        }
        ptr.incr();
    }
    stats.block_ios += flush_partial(buf, mem_size, &mut out)?;
    Ok(())
}

/// Input exactly fills the buffer: sort in place, then compact duplicates
/// left-to-right, reusing the freed first block as output staging.
fn exact_fit(
    input: &Path,
    output: &Path,
    mode: KeyMode,
    buf: &mut Buffer,
    nmem_blocks: usize,
    stats: &mut DistinctStats,
) -> Result<()> {
    let mut out = BlockFile::create(output)?;
    let mut inf = BlockFile::open(input)?;
    stats.block_ios += inf.read_blocks(&mut buf.slots_mut()[..nmem_blocks])? as u64;
    if !sort_buffer(buf, nmem_blocks, mode) {
        return Ok(());
    }

    // Dedupe the first block into itself: the first record always stays.
    let mut write = RecordPtr::new(0, 1);
    let mut read = RecordPtr::new(0, 1);
    stats.unique += 1;
    buf.block_mut(0).reserved = 1;
    while read.slot < 1 {
        let record = buf.record(read);
        if record.valid && compare(&record, &buf.record(write - 1), mode) != std::cmp::Ordering::Equal
        {
            buf.set_record(write, record);
            stats.unique += 1;
            write.incr();
            buf.block_mut(0).reserved += 1;
        }
        read.incr();
    }
    let mut gap = write;
    while gap.slot < 1 {
        buf.block_mut(0).entries[gap.offset as usize].valid = false;
        gap.incr();
    }
    let mut last_kept = buf.record(write - 1);

    if buf.block(0).reserved as usize == BLOCK_CAPACITY {
        write = write - BLOCK_CAPACITY;
        stats.block_ios += out.write_blocks(std::slice::from_ref(buf.block(0)))? as u64;
        let first = buf.block_mut(0);
        first.clear();
        first.block_id += 1;
    }

    // Stream the remaining blocks' records through the first block.
    let mut read = RecordPtr::new(1, 0);
    while (read.slot as usize) < nmem_blocks && buf.block(read.slot as usize).valid {
        let record = buf.record(read);
        if !record.valid {
            break;
        }
        if compare(&record, &last_kept, mode) != std::cmp::Ordering::Equal {
            buf.set_record(write, record);
            last_kept = record;
            stats.unique += 1;
            write.incr();
            buf.block_mut(0).reserved += 1;
        }
        if buf.block(0).reserved as usize == BLOCK_CAPACITY {
            write = write - BLOCK_CAPACITY;
            stats.block_ios += out.write_blocks(std::slice::from_ref(buf.block(0)))? as u64;
            let first = buf.block_mut(0);
            first.clear();
            first.block_id += 1;
        }
        read.incr();
    }
    if buf.block(0).reserved != 0 {
        stats.block_ios += out.write_blocks(std::slice::from_ref(buf.block(0)))? as u64;
    }
    Ok(())
}
