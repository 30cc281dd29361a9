//! Sort-merge join.
//!
//! Both variants pre-sort their inputs with the external merge sort and
//! then walk the two sorted streams in lockstep. The memory-fit variant
//! keeps one whole relation resident; the external variant keeps only a
//! sliding window of the smaller relation resident and reloads the window
//! from a remembered group-start offset when the streamed relation repeats
//! a key that has already slid out.

use std::cmp::Ordering;
use std::path::Path;

use tracing::debug;

use minirel_core::{compare, KeyMode, Record, RecordPtr, BLOCK_CAPACITY};
use minirel_io::{size_in_blocks, BlockFile, ScratchFile};

use crate::buffer::Buffer;
use crate::check_budget;
use crate::error::Result;
use crate::join::JoinStats;
use crate::sort::{external_sort_passes, sort_buffer};
use crate::stage::{emit_pair, flush_partial, init_output};

/// Join `input_a` and `input_b` on `mode`, writing each matching pair as
/// two consecutive records `(streamed, resident)` to `output`.
pub fn merge_join(
    input_a: &Path,
    input_b: &Path,
    mode: KeyMode,
    nmem_blocks: usize,
    output: &Path,
) -> Result<JoinStats> {
    check_budget(nmem_blocks)?;
    let mem_size = nmem_blocks - 1;
    let size_a = size_in_blocks(input_a)?;
    let size_b = size_in_blocks(input_b)?;
    let mut stats = JoinStats::default();
    debug!(
        left = %input_a.display(),
        right = %input_b.display(),
        budget = nmem_blocks,
        "merge join"
    );
    if size_a == 0 || size_b == 0 {
        BlockFile::create(output)?;
        return Ok(stats);
    }

    let mut buf = Buffer::new(nmem_blocks);
    if size_a < mem_size as u64 || size_b < mem_size as u64 {
        fit_case(
            input_a, input_b, mode, &mut buf, nmem_blocks, output, size_a, size_b, &mut stats,
        )?;
    } else {
        external_case(input_a, input_b, mode, &mut buf, nmem_blocks, output, &mut stats)?;
    }
    Ok(stats)
}

/// At least one relation fits in `memSize - 1` blocks: it is loaded and
/// sorted in place while the other is externally sorted and streamed one
/// block at a time.
#[allow(clippy::too_many_arguments)]
fn fit_case(
    input_a: &Path,
    input_b: &Path,
    mode: KeyMode,
    buf: &mut Buffer,
    nmem_blocks: usize,
    output: &Path,
    size_a: u64,
    size_b: u64,
    stats: &mut JoinStats,
) -> Result<()> {
    let mem_size = nmem_blocks - 1;
    // When both fit, keeping the larger resident leaves the smaller to
    // stream; otherwise the fitting side is resident by necessity.
    let (resident, streamed, resident_blocks) =
        if size_a < mem_size as u64 && size_b < mem_size as u64 {
            if size_a >= size_b {
                (input_a, input_b, size_a as usize)
            } else {
                (input_b, input_a, size_b as usize)
            }
        } else if size_a < size_b {
            (input_a, input_b, size_a as usize)
        } else {
            (input_b, input_a, size_b as usize)
        };

    let scratch = ScratchFile::sibling(output, "mj");
    stats.block_ios +=
        external_sort_passes(buf, streamed, mode, nmem_blocks, scratch.path(), "ms", None)?
            .block_ios;
    let streamed_blocks = size_in_blocks(scratch.path())?;

    let mut out = BlockFile::create(output)?;
    let mut resident_in = BlockFile::open(resident)?;
    stats.block_ios += resident_in.read_blocks(&mut buf.slots_mut()[..resident_blocks])? as u64;

    if !sort_buffer(buf, resident_blocks, mode) || streamed_blocks == 0 {
        return Ok(());
    }

    // Last valid record of the resident relation.
    let mut end = RecordPtr::ZERO;
    while (end.slot as usize) != resident_blocks {
        if !buf.record(end).valid {
            break;
        }
        end.incr();
    }
    end.decr();

    let staging = mem_size - 1;
    let out_slot = mem_size;
    init_output(buf, out_slot);

    let mut stream = BlockFile::open(scratch.path())?;
    stats.block_ios += stream.read_blocks(&mut buf.slots_mut()[staging..staging + 1])? as u64;
    let mut stream_block = 0u64;

    let mut ptr = RecordPtr::ZERO;
    let mut group_start = RecordPtr::ZERO;
    let mut last_joined: Option<Record> = None;

    'join: loop {
        for slot in 0..BLOCK_CAPACITY {
            let rec = buf.block(staging).entries[slot];
            // Sorted output is dense: the first tombstone ends the stream.
            if !rec.valid {
                break 'join;
            }
            if let Some(prev) = &last_joined {
                if compare(prev, &rec, mode) == Ordering::Equal {
                    // Equal streamed keys re-emit the same resident group.
                    ptr = group_start;
                }
            }
            while compare(&buf.record(ptr), &rec, mode) == Ordering::Less {
                ptr.incr();
                if ptr > end {
                    break 'join;
                }
            }
            if compare(&buf.record(ptr), &rec, mode) == Ordering::Greater {
                continue;
            }
            last_joined = Some(rec);
            group_start = ptr;
            while compare(&buf.record(ptr), &rec, mode) == Ordering::Equal {
                let resident_rec = buf.record(ptr);
                stats.block_ios += emit_pair(buf, out_slot, &mut out, rec, resident_rec)?;
                stats.pairs += 1;
                ptr.incr();
                if ptr > end {
                    ptr.decr();
                    break;
                }
            }
        }
        if stream_block < streamed_blocks - 1 {
            stats.block_ios += stream.read_blocks(&mut buf.slots_mut()[staging..staging + 1])? as u64;
            stream_block += 1;
        } else {
            break;
        }
    }
    stats.block_ios += flush_partial(buf, out_slot, &mut out)?;
    Ok(())
}

/// Neither relation fits: both are externally sorted, the smaller lives in
/// a ring window of `min(size, memSize - 1)` slots addressed modulo the
/// window size, the larger streams through slot `memSize - 1`.
fn external_case(
    input_a: &Path,
    input_b: &Path,
    mode: KeyMode,
    buf: &mut Buffer,
    nmem_blocks: usize,
    output: &Path,
    stats: &mut JoinStats,
) -> Result<()> {
    let mem_size = nmem_blocks - 1;
    let scratch_a = ScratchFile::sibling(output, "mj0");
    let scratch_b = ScratchFile::sibling(output, "mj1");
    stats.block_ios +=
        external_sort_passes(buf, input_a, mode, nmem_blocks, scratch_a.path(), "ms", None)?
            .block_ios;
    stats.block_ios +=
        external_sort_passes(buf, input_b, mode, nmem_blocks, scratch_b.path(), "ms", None)?
            .block_ios;

    let mut out = BlockFile::create(output)?;
    let sorted_a = size_in_blocks(scratch_a.path())?;
    let sorted_b = size_in_blocks(scratch_b.path())?;
    if sorted_a == 0 || sorted_b == 0 {
        return Ok(());
    }
    // The smaller sorted relation is the windowed one.
    let (win_scratch, stream_scratch, win_size, stream_size) = if sorted_a > sorted_b {
        (scratch_b, scratch_a, sorted_b, sorted_a)
    } else {
        (scratch_a, scratch_b, sorted_a, sorted_b)
    };

    let staging = mem_size - 1;
    let out_slot = mem_size;
    init_output(buf, out_slot);

    let window = win_size.min(mem_size as u64 - 1) as usize;
    let mut win_in = BlockFile::open(win_scratch.path())?;
    let mut stream_in = BlockFile::open(stream_scratch.path())?;
    stats.block_ios += win_in.read_blocks(&mut buf.slots_mut()[..window])? as u64;
    stats.block_ios += stream_in.read_blocks(&mut buf.slots_mut()[staging..staging + 1])? as u64;

    // File-absolute ids of the oldest and newest window-resident blocks.
    let mut first_block = 0u64;
    let mut last_block = window as u64 - 1;
    let mut stream_block = 0u64;

    let mut ptr = RecordPtr::ZERO;
    // Group start: absolute block offset plus the first matched record,
    // enough to re-seek backward when a streamed key repeats.
    let mut backup_block = 0u64;
    let mut last_matched: Option<Record> = None;

    'join: loop {
        for slot in 0..BLOCK_CAPACITY {
            let rec = buf.block(staging).entries[slot];
            if !rec.valid {
                break 'join;
            }
            if let Some(prev) = &last_matched {
                if compare(&rec, prev, mode) == Ordering::Equal {
                    if backup_block < first_block {
                        // The group start slid out of the window; reload
                        // the window from its absolute offset.
                        let reload = (first_block - backup_block).min(window as u64);
                        for i in 0..reload {
                            let abs = backup_block + i;
                            let dst = (abs % window as u64) as usize;
                            stats.block_ios +=
                                win_in.read_blocks_at(abs, &mut buf.slots_mut()[dst..dst + 1])? as u64;
                        }
                        first_block = backup_block;
                        last_block = first_block + window as u64 - 1;
                    }
                    ptr = RecordPtr::new((backup_block % window as u64) as u32, 0);
                }
            }

            // Advance the window cursor until its key is >= the streamed
            // key, sliding the window forward as block boundaries pass.
            loop {
                if compare(&buf.record(ptr), &rec, mode) != Ordering::Less {
                    break;
                }
                ptr.incr();
                if ptr.offset == 0 {
                    ptr = RecordPtr::new(ptr.slot % window as u32, 0);
                    if ptr.slot as u64 == first_block % window as u64 {
                        if last_block < win_size - 1 {
                            let dst = (first_block % window as u64) as usize;
                            stats.block_ios += win_in
                                .read_blocks_at(last_block + 1, &mut buf.slots_mut()[dst..dst + 1])?
                                as u64;
                            first_block += 1;
                            last_block += 1;
                        } else {
                            // The windowed relation ran out below the
                            // streamed key.
                            break 'join;
                        }
                    }
                }
                if !buf.record(ptr).valid {
                    break 'join;
                }
            }
            if compare(&buf.record(ptr), &rec, mode) == Ordering::Greater {
                continue;
            }

            last_matched = Some(buf.record(ptr));
            backup_block = if ptr.slot as u64 >= first_block % window as u64 {
                first_block + ptr.slot as u64 - first_block % window as u64
            } else {
                first_block + ptr.slot as u64 + window as u64 - first_block % window as u64
            };

            // Emit the whole matching group.
            loop {
                if compare(&buf.record(ptr), &rec, mode) != Ordering::Equal {
                    break;
                }
                let resident_rec = buf.record(ptr);
                stats.block_ios += emit_pair(buf, out_slot, &mut out, rec, resident_rec)?;
                stats.pairs += 1;
                ptr.incr();
                if ptr.offset == 0 {
                    ptr = RecordPtr::new(ptr.slot % window as u32, 0);
                    if ptr.slot as u64 == first_block % window as u64 {
                        if last_block < win_size - 1 {
                            let dst = (first_block % window as u64) as usize;
                            stats.block_ios += win_in
                                .read_blocks_at(last_block + 1, &mut buf.slots_mut()[dst..dst + 1])?
                                as u64;
                            first_block += 1;
                            last_block += 1;
                        } else {
                            // Nothing left to slide in; step back onto the
                            // last resident record and end the group.
                            ptr = if ptr.slot == 0 {
                                RecordPtr::new(window as u32 - 1, (BLOCK_CAPACITY - 1) as u32)
                            } else {
                                RecordPtr::new(ptr.slot - 1, (BLOCK_CAPACITY - 1) as u32)
                            };
                            break;
                        }
                    }
                }
                if !buf.record(ptr).valid {
                    ptr.decr();
                    break;
                }
            }
        }
        if stream_block < stream_size - 1 {
            stats.block_ios += stream_in.read_blocks(&mut buf.slots_mut()[staging..staging + 1])? as u64;
            stream_block += 1;
        } else {
            break;
        }
    }
    stats.block_ios += flush_partial(buf, out_slot, &mut out)?;
    Ok(())
}
