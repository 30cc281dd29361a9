//! k-way merge of sorted segments staged in the buffer.
//!
//! One cursor per segment points at the next unmerged record of that
//! segment's staged block. Segment counts are bounded by the memory budget,
//! so the minimum is found with a plain linear scan (ties go to the lowest
//! segment index). Exhausted blocks are replaced by a positional read from
//! the segment's known stride offset; a segment goes inactive when its
//! blocks run out or its staged block ends in a tombstone (sorted segments
//! are dense).

use std::cmp::Ordering;

use minirel_core::{compare, KeyMode, Record, RecordPtr};
use minirel_io::BlockFile;

use crate::buffer::Buffer;
use crate::error::{OpError, Result};
use crate::stage::{emit_record, flush_partial};

/// Remembered last-written record for the duplicate-suppressing final pass
/// of duplicate elimination.
#[derive(Default)]
pub(crate) struct DedupState {
    pub last: Option<Record>,
    pub unique: u64,
}

pub(crate) struct MergeParams {
    pub segs_to_merge: usize,
    /// Uniform stride of segments in the input file, in blocks.
    pub segment_size: u64,
    /// Block offset of the first merged segment in the input file.
    pub first_seg_offset: u64,
    /// True when this pass produces the globally merged result.
    pub last_pass: bool,
    /// True when this merge consumes the pass's final (possibly short)
    /// segment.
    pub last_merge_of_pass: bool,
}

/// Merge `segs_to_merge` segments whose first blocks are staged in slots
/// `0..segs_to_merge`; slot `mem_size` stages the output. `blocks_left[i]`
/// counts the blocks of segment `i` not yet loaded. Returns the block I/Os
/// performed.
pub(crate) fn merge_segments(
    input: &mut BlockFile,
    output: &mut BlockFile,
    buf: &mut Buffer,
    mem_size: usize,
    blocks_left: &mut [u64],
    p: &MergeParams,
    mode: KeyMode,
    mut dedup: Option<&mut DedupState>,
) -> Result<u64> {
    let segs = p.segs_to_merge;
    debug_assert_eq!(blocks_left.len(), segs);
    let mut ios: u64 = 0;
    let mut blocks_written: u64 = 0;
    // The pass's final segment may be shorter than the uniform stride.
    let size_of_last_seg = if p.last_merge_of_pass {
        blocks_left[segs - 1] + 1
    } else {
        0
    };

    let mut next_record: Vec<RecordPtr> = (0..segs).map(|i| RecordPtr::new(i as u32, 0)).collect();
    {
        let out = buf.block_mut(mem_size);
        out.clear();
        out.valid = true;
        out.block_id = 0;
    }

    let mut active = segs;
    while active != 0 {
        // Linear scan for the minimal record among active segments; a
        // strict comparison keeps ties on the lowest segment index.
        let mut min: Option<(usize, Record)> = None;
        for j in 0..segs {
            if !buf.block(j).valid {
                continue;
            }
            let cand = buf.record(next_record[j]);
            match &min {
                Some((_, cur)) if compare(&cand, cur, mode) != Ordering::Less => {}
                _ => min = Some((j, cand)),
            }
        }
        let (min_idx, min_rec) = min.ok_or_else(|| {
            OpError::Invariant("merge has active segments but no staged block".into())
        })?;

        let emit = match dedup.as_deref_mut() {
            Some(state) if p.last_pass => match &state.last {
                Some(prev) if compare(prev, &min_rec, mode) == Ordering::Equal => false,
                _ => {
                    state.last = Some(min_rec);
                    state.unique += 1;
                    true
                }
            },
            _ => true,
        };
        if emit {
            let wrote = emit_record(buf, mem_size, output, min_rec)?;
            ios += wrote;
            if wrote > 0 {
                blocks_written += 1;
            }
        }

        // Advance the winning cursor; on block exhaustion reload from the
        // segment's stride offset or deactivate it.
        next_record[min_idx].incr();
        if next_record[min_idx].offset == 0 {
            next_record[min_idx] = RecordPtr::new(min_idx as u32, 0);
            if blocks_left[min_idx] > 0 {
                let seg_base = p.first_seg_offset + p.segment_size * min_idx as u64;
                let block_offset = if p.last_merge_of_pass && min_idx == segs - 1 {
                    seg_base + size_of_last_seg - blocks_left[min_idx]
                } else {
                    seg_base + p.segment_size - blocks_left[min_idx]
                };
                ios +=
                    input.read_blocks_at(block_offset, &mut buf.slots_mut()[min_idx..min_idx + 1])?
                        as u64;
                blocks_left[min_idx] -= 1;
                if !buf.block(min_idx).valid {
                    active -= 1;
                }
            } else {
                buf.block_mut(min_idx).valid = false;
                active -= 1;
            }
        } else if !buf.record(next_record[min_idx]).valid {
            buf.block_mut(min_idx).valid = false;
            active -= 1;
        }
    }

    let flushed = flush_partial(buf, mem_size, output)?;
    if flushed > 0 {
        blocks_written += 1;
        ios += flushed;
    }

    // Non-final merges of non-final passes pad the output to the uniform
    // stride so later passes can compute every segment's offset.
    if !p.last_pass && !p.last_merge_of_pass {
        let pad = minirel_core::Block::padding();
        for _ in blocks_written..p.segment_size * segs as u64 {
            ios += output.write_blocks(std::slice::from_ref(&pad))? as u64;
        }
    }
    Ok(ios)
}
