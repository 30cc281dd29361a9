//! Multi-pass k-way external merge sort.
//!
//! Pass 0 sorts buffer-sized chunks of the input into sorted segments on a
//! scratch file; the following passes k-way merge up to `nmem_blocks - 1`
//! segments at a time, ping-ponging between two scratch handles until one
//! sorted segment remains, which is renamed onto the output.

mod inmem;
pub(crate) mod merge;

use std::path::Path;

use serde::Serialize;
use tracing::{debug, trace};

use minirel_core::KeyMode;
use minirel_io::{size_in_blocks, BlockFile, ScratchFile};

use crate::buffer::Buffer;
use crate::check_budget;
use crate::error::Result;
use merge::{merge_segments, DedupState, MergeParams};

pub use inmem::sort_buffer;

/// Counters reported by [`sort`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortStats {
    /// Sorted segments produced by the initial segment pass.
    pub sorted_segments: u32,
    /// Passes over the data, the segment pass included.
    pub passes: u32,
    /// Total block reads and writes.
    pub block_ios: u64,
}

/// Sort `input` by `mode` into `output` using at most `nmem_blocks` blocks
/// of working memory.
pub fn sort(input: &Path, mode: KeyMode, nmem_blocks: usize, output: &Path) -> Result<SortStats> {
    check_budget(nmem_blocks)?;
    let mut buf = Buffer::new(nmem_blocks);
    external_sort_passes(&mut buf, input, mode, nmem_blocks, output, "ms", None)
}

/// Shared driver for [`sort`], the external strategy of duplicate
/// elimination, and the pre-sorts of the merge join: identical passes,
/// except that with `dedup` present the final pass suppresses records
/// equal to the last one written. Runs entirely inside the caller's
/// buffer, which is the operator's whole memory budget.
pub(crate) fn external_sort_passes(
    buf: &mut Buffer,
    input: &Path,
    mode: KeyMode,
    nmem_blocks: usize,
    output: &Path,
    scratch_tag: &str,
    mut dedup: Option<&mut DedupState>,
) -> Result<SortStats> {
    check_budget(nmem_blocks)?;
    debug_assert_eq!(buf.len(), nmem_blocks);
    let mut stats = SortStats::default();
    let infile_blocks = size_in_blocks(input)?;
    debug!(
        input = %input.display(),
        blocks = infile_blocks,
        budget = nmem_blocks,
        "external sort"
    );
    if infile_blocks == 0 {
        BlockFile::create(output)?;
        return Ok(stats);
    }

    let mem_size = nmem_blocks - 1;
    let mut ping = ScratchFile::sibling(output, &format!("{scratch_tag}0"));
    let mut pong = ScratchFile::sibling(output, &format!("{scratch_tag}1"));

    // Segment pass: sort buffer-sized chunks in place, write each non-empty
    // one out. Chunks are written whole (invalidated tail blocks included)
    // so every segment occupies a predictable stride on disk.
    let full_segments = infile_blocks / nmem_blocks as u64;
    let remainder = infile_blocks % nmem_blocks as u64;
    {
        let mut inf = BlockFile::open(input)?;
        let mut out = BlockFile::create(ping.path())?;
        for i in 0..=full_segments {
            let chunk = if i == full_segments {
                if remainder == 0 {
                    break;
                }
                remainder as usize
            } else {
                nmem_blocks
            };
            stats.block_ios += inf.read_blocks(&mut buf.slots_mut()[..chunk])? as u64;
            if sort_buffer(buf, chunk, mode) {
                stats.block_ios += out.write_blocks(&buf.slots()[..chunk])? as u64;
                stats.sorted_segments += 1;
            }
        }
        stats.passes += 1;
    }

    let mut segment_size = nmem_blocks as u64;
    let mut last_segment_size = if remainder == 0 {
        nmem_blocks as u64
    } else {
        remainder
    };
    let mut nsorted = stats.sorted_segments as u64;

    if nsorted == 0 {
        // Every chunk was pure tombstones; the scratch file is empty.
        ping.persist(output).map_err(minirel_io::Error::Io)?;
        return Ok(stats);
    }
    if nsorted == 1 {
        if let Some(state) = dedup.as_deref_mut() {
            // A single sorted segment still needs its suppression pass;
            // rewrite it densely with duplicates dropped.
            let seg_blocks = size_in_blocks(ping.path())?;
            let mut inf = BlockFile::open(ping.path())?;
            let mut out = BlockFile::create(pong.path())?;
            let mut blocks_left = [seg_blocks - 1];
            stats.block_ios += inf.read_blocks_at(0, &mut buf.slots_mut()[..1])? as u64;
            let params = MergeParams {
                segs_to_merge: 1,
                segment_size: seg_blocks,
                first_seg_offset: 0,
                last_pass: true,
                last_merge_of_pass: true,
            };
            stats.block_ios += merge_segments(
                &mut inf,
                &mut out,
                buf,
                mem_size,
                &mut blocks_left,
                &params,
                mode,
                Some(state),
            )?;
            stats.passes += 1;
            std::mem::swap(&mut ping, &mut pong);
        }
        ping.persist(output).map_err(minirel_io::Error::Io)?;
        return Ok(stats);
    }

    // Merge passes: ping holds the current segments, pong receives the
    // merged ones; the handles swap roles each pass.
    while nsorted > 1 {
        let mut inf = BlockFile::open(ping.path())?;
        let mut out = BlockFile::create(pong.path())?;
        let mut new_sorted = 0u64;
        let full_merges = nsorted / mem_size as u64;
        let last_merge_segs = nsorted % mem_size as u64;
        let mut blocks_left = vec![0u64; mem_size];
        let mut segs_to_merge = mem_size;
        let mut last_merge = false;
        trace!(segments = nsorted, segment_size, "merge pass");

        for merge_counter in 0..=full_merges {
            let first_seg_offset = merge_counter * mem_size as u64 * segment_size;
            if last_merge_segs == 0 && merge_counter + 1 == full_merges {
                last_merge = true;
            } else if merge_counter == full_merges {
                if last_merge_segs != 0 {
                    segs_to_merge = last_merge_segs as usize;
                    last_merge = true;
                } else {
                    break;
                }
            }

            // Stage the first block of every segment in this merge.
            for i in 0..segs_to_merge {
                stats.block_ios += inf.read_blocks_at(
                    first_seg_offset + i as u64 * segment_size,
                    &mut buf.slots_mut()[i..i + 1],
                )? as u64;
                blocks_left[i] = segment_size - 1;
            }
            if last_merge {
                blocks_left[segs_to_merge - 1] = last_segment_size - 1;
            }

            let params = MergeParams {
                segs_to_merge,
                segment_size,
                first_seg_offset,
                last_pass: nsorted <= mem_size as u64,
                last_merge_of_pass: last_merge,
            };
            stats.block_ios += merge_segments(
                &mut inf,
                &mut out,
                buf,
                mem_size,
                &mut blocks_left[..segs_to_merge],
                &params,
                mode,
                dedup.as_deref_mut(),
            )?;
            new_sorted += 1;
        }

        if last_merge_segs == 0 {
            last_segment_size += (mem_size as u64 - 1) * segment_size;
        } else {
            last_segment_size += (last_merge_segs - 1) * segment_size;
        }
        segment_size *= mem_size as u64;
        nsorted = new_sorted;
        stats.passes += 1;
        std::mem::swap(&mut ping, &mut pong);
    }

    ping.persist(output).map_err(minirel_io::Error::Io)?;
    Ok(stats)
}
