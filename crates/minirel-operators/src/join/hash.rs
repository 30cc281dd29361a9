//! Grace hash join: in-memory probe with recursive bucket partitioning.
//!
//! A pair of files joins in a single pass when either side fits in
//! `memSize - 1` resident blocks. Anything larger is partitioned: both
//! relations stream once through the last buffer slot and every valid
//! record is hashed into one of `B` bucket files per relation, with the
//! bucket pairs pushed back for further partitioning. Partitioning runs on
//! an explicit worklist with a depth bound rather than call recursion; a
//! level that fails to shrink the smaller side (the all-duplicate-key
//! pathology) falls back to joining the pair by chunked build-side
//! loading, which always terminates.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use minirel_core::{compare, hash_record, seed_from, KeyMode, RecordPtr, BLOCK_CAPACITY};
use minirel_io::file::append_block;
use minirel_io::{exists, size_in_blocks, BlockFile, ScratchFile};

use crate::buffer::Buffer;
use crate::check_budget;
use crate::error::Result;
use crate::join::JoinStats;
use crate::stage::{emit_pair, flush_partial, init_output};

/// Partitioning levels before the chunked fallback takes over.
const MAX_PARTITION_DEPTH: u32 = 32;

/// One side of a pending pair: the caller's input files survive the call,
/// bucket files are scratch and deleted as soon as their pair is consumed.
enum JoinFile {
    Source(PathBuf),
    Bucket(ScratchFile),
}

impl JoinFile {
    fn path(&self) -> &Path {
        match self {
            JoinFile::Source(p) => p,
            JoinFile::Bucket(s) => s.path(),
        }
    }
}

/// Join `input_a` and `input_b` on `mode`, writing each matching pair as
/// two consecutive records `(probe, build)` to `output`.
pub fn hash_join(
    input_a: &Path,
    input_b: &Path,
    mode: KeyMode,
    nmem_blocks: usize,
    output: &Path,
) -> Result<JoinStats> {
    check_budget(nmem_blocks)?;
    let mem_size = nmem_blocks - 1;
    let mut stats = JoinStats::default();
    let mut buf = Buffer::new(nmem_blocks);
    debug!(
        left = %input_a.display(),
        right = %input_b.display(),
        budget = nmem_blocks,
        "hash join"
    );

    // Phase 1: partition until every pair has a side that fits. The
    // worklist owns the intermediate bucket files; dropping an entry
    // reclaims them on every exit path.
    let mut pending: Vec<(JoinFile, JoinFile, u32)> = vec![(
        JoinFile::Source(input_a.to_path_buf()),
        JoinFile::Source(input_b.to_path_buf()),
        0,
    )];
    let mut ready: Vec<(JoinFile, JoinFile)> = Vec::new();
    let mut oversized: Vec<(JoinFile, JoinFile)> = Vec::new();

    while let Some((file_a, file_b, depth)) = pending.pop() {
        let size_a = size_in_blocks(file_a.path())?;
        let size_b = size_in_blocks(file_b.path())?;
        let small = size_a.min(size_b);

        if size_a < mem_size as u64 || size_b < mem_size as u64 {
            // Single-pass joinable; smaller side becomes the build side.
            if size_a <= size_b {
                ready.push((file_a, file_b));
            } else {
                ready.push((file_b, file_a));
            }
            continue;
        }
        if depth >= MAX_PARTITION_DEPTH {
            if size_a <= size_b {
                oversized.push((file_a, file_b));
            } else {
                oversized.push((file_b, file_a));
            }
            continue;
        }

        let bucket_count = ((small as usize).div_ceil(mem_size - 1)).min(mem_size);
        // Both sides must agree on seed and modulus for buckets to line up.
        let seed = seed_from(&file_a.path().to_string_lossy());
        trace!(size_a, size_b, bucket_count, depth, "partition level");

        // Root-level buckets are named from the output path so the caller's
        // input files never gain siblings; deeper buckets extend their
        // parent's scratch name.
        let base_a = match &file_a {
            JoinFile::Source(_) => scratch_base(output, "hj1"),
            JoinFile::Bucket(s) => s.path().to_path_buf(),
        };
        let base_b = match &file_b {
            JoinFile::Source(_) => scratch_base(output, "hj2"),
            JoinFile::Bucket(s) => s.path().to_path_buf(),
        };
        let buckets_a = partition_into_buckets(
            file_a.path(),
            &base_a,
            size_a,
            seed,
            &mut buf,
            nmem_blocks,
            bucket_count,
            mode,
            &mut stats,
        )?;
        let buckets_b = partition_into_buckets(
            file_b.path(),
            &base_b,
            size_b,
            seed,
            &mut buf,
            nmem_blocks,
            bucket_count,
            mode,
            &mut stats,
        )?;
        // Parent bucket files are no longer needed once split.
        drop(file_a);
        drop(file_b);

        for (bucket_a, bucket_b) in buckets_a.into_iter().zip(buckets_b) {
            if !exists(bucket_a.path()) || !exists(bucket_b.path()) {
                // No counterpart, no possible matches; both are dropped.
                continue;
            }
            let child_small = size_in_blocks(bucket_a.path())?.min(size_in_blocks(bucket_b.path())?);
            if child_small >= small {
                // The level made no progress; partitioning again would
                // loop forever on all-duplicate keys.
                oversized.push(order_pair(bucket_a, bucket_b)?);
            } else {
                pending.push((
                    JoinFile::Bucket(bucket_a),
                    JoinFile::Bucket(bucket_b),
                    depth + 1,
                ));
            }
        }
    }

    // Phase 2: probe. The output staging block lives in the last slot and
    // survives across pairs; it is flushed once at the end.
    let mut out = BlockFile::create(output)?;
    init_output(&mut buf, nmem_blocks - 1);

    for (build, probe) in ready {
        let build_blocks = size_in_blocks(build.path())? as usize;
        if build_blocks > 0 {
            let mut inf = BlockFile::open(build.path())?;
            stats.block_ios += inf.read_blocks(&mut buf.slots_mut()[..build_blocks])? as u64;
        }
        hash_and_probe(
            probe.path(),
            &mut buf,
            nmem_blocks,
            build_blocks,
            &mut out,
            mode,
            &mut stats,
        )?;
    }
    for (build, probe) in oversized {
        chunked_probe_join(
            build.path(),
            probe.path(),
            &mut buf,
            nmem_blocks,
            &mut out,
            mode,
            &mut stats,
        )?;
    }

    stats.block_ios += flush_partial(&mut buf, nmem_blocks - 1, &mut out)?;
    Ok(stats)
}

fn scratch_base(output: &Path, tag: &str) -> PathBuf {
    let name = match output.file_name() {
        Some(n) => format!("{}.{tag}", n.to_string_lossy()),
        None => format!(".{tag}"),
    };
    output.with_file_name(name)
}

fn order_pair(a: ScratchFile, b: ScratchFile) -> Result<(JoinFile, JoinFile)> {
    let size_a = size_in_blocks(a.path())?;
    let size_b = size_in_blocks(b.path())?;
    if size_a <= size_b {
        Ok((JoinFile::Bucket(a), JoinFile::Bucket(b)))
    } else {
        Ok((JoinFile::Bucket(b), JoinFile::Bucket(a)))
    }
}

/// Stream `src` one block at a time through the last buffer slot, hashing
/// every valid record into one of `bucket_count` bucket files staged in the
/// leading slots. Returns the bucket scratch handles; buckets that received
/// no records have no file on disk.
#[allow(clippy::too_many_arguments)]
fn partition_into_buckets(
    src: &Path,
    base: &Path,
    size: u64,
    seed: u32,
    buf: &mut Buffer,
    nmem_blocks: usize,
    bucket_count: usize,
    mode: KeyMode,
    stats: &mut JoinStats,
) -> Result<Vec<ScratchFile>> {
    let buckets: Vec<ScratchFile> = (0..bucket_count)
        .map(|i| ScratchFile::at(PathBuf::from(format!("{}_{i}", base.display()))))
        .collect();
    for i in 0..bucket_count {
        let block = buf.block_mut(i);
        block.clear();
        block.valid = true;
    }

    let staging = nmem_blocks - 1;
    let mut inf = BlockFile::open(src)?;
    for _ in 0..size {
        stats.block_ios += inf.read_blocks(&mut buf.slots_mut()[staging..staging + 1])? as u64;
        if !buf.block(staging).valid {
            continue;
        }
        for slot in 0..BLOCK_CAPACITY {
            let record = buf.block(staging).entries[slot];
            if !record.valid {
                continue;
            }
            let bucket = hash_record(seed, &record, bucket_count as u32, mode) as usize;
            buf.block_mut(bucket).append(record);
            if buf.block(bucket).is_full() {
                stats.block_ios += append_block(buckets[bucket].path(), buf.block(bucket))? as u64;
                buf.block_mut(bucket).clear();
            }
        }
    }
    for (i, bucket) in buckets.iter().enumerate() {
        if buf.block(i).reserved != 0 {
            stats.block_ios += append_block(bucket.path(), buf.block(i))? as u64;
            buf.block_mut(i).clear();
        }
    }
    Ok(buckets)
}

/// Probe the resident build side (slots `0..build_blocks`) with every valid
/// record of `probe`, streamed through slot `nmem_blocks - 2`.
#[allow(clippy::too_many_arguments)]
fn hash_and_probe(
    probe: &Path,
    buf: &mut Buffer,
    nmem_blocks: usize,
    build_blocks: usize,
    out: &mut BlockFile,
    mode: KeyMode,
    stats: &mut JoinStats,
) -> Result<()> {
    let bucket_count = (build_blocks * BLOCK_CAPACITY).max(1);
    let seed = seed_from(&probe.to_string_lossy());

    // Index the resident relation: bucket -> locators of its records.
    let mut index: Vec<Vec<RecordPtr>> = vec![Vec::new(); bucket_count];
    if build_blocks > 0 {
        let mut ptr = RecordPtr::ZERO;
        let end = RecordPtr::from_flat(build_blocks * BLOCK_CAPACITY - 1);
        while ptr <= end {
            if !buf.block(ptr.slot as usize).valid {
                ptr = RecordPtr::new(ptr.slot, (BLOCK_CAPACITY - 1) as u32);
            } else {
                let record = buf.record(ptr);
                if record.valid {
                    let bucket = hash_record(seed, &record, bucket_count as u32, mode) as usize;
                    index[bucket].push(ptr);
                }
            }
            if ptr == end {
                break;
            }
            ptr.incr();
        }
    }

    let probe_blocks = size_in_blocks(probe)?;
    let staging = nmem_blocks - 2;
    let out_slot = nmem_blocks - 1;
    let mut inf = BlockFile::open(probe)?;
    for _ in 0..probe_blocks {
        stats.block_ios += inf.read_blocks(&mut buf.slots_mut()[staging..staging + 1])? as u64;
        if !buf.block(staging).valid {
            continue;
        }
        for slot in 0..BLOCK_CAPACITY {
            let record = buf.block(staging).entries[slot];
            if !record.valid {
                continue;
            }
            let bucket = hash_record(seed, &record, bucket_count as u32, mode) as usize;
            for k in 0..index[bucket].len() {
                let resident = buf.record(index[bucket][k]);
                if compare(&record, &resident, mode) == std::cmp::Ordering::Equal {
                    stats.block_ios += emit_pair(buf, out_slot, out, record, resident)?;
                    stats.pairs += 1;
                }
            }
        }
    }
    Ok(())
}

/// Termination fallback for partitions that refuse to shrink: load the
/// build side `memSize - 1` blocks at a time and probe each resident chunk
/// with a full scan of the other side. Chunks are disjoint, so pair
/// multiplicity is preserved.
fn chunked_probe_join(
    build: &Path,
    probe: &Path,
    buf: &mut Buffer,
    nmem_blocks: usize,
    out: &mut BlockFile,
    mode: KeyMode,
    stats: &mut JoinStats,
) -> Result<()> {
    let chunk = nmem_blocks - 2;
    let total = size_in_blocks(build)?;
    debug!(
        build = %build.display(),
        blocks = total,
        chunk,
        "chunked hash join fallback"
    );
    let mut inf = BlockFile::open(build)?;
    let mut offset = 0u64;
    while offset < total {
        let n = (chunk as u64).min(total - offset) as usize;
        stats.block_ios += inf.read_blocks_at(offset, &mut buf.slots_mut()[..n])? as u64;
        hash_and_probe(probe, buf, nmem_blocks, n, out, mode, stats)?;
        offset += n as u64;
    }
    Ok(())
}
