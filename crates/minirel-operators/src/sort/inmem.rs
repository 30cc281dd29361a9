//! In-memory sort over a contiguous cursor span.
//!
//! Introsort hybrid: quicksort with the middle record as pivot and an
//! explicit scan-and-swap partition, insertion sort for spans shorter than
//! ten records, heapsort once the depth budget `2 * floor(log2(n + 1))` is
//! exhausted. Before sorting, the span is compacted so all valid records
//! form a dense prefix.

use std::cmp::Ordering;

use minirel_core::{compare, KeyMode, RecordPtr, BLOCK_CAPACITY};

use crate::buffer::Buffer;

/// Spans shorter than this go straight to insertion sort.
const INSERTION_CUTOFF: usize = 10;

fn insertion_sort(buf: &mut Buffer, left: RecordPtr, right: RecordPtr, mode: KeyMode) {
    let mut i = left + 1;
    while i <= right {
        let target = buf.record(i);
        let mut hole = i;
        while hole > left && compare(&target, &buf.record(hole - 1), mode) == Ordering::Less {
            let shifted = buf.record(hole - 1);
            buf.set_record(hole, shifted);
            hole.decr();
        }
        buf.set_record(hole, target);
        i.incr();
    }
}

/// Restore the max-heap property below `root`, addressing records by flat
/// offsets relative to `base`.
fn sift_down(buf: &mut Buffer, base: usize, mut root: usize, len: usize, mode: KeyMode) {
    loop {
        let child = 2 * root + 1;
        if child >= len {
            return;
        }
        let mut swap = root;
        let swap_rec = buf.record(RecordPtr::from_flat(base + swap));
        let child_rec = buf.record(RecordPtr::from_flat(base + child));
        if compare(&swap_rec, &child_rec, mode) == Ordering::Less {
            swap = child;
        }
        if child + 1 < len {
            let swap_rec = buf.record(RecordPtr::from_flat(base + swap));
            let right_rec = buf.record(RecordPtr::from_flat(base + child + 1));
            if compare(&swap_rec, &right_rec, mode) == Ordering::Less {
                swap = child + 1;
            }
        }
        if swap == root {
            return;
        }
        buf.swap_records(
            RecordPtr::from_flat(base + root),
            RecordPtr::from_flat(base + swap),
        );
        root = swap;
    }
}

fn heap_sort(buf: &mut Buffer, left: RecordPtr, right: RecordPtr, mode: KeyMode) {
    let base = left.flat();
    let len = right.flat() - base + 1;
    for i in (0..len / 2).rev() {
        sift_down(buf, base, i, len, mode);
    }
    for end in (1..len).rev() {
        buf.swap_records(RecordPtr::from_flat(base), RecordPtr::from_flat(base + end));
        sift_down(buf, base, 0, end, mode);
    }
}

fn intro_sort(buf: &mut Buffer, mut left: RecordPtr, mut right: RecordPtr, mode: KeyMode, depth: u32) {
    if left >= right {
        return;
    }
    if right.flat() - left.flat() < INSERTION_CUTOFF {
        insertion_sort(buf, left, right, mode);
        return;
    }
    if depth == 0 {
        heap_sort(buf, left, right, mode);
        return;
    }
    let pivot = buf.record(left + (right.flat() - left.flat()) / 2);
    let start = left;
    let end = right;
    while left <= right {
        while compare(&buf.record(left), &pivot, mode) == Ordering::Less {
            left.incr();
        }
        while compare(&buf.record(right), &pivot, mode) == Ordering::Greater {
            right.decr();
        }
        if left <= right {
            buf.swap_records(left, right);
            left.incr();
            if right == RecordPtr::ZERO {
                // Cannot step below the span start; the left scan has
                // already passed every record on this side.
                break;
            }
            right.decr();
        }
    }
    intro_sort(buf, start, right, mode, depth - 1);
    intro_sort(buf, left, end, mode, depth - 1);
}

/// Sort the valid records held in the first `span` buffer slots.
///
/// Invalid blocks and records are compacted to the tail first, so the sort
/// runs over a dense prefix; afterwards block metadata is rewritten to match
/// the new packing and trailing slots are invalidated. Returns `false` (and
/// does nothing) when the span holds no valid records.
pub fn sort_buffer(buf: &mut Buffer, span: usize, mode: KeyMode) -> bool {
    let valid_blocks = buf.arrange_blocks(span);
    let Some(last) = buf.arrange_records(valid_blocks) else {
        return false;
    };
    let n = last.flat() + 1;
    let depth = 2 * (n as u32 + 1).ilog2();
    intro_sort(buf, RecordPtr::ZERO, last, mode, depth);

    let last_block = last.slot as usize;
    for i in 0..last_block {
        let block = buf.block_mut(i);
        block.reserved = BLOCK_CAPACITY as u32;
        block.block_id = i as u32;
    }
    let block = buf.block_mut(last_block);
    block.reserved = last.offset + 1;
    block.block_id = last_block as u32;
    for i in last_block + 1..span {
        let block = buf.block_mut(i);
        // Clearing drops any stale valid-flagged entries, so a scan of the
        // whole span can rely on record validity alone.
        block.clear();
        block.valid = false;
        block.block_id = i as u32;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use minirel_core::Record;

    fn fill(buf: &mut Buffer, nums: &[u32]) {
        for (i, &num) in nums.iter().enumerate() {
            buf.set_record(RecordPtr::from_flat(i), Record::new(i as u32, num, "x"));
        }
    }

    fn nums(buf: &Buffer, n: usize) -> Vec<u32> {
        (0..n)
            .map(|i| buf.record(RecordPtr::from_flat(i)).num)
            .collect()
    }

    #[test]
    fn sorts_a_small_span_with_duplicates() {
        let mut buf = Buffer::new(2);
        fill(&mut buf, &[5, 3, 3, 8, 1, 1, 1, 9]);
        assert!(sort_buffer(&mut buf, 2, KeyMode::ByNumeric));
        assert_eq!(nums(&buf, 8), vec![1, 1, 1, 3, 3, 5, 8, 9]);
        assert_eq!(buf.block(0).reserved, 8);
        assert!(!buf.block(1).valid);
    }

    #[test]
    fn sorts_across_block_boundaries() {
        let mut buf = Buffer::new(3);
        let input: Vec<u32> = (0..250).rev().map(|i| i * 3 % 97).collect();
        fill(&mut buf, &input);
        assert!(sort_buffer(&mut buf, 3, KeyMode::ByNumeric));
        let out = nums(&buf, 250);
        let mut expected = input.clone();
        expected.sort_unstable();
        assert_eq!(out, expected);
        assert_eq!(buf.block(0).reserved, 100);
        assert_eq!(buf.block(1).reserved, 100);
        assert_eq!(buf.block(2).reserved, 50);
    }

    #[test]
    fn compacts_tombstones_before_sorting() {
        let mut buf = Buffer::new(2);
        fill(&mut buf, &[9, 4, 7, 2]);
        let mut dead = buf.record(RecordPtr::from_flat(1));
        dead.valid = false;
        buf.set_record(RecordPtr::from_flat(1), dead);
        assert!(sort_buffer(&mut buf, 2, KeyMode::ByNumeric));
        assert_eq!(nums(&buf, 3), vec![2, 7, 9]);
        assert_eq!(buf.block(0).reserved, 3);
    }

    #[test]
    fn empty_span_is_a_no_op() {
        let mut buf = Buffer::new(2);
        assert!(!sort_buffer(&mut buf, 2, KeyMode::ByNumeric));
    }

    #[test]
    fn text_and_composite_orders() {
        let mut buf = Buffer::new(1);
        let words = ["pear", "apple", "fig", "apple"];
        for (i, w) in words.iter().enumerate() {
            buf.set_record(RecordPtr::from_flat(i), Record::new(i as u32, 1, w));
        }
        assert!(sort_buffer(&mut buf, 1, KeyMode::ByNumericThenText));
        let out: Vec<String> = (0..4)
            .map(|i| buf.record(RecordPtr::from_flat(i)).text_lossy().into_owned())
            .collect();
        assert_eq!(out, vec!["apple", "apple", "fig", "pear"]);
    }
}
