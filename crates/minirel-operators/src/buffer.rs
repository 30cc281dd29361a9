//! The operator working set: a fixed array of block slots.

use minirel_core::{Block, Record, RecordPtr, BLOCK_CAPACITY};

/// An in-process array of `nmem_blocks` block slots, the sole working
/// memory available to an operator call. Record access goes through
/// [`RecordPtr`] cursors so multi-block spans read as one flat sequence.
pub struct Buffer {
    slots: Vec<Block>,
}

impl Buffer {
    /// Allocate `nmem_blocks` empty, valid slots.
    pub fn new(nmem_blocks: usize) -> Self {
        let mut slots = vec![Block::default(); nmem_blocks];
        for (i, block) in slots.iter_mut().enumerate() {
            block.block_id = i as u32;
            block.valid = true;
        }
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn block(&self, slot: usize) -> &Block {
        &self.slots[slot]
    }

    pub fn block_mut(&mut self, slot: usize) -> &mut Block {
        &mut self.slots[slot]
    }

    pub fn slots(&self) -> &[Block] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [Block] {
        &mut self.slots
    }

    pub fn record(&self, ptr: RecordPtr) -> Record {
        self.slots[ptr.slot as usize].entries[ptr.offset as usize]
    }

    pub fn set_record(&mut self, ptr: RecordPtr, rec: Record) {
        self.slots[ptr.slot as usize].entries[ptr.offset as usize] = rec;
    }

    pub fn swap_records(&mut self, a: RecordPtr, b: RecordPtr) {
        let tmp = self.record(a);
        self.set_record(a, self.record(b));
        self.set_record(b, tmp);
    }

    /// Move invalid blocks to the tail of the first `span` slots with a
    /// linear two-pointer swap pass. Returns the number of valid blocks.
    pub fn arrange_blocks(&mut self, span: usize) -> usize {
        if span == 0 {
            return 0;
        }
        let mut start = 0;
        let mut end = span - 1;
        while start < end {
            if !self.slots[start].valid {
                while !self.slots[end].valid && end > start {
                    end -= 1;
                }
                if start == end {
                    break;
                }
                self.slots.swap(start, end);
                end -= 1;
            }
            start += 1;
        }
        if self.slots[start].valid {
            start += 1;
        }
        start
    }

    /// Move invalid records to the tail of the `valid_blocks`-block span
    /// with a linear two-pointer swap pass. Returns the cursor of the last
    /// valid record, or `None` when the span holds none.
    pub fn arrange_records(&mut self, valid_blocks: usize) -> Option<RecordPtr> {
        if valid_blocks == 0 {
            return None;
        }
        let mut start = RecordPtr::ZERO;
        let mut end = RecordPtr::from_flat(valid_blocks * BLOCK_CAPACITY - 1);
        while start < end {
            if !self.record(start).valid {
                while !self.record(end).valid && end > start {
                    end.decr();
                }
                if start == end {
                    break;
                }
                self.swap_records(start, end);
                end.decr();
            }
            start.incr();
        }
        // `start` is now on the first invalid record, or on the last record
        // of an entirely valid span.
        if self.record(start).valid {
            start.incr();
        }
        if start.flat() == 0 {
            return None;
        }
        Some(start - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(num: u32) -> Record {
        Record::new(num, num, "r")
    }

    #[test]
    fn arrange_blocks_moves_invalid_slots_to_the_tail() {
        let mut buf = Buffer::new(5);
        buf.block_mut(1).valid = false;
        buf.block_mut(3).valid = false;
        let valid = buf.arrange_blocks(5);
        assert_eq!(valid, 3);
        assert!(buf.slots()[..3].iter().all(|b| b.valid));
        assert!(buf.slots()[3..].iter().all(|b| !b.valid));
    }

    #[test]
    fn arrange_blocks_handles_all_invalid() {
        let mut buf = Buffer::new(3);
        for i in 0..3 {
            buf.block_mut(i).valid = false;
        }
        assert_eq!(buf.arrange_blocks(3), 0);
    }

    #[test]
    fn arrange_records_compacts_tombstones() {
        let mut buf = Buffer::new(2);
        // Valid records at scattered offsets, tombstones elsewhere.
        buf.set_record(RecordPtr::new(0, 3), rec(1));
        buf.set_record(RecordPtr::new(0, 77), rec(2));
        buf.set_record(RecordPtr::new(1, 10), rec(3));
        let last = buf.arrange_records(2).unwrap();
        assert_eq!(last.flat(), 2);
        for flat in 0..=2 {
            assert!(buf.record(RecordPtr::from_flat(flat)).valid);
        }
        assert!(!buf.record(RecordPtr::from_flat(3)).valid);
    }

    #[test]
    fn arrange_records_reports_empty_spans() {
        let mut buf = Buffer::new(2);
        assert!(buf.arrange_records(2).is_none());
        assert!(buf.arrange_records(0).is_none());
    }

    #[test]
    fn arrange_records_keeps_a_fully_valid_span() {
        let mut buf = Buffer::new(1);
        for i in 0..BLOCK_CAPACITY {
            buf.set_record(RecordPtr::new(0, i as u32), rec(i as u32));
        }
        let last = buf.arrange_records(1).unwrap();
        assert_eq!(last, RecordPtr::new(0, (BLOCK_CAPACITY - 1) as u32));
    }
}
