//! External merge sort integration tests.


use minirel_core::{Block, KeyMode, Record, BLOCK_CAPACITY};
use minirel_io::size_in_blocks;
use minirel_operators::{sort, OpError};
use test_data_gen::*;

#[test]
fn budget_below_minimum_is_rejected_without_io() {
    let dir = scratch_dir();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.bin");
    write_num_file(&input, &[vec![1, 2]]);

    let err = sort(&input, KeyMode::ByNumeric, 2, &output).unwrap_err();
    assert!(matches!(err, OpError::Config(_)));
    assert!(!output.exists());
    // Only the input remains on disk: no scratch leaked, no output created.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn empty_input_produces_empty_output_and_zero_counters() {
    let dir = scratch_dir();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.bin");
    write_empty_file(&input);

    let stats = sort(&input, KeyMode::ByNumeric, 3, &output).unwrap();
    assert_eq!(stats.sorted_segments, 0);
    assert_eq!(stats.passes, 0);
    assert_eq!(stats.block_ios, 0);
    assert_eq!(size_in_blocks(&output).unwrap(), 0);
}

#[test]
fn sorts_two_blocks_within_a_three_block_budget() {
    let dir = scratch_dir();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.bin");
    write_num_file(&input, &[vec![5, 3, 3, 8], vec![1, 1, 1, 9]]);

    let stats = sort(&input, KeyMode::ByNumeric, 3, &output).unwrap();
    assert_eq!(read_valid_nums(&output), vec![1, 1, 1, 3, 3, 5, 8, 9]);
    assert_eq!(stats.sorted_segments, 1);
    assert_eq!(stats.passes, 1);
}

#[test]
fn multi_pass_sort_is_ordered_and_preserves_cardinality() {
    let dir = scratch_dir();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.bin");
    // Nine full blocks, keys descending with repeats: three segments under
    // a three-block budget, so two merge passes follow the segment pass.
    let keys: Vec<u32> = (0..9 * BLOCK_CAPACITY as u32).rev().map(|i| i % 411).collect();
    write_num_file(&input, &chunked(&keys));

    let stats = sort(&input, KeyMode::ByNumeric, 3, &output).unwrap();
    assert_eq!(stats.sorted_segments, 3);
    assert_eq!(stats.passes, 3);

    let out = read_valid_nums(&output);
    let mut expected = keys.clone();
    expected.sort_unstable();
    assert_eq!(out, expected);
}

#[test]
fn tombstones_are_excluded_from_the_output() {
    let dir = scratch_dir();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.bin");

    let mut blocks = Vec::new();
    for b in 0..4u32 {
        let mut block = Block::default();
        block.block_id = b;
        block.valid = true;
        for slot in 0..BLOCK_CAPACITY as u32 {
            let mut rec = Record::new(b * 100 + slot, 1000 - slot, "t");
            rec.valid = slot % 3 != 0;
            block.append(rec);
        }
        blocks.push(block);
    }
    write_raw_blocks(&input, &blocks);

    let stats = sort(&input, KeyMode::ByNumeric, 3, &output).unwrap();
    let valid_inputs = 4 * (BLOCK_CAPACITY - BLOCK_CAPACITY.div_ceil(3));
    let out = read_valid_nums(&output);
    assert_eq!(out.len(), valid_inputs);
    assert!(out.windows(2).all(|w| w[0] <= w[1]));
    assert!(stats.block_ios > 0);
}

#[test]
fn sorting_a_sorted_file_is_idempotent() {
    let dir = scratch_dir();
    let input = dir.path().join("in.bin");
    let once = dir.path().join("once.bin");
    let twice = dir.path().join("twice.bin");
    // Distinct keys in a scrambled order.
    let keys: Vec<u32> = (0..500u32).map(|i| (i * 7919) % 500).collect();
    write_num_file(&input, &chunked(&keys));

    sort(&input, KeyMode::ByNumeric, 4, &once).unwrap();
    sort(&once, KeyMode::ByNumeric, 4, &twice).unwrap();
    assert_eq!(read_valid_records(&once), read_valid_records(&twice));
}

#[test]
fn sorts_by_text_and_composite_keys() {
    let dir = scratch_dir();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.bin");

    let mut block = Block::default();
    block.valid = true;
    for (i, (num, word)) in [(2, "pear"), (1, "fig"), (2, "apple"), (1, "apple")]
        .iter()
        .enumerate()
    {
        block.append(Record::new(i as u32, *num, word));
    }
    write_raw_blocks(&input, &[block]);

    sort(&input, KeyMode::ByText, 3, &output).unwrap();
    let words: Vec<String> = read_valid_records(&output)
        .iter()
        .map(|r| r.text_lossy().into_owned())
        .collect();
    assert_eq!(words, vec!["apple", "apple", "fig", "pear"]);

    sort(&input, KeyMode::ByNumericThenText, 3, &output).unwrap();
    let pairs: Vec<(u32, String)> = read_valid_records(&output)
        .iter()
        .map(|r| (r.num, r.text_lossy().into_owned()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (1, "apple".to_string()),
            (1, "fig".to_string()),
            (2, "apple".to_string()),
            (2, "pear".to_string()),
        ]
    );
}
