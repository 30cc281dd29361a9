//! Hash join and sort-merge join integration tests, cross-validated
//! against each other.


use minirel_core::{KeyMode, BLOCK_CAPACITY};
use minirel_io::size_in_blocks;
use minirel_operators::{hash_join, merge_join, OpError};
use test_data_gen::*;

#[test]
fn budget_below_minimum_is_rejected_without_io() {
    let dir = scratch_dir();
    let left = dir.path().join("a.bin");
    let right = dir.path().join("b.bin");
    let output = dir.path().join("out.bin");
    write_num_file(&left, &[vec![1]]);
    write_num_file(&right, &[vec![1]]);

    let err = hash_join(&left, &right, KeyMode::ByNumeric, 2, &output).unwrap_err();
    assert!(matches!(err, OpError::Config(_)));
    assert!(!output.exists());

    let err = merge_join(&left, &right, KeyMode::ByNumeric, 2, &output).unwrap_err();
    assert!(matches!(err, OpError::Config(_)));
    assert!(!output.exists());
    // Inputs only: no scratch, no buckets, no output.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn empty_inputs_produce_empty_outputs() {
    let dir = scratch_dir();
    let left = dir.path().join("a.bin");
    let right = dir.path().join("b.bin");
    write_empty_file(&left);
    write_num_file(&right, &[vec![1, 2, 3]]);

    for (name, join) in [("hash", hash_join as JoinFn), ("merge", merge_join as JoinFn)] {
        let output = dir.path().join(format!("out-{name}.bin"));
        let stats = join(&left, &right, KeyMode::ByNumeric, 3, &output).unwrap();
        assert_eq!(stats.pairs, 0, "{name} join on empty left");
        assert_eq!(size_in_blocks(&output).unwrap(), 0);
    }
}

type JoinFn = fn(
    &std::path::Path,
    &std::path::Path,
    KeyMode,
    usize,
    &std::path::Path,
) -> minirel_operators::Result<minirel_operators::JoinStats>;

#[test]
fn small_join_emits_every_matching_pair() {
    let dir = scratch_dir();
    let left = dir.path().join("a.bin");
    let right = dir.path().join("b.bin");
    write_num_file(&left, &[vec![1, 2, 2, 3]]);
    write_num_file(&right, &[vec![2, 2, 4]]);

    for (name, join) in [("hash", hash_join as JoinFn), ("merge", merge_join as JoinFn)] {
        let output = dir.path().join(format!("out-{name}.bin"));
        let stats = join(&left, &right, KeyMode::ByNumeric, 3, &output).unwrap();
        assert_eq!(stats.pairs, 4, "{name} join pair count");
        let pairs = read_pairs(&output);
        assert_eq!(pairs.len(), 4);
        assert!(
            pairs.iter().all(|(a, b)| a.num == 2 && b.num == 2),
            "{name} join keys"
        );
    }
}

#[test]
fn hash_and_merge_joins_agree_on_single_pass_inputs() {
    let dir = scratch_dir();
    let left = dir.path().join("a.bin");
    let right = dir.path().join("b.bin");
    let a_keys: Vec<u32> = (0..3 * BLOCK_CAPACITY as u32).map(|i| (i * 7) % 60).collect();
    let b_keys: Vec<u32> = (0..2 * BLOCK_CAPACITY as u32).map(|i| (i * 11) % 60).collect();
    write_num_file(&left, &chunked(&a_keys));
    write_num_file(&right, &chunked(&b_keys));
    let expected = expected_pair_count(&a_keys, &b_keys);
    assert!(expected > 0);

    let hash_out = dir.path().join("hash.bin");
    let merge_out = dir.path().join("merge.bin");
    let h = hash_join(&left, &right, KeyMode::ByNumeric, 5, &hash_out).unwrap();
    let m = merge_join(&left, &right, KeyMode::ByNumeric, 5, &merge_out).unwrap();
    assert_eq!(h.pairs, expected);
    assert_eq!(m.pairs, expected);

    // Same multiset of key pairs from both algorithms.
    let mut h_keys: Vec<(u32, u32)> = read_pairs(&hash_out)
        .iter()
        .map(|(a, b)| (a.num, b.num))
        .collect();
    let mut m_keys: Vec<(u32, u32)> = read_pairs(&merge_out)
        .iter()
        .map(|(a, b)| (a.num, b.num))
        .collect();
    h_keys.sort_unstable();
    m_keys.sort_unstable();
    assert_eq!(h_keys, m_keys);
}

#[test]
fn partitioned_hash_join_agrees_with_external_merge_join() {
    let dir = scratch_dir();
    let left = dir.path().join("a.bin");
    let right = dir.path().join("b.bin");
    // Both sides exceed the budget: the hash join partitions into bucket
    // files, the merge join runs its sliding-window variant.
    let a_keys: Vec<u32> = (0..6 * BLOCK_CAPACITY as u32).map(|i| (i * 13) % 30).collect();
    let b_keys: Vec<u32> = (0..5 * BLOCK_CAPACITY as u32).map(|i| (i * 17) % 30).collect();
    write_num_file(&left, &chunked(&a_keys));
    write_num_file(&right, &chunked(&b_keys));
    let expected = expected_pair_count(&a_keys, &b_keys);

    let hash_out = dir.path().join("hash.bin");
    let merge_out = dir.path().join("merge.bin");
    let h = hash_join(&left, &right, KeyMode::ByNumeric, 4, &hash_out).unwrap();
    let m = merge_join(&left, &right, KeyMode::ByNumeric, 4, &merge_out).unwrap();
    assert_eq!(h.pairs, expected);
    assert_eq!(m.pairs, expected);

    // Bucket and scratch files are gone; inputs and outputs remain.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);
}

#[test]
fn window_reload_rejoins_keys_that_slid_out() {
    let dir = scratch_dir();
    let left = dir.path().join("a.bin");
    let right = dir.path().join("b.bin");
    // The windowed side holds a key group spanning more than the
    // two-block window, and the streamed side repeats that key, forcing
    // the merge join to reload the window from the group start.
    let mut b_keys = vec![5u32; 201];
    b_keys.extend(vec![9u32; 99]);
    b_keys.extend(vec![11u32; 100]);
    let mut a_keys = vec![5u32; 250];
    a_keys.extend(vec![9u32; 50]);
    write_num_file(&left, &chunked(&a_keys));
    write_num_file(&right, &chunked(&b_keys));
    let expected = expected_pair_count(&a_keys, &b_keys);
    assert_eq!(expected, 250 * 201 + 50 * 99);

    let merge_out = dir.path().join("merge.bin");
    let m = merge_join(&left, &right, KeyMode::ByNumeric, 4, &merge_out).unwrap();
    assert_eq!(m.pairs, expected);

    let hash_out = dir.path().join("hash.bin");
    let h = hash_join(&left, &right, KeyMode::ByNumeric, 5, &hash_out).unwrap();
    assert_eq!(h.pairs, expected);
}

#[test]
fn all_duplicate_keys_terminate_through_the_chunked_fallback() {
    let dir = scratch_dir();
    let left = dir.path().join("a.bin");
    let right = dir.path().join("b.bin");
    // Every record shares one key, so partitioning can never shrink the
    // bucket pair; the join must fall back instead of recursing forever.
    let a_keys = vec![7u32; 3 * BLOCK_CAPACITY];
    let b_keys = vec![7u32; 3 * BLOCK_CAPACITY];
    write_num_file(&left, &chunked(&a_keys));
    write_num_file(&right, &chunked(&b_keys));

    let output = dir.path().join("out.bin");
    let stats = hash_join(&left, &right, KeyMode::ByNumeric, 4, &output).unwrap();
    assert_eq!(stats.pairs, (3 * BLOCK_CAPACITY as u64).pow(2));
}

#[test]
fn join_pairs_preserve_whole_records() {
    let dir = scratch_dir();
    let left = dir.path().join("a.bin");
    let right = dir.path().join("b.bin");

    let mut a = minirel_core::Block::default();
    a.valid = true;
    a.append(minirel_core::Record::new(101, 4, "left-4"));
    a.append(minirel_core::Record::new(102, 6, "left-6"));
    write_raw_blocks(&left, &[a]);

    let mut b = minirel_core::Block::default();
    b.valid = true;
    b.append(minirel_core::Record::new(201, 6, "right-6a"));
    b.append(minirel_core::Record::new(202, 6, "right-6b"));
    write_raw_blocks(&right, &[b]);

    let output = dir.path().join("out.bin");
    hash_join(&left, &right, KeyMode::ByNumeric, 3, &output).unwrap();
    let pairs = read_pairs(&output);
    assert_eq!(pairs.len(), 2);
    for (outer, inner) in pairs {
        assert_eq!(outer.num, 6);
        assert_eq!(inner.num, 6);
        // The probe side of the pair comes first, the build side second.
        assert!(outer.id >= 200, "outer record from the probed relation");
        assert_eq!(inner.id, 102);
    }
}
