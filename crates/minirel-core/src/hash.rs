//! Record hashing for duplicate elimination and hash join.
//!
//! None of this is cryptographic: buckets only disperse records, and every
//! lookup re-checks candidates with an exact key comparison. Numeric keys go
//! through a multiplicative-additive avalanche mix, text keys through a
//! polynomial rolling hash that is itself dispersed by the same mix.

use crate::key::KeyMode;
use crate::record::Record;

/// Modulus used when dispersing intermediate hash values.
const DISPERSE_MOD: u32 = 8_701_123;

/// Derive a per-call hash seed from a seed string (typically a file path).
/// The string only drives dispersion, not identity, so reducing a blake3
/// digest to 32 bits is plenty.
pub fn seed_from(seed: &str) -> u32 {
    let digest = blake3::hash(seed.as_bytes());
    u32::from_le_bytes(digest.as_bytes()[..4].try_into().unwrap())
}

/// Avalanche mix for integer keys, reduced modulo `modulus`.
pub fn mix_u32(num: u32, modulus: u32, seed: u32) -> u32 {
    let mut n = num.wrapping_add(seed);
    n = n.wrapping_add(0x7ed5_5d16).wrapping_add(n << 12);
    n = (n ^ 0xc761_c23c) ^ (n >> 19);
    n = n.wrapping_add(0x1656_67b1).wrapping_add(n << 5);
    n = n.wrapping_add(0xd3a2_646c) ^ (n << 9);
    n = n.wrapping_add(0xfd70_46c5).wrapping_add(n << 3);
    n = (n ^ 0xb55a_4f09) ^ (n >> 16);
    n % modulus
}

/// Polynomial rolling hash (djb2) for text keys, dispersed through
/// [`mix_u32`] before reduction.
pub fn hash_text(text: &[u8], modulus: u32, seed: u32) -> u32 {
    let mut h: u32 = 5381;
    for &c in text {
        h = h.wrapping_mul(33).wrapping_add(c as u32);
    }
    mix_u32(h, DISPERSE_MOD, seed) % modulus
}

/// Hash the record's key under `mode` into `[0, modulus)`.
pub fn hash_record(seed: u32, rec: &Record, modulus: u32, mode: KeyMode) -> u32 {
    match mode {
        KeyMode::ById => mix_u32(rec.id, modulus, seed),
        KeyMode::ByNumeric => mix_u32(rec.num, modulus, seed),
        KeyMode::ByText => hash_text(rec.text_bytes(), modulus, seed),
        KeyMode::ByNumericThenText => {
            let text = hash_text(rec.text_bytes(), modulus, seed);
            mix_u32(rec.num.wrapping_add(text), modulus, seed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_stay_in_range() {
        let seed = seed_from("some/input/file.bin");
        for num in [0u32, 1, 99_999, u32::MAX] {
            let rec = Record::new(num, num, "payload");
            for mode in [
                KeyMode::ById,
                KeyMode::ByNumeric,
                KeyMode::ByText,
                KeyMode::ByNumericThenText,
            ] {
                assert!(hash_record(seed, &rec, 97, mode) < 97);
            }
        }
    }

    #[test]
    fn seed_derivation_is_deterministic_and_disperses() {
        assert_eq!(seed_from("a.bin"), seed_from("a.bin"));
        assert_ne!(seed_from("a.bin"), seed_from("b.bin"));
    }

    #[test]
    fn equal_keys_hash_equal_regardless_of_other_fields() {
        let seed = seed_from("probe.bin");
        let a = Record::new(1, 42, "k");
        let b = Record::new(2, 42, "other");
        assert_eq!(
            hash_record(seed, &a, 1000, KeyMode::ByNumeric),
            hash_record(seed, &b, 1000, KeyMode::ByNumeric)
        );
    }
}
