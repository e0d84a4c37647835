//! # Term Hashing
//!
//! Hashes are wire-visible: they are persisted in the `TermTable`, so the
//! exact fold matters and must never change without a format bump.
//!
//! - `hash(text)` is a straightforward FNV-1a fold of the UTF-8 bytes.
//! - `hash_phrase([g1..gn])` folds grams left to right by rotating the
//!   running hash left by one bit before XOR-ing in the next gram's hash.
//!   This makes every prefix phrase's hash derivable from the previous
//!   prefix's hash, which is what lets [`crate::term_plan::TermPlanConverter`]
//!   query all of a phrase's subphrases with no extra bookkeeping.
//! - `hash_fact(handle) = handle`.

/// A 64-bit term fingerprint.
pub type Hash = u64;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a hash of a unigram's UTF-8 bytes.
pub fn hash_unigram(text: &str) -> Hash {
    let mut h = FNV_OFFSET_BASIS;
    for byte in text.as_bytes() {
        h ^= u64::from(*byte);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Rotate-left-then-XOR fold used to combine a running phrase hash with the
/// next gram's hash.
fn fold_gram(running: Hash, gram_hash: Hash) -> Hash {
    running.rotate_left(1) ^ gram_hash
}

/// Hash of the full phrase `grams[0..grams.len()]`, per the rotate-XOR rule.
///
/// # Panics
/// Panics if `grams` is empty; callers must have already lowered
/// single-gram phrases to `Unigram` (see [`crate::term_tree`]).
pub fn hash_phrase(grams: &[&str]) -> Hash {
    assert!(!grams.is_empty(), "hash_phrase requires at least one gram");
    let mut running = hash_unigram(grams[0]);
    for gram in &grams[1..] {
        running = fold_gram(running, hash_unigram(gram));
    }
    running
}

/// All prefix-phrase hashes `hash_phrase(grams[0..k])` for `k = 1..=grams.len()`,
/// computed incrementally in a single left-to-right pass.
pub fn subphrase_hashes(grams: &[&str]) -> Vec<Hash> {
    assert!(!grams.is_empty(), "subphrase_hashes requires at least one gram");
    let mut hashes = Vec::with_capacity(grams.len());
    let mut running = hash_unigram(grams[0]);
    hashes.push(running);
    for gram in &grams[1..] {
        running = fold_gram(running, hash_unigram(gram));
        hashes.push(running);
    }
    hashes
}

/// Fact hashing is the identity: the handle IS the hash.
pub fn hash_fact(handle: u64) -> Hash {
    handle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unigram_hash_is_deterministic() {
        assert_eq!(hash_unigram("foo"), hash_unigram("foo"));
        assert_ne!(hash_unigram("foo"), hash_unigram("bar"));
    }

    #[test]
    fn phrase_hash_matches_incremental_fold() {
        let a = hash_unigram("a");
        let b = hash_unigram("b");
        let c = hash_unigram("c");

        let ab = a.rotate_left(1) ^ b;
        let abc = ab.rotate_left(1) ^ c;

        assert_eq!(hash_phrase(&["a"]), a);
        assert_eq!(hash_phrase(&["a", "b"]), ab);
        assert_eq!(hash_phrase(&["a", "b", "c"]), abc);
    }

    #[test]
    fn subphrase_hashes_are_prefixes() {
        let grams = ["a", "b", "c"];
        let hashes = subphrase_hashes(&grams);
        assert_eq!(hashes.len(), 3);
        assert_eq!(hashes[0], hash_phrase(&["a"]));
        assert_eq!(hashes[1], hash_phrase(&["a", "b"]));
        assert_eq!(hashes[2], hash_phrase(&["a", "b", "c"]));
    }

    #[test]
    fn fact_hash_is_identity() {
        assert_eq!(hash_fact(42), 42);
        assert_eq!(hash_fact(0), 0);
    }
}
