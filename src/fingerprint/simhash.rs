//! Frequency-weighted 64-bit SimHash.

use super::shingle::ShingleSet;

/// Hamming distance at or below which two articles are exact-duplicate
/// candidates.
pub const DUPLICATE_HAMMING: u32 = 3;

/// Compute the weighted SimHash of a shingle multiset.
///
/// Each shingle hash votes on all 64 bit positions with its frequency as
/// weight; the sign of the accumulated vote decides the output bit. The empty
/// set hashes to 0.
#[must_use]
pub fn simhash(shingles: &ShingleSet) -> u64 {
    if shingles.is_empty() {
        return 0;
    }

    let mut votes = [0i64; 64];
    for (hash, count) in shingles.iter() {
        let weight = i64::from(count);
        for (bit, vote) in votes.iter_mut().enumerate() {
            if (hash >> bit) & 1 == 1 {
                *vote += weight;
            } else {
                *vote -= weight;
            }
        }
    }

    let mut out = 0u64;
    for (bit, vote) in votes.iter().enumerate() {
        if *vote > 0 {
            out |= 1 << bit;
        }
    }
    out
}

#[must_use]
pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Split a SimHash into four 16-bit chunks, most significant first.
///
/// By pigeonhole, two hashes within Hamming distance 3 agree on at least one
/// chunk, so the document store can index each chunk and prefilter with four
/// equality lookups.
#[must_use]
pub fn chunk16(hash: u64) -> [u16; 4] {
    [
        (hash >> 48) as u16,
        (hash >> 32) as u16,
        (hash >> 16) as u16,
        hash as u16,
    ]
}
