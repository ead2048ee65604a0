//! MinHash signatures and LSH banding.

use xxhash_rust::xxh3::xxh3_64_with_seed;

use super::shingle::ShingleSet;

/// Number of hash permutations in a signature.
pub const NUM_PERMUTATIONS: usize = 128;

/// Number of LSH bands.
pub const NUM_BANDS: usize = 20;

/// Signature slots per band. 20 bands x 6 slots cover the first 120 slots;
/// the final 8 are unused by banding. A single-band collision fires with
/// probability `1 - (1 - s^6)^20`, i.e. near-certainty at s = 0.8.
pub const BAND_ROWS: usize = 6;

/// Seed multiplier for the per-slot permutations. Stored signatures are only
/// comparable while this constant is unchanged; treat it as a schema element
/// requiring a full reindex on change.
const PERMUTATION_SEED: u64 = 0x517c_c1b7_2722_0a95;

fn slot_seed(slot: usize) -> u64 {
    (slot as u64).wrapping_mul(PERMUTATION_SEED)
}

/// Compute the 128-slot MinHash signature of a shingle multiset.
///
/// The empty set yields all-`u64::MAX` (the identity of elementwise min, so
/// centroid math stays well defined).
#[must_use]
pub fn signature(shingles: &ShingleSet) -> Vec<u64> {
    let mut out = vec![u64::MAX; NUM_PERMUTATIONS];

    for (shingle, _) in shingles.iter() {
        let bytes = shingle.to_le_bytes();
        for (slot, min) in out.iter_mut().enumerate() {
            let hashed = xxh3_64_with_seed(&bytes, slot_seed(slot));
            if hashed < *min {
                *min = hashed;
            }
        }
    }

    out
}

/// Hash the signature into [`NUM_BANDS`] band keys.
///
/// Each band key covers [`BAND_ROWS`] consecutive slots, seeded by the band
/// index so equal values never collide across bands.
#[must_use]
pub fn band_hashes(signature: &[u64]) -> Vec<u64> {
    debug_assert_eq!(signature.len(), NUM_PERMUTATIONS);

    let mut bands = Vec::with_capacity(NUM_BANDS);
    for band in 0..NUM_BANDS {
        let start = band * BAND_ROWS;
        let mut bytes = [0u8; BAND_ROWS * 8];
        for (slot, value) in signature[start..start + BAND_ROWS].iter().enumerate() {
            bytes[slot * 8..(slot + 1) * 8].copy_from_slice(&value.to_le_bytes());
        }
        bands.push(xxh3_64_with_seed(&bytes, band as u64));
    }
    bands
}

/// Estimate Jaccard similarity as the fraction of matching signature slots.
#[must_use]
pub fn estimate_similarity(a: &[u64], b: &[u64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let matches = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matches as f64 / a.len() as f64
}

/// Elementwise minimum of two signatures, the cluster centroid update.
#[must_use]
pub fn elementwise_min(a: &[u64], b: &[u64]) -> Vec<u64> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| *x.min(y)).collect()
}

#[cfg(test)]
mod tests {
    use super::super::normalize::normalize;
    use super::*;

    fn sig_of(text: &str) -> Vec<u64> {
        signature(&ShingleSet::build(&normalize(text)))
    }

    #[test]
    fn signature_is_deterministic() {
        let text = "Parliament passed the revised budget after a marathon overnight session.";
        assert_eq!(sig_of(text), sig_of(text));
    }

    #[test]
    fn empty_signature_is_all_max() {
        let sig = signature(&ShingleSet::build(""));
        assert_eq!(sig.len(), NUM_PERMUTATIONS);
        assert!(sig.iter().all(|&v| v == u64::MAX));
    }

    #[test]
    fn estimate_tracks_exact_jaccard() {
        let base = "The committee approved the new transit plan on Thursday, allocating \
                    funds for two additional light rail lines and a bus corridor through \
                    the downtown core over the next five years.";
        let near = "The committee approved the new transit plan on Thursday, allocating \
                    funds for two additional light rail lines and a bike corridor through \
                    the downtown core over the next five years.";
        let far = "A rare meteor shower will be visible across the northern hemisphere \
                   this weekend, weather permitting, astronomers said.";

        let sim_near = estimate_similarity(&sig_of(base), &sig_of(near));
        let sim_far = estimate_similarity(&sig_of(base), &sig_of(far));

        assert!(sim_near > 0.6, "near estimate {sim_near}");
        assert!(sim_far < 0.2, "far estimate {sim_far}");
    }

    #[test]
    fn identical_signatures_estimate_one() {
        let sig = sig_of("word for word identical article body");
        assert_eq!(estimate_similarity(&sig, &sig), 1.0);
    }

    #[test]
    fn bands_cover_twenty_keys() {
        let bands = band_hashes(&sig_of("some representative article content for banding"));
        assert_eq!(bands.len(), NUM_BANDS);
    }

    #[test]
    fn near_duplicates_collide_in_some_band() {
        let base = "City officials confirmed on Monday that the waterfront redevelopment \
                    will break ground in March, with the first phase focused on public \
                    parkland and a pedestrian bridge across the harbor inlet.";
        // ~90% overlapping content.
        let near = "City officials confirmed on Tuesday that the waterfront redevelopment \
                    will break ground in March, with the first phase focused on public \
                    parkland and a pedestrian bridge across the harbor inlet.";

        let a = band_hashes(&sig_of(base));
        let b = band_hashes(&sig_of(near));
        let collisions = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
        assert!(collisions >= 1, "expected at least one band collision");
    }

    #[test]
    fn unrelated_text_rarely_collides() {
        let a = band_hashes(&sig_of(
            "Quarterly earnings beat expectations on strong cloud revenue growth.",
        ));
        let b = band_hashes(&sig_of(
            "The museum reopened its antiquities wing after a decade of restoration.",
        ));
        let collisions = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
        assert_eq!(collisions, 0);
    }

    #[test]
    fn elementwise_min_lower_bounds_members() {
        let a = sig_of("first member of the cluster with some shared phrasing");
        let b = sig_of("second member of the cluster with some shared phrasing");
        let centroid = elementwise_min(&a, &b);
        for (slot, value) in centroid.iter().enumerate() {
            assert!(*value <= a[slot]);
            assert!(*value <= b[slot]);
        }
    }
}
