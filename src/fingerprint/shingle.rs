//! Character shingle multisets, the exact-similarity ground truth.

use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_64;

/// Shingle window length in characters.
pub const SHINGLE_SIZE: usize = 5;

/// Multiset of hashed 5-character windows over normalized text.
///
/// Frequencies weight the SimHash; Jaccard similarity is computed over the
/// distinct windows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShingleSet {
    counts: FxHashMap<u64, u32>,
}

impl ShingleSet {
    /// Build the shingle multiset from normalized text.
    ///
    /// Empty text produces an empty set. Text shorter than one window is kept
    /// as a single whole-text shingle; a singleton set never matches anything
    /// (see [`ShingleSet::jaccard`]), so such articles always end up unique.
    #[must_use]
    pub fn build(normalized: &str) -> Self {
        let mut counts = FxHashMap::default();

        if normalized.is_empty() {
            return Self { counts };
        }

        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() < SHINGLE_SIZE {
            counts.insert(xxh3_64(normalized.as_bytes()), 1);
            return Self { counts };
        }

        let mut window = String::with_capacity(SHINGLE_SIZE * 4);
        for chunk in chars.windows(SHINGLE_SIZE) {
            window.clear();
            window.extend(chunk.iter());
            *counts.entry(xxh3_64(window.as_bytes())).or_insert(0) += 1;
        }

        Self { counts }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of distinct shingles.
    #[must_use]
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Exact Jaccard similarity over distinct shingles, in `[0, 1]`.
    ///
    /// Empty or singleton sets never match: their Jaccard is defined as 0.
    #[must_use]
    pub fn jaccard(&self, other: &Self) -> f64 {
        if self.distinct() <= 1 || other.distinct() <= 1 {
            return 0.0;
        }

        let (small, large) = if self.distinct() <= other.distinct() {
            (self, other)
        } else {
            (other, self)
        };

        let intersection = small
            .counts
            .keys()
            .filter(|hash| large.counts.contains_key(*hash))
            .count();
        let union = self.distinct() + other.distinct() - intersection;

        intersection as f64 / union as f64
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.counts.iter().map(|(&hash, &count)| (hash, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_empty_set() {
        let set = ShingleSet::build("");
        assert!(set.is_empty());
        assert_eq!(set.distinct(), 0);
    }

    #[test]
    fn short_text_is_a_singleton() {
        let set = ShingleSet::build("abcd");
        assert_eq!(set.distinct(), 1);
    }

    #[test]
    fn window_count_matches_length() {
        let set = ShingleSet::build("abcdefgh");
        // 8 chars -> 4 windows, all distinct.
        assert_eq!(set.distinct(), 4);
    }

    #[test]
    fn repeated_windows_accumulate_counts() {
        let set = ShingleSet::build("ababababab");
        let total: u32 = set.iter().map(|(_, count)| count).sum();
        assert_eq!(total as usize, "ababababab".chars().count() - SHINGLE_SIZE + 1);
        assert!(set.distinct() < total as usize);
    }

    #[test]
    fn jaccard_of_identical_sets_is_one() {
        let a = ShingleSet::build("the quick brown fox jumps over the lazy dog");
        let b = ShingleSet::build("the quick brown fox jumps over the lazy dog");
        assert_eq!(a.jaccard(&b), 1.0);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let a = ShingleSet::build("aaaaaaaaaaaa");
        let b = ShingleSet::build("zzzzzzzzzzzz");
        assert_eq!(a.jaccard(&b), 0.0);
    }

    #[test]
    fn jaccard_never_matches_singletons() {
        let a = ShingleSet::build("abcd");
        let b = ShingleSet::build("abcd");
        assert_eq!(a.jaccard(&b), 0.0);

        let empty = ShingleSet::build("");
        let full = ShingleSet::build("some longer piece of text");
        assert_eq!(empty.jaccard(&full), 0.0);
    }

    #[test]
    fn jaccard_is_symmetric() {
        let a = ShingleSet::build("breaking news from the capital this morning");
        let b = ShingleSet::build("breaking news from the capital this evening");
        assert!((a.jaccard(&b) - b.jaccard(&a)).abs() < f64::EPSILON);
        assert!(a.jaccard(&b) > 0.5);
        assert!(a.jaccard(&b) < 1.0);
    }

    #[test]
    fn handles_cjk_windows() {
        let a = ShingleSet::build("人工知能の技術は近年急速に発展を遂げている");
        let b = ShingleSet::build("人工知能の技術は近年急速に発展を遂げている");
        assert_eq!(a.jaccard(&b), 1.0);
        assert!(a.distinct() > 10);
    }
}
