//! Text normalization applied before any fingerprinting.

use unicode_normalization::UnicodeNormalization;

/// Canonicalize article content: NFKC, lowercase, punctuation and symbols
/// replaced by spaces, whitespace runs collapsed to a single ASCII space.
/// Letters and digits of all scripts (CJK included) pass through.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.nfkc() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else {
            // Whitespace, punctuation and symbols all act as separators.
            pending_space = true;
        }
    }

    out
}
