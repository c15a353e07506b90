//! Binary match oracle between a chunk and an evidence string
//!
//! Decides whether one normalized chunk "covers" one normalized evidence
//! string. This is an asymmetric coverage test, not a similarity metric:
//! only evidence→chunk containment matters, and the chunk is not penalized
//! for extra content.

use crate::normalize::tokenize;
use std::collections::HashSet;

/// True if `chunk` covers `evidence`.
///
/// Both inputs must already be normalized. Matches when `evidence` is a
/// literal substring of `chunk`, or when the fraction of evidence tokens
/// found anywhere in the chunk's token set reaches `threshold` (a set
/// membership test, not positional alignment). Empty evidence never
/// matches.
pub fn evidence_match(chunk: &str, evidence: &str, threshold: f64) -> bool {
    if evidence.is_empty() {
        return false;
    }
    if chunk.contains(evidence) {
        return true;
    }

    let evidence_tokens = tokenize(evidence);
    if evidence_tokens.is_empty() {
        return false;
    }

    let chunk_tokens: HashSet<&str> = tokenize(chunk).into_iter().collect();
    // Duplicate evidence tokens count per occurrence.
    let hits = evidence_tokens
        .iter()
        .filter(|t| chunk_tokens.contains(**t))
        .count();

    hits as f64 / evidence_tokens.len() as f64 >= threshold
}
