//! Text match scoring: normalized Levenshtein similarity between the
//! expected challenge phrase and the ASR transcript.
//!
//! ## Algorithm
//!
//! 1. Lowercase + trim both strings.
//! 2. Either side empty → fail closed (similarity 0.0).
//! 3. `similarity = 1 − distance / max(len_a, len_b)` over chars.
//! 4. `passed = similarity ≥ threshold`.
//!
//! The similarity can never go negative: the edit distance is bounded by
//! the longer string's length.

use crate::model::TextMatch;

/// Default acceptance threshold for the text match.
pub const DEFAULT_THRESHOLD: f64 = 0.80;

/// Score a transcript against the expected phrase.
///
/// Returns the full [`TextMatch`] detail; the raw (un-normalized) strings
/// are carried through so the audit record shows exactly what was compared.
pub fn score(expected: &str, transcript: &str, threshold: f64) -> TextMatch {
    let expected_clean = expected.trim().to_lowercase();
    let transcript_clean = transcript.trim().to_lowercase();

    if expected_clean.is_empty() || transcript_clean.is_empty() {
        return TextMatch {
            expected_phrase: expected.to_string(),
            transcript: transcript.to_string(),
            levenshtein_distance: expected_clean.chars().count().max(transcript_clean.chars().count()),
            max_length: expected_clean.chars().count().max(transcript_clean.chars().count()),
            similarity: 0.0,
            threshold,
            passed: false,
        };
    }

    let a: Vec<char> = expected_clean.chars().collect();
    let b: Vec<char> = transcript_clean.chars().collect();
    let distance = levenshtein(&a, &b);
    let max_length = a.len().max(b.len());

    let similarity = 1.0 - distance as f64 / max_length as f64;
    let similarity = (similarity * 10_000.0).round() / 10_000.0;

    TextMatch {
        expected_phrase: expected.to_string(),
        transcript: transcript.to_string(),
        levenshtein_distance: distance,
        max_length,
        similarity,
        threshold,
        passed: similarity >= threshold,
    }
}

/// Two-row Levenshtein over char slices.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitute.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
