//! Fuzzy string similarity on a 0–100 scale.
//!
//! Both metrics are built on the Indel distance (insertions and deletions
//! only), measured in characters:
//!
//! ```text
//! indel(a, b) = len(a) + len(b) - 2 * lcs(a, b)
//! ratio(a, b) = 100 * (1 - indel(a, b) / (len(a) + len(b)))
//! ```

use std::collections::BTreeSet;

/// Length of the longest common subsequence of two char slices.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Indel distance between `a` and `b`.
fn indel_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    a.len() + b.len() - 2 * lcs_len(&a, &b)
}

/// Turn a distance over `lensum` characters into a 0–100 similarity.
fn normalized_similarity(distance: usize, lensum: usize) -> f64 {
    if lensum == 0 {
        return 100.0;
    }
    100.0 * (1.0 - distance as f64 / lensum as f64)
}

/// Normalised Indel similarity of two strings. Two empty strings are
/// identical (100).
pub fn ratio(a: &str, b: &str) -> f64 {
    let lensum = a.chars().count() + b.chars().count();
    normalized_similarity(indel_distance(a, b), lensum)
}

/// Token-set similarity of two whitespace-tokenised strings.
///
/// Word order and repeated words are ignored. If the shared token set is
/// non-empty and one side has no extra tokens, the strings score 100.
/// Otherwise the score is the best of comparing the two leftover token
/// sets against each other and comparing each `shared + leftover` string
/// against `shared` alone. Either side being empty scores 0.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_ab: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_ba: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !intersection.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    // BTreeSet iteration is sorted, so the joins are canonical.
    let diff_ab_joined = diff_ab.join(" ");
    let diff_ba_joined = diff_ba.join(" ");
    let ab_len = diff_ab_joined.chars().count();
    let ba_len = diff_ba_joined.chars().count();
    let sect_len = intersection.join(" ").chars().count();
    let separator = usize::from(sect_len > 0);

    let sect_ab_len = sect_len + separator + ab_len;
    let sect_ba_len = sect_len + separator + ba_len;

    let diff_score = normalized_similarity(
        indel_distance(&diff_ab_joined, &diff_ba_joined),
        sect_ab_len + sect_ba_len,
    );
    if sect_len == 0 {
        return diff_score;
    }

    // `shared + leftover` vs `shared` differ only by the leftover suffix.
    let sect_ab_score = normalized_similarity(separator + ab_len, sect_len + sect_ab_len);
    let sect_ba_score = normalized_similarity(separator + ba_len, sect_len + sect_ba_len);

    diff_score.max(sect_ab_score).max(sect_ba_score)
}
