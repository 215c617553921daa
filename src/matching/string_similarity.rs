//! Token-aware name similarity.

use std::collections::BTreeSet;

/// Highest score a pair with differing token sets can reach.
const NON_IDENTICAL_CEILING: f64 = 0.99;

/// Split a name into lower-case tokens on `/`, `-`, `_` and `.`.
///
/// Leading `@` (npm scopes) is dropped so `@babel/core` and `babel-core`
/// produce the same tokens.
#[must_use]
pub fn tokenize(name: &str) -> BTreeSet<String> {
    name.split(['/', '-', '_', '.'])
        .map(|t| t.trim().trim_start_matches('@').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Jaccard index of two token sets.
#[must_use]
pub fn compute_token_similarity(tokens_a: &BTreeSet<String>, tokens_b: &BTreeSet<String>) -> f64 {
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    let intersection = tokens_a.intersection(tokens_b).count();
    let union = tokens_a.union(tokens_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Name similarity in `[0, 1]`.
///
/// 1.0 only when the token sets are equal. Otherwise a blend of normalized
/// edit distance over the sorted tokens and token-set overlap, kept strictly
/// below 1.0. Symmetric in its arguments.
#[must_use]
pub fn name_similarity(name_a: &str, name_b: &str) -> f64 {
    let tokens_a = tokenize(name_a);
    let tokens_b = tokenize(name_b);
    if tokens_a == tokens_b {
        return 1.0;
    }

    let joined_a = tokens_a.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
    let joined_b = tokens_b.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
    let edit = strsim::normalized_levenshtein(&joined_a, &joined_b);
    let overlap = compute_token_similarity(&tokens_a, &tokens_b);

    edit.mul_add(0.6, overlap * 0.4)
        .clamp(0.0, NON_IDENTICAL_CEILING)
}
