//! Token-set similarity for cache keys.
//!
//! Keys are split on whitespace and on the `|` / `,` separators used to
//! compose cache keys, case-folded, and trimmed of surrounding punctuation.
//! The score is the Jaccard index `|A ∩ B| / |A ∪ B|` of the token sets.

use std::collections::HashSet;

/// Tokenize a cache key into a case-folded token set.
pub fn tokenize(key: &str) -> HashSet<String> {
    key.split(|c: char| c.is_whitespace() || c == '|' || c == ',')
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard index of two token sets. Two empty sets score 0.0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / union as f64
}

/// Jaccard similarity of two keys.
pub fn key_similarity(a: &str, b: &str) -> f64 {
    jaccard(&tokenize(a), &tokenize(b))
}

/// Whether `score` reaches `threshold`, tolerating float rounding.
pub fn meets_threshold(score: f64, threshold: f64) -> bool {
    score + 1e-9 >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_keys_score_one() {
        assert_eq!(key_similarity("stomach bloated", "Stomach  BLOATED"), 1.0);
    }

    #[test]
    fn punctuation_is_trimmed() {
        let tokens = tokenize("stomach bloated, feeling full!");
        assert!(tokens.contains("bloated"));
        assert!(tokens.contains("full"));
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn cache_key_separators_split_tokens() {
        let tokens = tokenize("두통|타이레놀,아스피린");
        assert_eq!(tokens.len(), 3);
        assert!(tokens.contains("타이레놀"));
    }

    #[test]
    fn known_values() {
        assert_eq!(key_similarity("a b c d", "a b c d e"), 0.8);
        assert_eq!(key_similarity("a b c", "a b c d"), 0.75);
        assert_eq!(key_similarity("a b", "c d"), 0.0);
    }

    #[test]
    fn empty_keys_never_match() {
        assert_eq!(key_similarity("", ""), 0.0);
        assert_eq!(key_similarity("...", "a"), 0.0);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(meets_threshold(key_similarity("a b c d", "a b c d e"), 0.8));
        assert!(!meets_threshold(key_similarity("a b c", "a b c d"), 0.8));
        // 17/20 lands on the configured default exactly.
        assert!(meets_threshold(17.0 / 20.0, 0.85));
    }
}
