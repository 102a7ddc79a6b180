//! Fuzzy identity matcher — decides whether a verification result actually
//! refers to the place we searched for. Token overlap over normalized names,
//! with generic filler words stripped so "St Marys Food Pantry Inc" still
//! matches "St. Mary's Pantry".

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s]").expect("static regex"));

/// Generic and domain filler words that carry no identity signal.
const STOP_WORDS: &[&str] = &[
    "the",
    "and",
    "for",
    "inc",
    "llc",
    "org",
    "food",
    "bank",
    "pantry",
    "shelf",
    "kitchen",
    "meal",
    "meals",
    "community",
    "center",
    "centre",
    "service",
    "services",
    "ministry",
    "ministries",
    "mission",
    "missions",
    "church",
    "charity",
    "charities",
    "outreach",
    "program",
    "programs",
    "county",
    "area",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub is_match: bool,
    pub is_close_match: bool,
    pub ratio: f64,
}

/// Normalize a name and return its identity-bearing tokens: lowercase,
/// strip punctuation, drop tokens of two characters or fewer and stop words.
fn tokens(name: &str) -> HashSet<String> {
    let lowered = name.to_lowercase();
    let cleaned = NON_ALNUM.replace_all(&lowered, "");
    cleaned
        .split_whitespace()
        .filter(|t| t.len() > 2 && !STOP_WORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// Compare a searched name against a found name.
///
/// Ratio is |intersection| / min(|searched|, |found|). A ratio of at least
/// 0.5 is a match; [0.3, 0.5) is a close match that callers may accept when
/// an independent category signal backs it up. If either side has no
/// identity-bearing tokens left we cannot validate — accept.
pub fn match_names(searched: &str, found: &str) -> MatchResult {
    let searched_tokens = tokens(searched);
    let found_tokens = tokens(found);

    if searched_tokens.is_empty() || found_tokens.is_empty() {
        return MatchResult {
            is_match: true,
            is_close_match: false,
            ratio: 1.0,
        };
    }

    let overlap = searched_tokens.intersection(&found_tokens).count();
    let smaller = searched_tokens.len().min(found_tokens.len());
    let ratio = overlap as f64 / smaller as f64;

    MatchResult {
        is_match: ratio >= 0.5,
        is_close_match: (0.3..0.5).contains(&ratio),
        ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn st_marys_variants_match() {
        let result = match_names("St. Mary's Pantry", "St Marys Food Pantry Inc");
        assert!(result.is_match);
        assert!(result.ratio >= 0.5);
    }

    #[test]
    fn unrelated_names_do_not_match() {
        let result = match_names("Hope Harvest Table", "Riverside Auto Repair");
        assert!(!result.is_match);
        assert!(!result.is_close_match);
        assert_eq!(result.ratio, 0.0);
    }

    #[test]
    fn partial_overlap_is_close_match() {
        // {hope, harvest, table} vs {hope, street, shelter}: 1/3
        let result = match_names("Hope Harvest Table", "Hope Street Shelter");
        assert!(!result.is_match);
        assert!(result.is_close_match);
        assert!((result.ratio - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn all_filler_names_cannot_be_validated() {
        // Every token is a stop word or too short — accept
        let result = match_names("The Food Pantry", "Community Food Shelf Inc");
        assert!(result.is_match);
        assert!(!result.is_close_match);
        assert_eq!(result.ratio, 1.0);
    }

    #[test]
    fn punctuation_and_case_are_ignored()  {
        let result = match_names("LOAVES & FISHES", "Loaves and Fishes, Ministry of Hope");
        assert!(result.is_match);
    }

    #[test]
    fn short_tokens_are_dropped() {
        let searched = tokens("St of A Mary");
        assert!(searched.contains("mary"));
        assert_eq!(searched.len(), 1);
    }
}
