//! Cross-provider duplicate detection.
//!
//! A result's signature is, in priority order: its lower-cased DOI, a hash of
//! the sorted meaningful title words, or a hash of the full lower-cased title.

use super::SearchResult;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Result of collapsing duplicates out of a merged list.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub unique: Vec<SearchResult>,
    pub duplicates_removed: usize,
}

/// Title words that survive stop-word and short-word removal, sorted.
pub fn meaningful_title_words(title: &str) -> BTreeSet<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

pub fn signature(result: &SearchResult) -> String {
    doi_key(result).unwrap_or_else(|| title_key(&result.title))
}

/// Keep the first result for every signature, preserving input order.
///
/// A result carrying a DOI is also checked against the title keys of kept
/// results, so a DOI-less copy and a DOI-bearing copy of the same paper
/// collapse into whichever came first.
pub fn remove_duplicates(results: Vec<SearchResult>) -> DedupOutcome {
    let mut seen = HashSet::with_capacity(results.len() * 2);
    let mut unique = Vec::with_capacity(results.len());
    let mut duplicates_removed = 0;

    for result in results {
        let keys: Vec<String> = doi_key(&result)
            .into_iter()
            .chain(std::iter::once(title_key(&result.title)))
            .collect();

        if keys.iter().any(|k| seen.contains(k)) {
            duplicates_removed += 1;
            continue;
        }
        seen.extend(keys);
        unique.push(result);
    }

    DedupOutcome {
        unique,
        duplicates_removed,
    }
}

fn doi_key(result: &SearchResult) -> Option<String> {
    result
        .doi
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|doi| format!("doi:{}", doi.to_lowercase()))
}

fn title_key(title: &str) -> String {
    let words = meaningful_title_words(title);
    if words.is_empty() {
        return format!("full_title:{}", sha256_hex(&title.trim().to_lowercase()));
    }
    let joined = words.into_iter().collect::<Vec<_>>().join(" ");
    format!("title:{}", sha256_hex(&joined))
}

fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federated::AccessInfo;

    fn result(id: &str, title: &str, doi: Option<&str>) -> SearchResult {
        SearchResult::new(id, title, "test", AccessInfo::restricted())
            .with_doi(doi.map(str::to_string))
    }

    #[test]
    fn doi_match_is_case_insensitive() {
        let outcome = remove_duplicates(vec![
            result("1", "Deep Learning", Some("10.1000/ABC")),
            result("2", "Completely different title", Some("10.1000/abc")),
        ]);
        assert_eq!(outcome.unique.len(), 1);
        assert_eq!(outcome.unique[0].id, "1");
        assert_eq!(outcome.duplicates_removed, 1);
    }

    #[test]
    fn title_words_ignore_order_stop_words_and_short_words() {
        let a = result("a", "The Attention Mechanism in Transformers", None);
        let b = result("b", "Transformers: attention mechanism, of AI", None);
        assert_eq!(signature(&a), signature(&b));

        let c = result("c", "Attention Mechanism in Recurrent Networks", None);
        assert_ne!(signature(&a), signature(&c));
    }

    #[test]
    fn short_titles_fall_back_to_full_title_hash() {
        let a = result("a", "On AI", None);
        assert!(signature(&a).starts_with("full_title:"));
        let b = result("b", "on ai", None);
        assert_eq!(signature(&a), signature(&b));
    }

    #[test]
    fn dedup_is_idempotent() {
        let input = vec![
            result("1", "Sparse attention for long documents", Some("10.1/x")),
            result("2", "Long documents: sparse attention", None),
            result("3", "Sparse Attention for Long Documents", Some("10.1/X")),
            result("4", "Graph neural networks survey", None),
        ];
        let first = remove_duplicates(input.clone());
        let second = remove_duplicates(input);
        assert_eq!(first.unique.len(), second.unique.len());
        assert_eq!(first.unique.len(), 2);
        assert_eq!(first.duplicates_removed, 2);

        let again = remove_duplicates(first.unique.clone());
        assert_eq!(again.unique.len(), first.unique.len());
        assert_eq!(again.duplicates_removed, 0);
    }
}
