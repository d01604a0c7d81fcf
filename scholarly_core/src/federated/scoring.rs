//! Relevance signals computed by the aggregator.

use super::SearchResult;
use chrono::{DateTime, Utc};

/// Score assigned when a signal's input is missing.
const NEUTRAL_SCORE: f32 = 0.5;

/// Newer papers score higher, stepping down by age in years.
pub fn recency_score(published: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f32 {
    let Some(published) = published else {
        return NEUTRAL_SCORE;
    };
    let years = (now - published).num_days() as f32 / 365.25;
    match years {
        y if y < 1.0 => 1.0,
        y if y < 2.0 => 0.8,
        y if y < 5.0 => 0.6,
        y if y < 10.0 => 0.4,
        _ => 0.2,
    }
}

pub fn citation_score(citations: Option<u64>) -> f32 {
    match citations {
        None => NEUTRAL_SCORE,
        Some(c) if c >= 1000 => 1.0,
        Some(c) if c >= 100 => 0.8,
        Some(c) if c >= 10 => 0.6,
        Some(c) if c >= 1 => 0.4,
        Some(_) => 0.2,
    }
}

/// Fill in citation, recency and combined relevance scores.
pub fn apply_scores(results: &mut [SearchResult], now: DateTime<Utc>) {
    for result in results.iter_mut() {
        result.citation_score = citation_score(result.citation_count);
        result.recency_score = recency_score(result.publication_date, now);
        result.relevance_score = match result.semantic_score {
            Some(semantic) => (semantic + result.citation_score + result.recency_score) / 3.0,
            None => (result.citation_score + result.recency_score) / 2.0,
        };
    }
}

/// Newest first; undated results sort last.
pub fn sort_by_date_desc(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.publication_date.cmp(&a.publication_date));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federated::AccessInfo;
    use chrono::{Duration, TimeZone};

    #[test]
    fn recency_steps() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(recency_score(Some(now - Duration::days(100)), now), 1.0);
        assert_eq!(recency_score(Some(now - Duration::days(500)), now), 0.8);
        assert_eq!(recency_score(Some(now - Duration::days(365 * 4)), now), 0.6);
        assert_eq!(recency_score(Some(now - Duration::days(365 * 8)), now), 0.4);
        assert_eq!(recency_score(Some(now - Duration::days(365 * 30)), now), 0.2);
        assert_eq!(recency_score(None, now), 0.5);
    }

    #[test]
    fn citation_steps() {
        assert_eq!(citation_score(Some(5000)), 1.0);
        assert_eq!(citation_score(Some(150)), 0.8);
        assert_eq!(citation_score(Some(10)), 0.6);
        assert_eq!(citation_score(Some(1)), 0.4);
        assert_eq!(citation_score(Some(0)), 0.2);
        assert_eq!(citation_score(None), 0.5);
    }

    #[test]
    fn undated_results_sort_last() {
        let dated = |id: &str, y: i32| {
            SearchResult::new(id, id, "t", AccessInfo::restricted())
                .with_publication_date(Some(Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()))
        };
        let mut results = vec![
            SearchResult::new("none", "none", "t", AccessInfo::restricted()),
            dated("old", 2001),
            dated("new", 2024),
        ];
        sort_by_date_desc(&mut results);
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "none"]);
    }
}
