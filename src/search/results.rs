use std::cmp::Ordering;

use serde::Serialize;

use crate::core::types::DocId;

/// One ranked search result as serialized to clients.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(rename = "docId")]
    pub doc_id: DocId,
    pub score: f64,
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cited_by_count: Option<u64>,
}

/// Query response: the echoed query plus at most `top_k` hits in rank
/// order.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub results: Vec<SearchHit>,
}

impl SearchResults {
    pub fn empty(query: impl Into<String>) -> Self {
        SearchResults {
            query: query.into(),
            results: Vec::new(),
        }
    }
}

/// Autocomplete response.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestions {
    pub prefix: String,
    pub suggestions: Vec<String>,
}

/// A scored candidate before display fields are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDoc {
    pub doc_id: DocId,
    pub score: f64,
    pub publication_year: i32,
    pub cited_by_count: u64,
}

fn rank_order(a: &RankedDoc, b: &RankedDoc) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.publication_year.cmp(&a.publication_year))
        .then_with(|| b.cited_by_count.cmp(&a.cited_by_count))
        // Deterministic order for fully tied documents.
        .then_with(|| a.doc_id.cmp(&b.doc_id))
}

/// The best `k` candidates in rank order: score descending, ties broken by
/// publication year then citation count. Uses a partial sort when the
/// candidate set exceeds `k`.
pub fn rank_top_k(mut candidates: Vec<RankedDoc>, k: usize) -> Vec<RankedDoc> {
    if k == 0 || candidates.is_empty() {
        return Vec::new();
    }
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, rank_order);
        candidates.truncate(k);
    }
    candidates.sort_by(rank_order);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(doc_id: DocId, score: f64, year: i32, citations: u64) -> RankedDoc {
        RankedDoc {
            doc_id,
            score,
            publication_year: year,
            cited_by_count: citations,
        }
    }

    #[test]
    fn scores_sort_descending() {
        let ranked = rank_top_k(
            vec![doc(0, 1.0, 0, 0), doc(1, 3.0, 0, 0), doc(2, 2.0, 0, 0)],
            10,
        );
        let ids: Vec<DocId> = ranked.iter().map(|d| d.doc_id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn ties_break_by_year_then_citations_then_doc_id() {
        let ranked = rank_top_k(
            vec![
                doc(5, 1.0, 2010, 50),
                doc(3, 1.0, 2020, 1),
                doc(4, 1.0, 2010, 80),
                doc(1, 1.0, 2010, 80),
            ],
            10,
        );
        let ids: Vec<DocId> = ranked.iter().map(|d| d.doc_id).collect();
        assert_eq!(ids, vec![3, 1, 4, 5]);
    }

    #[test]
    fn partial_sort_keeps_the_best_k() {
        let candidates: Vec<RankedDoc> =
            (0..200).map(|i| doc(i, i as f64, 0, 0)).collect();
        let ranked = rank_top_k(candidates, 50);
        assert_eq!(ranked.len(), 50);
        assert_eq!(ranked[0].doc_id, 199);
        assert_eq!(ranked[49].doc_id, 150);
    }

    #[test]
    fn hit_serialization_shape() {
        let hit = SearchHit {
            doc_id: 7,
            score: 1.5,
            url: "uploaded://x.pdf".to_string(),
            title: "X".to_string(),
            publication_year: Some(2021),
            cited_by_count: None,
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["docId"], 7);
        assert_eq!(json["publication_year"], 2021);
        assert!(json.get("cited_by_count").is_none());
    }
}
