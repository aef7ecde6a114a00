use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::analysis::tokenizer::Tokenizer;
use crate::core::types::{DocId, TermId};
use crate::index::barrel::BarrelStore;
use crate::index::delta::DeltaStore;
use crate::index::doc_stats::DocStatsCache;
use crate::lexicon::LexiconIndex;
use crate::meta::metadata::MetadataStore;
use crate::meta::url_map::UrlMap;
use crate::scoring::scorer::RankingScorer;
use crate::scoring::semantic::SemanticScorer;
use crate::search::results::{rank_top_k, RankedDoc, SearchHit, SearchResults};

/// Added once per document for each pair of consecutive query terms
/// occurring at adjacent positions.
const PROXIMITY_BONUS: f64 = 100.0;

/// Executes one query against the shared read structures: tokenize, resolve
/// term ids, fan out over main barrels and the delta, accumulate per-doc
/// scores, AND-intersect, apply the proximity bonus, optionally blend the
/// dense signal, and rank. Stateless per query aside from the borrowed
/// caches.
pub struct SearchCoordinator {
    lexicon: Arc<RwLock<LexiconIndex>>,
    barrels: Arc<BarrelStore>,
    delta: Arc<DeltaStore>,
    doc_stats: Arc<RwLock<DocStatsCache>>,
    metadata: Arc<RwLock<MetadataStore>>,
    url_map: Arc<RwLock<UrlMap>>,
    semantic: Option<Arc<SemanticScorer>>,
    scorer: RankingScorer,
    tokenizer: Tokenizer,
    top_k: usize,
    semantic_weight: f64,
}

struct Candidate {
    score: f64,
    matched: usize,
    /// Index = position of the recognized token in the query; value = the
    /// term's positions in this document.
    positions: Vec<Option<Vec<u32>>>,
}

#[allow(clippy::too_many_arguments)]
impl SearchCoordinator {
    pub fn new(
        lexicon: Arc<RwLock<LexiconIndex>>,
        barrels: Arc<BarrelStore>,
        delta: Arc<DeltaStore>,
        doc_stats: Arc<RwLock<DocStatsCache>>,
        metadata: Arc<RwLock<MetadataStore>>,
        url_map: Arc<RwLock<UrlMap>>,
        semantic: Option<Arc<SemanticScorer>>,
        scorer: RankingScorer,
        tokenizer: Tokenizer,
        top_k: usize,
        semantic_weight: f64,
    ) -> Self {
        SearchCoordinator {
            lexicon,
            barrels,
            delta,
            doc_stats,
            metadata,
            url_map,
            semantic,
            scorer,
            tokenizer,
            top_k,
            semantic_weight,
        }
    }

    pub fn search(&self, raw_query: &str) -> SearchResults {
        let tokens = self.tokenizer.normalize(raw_query);
        if tokens.is_empty() {
            return SearchResults::empty(raw_query);
        }

        // Resolve term ids, discarding tokens the lexicon does not know.
        let term_ids: Vec<TermId> = {
            let lexicon = self.lexicon.read();
            tokens
                .iter()
                .filter_map(|token| lexicon.index_of(token))
                .collect()
        };
        let recognized = term_ids.len();
        if recognized == 0 {
            return SearchResults::empty(raw_query);
        }

        let mut candidates: HashMap<DocId, Candidate> = HashMap::new();
        {
            let stats = self.doc_stats.read();
            let metadata = self.metadata.read();
            for (token_index, &term_id) in term_ids.iter().enumerate() {
                // Main and delta tiers hold disjoint (term, doc) pairs, so
                // plain concatenation needs no deduplication.
                let mut postings = self.barrels.main_postings(term_id);
                postings.extend(self.delta.snapshot_for(term_id));

                for posting in postings {
                    let candidate =
                        candidates.entry(posting.doc_id).or_insert_with(|| Candidate {
                            score: 0.0,
                            matched: 0,
                            positions: vec![None; recognized],
                        });
                    let components = self.scorer.score_term(
                        posting.weighted_frequency,
                        stats.title_freq(posting.doc_id, term_id),
                        &posting.positions,
                        stats.length(posting.doc_id),
                        metadata.get(posting.doc_id),
                    );
                    candidate.score += components.final_score;
                    candidate.matched += 1;
                    candidate.positions[token_index] = Some(posting.positions);
                }
            }
        }

        // AND semantics: a document must contain every recognized term.
        candidates.retain(|_, candidate| candidate.matched == recognized);
        if candidates.is_empty() {
            return SearchResults::empty(raw_query);
        }

        for candidate in candidates.values_mut() {
            candidate.score += proximity_bonus(&candidate.positions);
        }

        self.blend_semantic(&tokens, &mut candidates);

        let (ranked, hits) = {
            let metadata = self.metadata.read();
            let ranked: Vec<RankedDoc> = candidates
                .iter()
                .map(|(&doc_id, candidate)| RankedDoc {
                    doc_id,
                    score: candidate.score,
                    publication_year: metadata.publication_year(doc_id),
                    cited_by_count: metadata.cited_by_count(doc_id),
                })
                .collect();
            let top = rank_top_k(ranked, self.top_k);

            let urls = self.url_map.read();
            let hits: Vec<SearchHit> = top
                .iter()
                .map(|doc| {
                    let record = metadata.get(doc.doc_id);
                    SearchHit {
                        doc_id: doc.doc_id,
                        score: doc.score,
                        url: urls
                            .get(doc.doc_id)
                            .map(str::to_string)
                            .or_else(|| record.map(|m| m.url.clone()))
                            .unwrap_or_default(),
                        title: metadata.display_title(doc.doc_id),
                        publication_year: record
                            .map(|m| m.publication_year)
                            .filter(|&year| year > 0),
                        cited_by_count: record.map(|m| m.cited_by_count),
                    }
                })
                .collect();
            (top, hits)
        };
        debug!(
            query = raw_query,
            recognized,
            candidates = candidates.len(),
            returned = ranked.len(),
            "query executed"
        );

        SearchResults {
            query: raw_query.to_string(),
            results: hits,
        }
    }

    /// Blends the dense signal into the sparse scores: per-document cosine,
    /// min–max normalization of both signals within the result set (a
    /// degenerate range leaves that signal unnormalized), then a weighted
    /// sum.
    fn blend_semantic(&self, tokens: &[String], candidates: &mut HashMap<DocId, Candidate>) {
        let semantic = match &self.semantic {
            Some(semantic) => semantic,
            None => return,
        };
        if candidates.is_empty() {
            return;
        }
        let query_vector = match semantic.query_vector(tokens) {
            Some(vector) => vector,
            None => return,
        };

        let dense: HashMap<DocId, f64> = candidates
            .keys()
            .map(|&doc_id| (doc_id, semantic.similarity(doc_id, &query_vector)))
            .collect();

        let (sparse_min, sparse_max) = min_max(candidates.values().map(|c| c.score));
        let (dense_min, dense_max) = min_max(dense.values().copied());

        for (doc_id, candidate) in candidates.iter_mut() {
            let sparse = min_max_normalize(candidate.score, sparse_min, sparse_max);
            let dense_score = min_max_normalize(dense[doc_id], dense_min, dense_max);
            candidate.score =
                (1.0 - self.semantic_weight) * sparse + self.semantic_weight * dense_score;
        }
    }
}

/// +100 once per adjacent pair: some position of token `k+1` is exactly one
/// past some position of token `k` in this document.
fn proximity_bonus(positions: &[Option<Vec<u32>>]) -> f64 {
    let mut bonus = 0.0;
    for pair in positions.windows(2) {
        if let (Some(first), Some(second)) = (&pair[0], &pair[1]) {
            let first_set: HashSet<u32> = first.iter().copied().collect();
            let adjacent = second
                .iter()
                .any(|&pos| pos > 0 && first_set.contains(&(pos - 1)));
            if adjacent {
                bonus += PROXIMITY_BONUS;
            }
        }
    }
    bonus
}

fn min_max<I: Iterator<Item = f64>>(values: I) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in values {
        min = min.min(value);
        max = max.max(value);
    }
    (min, max)
}

fn min_max_normalize(value: f64, min: f64, max: f64) -> f64 {
    if max > min {
        (value - min) / (max - min)
    } else {
        // Degenerate range: normalization is skipped.
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proximity_requires_adjacent_positions_in_order() {
        let hit = vec![Some(vec![1, 7]), Some(vec![2])];
        assert_eq!(proximity_bonus(&hit), PROXIMITY_BONUS);

        // Reverse adjacency does not count.
        let reversed = vec![Some(vec![2]), Some(vec![1])];
        assert_eq!(proximity_bonus(&reversed), 0.0);

        // Applied once per pair, not per matching offset pair.
        let repeated = vec![Some(vec![1, 5]), Some(vec![2, 6])];
        assert_eq!(proximity_bonus(&repeated), PROXIMITY_BONUS);

        let three = vec![Some(vec![0]), Some(vec![1]), Some(vec![2])];
        assert_eq!(proximity_bonus(&three), 2.0 * PROXIMITY_BONUS);
    }

    #[test]
    fn single_term_has_no_proximity() {
        assert_eq!(proximity_bonus(&[Some(vec![0, 1, 2])]), 0.0);
    }

    #[test]
    fn normalization_skips_degenerate_ranges() {
        assert_eq!(min_max_normalize(3.0, 1.0, 5.0), 0.5);
        assert_eq!(min_max_normalize(3.0, 3.0, 3.0), 3.0);
    }
}
