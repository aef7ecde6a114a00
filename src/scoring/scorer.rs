use crate::core::error::{Error, ErrorKind, Result};
use crate::meta::metadata::DocMetadata;

/// Weights of the sparse ranking components. Must be non-negative; they are
/// not required to sum to one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub frequency: f64,
    pub position: f64,
    pub title: f64,
    pub metadata: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            frequency: 0.4,
            position: 0.2,
            title: 0.3,
            metadata: 0.1,
        }
    }
}

impl ScoreWeights {
    pub fn validate(&self) -> Result<()> {
        let all = [self.frequency, self.position, self.title, self.metadata];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "score weights must be non-negative",
            ));
        }
        Ok(())
    }
}

/// The individual signals behind one (term, document) score.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreComponents {
    pub frequency_score: f64,
    pub position_score: f64,
    pub title_boost: f64,
    pub metadata_score: f64,
    pub date_boost: f64,
    pub final_score: f64,
}

/// Sparse per-(term, document) scorer: log-damped weighted frequency,
/// position weighting, title boost, citation score, recency boost.
#[derive(Debug, Clone)]
pub struct RankingScorer {
    weights: ScoreWeights,
}

impl RankingScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        RankingScorer { weights }
    }

    pub fn weights(&self) -> ScoreWeights {
        self.weights
    }

    /// Scores one term's occurrence in one document. `doc_length == 0`
    /// means the length is unknown and position weighting falls back to
    /// absolute buckets.
    pub fn score_term(
        &self,
        weighted_frequency: u32,
        title_frequency: u32,
        positions: &[u32],
        doc_length: u32,
        metadata: Option<&DocMetadata>,
    ) -> ScoreComponents {
        let frequency_score = Self::frequency_score(weighted_frequency);
        let position_score = Self::position_score(positions, doc_length);
        let title_boost = Self::title_boost(title_frequency);
        let metadata_score = Self::metadata_score(metadata);
        let date_boost = Self::date_boost(metadata.map(|m| m.publication_year).unwrap_or(0));

        let final_score = (frequency_score * self.weights.frequency
            + position_score * self.weights.position
            + title_boost * self.weights.title
            + metadata_score * self.weights.metadata)
            * date_boost;

        ScoreComponents {
            frequency_score,
            position_score,
            title_boost,
            metadata_score,
            date_boost,
            final_score,
        }
    }

    /// `ln(1 + wf)`: diminishing returns for very frequent terms.
    fn frequency_score(weighted_frequency: u32) -> f64 {
        (1.0 + weighted_frequency as f64).ln()
    }

    /// Average positional weight. Relative weighting when the document
    /// length is known: piecewise-linear on `r = position / length`.
    fn position_score(positions: &[u32], doc_length: u32) -> f64 {
        if positions.is_empty() {
            return 0.0;
        }
        if doc_length == 0 {
            return Self::absolute_position_score(positions);
        }

        let length = doc_length as f64;
        let total: f64 = positions
            .iter()
            .map(|&pos| {
                let r = pos as f64 / length;
                if r < 0.1 {
                    1.0 - 10.0 * r
                } else if r < 0.5 {
                    0.2 * (1.0 - 2.5 * (r - 0.1))
                } else if r < 1.0 {
                    0.1 * (1.1 - r)
                } else {
                    0.0
                }
            })
            .sum();
        total / positions.len() as f64
    }

    /// Absolute bucketing when the length is unknown: the first ten
    /// positions weigh most, positions past fifty contribute nothing.
    fn absolute_position_score(positions: &[u32]) -> f64 {
        let total: f64 = positions
            .iter()
            .map(|&pos| {
                if pos < 10 {
                    (10.0 - pos as f64) * 0.1
                } else if pos < 50 {
                    (50.0 - pos as f64) * 0.01
                } else {
                    0.0
                }
            })
            .sum();
        total / positions.len() as f64
    }

    fn title_boost(title_frequency: u32) -> f64 {
        if title_frequency > 0 {
            2.0
        } else {
            1.0
        }
    }

    fn metadata_score(metadata: Option<&DocMetadata>) -> f64 {
        match metadata {
            Some(meta) if meta.cited_by_count > 0 => {
                0.3 * (1.0 + meta.cited_by_count as f64).ln()
            }
            _ => 0.0,
        }
    }

    /// `clamp(1 + 0.01·(year − 2000), 0.5, 2.0)`; neutral when the year is
    /// unknown.
    fn date_boost(publication_year: i32) -> f64 {
        if publication_year <= 0 {
            return 1.0;
        }
        let boost = 1.0 + (publication_year - 2000) as f64 * 0.01;
        boost.clamp(0.5, 2.0)
    }
}

impl Default for RankingScorer {
    fn default() -> Self {
        RankingScorer::new(ScoreWeights::default())
    }
}
