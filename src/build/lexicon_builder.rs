use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};

use crate::analysis::stopwords::StopWordList;
use crate::analysis::tokenizer::{is_survivor, Tokenizer};
use crate::build::CorpusDoc;
use crate::core::error::Result;
use crate::lexicon::Lexicon;

/// Offline lexicon build: accumulate document frequencies over the corpus,
/// keep survivors with `min_df ≤ df` and df under the upper-percentile
/// cutoff, sort lexicographically, and assign ids in that order.
pub struct LexiconBuilder {
    min_df: u32,
    max_df_percentile: u32,
    stop_words: StopWordList,
    doc_count: u32,
    doc_frequencies: HashMap<String, u32>,
}

impl LexiconBuilder {
    pub fn new(min_df: u32, max_df_percentile: u32, stop_words: StopWordList) -> Self {
        LexiconBuilder {
            min_df: min_df.max(1),
            max_df_percentile: max_df_percentile.clamp(1, 100),
            stop_words,
            doc_count: 0,
            doc_frequencies: HashMap::new(),
        }
    }

    /// Counts each term once per document.
    pub fn add_document_tokens(&mut self, tokens: &[String]) {
        let mut seen: HashSet<String> = HashSet::new();
        for token in tokens {
            seen.insert(token.to_lowercase());
        }
        for token in seen {
            *self.doc_frequencies.entry(token).or_insert(0) += 1;
        }
        self.doc_count += 1;
    }

    pub fn document_count(&self) -> u32 {
        self.doc_count
    }

    pub fn build(self) -> Lexicon {
        let cutoff = self.percentile_cutoff();

        let mut survivors: Vec<String> = self
            .doc_frequencies
            .into_iter()
            .filter(|(term, df)| {
                if !is_survivor(term, &self.stop_words) {
                    return false;
                }
                if *df < self.min_df {
                    return false;
                }
                match cutoff {
                    Some(cutoff) => *df <= cutoff,
                    None => true,
                }
            })
            .map(|(term, _)| term)
            .collect();
        survivors.sort();

        info!(terms = survivors.len(), documents = self.doc_count, "lexicon built");
        Lexicon::from_terms(survivors)
    }

    /// The df value at the configured upper percentile; terms above it are
    /// excluded. `None` disables the cutoff.
    fn percentile_cutoff(&self) -> Option<u32> {
        if self.max_df_percentile >= 100 || self.doc_frequencies.is_empty() {
            return None;
        }
        let mut frequencies: Vec<u32> = self.doc_frequencies.values().copied().collect();
        frequencies.sort_unstable();
        let keep = ((frequencies.len() * self.max_df_percentile as usize) / 100).max(1);
        Some(frequencies[keep - 1])
    }
}

/// Streams a corpus JSONL file through a builder. Malformed lines are
/// dropped with a warning.
pub fn build_from_corpus(
    corpus_path: &Path,
    min_df: u32,
    max_df_percentile: u32,
    stop_words: StopWordList,
) -> Result<Lexicon> {
    let tokenizer = Tokenizer::new()?;
    let mut builder = LexiconBuilder::new(min_df, max_df_percentile, stop_words);

    let reader = BufReader::new(File::open(corpus_path)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: CorpusDoc = match serde_json::from_str(&line) {
            Ok(doc) => doc,
            Err(err) => {
                warn!("corpus line {} unparseable: {}", line_no + 1, err);
                continue;
            }
        };
        builder.add_document_tokens(&doc.body_tokens(&tokenizer));
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn min_df_and_filters_shape_the_vocabulary() {
        let mut builder = LexiconBuilder::new(2, 100, StopWordList::default_set());
        builder.add_document_tokens(&tokens(&["the", "quick", "brown", "fox"]));
        builder.add_document_tokens(&tokens(&["a", "quick", "brown", "dog"]));
        let lexicon = builder.build();

        // Stop words and df-1 terms are gone; ids follow sorted order.
        assert_eq!(lexicon.terms(), &["brown".to_string(), "quick".to_string()]);
        assert_eq!(lexicon.index_of("brown"), Some(0));
        assert_eq!(lexicon.index_of("quick"), Some(1));
        assert_eq!(lexicon.index_of("fox"), None);
    }

    #[test]
    fn terms_count_once_per_document() {
        let mut builder = LexiconBuilder::new(2, 100, StopWordList::default_set());
        builder.add_document_tokens(&tokens(&["echo", "echo", "echo"]));
        let lexicon = builder.build();
        assert!(lexicon.is_empty()); // df is 1 despite three occurrences
    }

    #[test]
    fn percentile_cutoff_drops_the_most_frequent_terms() {
        let mut builder = LexiconBuilder::new(1, 50, StopWordList::default_set());
        // "common" appears in all four documents, the others in one each.
        builder.add_document_tokens(&tokens(&["common", "alpha"]));
        builder.add_document_tokens(&tokens(&["common", "beta"]));
        builder.add_document_tokens(&tokens(&["common", "gamma"]));
        builder.add_document_tokens(&tokens(&["common", "delta"]));
        let lexicon = builder.build();

        assert!(!lexicon.contains("common"));
        assert!(lexicon.contains("alpha"));
        assert_eq!(lexicon.len(), 4);
    }
}
