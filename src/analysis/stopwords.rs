use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::core::error::{Error, ErrorKind, Result};

/// Words excluded from the lexicon regardless of frequency.
#[derive(Debug, Clone)]
pub struct StopWordList {
    words: HashSet<String>,
}

const DEFAULT_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "be", "have", "has", "had", "do", "does", "did",
    "will", "would", "should", "could", "may", "might", "must", "can", "this", "that", "these",
    "those", "i", "you", "he", "she", "it", "we", "they", "what", "which", "who", "when",
    "where", "why", "how", "all", "each", "every", "both", "few", "more", "most", "other",
    "some", "such", "no", "not", "only", "own", "same", "so", "than", "too", "very", "now",
    "then", "there", "their", "them", "through", "under", "until", "up", "use", "using", "via",
    "year", "years", "your", "yours",
];

impl StopWordList {
    pub fn new(words: impl IntoIterator<Item = String>) -> Self {
        StopWordList {
            words: words.into_iter().collect(),
        }
    }

    /// Built-in English defaults.
    pub fn default_set() -> Self {
        StopWordList::new(DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()))
    }

    /// One word per line, case-folded, blank lines skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::new(
                ErrorKind::NotFound,
                format!("stop-word file {}: {}", path.display(), e),
            )
        })?;
        let words = text
            .lines()
            .map(|line| line.trim().to_lowercase())
            .filter(|line| !line.is_empty())
            .collect::<HashSet<_>>();
        Ok(StopWordList { words })
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for StopWordList {
    fn default() -> Self {
        StopWordList::default_set()
    }
}
