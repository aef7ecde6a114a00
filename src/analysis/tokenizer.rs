use regex::Regex;

use crate::analysis::stopwords::StopWordList;
use crate::core::error::{Error, ErrorKind, Result};

/// Normalizes raw text into the token form the lexicon stores: lowercase,
/// non-alphanumeric runs collapsed to single spaces, split on whitespace.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    non_alnum: Regex,
}

impl Tokenizer {
    pub fn new() -> Result<Self> {
        let non_alnum = Regex::new(r"[^a-z0-9]+")
            .map_err(|e| Error::new(ErrorKind::Internal, format!("tokenizer pattern: {}", e)))?;
        Ok(Tokenizer { non_alnum })
    }

    pub fn normalize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.non_alnum
            .replace_all(&lowered, " ")
            .split_whitespace()
            .map(|t| t.to_string())
            .collect()
    }
}

/// Whether a (lowercased) token can enter the lexicon: at least three
/// characters, not a stop word, not wholly numeric.
pub fn is_survivor(token: &str, stop_words: &StopWordList) -> bool {
    if token.len() < 3 {
        return false;
    }
    if stop_words.contains(token) {
        return false;
    }
    if token.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_punctuation_runs() {
        let tokenizer = Tokenizer::new().unwrap();
        assert_eq!(
            tokenizer.normalize("Deep--Learning, for (IR)!"),
            vec!["deep", "learning", "for", "ir"]
        );
    }

    #[test]
    fn normalization_of_empty_input_is_empty() {
        let tokenizer = Tokenizer::new().unwrap();
        assert!(tokenizer.normalize("  ??! ").is_empty());
        assert!(tokenizer.normalize("").is_empty());
    }

    #[test]
    fn survivor_filter() {
        let stops = StopWordList::default_set();
        assert!(is_survivor("neural", &stops));
        assert!(is_survivor("fox", &stops));
        assert!(!is_survivor("ml", &stops)); // too short
        assert!(!is_survivor("the", &stops)); // stop word
        assert!(!is_survivor("2024", &stops)); // wholly numeric
        assert!(is_survivor("3d2", &stops)); // digits mixed with letters pass
    }
}
