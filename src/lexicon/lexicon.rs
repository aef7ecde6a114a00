use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::error::Result;
use crate::core::types::TermId;
use crate::storage::atomic::write_atomic;

/// Canonical term ↔ id bijection. Ids are assigned once and never
/// reordered; online extension appends fresh ids at the end.
#[derive(Debug, Default)]
pub struct Lexicon {
    word_to_index: HashMap<String, TermId>,
    index_to_word: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct LexiconFile {
    word_to_index: HashMap<String, TermId>,
    index_to_word: Vec<String>,
    total_words: usize,
}

impl Lexicon {
    pub fn new() -> Self {
        Lexicon::default()
    }

    /// Builds from terms already sorted and filtered; ids follow slice order.
    pub fn from_terms(terms: Vec<String>) -> Self {
        let word_to_index = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as TermId))
            .collect();
        Lexicon {
            word_to_index,
            index_to_word: terms,
        }
    }

    pub fn len(&self) -> usize {
        self.index_to_word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_to_word.is_empty()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.index_of(term).is_some()
    }

    /// `None` for unknown terms; lookups are never an error.
    pub fn index_of(&self, term: &str) -> Option<TermId> {
        if let Some(&id) = self.word_to_index.get(term) {
            return Some(id);
        }
        let lowered = term.to_lowercase();
        self.word_to_index.get(&lowered).copied()
    }

    pub fn term_of(&self, id: TermId) -> Option<&str> {
        self.index_to_word.get(id as usize).map(|s| s.as_str())
    }

    pub fn terms(&self) -> &[String] {
        &self.index_to_word
    }

    /// Appends a term with the next free id. The caller is responsible for
    /// survivor filtering and deduplication.
    pub fn push_term(&mut self, term: String) -> TermId {
        let id = self.index_to_word.len() as TermId;
        self.word_to_index.insert(term.clone(), id);
        self.index_to_word.push(term);
        id
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let file = LexiconFile {
            word_to_index: self.word_to_index.clone(),
            index_to_word: self.index_to_word.clone(),
            total_words: self.index_to_word.len(),
        };
        Ok(serde_json::to_vec(&file)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_json()?)
    }

    /// Loads the persisted lexicon. Missing or corrupt files yield an empty
    /// lexicon with a warning; the engine must start regardless.
    pub fn load(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => {
                info!("no lexicon at {}, starting empty", path.display());
                return Lexicon::new();
            }
        };
        let file: LexiconFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(err) => {
                warn!("corrupt lexicon {}: {}; starting empty", path.display(), err);
                return Lexicon::new();
            }
        };

        let mut word_to_index = file.word_to_index;
        if word_to_index.is_empty() && !file.index_to_word.is_empty() {
            // Older files carried only the array form.
            word_to_index = file
                .index_to_word
                .iter()
                .enumerate()
                .map(|(i, t)| (t.clone(), i as TermId))
                .collect();
        }
        Lexicon {
            word_to_index,
            index_to_word: file.index_to_word,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_term_order() {
        let lex = Lexicon::from_terms(vec!["brown".into(), "quick".into()]);
        assert_eq!(lex.index_of("brown"), Some(0));
        assert_eq!(lex.index_of("quick"), Some(1));
        assert_eq!(lex.index_of("fox"), None);
        assert_eq!(lex.term_of(1), Some("quick"));
        assert_eq!(lex.term_of(2), None);
    }

    #[test]
    fn lookups_fold_case() {
        let lex = Lexicon::from_terms(vec!["neural".into()]);
        assert_eq!(lex.index_of("Neural"), Some(0));
    }

    #[test]
    fn save_then_load_reconstructs_identical_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.json");
        let lex = Lexicon::from_terms(vec!["alpha".into(), "beta".into(), "gamma".into()]);
        lex.save(&path).unwrap();

        let loaded = Lexicon::load(&path);
        assert_eq!(loaded.len(), 3);
        for term in ["alpha", "beta", "gamma"] {
            assert_eq!(loaded.index_of(term), lex.index_of(term));
            assert_eq!(loaded.term_of(lex.index_of(term).unwrap()), Some(term));
        }
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(Lexicon::load(&path).is_empty());
    }

    #[test]
    fn round_trip_law_holds_for_every_term() {
        let lex = Lexicon::from_terms(vec!["data".into(), "datum".into(), "deep".into()]);
        for term in lex.terms() {
            assert_eq!(lex.term_of(lex.index_of(term).unwrap()), Some(term.as_str()));
        }
    }
}
