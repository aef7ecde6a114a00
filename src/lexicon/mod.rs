pub mod lexicon;
pub mod prefix;

use std::collections::HashSet;
use std::path::Path;

use tracing::warn;

use crate::analysis::stopwords::StopWordList;
use crate::analysis::tokenizer::is_survivor;
use crate::core::error::Result;
use crate::core::types::TermId;
pub use lexicon::Lexicon;
pub use prefix::PrefixIndex;

/// Lexicon plus its prefix-completion structure and stop-word set. The
/// engine keeps one instance behind a reader/writer lock: lookups and
/// completions take read locks, batch extension the write lock, so a reader
/// always sees a term set and completion structure that agree.
pub struct LexiconIndex {
    lexicon: Lexicon,
    prefix: PrefixIndex,
    stop_words: StopWordList,
}

impl LexiconIndex {
    pub fn new(stop_words: StopWordList) -> Self {
        LexiconIndex {
            lexicon: Lexicon::new(),
            prefix: PrefixIndex::empty(),
            stop_words,
        }
    }

    pub fn from_lexicon(lexicon: Lexicon, stop_words: StopWordList) -> Result<Self> {
        let prefix = build_prefix(&lexicon)?;
        Ok(LexiconIndex {
            lexicon,
            prefix,
            stop_words,
        })
    }

    /// Loads the persisted lexicon, degrading to empty on missing/corrupt
    /// files.
    pub fn load(path: &Path, stop_words: StopWordList) -> Self {
        let lexicon = Lexicon::load(path);
        let prefix = match build_prefix(&lexicon) {
            Ok(prefix) => prefix,
            Err(err) => {
                warn!("prefix index build failed: {}; completions disabled", err);
                PrefixIndex::empty()
            }
        };
        LexiconIndex {
            lexicon,
            prefix,
            stop_words,
        }
    }

    pub fn len(&self) -> usize {
        self.lexicon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lexicon.is_empty()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.lexicon.contains(term)
    }

    pub fn index_of(&self, term: &str) -> Option<TermId> {
        self.lexicon.index_of(term)
    }

    pub fn term_of(&self, id: TermId) -> Option<&str> {
        self.lexicon.term_of(id)
    }

    pub fn complete(&self, prefix: &str, k: usize) -> Vec<String> {
        self.prefix.complete(prefix, k)
    }

    /// Appends every unseen survivor token with ids `len, len+1, …` and
    /// rebuilds the completion structure. Returns the newly assigned ids.
    /// Must be called under the engine's write lock.
    pub fn extend_with_tokens(&mut self, tokens: &[String]) -> Result<Vec<TermId>> {
        let mut fresh: HashSet<String> = HashSet::new();
        for token in tokens {
            let lowered = token.to_lowercase();
            if !is_survivor(&lowered, &self.stop_words) || self.lexicon.contains(&lowered) {
                continue;
            }
            fresh.insert(lowered);
        }
        if fresh.is_empty() {
            return Ok(Vec::new());
        }

        let mut fresh: Vec<String> = fresh.into_iter().collect();
        fresh.sort();
        let added: Vec<TermId> = fresh
            .into_iter()
            .map(|term| self.lexicon.push_term(term))
            .collect();

        self.prefix = build_prefix(&self.lexicon)?;
        Ok(added)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        self.lexicon.to_json()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.lexicon.save(path)
    }
}

fn build_prefix(lexicon: &Lexicon) -> Result<PrefixIndex> {
    PrefixIndex::build(
        lexicon
            .terms()
            .iter()
            .enumerate()
            .map(|(id, term)| (term.as_str(), id as u64)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(terms: &[&str]) -> LexiconIndex {
        let lexicon = Lexicon::from_terms(terms.iter().map(|t| t.to_string()).collect());
        LexiconIndex::from_lexicon(lexicon, StopWordList::default_set()).unwrap()
    }

    #[test]
    fn extension_appends_fresh_ids_and_updates_completions() {
        let mut index = index_with(&["machine", "system"]);
        let added = index
            .extend_with_tokens(&[
                "machine".to_string(),  // already known
                "learning".to_string(), // fresh survivor
                "the".to_string(),      // stop word
                "ml".to_string(),       // too short
                "42".to_string(),       // numeric
            ])
            .unwrap();

        assert_eq!(added, vec![2]);
        assert_eq!(index.index_of("learning"), Some(2));
        assert_eq!(index.complete("le", 10), vec!["learning"]);
        // Existing ids are untouched.
        assert_eq!(index.index_of("machine"), Some(0));
        assert_eq!(index.index_of("system"), Some(1));
    }

    #[test]
    fn extension_with_no_survivors_is_a_noop() {
        let mut index = index_with(&["machine"]);
        let added = index
            .extend_with_tokens(&["the".to_string(), "machine".to_string()])
            .unwrap();
        assert!(added.is_empty());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn duplicate_fresh_tokens_get_one_id() {
        let mut index = index_with(&[]);
        let added = index
            .extend_with_tokens(&["neural".to_string(), "Neural".to_string()])
            .unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(index.len(), 1);
    }
}
