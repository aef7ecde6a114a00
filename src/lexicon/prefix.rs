use fst::{IntoStreamer, Map, MapBuilder, Streamer};

use crate::core::error::Result;

/// Ordered prefix-completion structure over the lexicon's terms. Immutable
/// once built; the lexicon rebuilds it under its write lock whenever terms
/// are appended, so readers always observe a complete term set.
pub struct PrefixIndex {
    map: Map<Vec<u8>>,
}

impl PrefixIndex {
    pub fn empty() -> Self {
        PrefixIndex {
            map: Map::default(),
        }
    }

    /// Builds from the lexicon's terms. Extension appends out of order, so
    /// the input is re-sorted here; values carry the term ids.
    pub fn build<'a, I>(terms: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let mut sorted: Vec<(&str, u64)> = terms.into_iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut builder = MapBuilder::memory();
        for (term, id) in sorted {
            builder.insert(term.as_bytes(), id)?;
        }
        Ok(PrefixIndex {
            map: builder.into_map(),
        })
    }

    /// Up to `k` terms starting with `prefix`, in lexicographic order. An
    /// unknown prefix yields an empty list.
    pub fn complete(&self, prefix: &str, k: usize) -> Vec<String> {
        if k == 0 {
            return Vec::new();
        }
        let prefix = prefix.to_lowercase();
        let prefix_bytes = prefix.as_bytes();

        let mut results = Vec::new();
        let mut stream = self.map.range().ge(prefix_bytes).into_stream();
        while let Some((term_bytes, _id)) = stream.next() {
            if !term_bytes.starts_with(prefix_bytes) {
                break;
            }
            if let Ok(term) = String::from_utf8(term_bytes.to_vec()) {
                results.push(term);
            }
            if results.len() >= k {
                break;
            }
        }
        results
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PrefixIndex {
        let terms = ["data", "database", "datum", "deep", "dune"];
        PrefixIndex::build(terms.iter().enumerate().map(|(i, t)| (*t, i as u64))).unwrap()
    }

    #[test]
    fn completions_are_sorted_prefixed_and_bounded() {
        let index = sample();
        assert_eq!(index.complete("da", 3), vec!["data", "database", "datum"]);
        assert_eq!(index.complete("da", 2), vec!["data", "database"]);
        for term in index.complete("d", 10) {
            assert!(term.starts_with('d'));
        }
    }

    #[test]
    fn unknown_prefix_is_empty() {
        let index = sample();
        assert!(index.complete("x", 10).is_empty());
        assert!(index.complete("datb", 10).is_empty());
    }

    #[test]
    fn prefix_is_case_folded() {
        let index = sample();
        assert_eq!(index.complete("DE", 10), vec!["deep"]);
    }

    #[test]
    fn unsorted_input_still_builds() {
        let terms = ["zebra", "alpha", "mid"];
        let index =
            PrefixIndex::build(terms.iter().enumerate().map(|(i, t)| (*t, i as u64))).unwrap();
        assert_eq!(index.complete("", 10), vec!["alpha", "mid", "zebra"]);
    }
}
