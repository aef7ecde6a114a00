use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, TermId};
use crate::index::forward;
use crate::storage::atomic::write_atomic;
use crate::storage::layout::is_fresh;

/// Per-document inputs the scorer needs without touching disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocStats {
    /// Total token count of the document.
    pub length: u32,
    /// Term id → title frequency, only terms that appear in the title.
    pub title_freqs: HashMap<TermId, u32>,
}

/// Fully resident map of document statistics, persisted as a compact binary
/// cache and rebuilt from the forward index when missing or stale.
#[derive(Debug, Default)]
pub struct DocStatsCache {
    docs: HashMap<DocId, DocStats>,
}

impl DocStatsCache {
    pub fn empty() -> Self {
        DocStatsCache::default()
    }

    /// Loads the binary cache when it is fresh relative to the forward
    /// index, otherwise rebuilds by scanning the forward index and rewrites
    /// the cache. A missing forward index yields an empty cache with a
    /// warning; lookups then report zero and the scorer is defined for zero
    /// inputs.
    pub fn open(cache_path: &Path, forward_path: &Path) -> Self {
        if cache_path.exists() && is_fresh(cache_path, forward_path) {
            match Self::load_binary(cache_path) {
                Ok(cache) => {
                    info!(documents = cache.len(), "doc-stats cache loaded");
                    return cache;
                }
                Err(err) => {
                    warn!("doc-stats cache unreadable: {}; rebuilding", err);
                }
            }
        }

        if !forward_path.exists() {
            warn!(
                "no forward index at {}; doc-stats cache starts empty",
                forward_path.display()
            );
            return DocStatsCache::empty();
        }

        let mut cache = DocStatsCache::empty();
        let scanned = forward::scan(forward_path, |doc_id, data| {
            cache.docs.insert(doc_id, doc_stats_from_forward(&data));
        });
        if let Err(err) = scanned {
            warn!("forward index scan failed: {}; doc-stats cache starts empty", err);
            return DocStatsCache::empty();
        }

        if let Err(err) = cache.save_binary(cache_path) {
            warn!("could not write doc-stats cache: {}", err);
        }
        info!(documents = cache.len(), "doc-stats cache rebuilt from forward index");
        cache
    }

    pub fn length(&self, doc_id: DocId) -> u32 {
        self.docs.get(&doc_id).map(|s| s.length).unwrap_or(0)
    }

    pub fn title_freq(&self, doc_id: DocId, term_id: TermId) -> u32 {
        self.docs
            .get(&doc_id)
            .and_then(|s| s.title_freqs.get(&term_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn insert(&mut self, doc_id: DocId, stats: DocStats) {
        self.docs.insert(doc_id, stats);
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn max_doc_id(&self) -> Option<DocId> {
        self.docs.keys().copied().max()
    }

    /// Binary layout (little-endian): `u32 n`, then per document
    /// `i32 doc_id, i32 length, u32 m`, then `m × (i32 term_id, i32 freq)`.
    pub fn load_binary(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let mut cursor = Cursor::new(&bytes);

        let count = cursor.read_u32()?;
        let mut docs = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let doc_id = cursor.read_i32()?;
            let length = cursor.read_i32()?;
            let term_count = cursor.read_u32()?;
            let mut title_freqs = HashMap::with_capacity(term_count as usize);
            for _ in 0..term_count {
                let term_id = cursor.read_i32()?;
                let freq = cursor.read_i32()?;
                title_freqs.insert(term_id as TermId, freq as u32);
            }
            docs.insert(
                doc_id as DocId,
                DocStats {
                    length: length as u32,
                    title_freqs,
                },
            );
        }
        Ok(DocStatsCache { docs })
    }

    pub fn save_binary(&self, path: &Path) -> Result<()> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.docs.len() as u32).to_le_bytes());
        for (doc_id, stats) in &self.docs {
            bytes.extend_from_slice(&(*doc_id as i32).to_le_bytes());
            bytes.extend_from_slice(&(stats.length as i32).to_le_bytes());
            bytes.extend_from_slice(&(stats.title_freqs.len() as u32).to_le_bytes());
            for (term_id, freq) in &stats.title_freqs {
                bytes.extend_from_slice(&(*term_id as i32).to_le_bytes());
                bytes.extend_from_slice(&(*freq as i32).to_le_bytes());
            }
        }
        write_atomic(path, &bytes)
    }
}

fn doc_stats_from_forward(data: &forward::ForwardDocData) -> DocStats {
    let mut title_freqs = HashMap::new();
    for (key, stats) in &data.words {
        if stats.title_frequency > 0 {
            if let Ok(term_id) = key.parse::<TermId>() {
                title_freqs.insert(term_id, stats.title_frequency);
            }
        }
    }
    DocStats {
        length: data.doc_length,
        title_freqs,
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(n).ok_or_else(truncated)?;
        if end > self.bytes.len() {
            return Err(truncated());
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

fn truncated() -> Error {
    Error::new(ErrorKind::Parse, "doc-stats cache truncated")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::WordStats;
    use crate::index::forward::{ForwardDocData, ForwardLine, ForwardWordStats};
    use std::collections::BTreeMap;

    fn sample() -> DocStatsCache {
        let mut cache = DocStatsCache::empty();
        cache.insert(
            0,
            DocStats {
                length: 42,
                title_freqs: HashMap::from([(3, 2), (7, 1)]),
            },
        );
        cache.insert(5, DocStats { length: 7, title_freqs: HashMap::new() });
        cache
    }

    #[test]
    fn binary_round_trip_reconstructs_identical_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_stats.bin");
        let cache = sample();
        cache.save_binary(&path).unwrap();

        let loaded = DocStatsCache::load_binary(&path).unwrap();
        assert_eq!(loaded.docs, cache.docs);
    }

    #[test]
    fn truncated_binary_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_stats.bin");
        sample().save_binary(&path).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(DocStatsCache::load_binary(&path).is_err());
    }

    #[test]
    fn missing_forward_index_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocStatsCache::open(
            &dir.path().join("doc_stats.bin"),
            &dir.path().join("forward_index.jsonl"),
        );
        assert!(cache.is_empty());
        assert_eq!(cache.length(0), 0);
        assert_eq!(cache.title_freq(0, 1), 0);
    }

    #[test]
    fn rebuild_from_forward_index_and_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("doc_stats.bin");
        let forward_path = dir.path().join("forward_index.jsonl");

        let stats = WordStats {
            title_frequency: 2,
            body_frequency: 3,
            title_positions: vec![0, 1],
            body_positions: vec![4, 6, 9],
        };
        let mut words = BTreeMap::new();
        words.insert("11".to_string(), ForwardWordStats::from(&stats));
        let data = ForwardDocData {
            doc_length: 10,
            title_length: 2,
            body_length: 8,
            words,
        };
        forward::append_lines(&forward_path, &[ForwardLine::new(4, data)]).unwrap();

        let cache = DocStatsCache::open(&cache_path, &forward_path);
        assert_eq!(cache.length(4), 10);
        assert_eq!(cache.title_freq(4, 11), 2);
        assert!(cache_path.exists());

        // Second open takes the binary path and sees the same data.
        let again = DocStatsCache::open(&cache_path, &forward_path);
        assert_eq!(again.docs, cache.docs);
    }
}
