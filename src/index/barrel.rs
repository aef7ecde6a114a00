use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::TermId;
use crate::index::posting::{read_posting_file, write_posting_file_atomic, Posting, PostingMap};
use crate::storage::layout::StorageLayout;

/// Sharded on-disk inverted index. Shard files decode on first access and
/// stay in a bounded LRU cache; the cache never exceeds its capacity after
/// any operation. The shard files are read-only except during a delta
/// merge.
pub struct BarrelStore {
    layout: Arc<StorageLayout>,
    num_barrels: u32,
    cache: Mutex<LruCache<u32, Arc<PostingMap>>>,
}

impl BarrelStore {
    pub fn new(layout: Arc<StorageLayout>, num_barrels: u32, cache_limit: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(cache_limit.max(1)).ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument, "barrel cache limit must be positive")
        })?;
        if num_barrels == 0 {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "barrel count must be positive",
            ));
        }
        Ok(BarrelStore {
            layout,
            num_barrels,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn shard_of(&self, term_id: TermId) -> u32 {
        term_id % self.num_barrels
    }

    /// The main-tier posting list for a term; empty when the shard file or
    /// the term is absent.
    pub fn main_postings(&self, term_id: TermId) -> Vec<Posting> {
        let shard = self.shard_of(term_id);
        self.shard_map(shard)
            .get(&term_id)
            .cloned()
            .unwrap_or_default()
    }

    fn shard_map(&self, shard: u32) -> Arc<PostingMap> {
        let mut cache = self.cache.lock();
        if let Some(map) = cache.get(&shard) {
            return Arc::clone(map);
        }
        // Decode under the lock: shards are few and decoded once.
        let path = self.layout.barrel_path(shard);
        let map = match read_posting_file(&path) {
            Ok(map) => map,
            Err(err) => {
                warn!("barrel {} unreadable: {}; treating as empty", shard, err);
                PostingMap::new()
            }
        };
        let map = Arc::new(map);
        cache.put(shard, Arc::clone(&map));
        map
    }

    /// Moves delta postings into their residue-class shards. Each affected
    /// shard is loaded, append-merged, rewritten atomically, and dropped
    /// from the cache. A `(term, doc)` pair already present in the main
    /// tier means the no-duplicates invariant was broken upstream; the
    /// conflicting entry is skipped with a warning rather than crashing.
    pub fn merge_delta(&self, delta: PostingMap) -> Result<()> {
        if delta.is_empty() {
            return Ok(());
        }

        let mut by_shard: HashMap<u32, Vec<(TermId, Vec<Posting>)>> = HashMap::new();
        for (term_id, postings) in delta {
            by_shard
                .entry(self.shard_of(term_id))
                .or_default()
                .push((term_id, postings));
        }

        let shard_count = by_shard.len();
        for (shard, terms) in by_shard {
            let path = self.layout.barrel_path(shard);
            let mut main = read_posting_file(&path)?;
            for (term_id, postings) in terms {
                let list = main.entry(term_id).or_default();
                for posting in postings {
                    if list.iter().any(|p| p.doc_id == posting.doc_id) {
                        warn!(
                            term_id,
                            doc_id = posting.doc_id,
                            "posting already in main barrel, skipping delta copy"
                        );
                        continue;
                    }
                    list.push(posting);
                }
            }
            write_posting_file_atomic(&path, &main)?;
            self.invalidate(shard);
        }
        info!(shards = shard_count, "delta merged into main barrels");
        Ok(())
    }

    pub fn invalidate(&self, shard: u32) {
        self.cache.lock().pop(&shard);
    }

    pub fn cached_shards(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &std::path::Path, cache_limit: usize) -> BarrelStore {
        let layout = Arc::new(StorageLayout::new(dir).unwrap());
        BarrelStore::new(layout, 100, cache_limit).unwrap()
    }

    fn posting(doc_id: u32, wf: u32) -> Posting {
        Posting { doc_id, weighted_frequency: wf, positions: vec![0] }
    }

    #[test]
    fn cache_never_exceeds_its_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 2);
        for term_id in 0..10 {
            let _ = store.main_postings(term_id); // ten distinct shards
            assert!(store.cached_shards() <= 2);
        }
    }

    #[test]
    fn missing_shard_gives_empty_postings() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 4);
        assert!(store.main_postings(42).is_empty());
    }

    #[test]
    fn merge_moves_postings_into_residue_shards() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 4);

        let mut delta = PostingMap::new();
        delta.insert(5, vec![posting(1, 2)]);
        delta.insert(105, vec![posting(2, 3)]); // same shard as 5
        delta.insert(7, vec![posting(1, 1)]);
        store.merge_delta(delta).unwrap();

        assert_eq!(store.main_postings(5), vec![posting(1, 2)]);
        assert_eq!(store.main_postings(105), vec![posting(2, 3)]);
        assert_eq!(store.main_postings(7), vec![posting(1, 1)]);
    }

    #[test]
    fn merge_of_empty_delta_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 4);
        store.merge_delta(PostingMap::new()).unwrap();
        assert_eq!(std::fs::read_dir(&store.layout.barrels_dir).unwrap().count(), 0);
    }

    #[test]
    fn merge_skips_duplicate_doc_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 4);

        let mut first = PostingMap::new();
        first.insert(9, vec![posting(4, 2)]);
        store.merge_delta(first).unwrap();

        // A second merge carrying the same (term, doc) must not duplicate it.
        let mut second = PostingMap::new();
        second.insert(9, vec![posting(4, 9), posting(5, 1)]);
        store.merge_delta(second).unwrap();

        let merged = store.main_postings(9);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], posting(4, 2));
        assert_eq!(merged[1], posting(5, 1));
    }
}
