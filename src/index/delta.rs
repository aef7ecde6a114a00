use std::collections::HashSet;
use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::types::{DocId, TermId};
use crate::index::posting::{read_posting_file, Posting, PostingMap};

/// The hot shard: in-memory postings for documents ingested since the last
/// merge. Term ids here may belong to any residue class. Reads snapshot one
/// term's list under the lock; reloads swap the whole map, so a query sees
/// either the pre-flush or post-reload delta, never a mix.
pub struct DeltaStore {
    map: Mutex<PostingMap>,
}

impl DeltaStore {
    pub fn empty() -> Self {
        DeltaStore {
            map: Mutex::new(PostingMap::new()),
        }
    }

    /// Loads the persisted delta file; a parse failure yields an empty delta
    /// with a warning, never a startup failure.
    pub fn load(path: &Path) -> Self {
        DeltaStore {
            map: Mutex::new(read_or_empty(path)),
        }
    }

    /// Cheap copy-on-demand snapshot of one term's postings.
    pub fn snapshot_for(&self, term_id: TermId) -> Vec<Posting> {
        self.map
            .lock()
            .get(&term_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Atomically replaces the in-memory map with the file's current
    /// content. Called by the engine after a flush commits.
    pub fn reload(&self, path: &Path) {
        let fresh = read_or_empty(path);
        debug!(terms = fresh.len(), "delta reloaded");
        *self.map.lock() = fresh;
    }

    /// Empties the in-memory map after a merge into the main barrels.
    pub fn clear(&self) {
        self.map.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    /// Distinct documents currently held by the delta; drives the advisory
    /// merge policy.
    pub fn unique_doc_count(&self) -> usize {
        let map = self.map.lock();
        let mut docs: HashSet<DocId> = HashSet::new();
        for postings in map.values() {
            docs.extend(postings.iter().map(|p| p.doc_id));
        }
        docs.len()
    }
}

fn read_or_empty(path: &Path) -> PostingMap {
    match read_posting_file(path) {
        Ok(map) => map,
        Err(err) => {
            warn!("delta file {} unreadable: {}; starting empty", path.display(), err);
            PostingMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::posting::write_posting_file_atomic;

    #[test]
    fn snapshot_misses_are_empty() {
        let delta = DeltaStore::empty();
        assert!(delta.snapshot_for(9).is_empty());
    }

    #[test]
    fn reload_swaps_in_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inverted_delta.json");

        let mut map = PostingMap::new();
        map.insert(
            2,
            vec![
                Posting { doc_id: 10, weighted_frequency: 1, positions: vec![0] },
                Posting { doc_id: 11, weighted_frequency: 4, positions: vec![2, 5] },
            ],
        );
        write_posting_file_atomic(&path, &map).unwrap();

        let delta = DeltaStore::empty();
        assert!(delta.snapshot_for(2).is_empty());
        delta.reload(&path);
        assert_eq!(delta.snapshot_for(2).len(), 2);
        assert_eq!(delta.unique_doc_count(), 2);
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inverted_delta.json");
        std::fs::write(&path, b"!!").unwrap();
        let delta = DeltaStore::load(&path);
        assert!(delta.is_empty());
    }
}
