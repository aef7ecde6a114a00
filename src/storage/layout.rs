use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::Result;
use crate::core::types::DocId;

/// Directory structure for index and scratch files under the data dir.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub data_dir: PathBuf,
    pub processed_dir: PathBuf, // lexicon, forward index, metadata, caches
    pub barrels_dir: PathBuf,   // inverted barrel shards + delta
    pub temp_json_dir: PathBuf, // extractor output scratch
    pub temp_pdfs_dir: PathBuf, // uploaded documents awaiting ingestion
    pub downloads_dir: PathBuf, // bootstrap corpus downloads
}

impl StorageLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let processed_dir = data_dir.join("processed");
        let barrels_dir = processed_dir.join("barrels");
        let temp_json_dir = data_dir.join("temp_json");
        let temp_pdfs_dir = data_dir.join("temp_pdfs");
        let downloads_dir = data_dir.join("downloads");

        fs::create_dir_all(&barrels_dir)?;
        fs::create_dir_all(&temp_json_dir)?;
        fs::create_dir_all(&temp_pdfs_dir)?;
        fs::create_dir_all(&downloads_dir)?;

        Ok(StorageLayout {
            data_dir,
            processed_dir,
            barrels_dir,
            temp_json_dir,
            temp_pdfs_dir,
            downloads_dir,
        })
    }

    pub fn lexicon_path(&self) -> PathBuf {
        self.processed_dir.join("lexicon.json")
    }

    pub fn forward_index_path(&self) -> PathBuf {
        self.processed_dir.join("forward_index.jsonl")
    }

    pub fn barrel_path(&self, shard: u32) -> PathBuf {
        self.barrels_dir.join(format!("inverted_barrel_{}.json", shard))
    }

    pub fn delta_path(&self) -> PathBuf {
        self.barrels_dir.join("inverted_delta.json")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.processed_dir.join("document_metadata.json")
    }

    pub fn url_map_path(&self) -> PathBuf {
        self.processed_dir.join("docid_to_url.json")
    }

    pub fn doc_stats_cache_path(&self) -> PathBuf {
        self.processed_dir.join("doc_stats.bin")
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.processed_dir.join("corpus.jsonl")
    }

    pub fn doc_vectors_path(&self) -> PathBuf {
        self.processed_dir.join("doc_vectors.bin")
    }

    pub fn word_vectors_path(&self) -> PathBuf {
        self.processed_dir.join("word_vectors.bin")
    }

    pub fn temp_extract_path(&self, doc_id: DocId) -> PathBuf {
        self.temp_json_dir.join(format!("temp_{}.json", doc_id))
    }
}

/// True when `path` exists and is at least as new as `reference`. Used for
/// staleness checks on derived caches.
pub fn is_fresh(path: &Path, reference: &Path) -> bool {
    let path_mtime = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    match fs::metadata(reference).and_then(|m| m.modified()) {
        Ok(ref_mtime) => path_mtime >= ref_mtime,
        // No source to be stale against.
        Err(_) => true,
    }
}
