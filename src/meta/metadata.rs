use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::error::Result;
use crate::core::types::DocId;

/// Display and ranking metadata for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocMetadata {
    #[serde(default)]
    pub publication_year: i32,
    #[serde(default)]
    pub publication_month: u32,
    #[serde(default)]
    pub cited_by_count: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// Doc id → metadata record, loaded at startup and appended by the batch
/// writer. Missing records read as neutral defaults: year 0, zero
/// citations, a placeholder title.
#[derive(Debug, Default)]
pub struct MetadataStore {
    docs: HashMap<DocId, DocMetadata>,
}

impl MetadataStore {
    pub fn empty() -> Self {
        MetadataStore::default()
    }

    pub fn load(path: &Path) -> Self {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => {
                info!("no metadata at {}, starting empty", path.display());
                return MetadataStore::empty();
            }
        };
        let raw: HashMap<String, DocMetadata> = match serde_json::from_slice(&bytes) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("corrupt metadata {}: {}; starting empty", path.display(), err);
                return MetadataStore::empty();
            }
        };

        let mut docs = HashMap::with_capacity(raw.len());
        for (key, meta) in raw {
            match key.parse::<DocId>() {
                Ok(doc_id) => {
                    docs.insert(doc_id, meta);
                }
                Err(_) => warn!("metadata record with bad doc id {:?} dropped", key),
            }
        }
        info!(documents = docs.len(), "metadata loaded");
        MetadataStore { docs }
    }

    pub fn get(&self, doc_id: DocId) -> Option<&DocMetadata> {
        self.docs.get(&doc_id)
    }

    pub fn publication_year(&self, doc_id: DocId) -> i32 {
        self.docs.get(&doc_id).map(|m| m.publication_year).unwrap_or(0)
    }

    pub fn cited_by_count(&self, doc_id: DocId) -> u64 {
        self.docs.get(&doc_id).map(|m| m.cited_by_count).unwrap_or(0)
    }

    pub fn display_title(&self, doc_id: DocId) -> String {
        match self.docs.get(&doc_id) {
            Some(meta) if !meta.title.is_empty() => meta.title.clone(),
            _ => "Untitled".to_string(),
        }
    }

    pub fn insert(&mut self, doc_id: DocId, meta: DocMetadata) {
        self.docs.insert(doc_id, meta);
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

    /// JSON of the current map plus `extra` records, for staging the next
    /// persisted state without mutating the live map first.
    pub fn to_json_with(&self, extra: &[(DocId, DocMetadata)]) -> Result<Vec<u8>> {
        let mut combined: BTreeMap<String, &DocMetadata> = self
            .docs
            .iter()
            .map(|(doc_id, meta)| (doc_id.to_string(), meta))
            .collect();
        for (doc_id, meta) in extra {
            combined.insert(doc_id.to_string(), meta);
        }
        Ok(serde_json::to_vec(&combined)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::load(&dir.path().join("document_metadata.json"));
        assert!(store.is_empty());
        assert_eq!(store.publication_year(3), 0);
        assert_eq!(store.cited_by_count(3), 0);
        assert_eq!(store.display_title(3), "Untitled");
    }

    #[test]
    fn save_with_extra_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("document_metadata.json");

        let mut store = MetadataStore::empty();
        store.insert(
            1,
            DocMetadata {
                publication_year: 2019,
                publication_month: 6,
                cited_by_count: 12,
                title: "Attention".to_string(),
                url: "https://example.org/1".to_string(),
                keywords: vec!["transformers".to_string()],
            },
        );
        let extra = vec![(
            2,
            DocMetadata {
                publication_year: 2024,
                title: "Uploaded".to_string(),
                url: "uploaded://paper.pdf".to_string(),
                ..DocMetadata::default()
            },
        )];
        std::fs::write(&path, store.to_json_with(&extra).unwrap()).unwrap();

        let loaded = MetadataStore::load(&path);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.publication_year(1), 2019);
        assert_eq!(loaded.cited_by_count(1), 12);
        assert_eq!(loaded.get(2).unwrap().url, "uploaded://paper.pdf");
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("document_metadata.json");
        std::fs::write(&path, b"[]").unwrap();
        assert!(MetadataStore::load(&path).is_empty());
    }
}
