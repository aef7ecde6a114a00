use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::core::error::Result;
use crate::core::types::DocId;

/// Doc id → source URL. URLs beginning with `uploaded://` denote documents
/// ingested from local files.
#[derive(Debug, Default)]
pub struct UrlMap {
    urls: HashMap<DocId, String>,
}

impl UrlMap {
    pub fn empty() -> Self {
        UrlMap::default()
    }

    pub fn load(path: &Path) -> Self {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => {
                info!("no url map at {}, starting empty", path.display());
                return UrlMap::empty();
            }
        };
        let raw: HashMap<String, String> = match serde_json::from_slice(&bytes) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("corrupt url map {}: {}; starting empty", path.display(), err);
                return UrlMap::empty();
            }
        };

        let urls = raw
            .into_iter()
            .filter_map(|(key, url)| key.parse::<DocId>().ok().map(|doc_id| (doc_id, url)))
            .collect();
        UrlMap { urls }
    }

    pub fn get(&self, doc_id: DocId) -> Option<&str> {
        self.urls.get(&doc_id).map(|s| s.as_str())
    }

    pub fn insert(&mut self, doc_id: DocId, url: String) {
        self.urls.insert(doc_id, url);
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn to_json_with(&self, extra: &[(DocId, String)]) -> Result<Vec<u8>> {
        let mut combined: BTreeMap<String, &str> = self
            .urls
            .iter()
            .map(|(doc_id, url)| (doc_id.to_string(), url.as_str()))
            .collect();
        for (doc_id, url) in extra {
            combined.insert(doc_id.to_string(), url.as_str());
        }
        Ok(serde_json::to_vec(&combined)?)
    }
}
