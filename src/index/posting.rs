use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::core::error::Result;
use crate::core::types::{DocId, TermId};
use crate::storage::atomic::{write_atomic, StagedWrite};

/// One term's occurrence in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    /// `3 * title_frequency + body_frequency`.
    pub weighted_frequency: u32,
    /// Token offsets in reading order, title positions first.
    pub positions: Vec<u32>,
}

/// Wire form: `[doc_id, weighted_frequency, [positions...]]`.
type RawPosting = (DocId, u32, Vec<u32>);

/// In-memory form of a barrel or delta file.
pub type PostingMap = HashMap<TermId, Vec<Posting>>;

impl Posting {
    fn from_raw(raw: RawPosting) -> Self {
        Posting {
            doc_id: raw.0,
            weighted_frequency: raw.1,
            positions: raw.2,
        }
    }

    fn to_raw(&self) -> RawPosting {
        (self.doc_id, self.weighted_frequency, self.positions.clone())
    }
}

/// Reads a barrel-shaped JSON file (`{"<term_id>": [[doc_id, wf, [pos…]]…]}`).
/// A missing file is an empty map; malformed content is a parse error the
/// caller downgrades as its policy dictates.
pub fn read_posting_file(path: &Path) -> Result<PostingMap> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(PostingMap::new()),
        Err(err) => return Err(err.into()),
    };
    let raw: HashMap<String, Vec<RawPosting>> = serde_json::from_slice(&bytes)?;

    let mut map = PostingMap::with_capacity(raw.len());
    for (key, entries) in raw {
        let term_id: TermId = match key.parse() {
            Ok(id) => id,
            Err(_) => continue, // foreign key, drop the record
        };
        map.insert(term_id, entries.into_iter().map(Posting::from_raw).collect());
    }
    Ok(map)
}

fn encode(map: &PostingMap) -> Result<Vec<u8>> {
    // String keys sorted for stable output.
    let raw: BTreeMap<String, Vec<RawPosting>> = map
        .iter()
        .map(|(term_id, postings)| {
            (
                term_id.to_string(),
                postings.iter().map(Posting::to_raw).collect(),
            )
        })
        .collect();
    Ok(serde_json::to_vec(&raw)?)
}

pub fn write_posting_file_atomic(path: &Path, map: &PostingMap) -> Result<()> {
    write_atomic(path, &encode(map)?)
}

pub fn stage_posting_file(path: &Path, map: &PostingMap) -> Result<StagedWrite> {
    StagedWrite::stage(path, &encode(map)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_the_tuple_form() {
        let mut map = PostingMap::new();
        map.insert(
            7,
            vec![Posting {
                doc_id: 3,
                weighted_frequency: 5,
                positions: vec![0, 4],
            }],
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("barrel.json");
        write_posting_file_atomic(&path, &map).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, r#"{"7":[[3,5,[0,4]]]}"#);

        let loaded = read_posting_file(&path).unwrap();
        assert_eq!(loaded, map);
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let map = read_posting_file(&dir.path().join("absent.json")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"[1, 2").unwrap();
        assert!(read_posting_file(&path).is_err());
    }
}
