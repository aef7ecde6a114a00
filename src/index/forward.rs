use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::Result;
use crate::core::types::{DocId, WordStats};

/// Per-term stats as serialized in a forward-index line.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForwardWordStats {
    #[serde(default)]
    pub title_frequency: u32,
    #[serde(default)]
    pub body_frequency: u32,
    #[serde(default)]
    pub weighted_frequency: u32,
    #[serde(default)]
    pub title_positions: Vec<u32>,
    #[serde(default)]
    pub body_positions: Vec<u32>,
}

impl From<&WordStats> for ForwardWordStats {
    fn from(stats: &WordStats) -> Self {
        ForwardWordStats {
            title_frequency: stats.title_frequency,
            body_frequency: stats.body_frequency,
            weighted_frequency: stats.weighted_frequency(),
            title_positions: stats.title_positions.clone(),
            body_positions: stats.body_positions.clone(),
        }
    }
}

/// The `data` object of a forward-index line. Word keys are stringified
/// term ids (object form).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForwardDocData {
    #[serde(default)]
    pub doc_length: u32,
    #[serde(default)]
    pub title_length: u32,
    #[serde(default)]
    pub body_length: u32,
    #[serde(default)]
    pub words: BTreeMap<String, ForwardWordStats>,
}

/// One line of `forward_index.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardLine {
    pub doc_id: String,
    pub data: ForwardDocData,
}

impl ForwardLine {
    pub fn new(doc_id: DocId, data: ForwardDocData) -> Self {
        ForwardLine {
            doc_id: doc_id.to_string(),
            data,
        }
    }
}

/// Appends lines and syncs; the forward index is append-only.
pub fn append_lines(path: &Path, lines: &[ForwardLine]) -> Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for line in lines {
        let mut encoded = serde_json::to_vec(line)?;
        encoded.push(b'\n');
        file.write_all(&encoded)?;
    }
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

/// Streams every parseable line to `visit`. Malformed lines are dropped
/// with a warning; a missing file is the caller's concern.
pub fn scan(path: &Path, mut visit: impl FnMut(DocId, ForwardDocData)) -> Result<()> {
    let reader = BufReader::new(File::open(path)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: ForwardLine = match serde_json::from_str(&line) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("forward index line {} unparseable: {}", line_no + 1, err);
                continue;
            }
        };
        let doc_id: DocId = match parsed.doc_id.parse() {
            Ok(id) => id,
            Err(_) => {
                warn!("forward index line {} has bad doc id", line_no + 1);
                continue;
            }
        };
        visit(doc_id, parsed.data);
    }
    Ok(())
}
