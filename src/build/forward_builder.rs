use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::analysis::tokenizer::Tokenizer;
use crate::build::CorpusDoc;
use crate::core::error::Result;
use crate::core::types::{DocId, TermId, WordStats};
use crate::index::forward::{ForwardDocData, ForwardLine, ForwardWordStats};
use crate::lexicon::Lexicon;

/// Offline forward-index build: fold each corpus document's title and body
/// against a frozen lexicon and emit one JSON line per document. Title
/// positions precede body positions, so downstream postings keep reading
/// order.
pub struct ForwardIndexBuilder<'a> {
    lexicon: &'a Lexicon,
    tokenizer: Tokenizer,
}

impl<'a> ForwardIndexBuilder<'a> {
    pub fn new(lexicon: &'a Lexicon) -> Result<Self> {
        Ok(ForwardIndexBuilder {
            lexicon,
            tokenizer: Tokenizer::new()?,
        })
    }

    /// Streams `corpus_path` and writes `output_path`. Returns the number
    /// of documents written. Documents without any recognized term are
    /// skipped but still consume a doc id, keeping ids aligned with the
    /// corpus.
    pub fn build(&self, corpus_path: &Path, output_path: &Path) -> Result<u32> {
        let reader = BufReader::new(File::open(corpus_path)?);
        let mut writer = BufWriter::new(File::create(output_path)?);

        let mut next_doc_id: DocId = 0;
        let mut written = 0u32;
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let doc: CorpusDoc = match serde_json::from_str(&line) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!("corpus line {} unparseable: {}", line_no + 1, err);
                    continue;
                }
            };

            let doc_id = doc.doc_id.unwrap_or(next_doc_id);
            next_doc_id = doc_id + 1;

            let title_tokens = doc
                .title
                .as_deref()
                .map(|title| self.tokenizer.normalize(title))
                .unwrap_or_default();
            let body_tokens = doc.body_tokens(&self.tokenizer);

            if let Some(data) = self.fold(&title_tokens, &body_tokens) {
                let encoded = serde_json::to_vec(&ForwardLine::new(doc_id, data))?;
                writer.write_all(&encoded)?;
                writer.write_all(b"\n")?;
                written += 1;
            }
        }
        writer.flush()?;
        info!(documents = written, "forward index built");
        Ok(written)
    }

    /// `None` when no token resolves against the lexicon.
    fn fold(&self, title_tokens: &[String], body_tokens: &[String]) -> Option<ForwardDocData> {
        let mut stats: BTreeMap<TermId, WordStats> = BTreeMap::new();

        for (position, token) in title_tokens.iter().enumerate() {
            if let Some(term_id) = self.lexicon.index_of(token) {
                let entry = stats.entry(term_id).or_default();
                entry.title_frequency += 1;
                entry.title_positions.push(position as u32);
            }
        }
        let body_offset = title_tokens.len() as u32;
        for (position, token) in body_tokens.iter().enumerate() {
            let lowered = token.to_lowercase();
            if let Some(term_id) = self.lexicon.index_of(&lowered) {
                let entry = stats.entry(term_id).or_default();
                entry.body_frequency += 1;
                entry.body_positions.push(body_offset + position as u32);
            }
        }
        if stats.is_empty() {
            return None;
        }

        let words = stats
            .iter()
            .map(|(term_id, word_stats)| {
                (term_id.to_string(), ForwardWordStats::from(word_stats))
            })
            .collect();
        Some(ForwardDocData {
            doc_length: (title_tokens.len() + body_tokens.len()) as u32,
            title_length: title_tokens.len() as u32,
            body_length: body_tokens.len() as u32,
            words,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::forward;

    #[test]
    fn folds_title_before_body_with_running_positions() {
        let lexicon = Lexicon::from_terms(vec!["brown".into(), "quick".into()]);
        let builder = ForwardIndexBuilder::new(&lexicon).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus.jsonl");
        std::fs::write(
            &corpus,
            r#"{"title": "Quick Findings", "tokens": ["the", "quick", "brown", "fox"]}"#,
        )
        .unwrap();
        let output = dir.path().join("forward_index.jsonl");
        assert_eq!(builder.build(&corpus, &output).unwrap(), 1);

        let mut lines = Vec::new();
        forward::scan(&output, |doc_id, data| lines.push((doc_id, data))).unwrap();
        let (doc_id, data) = &lines[0];
        assert_eq!(*doc_id, 0);
        assert_eq!(data.title_length, 2);
        assert_eq!(data.doc_length, 6);

        let quick = &data.words["1"];
        assert_eq!(quick.title_frequency, 1);
        assert_eq!(quick.title_positions, vec![0]);
        // Body positions continue after the two title tokens.
        assert_eq!(quick.body_positions, vec![3]);
        assert_eq!(quick.weighted_frequency, 4);

        let brown = &data.words["0"];
        assert_eq!(brown.weighted_frequency, 1);
        assert_eq!(brown.body_positions, vec![4]);
    }

    #[test]
    fn documents_without_recognized_terms_are_skipped_but_keep_ids() {
        let lexicon = Lexicon::from_terms(vec!["known".into()]);
        let builder = ForwardIndexBuilder::new(&lexicon).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus.jsonl");
        std::fs::write(
            &corpus,
            "{\"tokens\": [\"mystery\"]}\n{\"tokens\": [\"known\"]}\n",
        )
        .unwrap();
        let output = dir.path().join("forward_index.jsonl");
        assert_eq!(builder.build(&corpus, &output).unwrap(), 1);

        let mut ids = Vec::new();
        forward::scan(&output, |doc_id, _| ids.push(doc_id)).unwrap();
        assert_eq!(ids, vec![1]);
    }
}
