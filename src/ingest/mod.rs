pub mod batch_writer;
pub mod extractor;
pub mod merge;
pub mod pool;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use crossbeam::channel::{Receiver, Sender};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, TermId, WordStats};

/// A tokenized document waiting for the batch writer. Carries the sender
/// half of its submitter's result handle; the writer resolves it once the
/// batch commits or fails.
pub struct PendingDocument {
    pub doc_id: DocId,
    pub title: String,
    /// Body tokens in reading order, as produced by the extractor.
    pub tokens: Vec<String>,
    /// Term stats for tokens the lexicon knew at extraction time. The batch
    /// writer supplements terms first introduced by the batch.
    pub doc_stats: BTreeMap<TermId, WordStats>,
    pub url: String,
    pub source_path: PathBuf,
    pub enqueued_at: Instant,
    pub result: Sender<Result<DocId>>,
}

/// Handle for one submitted ingestion. Resolves in two phases: first when
/// the document has been extracted and handed to the batch writer, then
/// when its batch commits (or either phase fails).
pub struct IngestHandle {
    doc_id: DocId,
    queued: Receiver<Result<DocId>>,
    indexed: Receiver<Result<DocId>>,
}

impl IngestHandle {
    pub(crate) fn new(
        doc_id: DocId,
        queued: Receiver<Result<DocId>>,
        indexed: Receiver<Result<DocId>>,
    ) -> Self {
        IngestHandle {
            doc_id,
            queued,
            indexed,
        }
    }

    /// The id assigned at submission; stable whether or not the ingest
    /// eventually succeeds.
    pub fn doc_id(&self) -> DocId {
        self.doc_id
    }

    /// Blocks until the document has been tokenized and handed to the batch
    /// writer. After this returns `Ok`, a `flush_now` is guaranteed to
    /// include the document.
    pub fn wait_queued(&self) -> Result<DocId> {
        self.queued
            .recv()
            .unwrap_or_else(|_| Err(channel_closed()))
    }

    /// Blocks until the document's batch commits or fails.
    pub fn wait(self) -> Result<DocId> {
        self.indexed
            .recv()
            .unwrap_or_else(|_| Err(channel_closed()))
    }

    /// Non-blocking poll of the final outcome.
    pub fn try_wait(&self) -> Option<Result<DocId>> {
        self.indexed.try_recv().ok()
    }
}

fn channel_closed() -> Error {
    Error::new(ErrorKind::Internal, "ingest result channel closed")
}
