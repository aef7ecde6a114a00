use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{bounded, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, TermId, WordStats};
use crate::ingest::batch_writer::BatchIndexWriter;
use crate::ingest::extractor::Extractor;
use crate::ingest::{IngestHandle, PendingDocument};
use crate::lexicon::LexiconIndex;

struct IngestTask {
    source_path: PathBuf,
    doc_id: DocId,
    url: Option<String>,
    queued: Sender<Result<DocId>>,
    indexed: Sender<Result<DocId>>,
}

#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub workers: usize,
    pub queue_depth: usize,
    pub completed: u64,
    pub failed: u64,
}

struct PoolShared {
    queue: Mutex<VecDeque<IngestTask>>,
    task_ready: Condvar,
    space_ready: Condvar,
    capacity: usize,
    shutdown: AtomicBool,
    counters: Mutex<(u64, u64)>, // (completed, failed)
    extractor: Arc<dyn Extractor>,
    lexicon: Arc<RwLock<LexiconIndex>>,
    writer: Arc<BatchIndexWriter>,
}

/// Fixed pool of worker threads turning files into `PendingDocument`s: run
/// the extractor, fold tokens into per-term stats via the lexicon, hand the
/// result to the batch writer. The task queue is bounded FIFO; submitters
/// block while it is full. Shutdown drains remaining tasks.
pub struct IngestPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl IngestPool {
    pub fn start(
        workers: usize,
        capacity: usize,
        extractor: Arc<dyn Extractor>,
        lexicon: Arc<RwLock<LexiconIndex>>,
        writer: Arc<BatchIndexWriter>,
    ) -> Self {
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(VecDeque::new()),
            task_ready: Condvar::new(),
            space_ready: Condvar::new(),
            capacity: capacity.max(1),
            shutdown: AtomicBool::new(false),
            counters: Mutex::new((0, 0)),
            extractor,
            lexicon,
            writer,
        });

        let handles = (0..workers.max(1))
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(shared))
            })
            .collect();

        info!(workers = workers.max(1), "ingestion pool started");
        IngestPool {
            shared,
            workers: handles,
        }
    }

    /// Enqueues an ingestion. The doc id is assigned by the caller before
    /// submission; the returned handle resolves as the document progresses.
    pub fn submit(
        &self,
        source_path: impl Into<PathBuf>,
        doc_id: DocId,
        url: Option<String>,
    ) -> IngestHandle {
        let (queued_tx, queued_rx) = bounded(1);
        let (indexed_tx, indexed_rx) = bounded(1);
        let task = IngestTask {
            source_path: source_path.into(),
            doc_id,
            url,
            queued: queued_tx,
            indexed: indexed_tx,
        };

        {
            let mut queue = self.shared.queue.lock();
            while queue.len() >= self.shared.capacity
                && !self.shared.shutdown.load(Ordering::Acquire)
            {
                self.shared.space_ready.wait(&mut queue);
            }
            if self.shared.shutdown.load(Ordering::Acquire) {
                fail_task(&task, "ingestion pool shut down");
                return IngestHandle::new(doc_id, queued_rx, indexed_rx);
            }
            queue.push_back(task);
        }
        self.shared.task_ready.notify_one();
        IngestHandle::new(doc_id, queued_rx, indexed_rx)
    }

    pub fn stats(&self) -> PoolStats {
        let (completed, failed) = *self.shared.counters.lock();
        PoolStats {
            workers: self.workers.len(),
            queue_depth: self.shared.queue.lock().len(),
            completed,
            failed,
        }
    }

    /// Signals shutdown, wakes everyone, and joins the workers after they
    /// drain the queue.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.task_ready.notify_all();
        self.shared.space_ready.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for IngestPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn fail_task(task: &IngestTask, context: &str) {
    let _ = task
        .queued
        .send(Err(Error::new(ErrorKind::InvalidState, context)));
    let _ = task
        .indexed
        .send(Err(Error::new(ErrorKind::InvalidState, context)));
}

fn worker_loop(shared: Arc<PoolShared>) {
    loop {
        let task = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(task) = queue.pop_front() {
                    shared.space_ready.notify_one();
                    break task;
                }
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                shared.task_ready.wait(&mut queue);
            }
        };
        process_task(&shared, task);
    }
}

fn process_task(shared: &PoolShared, task: IngestTask) {
    let started = Instant::now();
    let doc_id = task.doc_id;

    let extracted = match shared.extractor.extract(&task.source_path, doc_id) {
        Ok(extracted) => extracted,
        Err(err) => {
            warn!(doc_id, "extraction failed: {}", err);
            let _ = task
                .indexed
                .send(Err(Error::new(err.kind, err.context.clone())));
            let _ = task.queued.send(Err(err));
            shared.counters.lock().1 += 1;
            return;
        }
    };

    let doc_stats = build_doc_stats(&shared.lexicon, &extracted.body_tokens);
    let url = task.url.unwrap_or_else(|| {
        let name = task
            .source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| task.source_path.display().to_string());
        format!("uploaded://{}", name)
    });

    debug!(
        doc_id,
        tokens = extracted.body_tokens.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "document tokenized"
    );

    shared.writer.enqueue(PendingDocument {
        doc_id,
        title: extracted.title,
        tokens: extracted.body_tokens,
        doc_stats,
        url,
        source_path: task.source_path,
        enqueued_at: Instant::now(),
        result: task.indexed,
    });
    // Signalled after the enqueue: once the submitter sees this, a flush
    // is guaranteed to include the document.
    let _ = task.queued.send(Ok(doc_id));
    shared.counters.lock().0 += 1;
}

/// Folds body tokens into per-term stats. Tokens the lexicon does not know
/// are dropped here; the batch writer extends the lexicon and supplements
/// their postings at flush time.
pub fn build_doc_stats(
    lexicon: &RwLock<LexiconIndex>,
    tokens: &[String],
) -> BTreeMap<TermId, WordStats> {
    let lexicon = lexicon.read();
    let mut stats: BTreeMap<TermId, WordStats> = BTreeMap::new();
    for (position, token) in tokens.iter().enumerate() {
        let lowered = token.to_lowercase();
        if let Some(term_id) = lexicon.index_of(&lowered) {
            let entry = stats.entry(term_id).or_default();
            entry.body_frequency += 1;
            entry.body_positions.push(position as u32);
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::stopwords::StopWordList;
    use crate::lexicon::Lexicon;

    #[test]
    fn doc_stats_fold_counts_and_positions() {
        let lexicon = Lexicon::from_terms(vec!["brown".into(), "quick".into()]);
        let lexicon = RwLock::new(
            LexiconIndex::from_lexicon(lexicon, StopWordList::default_set()).unwrap(),
        );

        let tokens: Vec<String> = ["the", "Quick", "brown", "fox", "quick"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        let stats = build_doc_stats(&lexicon, &tokens);

        assert_eq!(stats.len(), 2);
        let quick = &stats[&1];
        assert_eq!(quick.body_frequency, 2);
        assert_eq!(quick.body_positions, vec![1, 4]);
        assert_eq!(quick.weighted_frequency(), 2);
        let brown = &stats[&0];
        assert_eq!(brown.body_positions, vec![2]);
    }
}
