use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{Datelike, SecondsFormat, Utc};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::error::{Error, Result};
use crate::core::types::{DocId, TermId, WordStats};
use crate::index::doc_stats::{DocStats, DocStatsCache};
use crate::index::forward::{self, ForwardDocData, ForwardLine, ForwardWordStats};
use crate::index::posting::{read_posting_file, stage_posting_file, Posting, PostingMap};
use crate::ingest::PendingDocument;
use crate::lexicon::LexiconIndex;
use crate::meta::metadata::{DocMetadata, MetadataStore};
use crate::meta::url_map::UrlMap;
use crate::storage::atomic::StagedWrite;
use crate::storage::layout::StorageLayout;

/// One line of `corpus.jsonl`: the raw ingested document, kept so indices
/// can be rebuilt offline.
#[derive(Debug, Serialize)]
struct CorpusRecord<'a> {
    doc_id: DocId,
    title: &'a str,
    body_tokens: &'a [String],
    word_count: usize,
    source_path: String,
    url: &'a str,
    indexed_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct WriterStats {
    pub documents_queued: u64,
    pub documents_indexed: u64,
    pub batches_flushed: u64,
    pub avg_batch_ms: f64,
    pub queue_depth: usize,
}

struct WriterShared {
    queue: Mutex<Vec<PendingDocument>>,
    queue_ready: Condvar,
    /// Excludes concurrent flushes; also taken by the delta merge.
    flush_lock: Mutex<()>,
    shutdown: AtomicBool,
    batch_size: usize,
    flush_interval: Duration,
    last_flush: Mutex<Instant>,
    counters: Mutex<WriterStats>,
    layout: Arc<StorageLayout>,
    lexicon: Arc<RwLock<LexiconIndex>>,
    doc_stats: Arc<RwLock<DocStatsCache>>,
    metadata: Arc<RwLock<MetadataStore>>,
    url_map: Arc<RwLock<UrlMap>>,
}

/// The single background actor that coalesces ingested documents into
/// atomic multi-file updates: lexicon, forward index, delta shard,
/// metadata, URL map, and raw corpus. Wakes when the queue reaches the
/// batch size or the flush interval elapses. Every rename-based file is
/// staged before any rename runs, so an aborted batch leaves all persisted
/// files at their pre-batch state.
pub struct BatchIndexWriter {
    shared: Arc<WriterShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BatchIndexWriter {
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        batch_size: usize,
        flush_interval: Duration,
        layout: Arc<StorageLayout>,
        lexicon: Arc<RwLock<LexiconIndex>>,
        doc_stats: Arc<RwLock<DocStatsCache>>,
        metadata: Arc<RwLock<MetadataStore>>,
        url_map: Arc<RwLock<UrlMap>>,
    ) -> Arc<Self> {
        let shared = Arc::new(WriterShared {
            queue: Mutex::new(Vec::new()),
            queue_ready: Condvar::new(),
            flush_lock: Mutex::new(()),
            shutdown: AtomicBool::new(false),
            batch_size: batch_size.max(1),
            flush_interval,
            last_flush: Mutex::new(Instant::now()),
            counters: Mutex::new(WriterStats::default()),
            layout,
            lexicon,
            doc_stats,
            metadata,
            url_map,
        });

        let writer = Arc::new(BatchIndexWriter {
            shared: Arc::clone(&shared),
            thread: Mutex::new(None),
        });
        let handle = thread::spawn(move || writer_loop(shared));
        *writer.thread.lock() = Some(handle);
        info!(
            batch_size = batch_size.max(1),
            flush_interval_secs = flush_interval.as_secs(),
            "batch index writer started"
        );
        writer
    }

    pub fn enqueue(&self, document: PendingDocument) {
        {
            let mut queue = self.shared.queue.lock();
            queue.push(document);
            let mut counters = self.shared.counters.lock();
            counters.documents_queued += 1;
            counters.queue_depth = queue.len();
        }
        self.shared.queue_ready.notify_one();
    }

    /// Drains the whole queue immediately under the flush lock. Flushing an
    /// empty queue is a no-op.
    pub fn flush_now(&self) -> Result<()> {
        let _flush = self.shared.flush_lock.lock();
        let batch: Vec<PendingDocument> = {
            let mut queue = self.shared.queue.lock();
            self.shared.counters.lock().queue_depth = 0;
            queue.drain(..).collect()
        };
        if batch.is_empty() {
            return Ok(());
        }
        flush_batch(&self.shared, batch)
    }

    /// Exclusive access to the flush path, for operations (delta merge)
    /// that must not interleave with a flush.
    pub fn lock_flush(&self) -> MutexGuard<'_, ()> {
        self.shared.flush_lock.lock()
    }

    pub fn stats(&self) -> WriterStats {
        let mut stats = self.shared.counters.lock().clone();
        stats.queue_depth = self.shared.queue.lock().len();
        stats
    }

    /// Stops the writer thread (a flush in progress runs to completion) and
    /// flushes whatever is still queued.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.queue_ready.notify_all();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
        if let Err(err) = self.flush_now() {
            warn!("final flush on shutdown failed: {}", err);
        }
    }
}

fn writer_loop(shared: Arc<WriterShared>) {
    loop {
        let batch: Vec<PendingDocument> = {
            let mut queue = shared.queue.lock();
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    // Remaining documents are flushed by `shutdown`.
                    return;
                }
                let since_flush = shared.last_flush.lock().elapsed();
                if queue.len() >= shared.batch_size
                    || (!queue.is_empty() && since_flush >= shared.flush_interval)
                {
                    let take = shared.batch_size.min(queue.len());
                    let batch: Vec<PendingDocument> = queue.drain(..take).collect();
                    shared.counters.lock().queue_depth = queue.len();
                    break batch;
                }
                let wait = if queue.is_empty() {
                    shared.flush_interval
                } else {
                    shared.flush_interval.saturating_sub(since_flush)
                };
                let _ = shared
                    .queue_ready
                    .wait_for(&mut queue, wait.max(Duration::from_millis(10)));
            }
        };

        let _flush = shared.flush_lock.lock();
        // Flush errors were already logged and routed to the submitters.
        let _ = flush_batch(&shared, batch);
    }
}

fn flush_batch(shared: &WriterShared, batch: Vec<PendingDocument>) -> Result<()> {
    let started = Instant::now();
    info!(documents = batch.len(), "flushing batch");

    let outcome = commit_batch(shared, &batch);
    *shared.last_flush.lock() = Instant::now();

    match outcome {
        Ok(()) => {
            for document in &batch {
                let _ = document.result.send(Ok(document.doc_id));
            }
            let elapsed_ms = started.elapsed().as_millis() as f64;
            let avg_latency_ms = batch
                .iter()
                .map(|doc| doc.enqueued_at.elapsed().as_millis() as f64)
                .sum::<f64>()
                / batch.len() as f64;
            let mut counters = shared.counters.lock();
            counters.documents_indexed += batch.len() as u64;
            counters.batches_flushed += 1;
            counters.avg_batch_ms = (counters.avg_batch_ms
                * (counters.batches_flushed - 1) as f64
                + elapsed_ms)
                / counters.batches_flushed as f64;
            info!(
                documents = batch.len(),
                elapsed_ms = elapsed_ms as u64,
                avg_latency_ms = avg_latency_ms as u64,
                "batch committed"
            );
            Ok(())
        }
        Err(err) => {
            warn!("batch flush failed, pre-batch state kept: {}", err);
            for document in &batch {
                let _ = document
                    .result
                    .send(Err(Error::new(err.kind, err.context.clone())));
            }
            Err(err)
        }
    }
}

/// Runs the six batch steps. All rename-based files (lexicon, delta,
/// metadata, URL map) are staged as temp files before the first rename, and
/// the append-only files are written only after every rename succeeded; a
/// failure before the first rename therefore leaves every persisted file at
/// its pre-batch content. In-memory structures are published last.
fn commit_batch(shared: &WriterShared, batch: &[PendingDocument]) -> Result<()> {
    // Step 1: one lexicon extension for the whole batch, then supplement
    // each document's stats with terms its worker could not resolve yet
    // (introduced by this batch, or by a batch that flushed between the
    // worker's fold and now), so first-seen terms get postings too.
    let mut resolved: Vec<BTreeMap<TermId, WordStats>> =
        batch.iter().map(|doc| doc.doc_stats.clone()).collect();
    let lexicon_json: Option<Vec<u8>> = {
        let mut lexicon = shared.lexicon.write();
        let all_tokens: Vec<String> = batch
            .iter()
            .flat_map(|doc| doc.tokens.iter().cloned())
            .collect();
        let added = lexicon.extend_with_tokens(&all_tokens)?;
        for (document, stats) in batch.iter().zip(resolved.iter_mut()) {
            supplement_missing_terms(&lexicon, document, stats);
        }
        if added.is_empty() {
            None
        } else {
            info!(terms = added.len(), "lexicon extended");
            Some(lexicon.to_json()?)
        }
    };

    // Step 2 staging: delta file = current content plus this batch.
    let delta_path = shared.layout.delta_path();
    let mut delta_map = match read_posting_file(&delta_path) {
        Ok(map) => map,
        Err(err) => {
            warn!("delta file unreadable: {}; rewriting from empty", err);
            PostingMap::new()
        }
    };
    for (document, stats) in batch.iter().zip(&resolved) {
        for (&term_id, word_stats) in stats {
            delta_map.entry(term_id).or_default().push(Posting {
                doc_id: document.doc_id,
                weighted_frequency: word_stats.weighted_frequency(),
                positions: word_stats.merged_positions(),
            });
        }
    }
    let staged_delta = stage_posting_file(&delta_path, &delta_map)?;

    // Steps 3–4 staging: metadata and URL map with the batch appended.
    let now = Utc::now();
    let new_metadata: Vec<(DocId, DocMetadata)> = batch
        .iter()
        .map(|doc| {
            (
                doc.doc_id,
                DocMetadata {
                    publication_year: now.year(),
                    publication_month: now.month(),
                    cited_by_count: 0,
                    title: doc.title.clone(),
                    url: doc.url.clone(),
                    keywords: Vec::new(),
                },
            )
        })
        .collect();
    let staged_metadata = {
        let metadata = shared.metadata.read();
        StagedWrite::stage(
            shared.layout.metadata_path(),
            &metadata.to_json_with(&new_metadata)?,
        )?
    };

    let new_urls: Vec<(DocId, String)> = batch
        .iter()
        .map(|doc| (doc.doc_id, doc.url.clone()))
        .collect();
    let staged_urls = {
        let url_map = shared.url_map.read();
        StagedWrite::stage(shared.layout.url_map_path(), &url_map.to_json_with(&new_urls)?)?
    };

    let staged_lexicon = match &lexicon_json {
        Some(bytes) => Some(StagedWrite::stage(shared.layout.lexicon_path(), bytes)?),
        None => None,
    };

    // Commit point: rename everything, lexicon first so no posting can
    // reference a term id the persisted lexicon lacks.
    if let Some(staged) = staged_lexicon {
        staged.commit()?;
    }
    staged_delta.commit()?;
    staged_metadata.commit()?;
    staged_urls.commit()?;

    // Step 5: append-only files, written after the renames.
    let forward_lines: Vec<ForwardLine> = batch
        .iter()
        .zip(&resolved)
        .map(|(document, stats)| forward_line(document, stats))
        .collect();
    forward::append_lines(&shared.layout.forward_index_path(), &forward_lines)?;

    append_corpus_records(shared, batch, &now.to_rfc3339_opts(SecondsFormat::Secs, true))?;

    // Step 6: publish to the resident structures. The coordinator's delta
    // map is deliberately untouched; `reload_delta` is the visibility
    // point.
    {
        let mut metadata = shared.metadata.write();
        for (doc_id, meta) in new_metadata {
            metadata.insert(doc_id, meta);
        }
    }
    {
        let mut url_map = shared.url_map.write();
        for (doc_id, url) in new_urls {
            url_map.insert(doc_id, url);
        }
    }
    {
        let mut doc_stats = shared.doc_stats.write();
        for (document, stats) in batch.iter().zip(&resolved) {
            let title_freqs = stats
                .iter()
                .filter(|(_, ws)| ws.title_frequency > 0)
                .map(|(&term_id, ws)| (term_id, ws.title_frequency))
                .collect();
            doc_stats.insert(
                document.doc_id,
                DocStats {
                    length: document.tokens.len() as u32,
                    title_freqs,
                },
            );
        }
    }
    Ok(())
}

/// Adds postings for tokens that resolve now but were unknown when the
/// worker folded them. Terms the worker already counted keep their stats.
fn supplement_missing_terms(
    lexicon: &LexiconIndex,
    document: &PendingDocument,
    stats: &mut BTreeMap<TermId, WordStats>,
) {
    let mut missing: HashSet<TermId> = HashSet::new();
    for token in &document.tokens {
        let lowered = token.to_lowercase();
        if let Some(term_id) = lexicon.index_of(&lowered) {
            if !stats.contains_key(&term_id) {
                missing.insert(term_id);
            }
        }
    }
    if missing.is_empty() {
        return;
    }
    for (position, token) in document.tokens.iter().enumerate() {
        let lowered = token.to_lowercase();
        if let Some(term_id) = lexicon.index_of(&lowered) {
            if missing.contains(&term_id) {
                let entry = stats.entry(term_id).or_default();
                entry.body_frequency += 1;
                entry.body_positions.push(position as u32);
            }
        }
    }
}

fn forward_line(document: &PendingDocument, stats: &BTreeMap<TermId, WordStats>) -> ForwardLine {
    let words: BTreeMap<String, ForwardWordStats> = stats
        .iter()
        .map(|(term_id, word_stats)| (term_id.to_string(), ForwardWordStats::from(word_stats)))
        .collect();
    let length = document.tokens.len() as u32;
    ForwardLine::new(
        document.doc_id,
        ForwardDocData {
            doc_length: length,
            title_length: 0,
            body_length: length,
            words,
        },
    )
}

fn append_corpus_records(
    shared: &WriterShared,
    batch: &[PendingDocument],
    indexed_at: &str,
) -> Result<()> {
    use std::io::Write;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(shared.layout.corpus_path())?;
    for document in batch {
        let record = CorpusRecord {
            doc_id: document.doc_id,
            title: &document.title,
            body_tokens: &document.tokens,
            word_count: document.tokens.len(),
            source_path: document.source_path.display().to_string(),
            url: &document.url,
            indexed_at: indexed_at.to_string(),
        };
        let mut encoded = serde_json::to_vec(&record)?;
        encoded.push(b'\n');
        file.write_all(&encoded)?;
    }
    file.flush()?;
    file.sync_all()?;
    Ok(())
}
