use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::analysis::stopwords::StopWordList;
use crate::analysis::tokenizer::Tokenizer;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::index::barrel::BarrelStore;
use crate::index::delta::DeltaStore;
use crate::index::doc_stats::DocStatsCache;
use crate::index::posting::{read_posting_file, write_posting_file_atomic, PostingMap};
use crate::ingest::batch_writer::{BatchIndexWriter, WriterStats};
use crate::ingest::extractor::{CommandExtractor, Extractor};
use crate::ingest::merge::DeltaMergePolicy;
use crate::ingest::pool::{IngestPool, PoolStats};
use crate::ingest::IngestHandle;
use crate::lexicon::LexiconIndex;
use crate::meta::metadata::MetadataStore;
use crate::meta::url_map::UrlMap;
use crate::scoring::scorer::RankingScorer;
use crate::scoring::semantic::SemanticScorer;
use crate::search::coordinator::SearchCoordinator;
use crate::search::results::{SearchResults, Suggestions};
use crate::storage::layout::StorageLayout;

/// Upper bound on autocomplete suggestions per request.
const MAX_SUGGESTIONS: usize = 50;

/// Running counters for monitoring.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub lexicon_terms: usize,
    pub documents: usize,
    pub delta_documents: usize,
    pub cached_barrels: usize,
    pub writer: WriterStats,
    pub pool: PoolStats,
}

/// The search engine: every store behind one explicitly owned value.
/// Queries may run concurrently with ingestion; a query observes either the
/// pre-flush or post-reload state of each store, never a torn one.
pub struct Engine {
    layout: Arc<StorageLayout>,
    lexicon: Arc<RwLock<LexiconIndex>>,
    barrels: Arc<BarrelStore>,
    delta: Arc<DeltaStore>,
    doc_stats: Arc<RwLock<DocStatsCache>>,
    metadata: Arc<RwLock<MetadataStore>>,
    url_map: Arc<RwLock<UrlMap>>,
    coordinator: SearchCoordinator,
    writer: Arc<BatchIndexWriter>,
    pool: IngestPool,
    merge_policy: DeltaMergePolicy,
    next_doc_id: AtomicU32,
    shut_down: bool,
}

impl Engine {
    /// Opens the engine with the default external extractor.
    pub fn open(config: Config) -> Result<Self> {
        let layout = StorageLayout::new(&config.data_dir)?;
        let extractor: Arc<dyn Extractor> =
            Arc::new(CommandExtractor::python_default(&layout.temp_json_dir));
        Self::open_with_extractor(config, extractor)
    }

    /// Opens the engine with a caller-provided extractor (tests substitute
    /// a stub). Starts with whatever index files exist; missing or corrupt
    /// files degrade to empty structures.
    pub fn open_with_extractor(config: Config, extractor: Arc<dyn Extractor>) -> Result<Self> {
        config.weights.validate()?;
        let layout = Arc::new(StorageLayout::new(&config.data_dir)?);
        info!(data_dir = %config.data_dir.display(), "opening engine");

        let stop_words = match &config.stop_words_path {
            Some(path) => match StopWordList::from_file(path) {
                Ok(list) => list,
                Err(err) => {
                    warn!("stop-word file unusable: {}; using defaults", err);
                    StopWordList::default_set()
                }
            },
            None => StopWordList::default_set(),
        };

        let lexicon = Arc::new(RwLock::new(LexiconIndex::load(
            &layout.lexicon_path(),
            stop_words,
        )));
        let barrels = Arc::new(BarrelStore::new(
            Arc::clone(&layout),
            config.num_barrels,
            config.cache_limit,
        )?);
        let delta = Arc::new(DeltaStore::load(&layout.delta_path()));
        let doc_stats = Arc::new(RwLock::new(DocStatsCache::open(
            &layout.doc_stats_cache_path(),
            &layout.forward_index_path(),
        )));
        let metadata = Arc::new(RwLock::new(MetadataStore::load(&layout.metadata_path())));
        let url_map = Arc::new(RwLock::new(UrlMap::load(&layout.url_map_path())));
        let semantic =
            SemanticScorer::load(&layout.doc_vectors_path(), &layout.word_vectors_path())
                .map(Arc::new);

        let next_doc_id = {
            let stats_max = doc_stats.read().max_doc_id();
            let metadata_max = metadata.read().max_doc_id();
            match stats_max.into_iter().chain(metadata_max).max() {
                Some(max) => max + 1,
                None => 0,
            }
        };

        let coordinator = SearchCoordinator::new(
            Arc::clone(&lexicon),
            Arc::clone(&barrels),
            Arc::clone(&delta),
            Arc::clone(&doc_stats),
            Arc::clone(&metadata),
            Arc::clone(&url_map),
            semantic,
            RankingScorer::new(config.weights),
            Tokenizer::new()?,
            config.top_k,
            config.semantic_weight,
        );

        let writer = BatchIndexWriter::start(
            config.batch_size,
            config.flush_interval,
            Arc::clone(&layout),
            Arc::clone(&lexicon),
            Arc::clone(&doc_stats),
            Arc::clone(&metadata),
            Arc::clone(&url_map),
        );
        let pool = IngestPool::start(
            config.worker_count(),
            config.ingest_queue_capacity,
            extractor,
            Arc::clone(&lexicon),
            Arc::clone(&writer),
        );

        info!(
            terms = lexicon.read().len(),
            documents = doc_stats.read().len(),
            next_doc_id,
            "engine ready"
        );
        Ok(Engine {
            layout,
            lexicon,
            barrels,
            delta,
            doc_stats,
            metadata,
            url_map,
            coordinator,
            writer,
            pool,
            merge_policy: DeltaMergePolicy::new(config.merge_threshold_docs),
            next_doc_id: AtomicU32::new(next_doc_id),
            shut_down: false,
        })
    }

    /// Ranked multi-term retrieval. Empty and fully-unrecognized queries
    /// return empty results, never errors.
    pub fn search(&self, query: &str) -> SearchResults {
        self.coordinator.search(query)
    }

    /// Prefix completion; `limit` is clamped to 1..=50.
    pub fn autocomplete(&self, prefix: &str, limit: usize) -> Suggestions {
        let k = limit.clamp(1, MAX_SUGGESTIONS);
        let suggestions = self.lexicon.read().complete(prefix, k);
        Suggestions {
            prefix: prefix.to_string(),
            suggestions,
        }
    }

    /// Enqueues a document for ingestion and returns a handle carrying the
    /// pre-assigned doc id. The document becomes searchable after its batch
    /// flushes and `reload_delta`/`reload_metadata` run.
    pub fn ingest(&self, source_path: impl Into<std::path::PathBuf>, url: Option<String>) -> IngestHandle {
        let doc_id = self.next_doc_id.fetch_add(1, Ordering::Relaxed);
        self.pool.submit(source_path, doc_id, url)
    }

    /// Synchronously drains and commits the pending batch.
    pub fn flush_now(&self) -> Result<()> {
        self.writer.flush_now()
    }

    /// Swaps the in-memory delta for the persisted file's content.
    pub fn reload_delta(&self) {
        self.delta.reload(&self.layout.delta_path());
    }

    /// Swaps the in-memory metadata and URL map for the persisted files'
    /// content.
    pub fn reload_metadata(&self) {
        let fresh_metadata = MetadataStore::load(&self.layout.metadata_path());
        *self.metadata.write() = fresh_metadata;
        let fresh_urls = UrlMap::load(&self.layout.url_map_path());
        *self.url_map.write() = fresh_urls;
    }

    /// Moves every delta posting into its main barrel and empties the delta
    /// (file and in-memory map). Runs under the flush lock so no batch can
    /// interleave.
    pub fn merge_delta(&self) -> Result<()> {
        let _flush = self.writer.lock_flush();

        let delta_map: PostingMap = read_posting_file(&self.layout.delta_path())?;
        if delta_map.is_empty() && self.delta.is_empty() {
            return Ok(());
        }
        self.barrels.merge_delta(delta_map)?;
        write_posting_file_atomic(&self.layout.delta_path(), &PostingMap::new())?;
        self.delta.clear();
        Ok(())
    }

    /// Merges when the advisory policy says the delta is large enough.
    /// Returns whether a merge ran.
    pub fn maybe_merge_delta(&self) -> Result<bool> {
        if self.merge_policy.should_merge(&self.delta) {
            self.merge_delta()?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            lexicon_terms: self.lexicon.read().len(),
            documents: self.doc_stats.read().len(),
            delta_documents: self.delta.unique_doc_count(),
            cached_barrels: self.barrels.cached_shards(),
            writer: self.writer.stats(),
            pool: self.pool.stats(),
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Drains the worker pool, stops the writer, and flushes the remaining
    /// queue. A flush in progress runs to completion. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.pool.shutdown();
        self.writer.shutdown();
        self.shut_down = true;
        info!("engine shut down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
