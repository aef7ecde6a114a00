use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::scoring::scorer::ScoreWeights;

/// Engine configuration. Every tunable lives here and is passed to
/// [`Engine::open`](crate::core::engine::Engine::open); there is no global
/// state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory holding `processed/`, `temp_json/`, `temp_pdfs/`
    /// and `downloads/`.
    pub data_dir: PathBuf,
    /// Number of inverted-index shards. Term ids map to shards by
    /// `term_id % num_barrels`.
    pub num_barrels: u32,
    /// Documents per batch before the writer flushes.
    pub batch_size: usize,
    /// Maximum time a pending document waits before a flush.
    pub flush_interval: Duration,
    /// Maximum number of decoded barrels held in memory.
    pub cache_limit: usize,
    /// Maximum number of search results returned per query.
    pub top_k: usize,
    /// Sparse ranking weights (frequency, position, title, metadata).
    pub weights: ScoreWeights,
    /// Share of the final score taken by the dense signal when semantic
    /// vectors are loaded.
    pub semantic_weight: f64,
    /// Minimum document frequency for a term to enter the lexicon.
    pub min_df: u32,
    /// Upper document-frequency percentile; terms above the cutoff at this
    /// percentile are excluded. 100 disables the cutoff.
    pub max_df_percentile: u32,
    /// Newline-delimited stop-word file. Built-in defaults when `None`.
    pub stop_words_path: Option<PathBuf>,
    /// Ingestion worker threads. Defaults to available parallelism with a
    /// floor of 4.
    pub ingest_workers: Option<usize>,
    /// Capacity of the ingestion task queue; `submit` blocks when full.
    pub ingest_queue_capacity: usize,
    /// Unique delta documents at which `maybe_merge_delta` merges. Advisory.
    pub merge_threshold_docs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("./data"),
            num_barrels: 100,
            batch_size: 10,
            flush_interval: Duration::from_secs(30),
            cache_limit: 30,
            top_k: 50,
            weights: ScoreWeights::default(),
            semantic_weight: 0.4,
            min_df: 1,
            max_df_percentile: 100,
            stop_words_path: None,
            ingest_workers: None,
            ingest_queue_capacity: 256,
            merge_threshold_docs: 50,
        }
    }
}

impl Config {
    pub fn worker_count(&self) -> usize {
        self.ingest_workers.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .max(4)
        })
    }
}
