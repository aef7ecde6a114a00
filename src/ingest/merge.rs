use crate::index::delta::DeltaStore;

/// Advisory policy for folding the delta into the main barrels; keeping the
/// delta small keeps reloads and per-query snapshots cheap. Correctness
/// never depends on when (or whether) a merge runs.
#[derive(Debug, Clone, Copy)]
pub struct DeltaMergePolicy {
    pub threshold_docs: usize,
}

impl DeltaMergePolicy {
    pub fn new(threshold_docs: usize) -> Self {
        DeltaMergePolicy { threshold_docs }
    }

    pub fn should_merge(&self, delta: &DeltaStore) -> bool {
        self.threshold_docs > 0 && delta.unique_doc_count() >= self.threshold_docs
    }
}
