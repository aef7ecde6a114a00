use std::path::Path;

use rayon::prelude::*;
use tracing::info;

use crate::core::error::Result;
use crate::core::types::TermId;
use crate::index::forward;
use crate::index::posting::{write_posting_file_atomic, Posting, PostingMap};
use crate::storage::layout::StorageLayout;

/// Offline inversion of the forward index into the N barrel files. Each
/// posting lands in the shard of its term's residue class; empty shards get
/// no file (a missing shard reads as empty).
pub struct BarrelBuilder {
    num_barrels: u32,
}

impl BarrelBuilder {
    pub fn new(num_barrels: u32) -> Self {
        BarrelBuilder {
            num_barrels: num_barrels.max(1),
        }
    }

    /// Returns the number of shard files written.
    pub fn build(&self, forward_path: &Path, layout: &StorageLayout) -> Result<usize> {
        let mut shards: Vec<PostingMap> =
            (0..self.num_barrels).map(|_| PostingMap::new()).collect();

        forward::scan(forward_path, |doc_id, data| {
            for (key, stats) in &data.words {
                let term_id: TermId = match key.parse() {
                    Ok(id) => id,
                    Err(_) => continue,
                };
                let mut positions = stats.title_positions.clone();
                positions.extend_from_slice(&stats.body_positions);
                let shard = (term_id % self.num_barrels) as usize;
                shards[shard].entry(term_id).or_default().push(Posting {
                    doc_id,
                    weighted_frequency: stats.weighted_frequency,
                    positions,
                });
            }
        })?;

        let written = shards
            .par_iter()
            .enumerate()
            .filter(|(_, map)| !map.is_empty())
            .map(|(shard, map)| write_posting_file_atomic(&layout.barrel_path(shard as u32), map))
            .collect::<Result<Vec<()>>>()?
            .len();

        info!(shards = written, "barrels built from forward index");
        Ok(written)
    }
}
