/// Dense integer id assigned to a document. Ids are strictly increasing and
/// never reused; deletion is unsupported.
pub type DocId = u32;

/// Stable integer id assigned to a lexicon term. Once assigned, never
/// reordered; online extension appends fresh ids.
pub type TermId = u32;

/// Per-document occurrence statistics for one term, split by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordStats {
    pub title_frequency: u32,
    pub body_frequency: u32,
    pub title_positions: Vec<u32>,
    pub body_positions: Vec<u32>,
}

impl WordStats {
    /// Title occurrences count triple.
    pub fn weighted_frequency(&self) -> u32 {
        3 * self.title_frequency + self.body_frequency
    }

    /// Positions in reading order, title before body.
    pub fn merged_positions(&self) -> Vec<u32> {
        let mut positions =
            Vec::with_capacity(self.title_positions.len() + self.body_positions.len());
        positions.extend_from_slice(&self.title_positions);
        positions.extend_from_slice(&self.body_positions);
        positions
    }
}
