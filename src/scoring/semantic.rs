use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use tracing::{info, warn};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;

/// Dimensionality of the learned embeddings.
pub const EMBEDDING_DIM: usize = 300;

/// Dense scorer over pre-trained document and term vectors. Term vectors
/// are unit-normalized at load; a query vector is the renormalized mean of
/// the term vectors its tokens hit. Documents without a vector score zero.
pub struct SemanticScorer {
    doc_vectors: HashMap<DocId, Vec<f32>>,
    word_vectors: HashMap<String, Vec<f32>>,
}

impl SemanticScorer {
    /// Loads both vector binaries. Missing or corrupt files disable
    /// semantic scoring with a warning; this is never a startup failure.
    pub fn load(doc_path: &Path, word_path: &Path) -> Option<Self> {
        let doc_vectors = match load_doc_vectors(doc_path) {
            Ok(vectors) if !vectors.is_empty() => vectors,
            Ok(_) => {
                info!("document vector file is empty; semantic scoring disabled");
                return None;
            }
            Err(err) => {
                warn!("document vectors unavailable ({}); semantic scoring disabled", err);
                return None;
            }
        };
        let word_vectors = match load_word_vectors(word_path) {
            Ok(vectors) if !vectors.is_empty() => vectors,
            Ok(_) => {
                info!("term vector file is empty; semantic scoring disabled");
                return None;
            }
            Err(err) => {
                warn!("term vectors unavailable ({}); semantic scoring disabled", err);
                return None;
            }
        };

        info!(
            documents = doc_vectors.len(),
            terms = word_vectors.len(),
            "semantic vectors loaded"
        );
        Some(SemanticScorer {
            doc_vectors,
            word_vectors,
        })
    }

    /// Renormalized mean of the known tokens' vectors; `None` when no token
    /// has a vector (similarity is then zero for every document).
    pub fn query_vector(&self, tokens: &[String]) -> Option<Vec<f32>> {
        let mut sum = vec![0.0f32; EMBEDDING_DIM];
        let mut matched = 0usize;
        for token in tokens {
            if let Some(vector) = self.word_vectors.get(token) {
                for (acc, component) in sum.iter_mut().zip(vector) {
                    *acc += component;
                }
                matched += 1;
            }
        }
        if matched == 0 {
            return None;
        }
        for component in sum.iter_mut() {
            *component /= matched as f32;
        }
        normalize(&mut sum);
        Some(sum)
    }

    /// Cosine similarity clamped to `[0, 1]`; zero for documents without a
    /// vector.
    pub fn similarity(&self, doc_id: DocId, query_vector: &[f32]) -> f64 {
        let doc_vector = match self.doc_vectors.get(&doc_id) {
            Some(vector) => vector,
            None => return 0.0,
        };
        cosine(query_vector, doc_vector).clamp(0.0, 1.0)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        dot += x as f64 * y as f64;
        norm_a += x as f64 * x as f64;
        norm_b += y as f64 * y as f64;
    }
    let norm = norm_a.sqrt() * norm_b.sqrt();
    if norm == 0.0 {
        return 0.0;
    }
    dot / norm
}

fn normalize(vector: &mut [f32]) {
    let norm: f64 = vector.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt();
    if norm > 0.0 {
        for component in vector.iter_mut() {
            *component = (*component as f64 / norm) as f32;
        }
    }
}

/// `i32 n; n × { i32 doc_id; 300 × f32 }`, little-endian.
fn load_doc_vectors(path: &Path) -> Result<HashMap<DocId, Vec<f32>>> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let mut reader = BinaryReader::new(&mmap);

    let count = reader.read_count()?;
    let mut vectors = HashMap::with_capacity(count);
    for _ in 0..count {
        let doc_id = reader.read_i32()?;
        let vector = reader.read_f32_slice(EMBEDDING_DIM)?;
        vectors.insert(doc_id as DocId, vector);
    }
    Ok(vectors)
}

/// `i32 n; n × { i32 len; len × byte; 300 × f32 }`, little-endian. Vectors
/// are unit-normalized here so query construction is a plain mean.
fn load_word_vectors(path: &Path) -> Result<HashMap<String, Vec<f32>>> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let mut reader = BinaryReader::new(&mmap);

    let count = reader.read_count()?;
    let mut vectors = HashMap::with_capacity(count);
    for _ in 0..count {
        let len = reader.read_i32()?;
        if len < 0 {
            return Err(Error::new(ErrorKind::Parse, "negative word length"));
        }
        let word_bytes = reader.take(len as usize)?;
        let word = String::from_utf8_lossy(word_bytes).into_owned();
        let mut vector = reader.read_f32_slice(EMBEDDING_DIM)?;
        normalize(&mut vector);
        vectors.insert(word, vector);
    }
    Ok(vectors)
}

struct BinaryReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> BinaryReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        BinaryReader { bytes, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(n)
            .ok_or_else(|| Error::new(ErrorKind::Parse, "vector file truncated"))?;
        if end > self.bytes.len() {
            return Err(Error::new(ErrorKind::Parse, "vector file truncated"));
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_count(&mut self) -> Result<usize> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(Error::new(ErrorKind::Parse, "negative record count"));
        }
        Ok(count as usize)
    }

    fn read_f32_slice(&mut self, n: usize) -> Result<Vec<f32>> {
        let bytes = self.take(n * 4)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_doc_vectors(path: &Path, docs: &[(i32, Vec<f32>)]) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(docs.len() as i32).to_le_bytes());
        for (doc_id, vector) in docs {
            bytes.extend_from_slice(&doc_id.to_le_bytes());
            for component in vector {
                bytes.extend_from_slice(&component.to_le_bytes());
            }
        }
        let mut file = File::create(path).unwrap();
        file.write_all(&bytes).unwrap();
    }

    fn write_word_vectors(path: &Path, words: &[(&str, Vec<f32>)]) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(words.len() as i32).to_le_bytes());
        for (word, vector) in words {
            bytes.extend_from_slice(&(word.len() as i32).to_le_bytes());
            bytes.extend_from_slice(word.as_bytes());
            for component in vector {
                bytes.extend_from_slice(&component.to_le_bytes());
            }
        }
        let mut file = File::create(path).unwrap();
        file.write_all(&bytes).unwrap();
    }

    fn basis(axis: usize, scale: f32) -> Vec<f32> {
        let mut vector = vec![0.0f32; EMBEDDING_DIM];
        vector[axis] = scale;
        vector
    }

    fn scorer(dir: &Path) -> SemanticScorer {
        let doc_path = dir.join("doc_vectors.bin");
        let word_path = dir.join("word_vectors.bin");
        write_doc_vectors(&doc_path, &[(0, basis(0, 1.0)), (1, basis(1, 1.0))]);
        // Deliberately unnormalized: load must normalize.
        write_word_vectors(
            &word_path,
            &[("machine", basis(0, 4.0)), ("learning", basis(1, 2.0))],
        );
        SemanticScorer::load(&doc_path, &word_path).unwrap()
    }

    #[test]
    fn missing_files_disable_the_scorer() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SemanticScorer::load(
            &dir.path().join("doc_vectors.bin"),
            &dir.path().join("word_vectors.bin")
        )
        .is_none());
    }

    #[test]
    fn query_vector_is_renormalized_mean_of_known_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = scorer(dir.path());

        let qv = scorer
            .query_vector(&["machine".to_string(), "unknown".to_string()])
            .unwrap();
        assert!((qv[0] - 1.0).abs() < 1e-6);

        let norm: f64 = qv.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);

        assert!(scorer.query_vector(&["nothing".to_string()]).is_none());
    }

    #[test]
    fn similarity_is_clamped_cosine_with_zero_for_missing_docs() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = scorer(dir.path());

        let qv = scorer.query_vector(&["machine".to_string()]).unwrap();
        assert!((scorer.similarity(0, &qv) - 1.0).abs() < 1e-6);
        assert!(scorer.similarity(1, &qv).abs() < 1e-6); // orthogonal
        assert_eq!(scorer.similarity(99, &qv), 0.0); // no vector
    }

    #[test]
    fn truncated_binary_disables_the_scorer() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("doc_vectors.bin");
        let word_path = dir.path().join("word_vectors.bin");
        write_doc_vectors(&doc_path, &[(0, basis(0, 1.0))]);
        write_word_vectors(&word_path, &[("machine", basis(0, 1.0))]);

        let bytes = std::fs::read(&doc_path).unwrap();
        std::fs::write(&doc_path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(SemanticScorer::load(&doc_path, &word_path).is_none());
    }
}
