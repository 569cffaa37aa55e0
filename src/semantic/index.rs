//! In-memory vector index with cosine similarity search.
//!
//! A linear scan over at most a few hundred vectors; no ANN structure is
//! warranted at this scale.

use std::collections::HashMap;

/// An entry in the vector index.
#[derive(Debug, Clone)]
struct VectorEntry {
    id: u64,
    embedding: Vec<f32>,
}

/// Stores embeddings keyed by record ID, supporting insert and cosine
/// similarity search with optional candidate filtering.
///
/// Entries keep insertion order so that equal-score results tie-break by the
/// order records were indexed (the sort is stable).
pub struct VectorIndex {
    entries: Vec<VectorEntry>,
    by_id: HashMap<u64, usize>,
    /// Expected embedding dimensions
    dimensions: usize,
}

/// Search result from the vector index.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: u64,
    /// Cosine similarity, range [-1.0, 1.0]
    pub score: f32,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,
}

/// Cosine similarity between two equal-length vectors.
/// Returns `None` when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    Some(dot / (norm_a * norm_b))
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: Vec::new(),
            by_id: HashMap::new(),
            dimensions,
        }
    }

    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            by_id: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Insert or replace an entry.
    ///
    /// Rejects embeddings of the wrong dimensionality and zero-norm vectors
    /// (which cannot be scored).
    pub fn insert(&mut self, id: u64, embedding: Vec<f32>) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        if l2_norm(&embedding) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        match self.by_id.get(&id) {
            Some(&idx) => self.entries[idx].embedding = embedding,
            None => {
                self.by_id.insert(id, self.entries.len());
                self.entries.push(VectorEntry { id, embedding });
            }
        }

        Ok(())
    }

    /// Search for similar vectors using cosine similarity.
    ///
    /// # Arguments
    /// * `query` - The query embedding vector
    /// * `candidate_ids` - Optional set of IDs to search within
    /// * `limit` - Maximum number of results to return
    ///
    /// # Returns
    /// Results sorted by similarity score, highest first; ties keep insertion
    /// order.
    pub fn search(
        &self,
        query: &[f32],
        candidate_ids: Option<&[u64]>,
        limit: usize,
    ) -> Result<Vec<SearchResult>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        if l2_norm(query) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .filter(|entry| {
                candidate_ids
                    .map(|ids| ids.contains(&entry.id))
                    .unwrap_or(true)
            })
            .filter_map(|entry| {
                cosine_similarity(query, &entry.embedding)
                    .map(|score| SearchResult { id: entry.id, score })
            })
            .collect();

        // stable sort keeps insertion order for equal scores
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        results.truncate(limit);

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_index() {
        let index = VectorIndex::new(1536);
        assert_eq!(index.dimensions(), 1536);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_insert_and_contains() {
        let mut index = VectorIndex::new(3);
        index.insert(1, vec![1.0, 0.0, 0.0]).unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.contains(1));
        assert!(!index.contains(2));
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut index = VectorIndex::new(3);
        index.insert(1, vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(1, vec![0.0, 1.0, 0.0]).unwrap();

        assert_eq!(index.len(), 1);

        let results = index.search(&[0.0, 1.0, 0.0], None, 10).unwrap();
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut index = VectorIndex::new(3);
        let result = index.insert(1, vec![1.0, 0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_insert_zero_norm_rejected() {
        let mut index = VectorIndex::new(3);
        let result = index.insert(1, vec![0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(IndexError::ZeroNormVector)));
    }

    #[test]
    fn test_search_zero_query_rejected() {
        let mut index = VectorIndex::new(3);
        index.insert(1, vec![1.0, 0.0, 0.0]).unwrap();

        let result = index.search(&[0.0, 0.0, 0.0], None, 10);
        assert!(matches!(result, Err(IndexError::ZeroNormVector)));
    }

    #[test]
    fn test_search_orders_by_score() {
        let mut index = VectorIndex::new(3);
        index.insert(1, vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(2, vec![0.0, 1.0, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.1, 0.0], None, 10).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 1);
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_search_with_limit() {
        let mut index = VectorIndex::new(3);
        for i in 0..10 {
            index.insert(i, vec![1.0, i as f32 * 0.1, 0.0]).unwrap();
        }

        let results = index.search(&[1.0, 0.0, 0.0], None, 3).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_search_with_candidate_filter() {
        let mut index = VectorIndex::new(3);
        index.insert(1, vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(2, vec![0.9, 0.1, 0.0]).unwrap();
        index.insert(3, vec![0.8, 0.2, 0.0]).unwrap();

        let candidates = vec![2, 3];
        let results = index.search(&[1.0, 0.0, 0.0], Some(&candidates), 10).unwrap();

        assert!(!results.iter().any(|r| r.id == 1));
        assert!(results.iter().any(|r| r.id == 2));
        assert!(results.iter().any(|r| r.id == 3));
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        let mut index = VectorIndex::new(3);
        // identical vectors -> identical scores against any query
        index.insert(7, vec![1.0, 1.0, 0.0]).unwrap();
        index.insert(3, vec![1.0, 1.0, 0.0]).unwrap();
        index.insert(5, vec![1.0, 1.0, 0.0]).unwrap();

        let results = index.search(&[1.0, 1.0, 0.0], None, 10).unwrap();
        let ids: Vec<u64> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![7, 3, 5]);
    }

    #[test]
    fn test_cosine_similarity_symmetric() {
        let a = vec![0.3, -0.7, 0.2, 0.9];
        let b = vec![0.1, 0.4, -0.5, 0.8];

        let ab = cosine_similarity(&a, &b).unwrap();
        let ba = cosine_similarity(&b, &a).unwrap();
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_scale_invariant() {
        let a = vec![0.3, -0.7, 0.2];
        let b = vec![0.1, 0.4, -0.5];
        let scaled: Vec<f32> = a.iter().map(|x| x * 42.0).collect();

        let base = cosine_similarity(&a, &b).unwrap();
        let after = cosine_similarity(&scaled, &b).unwrap();
        assert!((base - after).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_similarity_zero_vector_is_none() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_none());
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]).is_none());
    }
}
