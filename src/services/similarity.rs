use ndarray::{Array1, Array2};
use serde::Deserialize;
use std::cmp::Ordering;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

use crate::error::{ApiError, Result};

/// One nearest-neighbor result: a playlist identifier and its cosine
/// similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityHit {
    pub id: String,
    pub score: f32,
}

/// Exact cosine-similarity index over a playlist embedding table.
///
/// Rows are unit-normalized at build time, so a query is one matrix-vector
/// product over the whole table. Results come from a stable descending sort:
/// equal scores keep table insertion order, which makes repeated queries
/// against the same loaded table fully deterministic.
#[derive(Debug)]
pub struct SimilarityIndex {
    ids: Vec<String>,
    vectors: Array2<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRecord {
    embedding: Vec<f32>,
}

impl SimilarityIndex {
    /// Builds the index from (playlist id, embedding) pairs. The vector
    /// dimension is taken from the first entry; ragged entries are rejected.
    pub fn build(entries: Vec<(String, Vec<f32>)>) -> Result<Self> {
        let dimension = entries
            .first()
            .map(|(_, vector)| vector.len())
            .ok_or_else(|| ApiError::InternalError("embedding table is empty".to_string()))?;

        let mut ids = Vec::with_capacity(entries.len());
        let mut flat = Vec::with_capacity(entries.len() * dimension);
        for (id, vector) in entries {
            if vector.len() != dimension {
                return Err(ApiError::DimensionMismatch {
                    expected: dimension,
                    got: vector.len(),
                });
            }
            flat.extend(unit_normalized(&vector));
            ids.push(id);
        }

        let vectors = Array2::from_shape_vec((ids.len(), dimension), flat)?;
        Ok(SimilarityIndex { ids, vectors })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    /// The `top_k` most similar entries, descending by cosine score.
    pub fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SimilarityHit>> {
        if vector.len() != self.dimension() {
            return Err(ApiError::DimensionMismatch {
                expected: self.dimension(),
                got: vector.len(),
            });
        }

        let query = Array1::from(unit_normalized(vector));
        let scores = self.vectors.dot(&query);

        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked.truncate(top_k);

        Ok(ranked
            .into_iter()
            .map(|(idx, score)| SimilarityHit {
                id: self.ids[idx].clone(),
                score,
            })
            .collect())
    }
}

fn unit_normalized(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter().map(|x| x / norm).collect()
    } else {
        vector.to_vec()
    }
}

/// Loads a persisted embedding table: a JSON object mapping playlist id to a
/// record with an `embedding` array. File order is kept (serde_json runs with
/// `preserve_order`), so index construction is reproducible run to run.
pub fn load_embedding_table(path: &Path) -> Result<Vec<(String, Vec<f32>)>> {
    let file = File::open(path).map_err(|e| {
        ApiError::InternalError(format!(
            "cannot open embedding table {}: {}",
            path.display(),
            e
        ))
    })?;
    let table: serde_json::Map<String, serde_json::Value> =
        serde_json::from_reader(BufReader::new(file))?;

    let mut entries = Vec::with_capacity(table.len());
    for (pid, value) in table {
        let record: EmbeddingRecord = serde_json::from_value(value)?;
        entries.push((pid, record.embedding));
    }

    info!(
        "Loaded {} playlist embeddings from {}",
        entries.len(),
        path.display()
    );
    Ok(entries)
}
