//! Vector index trait

use async_trait::async_trait;

use crate::{DistanceMetric, Document, Error, Result, SearchResult};

/// Trait for vector indexes (e.g., Qdrant, in-memory)
///
/// Implementations own the stored documents. `upsert` must reject a vector
/// whose length disagrees with the collection dimension before anything is
/// written.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection unless it already exists
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: u64,
        metric: DistanceMetric,
    ) -> Result<()>;

    /// Insert or replace a document keyed by its id
    async fn upsert(&self, collection: &str, document: Document) -> Result<()>;

    /// Return the `top_k` nearest documents, best first
    async fn search(&self, collection: &str, query: &[f32], top_k: usize) -> Result<SearchResult>;

    /// Number of documents stored in the collection
    async fn count(&self, collection: &str) -> Result<usize>;
}

/// Fails with `DimensionMismatch` unless `vector` has `expected` entries
pub fn check_dimension(expected: u64, vector: &[f32]) -> Result<()> {
    if vector.len() as u64 != expected {
        return Err(Error::DimensionMismatch {
            expected: expected as usize,
            actual: vector.len(),
        });
    }
    Ok(())
}
