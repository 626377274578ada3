//! Vector index implementations

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfig;
use qdrant_client::qdrant::{
    CountPointsBuilder, CountResult, CreateCollectionBuilder, Distance, PointId, PointStruct,
    ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use relay_core::{
    DistanceMetric, Document, DocumentId, Error, Result, ScoredDocument, SearchResult, Stage,
    VectorIndex, check_dimension,
};

/// Documents and settings of one in-memory collection
struct LocalCollection {
    dimension: u64,
    metric: DistanceMetric,
    // Insertion order doubles as the tie-break order for equal scores.
    documents: Vec<Document>,
}

/// Local in-memory vector index implementation
pub struct LocalVectorIndex {
    collections: RwLock<HashMap<String, LocalCollection>>,
}

impl LocalVectorIndex {
    /// Create a new, empty in-memory index
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Simple cosine similarity calculation
    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot_product = Self::dot_product(a, b);
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }

    fn dot_product(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }

    /// Score as reported by the metric: similarity for cosine and dot,
    /// distance for euclid
    fn score(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
        match metric {
            DistanceMetric::Cosine => Self::cosine_similarity(a, b),
            DistanceMetric::Dot => Self::dot_product(a, b),
            DistanceMetric::Euclid => Self::euclidean_distance(a, b),
        }
    }

    fn lock_error(stage: Stage, e: impl std::fmt::Display) -> Error {
        Error::VectorIndex {
            stage,
            message: format!("Lock error: {}", e),
        }
    }

    fn missing_collection(stage: Stage, name: &str) -> Error {
        Error::VectorIndex {
            stage,
            message: format!("collection '{}' does not exist", name),
        }
    }
}

impl Default for LocalVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: u64,
        metric: DistanceMetric,
    ) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| Self::lock_error(Stage::Storage, e))?;

        if collections.contains_key(name) {
            debug!(collection = name, "collection already exists");
            return Ok(());
        }

        collections.insert(
            name.to_string(),
            LocalCollection {
                dimension,
                metric,
                documents: Vec::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, document: Document) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| Self::lock_error(Stage::Storage, e))?;

        let target = collections
            .get_mut(collection)
            .ok_or_else(|| Self::missing_collection(Stage::Storage, collection))?;

        check_dimension(target.dimension, &document.vector)?;

        match target.documents.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => target.documents.push(document),
        }
        Ok(())
    }

    async fn search(&self, collection: &str, query: &[f32], top_k: usize) -> Result<SearchResult> {
        let collections = self
            .collections
            .read()
            .map_err(|e| Self::lock_error(Stage::Retrieval, e))?;

        let target = collections
            .get(collection)
            .ok_or_else(|| Self::missing_collection(Stage::Retrieval, collection))?;

        check_dimension(target.dimension, query)?;

        let mut results: Vec<ScoredDocument> = target
            .documents
            .iter()
            .map(|doc| ScoredDocument {
                id: doc.id.clone(),
                score: Self::score(target.metric, query, &doc.vector),
                payload: doc.payload(),
            })
            .collect();

        match target.metric {
            DistanceMetric::Euclid => results.sort_by(|a, b| a.score.total_cmp(&b.score)),
            DistanceMetric::Cosine | DistanceMetric::Dot => {
                results.sort_by(|a, b| b.score.total_cmp(&a.score))
            }
        }

        results.truncate(top_k);

        Ok(SearchResult { documents: results })
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self
            .collections
            .read()
            .map_err(|e| Self::lock_error(Stage::Retrieval, e))?;

        collections
            .get(collection)
            .map(|c| c.documents.len())
            .ok_or_else(|| Self::missing_collection(Stage::Retrieval, collection))
    }
}

/// Qdrant-backed vector index
///
/// Collection dimensions are learned from `ensure_collection` or, for
/// collections created elsewhere, from the collection info on first use,
/// so mismatched vectors are rejected before they reach the server.
pub struct QdrantIndex {
    client: Qdrant,
    dimensions: RwLock<HashMap<String, u64>>,
}

impl QdrantIndex {
    /// Connect to a Qdrant instance
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(api_key) = api_key {
            builder = builder.api_key(api_key);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Configuration(format!("Qdrant connection failed: {}", e)))?;

        Ok(Self {
            client,
            dimensions: RwLock::new(HashMap::new()),
        })
    }

    fn remember_dimension(&self, collection: &str, dimension: u64) -> Result<()> {
        let mut dimensions = self
            .dimensions
            .write()
            .map_err(|e| LocalVectorIndex::lock_error(Stage::Storage, e))?;
        dimensions.insert(collection.to_string(), dimension);
        Ok(())
    }

    /// Configured vector size of `collection`
    async fn collection_dimension(&self, stage: Stage, collection: &str) -> Result<u64> {
        let cached = self
            .dimensions
            .read()
            .map_err(|e| LocalVectorIndex::lock_error(stage, e))?
            .get(collection)
            .copied();
        if let Some(dimension) = cached {
            return Ok(dimension);
        }

        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| Error::VectorIndex {
                stage,
                message: format!("Qdrant collection info failed: {}", e),
            })?;

        let dimension = info
            .result
            .and_then(|i| i.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|config| match config {
                VectorsConfig::Params(params) => Some(params.size),
                VectorsConfig::ParamsMap(_) => None,
            })
            .ok_or_else(|| Error::VectorIndex {
                stage,
                message: format!(
                    "collection '{}' has no single unnamed vector configuration",
                    collection
                ),
            })?;

        self.remember_dimension(collection, dimension)?;
        Ok(dimension)
    }
}

/// Convert DistanceMetric to Qdrant's Distance enum.
fn to_qdrant_distance(metric: DistanceMetric) -> Distance {
    match metric {
        DistanceMetric::Cosine => Distance::Cosine,
        DistanceMetric::Euclid => Distance::Euclid,
        DistanceMetric::Dot => Distance::Dot,
    }
}

/// True when a collection-creation failure only says the collection exists
pub(crate) fn is_already_exists(message: &str) -> bool {
    message.to_lowercase().contains("already exists")
}

/// Ok(true) when the collection was created, Ok(false) when it already existed
fn creation_outcome<E: fmt::Display>(
    name: &str,
    created: std::result::Result<(), E>,
) -> Result<bool> {
    match created {
        Ok(()) => Ok(true),
        Err(e) if is_already_exists(&e.to_string()) => Ok(false),
        Err(e) => Err(Error::VectorIndex {
            stage: Stage::Storage,
            message: format!("Failed to create Qdrant collection '{}': {}", name, e),
        }),
    }
}

/// An existing collection must match the configured vector size
fn check_existing_dimension(name: &str, configured: u64, existing: u64) -> Result<()> {
    if configured != existing {
        return Err(Error::Configuration(format!(
            "collection '{}' stores {}-dimensional vectors but {} is configured",
            name, existing, configured
        )));
    }
    Ok(())
}

fn stored_count(collection: &str, result: Option<CountResult>) -> Result<usize> {
    result
        .map(|c| c.count as usize)
        .ok_or_else(|| Error::InvalidResponse {
            stage: Stage::Retrieval,
            detail: format!("Qdrant count for '{}' returned no result", collection),
        })
}

fn to_point_id(id: &DocumentId) -> PointId {
    match id {
        DocumentId::Num(n) => (*n).into(),
        DocumentId::Uuid(u) => u.to_string().into(),
    }
}

fn from_point_id(id: Option<PointId>) -> Option<DocumentId> {
    match id?.point_id_options? {
        PointIdOptions::Num(n) => Some(DocumentId::Num(n)),
        PointIdOptions::Uuid(s) => Uuid::parse_str(&s).ok().map(DocumentId::Uuid),
    }
}

fn document_to_point(document: Document) -> PointStruct {
    let payload: HashMap<String, Value> = document
        .payload()
        .into_iter()
        .map(|(key, value)| (key, value.into()))
        .collect();

    PointStruct::new(to_point_id(&document.id), document.vector, payload)
}

fn scored_point_to_result(point: ScoredPoint) -> Option<ScoredDocument> {
    let id = from_point_id(point.id)?;

    let payload = point
        .payload
        .into_iter()
        .filter_map(|(key, value)| match value.kind {
            Some(Kind::StringValue(s)) => Some((key, s)),
            _ => None,
        })
        .collect();

    Some(ScoredDocument {
        id,
        score: point.score,
        payload,
    })
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: u64,
        metric: DistanceMetric,
    ) -> Result<()> {
        let created = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimension, to_qdrant_distance(metric))),
            )
            .await;

        if creation_outcome(name, created.map(|_| ()))? {
            debug!(collection = name, dimension, %metric, "created collection");
            return self.remember_dimension(name, dimension);
        }

        debug!(collection = name, "collection already exists");
        let existing = self.collection_dimension(Stage::Storage, name).await?;
        check_existing_dimension(name, dimension, existing)
    }

    async fn upsert(&self, collection: &str, document: Document) -> Result<()> {
        let dimension = self.collection_dimension(Stage::Storage, collection).await?;
        check_dimension(dimension, &document.vector)?;

        let point = document_to_point(document);
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, vec![point]).wait(true))
            .await
            .map_err(|e| Error::VectorIndex {
                stage: Stage::Storage,
                message: format!("Qdrant upsert failed: {}", e),
            })?;
        Ok(())
    }

    async fn search(&self, collection: &str, query: &[f32], top_k: usize) -> Result<SearchResult> {
        let dimension = self.collection_dimension(Stage::Retrieval, collection).await?;
        check_dimension(dimension, query)?;

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, query.to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| Error::VectorIndex {
                stage: Stage::Retrieval,
                message: format!("Qdrant search failed: {}", e),
            })?;

        let documents = response
            .result
            .into_iter()
            .filter_map(scored_point_to_result)
            .collect();

        Ok(SearchResult { documents })
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(|e| Error::VectorIndex {
                stage: Stage::Retrieval,
                message: format!("Qdrant count failed: {}", e),
            })?;
        stored_count(collection, response.result)
    }
}
