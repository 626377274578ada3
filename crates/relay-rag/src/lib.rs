//! Retrieval-augmented generation pipeline for the RAG relay
//!
//! This crate provides the vector indexes (Qdrant and in-memory), the
//! pipeline configuration, and the orchestrator that drives ingest and ask.

mod config;
mod engine;
mod vector_store;


pub use config::{DEFAULT_COLLECTION, DEFAULT_DIMENSION, DEFAULT_QDRANT_URL, DEFAULT_TOP_K, RagConfig};
pub use engine::RagOrchestrator;
pub use vector_store::{LocalVectorIndex, QdrantIndex};

// Re-export core types for convenience
pub use relay_core::{
    AskRequest, AskResponse, DistanceMetric, Document, DocumentId, Error, IngestRequest,
    IngestResponse, RagEngine, Result, SearchResult, Stage, TrailingPolicy, VectorIndex,
};
