//! Core traits and types for the RAG relay
//!
//! This crate defines the seams of the ingest/ask pipeline: embedding and
//! generation providers, the vector index, the RAG engine, the shared data
//! model and error taxonomy, and the incremental NDJSON decoder used to
//! consume streamed generations.

pub mod decoder;
pub mod error;
pub mod llm;
pub mod rag;
pub mod types;
pub mod vector_store;

pub use decoder::{LineDecoder, TrailingPolicy, decode_stream};
pub use error::{Error, Result, Stage};
pub use llm::{ByteStream, EmbeddingProvider, GenerationProvider};
pub use rag::RagEngine;
pub use types::*;
pub use vector_store::{VectorIndex, check_dimension};
