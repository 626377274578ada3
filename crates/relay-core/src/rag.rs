//! RAG (Retrieval-Augmented Generation) engine trait

use async_trait::async_trait;

use crate::{AskRequest, AskResponse, IngestRequest, IngestResponse, Result};

/// Trait for RAG engines
///
/// Ingest embeds and stores a passage; ask retrieves the closest passages
/// and streams a grounded answer from the generation backend.
#[async_trait]
pub trait RagEngine: Send + Sync {
    /// Prepare the backing collection
    async fn initialize(&self) -> Result<()>;

    /// Embed and store a passage
    async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse>;

    /// Answer a question from the stored passages
    async fn ask(&self, request: AskRequest) -> Result<AskResponse>;

    /// Get statistics about the RAG engine
    async fn stats(&self) -> Result<serde_json::Value>;
}
