//! Embedding and generation provider traits

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::{Embedding, Result};

/// Raw fragments of a streamed generation response, in arrival order
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Trait for embedding backends
///
/// One call to `embed` issues exactly one upstream request. No retries,
/// no caching.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Turn `text` into a vector
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Get the model ID being used
    fn model_id(&self) -> &str;
}

/// Trait for streaming text generation backends
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Start a generation and return its undecoded NDJSON body
    ///
    /// A non-success status is reported here, before any fragment is
    /// yielded.
    async fn generate_stream(&self, prompt: &str) -> Result<ByteStream>;

    /// Get the model ID being used
    fn model_id(&self) -> &str;
}
