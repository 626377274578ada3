//! RAG orchestrator implementation

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use relay_core::{
    AskRequest, AskResponse, DocumentId, Document, EmbeddingProvider, Error, GenerationEvent,
    GenerationProvider, IngestRequest, IngestResponse, RagEngine, Result, ScoredDocument,
    SearchResult, Stage, VectorIndex, check_dimension, decode_stream,
};

use crate::config::RagConfig;

/// Run `fut` under a deadline, reporting expiry against `stage`
///
/// Expiry drops the future, which cancels the in-flight request and
/// releases any stream it holds.
async fn bounded<T, F>(stage: Stage, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(stage)),
    }
}

/// Drives the ingest and ask workflows over shared, immutable collaborators
pub struct RagOrchestrator<E, V, G> {
    embedder: Arc<E>,
    index: Arc<V>,
    generator: Arc<G>,
    config: RagConfig,
}

impl<E, V, G> RagOrchestrator<E, V, G>
where
    E: EmbeddingProvider,
    V: VectorIndex,
    G: GenerationProvider,
{
    /// Create a new orchestrator
    pub fn new(embedder: Arc<E>, index: Arc<V>, generator: Arc<G>, config: RagConfig) -> Self {
        Self {
            embedder,
            index,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Newline-joined passages in result order; hits without text are skipped
    pub fn build_context(results: &SearchResult) -> String {
        results
            .documents
            .iter()
            .filter_map(ScoredDocument::text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Prompt restricting the backend to the retrieved context
    pub fn compose_prompt(context: &str, question: &str) -> String {
        format!(
            "Answer using context only:\n{}\n\nQuestion: {}",
            context, question
        )
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        bounded(
            Stage::Embedding,
            self.config.embed_timeout,
            self.embedder.embed(text),
        )
        .await
    }

    /// Stream a generation and concatenate its response tokens
    ///
    /// The whole exchange, from request to last fragment, shares one
    /// deadline. On failure the tokens gathered so far are dropped.
    async fn stream_answer(&self, prompt: &str) -> Result<String> {
        let exchange = async {
            let fragments = self.generator.generate_stream(prompt).await?;
            let mut events = pin!(decode_stream::<GenerationEvent, _>(
                fragments,
                self.config.trailing_policy,
            ));

            let mut answer = String::new();
            let mut saw_done = false;
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        debug!(discarded_bytes = answer.len(), "dropping partial answer");
                        return Err(e);
                    }
                };
                if let Some(token) = event.response {
                    answer.push_str(&token);
                }
                if event.done == Some(true) {
                    saw_done = true;
                }
            }

            if !saw_done {
                debug!("generation stream ended without a done marker");
            }
            Ok(answer)
        };

        bounded(Stage::Generation, self.config.generation_timeout, exchange).await
    }
}

#[async_trait]
impl<E, V, G> RagEngine for RagOrchestrator<E, V, G>
where
    E: EmbeddingProvider + 'static,
    V: VectorIndex + 'static,
    G: GenerationProvider + 'static,
{
    async fn initialize(&self) -> Result<()> {
        bounded(
            Stage::Storage,
            self.config.index_timeout,
            self.index.ensure_collection(
                &self.config.collection,
                self.config.dimension,
                self.config.metric,
            ),
        )
        .await?;

        info!(
            collection = %self.config.collection,
            dimension = self.config.dimension,
            metric = %self.config.metric,
            "collection ready"
        );
        Ok(())
    }

    async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse> {
        if request.text.trim().is_empty() {
            return Err(Error::InvalidInput("text must not be empty".to_string()));
        }

        let id = request.id.unwrap_or_else(DocumentId::generate);
        let vector = self.embed(&request.text).await?;
        check_dimension(self.config.dimension, &vector)?;

        let document = Document {
            id: id.clone(),
            text: request.text,
            vector,
        };
        bounded(
            Stage::Storage,
            self.config.index_timeout,
            self.index.upsert(&self.config.collection, document),
        )
        .await?;

        info!(%id, collection = %self.config.collection, "document stored");
        Ok(IngestResponse::stored())
    }

    async fn ask(&self, request: AskRequest) -> Result<AskResponse> {
        let question = request.question;
        if question.trim().is_empty() {
            return Err(Error::InvalidInput("question must not be empty".to_string()));
        }

        let vector = self.embed(&question).await?;
        let results = bounded(
            Stage::Retrieval,
            self.config.index_timeout,
            self.index
                .search(&self.config.collection, &vector, self.config.top_k),
        )
        .await?;
        debug!(hits = results.len(), "retrieved context");

        let context = Self::build_context(&results);
        let prompt = Self::compose_prompt(&context, &question);
        let answer = self.stream_answer(&prompt).await?;

        info!(hits = results.len(), answer_bytes = answer.len(), "question answered");
        Ok(AskResponse { answer })
    }

    async fn stats(&self) -> Result<serde_json::Value> {
        let documents = bounded(
            Stage::Retrieval,
            self.config.index_timeout,
            self.index.count(&self.config.collection),
        )
        .await?;

        Ok(json!({
            "collection": self.config.collection,
            "dimension": self.config.dimension,
            "metric": self.config.metric,
            "top_k": self.config.top_k,
            "documents": documents,
            "embedding_model": self.embedder.model_id(),
            "generation_model": self.generator.model_id(),
        }))
    }
}
