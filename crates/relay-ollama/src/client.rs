//! Ollama client implementation

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use relay_core::{
    ByteStream, Embedding, EmbeddingProvider, Error, GenerationProvider, Result, Stage,
};

use crate::config::OllamaConfig;

const EMBEDDINGS_PATH: &str = "api/embeddings";
const GENERATE_PATH: &str = "api/generate";

/// Ollama client for embeddings and streamed generation
pub struct OllamaClient {
    config: OllamaConfig,
    client: Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

impl OllamaClient {
    /// Model constants
    pub const NOMIC_EMBED_TEXT: &'static str = "nomic-embed-text";
    pub const LLAMA3: &'static str = "llama3";

    /// Create a new Ollama client from configuration
    ///
    /// Only connection setup is bounded here; request and stream deadlines
    /// belong to the caller.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create a new Ollama client from environment variables
    pub fn from_env() -> Result<Self> {
        let config = OllamaConfig::from_env()?;
        Self::new(config)
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// POST a JSON body, turning transport failures and non-success
    /// statuses into stage-tagged errors
    async fn post_json<B: Serialize + ?Sized>(
        &self,
        stage: Stage,
        path: &str,
        body: &B,
    ) -> Result<Response> {
        let url = self.endpoint(path);
        debug!(%stage, %url, "sending request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Network {
                stage,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Upstream { stage, status, body });
        }

        Ok(response)
    }
}

/// Extract the `embedding` array from an embeddings response body
pub(crate) fn parse_embedding(body: &[u8]) -> Result<Embedding> {
    let invalid = |detail: String| Error::InvalidResponse {
        stage: Stage::Embedding,
        detail,
    };

    let json: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| invalid(format!("response body is not JSON: {}", e)))?;

    let values = json
        .get("embedding")
        .ok_or_else(|| invalid("missing 'embedding' field".to_string()))?
        .as_array()
        .ok_or_else(|| invalid("'embedding' is not an array".to_string()))?;

    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64()
                .map(|x| x as f32)
                .ok_or_else(|| invalid(format!("'embedding[{}]' is not a number", i)))
        })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            prompt: text,
        };

        let response = self
            .post_json(Stage::Embedding, EMBEDDINGS_PATH, &request)
            .await?;

        let body = response.bytes().await.map_err(|e| Error::Network {
            stage: Stage::Embedding,
            message: e.to_string(),
        })?;

        let embedding = parse_embedding(&body)?;
        debug!(dimension = embedding.len(), "received embedding");
        Ok(embedding)
    }

    fn model_id(&self) -> &str {
        &self.config.embedding_model
    }
}

#[async_trait]
impl GenerationProvider for OllamaClient {
    async fn generate_stream(&self, prompt: &str) -> Result<ByteStream> {
        let request = GenerationRequest {
            model: &self.config.generation_model,
            prompt,
            stream: true,
        };

        let response = self
            .post_json(Stage::Generation, GENERATE_PATH, &request)
            .await?;

        let fragments = response.bytes_stream().map_err(|e| Error::Network {
            stage: Stage::Generation,
            message: e.to_string(),
        });

        Ok(Box::pin(fragments))
    }

    fn model_id(&self) -> &str {
        &self.config.generation_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embedding() {
        let embedding = parse_embedding(br#"{"embedding":[0.5,-1,2.25]}"#).unwrap();
        assert_eq!(embedding, vec![0.5, -1.0, 2.25]);
    }

    #[test]
    fn test_parse_embedding_rejects_bad_shapes() {
        for body in [
            &br#"{"vector":[1.0]}"#[..],
            br#"{"embedding":"1,2,3"}"#,
            br#"{"embedding":[1.0,"two"]}"#,
            br#"{"embedding":null}"#,
            b"not json",
        ] {
            let err = parse_embedding(body).unwrap_err();
            assert!(
                matches!(err, Error::InvalidResponse { stage: Stage::Embedding, .. }),
                "unexpected error for {:?}: {}",
                String::from_utf8_lossy(body),
                err
            );
        }
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = OllamaClient::new(OllamaConfig::new("http://ollama:11434/")).unwrap();
        assert_eq!(client.endpoint(GENERATE_PATH), "http://ollama:11434/api/generate");
    }
}
