//! Ollama configuration

use serde::{Deserialize, Serialize};
use std::env;
use relay_core::{Error, Result};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_GENERATION_MODEL: &str = "llama3";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Configuration for the Ollama embedding/generation client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub connect_timeout_secs: u64,
}

impl OllamaConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("OLLAMA_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::Configuration(format!(
                "OLLAMA_URL must be an http(s) URL, got '{}'",
                base_url
            )));
        }

        let embedding_model = lookup("OLLAMA_EMBED_MODEL")
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());

        let generation_model = lookup("OLLAMA_GENERATE_MODEL")
            .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string());

        let connect_timeout_secs = match lookup("OLLAMA_CONNECT_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::Configuration(format!(
                    "OLLAMA_CONNECT_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    raw
                ))
            })?,
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        };

        Ok(Self {
            base_url,
            embedding_model,
            generation_model,
            connect_timeout_secs,
        })
    }

    /// Create configuration with explicit values
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
