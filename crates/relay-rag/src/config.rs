//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use relay_core::{DistanceMetric, Error, Result, TrailingPolicy};

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "docs";
pub const DEFAULT_DIMENSION: u64 = 768;
pub const DEFAULT_TOP_K: usize = 3;

const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_INDEX_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for the RAG orchestrator and its vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    pub qdrant_url: String,
    #[serde(skip_serializing)]
    pub qdrant_api_key: Option<String>,
    pub collection: String,
    pub dimension: u64,
    pub metric: DistanceMetric,
    pub top_k: usize,
    pub trailing_policy: TrailingPolicy,
    pub embed_timeout: Duration,
    pub index_timeout: Duration,
    pub generation_timeout: Duration,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            qdrant_api_key: None,
            collection: DEFAULT_COLLECTION.to_string(),
            dimension: DEFAULT_DIMENSION,
            metric: DistanceMetric::Cosine,
            top_k: DEFAULT_TOP_K,
            trailing_policy: TrailingPolicy::Discard,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            index_timeout: DEFAULT_INDEX_TIMEOUT,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Configuration(format!("{} has an invalid value '{}'", key, raw)))
}

impl RagConfig {
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
        let mut config = Self::default();

        if let Some(url) = lookup("QDRANT_URL") {
            config.qdrant_url = url;
        }
        config.qdrant_api_key = lookup("QDRANT_API_KEY").filter(|k| !k.is_empty());
        if let Some(collection) = lookup("RAG_COLLECTION") {
            config.collection = collection;
        }
        if let Some(raw) = lookup("RAG_EMBEDDING_DIMENSION") {
            config.dimension = parse_var("RAG_EMBEDDING_DIMENSION", &raw)?;
        }
        if let Some(raw) = lookup("RAG_DISTANCE") {
            config.metric = raw.parse()?;
        }
        if let Some(raw) = lookup("RAG_TOP_K") {
            config.top_k = parse_var("RAG_TOP_K", &raw)?;
        }
        if let Some(raw) = lookup("RAG_TRAILING_POLICY") {
            config.trailing_policy = raw.parse()?;
        }
        if let Some(raw) = lookup("RAG_EMBED_TIMEOUT_SECS") {
            config.embed_timeout = Duration::from_secs(parse_var("RAG_EMBED_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = lookup("RAG_INDEX_TIMEOUT_SECS") {
            config.index_timeout = Duration::from_secs(parse_var("RAG_INDEX_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = lookup("RAG_GENERATION_TIMEOUT_SECS") {
            config.generation_timeout =
                Duration::from_secs(parse_var("RAG_GENERATION_TIMEOUT_SECS", &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            return Err(Error::Configuration("collection name must not be empty".to_string()));
        }
        if self.dimension == 0 {
            return Err(Error::Configuration("embedding dimension must be positive".to_string()));
        }
        if self.top_k == 0 {
            return Err(Error::Configuration("top-k must be at least 1".to_string()));
        }
        for (name, limit) in [
            ("embed", self.embed_timeout),
            ("index", self.index_timeout),
            ("generation", self.generation_timeout),
        ] {
            if limit.is_zero() {
                return Err(Error::Configuration(format!("{} timeout must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_dimension(mut self, dimension: u64) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_trailing_policy(mut self, policy: TrailingPolicy) -> Self {
        self.trailing_policy = policy;
        self
    }

    pub fn with_generation_timeout(mut self, limit: Duration) -> Self {
        self.generation_timeout = limit;
        self
    }
}
