//! Ollama integration for the RAG relay
//!
//! This crate provides the Ollama implementation of the embedding and
//! streaming generation provider traits.

mod client;
mod config;

#[cfg(test)]
mod tests;

pub use client::OllamaClient;
pub use config::OllamaConfig;

// Re-export core types for convenience
pub use relay_core::{
    ByteStream, Embedding, EmbeddingProvider, Error, GenerationProvider, Result, Stage,
};
