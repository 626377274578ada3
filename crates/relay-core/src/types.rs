//! Common types used across the RAG relay

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Payload key holding the indexed passage
pub const PAYLOAD_TEXT_KEY: &str = "text";

/// Fixed-length vector produced by an embedding model
pub type Embedding = Vec<f32>;

/// Identifier of a stored document
///
/// The vector index only accepts unsigned integers and UUIDs as point ids,
/// so those are the two accepted forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    Num(u64),
    Uuid(Uuid),
}

impl DocumentId {
    /// Random identifier for documents ingested without an id
    pub fn generate() -> Self {
        DocumentId::Uuid(Uuid::new_v4())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Num(n) => write!(f, "{}", n),
            DocumentId::Uuid(u) => write!(f, "{}", u),
        }
    }
}

impl FromStr for DocumentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u64>() {
            return Ok(DocumentId::Num(n));
        }
        Uuid::parse_str(s).map(DocumentId::Uuid).map_err(|_| {
            Error::InvalidInput(format!(
                "document id must be an unsigned integer or a UUID, got '{}'",
                s
            ))
        })
    }
}

impl From<u64> for DocumentId {
    fn from(n: u64) -> Self {
        DocumentId::Num(n)
    }
}

impl From<Uuid> for DocumentId {
    fn from(u: Uuid) -> Self {
        DocumentId::Uuid(u)
    }
}

/// A document as held by the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub text: String,
    pub vector: Embedding,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, text: impl Into<String>, vector: Embedding) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            vector,
        }
    }

    /// Payload persisted next to the vector
    pub fn payload(&self) -> HashMap<String, String> {
        HashMap::from([(PAYLOAD_TEXT_KEY.to_string(), self.text.clone())])
    }
}

/// One ranked hit from a similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub id: DocumentId,
    pub score: f32,
    pub payload: HashMap<String, String>,
}

impl ScoredDocument {
    /// The stored passage, if the payload carries one
    pub fn text(&self) -> Option<&str> {
        self.payload.get(PAYLOAD_TEXT_KEY).map(String::as_str)
    }
}

/// Ranked search hits, best first, at most `top_k` long
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub documents: Vec<ScoredDocument>,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Distance metric of a collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclid,
    Dot,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclid => "euclid",
            DistanceMetric::Dot => "dot",
        };
        f.write_str(name)
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclid" | "euclidean" => Ok(DistanceMetric::Euclid),
            "dot" | "dotproduct" => Ok(DistanceMetric::Dot),
            other => Err(Error::Configuration(format!(
                "unknown distance metric '{}'",
                other
            ))),
        }
    }
}

/// One decoded record from the generation stream
///
/// Any well-formed JSON record is an event. Fields of the wrong type, and
/// records that are not objects, carry no token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value")]
pub struct GenerationEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl From<serde_json::Value> for GenerationEvent {
    fn from(record: serde_json::Value) -> Self {
        Self {
            response: record
                .get("response")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            done: record.get("done").and_then(|v| v.as_bool()),
        }
    }
}

/// Body accepted by the ingest workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
}

impl IngestRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<DocumentId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Acknowledgement returned by the ingest workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
}

impl IngestResponse {
    pub fn stored() -> Self {
        Self {
            status: "stored".to_string(),
        }
    }
}

/// Body accepted by the ask workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
        }
    }
}

/// Answer returned by the ask workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_yaml_snapshot;

    #[test]
    fn test_document_id_forms() {
        let id: DocumentId = serde_json::from_str("1").unwrap();
        assert_eq!(id, DocumentId::Num(1));

        let id: DocumentId =
            serde_json::from_str("\"67e55044-10b1-426f-9247-bb680e5fe0c8\"").unwrap();
        assert!(matches!(id, DocumentId::Uuid(_)));

        assert!(serde_json::from_str::<DocumentId>("\"not-an-id\"").is_err());
        assert!("not-an-id".parse::<DocumentId>().is_err());
        assert_eq!("42".parse::<DocumentId>().unwrap(), DocumentId::Num(42));
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(DocumentId::generate(), DocumentId::generate());
    }

    #[test]
    fn test_distance_metric_parsing() {
        assert_eq!("Cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!("euclidean".parse::<DistanceMetric>().unwrap(), DistanceMetric::Euclid);
        assert_eq!("dot".parse::<DistanceMetric>().unwrap(), DistanceMetric::Dot);
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_ingest_request_wire_shape() {
        let req: IngestRequest =
            serde_json::from_str(r#"{"text": "Paris is the capital of France.", "id": 1}"#).unwrap();
        assert_eq!(req.id, Some(DocumentId::Num(1)));

        let req: IngestRequest = serde_json::from_str(r#"{"text": "no id"}"#).unwrap();
        assert_eq!(req.id, None);

        assert_yaml_snapshot!(IngestResponse::stored(), @r###"
        status: stored
        "###);
    }

    #[test]
    fn test_generation_event_ignores_unknown_fields() {
        let event: GenerationEvent =
            serde_json::from_str(r#"{"model":"llama3","response":"Paris","done":false}"#).unwrap();
        assert_eq!(event.response.as_deref(), Some("Paris"));
        assert_eq!(event.done, Some(false));

        let event: GenerationEvent = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert_eq!(event.response, None);
    }

    #[test]
    fn test_generation_event_tolerates_odd_shapes() {
        let event: GenerationEvent = serde_json::from_str(r#"{"response":5}"#).unwrap();
        assert_eq!(event, GenerationEvent::default());

        let event: GenerationEvent = serde_json::from_str("[1]").unwrap();
        assert_eq!(event, GenerationEvent::default());

        let event: GenerationEvent =
            serde_json::from_str(r#"{"response":null,"done":"yes"}"#).unwrap();
        assert_eq!(event, GenerationEvent::default());
    }

    #[test]
    fn test_scored_document_text() {
        let doc = Document::new(7u64, "hello", vec![1.0]);
        let hit = ScoredDocument {
            id: doc.id.clone(),
            score: 1.0,
            payload: doc.payload(),
        };
        assert_eq!(hit.text(), Some("hello"));
    }
}
