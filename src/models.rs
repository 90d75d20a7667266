use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A metadata value: either a single string or a list of strings
/// (e.g. several researcher names on one record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Text(String),
    List(Vec<String>),
}

impl MetaValue {
    /// Render the value as a single display string. Lists are joined
    /// with ", ".
    pub fn as_text(&self) -> String {
        match self {
            MetaValue::Text(s) => s.clone(),
            MetaValue::List(items) => items.join(", "),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

/// A stored research record. Write-once per index build; the embedding is
/// assigned at index time and stays `None` for documents that were never
/// embedded (lexical-only stores).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub meta: HashMap<String, MetaValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            meta: HashMap::new(),
            embedding: None,
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    /// The attribution field used in prompts and result listings.
    pub fn researcher_name(&self) -> Option<String> {
        self.meta.get("researcher_name").map(|v| v.as_text())
    }

    pub fn title(&self) -> Option<String> {
        self.meta.get("title").map(|v| v.as_text())
    }
}

/// A document plus the score of whatever stage produced it. Transient:
/// score scales differ per stage (raw BM25, cosine, cross-encoder) and
/// must never be compared across stages.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub doc: Document,
    pub score: f32,
}

/// A single chat turn (user or assistant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Chat request from the web UI.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub cutoff: f32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,
    /// Generation model override for this turn.
    pub model: Option<String>,
}

fn default_top_k() -> usize {
    8
}

fn default_temperature() -> f32 {
    0.1
}

fn default_num_predict() -> u32 {
    8000
}

/// One retrieved source sent in the SSE `context` event.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnippet {
    pub id: String,
    pub researcher_name: Option<String>,
    pub title: Option<String>,
    pub score: f32,
}

/// Models listing response for the UI selector.
#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub provider: String,
    pub models: Vec<String>,
    pub default_model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_value_deserializes_string() {
        let v: MetaValue = serde_json::from_str("\"P. Berck\"").unwrap();
        assert_eq!(v, MetaValue::Text("P. Berck".to_string()));
    }

    #[test]
    fn test_meta_value_deserializes_list() {
        let v: MetaValue = serde_json::from_str("[\"A\",\"B\"]").unwrap();
        assert_eq!(v.as_text(), "A, B");
    }

    #[test]
    fn test_document_researcher_name_missing() {
        let doc = Document::new("ID000001", "some abstract");
        assert!(doc.researcher_name().is_none());
    }

    #[test]
    fn test_document_round_trips_without_embedding() {
        let doc = Document::new("ID000001", "text").with_meta("title", "A title");
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("embedding"));
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "ID000001");
        assert!(back.embedding.is_none());
    }

    #[test]
    fn test_chat_request_defaults() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(req.top_k, 8);
        assert_eq!(req.cutoff, 0.0);
        assert!((req.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(req.num_predict, 8000);
        assert!(req.model.is_none());
    }
}
