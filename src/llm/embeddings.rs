use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

/// Maximum characters to send per text to the embedding API.
/// nomic-embed-text has an 8 192-token context; abstracts tokenise at
/// roughly 1 token per 3-4 chars, so 3 000 chars stays comfortably under
/// the limit even for dense text. Ollama's `truncate: true` is also sent
/// but has been unreliable for over-length inputs.
const MAX_EMBED_CHARS: usize = 3_000;

/// Embedding seam: the pipeline only needs "texts in, vectors out".
/// The HTTP client below is the production implementation; tests provide
/// deterministic local embedders.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results.into_iter().next().context("No embedding returned")
    }
}

/// Embedder over the configured LLM provider (Ollama or OpenAI-compatible).
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_for_embedding(t).to_string())
            .collect();

        match self.config.provider.as_str() {
            "ollama" => embed_ollama(&self.client, &self.config, &truncated).await,
            "openai" => embed_openai(&self.client, &self.config, &truncated).await,
            other => anyhow::bail!("Unknown LLM provider: {other}"),
        }
    }
}

/// Truncate `text` to at most `MAX_EMBED_CHARS`, splitting on a UTF-8 char
/// boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
    /// Ask Ollama to silently truncate inputs that exceed the model's
    /// context length instead of returning a 400 error.
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/api/embed", config.base_url);

    let batch_size = 32;
    let mut all_embeddings = Vec::new();

    for chunk in texts.chunks(batch_size) {
        let req = OllamaEmbedRequest {
            model: config.embedding_model.clone(),
            input: chunk.to_vec(),
            truncate: true,
        };

        let resp = client
            .post(&url)
            .json(&req)
            .send()
            .await
            .context("Failed to call Ollama embed API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ollama embed API returned {status}: {body}");
        }

        let body: OllamaEmbedResponse = resp
            .json()
            .await
            .context("Failed to parse Ollama embed response")?;

        all_embeddings.extend(body.embeddings);
    }

    Ok(all_embeddings)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    embedding: Vec<f32>,
}

async fn embed_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/v1/embeddings", config.base_url);
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let batch_size = 64;
    let mut all_embeddings = Vec::new();

    for chunk in texts.chunks(batch_size) {
        let req = OpenAiEmbedRequest {
            model: config.embedding_model.clone(),
            input: chunk.to_vec(),
        };

        let resp = client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&req)
            .send()
            .await
            .context("Failed to call OpenAI embed API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI embed API returned {status}: {body}");
        }

        let body: OpenAiEmbedResponse = resp
            .json()
            .await
            .context("Failed to parse OpenAI embed response")?;

        let mut embeddings: Vec<Vec<f32>> = body.data.into_iter().map(|d| d.embedding).collect();
        all_embeddings.append(&mut embeddings);
    }

    Ok(all_embeddings)
}

/// Text embedded for a document at index time: title and researcher names
/// are prepended to the content so they contribute to the vector, matching
/// the index-time configuration the query embedder must stay compatible
/// with.
pub fn document_embedding_text(doc: &crate::models::Document) -> String {
    let mut parts = Vec::new();
    if let Some(title) = doc.title() {
        parts.push(title);
    }
    if let Some(name) = doc.researcher_name() {
        parts.push(name);
    }
    parts.push(doc.content.clone());
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_for_embedding("hello"), "hello");
    }

    #[test]
    fn test_truncate_long_text() {
        let long = "a".repeat(5000);
        assert_eq!(truncate_for_embedding(&long).len(), MAX_EMBED_CHARS);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let mut s = "a".repeat(MAX_EMBED_CHARS - 1);
        s.push('🌍'); // 4-byte char straddling the limit
        let out = truncate_for_embedding(&s);
        assert!(out.len() < MAX_EMBED_CHARS);
        assert!(out.is_char_boundary(out.len()));
    }

    #[test]
    fn test_document_embedding_text_includes_meta() {
        let doc = Document::new("ID000001", "An abstract about lichen.")
            .with_meta("researcher_name", "P. Berck")
            .with_meta("title", "Lichen studies");
        let text = document_embedding_text(&doc);
        assert!(text.contains("Lichen studies"));
        assert!(text.contains("P. Berck"));
        assert!(text.contains("An abstract about lichen."));
    }

    #[test]
    fn test_document_embedding_text_without_meta() {
        let doc = Document::new("ID000001", "Just content");
        assert_eq!(document_embedding_text(&doc), "Just content");
    }
}
