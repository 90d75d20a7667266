//! Completion generation, streaming and non-streaming, for Ollama and
//! OpenAI-compatible backends.
//!
//! Streaming yields a lazy, finite, non-restartable sequence of content
//! fragments; the caller threads an explicit accumulator over it. The
//! consumer may stop early, which simply leaves the accumulator at
//! whatever has arrived.

use anyhow::{Context, Result};
use futures_util::stream::{Stream, StreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::{GenerationParams, LlmConfig};

pub type GenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Stream a completion for a finished prompt.
/// Returns a stream of content delta strings (one per token/chunk).
pub async fn stream_generate(
    client: &reqwest::Client,
    config: &LlmConfig,
    model: &str,
    prompt: &str,
    params: &GenerationParams,
) -> Result<GenStream> {
    match config.provider.as_str() {
        "ollama" => stream_ollama(client, config, model, prompt, params).await,
        "openai" => stream_openai(client, config, model, prompt, params).await,
        other => anyhow::bail!("Unsupported LLM provider for generation: {other}"),
    }
}

/// Full completion text in one call. The reasoning trace, if any, is
/// stripped before the text is returned.
pub async fn generate(
    client: &reqwest::Client,
    config: &LlmConfig,
    model: &str,
    prompt: &str,
    params: &GenerationParams,
) -> Result<String> {
    let mut stream = stream_generate(client, config, model, prompt, params).await?;
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(&chunk?);
    }
    Ok(strip_reasoning(&text))
}

/// Remove a model's `<think>…</think>` reasoning trace from the answer.
/// Non-greedy, matches across newlines, applied once over the full text.
pub fn strip_reasoning(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());
    re.replace_all(text, "").into_owned()
}

// ─── Ollama streaming ────────────────────────────────────

#[derive(Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f32,
    num_ctx: u32,
    repeat_last_n: i32,
}

#[derive(Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    response: String,
    done: bool,
}

async fn stream_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    model: &str,
    prompt: &str,
    params: &GenerationParams,
) -> Result<GenStream> {
    let url = format!("{}/api/generate", config.base_url);

    let req = OllamaGenerateRequest {
        model: model.to_string(),
        prompt: prompt.to_string(),
        stream: true,
        options: OllamaOptions {
            num_predict: params.num_predict,
            temperature: params.temperature,
            num_ctx: params.num_ctx,
            repeat_last_n: params.repeat_last_n,
        },
    };

    let resp = client
        .post(&url)
        .timeout(Duration::from_secs(300))
        .json(&req)
        .send()
        .await
        .context("Failed to connect to Ollama for generation")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Ollama generate API returned {status}: {body}");
    }

    let stream = stream_lines(resp.bytes_stream()).filter_map(|line_result| async move {
        match line_result {
            Ok(line) => parse_ollama_line(&line),
            Err(e) => Some(Err(e)),
        }
    });

    Ok(Box::pin(stream))
}

/// Parse a single Ollama NDJSON line. Returns:
/// - Some(Ok(content)) for content deltas
/// - Some(Err(e)) for parse errors
/// - None to skip (empty content or done signal)
fn parse_ollama_line(line: &str) -> Option<Result<String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<OllamaStreamChunk>(line) {
        Ok(chunk) => {
            if chunk.done {
                return None;
            }
            if chunk.response.is_empty() {
                return None;
            }
            Some(Ok(chunk.response))
        }
        Err(e) => Some(Err(anyhow::anyhow!("Failed to parse Ollama chunk: {e}"))),
    }
}

// ─── OpenAI streaming ────────────────────────────────────

#[derive(Serialize)]
struct OpenAiStreamRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}

async fn stream_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    model: &str,
    prompt: &str,
    params: &GenerationParams,
) -> Result<GenStream> {
    let url = format!("{}/v1/chat/completions", config.base_url);

    let req = OpenAiStreamRequest {
        model: model.to_string(),
        messages: vec![OpenAiMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }],
        stream: true,
        temperature: params.temperature,
        max_tokens: params.num_predict,
    };

    let resp = client
        .post(&url)
        .timeout(Duration::from_secs(300))
        .header(
            "Authorization",
            format!("Bearer {}", config.api_key.as_deref().unwrap_or("")),
        )
        .json(&req)
        .send()
        .await
        .context("Failed to connect to OpenAI for generation")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("OpenAI chat API returned {status}: {body}");
    }

    let stream = stream_lines(resp.bytes_stream()).filter_map(|line_result| async move {
        match line_result {
            Ok(line) => parse_openai_line(&line),
            Err(e) => Some(Err(e)),
        }
    });

    Ok(Box::pin(stream))
}

/// Parse a single OpenAI SSE line. Returns:
/// - Some(Ok(content)) for content deltas
/// - Some(Err(e)) for parse errors
/// - None to skip (empty lines, [DONE], role-only chunks)
fn parse_openai_line(line: &str) -> Option<Result<String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let data = if let Some(d) = line.strip_prefix("data: ") {
        d.trim()
    } else {
        return None;
    };

    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .first()
                .and_then(|c| c.delta.content.clone())
                .unwrap_or_default();
            if content.is_empty() {
                return None;
            }
            Some(Ok(content))
        }
        Err(e) => Some(Err(anyhow::anyhow!("Failed to parse OpenAI chunk: {e}"))),
    }
}

// ─── Line buffering ──────────────────────────────────────

/// Convert a byte stream into a stream of complete lines.
fn stream_lines(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    futures_util::stream::unfold(
        (Box::pin(byte_stream), String::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                // First, try to extract a complete line from the buffer
                if let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].to_string();
                    buffer = buffer[newline_pos + 1..].to_string();
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer)));
                    }
                    continue;
                }

                // Buffer has no complete line — read more bytes
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(anyhow::anyhow!("Stream read error: {e}")),
                            (stream, buffer),
                        ));
                    }
                    None => {
                        // Stream ended — emit remaining buffer if non-empty
                        if !buffer.trim().is_empty() {
                            let remaining = std::mem::take(&mut buffer);
                            return Some((Ok(remaining), (stream, buffer)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Ollama parsing ──────────────────────────────────

    #[test]
    fn test_parse_ollama_chunk() {
        let line = r#"{"response":"The main","done":false}"#;
        let result = parse_ollama_line(line);
        assert_eq!(result.unwrap().unwrap(), "The main");
    }

    #[test]
    fn test_parse_ollama_done() {
        let line = r#"{"response":"","done":true}"#;
        assert!(parse_ollama_line(line).is_none());
    }

    #[test]
    fn test_parse_ollama_empty_content() {
        let line = r#"{"response":"","done":false}"#;
        assert!(parse_ollama_line(line).is_none());
    }

    #[test]
    fn test_parse_ollama_malformed() {
        let result = parse_ollama_line("not valid json{{{");
        assert!(result.unwrap().is_err());
    }

    // ─── OpenAI parsing ──────────────────────────────────

    #[test]
    fn test_parse_openai_data_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        let result = parse_openai_line(line);
        assert_eq!(result.unwrap().unwrap(), "Hello");
    }

    #[test]
    fn test_parse_openai_done() {
        assert!(parse_openai_line("data: [DONE]").is_none());
    }

    #[test]
    fn test_parse_openai_empty_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":null}}]}"#;
        assert!(parse_openai_line(line).is_none());
    }

    #[test]
    fn test_parse_openai_role_only_chunk() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(parse_openai_line(line).is_none());
    }

    #[test]
    fn test_parse_openai_malformed() {
        let result = parse_openai_line("data: {broken json");
        assert!(result.unwrap().is_err());
    }

    #[test]
    fn test_parse_non_data_line() {
        assert!(parse_openai_line("event: message").is_none());
        assert!(parse_ollama_line("   ").is_none());
    }

    // ─── Reasoning trace stripping ───────────────────────

    #[test]
    fn test_strip_reasoning_basic() {
        let text = "<think>hmm, cats</think>Cats are studied by A. Katz.";
        assert_eq!(strip_reasoning(text), "Cats are studied by A. Katz.");
    }

    #[test]
    fn test_strip_reasoning_multiline() {
        let text = "<think>line one\nline two\n</think>Answer.";
        assert_eq!(strip_reasoning(text), "Answer.");
    }

    #[test]
    fn test_strip_reasoning_non_greedy() {
        let text = "<think>a</think>keep<think>b</think>also";
        assert_eq!(strip_reasoning(text), "keepalso");
    }

    #[test]
    fn test_strip_reasoning_unmatched_tag_left_alone() {
        let text = "<think>never closed... Answer here.";
        assert_eq!(strip_reasoning(text), text);
    }

    #[test]
    fn test_strip_reasoning_no_tags() {
        assert_eq!(strip_reasoning("plain answer"), "plain answer");
    }
}
