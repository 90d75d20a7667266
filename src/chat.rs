//! Chat session controller: one conversation with history, driving
//! moderation, retrieval, prompt assembly and generation per turn.

use anyhow::Result;
use futures_util::StreamExt;
use std::sync::Arc;

use crate::config::{GenerationParams, LlmConfig};
use crate::llm::generate::{self, GenStream};
use crate::llm::moderation;
use crate::models::{ChatMessage, Document, ScoredDocument};
use crate::prompt::build_prompt;
use crate::search::pipeline::RetrievalPipeline;

/// Per-turn knobs, UI-adjustable. Everything not set falls back to the
/// session defaults.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    pub top_k: usize,
    pub cutoff: f32,
    pub temperature: f32,
    pub num_predict: u32,
    pub model: Option<String>,
}

impl TurnOptions {
    pub fn from_defaults(top_k: usize, cutoff: f32, generation: &GenerationParams) -> Self {
        Self {
            top_k,
            cutoff,
            temperature: generation.temperature,
            num_predict: generation.num_predict,
            model: None,
        }
    }
}

/// The result of one turn. `error` carries a model fault; the answer then
/// holds whatever partial text arrived plus the apology line.
#[derive(Debug)]
pub struct TurnOutcome {
    pub answer: String,
    pub context: Vec<ScoredDocument>,
    pub error: Option<String>,
}

pub struct ChatSession {
    client: reqwest::Client,
    llm: LlmConfig,
    generation: GenerationParams,
    pipeline: Arc<RetrievalPipeline>,
    model: String,
    moderation_enabled: bool,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(
        client: reqwest::Client,
        llm: LlmConfig,
        generation: GenerationParams,
        pipeline: Arc<RetrievalPipeline>,
        model: String,
        moderation_enabled: bool,
    ) -> Self {
        Self {
            client,
            llm,
            generation,
            pipeline,
            model,
            moderation_enabled,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Run one full turn: moderation gate, retrieval, prompt assembly,
    /// generation. A model fault does not fail the turn; the partial
    /// answer plus an apology is returned instead.
    pub async fn turn(&mut self, message: &str, opts: &TurnOptions) -> Result<TurnOutcome> {
        if moderation::check(&self.client, &self.llm, self.moderation_enabled, message).await? {
            let answer = "Your message was flagged by moderation and was not processed.";
            self.record(message, answer);
            return Ok(TurnOutcome {
                answer: answer.to_string(),
                context: Vec::new(),
                error: None,
            });
        }

        let context = self
            .pipeline
            .retrieve(message, opts.top_k, opts.cutoff)
            .await?;
        let docs: Vec<Document> = context.iter().map(|c| c.doc.clone()).collect();
        let prompt = build_prompt(Some(message), &docs)?;

        let params = GenerationParams {
            temperature: opts.temperature,
            num_predict: opts.num_predict,
            ..self.generation.clone()
        };
        let model = opts.model.as_deref().unwrap_or(&self.model);

        let (text, fault) =
            match generate::stream_generate(&self.client, &self.llm, model, &prompt, &params).await
            {
                Ok(stream) => accumulate(stream).await,
                Err(e) => (String::new(), Some(e.to_string())),
            };

        let mut answer = generate::strip_reasoning(&text);
        if let Some(e) = &fault {
            tracing::warn!("Generation fault: {e}");
            if !answer.is_empty() {
                answer.push('\n');
            }
            answer.push_str(&format!("There is something wrong with the model.\n{e}"));
        }

        self.record(message, &answer);
        Ok(TurnOutcome {
            answer,
            context,
            error: fault,
        })
    }

    fn record(&mut self, message: &str, answer: &str) {
        self.history.push(ChatMessage::user(message));
        self.history.push(ChatMessage::assistant(answer));
    }
}

/// Drain a fragment stream into one string. A mid-stream fault ends the
/// drain; the text accumulated so far is kept.
pub async fn accumulate(mut stream: GenStream) -> (String, Option<String>) {
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => text.push_str(&fragment),
            Err(e) => return (text, Some(e.to_string())),
        }
    }
    (text, None)
}
