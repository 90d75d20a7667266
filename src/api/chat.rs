use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};

use crate::config::GenerationParams;
use crate::llm::generate::{self, GenStream};
use crate::llm::moderation;
use crate::models::{ChatRequest, ContextSnippet};
use crate::prompt::build_prompt;
use crate::state::AppState;

const MAX_CHAT_MESSAGE_LEN: usize = 4000;
const IDLE_TIMEOUT_SECS: u64 = 60;

/// One answer fragment or the fault that ended the stream. The fragment
/// stream collapses into at most one `Fault`, always last.
#[derive(Debug, PartialEq)]
enum AnswerEvent {
    Fragment(String),
    Fault(String),
}

/// POST /api/chat — RAG chat endpoint with SSE streaming.
///
/// Event order: one `context` event with the retrieved sources, `delta`
/// events with content fragments, at most one `error`, then `done`.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let message = req.message.trim().to_string();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message is required".to_string()));
    }
    let message = truncate_to_char_boundary(&message, MAX_CHAT_MESSAGE_LEN);

    // One generation per permit; concurrent turns queue here.
    let _permit = state
        .chat_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Chat service at capacity".to_string(),
            )
        })?;

    let flagged = moderation::check(
        &state.http_client,
        &state.config.llm,
        state.config.moderation_enabled,
        &message,
    )
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Moderation failed: {e}")))?;
    if flagged {
        return Err((
            StatusCode::BAD_REQUEST,
            "Message was flagged by moderation".to_string(),
        ));
    }

    let context = state
        .pipeline
        .retrieve(&message, req.top_k, req.cutoff)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Retrieval failed: {e}")))?;
    let docs: Vec<_> = context.iter().map(|c| c.doc.clone()).collect();

    let prompt = build_prompt(Some(&message), &docs)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    // The sources go out first so the UI can show attribution while the
    // answer is still streaming.
    let sources: Vec<ContextSnippet> = context
        .iter()
        .map(|c| ContextSnippet {
            id: c.doc.id.clone(),
            researcher_name: c.doc.researcher_name(),
            title: c.doc.title(),
            score: c.score,
        })
        .collect();

    let context_event = Event::default()
        .event("context")
        .json_data(serde_json::json!({ "sources": sources }))
        .unwrap();

    let params = GenerationParams {
        temperature: req.temperature,
        num_predict: req.num_predict,
        ..state.config.generation.clone()
    };
    let model = req
        .model
        .clone()
        .unwrap_or_else(|| state.provider.model.clone());

    let llm_stream = generate::stream_generate(
        &state.http_client,
        &state.config.llm,
        &model,
        &prompt,
        &params,
    )
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("LLM error: {e}")))?;

    let answer_stream = answer_events(llm_stream, Duration::from_secs(IDLE_TIMEOUT_SECS));

    let done_event: Result<Event, Infallible> = Ok(Event::default()
        .event("done")
        .json_data(serde_json::json!({}))
        .unwrap());

    let event_stream = stream::once(async move { Ok(context_event) })
        .chain(answer_stream.map(|ev| {
            let event = match ev {
                AnswerEvent::Fragment(content) => Event::default()
                    .event("delta")
                    .json_data(serde_json::json!({ "content": content }))
                    .unwrap(),
                AnswerEvent::Fault(message) => Event::default()
                    .event("error")
                    .json_data(serde_json::json!({ "message": message }))
                    .unwrap(),
            };
            Ok(event)
        }))
        .chain(stream::once(async move { done_event }));

    // Keep the semaphore permit alive until the last event is consumed.
    let event_stream = event_stream.map(move |event| {
        let _permit = &_permit;
        event
    });

    Ok(Sse::new(event_stream))
}

/// Map a generation stream to answer events, bounding each poll by
/// `idle_timeout`. A stream fault or a stalled backend yields one `Fault`
/// and ends the stream; the state is dropped so the pending generation is
/// never polled again.
fn answer_events(
    llm_stream: GenStream,
    idle_timeout: Duration,
) -> impl Stream<Item = AnswerEvent> {
    stream::unfold(Some(llm_stream), move |state| async move {
        let mut llm_stream = state?;
        match tokio::time::timeout(idle_timeout, llm_stream.next()).await {
            Ok(Some(Ok(content))) => Some((AnswerEvent::Fragment(content), Some(llm_stream))),
            Ok(Some(Err(e))) => Some((AnswerEvent::Fault(e.to_string()), None)),
            Ok(None) => None,
            Err(_) => Some((
                AnswerEvent::Fault("LLM response timed out (idle)".to_string()),
                None,
            )),
        }
    })
}

fn truncate_to_char_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    s.char_indices()
        .take_while(|(i, _)| *i < max_len)
        .map(|(_, c)| c)
        .collect()
}
