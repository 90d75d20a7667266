//! # research-chat
//!
//! A retrieval-augmented chat service over a corpus of research abstracts:
//! hybrid BM25 + vector retrieval, cross-encoder re-ranking, and streaming
//! answer generation via Ollama or an OpenAI-compatible API.
//!
//! ## Architecture
//!
//! One question flows through a fixed pipeline:
//!
//! ```text
//!                   ┌──────────────┐
//!                   │   Question    │
//!                   └───────┬───────┘
//!                           │
//!              ┌────────────┴────────────┐
//!              ▼                         ▼
//!      ┌──────────────┐         ┌──────────────┐
//!      │ BM25 (tantivy)│         │ Vector cosine │
//!      │  top_k hits   │         │  top_k hits   │
//!      └───────┬───────┘         └───────┬───────┘
//!              │                         │
//!              └────────────┬────────────┘
//!                           │ join by document id,
//!                           │ retriever scores dropped
//!                           ▼
//!              ┌─────────────────────────┐
//!              │ Cross-encoder re-ranking │
//!              │  fresh score per pair    │
//!              └────────────┬─────────────┘
//!                           │ top_k cut, score cutoff
//!                           ▼
//!              ┌─────────────────────────┐
//!              │ Prompt assembly + LLM    │
//!              │ generation (streaming)   │
//!              └─────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for the store, server and LLM settings
//! - [`models`] - Shared data types: `Document`, `ScoredDocument`, request/response types
//! - [`store`] - In-memory document store with a JSON disk snapshot
//! - [`ingest`] - Record-file parser producing documents for indexing
//! - [`search::bm25`] - BM25 full-text index powered by tantivy
//! - [`search::vector`] - Cosine similarity over index-time embeddings
//! - [`search::pipeline`] - The hybrid join + rerank pipeline
//! - [`llm::embeddings`] - Batch embedding generation via Ollama or OpenAI-compatible APIs
//! - [`llm::rerank`] - Cross-encoder scoring via a `/v1/rerank` sidecar
//! - [`llm::generate`] - Streaming and non-streaming completion generation
//! - [`llm::provider`] - Startup provider and model resolution
//! - [`llm::moderation`] - Optional moderation gate, off by default
//! - [`prompt`] - The fixed RAG prompt template
//! - [`chat`] - Per-conversation session controller
//! - [`api`] - Axum HTTP handlers for chat (SSE) and model listing
//! - [`state`] - Shared application state holding store, indexes and provider

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod search;
pub mod state;
pub mod store;
