//! Clients for the external model services: embeddings, cross-encoder
//! reranking, completion generation, provider selection, and the
//! moderation gate.

pub mod embeddings;
pub mod generate;
pub mod moderation;
pub mod provider;
pub mod rerank;
