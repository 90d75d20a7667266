//! Retrieval: BM25 lexical search, embedding vector search, and the
//! hybrid join + rerank pipeline composed from them.

pub mod bm25;
pub mod pipeline;
pub mod vector;
