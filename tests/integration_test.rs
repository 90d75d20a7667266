//! End-to-end tests: record ingestion, index build, hybrid retrieval and
//! prompt assembly, with deterministic local embedder and reranker stands
//! so no model service is needed.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use research_chat::ingest;
use research_chat::llm::embeddings::{document_embedding_text, Embedder};
use research_chat::llm::rerank::{Reranker, RerankResult};
use research_chat::models::Document;
use research_chat::prompt::build_prompt;
use research_chat::search::bm25::Bm25Index;
use research_chat::search::pipeline::{PipelineCaps, RetrievalPipeline};
use research_chat::store::DocumentStore;

const RECORDS: &str = "\
NAME: A. Katz
TITLE: Feline behaviour
ABSTRACT: A field study of behaviour and sleep patterns in domestic cats.
NAMES: B. Hund, C. Hund
TITLE: Working dogs
ABSTRACT: Training dogs for search and rescue work in alpine terrain.
NAME: D. Storm
TITLE: Severe weather
ABSTRACT: Numerical models of severe weather systems over the Baltic sea.
";

struct CharEmbedder;

#[async_trait]
impl Embedder for CharEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 26];
                for c in t.to_lowercase().chars() {
                    if c.is_ascii_lowercase() {
                        v[(c as u8 - b'a') as usize] += 1.0;
                    }
                }
                v
            })
            .collect())
    }
}

struct OverlapReranker;

#[async_trait]
impl Reranker for OverlapReranker {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankResult>> {
        let tokens: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        let mut results: Vec<RerankResult> = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| {
                let lower = doc.to_lowercase();
                let hits = tokens.iter().filter(|t| lower.contains(*t)).count();
                RerankResult {
                    index,
                    score: hits as f32 / tokens.len().max(1) as f32,
                }
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(results)
    }
}

async fn build_corpus(dir: &std::path::Path) -> (Arc<DocumentStore>, Arc<Bm25Index>) {
    let mut docs = ingest::parse_records(RECORDS);
    assert_eq!(docs.len(), 3);

    let embedder = CharEmbedder;
    for doc in docs.iter_mut() {
        let text = document_embedding_text(doc);
        doc.embedding = Some(embedder.embed_single(&text).await.unwrap());
    }

    let store = Arc::new(DocumentStore::open(&dir.join("store")).unwrap());
    let bm25 = Arc::new(Bm25Index::open_or_create(&dir.join("index")).unwrap());
    bm25.index_documents(&docs).unwrap();
    store.write_documents(docs);
    store.save_to_disk().unwrap();

    (store, bm25)
}

fn pipeline(store: Arc<DocumentStore>, bm25: Arc<Bm25Index>) -> RetrievalPipeline {
    RetrievalPipeline::new(
        store,
        bm25,
        Arc::new(CharEmbedder),
        Some(Arc::new(OverlapReranker)),
        PipelineCaps::hybrid(),
    )
}

#[tokio::test]
async fn test_ingest_to_retrieval_cats() {
    let dir = tempfile::tempdir().unwrap();
    let (store, bm25) = build_corpus(dir.path()).await;
    let pipeline = pipeline(store, bm25);

    let results = pipeline
        .retrieve("Does anyone study cats?", 1, 0.0)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].doc.researcher_name().unwrap(),
        "A. Katz"
    );
}

#[tokio::test]
async fn test_each_topic_finds_its_researcher() {
    let dir = tempfile::tempdir().unwrap();
    let (store, bm25) = build_corpus(dir.path()).await;
    let pipeline = pipeline(store, bm25);

    for (query, name) in [
        ("training dogs for rescue", "B. Hund, C. Hund"),
        ("severe weather models", "D. Storm"),
    ] {
        let results = pipeline.retrieve(query, 1, 0.0).await.unwrap();
        assert_eq!(results.len(), 1, "no result for {query}");
        assert_eq!(results[0].doc.researcher_name().unwrap(), name);
    }
}

#[tokio::test]
async fn test_document_content_recalls_itself() {
    let dir = tempfile::tempdir().unwrap();
    let (store, bm25) = build_corpus(dir.path()).await;
    let probe = store.get("ID000000").unwrap();
    let pipeline = pipeline(store, bm25);

    let results = pipeline.retrieve(&probe.content, 1, 0.0).await.unwrap();
    assert_eq!(results[0].doc.id, "ID000000");
}

#[tokio::test]
async fn test_results_bounded_distinct_descending() {
    let dir = tempfile::tempdir().unwrap();
    let (store, bm25) = build_corpus(dir.path()).await;
    let pipeline = pipeline(store, bm25);

    let results = pipeline
        .retrieve("field study of work and models", 2, 0.0)
        .await
        .unwrap();
    assert!(results.len() <= 2);

    let mut ids: Vec<&str> = results.iter().map(|r| r.doc.id.as_str()).collect();
    let before = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), before);

    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_cutoff_never_adds_results() {
    let dir = tempfile::tempdir().unwrap();
    let (store, bm25) = build_corpus(dir.path()).await;
    let pipeline = pipeline(store, bm25);

    let loose = pipeline.retrieve("study of cats", 10, 0.0).await.unwrap();
    let strict = pipeline.retrieve("study of cats", 10, 0.8).await.unwrap();
    assert!(strict.len() <= loose.len());
    for r in &strict {
        assert!(r.score >= 0.8);
    }
}

#[tokio::test]
async fn test_store_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    {
        build_corpus(dir.path()).await;
    }

    let store = Arc::new(DocumentStore::open(&dir.path().join("store")).unwrap());
    assert_eq!(store.count_documents(), 3);
    let bm25 = Arc::new(Bm25Index::open_or_create(&dir.path().join("index")).unwrap());
    let pipeline = pipeline(store, bm25);

    let results = pipeline.retrieve("domestic cats", 1, 0.0).await.unwrap();
    assert_eq!(results[0].doc.id, "ID000000");
}

#[tokio::test]
async fn test_retrieved_context_renders_into_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let (store, bm25) = build_corpus(dir.path()).await;
    let pipeline = pipeline(store, bm25);

    let results = pipeline
        .retrieve("sleep patterns in cats", 2, 0.0)
        .await
        .unwrap();
    let docs: Vec<Document> = results.iter().map(|r| r.doc.clone()).collect();
    let prompt = build_prompt(Some("What do cats do all day?"), &docs).unwrap();

    assert!(prompt.contains("Researcher: A. Katz."));
    assert!(prompt.ends_with("Question: What do cats do all day?"));
}
