use std::sync::Arc;

use crate::config::Config;
use crate::llm::embeddings::{Embedder, HttpEmbedder};
use crate::llm::provider::ResolvedProvider;
use crate::llm::rerank::{CrossEncoderClient, Reranker};
use crate::search::bm25::Bm25Index;
use crate::search::pipeline::{PipelineCaps, RetrievalPipeline};
use crate::store::DocumentStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<DocumentStore>,
    pub bm25: Arc<Bm25Index>,
    pub pipeline: Arc<RetrievalPipeline>,
    pub http_client: reqwest::Client,
    pub provider: Arc<ResolvedProvider>,
    pub chat_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    /// Open the datastore and wire the retrieval pipeline. The provider
    /// is resolved by the caller first: its failures carry exit codes.
    pub fn new(config: Config, provider: ResolvedProvider) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.store_dir)?;
        std::fs::create_dir_all(config.index_dir())?;

        let store = Arc::new(DocumentStore::open(&config.store_dir)?);
        let bm25 = Arc::new(Bm25Index::open_or_create(&config.index_dir())?);

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(300))
            .build()?;

        let embedder: Arc<dyn Embedder> =
            Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone()));
        let reranker: Option<Arc<dyn Reranker>> = if config.reranker.base_url.is_some() {
            Some(Arc::new(CrossEncoderClient::new(
                http_client.clone(),
                config.reranker.clone(),
            )))
        } else {
            None
        };

        let pipeline = Arc::new(RetrievalPipeline::new(
            store.clone(),
            bm25.clone(),
            embedder,
            reranker,
            PipelineCaps::hybrid(),
        ));

        Ok(Self {
            config,
            store,
            bm25,
            pipeline,
            http_client,
            provider: Arc::new(provider),
            chat_semaphore: Arc::new(tokio::sync::Semaphore::new(3)),
        })
    }
}
