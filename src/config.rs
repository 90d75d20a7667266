use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Datastore directory: document snapshot plus the lexical index.
    pub store_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Cross-encoder reranker configuration
    pub reranker: RerankerConfig,
    /// Default generation parameters, adjustable per turn from the UI
    pub generation: GenerationParams,
    /// Default number of retrieved documents per turn
    pub top_k: usize,
    /// Default minimum rerank score for a document to enter the context
    pub cutoff: f32,
    /// Run the moderation check before each turn. Defaults off: disabled,
    /// every message is reported as not flagged without a network call.
    pub moderation_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for generation; resolved at startup when empty
    pub chat_model: String,
    /// Model name for embeddings; must match the model used at index time
    pub embedding_model: String,
    /// API key (only needed for hosted providers)
    pub api_key: Option<String>,
}

/// Configuration for the cross-encoder reranker sidecar
/// (e.g. llama-server with a bge-reranker model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Base URL for the reranker API. If None, the pipeline falls back to
    /// scaled retriever scores.
    pub base_url: Option<String>,
    /// Model name to send in the rerank request.
    pub model: Option<String>,
    /// Request timeout in seconds (capped at 30).
    pub timeout_secs: u64,
}

/// Generation knobs forwarded to the backend per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    /// Token budget for the completion.
    pub num_predict: u32,
    /// Context window requested from the backend.
    pub num_ctx: u32,
    /// Repeat-penalty lookback; -1 means the whole context.
    pub repeat_last_n: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("./research_docs.store"),
            bind_addr: "127.0.0.1:9000".to_string(),
            llm: LlmConfig::default(),
            reranker: RerankerConfig::default(),
            generation: GenerationParams::default(),
            top_k: 8,
            cutoff: 0.0,
            moderation_enabled: false,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: String::new(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            timeout_secs: 10,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            num_predict: 8000,
            num_ctx: 12028,
            repeat_last_n: -1,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("RESEARCH_CHAT_STORE_DIR") {
            config.store_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("RESEARCH_CHAT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                config.llm.api_key = Some(key);
            }
        }
        if let Ok(val) = std::env::var("RESEARCH_CHAT_TOP_K") {
            if let Ok(v) = val.parse() {
                config.top_k = v;
            }
        }
        if let Ok(val) = std::env::var("RESEARCH_CHAT_CUTOFF") {
            if let Ok(v) = val.parse() {
                config.cutoff = v;
            }
        }
        if let Ok(val) = std::env::var("RESEARCH_CHAT_MODERATION") {
            config.moderation_enabled = val == "1" || val.eq_ignore_ascii_case("true");
        }

        // Reranker config
        if let Ok(url) = std::env::var("RERANKER_BASE_URL") {
            config.reranker.base_url = Some(url);
        }
        if let Ok(model) = std::env::var("RERANKER_MODEL") {
            config.reranker.model = Some(model);
        }
        if let Ok(val) = std::env::var("RERANKER_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.reranker.timeout_secs = v.min(30);
            }
        }

        config
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.store_dir.join("documents.json")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.store_dir.join("index")
    }
}
