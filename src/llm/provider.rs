//! Startup provider selection: hosted when an API key is configured,
//! otherwise the local Ollama daemon. Failure here is fatal and maps to a
//! distinct exit code per case.

use serde::Deserialize;

use crate::config::LlmConfig;
use crate::error::ChatError;

/// Hosted default when no model override is given.
const DEFAULT_HOSTED_MODEL: &str = "gpt-4.1-mini";

/// The provider and model resolved at startup, plus the models available
/// for the UI selector.
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub provider: String,
    pub model: String,
    pub models: Vec<String>,
}

/// Pick the generation backend. With an API key the hosted provider is
/// used as-is; otherwise the local daemon is probed and its first model
/// picked unless a model name was configured.
pub async fn resolve(
    client: &reqwest::Client,
    config: &LlmConfig,
) -> Result<ResolvedProvider, ChatError> {
    if config.api_key.is_some() {
        let model = if config.chat_model.is_empty() {
            DEFAULT_HOSTED_MODEL.to_string()
        } else {
            config.chat_model.clone()
        };
        tracing::info!("Using hosted provider, model {model}");
        return Ok(ResolvedProvider {
            provider: "openai".to_string(),
            model: model.clone(),
            models: vec![model],
        });
    }

    let models = list_ollama_models(client, &config.base_url)
        .await
        .map_err(|e| ChatError::ProviderUnavailable(e.to_string()))?;

    if models.is_empty() {
        return Err(ChatError::NoModelsFound);
    }

    let model = if config.chat_model.is_empty() {
        models[0].clone()
    } else {
        config.chat_model.clone()
    };
    tracing::info!("Using local Ollama, model {model}");

    Ok(ResolvedProvider {
        provider: "ollama".to_string(),
        model,
        models,
    })
}

#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
    #[serde(default)]
    details: OllamaModelDetails,
}

#[derive(Deserialize, Default)]
struct OllamaModelDetails {
    #[serde(default)]
    parameter_size: String,
    #[serde(default)]
    quantization_level: String,
}

/// List models installed in the local Ollama daemon.
pub async fn list_ollama_models(
    client: &reqwest::Client,
    base_url: &str,
) -> anyhow::Result<Vec<String>> {
    let url = format!("{}/api/tags", base_url);

    let resp = client.get(&url).send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("Ollama tags API returned {}", resp.status());
    }

    let body: OllamaTagsResponse = resp.json().await?;
    let mut names = Vec::with_capacity(body.models.len());
    for model in body.models {
        tracing::debug!(
            "Ollama: {} / {} / {}",
            model.name,
            model.details.parameter_size,
            model.details.quantization_level
        );
        names.push(model.name);
    }
    Ok(names)
}
