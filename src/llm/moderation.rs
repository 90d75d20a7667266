//! Moderation gate ahead of each turn.
//!
//! Disabled by default: every message is reported as not flagged without
//! any network call. The hosted moderation call stays wired so the check
//! can be re-enabled from configuration alone.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

const MODERATION_MODEL: &str = "omni-moderation-latest";

/// Returns whether `message` was flagged. With moderation disabled this
/// is a constant `false`.
pub async fn check(
    client: &reqwest::Client,
    config: &LlmConfig,
    enabled: bool,
    message: &str,
) -> Result<bool> {
    if !enabled {
        return Ok(false);
    }

    let api_key = config
        .api_key
        .as_deref()
        .context("Moderation requires a hosted API key")?;

    let url = format!("{}/v1/moderations", config.base_url);
    let req = ModerationRequest {
        model: MODERATION_MODEL.to_string(),
        input: message.to_string(),
    };

    let resp = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&req)
        .send()
        .await
        .context("Failed to call moderation API")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Moderation API returned {status}: {body}");
    }

    let body: ModerationResponse = resp
        .json()
        .await
        .context("Failed to parse moderation response")?;

    let flagged = body.results.first().map(|r| r.flagged).unwrap_or(false);
    tracing::debug!("Moderation verdict: flagged={flagged}");
    Ok(flagged)
}

#[derive(Serialize)]
struct ModerationRequest {
    model: String,
    input: String,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Deserialize)]
struct ModerationResult {
    flagged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_check_never_flags() {
        let client = reqwest::Client::new();
        let config = LlmConfig::default();
        let flagged = check(&client, &config, false, "anything at all").await.unwrap();
        assert!(!flagged);
    }

    #[tokio::test]
    async fn test_enabled_without_key_errors() {
        let client = reqwest::Client::new();
        let config = LlmConfig {
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(check(&client, &config, true, "hello").await.is_err());
    }

    #[test]
    fn test_moderation_response_parses() {
        let json = r#"{"results":[{"flagged":true}]}"#;
        let body: ModerationResponse = serde_json::from_str(json).unwrap();
        assert!(body.results[0].flagged);
    }
}
