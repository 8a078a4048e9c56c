//! Completion-model provider client
//!
//! The pipeline binds to the smallest interface a text-completion provider
//! can offer; the concrete client speaks the provider's messages endpoint
//! over HTTP. Swapping providers means implementing one trait.

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_COMPLETION_TOKENS: u32 = 2048;
const API_VERSION: &str = "2023-06-01";

/// Minimal completion interface the extractors depend on.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// One-shot completion for a prompt, optionally with a system prompt.
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> Result<String>;
}

/// HTTP client for the model provider's messages endpoint.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .map_err(Error::Http)?,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl CompletionModel for AnthropicClient {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "temperature": temperature,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }

        debug!(model = %self.model, prompt_len = prompt.len(), "Requesting completion");

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited(format!(
                "model provider returned 429 for model {}",
                self.model
            )));
        }
        if status.is_server_error() {
            return Err(Error::Unavailable(format!(
                "model provider returned {}",
                status
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "model provider returned {}: {}",
                status, detail
            )));
        }

        let reply: serde_json::Value = response.json().await?;
        reply["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Internal("completion had no text content".to_string()))
    }
}
