//! OpenAI-compatible text completion client (POST {base}/completions).

use crate::llm::backend::{Completion, CompletionBackend, CompletionError};
use async_trait::async_trait;
use serde::Serialize;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for an OpenAI-compatible completions endpoint. The model is fixed at construction.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(base_url: Option<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key,
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// POST /completions — non-streaming text completion.
    pub async fn create_completion(
        &self,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, CompletionError> {
        let url = format!("{}/completions", self.base_url);
        let body = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens,
        };
        let mut req = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(CompletionError::Api(format!("{} {}", status, body)));
        }
        let data: Completion = res.json().await?;
        Ok(data)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<Completion, CompletionError> {
        log::debug!("openai: completion with model {} (max_tokens {})", self.model, max_tokens);
        self.create_completion(prompt, max_tokens).await
    }
}
