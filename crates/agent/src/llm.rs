use std::time::Duration;

use adpilot_core::config::{LlmConfig, LlmProvider};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 512;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier recorded on the recommendation as `ai_model`.
    fn model(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Single-prompt completion client over the OpenAI, Anthropic or Ollama HTTP APIs.
/// Retries transport errors, 5xx and 429 with exponential backoff.
pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build LLM HTTP client")?;

        Ok(Self {
            client,
            provider: config.provider,
            base_url: resolve_base_url(config),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, prompt: &str) -> Result<(String, Value)> {
        let url = match self.provider {
            LlmProvider::OpenAi => format!("{}/chat/completions", self.base_url),
            LlmProvider::Anthropic => format!("{}/messages", self.base_url),
            LlmProvider::Ollama => format!("{}/api/generate", self.base_url),
        };
        let body = match self.provider {
            LlmProvider::OpenAi => json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": 0.2,
                "max_tokens": MAX_OUTPUT_TOKENS,
            }),
            LlmProvider::Anthropic => json!({
                "model": self.model,
                "max_tokens": MAX_OUTPUT_TOKENS,
                "messages": [{ "role": "user", "content": prompt }],
            }),
            LlmProvider::Ollama => json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
            }),
        };
        Ok((url, body))
    }

    fn authorize(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        match self.provider {
            LlmProvider::Ollama => Ok(builder),
            LlmProvider::OpenAi => {
                let key = self.api_key.as_ref().ok_or_else(|| anyhow!("openai api key is not configured"))?;
                Ok(builder.bearer_auth(key.expose_secret()))
            }
            LlmProvider::Anthropic => {
                let key =
                    self.api_key.as_ref().ok_or_else(|| anyhow!("anthropic api key is not configured"))?;
                Ok(builder
                    .header("x-api-key", key.expose_secret())
                    .header("anthropic-version", ANTHROPIC_VERSION))
            }
        }
    }

    async fn post_with_retry(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let mut attempt = 0;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            attempt += 1;
            let request = self.authorize(self.client.post(url).json(body))?;
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                    if !retryable || attempt > self.max_retries {
                        return Ok(response);
                    }
                    warn!(
                        event_name = "llm.request.retry",
                        provider = self.provider.as_str(),
                        status = status.as_u16(),
                        attempt,
                        "LLM endpoint returned a retryable status"
                    );
                }
                Err(error) => {
                    if attempt > self.max_retries {
                        return Err(anyhow!("LLM request failed after {attempt} attempts: {error}"));
                    }
                    warn!(
                        event_name = "llm.request.retry",
                        provider = self.provider.as_str(),
                        attempt,
                        error = %error,
                        "LLM request failed; retrying"
                    );
                }
            }

            sleep(backoff).await;
            backoff *= 2;
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let (url, body) = self.request(prompt)?;
        debug!(
            event_name = "llm.request.started",
            provider = self.provider.as_str(),
            model = %self.model,
            prompt_chars = prompt.len(),
            "sending LLM completion request"
        );

        let response = self.post_with_retry(&url, &body).await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API error ({status}): {text}", self.provider.as_str()));
        }

        let payload: Value = response.json().await.context("LLM response was not JSON")?;
        extract_completion(self.provider, &payload)
    }
}

/// Pulls the generated text out of a provider response body.
pub fn extract_completion(provider: LlmProvider, payload: &Value) -> Result<String> {
    let text = match provider {
        LlmProvider::OpenAi => payload["choices"][0]["message"]["content"].as_str(),
        LlmProvider::Anthropic => payload["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find(|block| block["type"] == "text"))
            .and_then(|block| block["text"].as_str()),
        LlmProvider::Ollama => payload["response"].as_str(),
    };

    text.map(str::to_string)
        .ok_or_else(|| anyhow!("no completion text in {} response", provider.as_str()))
}

fn resolve_base_url(config: &LlmConfig) -> String {
    let default = match config.provider {
        LlmProvider::OpenAi => OPENAI_BASE_URL,
        LlmProvider::Anthropic => ANTHROPIC_BASE_URL,
        LlmProvider::Ollama => OLLAMA_BASE_URL,
    };

    // The Ollama address is the configured default; it only applies to Ollama.
    let configured = config
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .filter(|url| config.provider == LlmProvider::Ollama || *url != OLLAMA_BASE_URL);

    configured.unwrap_or(default).trim_end_matches('/').to_string()
}
