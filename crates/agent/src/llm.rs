use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use barkline_core::config::{LlmConfig, LlmProvider};

/// One-shot chat completion. Implementations must be cheap to call
/// repeatedly; conversation state lives in the prompts.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String>;
}

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com";
const ANTHROPIC_DEFAULT_BASE: &str = "https://api.anthropic.com";
const OLLAMA_DEFAULT_BASE: &str = "http://localhost:11434";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_COMPLETION_TOKENS: u32 = 1024;

pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building llm http client")?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| {
                match config.provider {
                    LlmProvider::OpenAi => OPENAI_DEFAULT_BASE,
                    LlmProvider::Anthropic => ANTHROPIC_DEFAULT_BASE,
                    LlmProvider::Ollama => OLLAMA_DEFAULT_BASE,
                }
                .to_string()
            })
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url,
            model: config.model.clone(),
        })
    }

    fn api_key(&self) -> anyhow::Result<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| anyhow!("llm api key is not configured"))
    }

    async fn complete_openai(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": MAX_COMPLETION_TOKENS,
        });
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key()?)
            .json(&body)
            .send()
            .await
            .context("openai request failed")?
            .error_for_status()
            .context("openai returned an error status")?;
        let payload: Value = response.json().await.context("openai response was not json")?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| anyhow!("openai response had no message content"))
    }

    async fn complete_anthropic(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "system": system,
            "messages": [{"role": "user", "content": user}],
            "max_tokens": MAX_COMPLETION_TOKENS,
        });
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("anthropic request failed")?
            .error_for_status()
            .context("anthropic returned an error status")?;
        let payload: Value =
            response.json().await.context("anthropic response was not json")?;
        payload["content"][0]["text"]
            .as_str()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| anyhow!("anthropic response had no text content"))
    }

    async fn complete_ollama(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "stream": false,
        });
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .context("ollama request failed")?
            .error_for_status()
            .context("ollama returned an error status")?;
        let payload: Value = response.json().await.context("ollama response was not json")?;
        payload["message"]["content"]
            .as_str()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| anyhow!("ollama response had no message content"))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        debug!(
            event_name = "llm.complete.request",
            provider = ?self.provider,
            model = %self.model,
            user_chars = user.len(),
        );
        match self.provider {
            LlmProvider::OpenAi => self.complete_openai(system, user).await,
            LlmProvider::Anthropic => self.complete_anthropic(system, user).await,
            LlmProvider::Ollama => self.complete_ollama(system, user).await,
        }
    }
}
