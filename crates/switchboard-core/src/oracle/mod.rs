//! Oracle: the language model consulted for planning and synthesis.
//!
//! The engine only needs `ask(system, user) -> text`. [`HttpOracle`] talks to
//! either the Anthropic Messages API or an OpenAI-compatible chat endpoint,
//! retrying transport-level failures with exponential backoff. Whatever comes
//! back is treated as free text; interpreting it is the planner's job.

pub mod prompts;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::OracleConfig;

#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("oracle not configured: {0}")]
    NotConfigured(String),
}

impl OracleError {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OracleError::Transport(_) | OracleError::RateLimited(_) | OracleError::Server { .. }
        )
    }
}

/// Black-box question/answer interface to a language model.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn ask(&self, system: &str, user: &str) -> Result<String, OracleError>;
}

/// Oracle backed by an HTTP chat API.
pub struct HttpOracle {
    client: reqwest::Client,
    config: OracleConfig,
}

impl HttpOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    async fn ask_once(&self, system: &str, user: &str) -> Result<String, OracleError> {
        match self.config.adapter.as_str() {
            "openai" => self.call_openai_compatible(system, user).await,
            _ => self.call_anthropic(system, user).await,
        }
    }

    /// POST {base_url}/v1/messages
    async fn call_anthropic(&self, system: &str, user: &str) -> Result<String, OracleError> {
        if self.config.api_key.is_empty() {
            return Err(OracleError::NotConfigured(
                "no API key; set oracle.api_key (e.g. \"${ANTHROPIC_API_KEY}\")".to_string(),
            ));
        }
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{ "role": "user", "content": user }]
        });
        if !system.is_empty() {
            body["system"] = Value::String(system.to_string());
        }
        if let Some(temp) = self.config.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body);
        let json = send(request).await?;

        let content = json
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .map(str::to_string)
                    .reduce(|a, b| format!("{}\n{}", a, b))
            })
            .ok_or_else(|| OracleError::Decode("no text blocks in response".to_string()))?;
        Ok(content)
    }

    /// POST {base_url}/chat/completions
    async fn call_openai_compatible(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": user }));

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": messages,
        });
        if let Some(temp) = self.config.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        let mut request = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body);
        // Local OpenAI-compatible servers usually run without a key.
        if !self.config.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.config.api_key));
        }
        let json = send(request).await?;

        json.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| OracleError::Decode("no choices[0].message.content".to_string()))
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<Value, OracleError> {
    let response = request
        .send()
        .await
        .map_err(|e| OracleError::Transport(e.to_string()))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| OracleError::Transport(format!("failed to read response body: {}", e)))?;

    if status.as_u16() == 429 {
        return Err(OracleError::RateLimited(text));
    }
    if status.is_server_error() {
        return Err(OracleError::Server {
            status: status.as_u16(),
            body: text,
        });
    }
    if !status.is_success() {
        return Err(OracleError::Api {
            status: status.as_u16(),
            body: text,
        });
    }
    serde_json::from_str(&text).map_err(|e| OracleError::Decode(e.to_string()))
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn ask(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                // 500ms, 1s, 2s, ... with the default base
                let delay = Duration::from_millis(self.config.backoff_ms << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            tracing::debug!(
                "[Oracle] {} call (model: {}, attempt {}/{})",
                self.config.adapter,
                self.config.model,
                attempt + 1,
                attempts
            );

            match self.ask_once(system, user).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() => {
                    tracing::warn!("[Oracle] attempt {}/{} failed: {}", attempt + 1, attempts, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| OracleError::Transport("no attempts made".to_string())))
    }
}
