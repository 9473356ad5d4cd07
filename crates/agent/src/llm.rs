//! Chat-completion clients for the hosted and local model providers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use triage_core::config::{LlmConfig, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const MAX_OUTPUT_TOKENS: u32 = 512;

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> &'static str;

    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Builds the client for the configured provider. `Offline` has no client.
pub fn build_llm_client(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>> {
    let http = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("failed to build http client")?;

    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::OpenAi => Arc::new(OpenAiCompatibleClient {
            provider: LlmProvider::OpenAi,
            http,
            base_url: base_url(config, OPENAI_BASE_URL),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        }),
        LlmProvider::Ollama => Arc::new(OpenAiCompatibleClient {
            provider: LlmProvider::Ollama,
            http,
            base_url: base_url(config, "http://localhost:11434"),
            api_key: None,
            model: config.model.clone(),
            max_retries: config.max_retries,
        }),
        LlmProvider::Anthropic => Arc::new(AnthropicClient {
            http,
            base_url: base_url(config, ANTHROPIC_BASE_URL),
            api_key: config
                .api_key
                .clone()
                .ok_or_else(|| anyhow!("anthropic provider requires llm.api_key"))?,
            model: config.model.clone(),
            max_retries: config.max_retries,
        }),
        LlmProvider::Offline => return Ok(None),
    };

    Ok(Some(client))
}

fn base_url(config: &LlmConfig, fallback: &str) -> String {
    config.base_url.as_deref().unwrap_or(fallback).trim_end_matches('/').to_string()
}

/// Speaks `/v1/chat/completions`; serves OpenAI and Ollama.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    provider: LlmProvider,
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn provider(&self) -> &'static str {
        self.provider.as_str()
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: 0.0,
            max_tokens: MAX_OUTPUT_TOKENS,
        };

        let response: ChatCompletionResponse =
            send_with_retries(self.provider(), self.max_retries, || {
                let request = self.http.post(&url).json(&body);
                match &self.api_key {
                    Some(key) => request.bearer_auth(key.expose_secret()),
                    None => request,
                }
            })
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("{} returned no completion choices", self.provider()))
    }
}

/// Speaks Anthropic's `/v1/messages`.
#[derive(Clone)]
pub struct AnthropicClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    max_retries: u32,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> &'static str {
        LlmProvider::Anthropic.as_str()
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &self.model,
            system,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: 0.0,
        };

        let response: MessagesResponse =
            send_with_retries(self.provider(), self.max_retries, || {
                self.http
                    .post(&url)
                    .header("x-api-key", self.api_key.expose_secret())
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
            })
            .await?;

        let text = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        Ok(text)
    }
}

/// Sends the request built by `build`, retrying transport failures and 5xx
/// responses up to `max_retries` extra times. Any other status fails at once.
async fn send_with_retries<T, F>(provider: &'static str, max_retries: u32, build: F) -> Result<T>
where
    T: DeserializeOwned,
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let retryable = match build().send().await {
            Ok(response) if response.status().is_success() => {
                debug!(
                    event_name = "llm.request_succeeded",
                    provider,
                    attempt,
                    "llm call succeeded"
                );
                return response
                    .json::<T>()
                    .await
                    .with_context(|| format!("{provider} returned an unreadable response body"));
            }
            Ok(response) => {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                if !is_retryable_status(status) {
                    bail!("{provider} API error {status}: {}", truncate(&detail, 200));
                }
                anyhow!("{provider} API error {status}: {}", truncate(&detail, 200))
            }
            Err(error) => anyhow!(error).context(format!("{provider} request failed")),
        };

        if attempt > max_retries {
            return Err(retryable);
        }
        warn!(
            event_name = "llm.request_retry",
            provider,
            attempt,
            error = %retryable,
            "retrying llm call"
        );
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
