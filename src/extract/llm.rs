//! LLM extractor
//!
//! Calls an OpenAI-compatible Chat Completions endpoint and asks for a JSON
//! array of candidates. Transient failures (connect errors, 429, 5xx) are
//! retried while the configured time budget lasts; anything else fails the
//! extraction at once.

use super::{parse_candidates, CandidateExtractor, Turn};
use crate::config::ExtractorConfig;
use crate::pool::CandidateItem;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const RETRY_FIRST_DELAY: Duration = Duration::from_millis(250);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

const SYSTEM_PROMPT: &str = "You extract what a conversation turn is about. \
Reply with a JSON array only, no prose. Each element is an object: \
{\"type\": \"event\" | \"topic\" | \"entity\", \"label\": string, \
\"aliases\": [string], \"priorityOrEmotion\": number between 0 and 1, \
\"linkedLabels\": [string]}. \
Use the shortest natural label, put nicknames and alternative spellings in aliases, \
and link items that the turn relates to each other. Reply [] when nothing stands out.";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Outcome of one request that did not produce a reply
#[derive(Debug)]
enum RequestFailure {
    /// Worth another attempt if the budget allows
    Transient(Error),
    Fatal(Error),
}

type Attempt<T> = std::result::Result<T, RequestFailure>;

impl RequestFailure {
    fn into_error(self) -> Error {
        match self {
            Self::Transient(e) | Self::Fatal(e) => e,
        }
    }
}

/// Candidate extractor backed by a chat model
pub struct LlmExtractor {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    /// Total time one extraction may spend across attempts
    budget: Duration,
}

impl LlmExtractor {
    /// Build from config, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &ExtractorConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{} is not set", config.api_key_env)))?;
        Self::new(config, api_key)
    }

    pub fn new(config: &ExtractorConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("salience/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;

        info!("LLM extractor: model={}, base_url={}", config.model, config.base_url);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            budget: config.timeout(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// User message for one turn, including whatever was detected upstream.
    fn build_prompt(turn: &Turn) -> String {
        let mut prompt = format!("Turn: {}", turn.text.trim());
        if let Some(emotion) = turn.emotion {
            prompt.push_str(&format!("\nknownEmotion: {:.2}", emotion));
        }
        if let Some(intent) = &turn.intent {
            prompt.push_str(&format!("\nknownIntent: {}", intent));
        }
        prompt
    }

    /// Delay before retry number `retry` (1-based): doubles from 250 ms, capped at 2 s.
    fn retry_delay(retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(8);
        RETRY_FIRST_DELAY.saturating_mul(factor).min(RETRY_MAX_DELAY)
    }

    fn classify_send_error(e: reqwest::Error) -> RequestFailure {
        if e.is_timeout() {
            // a request timeout already spent the whole budget
            RequestFailure::Fatal(Error::Extraction(format!("request timed out: {e}")))
        } else if e.is_connect() || e.is_request() {
            RequestFailure::Transient(Error::Extraction(format!("connection failed: {e}")))
        } else {
            RequestFailure::Fatal(Error::Extraction(e.to_string()))
        }
    }

    async fn check_response_status(response: reqwest::Response) -> Attempt<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail: String = body.trim().chars().take(300).collect();
        let error = Error::Extraction(format!("API error {status}: {detail}"));
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(RequestFailure::Transient(error))
        } else {
            Err(RequestFailure::Fatal(error))
        }
    }

    async fn send_chat_completions_request(&self, user_prompt: &str) -> Attempt<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Self::classify_send_error)?;
        let response = Self::check_response_status(response).await?;

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| RequestFailure::Fatal(Error::Extraction(format!("unreadable API response: {e}"))))?;

        Ok(chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }

    /// Send the prompt, retrying transient failures until one more wait would
    /// run past the budget.
    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let deadline = Instant::now() + self.budget;
        let mut retry = 0;
        loop {
            let error = match self.send_chat_completions_request(prompt).await {
                Ok(content) => return Ok(content),
                Err(RequestFailure::Transient(e)) => e,
                Err(fatal) => return Err(fatal.into_error()),
            };

            retry += 1;
            let delay = Self::retry_delay(retry);
            if Instant::now() + delay >= deadline {
                warn!("Extraction budget of {:?} used up after {} attempts", self.budget, retry);
                return Err(error);
            }
            warn!("Extraction attempt {} failed ({}), retrying in {:?}", retry, error, delay);
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CandidateExtractor for LlmExtractor {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn extract(&self, turn: &Turn) -> Result<Vec<CandidateItem>> {
        if turn.text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let content = self.call_llm(&Self::build_prompt(turn)).await?;
        debug!("Extraction response: {}", content);
        parse_candidates(&content)
            .ok_or_else(|| Error::Extraction("malformed extraction response".to_string()))
    }
}
