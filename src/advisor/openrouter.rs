//! OpenRouter advisor.
//!
//! Sends advisor prompts through OpenRouter's OpenAI-compatible chat
//! completions API. Retries rate limits and server errors with
//! exponential backoff, then falls back to a second model.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{build_analysis_prompt, build_parse_prompt, parse_advice, parse_history_response, system_prompt};
use super::{Advice, Advisor};
use crate::config::{AdvisorConfig, AppConfig};
use crate::types::DrawRecord;

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const DEFAULT_PRIMARY_MODEL: &str = "google/gemini-2.5-pro";
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Retries per model on 429 / 5xx / transport errors.
const MAX_RETRIES: u32 = 3;

const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// API types (OpenAI-compatible)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u32,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenRouterAdvisor {
    http: Client,
    api_url: String,
    api_key: SecretString,
    primary_model: String,
    fallback_model: Option<String>,
    max_tokens: u32,
    backoff_base_ms: u64,
    total_calls: AtomicU64,
}

impl OpenRouterAdvisor {
    pub fn new(
        api_key: SecretString,
        primary_model: Option<String>,
        fallback_model: Option<String>,
        max_tokens: Option<u32>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build OpenRouter HTTP client")?;

        Ok(Self {
            http,
            api_url: OPENROUTER_API_URL.to_string(),
            api_key,
            primary_model: primary_model.unwrap_or_else(|| DEFAULT_PRIMARY_MODEL.to_string()),
            fallback_model: fallback_model.filter(|m| !m.trim().is_empty()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            backoff_base_ms: BASE_BACKOFF_MS,
            total_calls: AtomicU64::new(0),
        })
    }

    /// Build from the `[advisor]` section, reading the key from the
    /// configured environment variable.
    pub fn from_config(cfg: &AdvisorConfig) -> Result<Self> {
        let key = AppConfig::resolve_env(&cfg.api_key_env)?;
        Self::new(
            SecretString::new(key),
            Some(cfg.model.clone()),
            cfg.fallback_model.clone(),
            Some(cfg.max_tokens),
        )
    }

    /// Point at a different OpenAI-compatible endpoint.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    async fn call_model(&self, model: &str, system: &str, user_message: &str) -> Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system.to_string() },
                ChatMessage { role: "user".to_string(), content: user_message.to_string() },
            ],
        };

        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = self.backoff_base_ms * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, model, "Retrying OpenRouter API call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(&self.api_url)
                .bearer_auth(self.api_key.expose_secret())
                .header("X-Title", "DLT Tracker")
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: ChatResponse = response
                            .json()
                            .await
                            .context("Failed to parse OpenRouter response")?;

                        let text = body
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.message)
                            .map(|m| m.content)
                            .unwrap_or_default();

                        self.total_calls.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            model,
                            tokens = body.usage.map(|u| u.total_tokens).unwrap_or(0),
                            "OpenRouter call complete"
                        );
                        return Ok(text);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, model, error = %error_text, "Retryable OpenRouter error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("OpenRouter API error {status} (model={model}): {error_text}");
                }
                Err(e) => {
                    warn!(attempt, model, error = %e, "OpenRouter request failed");
                    last_error = Some(format!("Request error: {e}"));
                }
            }
        }

        anyhow::bail!(
            "OpenRouter API failed after {} retries (model={}): {}",
            MAX_RETRIES,
            model,
            last_error.unwrap_or_default()
        )
    }

    /// Primary model first, then the fallback if one is configured.
    async fn call_api(&self, system: &str, user_message: &str) -> Result<String> {
        match self.call_model(&self.primary_model, system, user_message).await {
            Ok(text) => Ok(text),
            Err(primary_err) => match &self.fallback_model {
                Some(fallback) => {
                    warn!(
                        primary = %self.primary_model,
                        fallback = %fallback,
                        error = %primary_err,
                        "Primary model failed, falling back"
                    );
                    self.call_model(fallback, system, user_message).await.with_context(|| {
                        format!(
                            "Both primary ({}) and fallback ({}) models failed. Primary error: {}",
                            self.primary_model, fallback, primary_err
                        )
                    })
                }
                None => Err(primary_err),
            },
        }
    }
}

#[async_trait]
impl Advisor for OpenRouterAdvisor {
    async fn parse_history(&self, raw_text: &str) -> Result<Vec<DrawRecord>> {
        let reply = self
            .call_api(system_prompt(), &build_parse_prompt(raw_text))
            .await
            .context("History parse request failed")?;
        let draws = parse_history_response(&reply)?;
        info!(draws = draws.len(), "History parsed by advisor");
        Ok(draws)
    }

    async fn analyse(&self, recent: &[DrawRecord], trend_hint: f64) -> Result<Advice> {
        let reply = self
            .call_api(system_prompt(), &build_analysis_prompt(recent, trend_hint))
            .await
            .context("Analysis request failed")?;
        let advice = parse_advice(&reply)?;
        info!(recommendation = %advice.recommendation, "Analysis complete");
        Ok(advice)
    }

    fn model_name(&self) -> String {
        self.primary_model.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
