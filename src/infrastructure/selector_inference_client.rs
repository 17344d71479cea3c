//! Selector inference over an OpenAI-compatible chat completions endpoint
//!
//! The model is asked for a JSON object
//! `{"primary", "fallback1", "fallback2", "explanation"}`. This client only
//! unwraps the message content into JSON; the healer decides whether the shape
//! can be trusted.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::domain::services::{InferenceRequest, SelectorInference};
use crate::infrastructure::config::InferenceConfig;
use crate::infrastructure::pipeline_error::InferenceError;

const SYSTEM_PROMPT: &str = "You repair CSS selectors for an e-commerce scraper. \
Given the markup of one product listing card and the field that could not be extracted, \
answer with a JSON object with the keys primary, fallback1, fallback2 and explanation. \
primary, fallback1 and fallback2 are CSS selectors relative to the card, most robust first. \
Prefer stable attributes and semantic classes over positional or generated class names. \
explanation is one short sentence.";

pub struct ChatCompletionsInference {
    client: reqwest::Client,
    config: InferenceConfig,
    api_key: Option<String>,
    timeout: Duration,
}

impl ChatCompletionsInference {
    /// The API key is read from the configured environment variable; a missing
    /// key is allowed for local endpoints that do not authenticate
    pub fn new(config: InferenceConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(
                "{} not set; selector inference requests will be sent unauthenticated",
                config.api_key_env
            );
        }
        Ok(Self {
            client,
            config,
            api_key,
            timeout,
        })
    }

    fn request_body(&self, request: &InferenceRequest) -> Value {
        json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt(request) },
            ],
        })
    }
}

fn user_prompt(request: &InferenceRequest) -> String {
    format!(
        "Source: {}\nField: {} ({})\n\nCard markup:\n{}",
        request.source, request.field, request.field_description, request.html_snippet
    )
}

#[async_trait]
impl SelectorInference for ChatCompletionsInference {
    async fn infer_selectors(&self, request: &InferenceRequest) -> Result<Option<Value>, InferenceError> {
        let mut call = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .json(&self.request_body(request));
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(self.timeout.as_secs())
            } else {
                InferenceError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| InferenceError::Payload(e.to_string()))?;
        debug!("Selector inference answered for {}/{}", request.source, request.field);
        parse_completion(&payload)
    }
}

/// Pull the JSON object out of `choices[0].message.content`
fn parse_completion(payload: &Value) -> Result<Option<Value>, InferenceError> {
    let content = payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if content.is_empty() {
        return Ok(None);
    }

    let unfenced = content
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(unfenced)
        .map(Some)
        .map_err(|e| InferenceError::Payload(format!("message content is not JSON: {e}")))
}

/// Inference collaborator used when repair is switched off
pub struct DisabledInference;

#[async_trait]
impl SelectorInference for DisabledInference {
    async fn infer_selectors(&self, _request: &InferenceRequest) -> Result<Option<Value>, InferenceError> {
        Err(InferenceError::Disabled)
    }
}
