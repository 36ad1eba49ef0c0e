// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! OpenAI chat-completions adapter.

use async_trait::async_trait;
use orchestrator_core::adapter::{Adapter, AdapterOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4";

/// Adapter over OpenAI's `/chat/completions` endpoint.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u64,
}

#[derive(Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Deserialize)]
struct OpenAiError {
    message: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("reqwest client builder with static config never fails"),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// `None` if `OPENAI_API_KEY` is unset, so it is simply never registered (§4.6).
    pub fn from_env() -> Option<Self> {
        std::env::var("OPENAI_API_KEY").ok().map(Self::new)
    }
}

#[async_trait]
impl Adapter for OpenAiAdapter {
    async fn call(&self, params: &HashMap<String, Value>) -> AdapterOutcome {
        let prompt = params
            .get("prompt")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let model = params
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MODEL)
            .to_string();

        let request = ChatCompletionRequest {
            model: model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            max_tokens: params.get("max_tokens").and_then(Value::as_u64).map(|v| v as u32),
            temperature: params.get("temperature").and_then(Value::as_f64).map(|v| v as f32),
        };

        let started = Instant::now();
        let response = match self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(err) => return AdapterOutcome::failure(format!("OpenAI request failed: {err}")),
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable response body>".to_string());
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}: {body}"));
            return AdapterOutcome::failure(format!("OpenAI API error: {message}"));
        }

        let parsed: ChatCompletionResponse = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(err) => return AdapterOutcome::failure(format!("failed to parse OpenAI response: {err}")),
        };

        let Some(choice) = parsed.choices.into_iter().next() else {
            return AdapterOutcome::failure("OpenAI response contained no choices");
        };

        let mut output = HashMap::new();
        output.insert("text".to_string(), Value::String(choice.message.content));

        let mut metadata = HashMap::new();
        metadata.insert(
            "model".to_string(),
            Value::String(parsed.model.unwrap_or(model)),
        );
        metadata.insert("duration_ms".to_string(), Value::from(duration_ms));
        if let Some(usage) = parsed.usage {
            metadata.insert("tokens".to_string(), Value::from(usage.total_tokens));
        }

        AdapterOutcome::success(output, metadata)
    }
}
