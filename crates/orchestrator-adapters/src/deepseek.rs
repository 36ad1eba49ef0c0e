// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! DeepSeek chat-completions adapter. Wire-compatible with OpenAI's
//! `/chat/completions` shape, so the request/response types mirror those in
//! `openai.rs` rather than being shared — the two APIs are expected to drift
//! independently.

use async_trait::async_trait;
use orchestrator_core::adapter::{Adapter, AdapterOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_MODEL: &str = "deepseek-chat";

pub struct DeepseekAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
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
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

impl DeepseekAdapter {
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

    pub fn from_env() -> Option<Self> {
        std::env::var("DEEPSEEK_API_KEY").ok().map(Self::new)
    }
}

#[async_trait]
impl Adapter for DeepseekAdapter {
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
            stream: false,
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
            Err(err) => return AdapterOutcome::failure(format!("DeepSeek request failed: {err}")),
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable response body>".to_string());
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !status.is_success() {
            return AdapterOutcome::failure(format!("DeepSeek API error: HTTP {status}: {body}"));
        }

        let parsed: ChatCompletionResponse = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(err) => {
                return AdapterOutcome::failure(format!("failed to parse DeepSeek response: {err}"))
            }
        };

        let Some(choice) = parsed.choices.into_iter().next() else {
            return AdapterOutcome::failure("DeepSeek response contained no choices");
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
            metadata.insert("tokens_prompt".to_string(), Value::from(usage.prompt_tokens));
            metadata.insert(
                "tokens_completion".to_string(),
                Value::from(usage.completion_tokens),
            );
        }

        AdapterOutcome::success(output, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_successful_completion() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}],"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3},"model":"deepseek-chat"}"#,
            )
            .create_async()
            .await;

        let adapter = DeepseekAdapter::with_base_url("test-key", server.url());
        let outcome = adapter.call(&HashMap::new()).await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.metadata.get("tokens"), Some(&Value::from(3)));
    }

    #[tokio::test]
    async fn normalizes_http_error_into_failure_outcome() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let adapter = DeepseekAdapter::with_base_url("test-key", server.url());
        let outcome = adapter.call(&HashMap::new()).await;

        assert!(outcome.output.is_none());
        assert!(outcome.error.unwrap().contains("500"));
    }
}
