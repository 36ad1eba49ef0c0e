// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Gemini adapter over Google's `generateContent` REST endpoint. The API key
//! travels as a query parameter rather than a bearer token, per Google's
//! Generative Language API.

use async_trait::async_trait;
use orchestrator_core::adapter::{Adapter, AdapterOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub struct GeminiAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct UsageMetadata {
    #[serde(rename = "totalTokenCount")]
    total_token_count: u64,
}

impl GeminiAdapter {
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
        std::env::var("GEMINI_API_KEY").ok().map(Self::new)
    }
}

#[async_trait]
impl Adapter for GeminiAdapter {
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

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let started = Instant::now();
        let response = match self.client.post(&url).json(&request).send().await {
            Ok(r) => r,
            Err(err) => return AdapterOutcome::failure(format!("Gemini request failed: {err}")),
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable response body>".to_string());
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !status.is_success() {
            return AdapterOutcome::failure(format!("Gemini API error: HTTP {status}: {body}"));
        }

        let parsed: GenerateContentResponse = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(err) => return AdapterOutcome::failure(format!("failed to parse Gemini response: {err}")),
        };

        let Some(candidate) = parsed.candidates.into_iter().next() else {
            return AdapterOutcome::failure("Gemini response contained no candidates");
        };
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect();
        if text.is_empty() {
            return AdapterOutcome::failure("Gemini response candidate contained no text");
        }

        let mut output = HashMap::new();
        output.insert("text".to_string(), Value::String(text));

        let mut metadata = HashMap::new();
        metadata.insert("model".to_string(), Value::String(model));
        metadata.insert("duration_ms".to_string(), Value::from(duration_ms));
        if let Some(usage) = parsed.usage_metadata {
            metadata.insert("tokens".to_string(), Value::from(usage.total_token_count));
        }

        AdapterOutcome::success(output, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_successful_generation() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", mockito::Matcher::Regex(r"^/models/.*:generateContent.*".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"candidates":[{"content":{"parts":[{"text":"hi"}]}}],"usageMetadata":{"totalTokenCount":9}}"#,
            )
            .create_async()
            .await;

        let adapter = GeminiAdapter::with_base_url("test-key", server.url());
        let outcome = adapter.call(&HashMap::new()).await;

        assert!(outcome.error.is_none());
        assert_eq!(
            outcome.output.unwrap().get("text"),
            Some(&Value::String("hi".to_string()))
        );
        assert_eq!(outcome.metadata.get("tokens"), Some(&Value::from(9)));
    }

    #[tokio::test]
    async fn empty_candidates_is_a_failure_outcome_not_a_panic() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", mockito::Matcher::Regex(r"^/models/.*:generateContent.*".to_string()))
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let adapter = GeminiAdapter::with_base_url("test-key", server.url());
        let outcome = adapter.call(&HashMap::new()).await;

        assert!(outcome.output.is_none());
        assert!(outcome.error.is_some());
    }
}
