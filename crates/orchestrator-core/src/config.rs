// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven configuration (§4.7). Loaded once at process start;
//! missing optional variables never panic.

use std::path::PathBuf;

/// Process-wide settings shared by the worker, recovery manager, and HTTP edge.
#[derive(Debug, Clone)]
pub struct Settings {
    pub workflows_dir: PathBuf,
    pub queue_state_file: PathBuf,
    /// Reserved; current core is single-stepped (§4.7, §5).
    pub max_parallel_nodes: usize,
    pub log_level: String,
    pub openai_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub http_bind_addr: String,
    /// Soft cap on queue size past which create/resume/external-data
    /// handlers return 503 (§5 backpressure).
    pub max_queue_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workflows_dir: PathBuf::from("workflows"),
            queue_state_file: PathBuf::from("queue-state.json"),
            max_parallel_nodes: 4,
            log_level: "info".to_string(),
            openai_api_key: None,
            deepseek_api_key: None,
            gemini_api_key: None,
            http_bind_addr: "127.0.0.1:8080".to_string(),
            max_queue_size: 10_000,
        }
    }
}

impl Settings {
    /// Load from environment variables, falling back to defaults for
    /// anything absent. Call `dotenvy::dotenv()` before this in `main` if
    /// `.env` support is desired for local development.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workflows_dir: std::env::var("WORKFLOWS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.workflows_dir),
            queue_state_file: std::env::var("QUEUE_STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.queue_state_file),
            max_parallel_nodes: std::env::var("MAX_PARALLEL_NODES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_parallel_nodes),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            deepseek_api_key: std::env::var("DEEPSEEK_API_KEY").ok(),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            http_bind_addr: std::env::var("HTTP_BIND_ADDR").unwrap_or(defaults.http_bind_addr),
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_queue_size),
        }
    }
}
