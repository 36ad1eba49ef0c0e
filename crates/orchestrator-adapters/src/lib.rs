// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Concrete `Adapter` implementations (§4.6) over the three model APIs named
//! in the action-name convention (`openai`, `deepseek`, `gemini`). Adapters
//! whose credential is absent are simply never registered; the worker falls
//! back to `SimulationAdapter` for any action with no registered adapter.

pub mod deepseek;
pub mod gemini;
pub mod openai;

pub use deepseek::DeepseekAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

use orchestrator_core::adapter::AdapterRegistry;
use orchestrator_core::config::Settings;
use std::sync::Arc;

/// Register whichever of the three adapters have a configured credential
/// (§4.7, §4.8 `serve`). Action names match the adapter source: `"openai"`,
/// `"deepseek"`, `"gemini"`.
pub fn register_available(registry: &mut AdapterRegistry, settings: &Settings) {
    if let Some(key) = &settings.openai_api_key {
        registry.register("openai", Arc::new(OpenAiAdapter::new(key.clone())));
    } else {
        tracing::info!("OPENAI_API_KEY not set, \"openai\" actions will be simulated");
    }

    if let Some(key) = &settings.deepseek_api_key {
        registry.register("deepseek", Arc::new(DeepseekAdapter::new(key.clone())));
    } else {
        tracing::info!("DEEPSEEK_API_KEY not set, \"deepseek\" actions will be simulated");
    }

    if let Some(key) = &settings.gemini_api_key {
        registry.register("gemini", Arc::new(GeminiAdapter::new(key.clone())));
    } else {
        tracing::info!("GEMINI_API_KEY not set, \"gemini\" actions will be simulated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_only_configured_adapters() {
        let mut settings = Settings::default();
        settings.openai_api_key = Some("sk-test".to_string());

        let mut registry = AdapterRegistry::new();
        register_available(&mut registry, &settings);

        assert!(registry.is_registered("openai"));
        assert!(!registry.is_registered("deepseek"));
        assert!(!registry.is_registered("gemini"));
    }
}
