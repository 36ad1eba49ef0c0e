// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Adapter Registry (§4.3): the mapping from a step's `action` string to a
//! callable that performs the work and returns `(output, error, metadata)`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of one adapter invocation. Exactly one of `output`/`error` should
/// be populated by a well-behaved adapter; the core does not enforce this on
/// the adapter, only on the persisted step (§3 invariant).
pub struct AdapterOutcome {
    pub output: Option<HashMap<String, Value>>,
    pub error: Option<String>,
    pub metadata: HashMap<String, Value>,
}

impl AdapterOutcome {
    pub fn success(output: HashMap<String, Value>, metadata: HashMap<String, Value>) -> Self {
        Self {
            output: Some(output),
            error: None,
            metadata,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            output: None,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }
}

/// A pluggable callable that executes a step's action.
///
/// Adapters never propagate a Rust error out of `call`; transport/HTTP
/// failures are normalized into `AdapterOutcome::failure` (§4.6), matching
/// the original's catch-and-normalize behavior.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn call(&self, params: &HashMap<String, Value>) -> AdapterOutcome;
}

/// Always-available fallback used when no adapter is registered for an
/// action: a short sleep, synthetic output, and `simulated: true` metadata
/// (§4.3). This is explicit, not a silent substitute for a crashed adapter.
pub struct SimulationAdapter {
    pub delay: std::time::Duration,
}

impl Default for SimulationAdapter {
    fn default() -> Self {
        Self {
            delay: std::time::Duration::from_millis(50),
        }
    }
}

#[async_trait]
impl Adapter for SimulationAdapter {
    async fn call(&self, params: &HashMap<String, Value>) -> AdapterOutcome {
        tokio::time::sleep(self.delay).await;

        let mut output = HashMap::new();
        output.insert("result".to_string(), Value::String("simulated".to_string()));
        output.insert(
            "params".to_string(),
            Value::Object(params.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        );

        let mut metadata = HashMap::new();
        metadata.insert("simulated".to_string(), Value::Bool(true));
        metadata.insert("tokens".to_string(), Value::from(100));
        metadata.insert("cost".to_string(), Value::from(0.001));

        AdapterOutcome::success(output, metadata)
    }
}

/// Maps `action` strings to adapters, configured at startup from whichever
/// credentials are present (§4.3). `action`s with no registered adapter fall
/// through to `SimulationAdapter`.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
    simulation: Arc<dyn Adapter>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self {
            adapters: HashMap::new(),
            simulation: Arc::new(SimulationAdapter::default()),
        }
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: impl Into<String>, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(action.into(), adapter);
    }

    pub fn is_registered(&self, action: &str) -> bool {
        self.adapters.contains_key(action)
    }

    /// Resolve the adapter for `action`, falling back to simulation.
    pub fn resolve(&self, action: &str) -> Arc<dyn Adapter> {
        self.adapters
            .get(action)
            .cloned()
            .unwrap_or_else(|| self.simulation.clone())
    }

    pub async fn call(&self, action: &str, params: &HashMap<String, Value>) -> AdapterOutcome {
        self.resolve(action).call(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unregistered_action_simulates() {
        let registry = AdapterRegistry::new();
        let outcome = registry.call("whatever", &HashMap::new()).await;
        assert!(outcome.error.is_none());
        assert_eq!(
            outcome.metadata.get("simulated"),
            Some(&Value::Bool(true))
        );
    }

    struct AlwaysFails;

    #[async_trait]
    impl Adapter for AlwaysFails {
        async fn call(&self, _params: &HashMap<String, Value>) -> AdapterOutcome {
            AdapterOutcome::failure("boom")
        }
    }

    #[tokio::test]
    async fn registered_action_is_used_over_simulation() {
        let mut registry = AdapterRegistry::new();
        registry.register("always_fails", Arc::new(AlwaysFails));

        let outcome = registry.call("always_fails", &HashMap::new()).await;
        assert_eq!(outcome.error.as_deref(), Some("boom"));
    }
}
