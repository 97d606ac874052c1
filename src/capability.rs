//! Capability interfaces consumed from the embedder.
//!
//! Each capability is an `async_trait` so the embedder can supply real
//! I/O, a test double, or nothing at all — atoms referencing a missing
//! capability fail cleanly with a monadic "Capability 'x' missing" error
//! rather than panicking.

use async_trait::async_trait;

use crate::signal::CancellationToken;
use crate::value::Value;

/// Outbound HTTP request description passed to the `fetch` capability.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub response_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait FetchCapability: Send + Sync {
    async fn fetch(
        &self,
        req: FetchRequest,
        signal: Option<CancellationToken>,
    ) -> Result<FetchResponse, String>;
}

#[async_trait]
pub trait StoreCapability: Send + Sync {
    async fn get(&self, key: &str) -> Result<Value, String>;
    async fn set(&self, key: &str, value: Value) -> Result<(), String>;
    async fn query(&self, _query: Value) -> Result<Vec<Value>, String> {
        Err("query not supported by this store".to_string())
    }
    async fn vector_search(
        &self,
        _collection: &str,
        _vector: Vec<f64>,
        _k: Option<u32>,
        _filter: Option<Value>,
    ) -> Result<Vec<Value>, String> {
        Err("vectorSearch not supported by this store".to_string())
    }
}

#[async_trait]
pub trait LlmCapability: Send + Sync {
    async fn predict(&self, prompt: Value, options: Option<Value>) -> Result<Value, String>;
    async fn embed(&self, _text: &str) -> Result<Vec<f64>, String> {
        Err("embed not supported by this LLM capability".to_string())
    }
}

#[async_trait]
pub trait AgentCapability: Send + Sync {
    async fn run(&self, agent_id: &str, input: Value) -> Result<Value, String>;
}

#[async_trait]
pub trait XmlCapability: Send + Sync {
    async fn parse(&self, text: &str) -> Result<Value, String>;
}

/// The full set of capabilities installed on a `RuntimeContext`. Each
/// slot is independently optional; `run()` installs an in-memory `store`
/// fallback when none is supplied.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    pub fetch: Option<std::sync::Arc<dyn FetchCapability>>,
    pub store: Option<std::sync::Arc<dyn StoreCapability>>,
    pub llm: Option<std::sync::Arc<dyn LlmCapability>>,
    pub agent: Option<std::sync::Arc<dyn AgentCapability>>,
    pub xml: Option<std::sync::Arc<dyn XmlCapability>>,
}

impl CapabilitySet {
    /// Fills the `store` slot with an in-memory fallback if none is
    /// installed. Does not touch `fetch` — an
    /// absent `fetch` capability deliberately falls through to
    /// `httpFetch`'s internal `reqwest` client instead.
    pub fn with_default_store(mut self) -> Self {
        if self.store.is_none() {
            tracing::warn!("no store capability supplied, falling back to an in-memory store");
            self.store = Some(std::sync::Arc::new(InMemoryStore::default()));
        }
        self
    }
}

/// Per-run in-memory fallback for the `store` capability. Not shared
/// across runs unless the embedder wraps and reinstalls the same
/// instance.
#[derive(Default)]
pub struct InMemoryStore {
    data: tokio::sync::RwLock<std::collections::HashMap<String, Value>>,
}

#[async_trait]
impl StoreCapability for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Value, String> {
        Ok(self.data.read().await.get(key).cloned().unwrap_or(Value::Null))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), String> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn query(&self, _query: Value) -> Result<Vec<Value>, String> {
        Ok(self.data.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryStore::default();
        assert_eq!(store.get("k").await.unwrap(), Value::Null);
        store.set("k", Value::Int(7)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Value::Int(7));
    }
}
