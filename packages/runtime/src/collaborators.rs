// packages/runtime/src/collaborators.rs
//! Outbound collaborators
//!
//! The runtime touches the rest of the application only through these two
//! traits. Both are treated as fallible, possibly slow, remote-like calls.
//!
//! In-process implementations are provided for the standalone binary and for
//! tests: `InMemoryStore` (keyword-overlap retrieval) and `EchoModel`.

use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

/// Record kind under which agent configs are persisted
pub const AGENT_STATE_KIND: &str = "agent_state";

/// One retrieved memory item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    pub kind: String,
    pub content: String,
    pub score: f64,
}

/// Result of a context retrieval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub summary: String,
    pub items: Vec<ContextItem>,
}

#[async_trait]
pub trait MemoryCollaborator: Send + Sync {
    /// Store a record and return its id
    async fn store_record(&self, content: &str, kind: &str, metadata: Value) -> Result<String>;

    async fn retrieve_context(&self, text: &str) -> Result<RetrievedContext>;
}

#[async_trait]
pub trait ModelCollaborator: Send + Sync {
    async fn execute(&self, model_id: &str, prompt: &str, options: Value) -> Result<Value>;
}

/// A record held by `InMemoryStore`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub kind: String,
    pub content: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Process-local memory store
pub struct InMemoryStore {
    records: RwLock<Vec<StoredRecord>>,
    max_results: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            max_results: 5,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn records(&self) -> Vec<StoredRecord> {
        self.records.read().clone()
    }

    pub fn records_of_kind(&self, kind: &str) -> Vec<StoredRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    fn terms(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
            .map(|t| t.to_lowercase())
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryCollaborator for InMemoryStore {
    async fn store_record(&self, content: &str, kind: &str, metadata: Value) -> Result<String> {
        let id = format!("mem_{}", ulid::Ulid::new().to_string().to_lowercase());
        self.records.write().push(StoredRecord {
            id: id.clone(),
            kind: kind.to_string(),
            content: content.to_string(),
            metadata,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn retrieve_context(&self, text: &str) -> Result<RetrievedContext> {
        let query = Self::terms(text);
        if query.is_empty() {
            return Ok(RetrievedContext::default());
        }

        let records = self.records.read();
        let mut items: Vec<ContextItem> = records
            .iter()
            // agent configs are bookkeeping, not knowledge
            .filter(|r| r.kind != AGENT_STATE_KIND)
            .filter_map(|r| {
                let overlap = Self::terms(&r.content).intersection(&query).count();
                (overlap > 0).then(|| ContextItem {
                    id: r.id.clone(),
                    kind: r.kind.clone(),
                    content: r.content.clone(),
                    score: overlap as f64 / query.len() as f64,
                })
            })
            .collect();

        items.sort_by(|a, b| b.score.total_cmp(&a.score));
        items.truncate(self.max_results);

        let summary = items
            .iter()
            .map(|i| i.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(RetrievedContext { summary, items })
    }
}

/// Model that answers with its own prompt
pub struct EchoModel {
    unavailable: HashSet<String>,
}

impl EchoModel {
    pub fn new() -> Self {
        Self {
            unavailable: HashSet::new(),
        }
    }

    /// Mark a model id as failing
    pub fn with_unavailable(mut self, model_id: impl Into<String>) -> Self {
        self.unavailable.insert(model_id.into());
        self
    }
}

impl Default for EchoModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelCollaborator for EchoModel {
    async fn execute(&self, model_id: &str, prompt: &str, options: Value) -> Result<Value> {
        if self.unavailable.contains(model_id) {
            return Err(EngineError::Collaborator(format!(
                "model {} is unavailable",
                model_id
            )));
        }

        Ok(json!({
            "model": model_id,
            "response": prompt,
            "options": options,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let store = InMemoryStore::new();
        store
            .store_record("Rust ownership rules prevent data races", "note", json!({}))
            .await
            .unwrap();
        store
            .store_record("Bread needs flour and water", "note", json!({}))
            .await
            .unwrap();

        let ctx = store.retrieve_context("how does rust ownership work").await.unwrap();
        assert_eq!(ctx.items.len(), 1);
        assert!(ctx.summary.contains("ownership"));
    }

    #[tokio::test]
    async fn test_agent_state_not_retrieved() {
        let store = InMemoryStore::new();
        store
            .store_record("{\"name\":\"writer\"}", AGENT_STATE_KIND, json!({}))
            .await
            .unwrap();

        assert_eq!(store.records_of_kind(AGENT_STATE_KIND).len(), 1);
        let ctx = store.retrieve_context("writer").await.unwrap();
        assert!(ctx.items.is_empty());
    }

    #[tokio::test]
    async fn test_echo_model() {
        let model = EchoModel::new().with_unavailable("broken");

        let out = model.execute("small", "hi", json!({})).await.unwrap();
        assert_eq!(out["response"], "hi");
        assert_eq!(out["model"], "small");

        let err = model.execute("broken", "hi", json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::Collaborator(_)));
    }
}
