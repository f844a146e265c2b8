// packages/runtime/src/runtime/context.rs
//! Per-task execution context
//!
//! A `ContextTemplate` is snapshotted from the agent config when the agent
//! starts (and again when the config is updated). Each task gets its own
//! `AgentExecutionContext` from the template with fresh live counters.

use crate::runtime::agent_config::{AgentConfig, Permission, PermissionTree, ResourceQuota};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Snapshot of the parts of a config a task may consult
#[derive(Debug, Clone)]
pub struct ContextTemplate {
    pub agent_id: String,
    pub permissions: PermissionTree,
    pub quota: ResourceQuota,
    pub allowed_tools: HashSet<String>,
    pub allowed_models: Vec<String>,
}

impl ContextTemplate {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            agent_id: config.id.clone(),
            permissions: config.permissions.clone(),
            quota: config.resource_quota.clone(),
            allowed_tools: config.allowed_tools.iter().cloned().collect(),
            allowed_models: config.allowed_models.clone(),
        }
    }

    pub fn for_task(self: &Arc<Self>, task_id: impl Into<String>) -> AgentExecutionContext {
        AgentExecutionContext {
            task_id: task_id.into(),
            started_at: Utc::now(),
            template: Arc::clone(self),
            counters: Arc::new(ExecutionCounters::default()),
        }
    }
}

#[derive(Debug, Default)]
struct ExecutionCounters {
    api_calls: AtomicU64,
    memory_mb: AtomicU64,
}

/// Ephemeral context for one running task
#[derive(Debug, Clone)]
pub struct AgentExecutionContext {
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    template: Arc<ContextTemplate>,
    counters: Arc<ExecutionCounters>,
}

impl AgentExecutionContext {
    pub fn agent_id(&self) -> &str {
        &self.template.agent_id
    }

    pub fn permissions(&self) -> &PermissionTree {
        &self.template.permissions
    }

    pub fn quota(&self) -> &ResourceQuota {
        &self.template.quota
    }

    pub fn allowed_models(&self) -> &[String] {
        &self.template.allowed_models
    }

    pub fn has_memory_access(&self) -> bool {
        self.template.permissions.has_memory_access()
    }

    /// Basic-tier tools are available to this context
    pub fn basic_tools(&self) -> bool {
        self.template.permissions.basic_tools
    }

    pub fn grants(&self, permission: Permission) -> bool {
        self.template.permissions.grants(permission)
    }

    pub fn allows_tool(&self, name: &str) -> bool {
        self.template.allowed_tools.contains(name)
    }

    pub fn allows_model(&self, model: &str) -> bool {
        self.template.allowed_models.iter().any(|m| m == model)
    }

    /// Count one external call; returns the new total for this task
    pub fn record_api_call(&self) -> u64 {
        self.counters.api_calls.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn api_call_count(&self) -> u64 {
        self.counters.api_calls.load(Ordering::Relaxed)
    }

    /// Self-reported memory usage in megabytes
    pub fn report_memory(&self, memory_mb: u64) {
        self.counters.memory_mb.store(memory_mb, Ordering::Relaxed);
    }

    pub fn memory_usage(&self) -> u64 {
        self.counters.memory_mb.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::agent_config::PartialAgentConfig;

    fn template() -> Arc<ContextTemplate> {
        let config = AgentConfig::from_partial(
            &PartialAgentConfig::named("ctx")
                .with_id("agent_ctx")
                .with_tools(["model.execute"])
                .with_models(["small"]),
        )
        .unwrap();
        Arc::new(ContextTemplate::from_config(&config))
    }

    #[test]
    fn test_snapshot_fields() {
        let ctx = template().for_task("task_1");

        assert_eq!(ctx.agent_id(), "agent_ctx");
        assert_eq!(ctx.task_id, "task_1");
        assert!(ctx.allows_tool("model.execute"));
        assert!(!ctx.allows_tool("basic.chat"));
        assert!(ctx.allows_model("small"));
        assert!(!ctx.allows_model("large"));
        assert!(ctx.has_memory_access());
        assert!(ctx.basic_tools());
    }

    #[test]
    fn test_counters_are_per_task() {
        let template = template();
        let first = template.for_task("t1");
        let second = template.for_task("t2");

        assert_eq!(first.record_api_call(), 1);
        assert_eq!(first.clone().record_api_call(), 2);
        first.report_memory(64);

        assert_eq!(first.api_call_count(), 2);
        assert_eq!(first.memory_usage(), 64);
        assert_eq!(second.api_call_count(), 0);
        assert_eq!(second.memory_usage(), 0);
    }
}
