// packages/runtime/src/runtime/tool_registry.rs
//! Name → capability map with permission gating and bounded invocation
//!
//! `execute_tool` runs, in order:
//!
//! 1. existence check (`ToolNotFound`)
//! 2. permission check (`PermissionDenied`)
//! 3. parameter validation (`InvalidParameters`)
//! 4. usage accounting, then the tool body raced against the tool timeout
//!    (`ToolTimeout`)
//!
//! Counters are only touched once validation has passed.

use crate::runtime::agent_config::Permission;
use crate::runtime::context::AgentExecutionContext;
use crate::runtime::resource_monitor::ResourceMonitor;
use crate::utils::errors::{EngineError, Result};
use crate::utils::timeout::with_timeout;
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on a single tool call
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;

/// Access tier of a tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolTier {
    /// Usable by any agent whose permission tree enables basic tools
    Basic,
    /// Must appear on the agent's tool allow-list
    #[default]
    Restricted,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn tier(&self) -> ToolTier {
        ToolTier::Restricted
    }

    /// Permission-tree leaves the caller must hold
    fn permissions(&self) -> Vec<Permission> {
        Vec::new()
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, params: Value, ctx: &AgentExecutionContext) -> Result<Value>;
}

type ToolFn = dyn Fn(Value, AgentExecutionContext) -> BoxFuture<'static, Result<Value>> + Send + Sync;
type ValidateFn = dyn Fn(&Value) -> Result<()> + Send + Sync;

/// Closure-backed tool
pub struct FnTool {
    name: String,
    tier: ToolTier,
    permissions: Vec<Permission>,
    validator: Option<Box<ValidateFn>>,
    body: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Value, AgentExecutionContext) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            tier: ToolTier::Restricted,
            permissions: Vec::new(),
            validator: None,
            body: Box::new(body),
        }
    }

    pub fn basic(mut self) -> Self {
        self.tier = ToolTier::Basic;
        self
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions = permissions.into_iter().collect();
        self
    }

    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> ToolTier {
        self.tier
    }

    fn permissions(&self) -> Vec<Permission> {
        self.permissions.clone()
    }

    fn validate(&self, params: &Value) -> Result<()> {
        match &self.validator {
            Some(validator) => validator(params),
            None => Ok(()),
        }
    }

    async fn execute(&self, params: Value, ctx: &AgentExecutionContext) -> Result<Value> {
        (self.body)(params, ctx.clone()).await
    }
}

/// Registry of tools shared by all agents of a runtime
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    timeout: Duration,
    monitor: Option<Arc<ResourceMonitor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            timeout: Duration::from_millis(DEFAULT_TOOL_TIMEOUT_MS),
            monitor: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Report tool calls to `monitor` as external api calls
    pub fn with_monitor(mut self, monitor: Arc<ResourceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        debug!(name = %name, tier = ?tool.tier(), "Registering tool");
        if self.tools.write().insert(name.clone(), tool).is_some() {
            warn!(name = %name, "Replaced existing tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    fn check_permissions(tool: &dyn Tool, ctx: &AgentExecutionContext) -> Result<()> {
        let listed = match tool.tier() {
            ToolTier::Basic => ctx.basic_tools() || ctx.allows_tool(tool.name()),
            ToolTier::Restricted => ctx.allows_tool(tool.name()),
        };
        if !listed {
            return Err(EngineError::PermissionDenied(format!(
                "agent {} may not use tool {}",
                ctx.agent_id(),
                tool.name()
            )));
        }

        if let Some(missing) = tool.permissions().into_iter().find(|p| !ctx.grants(*p)) {
            return Err(EngineError::PermissionDenied(format!(
                "tool {} requires {}",
                tool.name(),
                missing
            )));
        }
        Ok(())
    }

    /// Tools the context may call, sorted by name
    pub fn get_available_tools(&self, ctx: &AgentExecutionContext) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .values()
            .filter(|tool| Self::check_permissions(tool.as_ref(), ctx).is_ok())
            .map(|tool| tool.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub async fn execute_tool(
        &self,
        name: &str,
        params: Value,
        ctx: &AgentExecutionContext,
    ) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| EngineError::ToolNotFound(name.to_string()))?;

        Self::check_permissions(tool.as_ref(), ctx)?;
        tool.validate(&params)?;

        ctx.record_api_call();
        if let Some(monitor) = &self.monitor {
            monitor.record_api_call(ctx.agent_id());
        }

        debug!(tool = name, agent_id = ctx.agent_id(), task_id = %ctx.task_id, "Executing tool");
        let outcome = with_timeout(tool.execute(params, ctx), self.timeout).await;

        let result = match outcome {
            Ok(result) => result,
            Err(timeout) => Err(EngineError::ToolTimeout {
                tool: name.to_string(),
                timeout_ms: timeout.limit_ms(),
            }),
        };

        let label = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            "agent_runtime_tool_calls_total",
            "tool" => name.to_string(),
            "outcome" => label
        )
        .increment(1);

        result
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch a required string parameter
pub fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| EngineError::InvalidParameters(format!("'{}' must be a non-empty string", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::agent_config::{AgentConfig, PartialAgentConfig};
    use crate::runtime::context::ContextTemplate;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx(partial: PartialAgentConfig) -> AgentExecutionContext {
        let config = AgentConfig::from_partial(&partial.with_id("agent_t")).unwrap();
        Arc::new(ContextTemplate::from_config(&config)).for_task("task_t")
    }

    fn echo(name: &str) -> FnTool {
        FnTool::new(name, |params, _ctx| async move { Ok(params) }.boxed())
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute_tool("nope", json!({}), &ctx(PartialAgentConfig::named("a")))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_restricted_tool_needs_allow_list() {
        let registry = ToolRegistry::new();
        registry.register_tool(Arc::new(echo("custom.echo")));

        let denied = ctx(PartialAgentConfig::named("a"));
        let err = registry
            .execute_tool("custom.echo", json!({}), &denied)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PermissionDenied(_)));

        let allowed = ctx(PartialAgentConfig::named("a").with_tools(["custom.echo"]));
        let out = registry
            .execute_tool("custom.echo", json!({ "x": 1 }), &allowed)
            .await
            .unwrap();
        assert_eq!(out["x"], 1);
    }

    #[tokio::test]
    async fn test_basic_tier_follows_flag() {
        let registry = ToolRegistry::new();
        registry.register_tool(Arc::new(echo("basic.echo").basic()));

        let enabled = ctx(PartialAgentConfig::named("a"));
        assert!(registry.execute_tool("basic.echo", json!({}), &enabled).await.is_ok());

        let disabled = ctx(PartialAgentConfig::named("a").with_permissions(json!({ "basic_tools": false })));
        assert!(matches!(
            registry.execute_tool("basic.echo", json!({}), &disabled).await,
            Err(EngineError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_permission_leaf_required() {
        let registry = ToolRegistry::new();
        registry.register_tool(Arc::new(
            echo("fs.write").with_permissions([Permission::FilesystemWrite]),
        ));

        let listed = ctx(PartialAgentConfig::named("a").with_tools(["fs.write"]));
        assert!(matches!(
            registry.execute_tool("fs.write", json!({}), &listed).await,
            Err(EngineError::PermissionDenied(_))
        ));
        assert!(registry.get_available_tools(&listed).is_empty());

        let granted = ctx(
            PartialAgentConfig::named("a")
                .with_tools(["fs.write"])
                .with_permissions(json!({ "filesystem": { "write": true } })),
        );
        assert_eq!(registry.get_available_tools(&granted), vec!["fs.write".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_params_never_execute() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        let registry = ToolRegistry::new();
        registry.register_tool(Arc::new(
            FnTool::new("basic.strict", move |_params, _ctx| {
                seen.fetch_add(1, Ordering::SeqCst);
                async { Ok(Value::Null) }.boxed()
            })
            .basic()
            .with_validator(|params| require_str(params, "query").map(|_| ())),
        ));

        let ctx = ctx(PartialAgentConfig::named("a"));
        let err = registry
            .execute_tool("basic.strict", json!({ "query": 5 }), &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::InvalidParameters(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.api_call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_timeout() {
        let registry = ToolRegistry::new().with_timeout(Duration::from_millis(50));
        registry.register_tool(Arc::new(
            FnTool::new("basic.slow", |_params, _ctx| {
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Value::Null)
                }
                .boxed()
            })
            .basic(),
        ));

        let ctx = ctx(PartialAgentConfig::named("a"));
        let err = registry
            .execute_tool("basic.slow", json!({}), &ctx)
            .await
            .unwrap_err();

        match err {
            EngineError::ToolTimeout { tool, timeout_ms } => {
                assert_eq!(tool, "basic.slow");
                assert_eq!(timeout_ms, 50);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ctx.api_call_count(), 1);
    }

    #[tokio::test]
    async fn test_calls_reported_to_monitor() {
        let monitor = Arc::new(ResourceMonitor::default());
        monitor.start_monitoring("agent_t", Default::default());

        let registry = ToolRegistry::new().with_monitor(Arc::clone(&monitor));
        registry.register_tool(Arc::new(echo("basic.echo").basic()));

        let ctx = ctx(PartialAgentConfig::named("a"));
        registry.execute_tool("basic.echo", json!({}), &ctx).await.unwrap();
        registry.execute_tool("basic.echo", json!({}), &ctx).await.unwrap();

        assert_eq!(monitor.get_usage("agent_t").unwrap().api_calls, 2);
        assert_eq!(ctx.api_call_count(), 2);
    }
}
