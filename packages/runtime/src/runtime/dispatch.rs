// packages/runtime/src/runtime/dispatch.rs
//! Task-type dispatch table
//!
//! Once a task is admitted, the handler registered for its type does the
//! actual work. The defaults route every type through the tool registry so
//! permission checks and accounting apply uniformly:
//!
//! | type       | default behaviour                                   |
//! |------------|-----------------------------------------------------|
//! | `query`    | `basic.chat` with `{message, model?}`               |
//! | `action`   | `{tool, params}` through `execute_tool`             |
//! | `analysis` | `basic.search`, summarised                          |
//! | `workflow` | `{steps: [{tool, params}]}` sequentially, fail-fast |

use crate::runtime::builtin_tools::{BASIC_CHAT, BASIC_SEARCH};
use crate::runtime::context::AgentExecutionContext;
use crate::runtime::isolation::UnitWork;
use crate::runtime::task::{AgentTask, TaskType};
use crate::runtime::tool_registry::ToolRegistry;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(
        &self,
        task: &AgentTask,
        ctx: &AgentExecutionContext,
        tools: &ToolRegistry,
    ) -> Result<Value>;
}

/// Input either as a bare string or as `{ <key>: string, ... }`
fn text_input<'a>(input: &'a Value, key: &str) -> Result<&'a str> {
    match input {
        Value::String(s) => Ok(s),
        Value::Object(map) => map.get(key).and_then(Value::as_str).ok_or_else(|| {
            EngineError::InvalidParameters(format!("task input requires '{}'", key))
        }),
        _ => Err(EngineError::InvalidParameters(format!(
            "task input must be a string or an object with '{}'",
            key
        ))),
    }
}

/// Parse a `{tool, params}` pair
fn tool_call(value: &Value) -> Result<(&str, Value)> {
    let tool = value
        .get("tool")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::InvalidParameters("'tool' must be a string".into()))?;
    let params = value.get("params").cloned().unwrap_or_else(|| json!({}));
    Ok((tool, params))
}

pub struct QueryHandler;

#[async_trait]
impl TaskHandler for QueryHandler {
    async fn handle(
        &self,
        task: &AgentTask,
        ctx: &AgentExecutionContext,
        tools: &ToolRegistry,
    ) -> Result<Value> {
        let message = text_input(&task.input, "message")?;
        let mut params = json!({ "message": message });
        if let Some(model) = task.input.get("model") {
            params["model"] = model.clone();
        }
        tools.execute_tool(BASIC_CHAT, params, ctx).await
    }
}

pub struct ActionHandler;

#[async_trait]
impl TaskHandler for ActionHandler {
    async fn handle(
        &self,
        task: &AgentTask,
        ctx: &AgentExecutionContext,
        tools: &ToolRegistry,
    ) -> Result<Value> {
        let (tool, params) = tool_call(&task.input)?;
        tools.execute_tool(tool, params, ctx).await
    }
}

pub struct AnalysisHandler;

#[async_trait]
impl TaskHandler for AnalysisHandler {
    async fn handle(
        &self,
        task: &AgentTask,
        ctx: &AgentExecutionContext,
        tools: &ToolRegistry,
    ) -> Result<Value> {
        let query = text_input(&task.input, "query")?;
        let found = tools
            .execute_tool(BASIC_SEARCH, json!({ "query": query }), ctx)
            .await?;

        let items = found.get("items").cloned().unwrap_or_else(|| json!([]));
        let item_count = items.as_array().map(Vec::len).unwrap_or(0);

        Ok(json!({
            "query": query,
            "summary": found.get("summary").cloned().unwrap_or(Value::Null),
            "item_count": item_count,
            "items": items,
        }))
    }
}

pub struct WorkflowHandler;

#[async_trait]
impl TaskHandler for WorkflowHandler {
    async fn handle(
        &self,
        task: &AgentTask,
        ctx: &AgentExecutionContext,
        tools: &ToolRegistry,
    ) -> Result<Value> {
        let steps = task
            .input
            .get("steps")
            .and_then(Value::as_array)
            .ok_or_else(|| EngineError::InvalidParameters("workflow requires 'steps'".into()))?;

        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            let (tool, params) = tool_call(step)?;
            results.push(tools.execute_tool(tool, params, ctx).await?);
        }
        Ok(Value::Array(results))
    }
}

/// Routes admitted tasks to their handler
pub struct TaskDispatcher {
    handlers: RwLock<HashMap<TaskType, Arc<dyn TaskHandler>>>,
    tools: Arc<ToolRegistry>,
}

impl TaskDispatcher {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            tools,
        }
    }

    pub fn with_defaults(tools: Arc<ToolRegistry>) -> Self {
        let dispatcher = Self::new(tools);
        dispatcher.register(TaskType::Query, Arc::new(QueryHandler));
        dispatcher.register(TaskType::Action, Arc::new(ActionHandler));
        dispatcher.register(TaskType::Analysis, Arc::new(AnalysisHandler));
        dispatcher.register(TaskType::Workflow, Arc::new(WorkflowHandler));
        dispatcher
    }

    pub fn register(&self, task_type: TaskType, handler: Arc<dyn TaskHandler>) {
        self.handlers.write().insert(task_type, handler);
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Owned future for `task`, ready to hand to an execution unit
    pub fn dispatch(&self, task: AgentTask, ctx: AgentExecutionContext) -> UnitWork {
        let handler = self.handlers.read().get(&task.task_type).cloned();
        let tools = Arc::clone(&self.tools);

        async move {
            let handler = handler.ok_or_else(|| {
                EngineError::TaskFailed(format!("no handler for task type {}", task.task_type.as_str()))
            })?;
            handler.handle(&task, &ctx, &tools).await
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{EchoModel, InMemoryStore, MemoryCollaborator};
    use crate::runtime::agent_config::{AgentConfig, PartialAgentConfig};
    use crate::runtime::builtin_tools::register_builtin_tools;
    use crate::runtime::context::ContextTemplate;
    use crate::runtime::tool_registry::FnTool;

    async fn dispatcher() -> TaskDispatcher {
        let store = Arc::new(InMemoryStore::new());
        store
            .store_record("Quarterly revenue grew in Europe", "report", json!({}))
            .await
            .unwrap();

        let tools = Arc::new(ToolRegistry::new());
        register_builtin_tools(&tools, store, Arc::new(EchoModel::new()));
        tools.register_tool(Arc::new(FnTool::new("util.upper", |params, _ctx| {
            async move {
                let text = params["text"].as_str().unwrap_or_default().to_uppercase();
                Ok(json!(text))
            }
            .boxed()
        })));
        TaskDispatcher::with_defaults(tools)
    }

    fn ctx() -> AgentExecutionContext {
        let config = AgentConfig::from_partial(
            &PartialAgentConfig::named("d")
                .with_id("agent_d")
                .with_models(["small"])
                .with_tools(["util.upper"]),
        )
        .unwrap();
        Arc::new(ContextTemplate::from_config(&config)).for_task("task_d")
    }

    fn task(task_type: TaskType, input: Value) -> AgentTask {
        AgentTask::new("agent_d", task_type, input)
    }

    #[tokio::test]
    async fn test_query_accepts_bare_string() {
        let d = dispatcher().await;
        let out = d.dispatch(task(TaskType::Query, json!("hello")), ctx()).await.unwrap();
        assert_eq!(out["model"], "small");
    }

    #[tokio::test]
    async fn test_action_calls_tool() {
        let d = dispatcher().await;
        let input = json!({ "tool": "util.upper", "params": { "text": "abc" } });
        let out = d.dispatch(task(TaskType::Action, input), ctx()).await.unwrap();
        assert_eq!(out, json!("ABC"));
    }

    #[tokio::test]
    async fn test_analysis_summary_shape() {
        let d = dispatcher().await;
        let input = json!({ "query": "revenue in europe" });
        let out = d.dispatch(task(TaskType::Analysis, input), ctx()).await.unwrap();

        assert_eq!(out["query"], "revenue in europe");
        assert_eq!(out["item_count"], 1);
        assert!(out["summary"].as_str().unwrap().contains("Quarterly"));
    }

    #[tokio::test]
    async fn test_workflow_is_fail_fast() {
        let d = dispatcher().await;

        let ok = json!({ "steps": [
            { "tool": "util.upper", "params": { "text": "a" } },
            { "tool": "util.upper", "params": { "text": "b" } },
        ]});
        let out = d.dispatch(task(TaskType::Workflow, ok), ctx()).await.unwrap();
        assert_eq!(out, json!(["A", "B"]));

        let broken = json!({ "steps": [
            { "tool": "util.upper", "params": { "text": "a" } },
            { "tool": "missing.tool" },
            { "tool": "util.upper", "params": { "text": "c" } },
        ]});
        let err = d.dispatch(task(TaskType::Workflow, broken), ctx()).await.unwrap_err();
        assert!(matches!(err, EngineError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_custom_handler_overrides_default() {
        struct Fixed;

        #[async_trait]
        impl TaskHandler for Fixed {
            async fn handle(
                &self,
                _task: &AgentTask,
                _ctx: &AgentExecutionContext,
                _tools: &ToolRegistry,
            ) -> Result<Value> {
                Ok(json!("fixed"))
            }
        }

        let d = dispatcher().await;
        d.register(TaskType::Query, Arc::new(Fixed));
        let out = d.dispatch(task(TaskType::Query, json!("x")), ctx()).await.unwrap();
        assert_eq!(out, json!("fixed"));
    }

    #[tokio::test]
    async fn test_missing_handler_fails() {
        let d = TaskDispatcher::new(Arc::new(ToolRegistry::new()));
        let err = d.dispatch(task(TaskType::Query, json!("x")), ctx()).await.unwrap_err();
        assert!(matches!(err, EngineError::TaskFailed(_)));
    }
}
