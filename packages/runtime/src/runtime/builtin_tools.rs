// packages/runtime/src/runtime/builtin_tools.rs
//! Built-in tools registered by every runtime
//!
//! These are the only places where the runtime calls out to the memory and
//! model collaborators.

use crate::collaborators::{MemoryCollaborator, ModelCollaborator};
use crate::runtime::agent_config::Permission;
use crate::runtime::context::AgentExecutionContext;
use crate::runtime::tool_registry::{require_str, Tool, ToolRegistry, ToolTier};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub const BASIC_CHAT: &str = "basic.chat";
pub const BASIC_SEARCH: &str = "basic.search";
pub const MODEL_EXECUTE: &str = "model.execute";

/// Resolve the model for a call and enforce the allow-list
fn resolve_model(params: &Value, ctx: &AgentExecutionContext) -> Result<String> {
    let model = match params.get("model").and_then(Value::as_str) {
        Some(model) => model.to_string(),
        None => ctx.allowed_models().first().cloned().ok_or_else(|| {
            EngineError::InvalidParameters(format!(
                "no model given and agent {} has no allowed models",
                ctx.agent_id()
            ))
        })?,
    };

    if !ctx.allows_model(&model) {
        return Err(EngineError::PermissionDenied(format!(
            "agent {} may not use model {}",
            ctx.agent_id(),
            model
        )));
    }
    Ok(model)
}

/// Chat with a model, optionally grounded in retrieved memory
pub struct ChatTool {
    memory: Arc<dyn MemoryCollaborator>,
    model: Arc<dyn ModelCollaborator>,
}

impl ChatTool {
    pub fn new(memory: Arc<dyn MemoryCollaborator>, model: Arc<dyn ModelCollaborator>) -> Self {
        Self { memory, model }
    }
}

#[async_trait]
impl Tool for ChatTool {
    fn name(&self) -> &str {
        BASIC_CHAT
    }

    fn tier(&self) -> ToolTier {
        ToolTier::Basic
    }

    fn permissions(&self) -> Vec<Permission> {
        vec![Permission::ModelsExecute]
    }

    fn validate(&self, params: &Value) -> Result<()> {
        require_str(params, "message").map(|_| ())
    }

    async fn execute(&self, params: Value, ctx: &AgentExecutionContext) -> Result<Value> {
        let message = require_str(&params, "message")?;
        let model = resolve_model(&params, ctx)?;

        let mut context_items = 0;
        let prompt = if ctx.grants(Permission::MemoryRead) {
            let retrieved = self.memory.retrieve_context(message).await?;
            context_items = retrieved.items.len();
            if retrieved.summary.is_empty() {
                message.to_string()
            } else {
                format!("Context:\n{}\n\nUser: {}", retrieved.summary, message)
            }
        } else {
            message.to_string()
        };

        debug!(agent_id = ctx.agent_id(), model = %model, context_items, "Chat call");
        let output = self.model.execute(&model, &prompt, json!({})).await?;

        Ok(json!({
            "model": model,
            "output": output,
            "context_items": context_items,
        }))
    }
}

/// Retrieve memory context for a query
pub struct SearchTool {
    memory: Arc<dyn MemoryCollaborator>,
}

impl SearchTool {
    pub fn new(memory: Arc<dyn MemoryCollaborator>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        BASIC_SEARCH
    }

    fn tier(&self) -> ToolTier {
        ToolTier::Basic
    }

    fn permissions(&self) -> Vec<Permission> {
        vec![Permission::MemorySearch]
    }

    fn validate(&self, params: &Value) -> Result<()> {
        require_str(params, "query").map(|_| ())
    }

    async fn execute(&self, params: Value, _ctx: &AgentExecutionContext) -> Result<Value> {
        let query = require_str(&params, "query")?;
        let retrieved = self.memory.retrieve_context(query).await?;
        Ok(serde_json::to_value(retrieved)?)
    }
}

/// Raw prompt execution against an allowed model
pub struct ModelExecuteTool {
    model: Arc<dyn ModelCollaborator>,
}

impl ModelExecuteTool {
    pub fn new(model: Arc<dyn ModelCollaborator>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Tool for ModelExecuteTool {
    fn name(&self) -> &str {
        MODEL_EXECUTE
    }

    fn permissions(&self) -> Vec<Permission> {
        vec![Permission::ModelsExecute]
    }

    fn validate(&self, params: &Value) -> Result<()> {
        require_str(params, "model")?;
        require_str(params, "prompt")?;
        match params.get("options") {
            None | Some(Value::Null) | Some(Value::Object(_)) => Ok(()),
            Some(_) => Err(EngineError::InvalidParameters(
                "'options' must be an object".into(),
            )),
        }
    }

    async fn execute(&self, params: Value, ctx: &AgentExecutionContext) -> Result<Value> {
        let model = resolve_model(&params, ctx)?;
        let prompt = require_str(&params, "prompt")?;
        let options = params.get("options").cloned().unwrap_or_else(|| json!({}));

        self.model.execute(&model, prompt, options).await
    }
}

pub fn register_builtin_tools(
    registry: &ToolRegistry,
    memory: Arc<dyn MemoryCollaborator>,
    model: Arc<dyn ModelCollaborator>,
) {
    registry.register_tool(Arc::new(ChatTool::new(Arc::clone(&memory), Arc::clone(&model))));
    registry.register_tool(Arc::new(SearchTool::new(memory)));
    registry.register_tool(Arc::new(ModelExecuteTool::new(model)));
}
