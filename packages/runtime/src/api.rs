// packages/runtime/src/api.rs
//! JSON request/response envelope for the inbound operations
//!
//! ```json
//! {"id": 7, "method": "execute_task", "params": {"agent_id": "agent_x", "task": {"type": "query", "input": "hi"}}}
//! {"id": 7, "ok": true, "result": {...}}
//! {"ok": false, "error": {"code": "agent_not_running", "message": "..."}}
//! ```
//!
//! The optional `id` is echoed back so callers can match responses to
//! requests handled concurrently.

use crate::runtime::agent_config::PartialAgentConfig;
use crate::runtime::agent_runtime::AgentRuntime;
use crate::runtime::task::TaskRequest;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum RuntimeRequest {
    CreateAgent(PartialAgentConfig),
    UpdateAgent {
        agent_id: String,
        patch: PartialAgentConfig,
    },
    StartAgent {
        agent_id: String,
    },
    StopAgent {
        agent_id: String,
    },
    DeleteAgent {
        agent_id: String,
    },
    ExecuteTask {
        agent_id: String,
        #[serde(default)]
        task: TaskRequest,
    },
    CancelTask {
        agent_id: String,
        task_id: String,
    },
    GetAgentStatus {
        agent_id: String,
    },
    GetSystemStatus,
    ListAgents,
    ListTasks {
        agent_id: String,
    },
    GetTask {
        agent_id: String,
        task_id: String,
    },
    ListTools {
        agent_id: String,
    },
}

impl RuntimeRequest {
    pub fn method(&self) -> &'static str {
        match self {
            RuntimeRequest::CreateAgent(_) => "create_agent",
            RuntimeRequest::UpdateAgent { .. } => "update_agent",
            RuntimeRequest::StartAgent { .. } => "start_agent",
            RuntimeRequest::StopAgent { .. } => "stop_agent",
            RuntimeRequest::DeleteAgent { .. } => "delete_agent",
            RuntimeRequest::ExecuteTask { .. } => "execute_task",
            RuntimeRequest::CancelTask { .. } => "cancel_task",
            RuntimeRequest::GetAgentStatus { .. } => "get_agent_status",
            RuntimeRequest::GetSystemStatus => "get_system_status",
            RuntimeRequest::ListAgents => "list_agents",
            RuntimeRequest::ListTasks { .. } => "list_tasks",
            RuntimeRequest::GetTask { .. } => "get_task",
            RuntimeRequest::ListTools { .. } => "list_tools",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl RuntimeResponse {
    pub fn success(result: Value) -> Self {
        Self {
            id: None,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: &EngineError) -> Self {
        Self {
            id: None,
            ok: false,
            result: None,
            error: Some(ApiError {
                code: error.code().to_string(),
                message: error.to_string(),
            }),
        }
    }

    pub fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }
}

impl From<Result<Value>> for RuntimeResponse {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(e) => Self::failure(&e),
        }
    }
}

async fn dispatch(runtime: &AgentRuntime, request: RuntimeRequest) -> Result<Value> {
    let value = match request {
        RuntimeRequest::CreateAgent(partial) => serde_json::to_value(runtime.create_agent(partial).await?)?,
        RuntimeRequest::UpdateAgent { agent_id, patch } => {
            serde_json::to_value(runtime.update_agent(&agent_id, patch).await?)?
        }
        RuntimeRequest::StartAgent { agent_id } => {
            runtime.start_agent(&agent_id)?;
            serde_json::to_value(runtime.get_agent_status(&agent_id)?)?
        }
        RuntimeRequest::StopAgent { agent_id } => {
            runtime.stop_agent(&agent_id)?;
            serde_json::to_value(runtime.get_agent_status(&agent_id)?)?
        }
        RuntimeRequest::DeleteAgent { agent_id } => {
            runtime.delete_agent(&agent_id)?;
            serde_json::json!({ "deleted": agent_id })
        }
        RuntimeRequest::ExecuteTask { agent_id, task } => {
            serde_json::to_value(runtime.execute_task(&agent_id, task).await?)?
        }
        RuntimeRequest::CancelTask { agent_id, task_id } => {
            runtime.cancel_task(&agent_id, &task_id)?;
            serde_json::json!({ "cancelled": task_id })
        }
        RuntimeRequest::GetAgentStatus { agent_id } => serde_json::to_value(runtime.get_agent_status(&agent_id)?)?,
        RuntimeRequest::GetSystemStatus => serde_json::to_value(runtime.get_system_status())?,
        RuntimeRequest::ListAgents => serde_json::to_value(runtime.list_agents())?,
        RuntimeRequest::ListTasks { agent_id } => serde_json::to_value(runtime.list_tasks(&agent_id)?)?,
        RuntimeRequest::GetTask { agent_id, task_id } => {
            serde_json::to_value(runtime.get_task(&agent_id, &task_id)?)?
        }
        RuntimeRequest::ListTools { agent_id } => serde_json::to_value(runtime.available_tools(&agent_id)?)?,
    };
    Ok(value)
}

pub async fn handle_request(runtime: &AgentRuntime, request: RuntimeRequest) -> RuntimeResponse {
    let method = request.method();
    let response = RuntimeResponse::from(dispatch(runtime, request).await);
    debug!(method, ok = response.ok, "Handled request");
    response
}

/// Parse one JSON line and handle it; malformed input becomes an error response
pub async fn handle_line(runtime: &AgentRuntime, line: &str) -> RuntimeResponse {
    let mut value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return RuntimeResponse::failure(&EngineError::Serialization(e)),
    };
    let id = value.as_object_mut().and_then(|map| map.remove("id"));

    let response = match serde_json::from_value::<RuntimeRequest>(value) {
        Ok(request) => handle_request(runtime, request).await,
        Err(e) => RuntimeResponse::failure(&EngineError::Serialization(e)),
    };
    response.with_id(id)
}
