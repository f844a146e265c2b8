// packages/runtime/src/runtime/task.rs
//! Tasks submitted to agents
//!
//! Status only moves forward:
//!
//! ```text
//! pending ──► running ──► completed
//!    │           ├──────► failed
//!    └───────────┴──────► cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of work requested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Query,
    Action,
    Workflow,
    Analysis,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Query => "query",
            TaskType::Action => "action",
            TaskType::Workflow => "workflow",
            TaskType::Analysis => "analysis",
        }
    }
}

/// Advisory priority; the scheduler is strictly FIFO
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of requested work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    pub agent_id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub input: Value,
    pub priority: TaskPriority,

    /// Overrides the agent's `max_execution_time_ms` when set
    pub timeout_ms: Option<u64>,

    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_time_ms: Option<u64>,
}

/// Caller-supplied task; missing fields get defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl TaskRequest {
    pub fn new(task_type: TaskType, input: Value) -> Self {
        Self {
            task_type: Some(task_type),
            input,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

impl AgentTask {
    pub fn new(agent_id: impl Into<String>, task_type: TaskType, input: Value) -> Self {
        Self {
            id: format!("task_{}", ulid::Ulid::new().to_string().to_lowercase()),
            agent_id: agent_id.into(),
            task_type,
            input,
            priority: TaskPriority::default(),
            timeout_ms: None,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            execution_time_ms: None,
        }
    }

    pub fn from_request(agent_id: impl Into<String>, request: TaskRequest) -> Self {
        let mut task = Self::new(
            agent_id,
            request.task_type.unwrap_or_default(),
            request.input,
        );
        if let Some(id) = request.id {
            task.id = id;
        }
        task.priority = request.priority.unwrap_or_default();
        task.timeout_ms = request.timeout_ms;
        task
    }

    /// Move to `next` if legal; returns false and leaves the task untouched otherwise
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }

        self.status = next;
        match next {
            TaskStatus::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        true
    }

    pub fn complete(&mut self, result: Value) {
        if self.transition(TaskStatus::Completed) {
            self.result = Some(result);
        }
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if self.transition(TaskStatus::Failed) {
            self.error = Some(error.into());
        }
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        if self.transition(TaskStatus::Cancelled) {
            self.error = Some(reason.into());
        }
    }
}
