// packages/runtime/src/runtime/events.rs
//! Runtime lifecycle events broadcast to subscribers

use crate::runtime::resource_monitor::LimitExceeded;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RuntimeEvent {
    AgentCreated {
        agent_id: String,
        name: String,
    },
    AgentUpdated {
        agent_id: String,
    },
    AgentStarted {
        agent_id: String,
    },
    AgentStopped {
        agent_id: String,
        reason: Option<String>,
    },
    AgentDeleted {
        agent_id: String,
    },
    TaskCompleted {
        agent_id: String,
        task_id: String,
        execution_time_ms: u64,
    },
    TaskFailed {
        agent_id: String,
        task_id: String,
        error: String,
    },
    TaskCancelled {
        agent_id: String,
        task_id: String,
    },
    ResourceLimitExceeded(LimitExceeded),
}

impl RuntimeEvent {
    pub fn agent_id(&self) -> &str {
        match self {
            RuntimeEvent::AgentCreated { agent_id, .. }
            | RuntimeEvent::AgentUpdated { agent_id }
            | RuntimeEvent::AgentStarted { agent_id }
            | RuntimeEvent::AgentStopped { agent_id, .. }
            | RuntimeEvent::AgentDeleted { agent_id }
            | RuntimeEvent::TaskCompleted { agent_id, .. }
            | RuntimeEvent::TaskFailed { agent_id, .. }
            | RuntimeEvent::TaskCancelled { agent_id, .. } => agent_id,
            RuntimeEvent::ResourceLimitExceeded(breach) => &breach.agent_id,
        }
    }
}

pub type EventSender = broadcast::Sender<RuntimeEvent>;

/// Send without caring whether anyone listens
pub(crate) fn emit(sender: &EventSender, event: RuntimeEvent) {
    if sender.send(event).is_err() {
        trace!("No subscribers for runtime events");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::resource_monitor::LimitKind;

    #[test]
    fn test_tagged_wire_format() {
        let event = RuntimeEvent::AgentStopped {
            agent_id: "a".into(),
            reason: Some("memory".into()),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "agent_stopped");
        assert_eq!(value["reason"], "memory");
    }

    #[test]
    fn test_limit_event_keeps_breach_fields() {
        let event = RuntimeEvent::ResourceLimitExceeded(LimitExceeded {
            agent_id: "a".into(),
            kind: LimitKind::ApiCalls,
            usage: 11,
            limit: 10,
            generation: 1,
        });
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event"], "resource_limit_exceeded");
        assert_eq!(value["type"], "api-calls");
        assert_eq!(event.agent_id(), "a");
    }
}
