// packages/runtime/src/runtime/mod.rs
//! Agent execution runtime
//!
//! This module provides the agent execution core, including:
//!
//! - **Agent Runtime**: Orchestrator owning agents and the shared services
//! - **Agent Instance**: Per-agent lifecycle state machine and FIFO task queue
//! - **Circuit Breaker**: Per-agent failure gate on task admission
//! - **Resource Monitor**: Periodic quota checks with limit notifications
//! - **Tool Registry**: Permission-gated, validated, time-bounded tool calls
//! - **Dispatch**: Task-type handlers
//! - **Isolation**: Terminable execution units for task bodies
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Agent Runtime                       │
//! │   ┌───────────────┐ ┌────────────────┐ ┌─────────────┐  │
//! │   │Circuit Breaker│ │Resource Monitor│ │Tool Registry│  │
//! │   └───────┬───────┘ └───────┬────────┘ └──────┬──────┘  │
//! │           └─────── shared, keyed by agent id ─┘         │
//! │                             │                           │
//! │     ┌──────────┐     ┌──────────┐     ┌──────────┐      │
//! │     │ Agent A  │     │ Agent B  │     │ Agent C  │ ...  │
//! │     │ queue    │     │ queue    │     │ queue    │      │
//! │     └────┬─────┘     └────┬─────┘     └────┬─────┘      │
//! │          ▼                ▼                ▼            │
//! │     Execution unit → dispatch → tools → collaborators   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Tasks of one agent never run in parallel; tasks of different agents are
//! unordered relative to each other.

pub mod agent_config;
pub mod agent_instance;
pub mod agent_runtime;
pub mod builtin_tools;
pub mod circuit_breaker;
pub mod context;
pub mod dispatch;
pub mod events;
pub mod isolation;
pub mod resource_monitor;
pub mod task;
pub mod tool_registry;

// Re-export commonly used types
pub use agent_config::{
    AgentConfig, AgentType, PartialAgentConfig, Permission, PermissionTree, QuotaPreset, ResourceQuota,
};
pub use agent_instance::{AgentState, AgentStatusReport};
pub use agent_runtime::{AgentRuntime, AgentRuntimeConfig, SystemStatus};
pub use circuit_breaker::{BreakerSnapshot, BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use context::AgentExecutionContext;
pub use dispatch::TaskHandler;
pub use events::RuntimeEvent;
pub use isolation::{ExecutionUnit, ExecutionUnitKind};
pub use resource_monitor::{LimitExceeded, LimitKind, MonitorConfig, ResourceMonitor, ResourceUsage, UsageUpdate};
pub use task::{AgentTask, TaskPriority, TaskRequest, TaskStatus, TaskType};
pub use tool_registry::{FnTool, Tool, ToolRegistry, ToolTier};
