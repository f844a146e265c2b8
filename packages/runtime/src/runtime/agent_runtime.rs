// packages/runtime/src/runtime/agent_runtime.rs
//! Agent runtime orchestrator
//!
//! Owns every agent instance together with the shared circuit breaker,
//! resource monitor, tool registry and dispatch table, and applies the
//! policy for resource-limit notifications:
//! - memory, execution-time and cpu-time breaches stop the agent
//! - api-call breaches are only re-emitted as events

use crate::collaborators::{MemoryCollaborator, ModelCollaborator, AGENT_STATE_KIND};
use crate::runtime::agent_config::{AgentConfig, PartialAgentConfig};
use crate::runtime::agent_instance::{AgentInstance, AgentState, AgentStatusReport, InstanceDeps};
use crate::runtime::builtin_tools::register_builtin_tools;
use crate::runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::runtime::context::ContextTemplate;
use crate::runtime::dispatch::{TaskDispatcher, TaskHandler};
use crate::runtime::events::{emit, EventSender, RuntimeEvent};
use crate::runtime::isolation::{unit_for, ExecutionUnit, ExecutionUnitKind};
use crate::runtime::resource_monitor::{LimitExceeded, MonitorConfig, ResourceMonitor};
use crate::runtime::task::{AgentTask, TaskRequest, TaskType};
use crate::runtime::tool_registry::{Tool, ToolRegistry, DEFAULT_TOOL_TIMEOUT_MS};
use crate::utils::errors::{EngineError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for the agent runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentRuntimeConfig {
    /// Bound on a single tool call (milliseconds)
    pub tool_timeout_ms: u64,

    /// Settled tasks kept per agent
    pub task_history_limit: usize,

    /// Execution unit used for task bodies
    pub execution_unit: ExecutionUnitKind,

    /// Capacity of the runtime event channel
    pub event_capacity: usize,

    pub monitor: MonitorConfig,

    pub breaker: CircuitBreakerConfig,
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self {
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
            task_history_limit: 100,
            execution_unit: ExecutionUnitKind::Spawned,
            event_capacity: 256,
            monitor: MonitorConfig::default(),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Aggregate view over all agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub total_agents: usize,
    pub active_agents: usize,
    pub idle_agents: usize,
    pub stopped_agents: usize,
    pub errored_agents: usize,
    pub running_tasks: usize,
    pub queued_tasks: usize,
    pub monitored_agents: usize,

    /// active / total, 0 when there are no agents
    pub load: f64,

    pub uptime_ms: u64,
    pub tools: Vec<String>,
}

/// Orchestrator for a set of agents
pub struct AgentRuntime {
    config: AgentRuntimeConfig,
    agents: DashMap<String, Arc<AgentInstance>>,
    breaker: Arc<CircuitBreaker>,
    monitor: Arc<ResourceMonitor>,
    tools: Arc<ToolRegistry>,
    dispatcher: Arc<TaskDispatcher>,
    unit: Arc<dyn ExecutionUnit>,
    memory: Arc<dyn MemoryCollaborator>,
    events: EventSender,
    listener: Mutex<Option<JoinHandle<()>>>,
    started: Instant,
}

impl AgentRuntime {
    /// Build a runtime and subscribe to limit notifications.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: AgentRuntimeConfig,
        memory: Arc<dyn MemoryCollaborator>,
        model: Arc<dyn ModelCollaborator>,
    ) -> Arc<Self> {
        let breaker = Arc::new(CircuitBreaker::new(config.breaker.clone()));
        let monitor = Arc::new(ResourceMonitor::new(config.monitor.clone()));

        let tools = Arc::new(
            ToolRegistry::new()
                .with_timeout(Duration::from_millis(config.tool_timeout_ms))
                .with_monitor(Arc::clone(&monitor)),
        );
        register_builtin_tools(&tools, Arc::clone(&memory), model);

        let dispatcher = Arc::new(TaskDispatcher::with_defaults(Arc::clone(&tools)));
        let unit = unit_for(config.execution_unit);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let notifications = monitor.subscribe();

        info!(
            execution_unit = ?config.execution_unit,
            tools = tools.len(),
            "Agent runtime initialized"
        );

        Arc::new_cyclic(|weak: &Weak<AgentRuntime>| {
            let listener = tokio::spawn(Self::listen(weak.clone(), notifications));
            Self {
                config,
                agents: DashMap::new(),
                breaker,
                monitor,
                tools,
                dispatcher,
                unit,
                memory,
                events,
                listener: Mutex::new(Some(listener)),
                started: Instant::now(),
            }
        })
    }

    async fn listen(runtime: Weak<AgentRuntime>, mut rx: broadcast::Receiver<LimitExceeded>) {
        loop {
            match rx.recv().await {
                Ok(breach) => {
                    let Some(runtime) = runtime.upgrade() else {
                        break;
                    };
                    runtime.handle_limit(breach);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Limit listener lagged behind notifications");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Limit listener exited");
    }

    fn handle_limit(&self, breach: LimitExceeded) {
        // Measured on a snapshot that has since been stopped or replaced
        if !self.monitor.is_current(&breach) {
            debug!(
                agent_id = %breach.agent_id,
                kind = breach.kind.as_str(),
                "Dropping stale limit notification"
            );
            return;
        }

        let agent_id = breach.agent_id.clone();
        let kind = breach.kind;
        emit(&self.events, RuntimeEvent::ResourceLimitExceeded(breach));

        if kind.is_fatal() {
            let reason = format!("{} limit exceeded", kind.as_str());
            if let Err(e) = self.stop_with_reason(&agent_id, &reason) {
                warn!(agent_id = %agent_id, error = %e, "Failed to stop agent after limit breach");
            }
        }
    }

    pub fn config(&self) -> &AgentRuntimeConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    pub fn resource_monitor(&self) -> &Arc<ResourceMonitor> {
        &self.monitor
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        self.tools.register_tool(tool);
    }

    /// Override the handler for a task type
    pub fn register_handler(&self, task_type: TaskType, handler: Arc<dyn TaskHandler>) {
        self.dispatcher.register(task_type, handler);
    }

    fn deps(&self) -> InstanceDeps {
        InstanceDeps {
            breaker: Arc::clone(&self.breaker),
            monitor: Arc::clone(&self.monitor),
            dispatcher: Arc::clone(&self.dispatcher),
            unit: Arc::clone(&self.unit),
            events: self.events.clone(),
            history_limit: self.config.task_history_limit.max(1),
        }
    }

    fn instance(&self, agent_id: &str) -> Result<Arc<AgentInstance>> {
        self.agents
            .get(agent_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::AgentNotFound(agent_id.to_string()))
    }

    async fn persist(&self, config: &AgentConfig) -> Result<()> {
        let content = serde_json::to_string(config)?;
        let metadata = json!({ "agent_id": config.id, "name": config.name });
        let record_id = self
            .memory
            .store_record(&content, AGENT_STATE_KIND, metadata)
            .await?;
        debug!(agent_id = %config.id, record_id = %record_id, "Persisted agent state");
        Ok(())
    }

    fn update_gauges(&self) {
        let total = self.agents.len();
        let active = self.agents.iter().filter(|a| a.is_running()).count();
        metrics::gauge!("agent_runtime_agents", "state" => "total").set(total as f64);
        metrics::gauge!("agent_runtime_agents", "state" => "active").set(active as f64);
    }

    /// Merge defaults, persist the config and register an idle agent
    pub async fn create_agent(&self, partial: PartialAgentConfig) -> Result<AgentConfig> {
        let config = AgentConfig::from_partial(&partial)?;
        if self.agents.contains_key(&config.id) {
            return Err(EngineError::ConfigValidation(format!(
                "agent {} already exists",
                config.id
            )));
        }

        self.persist(&config).await?;

        match self.agents.entry(config.id.clone()) {
            Entry::Occupied(_) => {
                return Err(EngineError::ConfigValidation(format!(
                    "agent {} already exists",
                    config.id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(AgentInstance::new(config.clone(), self.deps()));
            }
        }

        info!(agent_id = %config.id, name = %config.name, "Agent created");
        emit(
            &self.events,
            RuntimeEvent::AgentCreated {
                agent_id: config.id.clone(),
                name: config.name.clone(),
            },
        );
        self.update_gauges();
        Ok(config)
    }

    /// Merge `patch` into the stored config and persist the result
    pub async fn update_agent(&self, agent_id: &str, patch: PartialAgentConfig) -> Result<AgentConfig> {
        let instance = self.instance(agent_id)?;
        let updated = instance.config().apply(&patch)?;

        self.persist(&updated).await?;
        instance.install_config(updated.clone());

        emit(
            &self.events,
            RuntimeEvent::AgentUpdated {
                agent_id: agent_id.to_string(),
            },
        );
        Ok(updated)
    }

    pub fn start_agent(&self, agent_id: &str) -> Result<()> {
        let instance = self.instance(agent_id)?;
        if instance.is_running() {
            return Ok(());
        }

        instance.start()?;
        instance.set_active(true);

        emit(
            &self.events,
            RuntimeEvent::AgentStarted {
                agent_id: agent_id.to_string(),
            },
        );
        self.update_gauges();
        Ok(())
    }

    pub fn stop_agent(&self, agent_id: &str) -> Result<()> {
        self.stop_with_reason(agent_id, "requested")
    }

    fn stop_with_reason(&self, agent_id: &str, reason: &str) -> Result<()> {
        let instance = self.instance(agent_id)?;
        if instance.status() == AgentState::Stopped {
            return Ok(());
        }

        instance.stop(reason)?;
        instance.set_active(false);

        emit(
            &self.events,
            RuntimeEvent::AgentStopped {
                agent_id: agent_id.to_string(),
                reason: Some(reason.to_string()),
            },
        );
        self.update_gauges();
        Ok(())
    }

    /// Stop the agent and forget it, including its breaker state
    pub fn delete_agent(&self, agent_id: &str) -> Result<()> {
        let (_, instance) = self
            .agents
            .remove(agent_id)
            .ok_or_else(|| EngineError::AgentNotFound(agent_id.to_string()))?;

        instance.stop("deleted")?;
        self.breaker.reset(agent_id);

        info!(agent_id, "Agent deleted");
        emit(
            &self.events,
            RuntimeEvent::AgentDeleted {
                agent_id: agent_id.to_string(),
            },
        );
        self.update_gauges();
        Ok(())
    }

    /// Fill task defaults and run it on the agent. Resolves when the task
    /// settles; execution failures are reported on the returned task.
    pub async fn execute_task(&self, agent_id: &str, request: TaskRequest) -> Result<AgentTask> {
        let instance = self.instance(agent_id)?;
        let task = AgentTask::from_request(agent_id, request);
        debug!(agent_id, task_id = %task.id, task_type = task.task_type.as_str(), "Executing task");
        instance.execute_task(task).await
    }

    pub fn cancel_task(&self, agent_id: &str, task_id: &str) -> Result<()> {
        self.instance(agent_id)?.cancel_task(task_id)
    }

    pub fn get_task(&self, agent_id: &str, task_id: &str) -> Result<AgentTask> {
        self.instance(agent_id)?
            .get_task(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))
    }

    pub fn list_tasks(&self, agent_id: &str) -> Result<Vec<AgentTask>> {
        Ok(self.instance(agent_id)?.list_tasks())
    }

    pub fn get_agent_status(&self, agent_id: &str) -> Result<AgentStatusReport> {
        Ok(self.instance(agent_id)?.status_report())
    }

    pub fn list_agents(&self) -> Vec<AgentConfig> {
        let mut configs: Vec<AgentConfig> = self.agents.iter().map(|a| a.config()).collect();
        configs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        configs
    }

    /// Tools the agent may call with its current config
    pub fn available_tools(&self, agent_id: &str) -> Result<Vec<String>> {
        let instance = self.instance(agent_id)?;
        let template = instance
            .template()
            .unwrap_or_else(|| Arc::new(ContextTemplate::from_config(&instance.config())));
        Ok(self.tools.get_available_tools(&template.for_task("preview")))
    }

    pub fn get_system_status(&self) -> SystemStatus {
        let instances: Vec<Arc<AgentInstance>> =
            self.agents.iter().map(|a| Arc::clone(a.value())).collect();

        let count = |state: AgentState| instances.iter().filter(|a| a.status() == state).count();
        let total_agents = instances.len();
        let active_agents = count(AgentState::Running);

        SystemStatus {
            total_agents,
            active_agents,
            idle_agents: count(AgentState::Idle),
            stopped_agents: count(AgentState::Stopped),
            errored_agents: count(AgentState::Error),
            running_tasks: instances.iter().filter(|a| a.has_active_task()).count(),
            queued_tasks: instances.iter().map(|a| a.queue_len()).sum(),
            monitored_agents: self.monitor.monitored_count(),
            load: if total_agents == 0 {
                0.0
            } else {
                active_agents as f64 / total_agents as f64
            },
            uptime_ms: self.started.elapsed().as_millis() as u64,
            tools: self.tools.tool_names(),
        }
    }

    /// Stop every agent and the limit listener
    pub fn shutdown(&self) {
        info!(agents = self.agents.len(), "Shutting down agent runtime");

        let ids: Vec<String> = self.agents.iter().map(|a| a.key().clone()).collect();
        for id in ids {
            if let Err(e) = self.stop_with_reason(&id, "shutdown") {
                warn!(agent_id = %id, error = %e, "Failed to stop agent during shutdown");
            }
        }

        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }
}

impl Drop for AgentRuntime {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}
