// packages/runtime/src/runtime/agent_instance.rs
//! One agent: lifecycle state machine plus its task queue
//!
//! ```text
//! idle ──start──► running ──stop──► stopped
//!   │                │                 │
//!   └── start/stop failure ──► error   └──start──► running
//! ```
//!
//! At most one task per agent runs at a time. Tasks submitted while another
//! is running wait in a FIFO queue bounded by `max_concurrent_tasks`; when the
//! running task settles, the next one starts without caller involvement.
//!
//! Execution-phase failures (tool errors, timeouts, cancellation of the
//! running task) are recorded on the returned `AgentTask`. Only admission
//! errors and the rejection of a queued task surface as `Err`.

use crate::runtime::agent_config::{AgentConfig, PartialAgentConfig};
use crate::runtime::circuit_breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
use crate::runtime::context::ContextTemplate;
use crate::runtime::dispatch::TaskDispatcher;
use crate::runtime::events::{emit, EventSender, RuntimeEvent};
use crate::runtime::isolation::{ExecutionUnit, UnitHandle};
use crate::runtime::resource_monitor::{ResourceMonitor, ResourceUsage, UsageUpdate};
use crate::runtime::task::{AgentTask, TaskStatus};
use crate::utils::errors::{EngineError, Result};
use crate::utils::timeout::with_timeout;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Running,
    Stopped,
    Error,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Running => "running",
            AgentState::Stopped => "stopped",
            AgentState::Error => "error",
        }
    }
}

/// Status report for one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub agent_id: String,
    pub name: String,
    pub status: AgentState,
    pub is_active: bool,
    pub current_task: Option<String>,
    pub queue_length: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub cancelled_tasks: u64,
    pub breaker: BreakerSnapshot,
    pub usage: Option<ResourceUsage>,
    pub last_error: Option<String>,
}

type Settlement = oneshot::Sender<Result<AgentTask>>;

struct ActiveTask {
    task: AgentTask,
    unit: Option<UnitHandle>,
    cancelled: bool,
    /// Admitted as the half-open probe
    probe: bool,
}

struct QueuedTask {
    task: AgentTask,
    settle: Settlement,
    probe: bool,
}

#[derive(Default)]
struct InstanceState {
    status: AgentState,
    template: Option<Arc<ContextTemplate>>,
    active: Option<ActiveTask>,
    queue: VecDeque<QueuedTask>,
    history: VecDeque<AgentTask>,
    completed: u64,
    failed: u64,
    cancelled: u64,
    last_error: Option<String>,
}

impl InstanceState {
    fn record(&mut self, task: AgentTask, limit: usize) {
        match task.status {
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
            _ => {}
        }
        self.history.push_back(task);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }
}

/// Shared collaborators handed to every instance by the runtime
#[derive(Clone)]
pub struct InstanceDeps {
    pub breaker: Arc<CircuitBreaker>,
    pub monitor: Arc<ResourceMonitor>,
    pub dispatcher: Arc<TaskDispatcher>,
    pub unit: Arc<dyn ExecutionUnit>,
    pub events: EventSender,
    pub history_limit: usize,
}

pub struct AgentInstance {
    id: String,
    config: RwLock<AgentConfig>,
    state: Mutex<InstanceState>,
    deps: InstanceDeps,
}

impl AgentInstance {
    pub fn new(config: AgentConfig, deps: InstanceDeps) -> Arc<Self> {
        Arc::new(Self {
            id: config.id.clone(),
            config: RwLock::new(config),
            state: Mutex::new(InstanceState::default()),
            deps,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> AgentConfig {
        self.config.read().clone()
    }

    pub fn status(&self) -> AgentState {
        self.state.lock().status
    }

    pub fn is_running(&self) -> bool {
        self.status() == AgentState::Running
    }

    pub fn has_active_task(&self) -> bool {
        self.state.lock().active.is_some()
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Template of the running agent, if any
    pub fn template(&self) -> Option<Arc<ContextTemplate>> {
        self.state.lock().template.clone()
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.config.write().is_active = active;
    }

    /// Start accepting tasks. No-op when already running.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.status == AgentState::Running {
            return Ok(());
        }

        let config = self.config.read().clone();
        if let Err(e) = config.validate() {
            error!(agent_id = %self.id, error = %e, "Agent failed to start");
            state.status = AgentState::Error;
            state.last_error = Some(e.to_string());
            return Err(e);
        }

        self.deps
            .monitor
            .start_monitoring(&self.id, config.resource_quota.clone());
        state.template = Some(Arc::new(ContextTemplate::from_config(&config)));
        state.status = AgentState::Running;
        state.last_error = None;

        info!(agent_id = %self.id, name = %config.name, "Agent started");
        Ok(())
    }

    /// Cancel the running task, reject the queue and stop monitoring.
    /// No-op when already stopped.
    pub fn stop(&self, reason: &str) -> Result<()> {
        let rejected = {
            let mut state = self.state.lock();
            if state.status == AgentState::Stopped {
                return Ok(());
            }

            if let Some(active) = state.active.as_mut() {
                active.cancelled = true;
                if let Some(handle) = &active.unit {
                    self.deps.unit.terminate(handle);
                }
            }

            let mut rejected = Vec::with_capacity(state.queue.len());
            while let Some(mut queued) = state.queue.pop_front() {
                queued.task.cancel(format!("agent stopped: {}", reason));
                state.record(queued.task.clone(), self.deps.history_limit);
                rejected.push(queued);
            }

            state.status = AgentState::Stopped;
            state.template = None;
            rejected
        };

        self.deps.monitor.stop_monitoring(&self.id);
        self.reject_all(rejected, reason);

        info!(agent_id = %self.id, reason, "Agent stopped");
        Ok(())
    }

    fn reject_all(&self, rejected: Vec<QueuedTask>, reason: &str) {
        for queued in rejected {
            if queued.probe {
                self.deps.breaker.release_probe(&self.id);
            }
            emit(
                &self.deps.events,
                RuntimeEvent::TaskCancelled {
                    agent_id: self.id.clone(),
                    task_id: queued.task.id.clone(),
                },
            );
            let _ = queued
                .settle
                .send(Err(EngineError::Cancelled(format!("agent stopped: {}", reason))));
        }
    }

    /// Merge `patch` into the config. A running agent picks the new snapshot
    /// up for tasks started afterwards.
    pub fn update_config(&self, patch: &PartialAgentConfig) -> Result<AgentConfig> {
        let updated = self.config.read().apply(patch)?;
        self.install_config(updated.clone());
        Ok(updated)
    }

    /// Replace the config with an already merged and validated one
    pub(crate) fn install_config(&self, config: AgentConfig) {
        let template = Arc::new(ContextTemplate::from_config(&config));
        let quota = config.resource_quota.clone();
        *self.config.write() = config;

        let mut state = self.state.lock();
        if state.status == AgentState::Running {
            state.template = Some(template);
            self.deps.monitor.set_quota(&self.id, quota);
        }
        debug!(agent_id = %self.id, "Agent config updated");
    }

    /// Admit `task`; resolves once the task settles.
    pub async fn execute_task(self: &Arc<Self>, task: AgentTask) -> Result<AgentTask> {
        let rx = {
            let mut state = self.state.lock();
            if state.status != AgentState::Running {
                return Err(EngineError::AgentNotRunning(self.id.clone()));
            }

            let probe = self.deps.breaker.get_state(&self.id).state != BreakerState::Closed;
            if !self.deps.breaker.can_execute(&self.id) {
                return Err(EngineError::CircuitOpen(self.id.clone()));
            }

            let (tx, rx) = oneshot::channel();
            if state.active.is_some() {
                let limit = self.config.read().resource_quota.max_concurrent_tasks;
                if state.queue.len() >= limit {
                    if probe {
                        self.deps.breaker.release_probe(&self.id);
                    }
                    return Err(EngineError::ConcurrencyLimitExceeded {
                        agent_id: self.id.clone(),
                        limit,
                    });
                }

                debug!(
                    agent_id = %self.id,
                    task_id = %task.id,
                    position = state.queue.len(),
                    "Task queued"
                );
                state.queue.push_back(QueuedTask {
                    task,
                    settle: tx,
                    probe,
                });
            } else {
                debug!(agent_id = %self.id, task_id = %task.id, "Task admitted");
                state.active = Some(ActiveTask {
                    task: task.clone(),
                    unit: None,
                    cancelled: false,
                    probe,
                });
                let this = Arc::clone(self);
                tokio::spawn(async move { this.run_and_drain(task, tx).await });
            }
            rx
        };

        rx.await
            .unwrap_or_else(|_| Err(EngineError::Cancelled("task dropped before settling".into())))
    }

    async fn run_and_drain(self: Arc<Self>, task: AgentTask, settle: Settlement) {
        let mut next = Some((task, settle));
        while let Some((task, settle)) = next {
            let settled = self.run_task(task).await;
            let _ = settle.send(Ok(settled));
            next = self.advance_queue();
        }
    }

    /// Promote the queue head to the active slot
    fn advance_queue(&self) -> Option<(AgentTask, Settlement)> {
        let mut state = self.state.lock();
        state.active = None;

        let queued = state.queue.pop_front()?;
        state.active = Some(ActiveTask {
            task: queued.task.clone(),
            unit: None,
            cancelled: false,
            probe: queued.probe,
        });
        Some((queued.task, queued.settle))
    }

    async fn run_task(&self, mut task: AgentTask) -> AgentTask {
        let (template, cancelled) = {
            let state = self.state.lock();
            let cancelled = state.active.as_ref().map(|a| a.cancelled).unwrap_or(false);
            (state.template.clone(), cancelled)
        };

        let template = match template {
            Some(template) if !cancelled => template,
            _ => {
                task.cancel("cancelled before start");
                return self.settle(task, None, None);
            }
        };

        task.transition(TaskStatus::Running);
        let ctx = template.for_task(task.id.clone());
        let timeout_ms = task.timeout_ms.unwrap_or(template.quota.max_execution_time_ms);

        let running = self
            .deps
            .unit
            .run(self.deps.dispatcher.dispatch(task.clone(), ctx.clone()));
        let handle = running.handle.clone();
        {
            let mut state = self.state.lock();
            if let Some(active) = state.active.as_mut() {
                active.task = task.clone();
                active.unit = Some(handle.clone());
                if active.cancelled {
                    self.deps.unit.terminate(&handle);
                }
            }
        }

        let started = Instant::now();
        let outcome = with_timeout(running.outcome, Duration::from_millis(timeout_ms)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let cancelled = self
            .state
            .lock()
            .active
            .as_ref()
            .map(|a| a.cancelled)
            .unwrap_or(false);

        let breaker_success = match outcome {
            _ if cancelled => {
                task.cancel("cancelled while running");
                None
            }
            Ok(Ok(result)) => {
                task.complete(result);
                Some(true)
            }
            Ok(Err(e)) => {
                task.fail(e.to_string());
                Some(false)
            }
            Err(_) => {
                self.deps.unit.terminate(&handle);
                task.fail(EngineError::TaskTimeout { timeout_ms }.to_string());
                Some(false)
            }
        };

        task.execution_time_ms = Some(elapsed_ms);
        self.deps.monitor.add_cpu_time(&self.id, elapsed_ms);
        if ctx.memory_usage() > 0 {
            self.deps.monitor.update_usage(
                &self.id,
                UsageUpdate {
                    memory_mb: Some(ctx.memory_usage()),
                    ..Default::default()
                },
            );
        }

        self.settle(task, breaker_success, Some(elapsed_ms))
    }

    /// Book-keeping for a task leaving the active slot
    fn settle(&self, task: AgentTask, breaker_success: Option<bool>, elapsed_ms: Option<u64>) -> AgentTask {
        let probe = {
            let mut state = self.state.lock();
            let probe = state.active.as_ref().map(|a| a.probe).unwrap_or(false);
            state.record(task.clone(), self.deps.history_limit);
            if task.status == TaskStatus::Failed {
                state.last_error = task.error.clone();
            }
            probe
        };

        match breaker_success {
            Some(true) => self.deps.breaker.record_success(&self.id),
            Some(false) => self.deps.breaker.record_failure(&self.id),
            None if probe => self.deps.breaker.release_probe(&self.id),
            None => {}
        }

        let outcome = task.status.as_str();
        metrics::counter!("agent_runtime_tasks_total", "outcome" => outcome).increment(1);
        if let Some(ms) = elapsed_ms {
            metrics::histogram!("agent_runtime_task_duration_ms").record(ms as f64);
        }

        let event = match task.status {
            TaskStatus::Completed => {
                info!(agent_id = %self.id, task_id = %task.id, elapsed_ms, "Task completed");
                RuntimeEvent::TaskCompleted {
                    agent_id: self.id.clone(),
                    task_id: task.id.clone(),
                    execution_time_ms: elapsed_ms.unwrap_or(0),
                }
            }
            TaskStatus::Failed => {
                let error = task.error.clone().unwrap_or_default();
                warn!(agent_id = %self.id, task_id = %task.id, error = %error, "Task failed");
                RuntimeEvent::TaskFailed {
                    agent_id: self.id.clone(),
                    task_id: task.id.clone(),
                    error,
                }
            }
            _ => {
                info!(agent_id = %self.id, task_id = %task.id, "Task cancelled");
                RuntimeEvent::TaskCancelled {
                    agent_id: self.id.clone(),
                    task_id: task.id.clone(),
                }
            }
        };
        emit(&self.deps.events, event);

        task
    }

    /// Cancel a running or queued task
    pub fn cancel_task(&self, task_id: &str) -> Result<()> {
        let queued = {
            let mut state = self.state.lock();

            if let Some(active) = state.active.as_mut().filter(|a| a.task.id == task_id) {
                if !active.cancelled {
                    active.cancelled = true;
                    if let Some(handle) = &active.unit {
                        self.deps.unit.terminate(handle);
                    }
                    info!(agent_id = %self.id, task_id, "Cancelling running task");
                }
                return Ok(());
            }

            let position = state
                .queue
                .iter()
                .position(|q| q.task.id == task_id)
                .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;

            let Some(mut queued) = state.queue.remove(position) else {
                return Err(EngineError::TaskNotFound(task_id.to_string()));
            };
            queued.task.cancel("cancelled while queued");
            state.record(queued.task.clone(), self.deps.history_limit);
            queued
        };

        info!(agent_id = %self.id, task_id, "Cancelled queued task");
        if queued.probe {
            self.deps.breaker.release_probe(&self.id);
        }
        emit(
            &self.deps.events,
            RuntimeEvent::TaskCancelled {
                agent_id: self.id.clone(),
                task_id: task_id.to_string(),
            },
        );
        let _ = queued
            .settle
            .send(Err(EngineError::Cancelled(format!("task {} cancelled", task_id))));
        Ok(())
    }

    /// Running and queued tasks first, then settled history (newest first)
    pub fn list_tasks(&self) -> Vec<AgentTask> {
        let state = self.state.lock();
        state
            .active
            .iter()
            .map(|a| a.task.clone())
            .chain(state.queue.iter().map(|q| q.task.clone()))
            .chain(state.history.iter().rev().cloned())
            .collect()
    }

    pub fn get_task(&self, task_id: &str) -> Option<AgentTask> {
        self.list_tasks().into_iter().find(|t| t.id == task_id)
    }

    pub fn status_report(&self) -> AgentStatusReport {
        let (name, is_active) = {
            let config = self.config.read();
            (config.name.clone(), config.is_active)
        };
        let state = self.state.lock();
        AgentStatusReport {
            agent_id: self.id.clone(),
            name,
            status: state.status,
            is_active,
            current_task: state.active.as_ref().map(|a| a.task.id.clone()),
            queue_length: state.queue.len(),
            completed_tasks: state.completed,
            failed_tasks: state.failed,
            cancelled_tasks: state.cancelled,
            breaker: self.deps.breaker.get_state(&self.id),
            usage: self.deps.monitor.get_usage(&self.id),
            last_error: state.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::dispatch::TaskHandler;
    use crate::runtime::isolation::CooperativeUnit;
    use crate::runtime::task::TaskType;
    use crate::runtime::tool_registry::ToolRegistry;
    use crate::runtime::context::AgentExecutionContext;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::broadcast;

    /// Sleeps for `input.sleep_ms`, fails when `input.fail` is set
    struct Scripted;

    #[async_trait]
    impl TaskHandler for Scripted {
        async fn handle(
            &self,
            task: &AgentTask,
            _ctx: &AgentExecutionContext,
            _tools: &ToolRegistry,
        ) -> Result<Value> {
            let sleep_ms = task.input["sleep_ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            if task.input["fail"].as_bool().unwrap_or(false) {
                return Err(EngineError::TaskFailed("scripted failure".into()));
            }
            Ok(json!({ "done": task.id }))
        }
    }

    fn instance(quota: Value) -> Arc<AgentInstance> {
        let dispatcher = Arc::new(TaskDispatcher::new(Arc::new(ToolRegistry::new())));
        dispatcher.register(TaskType::Query, Arc::new(Scripted));
        let (events, _) = broadcast::channel(64);

        let config = AgentConfig::from_partial(
            &PartialAgentConfig::named("inst").with_id("agent_i").with_quota(quota),
        )
        .unwrap();
        AgentInstance::new(
            config,
            InstanceDeps {
                breaker: Arc::new(CircuitBreaker::default()),
                monitor: Arc::new(ResourceMonitor::default()),
                dispatcher,
                unit: Arc::new(CooperativeUnit::new()),
                events,
                history_limit: 10,
            },
        )
    }

    fn task(input: Value) -> AgentTask {
        AgentTask::new("agent_i", TaskType::Query, input)
    }

    #[tokio::test(start_paused = true)]
    async fn test_requires_running() {
        let agent = instance(json!({}));
        assert_eq!(agent.status(), AgentState::Idle);

        let err = agent.execute_task(task(json!({}))).await.unwrap_err();
        assert!(matches!(err, EngineError::AgentNotRunning(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_idempotent() {
        let agent = instance(json!({}));
        agent.start().unwrap();
        agent.start().unwrap();
        assert!(agent.is_running());
        assert!(agent.deps.monitor.is_monitoring("agent_i"));

        agent.stop("test").unwrap();
        agent.stop("test").unwrap();
        assert_eq!(agent.status(), AgentState::Stopped);
        assert!(!agent.deps.monitor.is_monitoring("agent_i"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_task_is_recorded_not_thrown() {
        let agent = instance(json!({}));
        agent.start().unwrap();

        let settled = agent.execute_task(task(json!({ "fail": true }))).await.unwrap();
        assert_eq!(settled.status, TaskStatus::Failed);
        assert!(settled.error.unwrap().contains("scripted failure"));

        let report = agent.status_report();
        assert_eq!(report.failed_tasks, 1);
        assert_eq!(report.breaker.failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_bound() {
        let agent = instance(json!({ "max_concurrent_tasks": 1 }));
        agent.start().unwrap();

        let a = tokio::spawn({
            let agent = Arc::clone(&agent);
            async move { agent.execute_task(task(json!({ "sleep_ms": 100 }))).await }
        });
        tokio::task::yield_now().await;
        let b = tokio::spawn({
            let agent = Arc::clone(&agent);
            async move { agent.execute_task(task(json!({}))).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(agent.queue_len(), 1);

        let err = agent.execute_task(task(json!({}))).await.unwrap_err();
        assert!(matches!(err, EngineError::ConcurrencyLimitExceeded { limit: 1, .. }));

        assert_eq!(a.await.unwrap().unwrap().status, TaskStatus::Completed);
        assert_eq!(b.await.unwrap().unwrap().status, TaskStatus::Completed);
        assert_eq!(agent.queue_len(), 0);
        assert!(!agent.has_active_task());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_unknown_task() {
        let agent = instance(json!({}));
        agent.start().unwrap();
        assert!(matches!(
            agent.cancel_task("task_missing"),
            Err(EngineError::TaskNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_rejects_queue_and_cancels_running() {
        let agent = instance(json!({ "max_concurrent_tasks": 2 }));
        agent.start().unwrap();

        let running = tokio::spawn({
            let agent = Arc::clone(&agent);
            async move { agent.execute_task(task(json!({ "sleep_ms": 1_000 }))).await }
        });
        tokio::task::yield_now().await;
        let queued = tokio::spawn({
            let agent = Arc::clone(&agent);
            async move { agent.execute_task(task(json!({}))).await }
        });
        tokio::task::yield_now().await;

        agent.stop("test").unwrap();

        let queued = queued.await.unwrap().unwrap_err();
        assert!(matches!(queued, EngineError::Cancelled(_)));
        let running = running.await.unwrap().unwrap();
        assert_eq!(running.status, TaskStatus::Cancelled);
        assert_eq!(agent.status_report().cancelled_tasks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_config_refreshes_template() {
        let agent = instance(json!({}));
        agent.start().unwrap();

        let patch = PartialAgentConfig {
            allowed_models: Some(vec!["large".into()]),
            ..Default::default()
        };
        let updated = agent.update_config(&patch).unwrap();

        assert_eq!(updated.allowed_models, vec!["large".to_string()]);
        assert_eq!(agent.template().unwrap().allowed_models, vec!["large".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_enters_error_and_recovers() {
        let agent = instance(json!({}));
        let valid = agent.config();
        let mut invalid = valid.clone();
        invalid.name = String::new();
        agent.install_config(invalid);

        let err = agent.start().unwrap_err();
        assert!(matches!(err, EngineError::ConfigValidation(_)));
        assert_eq!(agent.status(), AgentState::Error);
        assert!(!agent.deps.monitor.is_monitoring("agent_i"));

        let report = agent.status_report();
        assert_eq!(report.status, AgentState::Error);
        assert_eq!(report.last_error.as_deref(), Some(err.to_string().as_str()));
        assert!(matches!(
            agent.execute_task(task(json!({}))).await,
            Err(EngineError::AgentNotRunning(_))
        ));

        agent.install_config(valid);
        agent.start().unwrap();
        assert_eq!(agent.status(), AgentState::Running);
        assert!(agent.status_report().last_error.is_none());
        assert_eq!(
            agent.execute_task(task(json!({}))).await.unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_bounded() {
        let agent = instance(json!({}));
        agent.start().unwrap();

        for _ in 0..12 {
            agent.execute_task(task(json!({}))).await.unwrap();
        }
        assert_eq!(agent.list_tasks().len(), 10);
        assert_eq!(agent.status_report().completed_tasks, 12);
    }
}
