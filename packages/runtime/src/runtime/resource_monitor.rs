// packages/runtime/src/runtime/resource_monitor.rs
//! Per-agent resource accounting
//!
//! Tracks self-reported counters (memory, accumulated task time, external
//! calls) and compares them against the agent's quota on a fixed interval.
//! Breaches are broadcast as `LimitExceeded` notifications; the monitor never
//! stops an agent itself.
//!
//! ```text
//! start_monitoring ──► usage snapshot + timer task
//!                            │ every check_interval_ms
//!                            ▼
//!                   compare usage vs quota ──► broadcast LimitExceeded
//!                            │
//!                   roll rate-limit window
//! stop_monitoring ──► abort timer, drop snapshot
//! ```

use crate::runtime::agent_config::ResourceQuota;
use crate::utils::timeout::deadline_after;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between quota checks (milliseconds)
    pub check_interval_ms: u64,

    /// Capacity of the notification channel
    pub channel_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1_000,
            channel_capacity: 256,
        }
    }
}

/// Which quota was breached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitKind {
    Memory,
    ExecutionTime,
    ApiCalls,
    CpuTime,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::Memory => "memory",
            LimitKind::ExecutionTime => "execution-time",
            LimitKind::ApiCalls => "api-calls",
            LimitKind::CpuTime => "cpu-time",
        }
    }

    /// Fatal breaches indicate runaway behaviour; api-call breaches are advisory
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LimitKind::ApiCalls)
    }
}

/// Limit-exceeded notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitExceeded {
    pub agent_id: String,
    #[serde(rename = "type")]
    pub kind: LimitKind,
    pub usage: u64,
    pub limit: u64,

    /// Snapshot the breach was measured on; a restart starts a new one
    #[serde(default)]
    pub generation: u64,
}

/// Current counters for one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory_mb: u64,
    pub cpu_time_ms: u64,
    pub api_calls: u64,
    pub start_time: DateTime<Utc>,
    pub last_check: DateTime<Utc>,
}

/// Partial counter update; `None` fields are left unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageUpdate {
    pub memory_mb: Option<u64>,
    pub cpu_time_ms: Option<u64>,
    pub api_calls: Option<u64>,
}

struct MonitoredAgent {
    generation: u64,
    usage: ResourceUsage,
    quota: ResourceQuota,
    started: Instant,
    window_start: Instant,
    timer: JoinHandle<()>,
}

impl MonitoredAgent {
    fn evaluate(&mut self, agent_id: &str) -> Vec<LimitExceeded> {
        let now = Instant::now();
        self.usage.last_check = Utc::now();

        let elapsed_ms = now.duration_since(self.started).as_millis() as u64;
        let checks = [
            (LimitKind::Memory, self.usage.memory_mb, self.quota.max_memory_mb),
            (LimitKind::ExecutionTime, elapsed_ms, self.quota.max_execution_time_ms),
            (LimitKind::ApiCalls, self.usage.api_calls, self.quota.max_api_calls),
            (LimitKind::CpuTime, self.usage.cpu_time_ms, self.quota.max_cpu_time_ms),
        ];

        let breaches = checks
            .into_iter()
            .filter(|(_, usage, limit)| usage > limit)
            .map(|(kind, usage, limit)| LimitExceeded {
                agent_id: agent_id.to_string(),
                kind,
                usage,
                limit,
                generation: self.generation,
            })
            .collect();

        let window = Duration::from_millis(self.quota.rate_limit_window_ms);
        if now.duration_since(self.window_start) >= window {
            trace!(agent_id, "Rate-limit window rolled over");
            self.usage.api_calls = 0;
            self.window_start = now;
        }

        breaches
    }
}

/// Shared monitor keyed by agent id
pub struct ResourceMonitor {
    config: MonitorConfig,
    agents: Arc<DashMap<String, MonitoredAgent>>,
    notifier: broadcast::Sender<LimitExceeded>,
    generations: AtomicU64,
}

impl ResourceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let (notifier, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            config,
            agents: Arc::new(DashMap::new()),
            notifier,
            generations: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LimitExceeded> {
        self.notifier.subscribe()
    }

    /// Create a usage snapshot for `agent_id` and start its periodic check.
    ///
    /// Restarting an already monitored agent replaces its snapshot and timer.
    pub fn start_monitoring(&self, agent_id: &str, quota: ResourceQuota) {
        let now = Instant::now();
        let period = Duration::from_millis(self.config.check_interval_ms.max(1));
        let first_tick = deadline_after(period);
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);

        let timer = {
            let agents = Arc::clone(&self.agents);
            let notifier = self.notifier.clone();
            let agent_id = agent_id.to_string();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(first_tick, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    interval.tick().await;
                    if !Self::check_agent(&agents, &notifier, &agent_id) {
                        break;
                    }
                }
            })
        };

        let started_at = Utc::now();
        let entry = MonitoredAgent {
            generation,
            usage: ResourceUsage {
                memory_mb: 0,
                cpu_time_ms: 0,
                api_calls: 0,
                start_time: started_at,
                last_check: started_at,
            },
            quota,
            started: now,
            window_start: now,
            timer,
        };

        if let Some(previous) = self.agents.insert(agent_id.to_string(), entry) {
            previous.timer.abort();
        }
        debug!(agent_id, "Started resource monitoring");
    }

    /// Cancel the timer and discard the snapshot
    pub fn stop_monitoring(&self, agent_id: &str) -> bool {
        match self.agents.remove(agent_id) {
            Some((_, entry)) => {
                entry.timer.abort();
                debug!(agent_id, "Stopped resource monitoring");
                true
            }
            None => false,
        }
    }

    pub fn is_monitoring(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    pub fn monitored_count(&self) -> usize {
        self.agents.len()
    }

    /// Merge counters; returns false when the agent is not monitored
    pub fn update_usage(&self, agent_id: &str, update: UsageUpdate) -> bool {
        let Some(mut entry) = self.agents.get_mut(agent_id) else {
            return false;
        };

        if let Some(memory) = update.memory_mb {
            entry.usage.memory_mb = memory;
        }
        if let Some(cpu) = update.cpu_time_ms {
            entry.usage.cpu_time_ms = cpu;
        }
        if let Some(calls) = update.api_calls {
            entry.usage.api_calls = calls;
        }
        true
    }

    /// Swap the quota of a monitored agent, keeping its counters
    pub fn set_quota(&self, agent_id: &str, quota: ResourceQuota) -> bool {
        match self.agents.get_mut(agent_id) {
            Some(mut entry) => {
                entry.quota = quota;
                true
            }
            None => false,
        }
    }

    pub fn record_api_call(&self, agent_id: &str) {
        if let Some(mut entry) = self.agents.get_mut(agent_id) {
            entry.usage.api_calls += 1;
        }
    }

    pub fn add_cpu_time(&self, agent_id: &str, elapsed_ms: u64) {
        if let Some(mut entry) = self.agents.get_mut(agent_id) {
            entry.usage.cpu_time_ms += elapsed_ms;
        }
    }

    /// True while the snapshot `breach` was measured on is still monitored
    pub fn is_current(&self, breach: &LimitExceeded) -> bool {
        self.agents
            .get(&breach.agent_id)
            .map(|entry| entry.generation == breach.generation)
            .unwrap_or(false)
    }

    pub fn get_usage(&self, agent_id: &str) -> Option<ResourceUsage> {
        self.agents.get(agent_id).map(|entry| entry.usage.clone())
    }

    /// Run a check for `agent_id` immediately, outside the timer
    pub fn check_now(&self, agent_id: &str) -> Vec<LimitExceeded> {
        let breaches = match self.agents.get_mut(agent_id) {
            Some(mut entry) => entry.evaluate(agent_id),
            None => return Vec::new(),
        };
        for breach in &breaches {
            Self::notify(&self.notifier, breach.clone());
        }
        breaches
    }

    /// Timer body; returns false once the agent is no longer monitored
    fn check_agent(
        agents: &DashMap<String, MonitoredAgent>,
        notifier: &broadcast::Sender<LimitExceeded>,
        agent_id: &str,
    ) -> bool {
        let breaches = match agents.get_mut(agent_id) {
            Some(mut entry) => entry.evaluate(agent_id),
            None => return false,
        };
        for breach in breaches {
            Self::notify(notifier, breach);
        }
        true
    }

    fn notify(notifier: &broadcast::Sender<LimitExceeded>, breach: LimitExceeded) {
        warn!(
            agent_id = %breach.agent_id,
            kind = breach.kind.as_str(),
            usage = breach.usage,
            limit = breach.limit,
            "Resource limit exceeded"
        );
        metrics::counter!("agent_runtime_limit_exceeded_total", "kind" => breach.kind.as_str())
            .increment(1);

        if notifier.send(breach).is_err() {
            trace!("No subscribers for limit notifications");
        }
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        for entry in self.agents.iter() {
            entry.timer.abort();
        }
    }
}
