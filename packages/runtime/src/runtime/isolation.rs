// packages/runtime/src/runtime/isolation.rs
//! Isolated execution units for hard cancellation
//!
//! A task body runs inside a unit that the agent can terminate from outside.
//! Termination drops the task's future at its next suspension point; no
//! cleanup code inside the task is awaited, so task bodies must not rely on
//! running to completion.
//!
//! - **SpawnedUnit**: the body runs on its own tokio task (production)
//! - **CooperativeUnit**: the body is polled by the awaiting caller and checks
//!   a cancellation flag at every suspension point (test double)

use crate::utils::errors::{EngineError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Work handed to a unit
pub type UnitWork = BoxFuture<'static, Result<Value>>;

/// Which unit implementation the runtime uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionUnitKind {
    #[default]
    Spawned,
    Cooperative,
}

/// Handle used to terminate a running unit
#[derive(Debug, Clone)]
pub struct UnitHandle {
    id: u64,
    token: CancellationToken,
}

impl UnitHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_terminated(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A started unit: its handle plus the future resolving to the body's outcome
pub struct RunningUnit {
    pub handle: UnitHandle,
    pub outcome: UnitWork,
}

/// Separately terminable unit of work
pub trait ExecutionUnit: Send + Sync {
    fn run(&self, work: UnitWork) -> RunningUnit;

    fn terminate(&self, handle: &UnitHandle);

    /// Units started and not yet finished
    fn live_units(&self) -> usize;
}

pub fn unit_for(kind: ExecutionUnitKind) -> Arc<dyn ExecutionUnit> {
    match kind {
        ExecutionUnitKind::Spawned => Arc::new(SpawnedUnit::new()),
        ExecutionUnitKind::Cooperative => Arc::new(CooperativeUnit::new()),
    }
}

fn terminated(id: u64) -> EngineError {
    EngineError::Cancelled(format!("execution unit {} terminated", id))
}

/// Decrements the live counter when the unit's body is dropped or finishes
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(live))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs each body on a dedicated tokio task
pub struct SpawnedUnit {
    next_id: AtomicU64,
    live: Arc<AtomicUsize>,
}

impl SpawnedUnit {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Default for SpawnedUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionUnit for SpawnedUnit {
    fn run(&self, work: UnitWork) -> RunningUnit {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let guard = LiveGuard::new(&self.live);

        let child = token.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let result = tokio::select! {
                _ = child.cancelled() => Err(terminated(id)),
                result = work => result,
            };
            let _ = tx.send(result);
        });

        let outcome = async move { rx.await.unwrap_or_else(|_| Err(terminated(id))) }.boxed();

        RunningUnit {
            handle: UnitHandle { id, token },
            outcome,
        }
    }

    fn terminate(&self, handle: &UnitHandle) {
        debug!(unit = handle.id, "Terminating spawned unit");
        handle.token.cancel();
    }

    fn live_units(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Polls the body in place; termination is a flag check at suspension points
pub struct CooperativeUnit {
    next_id: AtomicU64,
    live: Arc<AtomicUsize>,
}

impl CooperativeUnit {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Default for CooperativeUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionUnit for CooperativeUnit {
    fn run(&self, work: UnitWork) -> RunningUnit {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let guard = LiveGuard::new(&self.live);

        let child = token.clone();
        let outcome = async move {
            let _guard = guard;
            tokio::select! {
                _ = child.cancelled() => Err(terminated(id)),
                result = work => result,
            }
        }
        .boxed();

        RunningUnit {
            handle: UnitHandle { id, token },
            outcome,
        }
    }

    fn terminate(&self, handle: &UnitHandle) {
        debug!(unit = handle.id, "Terminating cooperative unit");
        handle.token.cancel();
    }

    fn live_units(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawned_runs_to_completion() {
        let unit = SpawnedUnit::new();
        let running = unit.run(async { Ok(json!(42)) }.boxed());

        assert_eq!(running.outcome.await.unwrap(), json!(42));
        assert!(!running.handle.is_terminated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_terminate_stops_work() {
        let unit = SpawnedUnit::new();
        let reached = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&reached);
        let running = unit.run(
            async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(Value::Null)
            }
            .boxed(),
        );
        assert_eq!(unit.live_units(), 1);

        unit.terminate(&running.handle);
        let err = running.outcome.await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled(_)));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(!reached.load(Ordering::SeqCst));
        assert_eq!(unit.live_units(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooperative_terminate() {
        let unit = CooperativeUnit::new();
        let running = unit.run(
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Value::Null)
            }
            .boxed(),
        );

        let handle = running.handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.token.cancel();
        });

        let err = running.outcome.await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled(_)));
        assert!(running.handle.is_terminated());
        assert_eq!(unit.live_units(), 0);
    }

    #[test]
    fn test_unit_for_kind() {
        let unit = unit_for(ExecutionUnitKind::Cooperative);
        assert_eq!(unit.live_units(), 0);
    }
}
