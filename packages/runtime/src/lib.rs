// packages/runtime/src/lib.rs
//! Agent Execution Runtime Library
//!
//! Hosts configurable AI agents, admits tasks to them, runs each task under a
//! permission-scoped context, and protects the system with per-agent circuit
//! breakers and resource quotas.
//!
//! | module          | contents                                           |
//! |-----------------|----------------------------------------------------|
//! | `runtime`       | agents, tasks, breaker, resource monitor, tools    |
//! | `collaborators` | outbound memory and model interfaces               |
//! | `api`           | JSON envelope for inbound operations               |
//! | `observability` | tracing and metrics setup                          |
//! | `utils`         | errors, configuration, timeouts                    |

pub mod api;
pub mod collaborators;
pub mod observability;
pub mod runtime;
pub mod utils;

pub use collaborators::{MemoryCollaborator, ModelCollaborator};
pub use runtime::agent_runtime::{AgentRuntime, AgentRuntimeConfig};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Build metadata, reported by the binary at startup
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildInfo {
    pub package: &'static str,
    pub version: &'static str,
    pub git_hash: &'static str,
    pub built_at: &'static str,
    pub rustc: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            package: env!("CARGO_PKG_NAME"),
            version: VERSION,
            git_hash: GIT_HASH,
            built_at: env!("BUILD_TIMESTAMP"),
            rustc: env!("RUSTC_VERSION"),
        }
    }

    /// `agent-execution-runtime/0.1.0 (abc1234)`
    pub fn label(&self) -> String {
        format!("{}/{} ({})", self.package, self.version, self.git_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_names_package_and_commit() {
        let info = BuildInfo::current();
        let label = info.label();
        assert!(label.starts_with("agent-execution-runtime/"));
        assert!(label.ends_with(&format!("({})", GIT_HASH)));
    }

    #[test]
    fn build_info_serializes() {
        let value = serde_json::to_value(BuildInfo::current()).unwrap();
        assert_eq!(value["version"], VERSION);
        assert!(value["rustc"].is_string());
    }
}
