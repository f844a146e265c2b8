// packages/runtime/src/utils/config.rs
//! Engine configuration
//!
//! Layered with the `config` crate, later sources winning:
//!
//! 1. serde defaults
//! 2. `config/engine.{yaml,toml,json}` (optional) or an explicit file
//! 3. environment variables, e.g. `AGENT_RUNTIME__RUNTIME__TOOL_TIMEOUT_MS=5000`
//!
//! Agent definitions live in a separate YAML manifest referenced by
//! `agents_manifest`.

use crate::observability::ObservabilityConfig;
use crate::runtime::agent_config::{PartialAgentConfig, QuotaPreset};
use crate::runtime::agent_runtime::AgentRuntimeConfig;
use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_CONFIG_FILE: &str = "config/engine";
const ENV_PREFIX: &str = "AGENT_RUNTIME";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub runtime: AgentRuntimeConfig,
    pub observability: ObservabilityConfig,

    /// YAML file of agents to create at startup
    pub agents_manifest: Option<PathBuf>,
}

impl EngineConfig {
    /// Load from the default file location plus environment
    pub fn load() -> Result<Self> {
        Self::build(File::with_name(DEFAULT_CONFIG_FILE).required(false))
    }

    /// Load from `path` plus environment; the file must exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(File::from(path.as_ref()).required(true))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config: EngineConfig = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        debug!(?config, "Engine configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let runtime = &self.runtime;
        if runtime.monitor.check_interval_ms == 0 {
            return Err(EngineError::ConfigError(
                "runtime.monitor.check_interval_ms must be greater than 0".into(),
            ));
        }
        if runtime.breaker.failure_threshold == 0 {
            return Err(EngineError::ConfigError(
                "runtime.breaker.failure_threshold must be greater than 0".into(),
            ));
        }
        if runtime.tool_timeout_ms == 0 {
            return Err(EngineError::ConfigError(
                "runtime.tool_timeout_ms must be greater than 0".into(),
            ));
        }
        if runtime.event_capacity == 0 {
            return Err(EngineError::ConfigError(
                "runtime.event_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// One agent definition in the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestAgent {
    #[serde(flatten)]
    pub config: PartialAgentConfig,

    /// Base quota that `resource_quota` fields refine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_preset: Option<QuotaPreset>,

    /// Start the agent right after creating it
    #[serde(default)]
    pub autostart: bool,
}

impl ManifestAgent {
    /// The agent's config with its quota preset applied
    pub fn resolved_config(&self) -> Result<PartialAgentConfig> {
        match self.quota_preset {
            Some(preset) => self.config.clone().with_preset(preset),
            None => Ok(self.config.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentManifest {
    #[serde(default)]
    pub agents: Vec<ManifestAgent>,
}

impl AgentManifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }
}
