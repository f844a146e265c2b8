// packages/runtime/src/runtime/agent_config.rs
//! Agent configuration: identity, permission tree and resource quota
//!
//! Partial configurations are merged field-by-field against defaults (or
//! against an existing config on update) before validation, so an accepted
//! `AgentConfig` always has every permission and quota field filled in.

use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    #[default]
    Assistant,
    Researcher,
    Writer,
    Analyst,
    Developer,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryPermissions {
    pub read: bool,
    pub write: bool,
    pub search: bool,
}

impl Default for MemoryPermissions {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
            search: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPermissions {
    pub execute: bool,
    pub load: bool,
    pub manage: bool,
}

impl Default for ModelPermissions {
    fn default() -> Self {
        Self {
            execute: true,
            load: false,
            manage: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemPermissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkPermissions {
    pub external: bool,
    pub internal: bool,
}

impl Default for NetworkPermissions {
    fn default() -> Self {
        Self {
            external: false,
            internal: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemPermissions {
    pub processes: bool,
    pub environment: bool,
}

/// Independent boolean toggles grouped by resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionTree {
    pub memory: MemoryPermissions,
    pub models: ModelPermissions,
    pub filesystem: FilesystemPermissions,
    pub network: NetworkPermissions,
    pub system: SystemPermissions,

    /// Basic-tier tools are usable without appearing on the tool allow-list
    pub basic_tools: bool,
}

impl Default for PermissionTree {
    fn default() -> Self {
        Self {
            memory: MemoryPermissions::default(),
            models: ModelPermissions::default(),
            filesystem: FilesystemPermissions::default(),
            network: NetworkPermissions::default(),
            system: SystemPermissions::default(),
            basic_tools: true,
        }
    }
}

/// A single leaf of the permission tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    MemoryRead,
    MemoryWrite,
    MemorySearch,
    ModelsExecute,
    ModelsLoad,
    ModelsManage,
    FilesystemRead,
    FilesystemWrite,
    FilesystemExecute,
    NetworkExternal,
    NetworkInternal,
    SystemProcesses,
    SystemEnvironment,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::MemoryRead => "memory.read",
            Permission::MemoryWrite => "memory.write",
            Permission::MemorySearch => "memory.search",
            Permission::ModelsExecute => "models.execute",
            Permission::ModelsLoad => "models.load",
            Permission::ModelsManage => "models.manage",
            Permission::FilesystemRead => "filesystem.read",
            Permission::FilesystemWrite => "filesystem.write",
            Permission::FilesystemExecute => "filesystem.execute",
            Permission::NetworkExternal => "network.external",
            Permission::NetworkInternal => "network.internal",
            Permission::SystemProcesses => "system.processes",
            Permission::SystemEnvironment => "system.environment",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PermissionTree {
    /// Whether this tree grants `permission`
    pub fn grants(&self, permission: Permission) -> bool {
        match permission {
            Permission::MemoryRead => self.memory.read,
            Permission::MemoryWrite => self.memory.write,
            Permission::MemorySearch => self.memory.search,
            Permission::ModelsExecute => self.models.execute,
            Permission::ModelsLoad => self.models.load,
            Permission::ModelsManage => self.models.manage,
            Permission::FilesystemRead => self.filesystem.read,
            Permission::FilesystemWrite => self.filesystem.write,
            Permission::FilesystemExecute => self.filesystem.execute,
            Permission::NetworkExternal => self.network.external,
            Permission::NetworkInternal => self.network.internal,
            Permission::SystemProcesses => self.system.processes,
            Permission::SystemEnvironment => self.system.environment,
        }
    }

    /// Memory access is any read-side memory permission
    pub fn has_memory_access(&self) -> bool {
        self.memory.read || self.memory.search
    }
}

/// Declared per-agent ceilings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceQuota {
    /// Memory ceiling in megabytes
    pub max_memory_mb: u64,

    /// Accumulated task execution time ceiling in milliseconds
    pub max_cpu_time_ms: u64,

    /// Wall-clock ceiling in milliseconds; also the default per-task timeout
    pub max_execution_time_ms: u64,

    /// Capacity of the overflow queue behind the running task
    pub max_concurrent_tasks: usize,

    /// External calls allowed per rate-limit window
    pub max_api_calls: u64,

    /// Rate-limit window in milliseconds
    pub rate_limit_window_ms: u64,
}

impl Default for ResourceQuota {
    fn default() -> Self {
        Self {
            max_memory_mb: 512,
            max_cpu_time_ms: 60_000,
            max_execution_time_ms: 300_000,
            max_concurrent_tasks: 5,
            max_api_calls: 1_000,
            rate_limit_window_ms: 60_000,
        }
    }
}

/// Named starting point for a quota; explicit fields are merged on top
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPreset {
    #[default]
    Standard,
    Strict,
    Relaxed,
}

impl QuotaPreset {
    pub fn quota(&self) -> ResourceQuota {
        match self {
            QuotaPreset::Standard => ResourceQuota::default(),
            QuotaPreset::Strict => ResourceQuota::strict(),
            QuotaPreset::Relaxed => ResourceQuota::relaxed(),
        }
    }
}

impl ResourceQuota {
    /// Tight quota for untrusted agents
    pub fn strict() -> Self {
        Self {
            max_memory_mb: 256,
            max_cpu_time_ms: 10_000,
            max_execution_time_ms: 30_000,
            max_concurrent_tasks: 1,
            max_api_calls: 100,
            rate_limit_window_ms: 60_000,
        }
    }

    /// Loose quota for development
    pub fn relaxed() -> Self {
        Self {
            max_memory_mb: 2048,
            max_cpu_time_ms: 600_000,
            max_execution_time_ms: 3_600_000,
            max_concurrent_tasks: 20,
            max_api_calls: 10_000,
            rate_limit_window_ms: 60_000,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_memory_mb == 0 {
            return Err(EngineError::ConfigValidation(
                "max_memory_mb must be greater than 0".into(),
            ));
        }
        if self.max_cpu_time_ms == 0 {
            return Err(EngineError::ConfigValidation(
                "max_cpu_time_ms must be greater than 0".into(),
            ));
        }
        if self.max_execution_time_ms == 0 {
            return Err(EngineError::ConfigValidation(
                "max_execution_time_ms must be greater than 0".into(),
            ));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(EngineError::ConfigValidation(
                "max_concurrent_tasks must be at least 1".into(),
            ));
        }
        if self.max_api_calls == 0 {
            return Err(EngineError::ConfigValidation(
                "max_api_calls must be greater than 0".into(),
            ));
        }
        if self.rate_limit_window_ms == 0 {
            return Err(EngineError::ConfigValidation(
                "rate_limit_window_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Fully resolved agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub capabilities: Vec<String>,
    pub permissions: PermissionTree,
    pub resource_quota: ResourceQuota,
    pub allowed_tools: Vec<String>,
    pub allowed_models: Vec<String>,
    pub metadata: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied configuration; absent fields keep their current value.
///
/// `permissions`, `resource_quota` and `metadata` are sparse JSON patches so
/// that e.g. `{"max_execution_time_ms": 100}` only touches that one field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialAgentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_quota: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_models: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl PartialAgentConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, agent_type: AgentType) -> Self {
        self.agent_type = Some(agent_type);
        self
    }

    pub fn with_quota(mut self, quota: Value) -> Self {
        self.resource_quota = Some(quota);
        self
    }

    /// Resolve the quota patch against `preset`; fields already present in
    /// the patch win over the preset's values.
    pub fn with_preset(mut self, preset: QuotaPreset) -> Result<Self> {
        let mut quota = serde_json::to_value(preset.quota())?;
        if let Some(patch) = self.resource_quota.take() {
            merge_values(&mut quota, patch);
        }
        self.resource_quota = Some(quota);
        Ok(self)
    }

    pub fn with_permissions(mut self, permissions: Value) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_models = Some(models.into_iter().map(Into::into).collect());
        self
    }
}

impl AgentConfig {
    /// Build a new config from a partial one, filling in defaults
    pub fn from_partial(partial: &PartialAgentConfig) -> Result<Self> {
        let now = Utc::now();
        let id = partial
            .id
            .clone()
            .unwrap_or_else(|| format!("agent_{}", ulid::Ulid::new().to_string().to_lowercase()));

        let base = Self {
            id,
            name: String::new(),
            agent_type: AgentType::default(),
            capabilities: Vec::new(),
            permissions: PermissionTree::default(),
            resource_quota: ResourceQuota::default(),
            allowed_tools: Vec::new(),
            allowed_models: Vec::new(),
            metadata: Value::Object(Default::default()),
            is_active: false,
            created_at: now,
            updated_at: now,
        };

        base.merge(partial)
    }

    /// Apply a partial update on top of this config.
    ///
    /// Identity and creation time are preserved; `updated_at` is bumped.
    pub fn apply(&self, patch: &PartialAgentConfig) -> Result<Self> {
        if let Some(id) = &patch.id {
            if id != &self.id {
                return Err(EngineError::ConfigValidation(format!(
                    "agent id cannot change ({} -> {})",
                    self.id, id
                )));
            }
        }

        let mut updated = self.merge(patch)?;
        updated.created_at = self.created_at;
        updated.updated_at = Utc::now().max(self.updated_at);
        Ok(updated)
    }

    fn merge(&self, patch: &PartialAgentConfig) -> Result<Self> {
        let mut value = serde_json::to_value(self)?;
        let patch = serde_json::to_value(patch)?;
        merge_values(&mut value, patch);

        let merged: AgentConfig = serde_json::from_value(value)
            .map_err(|e| EngineError::ConfigValidation(e.to_string()))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() || self.id.chars().any(char::is_whitespace) {
            return Err(EngineError::ConfigValidation(format!(
                "invalid agent id '{}'",
                self.id
            )));
        }
        if self.name.trim().is_empty() {
            return Err(EngineError::ConfigValidation(
                "agent name is required".into(),
            ));
        }
        if self.allowed_tools.iter().any(|t| t.trim().is_empty()) {
            return Err(EngineError::ConfigValidation(
                "tool names must not be empty".into(),
            ));
        }
        if self.allowed_models.iter().any(|m| m.trim().is_empty()) {
            return Err(EngineError::ConfigValidation(
                "model names must not be empty".into(),
            ));
        }
        if !self.metadata.is_object() {
            return Err(EngineError::ConfigValidation(
                "metadata must be an object".into(),
            ));
        }
        self.resource_quota.validate()
    }
}

/// Recursive object merge; `null` in the patch leaves the base untouched
fn merge_values(base: &mut Value, patch: Value) {
    match (base, patch) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_filled_in() {
        let config = AgentConfig::from_partial(&PartialAgentConfig::named("helper")).unwrap();

        assert!(config.id.starts_with("agent_"));
        assert_eq!(config.agent_type, AgentType::Assistant);
        assert_eq!(config.resource_quota, ResourceQuota::default());
        assert_eq!(config.permissions, PermissionTree::default());
        assert!(config.permissions.basic_tools);
        assert!(!config.is_active);
    }

    #[test]
    fn test_sparse_quota_patch() {
        let partial =
            PartialAgentConfig::named("fast").with_quota(json!({ "max_execution_time_ms": 100 }));
        let config = AgentConfig::from_partial(&partial).unwrap();

        assert_eq!(config.resource_quota.max_execution_time_ms, 100);
        assert_eq!(config.resource_quota.max_memory_mb, 512);
        assert_eq!(config.resource_quota.max_concurrent_tasks, 5);
    }

    #[test]
    fn test_sparse_permission_patch() {
        let partial = PartialAgentConfig::named("reader")
            .with_permissions(json!({ "memory": { "write": false }, "network": { "external": true } }));
        let config = AgentConfig::from_partial(&partial).unwrap();

        assert!(config.permissions.memory.read);
        assert!(!config.permissions.memory.write);
        assert!(config.permissions.network.external);
        assert!(config.permissions.network.internal);
    }

    #[test]
    fn test_missing_name_rejected() {
        let err = AgentConfig::from_partial(&PartialAgentConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::ConfigValidation(_)));
    }

    #[test]
    fn test_bad_quota_rejected() {
        let partial =
            PartialAgentConfig::named("x").with_quota(json!({ "max_concurrent_tasks": 0 }));
        assert!(matches!(
            AgentConfig::from_partial(&partial),
            Err(EngineError::ConfigValidation(_))
        ));

        let partial = PartialAgentConfig::named("x").with_quota(json!({ "max_memory_mb": "lots" }));
        assert!(matches!(
            AgentConfig::from_partial(&partial),
            Err(EngineError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_apply_preserves_identity() {
        let config = AgentConfig::from_partial(
            &PartialAgentConfig::named("a").with_quota(json!({ "max_api_calls": 10 })),
        )
        .unwrap();

        let patch = PartialAgentConfig {
            name: Some("b".into()),
            resource_quota: Some(json!({ "max_memory_mb": 128 })),
            ..Default::default()
        };
        let updated = config.apply(&patch).unwrap();

        assert_eq!(updated.id, config.id);
        assert_eq!(updated.name, "b");
        assert_eq!(updated.created_at, config.created_at);
        assert!(updated.updated_at >= config.updated_at);
        assert_eq!(updated.resource_quota.max_memory_mb, 128);
        assert_eq!(updated.resource_quota.max_api_calls, 10);

        let bad = PartialAgentConfig::default().with_id("other");
        assert!(config.apply(&bad).is_err());
    }

    #[test]
    fn test_quota_presets_validate() {
        assert!(ResourceQuota::default().validate().is_ok());
        assert!(ResourceQuota::strict().validate().is_ok());
        assert!(ResourceQuota::relaxed().validate().is_ok());
        assert_eq!(ResourceQuota::strict().max_concurrent_tasks, 1);
    }

    #[test]
    fn test_permission_grants() {
        let tree = PermissionTree::default();
        assert!(tree.grants(Permission::ModelsExecute));
        assert!(!tree.grants(Permission::FilesystemWrite));
        assert!(!tree.grants(Permission::SystemProcesses));
        assert!(tree.has_memory_access());
        assert_eq!(Permission::MemorySearch.to_string(), "memory.search");
    }
}
