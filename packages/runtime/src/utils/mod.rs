// packages/runtime/src/utils/mod.rs
//! Common utilities shared by the runtime
//!
//! - **errors**: `EngineError` taxonomy and `Result` alias
//! - **config**: engine configuration and agent manifest loading
//! - **timeout**: the single "whichever settles first" race used by tasks and tools

pub mod config;
pub mod errors;
pub mod timeout;

pub use config::{AgentManifest, EngineConfig};
pub use errors::{EngineError, Result};
pub use timeout::{with_timeout, Timeout};
