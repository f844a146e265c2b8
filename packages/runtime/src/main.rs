// packages/runtime/src/main.rs
//! Agent Execution Runtime
//!
//! Reads newline-delimited JSON requests from stdin and writes one JSON
//! response per line to stdout. Logs go to stderr.
//!
//! Usage: `agent-runtime [--manifest <agents.yaml>] [config-file]`

use agent_execution_runtime::api::handle_line;
use agent_execution_runtime::collaborators::{EchoModel, InMemoryStore};
use agent_execution_runtime::observability::{init_metrics, init_tracing};
use agent_execution_runtime::runtime::AgentRuntime;
use agent_execution_runtime::utils::config::{AgentManifest, EngineConfig};
use agent_execution_runtime::BuildInfo;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "agent-runtime")]
#[command(about = "Hosts agents and runs their tasks over newline-delimited JSON", long_about = None)]
#[command(version)]
struct Cli {
    /// Engine configuration file; defaults to config/engine.{yaml,toml,json}
    config: Option<PathBuf>,

    /// Agent manifest, overriding `agents_manifest` from the configuration
    #[arg(short, long)]
    manifest: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => EngineConfig::load().context("failed to load configuration")?,
    };
    if let Some(manifest) = cli.manifest {
        config.agents_manifest = Some(manifest);
    }

    // Initialize observability (tracing, metrics)
    init_tracing(&config.observability)?;
    init_metrics(config.observability.metrics_addr.as_deref())?;

    let build = BuildInfo::current();
    info!(build = %build.label(), rustc = build.rustc, "Starting agent execution runtime");

    let runtime = AgentRuntime::new(
        config.runtime.clone(),
        Arc::new(InMemoryStore::new()),
        Arc::new(EchoModel::new()),
    );

    if let Some(path) = &config.agents_manifest {
        load_manifest(&runtime, path).await?;
    }

    let mut events = runtime.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!(?event, "Runtime event");
        }
    });

    tokio::select! {
        result = serve(Arc::clone(&runtime)) => {
            if let Err(e) = &result {
                error!("Request loop failed: {:#}", e);
            }
            result?;
            info!("Input closed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, cleaning up...");
        }
    }

    runtime.shutdown();
    Ok(())
}

/// Create (and optionally start) every agent listed in the manifest
async fn load_manifest(runtime: &AgentRuntime, path: &Path) -> Result<()> {
    let manifest = AgentManifest::load(path)
        .with_context(|| format!("failed to load agent manifest {}", path.display()))?;

    for agent in manifest.agents {
        let config = runtime.create_agent(agent.resolved_config()?).await?;
        if agent.autostart {
            runtime.start_agent(&config.id)?;
        }
        info!(agent_id = %config.id, name = %config.name, autostart = agent.autostart, "Loaded agent from manifest");
    }
    Ok(())
}

/// Handle each request line on its own task so long-running tasks do not
/// block cancellation or status requests.
async fn serve(runtime: Arc<AgentRuntime>) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let runtime = Arc::clone(&runtime);
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = handle_line(&runtime, &line).await;
            match serde_json::to_string(&response) {
                Ok(encoded) => {
                    if tx.send(encoded).await.is_err() {
                        warn!("Response writer closed");
                    }
                }
                Err(e) => error!("Failed to encode response: {}", e),
            }
        });
    }

    drop(tx);
    writer.await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_optional_config_and_manifest() {
        let cli = Cli::try_parse_from(["agent-runtime"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.manifest.is_none());

        let cli = Cli::try_parse_from(["agent-runtime", "-m", "agents.yaml", "engine.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("engine.toml")));
        assert_eq!(cli.manifest, Some(PathBuf::from("agents.yaml")));
    }

    #[test]
    fn cli_help_is_not_a_config_path() {
        let err = Cli::try_parse_from(["agent-runtime", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
