//! GoAgents command-line front end

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use goagents_core::config::{duration, ConfigLoader};
use goagents_core::{
    ClusterManifest, EchoProvider, Engine, EngineConfig, ProviderRegistry, Request, ToolRegistry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// Provider name the built-in echo provider is registered under
const MOCK_PROVIDER: &str = "mock";

/// Log level used until the configuration has been read
const BOOTSTRAP_LOG_LEVEL: &str = "info";

#[derive(Debug, Parser)]
#[command(name = "goagents", version, about = "Scale-to-zero LLM agent runtime")]
struct Cli {
    /// Engine configuration file (.yaml, .yml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load and validate cluster manifests
    Validate {
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
    },
    /// Run the engine until interrupted
    Run {
        /// Additional cluster manifests to deploy
        #[arg(long = "cluster")]
        clusters: Vec<PathBuf>,
    },
    /// Send one message to an agent and print the response
    Chat {
        /// Cluster manifest to deploy
        #[arg(long)]
        cluster: PathBuf,
        /// Agent name within the cluster
        #[arg(long)]
        agent: String,
        /// Provider deadline, e.g. 500ms, 30s, 2m
        #[arg(long, value_parser = duration::parse, default_value = "30s")]
        timeout: Duration,
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = init_tracing(cli.log_format);

    let loader = ConfigLoader::new();
    let config_path = cli.config.clone().or_else(default_config_path);
    let config = loader
        .load(config_path.as_deref())
        .context("failed to load configuration")?;

    apply_log_level(&log_filter, &config.server.log_level);
    if let Some(path) = &config_path {
        info!(path = %path.display(), "Configuration loaded");
    }

    match cli.command {
        Command::Validate { manifests } => validate(&loader, &manifests),
        Command::Run { clusters } => run(&loader, &config, &clusters).await,
        Command::Chat {
            cluster,
            agent,
            timeout,
            message,
        } => chat(&loader, &config, &cluster, &agent, timeout, message).await,
    }
}

type LogFilter = reload::Handle<EnvFilter, Registry>;

/// Install the subscriber before anything logs; the level is settled later
fn init_tracing(format: LogFormat) -> LogFilter {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(BOOTSTRAP_LOG_LEVEL));
    let (filter, handle) = reload::Layer::new(filter);
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
    handle
}

/// Switch to the configured level unless `RUST_LOG` already chose one
fn apply_log_level(handle: &LogFilter, level: &str) {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return;
    }
    match EnvFilter::try_new(level) {
        Ok(filter) => {
            if let Err(e) = handle.reload(filter) {
                warn!(error = %e, "Failed to apply log level");
            }
        }
        Err(e) => warn!(level = %level, error = %e, "Invalid log level, keeping default"),
    }
}

/// `~/.config/goagents/config.yaml`, when present
fn default_config_path() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("goagents").join("config.yaml");
    path.exists().then_some(path)
}

fn build_engine(config: &EngineConfig) -> Engine {
    let providers = ProviderRegistry::new().with(MOCK_PROVIDER, Arc::new(EchoProvider::new()));
    Engine::from_config(config, providers, ToolRegistry::new())
}

fn validate(loader: &ConfigLoader, manifests: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for path in manifests {
        match loader.load_cluster(path) {
            Ok(manifest) => {
                let agents: Vec<&str> = manifest
                    .spec
                    .agents
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect();
                println!(
                    "ok      {}  cluster={} namespace={} agents=[{}]",
                    path.display(),
                    manifest.name(),
                    manifest.metadata.namespace,
                    agents.join(", ")
                );
            }
            Err(e) => {
                failed += 1;
                println!("invalid {}  {}", path.display(), e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} manifests failed validation", failed, manifests.len());
    }
    Ok(())
}

fn load_manifest(loader: &ConfigLoader, path: &Path) -> Result<ClusterManifest> {
    loader
        .load_cluster(path)
        .with_context(|| format!("failed to load cluster manifest {}", path.display()))
}

async fn run(loader: &ConfigLoader, config: &EngineConfig, clusters: &[PathBuf]) -> Result<()> {
    let engine = build_engine(config);

    if let Some(mut events) = engine.take_events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                info!(
                    event = event.event_type.as_str(),
                    agent_id = %event.agent_id,
                    "Lifecycle event"
                );
            }
        });
    }

    for (name, e) in engine.deploy_configured_clusters() {
        warn!(cluster = %name, error = %e, "Skipping configured cluster");
    }
    for path in clusters {
        let manifest = load_manifest(loader, path)?;
        engine.deploy_cluster(manifest)?;
    }

    info!(clusters = engine.list_clusters().len(), "Engine running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    let metrics = engine.get_metrics();
    info!(
        requests = metrics.requests_total,
        succeeded = metrics.requests_succeeded,
        failed = metrics.requests_failed,
        dropped_events = metrics.events_dropped,
        "Shutting down"
    );
    engine.shutdown().await?;
    Ok(())
}

async fn chat(
    loader: &ConfigLoader,
    config: &EngineConfig,
    cluster: &Path,
    agent: &str,
    timeout: Duration,
    message: String,
) -> Result<()> {
    let manifest = load_manifest(loader, cluster)?;
    let name = manifest.name().to_string();

    let engine = build_engine(config);
    engine.deploy_cluster(manifest)?;
    engine
        .wait_for_cluster(&name, config.runtime.startup_timeout)
        .await?;

    let request = Request::user(message).with_timeout(timeout);
    let response = engine.process_request(&name, agent, request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    let metrics = engine.get_metrics();
    println!("{}", serde_json::to_string_pretty(&metrics)?);

    engine.shutdown().await?;
    if let Some(error) = response.error {
        bail!("agent returned an error: {}", error);
    }
    Ok(())
}
