//! Configuration loading and manifest validation

use super::types::{
    ClusterManifest, EngineConfig, DEFAULT_API_VERSION, DEFAULT_KIND, DEFAULT_NAMESPACE,
};
use crate::error::{ConfigError, Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Environment prefix for overrides, e.g. `GOAGENTS_SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "GOAGENTS";

/// Manifest encodings recognised by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Yaml,
    Json,
}

impl ManifestFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(Error::Config(ConfigError::UnsupportedFormat(format!(
                "{} (expected .yaml, .yml or .json)",
                path.display()
            )))),
        }
    }

    fn file_format(self) -> config::FileFormat {
        match self {
            Self::Yaml => config::FileFormat::Yaml,
            Self::Json => config::FileFormat::Json,
        }
    }
}

/// Loads the engine configuration and standalone cluster manifests
pub struct ConfigLoader {
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    pub fn with_env_prefix(prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: prefix.into(),
        }
    }

    /// Layer defaults, the optional file and environment overrides, then validate
    pub fn load(&self, path: Option<&Path>) -> Result<EngineConfig> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(ConfigError::Read {
                    path: path.display().to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "config file not found",
                    ),
                }));
            }
            let format = ManifestFormat::from_path(path)?;
            info!("Loading configuration from {:?}", path);
            builder = builder.add_source(config::File::from(path).format(format.file_format()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: EngineConfig = builder.build()?.try_deserialize()?;
        validate_engine_config(&mut config)?;
        Ok(config)
    }

    /// Read and validate an `AgentCluster` manifest
    pub fn load_cluster(&self, path: impl AsRef<Path>) -> Result<ClusterManifest> {
        let path = path.as_ref();
        let format = ManifestFormat::from_path(path)?;
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        debug!("Parsing cluster manifest {:?}", path);
        parse_cluster(&data, format).map_err(|e| match e {
            Error::Config(ConfigError::Parse { message, .. }) => {
                Error::Config(ConfigError::Parse {
                    path: path.display().to_string(),
                    message,
                })
            }
            other => other,
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse and validate a manifest held in memory
pub fn parse_cluster(data: &str, format: ManifestFormat) -> Result<ClusterManifest> {
    let parsed = match format {
        ManifestFormat::Yaml => serde_yaml::from_str(data).map_err(|e| e.to_string()),
        ManifestFormat::Json => serde_json::from_str(data).map_err(|e| e.to_string()),
    };
    let mut cluster: ClusterManifest = parsed.map_err(|message| ConfigError::Parse {
        path: "<inline>".to_string(),
        message,
    })?;

    validate_cluster(&mut cluster)?;
    Ok(cluster)
}

pub fn validate_engine_config(config: &mut EngineConfig) -> Result<()> {
    if config.server.port == 0 {
        return Err(validation("invalid server port: 0"));
    }
    if config.server.metrics.enabled && config.server.metrics.port == 0 {
        return Err(validation("invalid metrics port: 0"));
    }
    if config.runtime.event_buffer == 0 {
        return Err(validation("runtime.event_buffer must be at least 1"));
    }
    if config.runtime.startup_poll_interval.is_zero() {
        return Err(validation("runtime.startup_poll_interval must be positive"));
    }

    for (i, cluster) in config.clusters.iter_mut().enumerate() {
        validate_cluster(cluster).map_err(|e| validation(format!("cluster {}: {}", i, e)))?;
    }

    Ok(())
}

/// Fill manifest defaults and check agents and their `depends_on` graph.
///
/// The dependency graph must reference known agents and be acyclic. It is
/// never used to order agent creation.
pub fn validate_cluster(cluster: &mut ClusterManifest) -> Result<()> {
    if cluster.api_version.is_empty() {
        cluster.api_version = DEFAULT_API_VERSION.to_string();
    }
    if cluster.kind.is_empty() {
        cluster.kind = DEFAULT_KIND.to_string();
    }
    if cluster.metadata.namespace.is_empty() {
        cluster.metadata.namespace = DEFAULT_NAMESPACE.to_string();
    }
    if cluster.metadata.name.trim().is_empty() {
        return Err(validation("cluster name is required"));
    }
    if cluster.spec.agents.is_empty() {
        return Err(validation(format!(
            "cluster {}: at least one agent is required",
            cluster.metadata.name
        )));
    }

    let mut names = HashSet::new();
    for (i, agent) in cluster.spec.agents.iter().enumerate() {
        if agent.name.trim().is_empty() {
            return Err(validation(format!("agent {}: name is required", i)));
        }
        if !names.insert(agent.name.as_str()) {
            return Err(validation(format!("duplicate agent name: {}", agent.name)));
        }
        if agent.provider.trim().is_empty() {
            return Err(validation(format!("agent {}: provider is required", agent.name)));
        }
        if agent.model.trim().is_empty() {
            return Err(validation(format!("agent {}: model is required", agent.name)));
        }
    }

    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for agent in &cluster.spec.agents {
        for dep in &agent.depends_on {
            if !names.contains(dep.as_str()) {
                return Err(validation(format!(
                    "agent {}: dependency {} not found",
                    agent.name, dep
                )));
            }
        }
        edges.insert(
            agent.name.as_str(),
            agent.depends_on.iter().map(String::as_str).collect(),
        );
    }

    let order: Vec<&str> = cluster.spec.agents.iter().map(|a| a.name.as_str()).collect();
    if let Some(cycle) = find_cycle(&order, &edges) {
        return Err(validation(format!("dependency cycle: {}", cycle.join(" -> "))));
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search returning the first cycle found, closed on its start
fn find_cycle<'a>(
    nodes: &[&'a str],
    edges: &HashMap<&'a str, Vec<&'a str>>,
) -> Option<Vec<&'a str>> {
    fn visit<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<&'a str>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(node);
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(node, Mark::Visiting);
        path.push(node);
        for dep in edges.get(node).into_iter().flatten() {
            if let Some(cycle) = visit(*dep, edges, marks, path) {
                return Some(cycle);
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    let mut path = Vec::new();
    nodes
        .iter()
        .find_map(|node| visit(*node, edges, &mut marks, &mut path))
}

fn validation(message: impl Into<String>) -> Error {
    Error::Config(ConfigError::Validation(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::time::Duration;

    const MANIFEST: &str = r#"
apiVersion: goagents.dev/v1
kind: AgentCluster
metadata:
  name: support
  labels:
    team: cx
spec:
  resource_policy:
    idle_timeout: 1s
    scale_to_zero: true
  agents:
    - name: triage
      provider: mock
      model: m1
      system_prompt: You route tickets.
      resources:
        timeout: 5s
    - name: writer
      provider: mock
      model: m2
      depends_on: [triage]
"#;

    fn yaml_err(data: &str) -> String {
        parse_cluster(data, ManifestFormat::Yaml).unwrap_err().to_string()
    }

    #[test]
    fn test_parse_yaml_manifest() {
        let cluster = parse_cluster(MANIFEST, ManifestFormat::Yaml).unwrap();
        assert_eq!(cluster.name(), "support");
        assert_eq!(cluster.metadata.namespace, "default");
        assert_eq!(cluster.spec.agents.len(), 2);
        assert_eq!(
            cluster.spec.resource_policy.idle_timeout,
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            cluster.spec.agents[0].resources.timeout,
            Some(Duration::from_secs(5))
        );
        assert_eq!(cluster.spec.agents[1].depends_on, vec!["triage".to_string()]);
    }

    #[test]
    fn test_parse_json_manifest_fills_defaults() {
        let data = r#"{
            "metadata": {"name": "solo"},
            "spec": {"agents": [{"name": "a", "provider": "mock", "model": "m1"}]}
        }"#;
        let cluster = parse_cluster(data, ManifestFormat::Json).unwrap();
        assert_eq!(cluster.api_version, DEFAULT_API_VERSION);
        assert_eq!(cluster.kind, DEFAULT_KIND);
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert!(yaml_err("metadata: {name: ''}\nspec: {agents: []}").contains("cluster name is required"));
        assert!(yaml_err("metadata: {name: c}\nspec: {agents: []}").contains("at least one agent"));
        assert!(yaml_err(
            "metadata: {name: c}\nspec: {agents: [{name: a, model: m1}]}"
        )
        .contains("provider is required"));
        assert!(yaml_err(
            "metadata: {name: c}\nspec: {agents: [{name: a, provider: mock}]}"
        )
        .contains("model is required"));
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let err = yaml_err(
            "metadata: {name: c}\nspec: {agents: [{name: a, provider: p, model: m}, {name: a, provider: p, model: m}]}",
        );
        assert!(err.contains("duplicate agent name: a"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = yaml_err(
            "metadata: {name: c}\nspec: {agents: [{name: a, provider: p, model: m, depends_on: [ghost]}]}",
        );
        assert!(err.contains("dependency ghost not found"));
    }

    #[test]
    fn test_forward_dependency_accepted() {
        let data = "metadata: {name: c}\nspec: {agents: [{name: a, provider: p, model: m, depends_on: [b]}, {name: b, provider: p, model: m}]}";
        assert!(parse_cluster(data, ManifestFormat::Yaml).is_ok());
    }

    #[test]
    fn test_dependency_cycles_rejected() {
        let err = yaml_err(
            "metadata: {name: c}\nspec: {agents: [{name: a, provider: p, model: m, depends_on: [b]}, {name: b, provider: p, model: m, depends_on: [a]}]}",
        );
        assert!(err.contains("dependency cycle: a -> b -> a"), "{}", err);

        let err = yaml_err(
            "metadata: {name: c}\nspec: {agents: [{name: a, provider: p, model: m, depends_on: [a]}]}",
        );
        assert!(err.contains("dependency cycle: a -> a"), "{}", err);
    }

    #[test]
    fn test_load_cluster_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();

        let cluster = ConfigLoader::new().load_cluster(file.path()).unwrap();
        assert_eq!(cluster.name(), "support");
    }

    #[test]
    fn test_load_cluster_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let err = ConfigLoader::new().load_cluster(file.path()).unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("Unsupported file format"));
    }

    #[test]
    fn test_load_engine_config_defaults() {
        let config = ConfigLoader::with_env_prefix("GOAGENTS_TEST_DEFAULTS")
            .load(None)
            .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.timeout, Duration::from_secs(30));
        assert_eq!(config.runtime.event_buffer, 100);
        assert_eq!(config.runtime.startup_timeout, Duration::from_secs(30));
        assert!(config.clusters.is_empty());
    }

    #[test]
    fn test_load_engine_config_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "server:\n  port: 9000\n  log_level: debug\nruntime:\n  startup_timeout: 5s\nproviders:\n  mock:\n    api_key: none"
        )
        .unwrap();

        let config = ConfigLoader::with_env_prefix("GOAGENTS_TEST_FILE")
            .load(Some(file.path()))
            .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.runtime.startup_timeout, Duration::from_secs(5));
        assert_eq!(config.runtime.event_buffer, 100);
        assert!(config.providers.contains_key("mock"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = ConfigLoader::new()
            .load(Some(Path::new("/nonexistent/goagents.yaml")))
            .unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
