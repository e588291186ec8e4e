//! Cluster registry and request dispatch

use super::cluster::{Admission, Cluster};
use super::metrics::SystemMetrics;
use crate::agent::{deadline_after, Agent, AgentManager};
use crate::config::{ClusterManifest, EngineConfig, RuntimeConfig};
use crate::error::{ClusterError, ConfigError, Error, ProviderError, Result};
use crate::provider::{ChatRequest, ChatResponse, Provider, ProviderRegistry, ToolDefinition};
use crate::tool::{ToolArgs, ToolRegistry, ToolResult};
use crate::types::*;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The runtime orchestration engine.
///
/// Owns the cluster registry and routes chat requests to agents and their
/// providers. Collaborators are injected at construction; nothing is global.
pub struct Engine {
    config: RuntimeConfig,
    /// Clusters embedded in the engine configuration, deployed on demand
    configured: Vec<ClusterManifest>,
    clusters: RwLock<HashMap<String, Arc<Cluster>>>,
    agents: Arc<AgentManager>,
    providers: Arc<ProviderRegistry>,
    tools: Arc<ToolRegistry>,
    metrics: Arc<SystemMetrics>,
}

impl Engine {
    pub fn new(config: RuntimeConfig, providers: ProviderRegistry, tools: ToolRegistry) -> Self {
        Self {
            agents: Arc::new(AgentManager::new(&config)),
            config,
            configured: Vec::new(),
            clusters: RwLock::new(HashMap::new()),
            providers: Arc::new(providers),
            tools: Arc::new(tools),
            metrics: Arc::new(SystemMetrics::new()),
        }
    }

    pub fn from_config(config: &EngineConfig, providers: ProviderRegistry, tools: ToolRegistry) -> Self {
        for name in config.providers.keys() {
            if !providers.contains(name) {
                warn!(provider = %name, "Provider configured but no client registered");
            }
        }

        let mut engine = Self::new(config.runtime.clone(), providers, tools);
        engine.configured = config.clusters.clone();
        engine
    }

    pub fn agents(&self) -> &AgentManager {
        &self.agents
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Register a cluster and expand its agents in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn deploy_cluster(&self, manifest: ClusterManifest) -> Result<()> {
        let name = manifest.name().to_string();
        if name.trim().is_empty() {
            return Err(Error::Config(ConfigError::Validation(
                "cluster name is required".to_string(),
            )));
        }

        let cluster = {
            let mut clusters = self.clusters.write();
            if clusters.contains_key(&name) {
                return Err(Error::Cluster(ClusterError::AlreadyExists(name)));
            }
            let cluster = Arc::new(Cluster::new(manifest));
            clusters.insert(name.clone(), cluster.clone());
            cluster
        };
        self.metrics.cluster_deployed();
        info!(
            cluster = %name,
            agents = cluster.manifest().spec.agents.len(),
            "Deploying cluster"
        );

        let fan_out = tokio::spawn(expand_cluster(
            cluster.clone(),
            self.agents.clone(),
            self.tools.clone(),
            self.metrics.clone(),
            self.config.default_idle_timeout,
        ));
        tokio::spawn(async move {
            if let Err(e) = fan_out.await {
                error!(cluster = %cluster.name(), error = %e, "Cluster deployment aborted");
                cluster.transition(ClusterStatus::Pending, ClusterStatus::Failed);
            }
        });

        Ok(())
    }

    /// Deploy every cluster embedded in the engine configuration.
    ///
    /// Returns the clusters that could not be deployed.
    pub fn deploy_configured_clusters(&self) -> Vec<(String, Error)> {
        let mut failures = Vec::new();
        for manifest in self.configured.clone() {
            let name = manifest.name().to_string();
            if let Err(e) = self.deploy_cluster(manifest) {
                warn!(cluster = %name, error = %e, "Failed to deploy configured cluster");
                failures.push((name, e));
            }
        }
        failures
    }

    /// Poll until the cluster leaves `pending`
    pub async fn wait_for_cluster(&self, name: &str, timeout: Duration) -> Result<ClusterView> {
        let deadline = deadline_after(Instant::now(), timeout);
        loop {
            let view = self.get_cluster_status(name)?;
            if view.status != ClusterStatus::Pending {
                return Ok(view);
            }
            if Instant::now() >= deadline {
                return Err(Error::Internal(format!(
                    "cluster {} still pending after {:?}",
                    name, timeout
                )));
            }
            tokio::time::sleep(self.config.startup_poll_interval).await;
        }
    }

    /// Route one chat request to `agent` in `cluster`.
    ///
    /// Provider failures come back as a soft-failure `Response`; only
    /// registry, lifecycle and provider-lookup problems are errors.
    pub async fn process_request(
        &self,
        cluster: &str,
        agent: &str,
        request: Request,
    ) -> Result<Response> {
        let target = self.resolve_agent(cluster, agent)?;
        let provider_name = target.config().provider.clone();
        let provider = self
            .providers
            .get(&provider_name)
            .ok_or_else(|| Error::Provider(ProviderError::Unavailable(provider_name.clone())))?;

        let timeout = request
            .timeout
            .filter(|t| !t.is_zero())
            .or(target.config().resources.timeout.filter(|t| !t.is_zero()))
            .unwrap_or(self.config.default_request_timeout);
        let tools = self.offered_tools(target.config(), &request.tools);
        let request_id = request.id.clone();
        let metrics = &self.metrics;

        debug!(
            cluster = %cluster,
            agent = %agent,
            provider = %provider_name,
            request_id = %request_id,
            timeout = ?timeout,
            "Dispatching request"
        );

        self.agents
            .process_request(target.id(), &request_id, move |agent, token| async move {
                metrics.request_started();
                let started = Instant::now();
                let response = call_provider(
                    provider.as_ref(),
                    &provider_name,
                    &agent,
                    request,
                    tools,
                    timeout,
                    token,
                )
                .await;
                metrics.record_outcome(!response.is_soft_failure(), started.elapsed());
                response
            })
            .await
    }

    /// Ask every agent in the cluster to stop
    pub fn stop_cluster(&self, name: &str) -> Result<()> {
        let cluster = self.cluster(name)?;
        info!(cluster = %name, "Stopping cluster");

        for agent in cluster.agents() {
            if let Err(e) = self.agents.stop(agent.id()) {
                warn!(cluster = %name, agent = %agent.name(), error = %e, "Failed to stop agent");
            }
        }
        cluster.set_status(ClusterStatus::Stopped);
        Ok(())
    }

    /// Delete every agent in the cluster, then the cluster itself
    pub fn delete_cluster(&self, name: &str) -> Result<()> {
        let cluster = self
            .clusters
            .write()
            .remove(name)
            .ok_or_else(|| Error::Cluster(ClusterError::NotFound(name.to_string())))?;
        info!(cluster = %name, "Deleting cluster");

        for agent in cluster.drain() {
            if let Err(e) = self.agents.delete(agent.id()) {
                warn!(cluster = %name, agent = %agent.name(), error = %e, "Failed to delete agent");
            }
        }
        cluster.set_status(ClusterStatus::Stopped);
        Ok(())
    }

    /// Views of every cluster, sorted by name
    pub fn list_clusters(&self) -> Vec<ClusterView> {
        let clusters: Vec<Arc<Cluster>> = self.clusters.read().values().cloned().collect();
        let mut views: Vec<ClusterView> = clusters.iter().map(|c| c.view()).collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }

    pub fn get_cluster_status(&self, name: &str) -> Result<ClusterView> {
        Ok(self.cluster(name)?.view())
    }

    pub fn get_agent(&self, cluster: &str, agent: &str) -> Result<AgentView> {
        Ok(self.resolve_agent(cluster, agent)?.view())
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        let mut snapshot = self.metrics.snapshot();
        snapshot.events_dropped = self.agents.events().dropped();
        snapshot.clusters_active = self
            .clusters
            .read()
            .values()
            .filter(|c| c.status() == ClusterStatus::Running)
            .count() as u64;
        snapshot.agents_active = self
            .agents
            .list()
            .iter()
            .filter(|a| a.status().is_servable())
            .count() as u64;
        snapshot
    }

    /// Run a registered tool on behalf of a caller relaying a model tool call
    pub async fn execute_tool(&self, name: &str, args: ToolArgs) -> Result<ToolResult> {
        Ok(self.tools.execute(name, args).await?)
    }

    /// Lifecycle event stream; available to a single consumer
    pub fn take_events(&self) -> Option<mpsc::Receiver<Event>> {
        self.agents.events().take_receiver()
    }

    /// Stop every cluster, wait for agents to stop, then release providers and tools
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down engine");

        let names: Vec<String> = self.clusters.read().keys().cloned().collect();
        for name in &names {
            if let Err(e) = self.stop_cluster(name) {
                warn!(cluster = %name, error = %e, "Failed to stop cluster during shutdown");
            }
        }
        self.agents.stop_all();

        for agent in self.agents.list() {
            if let Err(e) = self
                .agents
                .wait_for_status(agent.id(), AgentStatus::Stopped, self.config.startup_timeout)
                .await
            {
                warn!(agent_id = %agent.id(), error = %e, "Agent did not stop in time");
            }
        }

        let providers = self.providers.close_all().await;
        let tools = self.tools.close_all().await;
        info!("Engine shut down");

        providers?;
        tools?;
        Ok(())
    }

    fn cluster(&self, name: &str) -> Result<Arc<Cluster>> {
        self.clusters
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Cluster(ClusterError::NotFound(name.to_string())))
    }

    fn resolve_agent(&self, cluster: &str, agent: &str) -> Result<Arc<Agent>> {
        self.cluster(cluster)?.agent(agent).ok_or_else(|| {
            Error::Cluster(ClusterError::AgentNotFound {
                cluster: cluster.to_string(),
                agent: agent.to_string(),
            })
        })
    }

    /// Registered tools the agent declares, narrowed by the request hints
    fn offered_tools(&self, config: &AgentConfig, hints: &[String]) -> Vec<ToolDefinition> {
        let names = config
            .tools
            .iter()
            .map(|t| t.name.as_str())
            .filter(|name| hints.is_empty() || hints.iter().any(|h| h == name));
        self.tools.definitions(names)
    }
}

/// Create the cluster's agents in declaration order, skipping failures
async fn expand_cluster(
    cluster: Arc<Cluster>,
    agents: Arc<AgentManager>,
    tools: Arc<ToolRegistry>,
    metrics: Arc<SystemMetrics>,
    default_idle_timeout: Duration,
) {
    let name = cluster.name().to_string();
    let policy = cluster.manifest().spec.resource_policy.clone();

    for spec in &cluster.manifest().spec.agents {
        if cluster.is_removed() {
            debug!(cluster = %name, "Cluster removed during deployment");
            return;
        }
        if cluster.contains_agent(&spec.name) {
            warn!(cluster = %name, agent = %spec.name, "Duplicate agent name, skipping");
            continue;
        }

        let config = spec.to_agent_config(&policy, default_idle_timeout);
        for tool in &config.tools {
            if !tools.contains(&tool.name) {
                warn!(cluster = %name, agent = %spec.name, tool = %tool.name, "Tool not registered");
            }
        }

        let agent = match agents.create(spec.name.clone(), name.clone(), config) {
            Ok(agent) => agent,
            Err(e) => {
                warn!(cluster = %name, agent = %spec.name, error = %e, "Failed to create agent");
                continue;
            }
        };

        match cluster.admit(agent.clone()) {
            Admission::Added => metrics.agent_created(),
            Admission::Duplicate | Admission::ClusterRemoved => {
                if let Err(e) = agents.delete(agent.id()) {
                    warn!(cluster = %name, agent = %spec.name, error = %e, "Failed to discard agent");
                }
            }
        }
    }

    if cluster.transition(ClusterStatus::Pending, ClusterStatus::Running) {
        info!(cluster = %name, agents = cluster.agents().len(), "Cluster running");
    }
}

/// Issue the chat call under the request deadline and the agent's token
async fn call_provider(
    provider: &dyn Provider,
    provider_name: &str,
    agent: &Agent,
    request: Request,
    tools: Vec<ToolDefinition>,
    timeout: Duration,
    token: CancellationToken,
) -> Response {
    let config = agent.config();
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(prompt) = config.system_prompt.as_deref().filter(|p| !p.is_empty()) {
        messages.push(Message::system(prompt));
    }
    messages.extend(request.messages);

    let chat = ChatRequest {
        model: config.model.clone(),
        messages,
        tools,
        metadata: HashMap::from([
            ("request_id".to_string(), request.id.clone()),
            ("agent_id".to_string(), agent.id().to_string()),
        ]),
        ..Default::default()
    };

    let result = tokio::select! {
        _ = token.cancelled() => Err(ProviderError::Cancelled),
        result = tokio::time::timeout(timeout, provider.chat(chat)) => {
            result.unwrap_or(Err(ProviderError::Timeout(timeout)))
        }
    };

    match result {
        Ok(reply) => to_response(request.id, provider_name, reply),
        Err(e) => {
            warn!(
                agent_id = %agent.id(),
                provider = %provider_name,
                request_id = %request.id,
                error = %e,
                "Provider call failed"
            );
            Response::soft_failure(request.id, e.to_string())
        }
    }
}

fn to_response(id: String, provider_name: &str, reply: ChatResponse) -> Response {
    let mut metadata = HashMap::from([
        ("model".to_string(), serde_json::Value::from(reply.model)),
        ("provider".to_string(), serde_json::Value::from(provider_name)),
    ]);
    if let Some(usage) = reply.usage {
        metadata.insert(
            "usage".to_string(),
            serde_json::json!({
                "promptTokens": usage.prompt_tokens,
                "completionTokens": usage.completion_tokens,
                "totalTokens": usage.total_tokens,
            }),
        );
    }

    Response {
        id,
        content: reply.content,
        tool_uses: reply.tool_use,
        error: reply.error.filter(|e| !e.is_empty()),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentSpec;
    use crate::provider::{EchoProvider, MockProvider};
    use crate::tool::Tool;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    fn runtime_config() -> RuntimeConfig {
        RuntimeConfig {
            startup_poll_interval: Duration::from_millis(5),
            startup_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    fn engine_with(provider: Arc<dyn Provider>) -> Engine {
        let providers = ProviderRegistry::new().with("mock", provider);
        Engine::new(runtime_config(), providers, ToolRegistry::new())
    }

    async fn deploy(engine: &Engine, manifest: ClusterManifest) {
        let name = manifest.name().to_string();
        engine.deploy_cluster(manifest).unwrap();
        engine
            .wait_for_cluster(&name, Duration::from_secs(1))
            .await
            .unwrap();
    }

    fn demo() -> ClusterManifest {
        ClusterManifest::new("demo").with_agent(
            AgentSpec::new("writer", "mock", "m1").with_system_prompt("You write."),
        )
    }

    #[tokio::test]
    async fn test_deploy_expands_agents() {
        let engine = engine_with(Arc::new(EchoProvider::new()));
        deploy(
            &engine,
            demo().with_agent(AgentSpec::new("reviewer", "mock", "m2")),
        )
        .await;

        let view = engine.get_cluster_status("demo").unwrap();
        assert_eq!(view.status, ClusterStatus::Running);
        assert_eq!(view.agents.len(), 2);
        assert!(view.agents.iter().all(|a| a.status == AgentStatus::Pending));

        let metrics = engine.get_metrics();
        assert_eq!(metrics.clusters_total, 1);
        assert_eq!(metrics.agents_total, 2);
        assert_eq!(metrics.clusters_active, 1);
        assert_eq!(metrics.agents_active, 0);
    }

    #[tokio::test]
    async fn test_invalid_agent_is_skipped() {
        let engine = engine_with(Arc::new(EchoProvider::new()));
        deploy(&engine, demo().with_agent(AgentSpec::new("broken", "", "m1"))).await;

        let view = engine.get_cluster_status("demo").unwrap();
        assert_eq!(view.status, ClusterStatus::Running);
        assert!(view.agent("writer").is_some());
        assert!(view.agent("broken").is_none());
    }

    #[tokio::test]
    async fn test_prepends_system_prompt_and_relays_tool_uses() {
        let mut provider = MockProvider::new();
        provider.expect_name().return_const("scripted");
        provider
            .expect_chat()
            .withf(|req| {
                req.model == "m1"
                    && req.messages.len() == 2
                    && req.messages[0].role == Role::System
                    && req.messages[0].content == "You write."
            })
            .times(1)
            .returning(|req| {
                Ok(ChatResponse {
                    id: "chat-1".to_string(),
                    content: "done".to_string(),
                    tool_use: vec![ToolUse {
                        id: "call-1".to_string(),
                        name: "search".to_string(),
                        args: Default::default(),
                    }],
                    model: req.model,
                    ..Default::default()
                })
            });

        let engine = engine_with(Arc::new(provider));
        deploy(&engine, demo()).await;

        let response = engine
            .process_request("demo", "writer", Request::user("hello").with_id("req-1"))
            .await
            .unwrap();
        assert_eq!(response.id, "req-1");
        assert_eq!(response.content, "done");
        assert_eq!(response.tool_uses.len(), 1);
        assert_eq!(response.metadata["provider"], "mock");
        assert_eq!(response.metadata["model"], "m1");
    }

    #[tokio::test]
    async fn test_provider_failure_is_soft() {
        let mut provider = MockProvider::new();
        provider.expect_name().return_const("scripted");
        provider.expect_chat().returning(|_| {
            Err(ProviderError::Api {
                code: 503,
                message: "overloaded".to_string(),
            })
        });

        let engine = engine_with(Arc::new(provider));
        deploy(&engine, demo()).await;

        let response = engine
            .process_request("demo", "writer", Request::user("hello"))
            .await
            .unwrap();
        assert!(response.is_soft_failure());
        assert!(response.content.is_empty());
        assert!(response.error.unwrap().contains("overloaded"));

        let metrics = engine.get_metrics();
        assert_eq!(metrics.requests_total, 1);
        assert_eq!(metrics.requests_failed, 1);
        assert_eq!(metrics.requests_succeeded, 0);
        assert_eq!(metrics.average_response_time, Duration::ZERO);

        let agent = engine.get_agent("demo", "writer").unwrap();
        assert_eq!(agent.metrics.requests_failed, 1);
        assert_eq!(agent.metrics.average_response_time, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_error_payload_is_soft_failure() {
        let mut provider = MockProvider::new();
        provider.expect_name().return_const("scripted");
        provider.expect_chat().returning(|_| {
            Ok(ChatResponse {
                error: Some("content filtered".to_string()),
                ..Default::default()
            })
        });

        let engine = engine_with(Arc::new(provider));
        deploy(&engine, demo()).await;

        let response = engine
            .process_request("demo", "writer", Request::user("hello"))
            .await
            .unwrap();
        assert_eq!(response.error.as_deref(), Some("content filtered"));
        assert_eq!(engine.get_metrics().requests_failed, 1);
    }

    #[tokio::test]
    async fn test_request_timeout_becomes_soft_failure() {
        let provider = EchoProvider::new().with_latency(Duration::from_secs(5));
        let engine = engine_with(Arc::new(provider));
        deploy(&engine, demo()).await;

        let response = engine
            .process_request(
                "demo",
                "writer",
                Request::user("hello").with_timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap();
        assert!(response.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_stopping_cluster_cancels_in_flight_request() {
        let provider = EchoProvider::new().with_latency(Duration::from_secs(10));
        let engine = Arc::new(engine_with(Arc::new(provider)));
        deploy(&engine, demo()).await;
        let agent_id = engine.get_agent("demo", "writer").unwrap().id;
        engine.agents().ensure_running(&agent_id).await.unwrap();

        let in_flight = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .process_request("demo", "writer", Request::user("hello"))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.stop_cluster("demo").unwrap();

        let response = in_flight.await.unwrap().unwrap();
        assert_eq!(response.error.as_deref(), Some("Request cancelled"));
        assert_eq!(
            engine.get_cluster_status("demo").unwrap().status,
            ClusterStatus::Stopped
        );
    }

    #[tokio::test]
    async fn test_lookup_errors() {
        let engine = engine_with(Arc::new(EchoProvider::new()));
        deploy(&engine, demo()).await;

        let err = engine
            .process_request("nope", "writer", Request::user("hi"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = engine
            .process_request("demo", "nope", Request::user("hi"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        assert!(engine.delete_cluster("nope").unwrap_err().is_not_found());
        assert!(engine.stop_cluster("nope").unwrap_err().is_not_found());
        assert!(engine.get_agent("demo", "nope").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_cluster_removes_agents() {
        let engine = engine_with(Arc::new(EchoProvider::new()));
        deploy(&engine, demo()).await;
        engine
            .process_request("demo", "writer", Request::user("hi"))
            .await
            .unwrap();

        engine.delete_cluster("demo").unwrap();
        assert!(engine.list_clusters().is_empty());
        assert!(engine.agents().list().is_empty());

        // Counters are monotonic
        assert_eq!(engine.get_metrics().clusters_total, 1);

        deploy(&engine, demo()).await;
        assert_eq!(engine.list_clusters().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_delete_during_deploy_leaves_no_agents() {
        let engine = engine_with(Arc::new(EchoProvider::new()));
        let mut manifest = ClusterManifest::new("demo");
        for i in 0..64 {
            manifest = manifest.with_agent(AgentSpec::new(format!("agent-{}", i), "mock", "m1"));
        }

        engine.deploy_cluster(manifest).unwrap();
        tokio::task::yield_now().await;
        engine.delete_cluster("demo").unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(engine.list_clusters().is_empty());
        assert!(engine.agents().list().is_empty());
    }

    struct CountingTool;

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "count"
        }

        fn kind(&self) -> &str {
            "builtin"
        }

        async fn execute(&self, args: ToolArgs) -> std::result::Result<ToolResult, crate::error::ToolError> {
            Ok(ToolResult::ok(serde_json::Value::from(args.len())))
        }
    }

    #[tokio::test]
    async fn test_declared_tools_are_offered_and_executable() {
        let tools = ToolRegistry::new();
        tools.register(Arc::new(CountingTool));
        let provider = Arc::new(EchoProvider::new());
        let engine = Engine::new(
            runtime_config(),
            ProviderRegistry::new().with("mock", provider.clone()),
            tools,
        );

        let mut spec = AgentSpec::new("writer", "mock", "m1");
        spec.tools.push(ToolRef::new("count", "builtin"));
        spec.tools.push(ToolRef::new("ghost", "http"));
        deploy(&engine, ClusterManifest::new("demo").with_agent(spec)).await;

        let response = engine
            .process_request("demo", "writer", Request::user("/tool count {\"a\": 1}"))
            .await
            .unwrap();
        assert_eq!(response.tool_uses.len(), 1);
        let offered: Vec<String> = provider
            .last_request()
            .unwrap()
            .tools
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(offered, vec!["count".to_string()]);

        let call = &response.tool_uses[0];
        let result = engine.execute_tool(&call.name, call.args.clone()).await.unwrap();
        assert_eq!(result.data, serde_json::Value::from(1));

        let result = engine.execute_tool("ghost", ToolArgs::new()).await.unwrap();
        assert_eq!(result.error.as_deref(), Some("tool not found: ghost"));

        // Hints that exclude the tool leave nothing to offer
        engine
            .process_request(
                "demo",
                "writer",
                Request::user("hi").with_tools(vec!["other".to_string()]),
            )
            .await
            .unwrap();
        assert!(provider.last_request().unwrap().tools.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_agents_then_closes_providers() {
        let mut provider = MockProvider::new();
        provider.expect_name().return_const("scripted");
        provider.expect_chat().returning(|req| {
            Ok(ChatResponse {
                content: "ok".to_string(),
                model: req.model,
                ..Default::default()
            })
        });
        provider.expect_close().times(1).returning(|| Ok(()));

        let engine = engine_with(Arc::new(provider));
        deploy(&engine, demo()).await;
        engine
            .process_request("demo", "writer", Request::user("hi"))
            .await
            .unwrap();

        engine.shutdown().await.unwrap();
        let agent = engine.get_agent("demo", "writer").unwrap();
        assert_eq!(agent.status, AgentStatus::Stopped);
        assert!(engine.providers().list().is_empty());
    }

    #[tokio::test]
    async fn test_configured_clusters_deploy() {
        let mut config = EngineConfig {
            runtime: runtime_config(),
            ..Default::default()
        };
        config.clusters.push(demo());
        config.clusters.push(demo());

        let engine = Engine::from_config(
            &config,
            ProviderRegistry::new().with("mock", Arc::new(EchoProvider::new())),
            ToolRegistry::new(),
        );
        let failures = engine.deploy_configured_clusters();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].1.kind(), "already_exists");

        let view = engine
            .wait_for_cluster("demo", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(view.agents.len(), 1);
    }
}
