//! End-to-end behaviour of the engine through its public API

use goagents_core::config::{parse_cluster, AgentSpec, ManifestFormat};
use goagents_core::error::{ClusterError, ProviderError};
use goagents_core::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        startup_poll_interval: Duration::from_millis(5),
        startup_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn engine() -> Engine {
    let providers = ProviderRegistry::new().with("mock", Arc::new(EchoProvider::new()));
    Engine::new(runtime_config(), providers, ToolRegistry::new())
}

fn cluster(name: &str) -> ClusterManifest {
    ClusterManifest::new(name).with_agent(AgentSpec::new("writer", "mock", "m1"))
}

async fn deploy(engine: &Engine, manifest: ClusterManifest) -> ClusterView {
    let name = manifest.name().to_string();
    engine.deploy_cluster(manifest).unwrap();
    engine
        .wait_for_cluster(&name, Duration::from_secs(1))
        .await
        .unwrap()
}

#[tokio::test]
async fn first_request_starts_agent_and_counts_once() {
    let engine = engine();
    deploy(&engine, cluster("demo")).await;

    let response = engine
        .process_request("demo", "writer", Request::user("hello"))
        .await
        .unwrap();
    assert_eq!(response.content, "echo: hello");
    assert!(!response.is_soft_failure());

    let agent = engine.get_agent("demo", "writer").unwrap();
    assert_eq!(agent.status, AgentStatus::Running);
    assert_eq!(agent.metrics.requests_total, 1);
    assert_eq!(agent.metrics.requests_succeeded, 1);

    let metrics = engine.get_metrics();
    assert_eq!(metrics.requests_total, 1);
    assert_eq!(metrics.requests_succeeded, 1);
    assert_eq!(metrics.agents_active, 1);
}

#[tokio::test]
async fn explicit_start_then_request() {
    let engine = engine();
    deploy(&engine, cluster("demo")).await;
    let id = engine.get_agent("demo", "writer").unwrap().id;

    engine.agents().start(&id).unwrap();
    let response = engine
        .process_request("demo", "writer", Request::user("hi"))
        .await
        .unwrap();
    assert!(!response.content.is_empty());
    assert_eq!(engine.agents().status(&id).unwrap(), AgentStatus::Running);
    assert_eq!(engine.agents().get(&id).unwrap().metrics().requests_total, 1);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let engine = engine();
    deploy(&engine, cluster("demo")).await;
    engine
        .process_request("demo", "writer", Request::user("hi"))
        .await
        .unwrap();
    let id = engine.get_agent("demo", "writer").unwrap().id;

    engine.agents().stop(&id).unwrap();
    engine.agents().stop(&id).unwrap();
    engine
        .agents()
        .wait_for_status(&id, AgentStatus::Stopped, Duration::from_secs(1))
        .await
        .unwrap();
    engine.agents().stop(&id).unwrap();
    assert_eq!(engine.agents().status(&id).unwrap(), AgentStatus::Stopped);
}

#[tokio::test]
async fn delete_unknown_agent_leaves_registry_untouched() {
    let engine = engine();
    deploy(&engine, cluster("demo")).await;
    let before = engine.agents().list().len();

    let err = engine.agents().delete("agent-does-not-exist").unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(engine.agents().list().len(), before);

    let err = engine.delete_cluster("missing").unwrap_err();
    assert!(matches!(err, Error::Cluster(ClusterError::NotFound(_))));
    assert_eq!(engine.list_clusters().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn idle_agent_stays_servable() {
    let engine = engine();
    deploy(
        &engine,
        cluster("demo").with_idle_timeout(Duration::from_secs(1)),
    )
    .await;

    let response = engine
        .process_request("demo", "writer", Request::user("ping"))
        .await
        .unwrap();
    assert!(!response.content.is_empty());
    let agent = engine.get_agent("demo", "writer").unwrap();
    assert_eq!(agent.status, AgentStatus::Running);
    assert_eq!(agent.metrics.requests_total, 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        engine.get_agent("demo", "writer").unwrap().status,
        AgentStatus::Idle
    );

    let started = tokio::time::Instant::now();
    let response = engine
        .process_request("demo", "writer", Request::user("ping again"))
        .await
        .unwrap();
    assert_eq!(response.content, "echo: ping again");
    // Served straight away, no startup polling
    assert!(started.elapsed() < Duration::from_millis(5));

    let agent = engine.get_agent("demo", "writer").unwrap();
    assert!(agent.status.is_servable());
    assert_eq!(agent.metrics.requests_total, 2);
}

#[tokio::test]
async fn duplicate_cluster_name_is_rejected() {
    let engine = engine();
    deploy(&engine, cluster("demo")).await;
    engine
        .process_request("demo", "writer", Request::user("hi"))
        .await
        .unwrap();
    let before = engine.get_cluster_status("demo").unwrap();

    let err = engine
        .deploy_cluster(
            ClusterManifest::new("demo").with_agent(AgentSpec::new("other", "mock", "m2")),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Cluster(ClusterError::AlreadyExists(_))));

    let after = engine.get_cluster_status("demo").unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.agents.len(), 1);
    assert_eq!(after.agents[0].id, before.agents[0].id);
    assert_eq!(after.agents[0].status, AgentStatus::Running);
    assert_eq!(engine.get_metrics().clusters_total, 1);
}

#[tokio::test]
async fn unregistered_provider_is_unavailable() {
    let engine = engine();
    deploy(
        &engine,
        ClusterManifest::new("demo").with_agent(AgentSpec::new("writer", "openai", "gpt-4")),
    )
    .await;

    let err = engine
        .process_request("demo", "writer", Request::user("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Provider(ProviderError::Unavailable(ref p)) if p == "openai"));
    assert_eq!(err.kind(), "provider_unavailable");

    let agent = engine.get_agent("demo", "writer").unwrap();
    assert_eq!(agent.status, AgentStatus::Pending);
    assert_eq!(agent.metrics.requests_total, 0);
    assert_eq!(engine.get_metrics().requests_total, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn metrics_stay_consistent_under_concurrency() {
    let echo = Arc::new(EchoProvider::new().with_latency(Duration::from_millis(2)));
    let flaky = Arc::new(
        EchoProvider::new().failing_with(ProviderError::RateLimited("slow down".to_string())),
    );
    let providers = ProviderRegistry::new()
        .with("mock", echo)
        .with("flaky", flaky);
    let engine = Arc::new(Engine::new(runtime_config(), providers, ToolRegistry::new()));
    deploy(
        &engine,
        cluster("demo").with_agent(AgentSpec::new("unlucky", "flaky", "m1")),
    )
    .await;

    let sampler = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let m = engine.get_metrics();
                assert!(m.requests_succeeded + m.requests_failed <= m.requests_total);
                for view in engine.list_clusters() {
                    for agent in view.agents {
                        let a = agent.metrics;
                        assert!(a.requests_succeeded + a.requests_failed <= a.requests_total);
                    }
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let mut requests = Vec::new();
    for i in 0..40 {
        let engine = engine.clone();
        let agent = if i % 4 == 0 { "unlucky" } else { "writer" };
        requests.push(tokio::spawn(async move {
            engine
                .process_request("demo", agent, Request::user(format!("msg {}", i)))
                .await
        }));
    }
    for request in requests {
        request.await.unwrap().unwrap();
    }
    sampler.await.unwrap();

    let metrics = engine.get_metrics();
    assert_eq!(metrics.requests_total, 40);
    assert_eq!(metrics.requests_failed, 10);
    assert_eq!(metrics.requests_succeeded, 30);
}

#[tokio::test]
async fn lifecycle_events_are_published() {
    let engine = engine();
    let mut events = engine.take_events().unwrap();
    assert!(engine.take_events().is_none());
    deploy(&engine, cluster("demo")).await;

    engine
        .process_request("demo", "writer", Request::user("hi").with_id("req-7"))
        .await
        .unwrap();
    engine.stop_cluster("demo").unwrap();

    let mut seen = Vec::new();
    while seen.last() != Some(&EventType::AgentStopped) {
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        if event.event_type == EventType::RequestEnded {
            assert_eq!(event.data["requestId"], "req-7");
            assert_eq!(event.data["success"], true);
        }
        seen.push(event.event_type);
    }
    assert_eq!(
        seen,
        vec![
            EventType::AgentStarted,
            EventType::RequestStarted,
            EventType::RequestEnded,
            EventType::AgentStopped,
        ]
    );
}

#[tokio::test]
async fn manifest_from_yaml_deploys() {
    let manifest = parse_cluster(
        r#"
apiVersion: goagents.dev/v1
kind: AgentCluster
metadata:
  name: support
spec:
  resource_policy:
    idle_timeout: 30s
  agents:
    - name: triage
      provider: mock
      model: m1
      system_prompt: You route tickets.
    - name: writer
      provider: mock
      model: m2
      depends_on: [triage]
"#,
        ManifestFormat::Yaml,
    )
    .unwrap();

    let engine = engine();
    let view = deploy(&engine, manifest).await;
    assert_eq!(view.namespace, "default");
    assert_eq!(view.agents.len(), 2);

    // dependsOn does not gate requests to the dependent agent
    let response = engine
        .process_request("support", "writer", Request::user("draft"))
        .await
        .unwrap();
    assert_eq!(response.content, "echo: draft");
    assert_eq!(
        engine.get_agent("support", "triage").unwrap().status,
        AgentStatus::Pending
    );
}
