//! Node startup from a configuration file, including recovery of in-flight
//! jobs after a restart on a persistent store.

use anyhow::Result;
use bacalhau_bidstrategy::{BidStrategy, BidStrategyRequest, CapacityTracker};
use bacalhau_config::{load_node_config, NodeConfig, StoreBackend};
use bacalhau_jobstore::UpdateJobStateRequest;
use bacalhau_node::Node;
use bacalhau_types::{ExecutionId, ExecutionStateType, Job, JobSpec, JobStateType, ResourceUsage};
use tempfile::TempDir;

fn fixture_config() -> Result<NodeConfig> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/node.toml");
    load_node_config(path)
}

fn docker_job(id: &str, cpu: f64) -> Job {
    let mut spec = JobSpec::default();
    spec.engine.engine_type = "docker".into();
    spec.resources = ResourceUsage::cpu(cpu);
    spec.timeout_secs = 600;
    Job::new(id, "client-1", spec)
}

#[tokio::test]
async fn test_fixture_node_starts_with_full_chain() -> Result<()> {
    let node = Node::start(fixture_config()?).await?;

    assert_eq!(node.config.node.id, "node-fixture");
    assert!(node.recovered.is_empty());
    assert_eq!(
        node.bid_strategy.names(),
        vec![
            "networking",
            "timeout",
            "stateless_job",
            "providers_installed",
            "input_locality",
            "max_capacity",
            "available_capacity",
        ]
    );

    let accepted = node
        .bid_strategy
        .decide(&BidStrategyRequest::new("node-fixture", docker_job("job-abc", 1.0)))
        .await?;
    assert!(accepted.should_bid, "{}", accepted.reason);

    let mut unbounded = docker_job("job-unbounded", 1.0);
    unbounded.spec.timeout_secs = 0;
    let rejected = node
        .bid_strategy
        .decide(&BidStrategyRequest::new("node-fixture", unbounded.clone()))
        .await?;
    assert_eq!(rejected.reason, "job timeout is unbounded but the maximum is 3600s");

    // The bypass list lifts the maximum
    unbounded.metadata.client_id = "ops".into();
    let bypassed = node
        .bid_strategy
        .decide(&BidStrategyRequest::new("node-fixture", unbounded))
        .await?;
    assert!(bypassed.should_bid, "{}", bypassed.reason);

    let big = docker_job("job-big", 2.0);
    let usage = big.spec.resources;
    let rejected = node
        .bid_strategy
        .decide_on_usage(&BidStrategyRequest::new("node-fixture", big), &usage)
        .await?;
    assert_eq!(rejected.reason, "job requirements exceed max allowed per job");
    Ok(())
}

#[tokio::test]
async fn test_restart_recovers_in_flight_work() -> Result<()> {
    let tmp = TempDir::new()?;
    let mut config = fixture_config()?;
    config.store.backend = StoreBackend::Rocksdb;
    config.store.path = Some(tmp.path().join("jobs"));

    {
        let node = Node::start(config.clone()).await?;
        let store = &node.store;
        store.create_job(docker_job("job-running", 1.0)).await?;
        store
            .update_job_state(UpdateJobStateRequest::new("job-running", JobStateType::InProgress))
            .await?;
        store
            .create_execution(
                ExecutionId::new("job-running", "node-fixture", "exec-1"),
                ExecutionStateType::BidAccepted,
            )
            .await?;

        store.create_job(docker_job("job-finished", 1.0)).await?;
        store
            .update_job_state(UpdateJobStateRequest::new("job-finished", JobStateType::Completed))
            .await?;
    }

    let node = Node::start(config).await?;
    let ids: Vec<&str> = node.recovered.iter().map(|info| info.job.id.as_str()).collect();
    assert_eq!(ids, vec!["job-running"]);
    assert_eq!(node.recovered[0].executions.len(), 1);
    assert_eq!(node.running.available_capacity().cpu, 1.0);
    Ok(())
}
