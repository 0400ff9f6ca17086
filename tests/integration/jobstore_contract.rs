//! Behavioral contract every job store backend must satisfy. The same
//! checks run against the in-memory, RocksDB and SQLite stores.

use anyhow::Result;
use bacalhau_jobstore::{
    AuditTrail, InMemoryJobStore, JobHistoryFilter, JobQuery, JobSortBy, JobStore, JobStoreError,
    RocksDbJobStore, SqliteJobStore, UpdateCondition, UpdateExecutionRequest,
    UpdateJobStateRequest,
};
use bacalhau_types::{
    ExecutionId, ExecutionStateType, ExecutionUpdate, Job, JobSpec, JobStateType,
    RunCommandResult,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tempfile::TempDir;

/// A store plus the directory keeping it alive, if any
type TestStore = (Option<TempDir>, Arc<dyn JobStore>);

fn memory_store() -> Result<TestStore> {
    Ok((None, Arc::new(InMemoryJobStore::in_memory())))
}

fn rocksdb_store() -> Result<TestStore> {
    let tmp = TempDir::new()?;
    let store = RocksDbJobStore::open_rocksdb(tmp.path())?;
    Ok((Some(tmp), Arc::new(store)))
}

fn sqlite_store() -> Result<TestStore> {
    let tmp = TempDir::new()?;
    let store = SqliteJobStore::open_sqlite(tmp.path().join("jobs.db"))?;
    Ok((Some(tmp), Arc::new(store)))
}

fn test_job(id: &str) -> Job {
    Job::new(id, "client-1", JobSpec::default())
}

fn exec_id(job_id: &str, reference: &str) -> ExecutionId {
    ExecutionId::new(job_id, "node-1", reference)
}

async fn move_job(store: &dyn JobStore, job_id: &str, state: JobStateType) -> Result<()> {
    store
        .update_job_state(UpdateJobStateRequest::new(job_id, state))
        .await?;
    Ok(())
}

async fn move_execution(
    store: &dyn JobStore,
    id: &ExecutionId,
    state: ExecutionStateType,
) -> Result<()> {
    store
        .update_execution(UpdateExecutionRequest::to_state(id.clone(), state))
        .await?;
    Ok(())
}

async fn job_lifecycle_scenario(store: Arc<dyn JobStore>) -> Result<()> {
    store.create_job(test_job("job-abc")).await?;

    let state = store.get_job_state("job-abc").await?;
    assert_eq!(state.state, JobStateType::New);
    assert_eq!(state.version, 1);

    let state = store
        .update_job_state(
            UpdateJobStateRequest::new("job-abc", JobStateType::InProgress)
                .with_condition(UpdateCondition::expect_state(JobStateType::New)),
        )
        .await?;
    assert_eq!(state.state, JobStateType::InProgress);
    assert_eq!(state.version, 2);
    assert_eq!(store.get_job_state("job-abc").await?, state);

    let history = store
        .get_job_history("job-abc", &JobHistoryFilter::default())
        .await?;
    assert_eq!(history.len(), 2);
    Ok(())
}

async fn idempotent_creation(store: Arc<dyn JobStore>) -> Result<()> {
    let mut original = test_job("job-abc");
    original.spec.annotations = vec!["first".into()];
    store.create_job(original.clone()).await?;

    let mut duplicate = test_job("job-abc");
    duplicate.spec.annotations = vec!["second".into()];
    let err = store.create_job(duplicate).await.unwrap_err();
    assert!(err.is_already_exists(), "unexpected error: {}", err);

    assert_eq!(store.get_job("job-abc").await?, original);
    assert_eq!(store.get_job_state("job-abc").await?.version, 1);
    assert_eq!(
        store
            .get_job_history("job-abc", &JobHistoryFilter::default())
            .await?
            .len(),
        1
    );
    Ok(())
}

async fn version_monotonicity(store: Arc<dyn JobStore>) -> Result<()> {
    store.create_job(test_job("job-abc")).await?;
    for state in [
        JobStateType::InProgress,
        JobStateType::PartialError,
        JobStateType::Completed,
    ] {
        move_job(store.as_ref(), "job-abc", state).await?;
    }

    let id = exec_id("job-abc", "exec-1");
    store.create_execution(id.clone(), ExecutionStateType::New).await?;
    for state in [
        ExecutionStateType::AskForBid,
        ExecutionStateType::AskForBidAccepted,
        ExecutionStateType::BidAccepted,
    ] {
        move_execution(store.as_ref(), &id, state).await?;
    }

    let history = store
        .get_job_history("job-abc", &JobHistoryFilter::default())
        .await?;
    let job_versions: Vec<u64> = history
        .iter()
        .filter(|entry| entry.is_job_level())
        .map(|entry| entry.new_version)
        .collect();
    assert_eq!(job_versions, vec![1, 2, 3, 4]);
    let execution_versions: Vec<u64> = history
        .iter()
        .filter(|entry| entry.is_execution_level())
        .map(|entry| entry.new_version)
        .collect();
    assert_eq!(execution_versions, vec![1, 2, 3, 4]);

    let trail = AuditTrail::replay(&history)?;
    assert_eq!(trail.job, Some((JobStateType::Completed, 4)));
    assert_eq!(
        trail.executions.get(&id),
        Some(&(ExecutionStateType::BidAccepted, 4))
    );
    Ok(())
}

async fn terminal_job_immutability(store: Arc<dyn JobStore>) -> Result<()> {
    store.create_job(test_job("job-abc")).await?;
    move_job(store.as_ref(), "job-abc", JobStateType::InProgress).await?;
    move_job(store.as_ref(), "job-abc", JobStateType::Completed).await?;

    let before = store.get_job_state("job-abc").await?;
    for request in [
        UpdateJobStateRequest::new("job-abc", JobStateType::InProgress),
        UpdateJobStateRequest::new("job-abc", JobStateType::Completed),
        // Terminality wins even over an unsatisfied condition
        UpdateJobStateRequest::new("job-abc", JobStateType::Error)
            .with_condition(UpdateCondition::expect_version(1)),
    ] {
        let err = store.update_job_state(request).await.unwrap_err();
        assert!(
            matches!(
                err,
                JobStoreError::JobAlreadyTerminal {
                    current: JobStateType::Completed,
                    ..
                }
            ),
            "unexpected error: {}",
            err
        );
        assert!(err.is_already_terminal());
    }

    assert_eq!(store.get_job_state("job-abc").await?, before);
    assert_eq!(
        store
            .get_job_history("job-abc", &JobHistoryFilter::default())
            .await?
            .len(),
        3
    );
    Ok(())
}

async fn failed_condition_writes_nothing(store: Arc<dyn JobStore>) -> Result<()> {
    store.create_job(test_job("job-abc")).await?;
    move_job(store.as_ref(), "job-abc", JobStateType::InProgress).await?;

    let conditions = [
        UpdateCondition::expect_state(JobStateType::New),
        UpdateCondition::expect_version(1),
        UpdateCondition::any().and_not(JobStateType::InProgress),
        UpdateCondition::expect_state(JobStateType::InProgress).and_version(3),
    ];
    for condition in conditions {
        let err = store
            .update_job_state(
                UpdateJobStateRequest::new("job-abc", JobStateType::Completed)
                    .with_condition(condition),
            )
            .await
            .unwrap_err();
        assert!(err.is_condition_mismatch(), "unexpected error: {}", err);
    }

    let state = store.get_job_state("job-abc").await?;
    assert_eq!((state.state, state.version), (JobStateType::InProgress, 2));

    let state = store
        .update_job_state(
            UpdateJobStateRequest::new("job-abc", JobStateType::Completed).with_condition(
                UpdateCondition::expect_state(JobStateType::InProgress).and_version(2),
            ),
        )
        .await?;
    assert_eq!(state.version, 3);
    Ok(())
}

async fn execution_lifecycle_scenario(store: Arc<dyn JobStore>) -> Result<()> {
    store.create_job(test_job("job-abc")).await?;
    let id = ExecutionId::new("job-abc", "node-1", "exec-1");

    let created = store.create_execution(id.clone(), ExecutionStateType::New).await?;
    assert_eq!(created.version, 1);

    let accepted = store
        .update_execution(UpdateExecutionRequest::to_state(
            id.clone(),
            ExecutionStateType::BidAccepted,
        ))
        .await?;
    assert_eq!(accepted.version, 2);

    move_execution(store.as_ref(), &id, ExecutionStateType::Completed).await?;

    let err = store
        .update_execution(UpdateExecutionRequest::to_state(
            id.clone(),
            ExecutionStateType::Failed,
        ))
        .await
        .unwrap_err();
    assert!(
        matches!(err, JobStoreError::ExecutionAlreadyTerminal { .. }),
        "unexpected error: {}",
        err
    );

    let latest = store.get_execution(&id).await?;
    assert_eq!((latest.state, latest.version), (ExecutionStateType::Completed, 3));
    Ok(())
}

async fn execution_updates_merge(store: Arc<dyn JobStore>) -> Result<()> {
    store.create_job(test_job("job-abc")).await?;
    let id = exec_id("job-abc", "exec-1");
    store
        .create_execution(id.clone(), ExecutionStateType::BidAccepted)
        .await?;

    let output = RunCommandResult {
        stdout: "hello".into(),
        exit_code: 0,
        ..Default::default()
    };
    let proposed = store
        .update_execution(
            UpdateExecutionRequest::new(
                id.clone(),
                ExecutionUpdate {
                    state: Some(ExecutionStateType::ResultProposed),
                    run_output: Some(output.clone()),
                    published_result: Some("ipfs://QmResult".into()),
                    ..Default::default()
                },
            )
            .with_comment("result proposed"),
        )
        .await?;
    assert_eq!(proposed.run_output.as_ref(), Some(&output));

    // A state-only update keeps everything set before
    let accepted = store
        .update_execution(
            UpdateExecutionRequest::to_state(id.clone(), ExecutionStateType::ResultAccepted)
                .with_condition(UpdateCondition::expect_state(
                    ExecutionStateType::ResultProposed,
                )),
        )
        .await?;
    assert_eq!(accepted.version, 3);
    assert_eq!(accepted.run_output, Some(output));
    assert_eq!(accepted.published_result.as_deref(), Some("ipfs://QmResult"));
    assert_eq!(store.get_execution(&id).await?, accepted);

    let history = store
        .get_job_history("job-abc", &JobHistoryFilter::default())
        .await?;
    assert!(history.iter().any(|entry| entry.comment == "result proposed"));
    Ok(())
}

async fn execution_errors(store: Arc<dyn JobStore>) -> Result<()> {
    let missing_job = exec_id("job-missing", "exec-1");
    let err = store
        .create_execution(missing_job, ExecutionStateType::New)
        .await
        .unwrap_err();
    assert!(matches!(err, JobStoreError::JobNotFound(_)), "unexpected error: {}", err);

    store.create_job(test_job("job-abc")).await?;
    let id = exec_id("job-abc", "exec-1");
    store.create_execution(id.clone(), ExecutionStateType::New).await?;
    let err = store
        .create_execution(id.clone(), ExecutionStateType::AskForBid)
        .await
        .unwrap_err();
    assert!(err.is_already_exists(), "unexpected error: {}", err);
    assert_eq!(store.get_execution(&id).await?.state, ExecutionStateType::New);

    let unknown = exec_id("job-abc", "exec-2");
    assert!(store.get_execution(&unknown).await.unwrap_err().is_not_found());
    let err = store
        .update_execution(UpdateExecutionRequest::to_state(
            unknown,
            ExecutionStateType::AskForBid,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, JobStoreError::ExecutionNotFound(_)), "unexpected error: {}", err);
    Ok(())
}

async fn executions_report_latest_versions(store: Arc<dyn JobStore>) -> Result<()> {
    store.create_job(test_job("job-abc")).await?;
    store.create_job(test_job("job-abd")).await?;

    let first = exec_id("job-abc", "exec-1");
    let second = ExecutionId::new("job-abc", "node-2", "exec-1");
    let other_job = exec_id("job-abd", "exec-1");
    for id in [&first, &second, &other_job] {
        store.create_execution(id.clone(), ExecutionStateType::AskForBid).await?;
    }
    move_execution(store.as_ref(), &first, ExecutionStateType::AskForBidAccepted).await?;
    move_execution(store.as_ref(), &first, ExecutionStateType::BidAccepted).await?;
    move_execution(store.as_ref(), &second, ExecutionStateType::AskForBidRejected).await?;

    let mut executions = store.get_executions("job-abc").await?;
    executions.sort_by(|a, b| a.id.cmp(&b.id));
    let summary: Vec<(ExecutionId, ExecutionStateType, u64)> = executions
        .into_iter()
        .map(|execution| (execution.id, execution.state, execution.version))
        .collect();
    assert_eq!(
        summary,
        vec![
            (first, ExecutionStateType::BidAccepted, 3),
            (second, ExecutionStateType::AskForBidRejected, 2),
        ]
    );
    Ok(())
}

async fn history_completeness_and_filters(store: Arc<dyn JobStore>) -> Result<()> {
    store.create_job(test_job("job-abc")).await?;
    move_job(store.as_ref(), "job-abc", JobStateType::InProgress).await?;

    let first = exec_id("job-abc", "exec-1");
    let second = exec_id("job-abc", "exec-2");
    store.create_execution(first.clone(), ExecutionStateType::AskForBid).await?;
    store.create_execution(second.clone(), ExecutionStateType::AskForBid).await?;
    move_execution(store.as_ref(), &first, ExecutionStateType::AskForBidAccepted).await?;
    move_execution(store.as_ref(), &second, ExecutionStateType::AskForBidRejected).await?;
    move_job(store.as_ref(), "job-abc", JobStateType::Completed).await?;

    let all = store
        .get_job_history("job-abc", &JobHistoryFilter::default())
        .await?;
    assert_eq!(all.len(), 7);
    assert!(all.windows(2).all(|pair| pair[0].time <= pair[1].time));
    assert_eq!(all[0].comment, "job created");

    let job_only = store
        .get_job_history(
            "job-abc",
            &JobHistoryFilter {
                exclude_execution_level: true,
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(job_only.len(), 3);
    assert!(job_only.iter().all(|entry| entry.is_job_level()));

    let executions_only = store
        .get_job_history(
            "job-abc",
            &JobHistoryFilter {
                exclude_job_level: true,
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(executions_only.len(), 4);
    assert_eq!(job_only.len() + executions_only.len(), all.len());

    let one_execution = store
        .get_job_history(
            "job-abc",
            &JobHistoryFilter {
                exclude_job_level: true,
                execution_id: Some(first.clone()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(one_execution.len(), 2);
    assert!(one_execution
        .iter()
        .all(|entry| entry.execution_id() == Some(&first)));

    let since = all[3].time;
    let recent = store
        .get_job_history(
            "job-abc",
            &JobHistoryFilter {
                since: Some(since),
                ..Default::default()
            },
        )
        .await?;
    let expected = all.iter().filter(|entry| entry.time >= since).count();
    assert_eq!(recent.len(), expected);
    assert!(recent.len() >= 4);

    let future = store
        .get_job_history(
            "job-abc",
            &JobHistoryFilter {
                since: Some(Utc::now() + Duration::hours(1)),
                ..Default::default()
            },
        )
        .await?;
    assert!(future.is_empty());
    Ok(())
}

async fn concurrent_execution_updates(store: Arc<dyn JobStore>) -> Result<()> {
    store.create_job(test_job("job-abc")).await?;

    for round in 0..10 {
        let id = exec_id("job-abc", &format!("exec-{}", round));
        store.create_execution(id.clone(), ExecutionStateType::AskForBid).await?;

        let accept = {
            let store = store.clone();
            let request = UpdateExecutionRequest::to_state(
                id.clone(),
                ExecutionStateType::AskForBidAccepted,
            )
            .with_condition(UpdateCondition::expect_version(1));
            tokio::spawn(async move { store.update_execution(request).await })
        };
        let bid = {
            let store = store.clone();
            let request = UpdateExecutionRequest::to_state(
                id.clone(),
                ExecutionStateType::BidAccepted,
            )
            .with_condition(UpdateCondition::expect_version(1));
            tokio::spawn(async move { store.update_execution(request).await })
        };

        let (accept, bid) = tokio::join!(accept, bid);
        let outcomes = [accept?, bid?];
        let winners: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "round {}: {:?}", round, outcomes);
        let loser = outcomes
            .iter()
            .find_map(|r| r.as_ref().err())
            .expect("one update must lose");
        assert!(loser.is_condition_mismatch(), "unexpected error: {}", loser);

        let latest = store.get_execution(&id).await?;
        assert_eq!(latest.version, 2);
        assert_eq!(&latest, winners[0]);
    }

    let history = store
        .get_job_history("job-abc", &JobHistoryFilter::default())
        .await?;
    AuditTrail::replay(&history)?;
    assert_eq!(history.len(), 1 + 10 * 2);
    Ok(())
}

async fn concurrent_job_updates(store: Arc<dyn JobStore>) -> Result<()> {
    store.create_job(test_job("job-abc")).await?;

    let mut handles = Vec::new();
    // Non-terminal targets so every loser sees a condition mismatch
    for state in [
        JobStateType::InProgress,
        JobStateType::PartialError,
        JobStateType::InProgress,
        JobStateType::PartialError,
    ] {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .update_job_state(
                    UpdateJobStateRequest::new("job-abc", state)
                        .with_condition(UpdateCondition::expect_state(JobStateType::New)),
                )
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await? {
            Ok(state) => {
                assert_eq!(state.version, 2);
                succeeded += 1;
            }
            Err(err) => assert!(err.is_condition_mismatch(), "unexpected error: {}", err),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(store.get_job_state("job-abc").await?.version, 2);
    Ok(())
}

async fn in_progress_jobs(store: Arc<dyn JobStore>) -> Result<()> {
    let base = Utc::now() - Duration::minutes(10);
    for (offset, id) in ["job-new", "job-running", "job-partial", "job-done", "job-cancelled"]
        .iter()
        .enumerate()
    {
        let mut job = test_job(id);
        job.metadata.created_at = base + Duration::seconds(offset as i64);
        store.create_job(job).await?;
    }
    move_job(store.as_ref(), "job-running", JobStateType::InProgress).await?;
    move_job(store.as_ref(), "job-partial", JobStateType::InProgress).await?;
    move_job(store.as_ref(), "job-partial", JobStateType::PartialError).await?;
    move_job(store.as_ref(), "job-done", JobStateType::InProgress).await?;
    move_job(store.as_ref(), "job-done", JobStateType::Completed).await?;
    move_job(store.as_ref(), "job-cancelled", JobStateType::Cancelled).await?;

    let id = exec_id("job-running", "exec-1");
    store.create_execution(id.clone(), ExecutionStateType::BidAccepted).await?;

    let in_progress = store.get_in_progress_jobs().await?;
    let ids: Vec<&str> = in_progress.iter().map(|info| info.job.id.as_str()).collect();
    assert_eq!(ids, vec!["job-new", "job-running", "job-partial"]);

    let running = &in_progress[1];
    assert_eq!(running.state.state, JobStateType::InProgress);
    assert_eq!(running.executions.len(), 1);
    assert_eq!(running.executions[0].id, id);
    assert_eq!(running.history.len(), 3);

    let partial = &in_progress[2];
    assert_eq!(partial.state.state, JobStateType::PartialError);
    assert!(partial.executions.is_empty());

    // PartialError may still move on
    move_job(store.as_ref(), "job-partial", JobStateType::Completed).await?;
    assert_eq!(store.get_in_progress_jobs().await?.len(), 2);
    Ok(())
}

async fn prefix_lookup(store: Arc<dyn JobStore>) -> Result<()> {
    for id in ["job-ab", "job-abc", "job-abd", "job-xyz"] {
        store.create_job(test_job(id)).await?;
    }
    move_job(store.as_ref(), "job-xyz", JobStateType::InProgress).await?;

    assert_eq!(store.get_job("job-ab").await?.id, "job-ab");
    assert_eq!(store.get_job("job-x").await?.id, "job-xyz");
    assert_eq!(store.get_job_state("job-xy").await?.version, 2);
    assert_eq!(
        store
            .get_job_history("job-x", &JobHistoryFilter::default())
            .await?
            .len(),
        2
    );

    match store.get_job("job-a").await {
        Err(JobStoreError::AmbiguousJobId { prefix, matches }) => {
            assert_eq!(prefix, "job-a");
            assert_eq!(matches, vec!["job-ab", "job-abc", "job-abd"]);
        }
        other => panic!("expected an ambiguous prefix, got {:?}", other.map(|job| job.id)),
    }
    assert!(store.get_job("job-q").await.unwrap_err().is_not_found());
    assert!(store.get_job_state("").await.is_err());

    let err = store
        .update_job_state(UpdateJobStateRequest::new("job-x", JobStateType::Completed))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "writes take full IDs: {}", err);
    Ok(())
}

async fn job_queries(store: Arc<dyn JobStore>) -> Result<()> {
    let base = Utc::now() - Duration::hours(1);
    let fixtures = [
        ("job-c", "alice", vec!["gpu"], 0),
        ("job-a", "alice", vec![], 1),
        ("job-d", "bob", vec!["gpu", "batch"], 2),
        ("job-b", "alice", vec!["batch"], 3),
    ];
    for (id, client, tags, minutes) in fixtures {
        let mut job = Job::new(id, client, JobSpec::default());
        job.spec.annotations = tags.into_iter().map(String::from).collect();
        job.metadata.created_at = base + Duration::minutes(minutes);
        store.create_job(job).await?;
    }

    let ids = |jobs: Vec<Job>| jobs.into_iter().map(|job| job.id).collect::<Vec<_>>();

    let all = store.get_jobs(&JobQuery::default()).await?;
    assert_eq!(ids(all), vec!["job-c", "job-a", "job-d", "job-b"]);

    let alice = store
        .get_jobs(&JobQuery {
            client_id: Some("alice".into()),
            sort_by: JobSortBy::Id,
            ..Default::default()
        })
        .await?;
    assert_eq!(ids(alice), vec!["job-a", "job-b", "job-c"]);

    let gpu_not_batch = store
        .get_jobs(&JobQuery {
            include_tags: vec!["gpu".into()],
            exclude_tags: vec!["batch".into()],
            ..Default::default()
        })
        .await?;
    assert_eq!(ids(gpu_not_batch), vec!["job-c"]);

    let page = store
        .get_jobs(&JobQuery {
            sort_by: JobSortBy::Id,
            sort_reverse: true,
            offset: 1,
            limit: Some(2),
            ..Default::default()
        })
        .await?;
    assert_eq!(ids(page), vec!["job-c", "job-b"]);
    Ok(())
}

macro_rules! contract_suite {
    ($backend:ident, $factory:path) => {
        mod $backend {
            use super::*;

            contract_suite!(@tests $factory;
                job_lifecycle_scenario,
                idempotent_creation,
                version_monotonicity,
                terminal_job_immutability,
                failed_condition_writes_nothing,
                execution_lifecycle_scenario,
                execution_updates_merge,
                execution_errors,
                executions_report_latest_versions,
                history_completeness_and_filters,
                concurrent_execution_updates,
                concurrent_job_updates,
                in_progress_jobs,
                prefix_lookup,
                job_queries,
            );
        }
    };
    (@tests $factory:path; $($check:ident),* $(,)?) => {
        $(
            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn $check() -> Result<()> {
                let (_tmp, store) = $factory()?;
                super::$check(store).await
            }
        )*
    };
}

contract_suite!(memory, super::memory_store);
contract_suite!(rocksdb, super::rocksdb_store);
contract_suite!(sqlite, super::sqlite_store);

#[tokio::test]
async fn test_rocksdb_store_survives_reopen() -> Result<()> {
    let tmp = TempDir::new()?;
    {
        let store = RocksDbJobStore::open_rocksdb(tmp.path())?;
        store.create_job(test_job("job-abc")).await?;
        move_job(&store, "job-abc", JobStateType::InProgress).await?;
        store
            .create_execution(exec_id("job-abc", "exec-1"), ExecutionStateType::New)
            .await?;
    }

    let store = RocksDbJobStore::open_rocksdb(tmp.path())?;
    assert_eq!(store.get_job_state("job-abc").await?.version, 2);
    move_job(&store, "job-abc", JobStateType::Completed).await?;

    let history = store
        .get_job_history("job-abc", &JobHistoryFilter::default())
        .await?;
    assert_eq!(history.len(), 4);
    assert_eq!(
        AuditTrail::replay(&history)?.job,
        Some((JobStateType::Completed, 3))
    );
    Ok(())
}

#[tokio::test]
async fn test_sqlite_store_survives_reopen() -> Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("jobs.db");
    {
        let store = SqliteJobStore::open_sqlite(&path)?;
        store.create_job(test_job("job-abc")).await?;
        store
            .create_execution(exec_id("job-abc", "exec-1"), ExecutionStateType::BidAccepted)
            .await?;
    }

    let store = SqliteJobStore::open_sqlite(&path)?;
    let execution = store
        .update_execution(UpdateExecutionRequest::to_state(
            exec_id("job-abc", "exec-1"),
            ExecutionStateType::ResultProposed,
        ))
        .await?;
    assert_eq!(execution.version, 2);
    assert_eq!(store.get_in_progress_jobs().await?.len(), 1);
    Ok(())
}
