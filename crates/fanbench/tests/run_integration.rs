//! Integration tests for the full run pipeline
//!
//! These tests assemble the master-side pipeline from public pieces: real
//! worker processes served over in-memory sockets, slave pools served over
//! real TCP, and the same manager the master role drives.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use fanbench::benchmark::{Benchmark, BenchmarkDefine};
use fanbench::manager::{CompletionReceiver, WorkerManager};
use fanbench::report::{Aggregator, Report};
use fanbench::slave::Slave;
use fanbench::slave_runner::SlavePool;
use fanbench::worker::Worker;
use fanbench::worker_process::WorkerProcess;
use fanbench::{APP_VERSION, BenchmarkConfig};
use fanbench_common::{BenchmarkTestResult, ValidationInfo};
use fanbench_rpc::MessageSocket;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

fn config(concurrent_request_count: u32) -> BenchmarkConfig {
    BenchmarkConfig {
        title: "integration".into(),
        description: String::new(),
        measurement_interval_seconds: 1,
        duration_seconds: 1,
        concurrent_request_count,
    }
}

fn validation() -> ValidationInfo {
    ValidationInfo {
        app_version: APP_VERSION.to_owned(),
        task_definition_hash: "integration".to_owned(),
    }
}

/// Worker processes served over in-memory sockets, as the master's process
/// manager would wire them up
fn local_workers(define: &BenchmarkDefine, count: usize) -> Vec<Worker> {
    (0..count)
        .map(|_| {
            let process = WorkerProcess::new(define.clone());
            let (socket, peer) = MessageSocket::pair();
            tokio::spawn(process.server().serve(socket));
            Worker::new(peer)
        })
        .collect()
}

/// Serve a slave pool over real TCP for one connection; returns its address
async fn serve_slave_pool(define: &BenchmarkDefine, pool_size: usize) -> String {
    let pool = SlavePool::new(local_workers(define, pool_size), validation());
    let token = CancellationToken::new();
    let server = pool.server(&token);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        server.serve(MessageSocket::from_tcp(stream)).await;
    });
    addr
}

async fn collect_completions(
    completions: &mut CompletionReceiver,
    expected: usize,
) -> Result<Vec<BenchmarkTestResult>> {
    let mut results = Vec::new();
    for _ in 0..expected {
        let event = timeout(Duration::from_secs(5), completions.recv())
            .await?
            .expect("completion stream ended early");
        results.extend(event?);
    }
    Ok(results)
}

/// One-shot task: every unit records a single success and returns
fn one_shot_define(concurrent_request_count: u32) -> BenchmarkDefine {
    BenchmarkDefine::new(
        config(concurrent_request_count),
        |benchmark: Arc<Benchmark>| async move {
            benchmark.test("g").success();
            Ok(())
        },
    )
}

/// Split five units of concurrency across two local workers and a two-worker
/// slave pool, then run to completion and check the report adds up.
#[tokio::test]
async fn test_mixed_pools_run_to_completion() -> Result<()> {
    let define = one_shot_define(5);
    let addr = serve_slave_pool(&define, 2).await;
    let slave = Slave::open(&addr).await?;
    let slave_handle = slave.clone();

    let manager = WorkerManager::new(local_workers(&define, 2), vec![slave]);
    let started_at = Utc::now();

    let assigned = manager.assign(5).await?;
    assert_eq!(assigned, 4, "2 locals + 2 pool members should all get a share");
    assert_eq!(
        slave_handle.assigned_worker_ids(),
        vec![3, 4],
        "remote segment should follow the local ids"
    );

    let mut completions = manager.start().await?;
    let results = collect_completions(&mut completions, assigned).await?;
    assert_eq!(results.len(), 4, "the task runs once per execution unit");
    assert!(results.iter().all(|r| r.is_success()));

    let mut aggregator = Aggregator::new();
    aggregator.add_results(results);
    let report = Report::new(config(5), started_at, Utc::now(), assigned, aggregator);
    assert_eq!(report.assigned_worker_count, 4);
    assert_eq!(report.stats.total.requests, 4);
    assert_eq!(report.stats.total.success_count, 4);
    assert_eq!(report.test_results.len(), 4);
    Ok(())
}

/// Drain mid-run, then finish; buffered and closing results together must
/// cover everything the task recorded on both sides of the wire.
#[tokio::test]
async fn test_fetch_and_finish_across_pools() -> Result<()> {
    let define = BenchmarkDefine::new(config(2), |benchmark: Arc<Benchmark>| async move {
        benchmark.test("during").success();
        while benchmark.running() {
            sleep(Duration::from_millis(5)).await;
        }
        benchmark.test("closing").success();
        Ok(())
    });
    let addr = serve_slave_pool(&define, 1).await;
    let slave = Slave::open(&addr).await?;

    let manager = WorkerManager::new(local_workers(&define, 1), vec![slave]);
    let assigned = manager.assign(2).await?;
    assert_eq!(assigned, 2);

    let mut completions = manager.start().await?;
    sleep(Duration::from_millis(100)).await;

    let drained = manager.fetch_test_results().await?;
    assert_eq!(drained.len(), 2, "one buffered result per pool");
    assert!(drained.iter().all(|r| r.group == "during"));

    manager.finish().await?;
    let closing = collect_completions(&mut completions, assigned).await?;
    assert_eq!(closing.len(), 2);
    assert!(closing.iter().all(|r| r.group == "closing"));

    let mut aggregator = Aggregator::new();
    aggregator.add_results(drained);
    aggregator.add_results(closing);
    let stats = aggregator.aggregate(1000, None, None);
    assert_eq!(stats.total.requests, 4);
    let groups: Vec<&str> = stats.groups.iter().map(|g| g.group.as_str()).collect();
    assert_eq!(groups, vec!["during", "closing"]);
    Ok(())
}

/// A task failure on the far side of the slave hop must surface as an error
/// completion event, message intact.
#[tokio::test]
async fn test_remote_task_failure_reaches_completions() -> Result<()> {
    let define = BenchmarkDefine::new(config(1), |_b| async move {
        Err(anyhow::anyhow!("boom"))
    });
    let addr = serve_slave_pool(&define, 1).await;
    let slave = Slave::open(&addr).await?;

    let manager = WorkerManager::new(Vec::new(), vec![slave]);
    manager.assign(1).await?;
    let mut completions = manager.start().await?;

    let event = timeout(Duration::from_secs(5), completions.recv())
        .await?
        .expect("completion stream ended early");
    let err = event.expect_err("failing task should produce an error event");
    assert!(
        format!("{err:#}").contains("boom"),
        "task error message should survive both hops: {err:#}"
    );
    Ok(())
}

/// The fingerprint of the running executable must agree with itself and
/// survive the trip through a slave's validation endpoint.
#[tokio::test]
async fn test_validation_round_trip() -> Result<()> {
    let local = ValidationInfo::for_current_exe(APP_VERSION)?;
    let again = ValidationInfo::for_current_exe(APP_VERSION)?;
    assert!(local.matches(&again), "same binary should match itself");

    let other = ValidationInfo {
        app_version: "0.0.0-other".to_owned(),
        task_definition_hash: local.task_definition_hash.clone(),
    };
    assert!(!local.matches(&other), "different version must not match");

    let define = one_shot_define(1);
    let addr = serve_slave_pool(&define, 1).await;
    let slave = Slave::open(&addr).await?;
    let remote = slave.validation_info().await?;
    assert_eq!(remote.app_version, APP_VERSION);
    assert_eq!(remote.task_definition_hash, "integration");
    Ok(())
}
