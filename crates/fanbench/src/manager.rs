//! Fan-out coordinator for the master's execution units
//!
//! Partitions the requested concurrency across local workers and slave
//! pools, then drives the lifecycle of everything that received a share.
//! Locals are always exhausted before any slave capacity is used.

use anyhow::Context;
use fanbench_common::{AssignParam, BenchmarkTestResult, RosterEntry};
use futures::future;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ManagerError;
use crate::slave::Slave;
use crate::worker::Worker;

/// One completion event per assigned execution unit
pub type CompletionReceiver = mpsc::UnboundedReceiver<anyhow::Result<Vec<BenchmarkTestResult>>>;

pub struct WorkerManager {
    workers: Vec<Worker>,
    slaves: Vec<Slave>,
    assigned_workers: Mutex<Vec<Worker>>,
    assigned_slaves: Mutex<Vec<Slave>>,
}

impl WorkerManager {
    pub fn new(workers: Vec<Worker>, slaves: Vec<Slave>) -> Self {
        Self {
            workers,
            slaves,
            assigned_workers: Mutex::new(Vec::new()),
            assigned_slaves: Mutex::new(Vec::new()),
        }
    }

    pub fn slaves(&self) -> &[Slave] {
        &self.slaves
    }

    /// Partition `concurrent_request_count` across every known unit and send
    /// each unit its assignment; returns the number of units that received a
    /// non-zero share.
    ///
    /// The slave walk stops once the cumulative offset passes the surviving
    /// units, leaving later pools untouched. A slave still reached with an
    /// empty segment gets the (empty) `assignWorkers` call and participates
    /// in the run's lifecycle.
    pub async fn assign(&self, concurrent_request_count: u32) -> anyhow::Result<usize> {
        let unit_count =
            self.workers.len() + self.slaves.iter().map(Slave::worker_num).sum::<usize>();
        if unit_count == 0 {
            return Err(ManagerError::WorkerMissing.into());
        }

        let roster = partition(concurrent_request_count, unit_count);
        debug!(units = roster.len(), "partitioned concurrency");

        let local_futures: Vec<_> = self
            .workers
            .iter()
            .zip(&roster)
            .map(|(worker, entry)| worker.assign(AssignParam::new(*entry, roster.clone())))
            .collect();

        let mut slave_futures = Vec::new();
        let mut assigned_slaves = Vec::new();
        let mut offset = self.workers.len();
        for slave in &self.slaves {
            if offset > roster.len() {
                break;
            }
            let segment: Vec<AssignParam> = roster
                .iter()
                .skip(offset)
                .take(slave.worker_num())
                .map(|entry| AssignParam::new(*entry, roster.clone()))
                .collect();
            slave_futures.push(slave.assign_workers(segment));
            assigned_slaves.push(slave.clone());
            offset += slave.worker_num();
        }

        let assign_locals = future::try_join_all(local_futures);
        let assign_slaves = future::try_join_all(slave_futures);
        tokio::try_join!(
            async { assign_locals.await.context("failed to assign local workers") },
            async { assign_slaves.await.context("failed to assign slave workers") },
        )?;

        *self.assigned_workers.lock().unwrap() = self
            .workers
            .iter()
            .take(roster.len())
            .cloned()
            .collect();
        *self.assigned_slaves.lock().unwrap() = assigned_slaves;
        Ok(roster.len())
    }

    /// Start every assigned unit and return the stream of completion events
    ///
    /// Completion waiters are registered before any `start` goes out, so a
    /// unit that finishes instantly is still observed.
    pub async fn start(&self) -> anyhow::Result<CompletionReceiver> {
        let workers = self.assigned_workers.lock().unwrap().clone();
        let slaves = self.assigned_slaves.lock().unwrap().clone();

        let (tx, rx) = mpsc::unbounded_channel();
        for worker in &workers {
            let worker = worker.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = worker.handle_finished().await.map_err(anyhow::Error::from);
                let _ = tx.send(outcome);
            });
        }
        for slave in &slaves {
            for worker_id in slave.assigned_worker_ids() {
                let slave = slave.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = slave
                        .handle_finished(worker_id)
                        .await
                        .map_err(anyhow::Error::from);
                    let _ = tx.send(outcome);
                });
            }
        }
        drop(tx);

        let start_locals = future::try_join_all(workers.iter().map(Worker::start));
        let start_slaves = future::try_join_all(slaves.iter().map(Slave::start));
        tokio::try_join!(
            async { start_locals.await.context("failed to start local workers") },
            async { start_slaves.await.context("failed to start slaves") },
        )?;
        Ok(rx)
    }

    /// Ask every assigned unit to wind down
    pub async fn finish(&self) -> anyhow::Result<()> {
        let workers = self.assigned_workers.lock().unwrap().clone();
        let slaves = self.assigned_slaves.lock().unwrap().clone();

        let finish_locals = future::try_join_all(workers.iter().map(Worker::finish));
        let finish_slaves = future::try_join_all(slaves.iter().map(Slave::finish));
        tokio::try_join!(
            async { finish_locals.await.context("failed to finish local workers") },
            async { finish_slaves.await.context("failed to finish slaves") },
        )?;
        Ok(())
    }

    /// Drain buffered results from every assigned unit, locals first
    pub async fn fetch_test_results(&self) -> anyhow::Result<Vec<BenchmarkTestResult>> {
        let workers = self.assigned_workers.lock().unwrap().clone();
        let slaves = self.assigned_slaves.lock().unwrap().clone();

        let fetch_locals = future::try_join_all(workers.iter().map(Worker::fetch_test_results));
        let fetch_slaves = future::try_join_all(slaves.iter().map(Slave::fetch_test_results));
        let (local_results, slave_results) = tokio::try_join!(
            async { fetch_locals.await.context("failed to fetch local worker results") },
            async { fetch_slaves.await.context("failed to fetch slave results") },
        )?;
        Ok(local_results
            .into_iter()
            .chain(slave_results)
            .flatten()
            .collect())
    }

    /// Ask every connected slave to shut down; failures are logged, not
    /// surfaced, since the run is already over
    pub async fn stop_slaves(&self) {
        for slave in &self.slaves {
            if let Err(e) = slave.stop().await {
                debug!(addr = %slave.addr(), error = %e, "slave stop failed");
            }
        }
    }
}

/// Shares are `floor((n + d) / k)` for `d` in `0..k`: they differ by at most
/// one, sum to `n`, and the larger shares land on the higher slots. Zero
/// shares are dropped before ids are handed out, so when `n < k` exactly `n`
/// units survive with one iteration each.
fn partition(concurrent_request_count: u32, unit_count: usize) -> Vec<RosterEntry> {
    (0..unit_count)
        .map(|d| (concurrent_request_count as usize + d) / unit_count)
        .filter(|share| *share > 0)
        .enumerate()
        .map(|(i, share)| RosterEntry {
            worker_id: (i + 1) as u32,
            request_num: share as u32,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::{Benchmark, BenchmarkDefine};
    use crate::worker_process::WorkerProcess;
    use fanbench_common::BenchmarkConfig;
    use fanbench_rpc::{MessageSocket, RpcServer};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    fn config() -> BenchmarkConfig {
        BenchmarkConfig {
            title: "t".into(),
            description: "d".into(),
            measurement_interval_seconds: 1,
            duration_seconds: 1,
            concurrent_request_count: 3,
        }
    }

    /// Task that records one result per assigned request slot and returns
    fn one_shot_define() -> BenchmarkDefine {
        BenchmarkDefine::new(config(), |benchmark: Arc<Benchmark>| async move {
            for _ in 0..benchmark.request_num() {
                benchmark.test("g").success();
            }
            Ok(())
        })
    }

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

    /// Slave endpoint that records every method the manager sends it
    async fn recording_slave(pool_size: usize) -> (String, Arc<Mutex<Vec<String>>>) {
        let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let mut server = RpcServer::new();
        for method in [
            "getWorkerNum",
            "assignWorkers",
            "start",
            "finish",
            "fetchTestResults",
            "handleFinished",
            "stop",
        ] {
            let calls = Arc::clone(&calls);
            server.method(method, move |_params| {
                calls.lock().unwrap().push(method.to_string());
                let reply = match method {
                    "getWorkerNum" => json!(pool_size),
                    "fetchTestResults" | "handleFinished" => json!([]),
                    _ => Value::Null,
                };
                async move { Ok(reply) }
            });
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            server.serve(MessageSocket::from_tcp(stream)).await;
        });
        (addr, calls)
    }

    #[test]
    fn test_partition_share_properties() {
        let shares: Vec<u32> = partition(10, 3).iter().map(|e| e.request_num).collect();
        assert_eq!(shares, vec![3, 3, 4]);

        for (n, k) in [(0u32, 4usize), (1, 4), (3, 2), (7, 7), (100, 9)] {
            let roster = partition(n, k);
            let total: u32 = roster.iter().map(|e| e.request_num).sum();
            assert_eq!(total, n, "shares must sum to n for n={n} k={k}");
            assert_eq!(
                roster.len(),
                (n as usize).min(k),
                "surviving units for n={n} k={k}"
            );
            let ids: Vec<u32> = roster.iter().map(|e| e.worker_id).collect();
            assert_eq!(ids, (1..=roster.len() as u32).collect::<Vec<_>>());
            if let (Some(max), Some(min)) = (
                roster.iter().map(|e| e.request_num).max(),
                roster.iter().map(|e| e.request_num).min(),
            ) {
                assert!(max - min <= 1, "share spread for n={n} k={k}");
            }
        }
    }

    #[tokio::test]
    async fn test_assign_without_any_workers_fails() {
        let manager = WorkerManager::new(Vec::new(), Vec::new());
        let err = manager.assign(5).await.unwrap_err();
        assert_eq!(err.to_string(), "worker is missing");
    }

    #[tokio::test]
    async fn test_shares_differ_by_at_most_one_and_sum_to_n() {
        let define = one_shot_define();
        let workers = local_workers(&define, 2);
        let manager = WorkerManager::new(workers.clone(), Vec::new());

        let assigned = manager.assign(3).await.unwrap();
        assert_eq!(assigned, 2);
        assert_eq!(workers[0].worker_id(), Some(1));
        assert_eq!(workers[1].worker_id(), Some(2));
    }

    #[tokio::test]
    async fn test_zero_shares_leave_extra_workers_unassigned() {
        let define = one_shot_define();
        let workers = local_workers(&define, 4);
        let manager = WorkerManager::new(workers.clone(), Vec::new());

        let assigned = manager.assign(1).await.unwrap();
        assert_eq!(assigned, 1);
        assert_eq!(workers[0].worker_id(), Some(1));
        for worker in &workers[1..] {
            assert_eq!(worker.worker_id(), None);
        }
    }

    #[tokio::test]
    async fn test_overflowing_local_pool_sends_no_slave_traffic() {
        // Locals alone cover every surviving unit, so the slave walk stops
        // before the first slave: nothing beyond the open handshake may
        // reach it, for assignment or for the rest of the lifecycle.
        let define = one_shot_define();
        let workers = local_workers(&define, 2);
        let (addr, calls) = recording_slave(1).await;
        let slave = Slave::open(&addr).await.unwrap();
        let manager = WorkerManager::new(workers, vec![slave]);

        let assigned = manager.assign(1).await.unwrap();
        assert_eq!(assigned, 1);

        let mut completions = manager.start().await.unwrap();
        let event = timeout(Duration::from_secs(2), completions.recv())
            .await
            .unwrap();
        assert!(event.is_some());
        manager.finish().await.unwrap();
        manager.fetch_test_results().await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["getWorkerNum".to_string()]);
    }

    #[tokio::test]
    async fn test_boundary_slave_still_gets_empty_batch() {
        // Locals exactly cover the survivors; the next slave is still
        // reached, receives an empty batch, and joins the lifecycle fan-out.
        let define = one_shot_define();
        let workers = local_workers(&define, 2);
        let (addr, calls) = recording_slave(1).await;
        let slave = Slave::open(&addr).await.unwrap();
        let manager = WorkerManager::new(workers, vec![slave]);

        let assigned = manager.assign(2).await.unwrap();
        assert_eq!(assigned, 2);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["getWorkerNum".to_string(), "assignWorkers".to_string()]
        );
    }

    #[tokio::test]
    async fn test_completion_event_per_assigned_unit() {
        let define = one_shot_define();
        let workers = local_workers(&define, 2);
        let manager = WorkerManager::new(workers, Vec::new());

        let assigned = manager.assign(3).await.unwrap();
        let mut completions = manager.start().await.unwrap();

        let mut events = 0;
        let mut results = Vec::new();
        while let Some(event) = timeout(Duration::from_secs(2), completions.recv())
            .await
            .unwrap()
        {
            results.extend(event.unwrap());
            events += 1;
            if events == assigned {
                break;
            }
        }
        assert_eq!(events, assigned);
        // one result per unit of concurrency
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_drains_every_assigned_unit() {
        let define = BenchmarkDefine::new(config(), |benchmark: Arc<Benchmark>| async move {
            for _ in 0..benchmark.request_num() {
                benchmark.test("g").success();
            }
            while benchmark.running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(())
        });
        let workers = local_workers(&define, 2);
        let manager = WorkerManager::new(workers, Vec::new());

        manager.assign(3).await.unwrap();
        let mut completions = manager.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let drained = manager.fetch_test_results().await.unwrap();
        assert_eq!(drained.len(), 3);
        assert!(manager.fetch_test_results().await.unwrap().is_empty());

        manager.finish().await.unwrap();
        let first = timeout(Duration::from_secs(2), completions.recv())
            .await
            .unwrap();
        assert!(first.is_some());
    }
}
