//! Spawns and owns the local worker child processes
//!
//! Workers are copies of the current executable diverted into worker mode
//! through [`WORKER_ENV`]. Each child talks RPC over its piped stdin/stdout;
//! stderr stays inherited so worker logs land on the parent's terminal.
//! Children are killed when the manager drops.

use std::process::Stdio;

use anyhow::Context;
use fanbench_rpc::MessageSocket;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::worker::Worker;
use crate::worker_process::WORKER_ENV;

pub struct ProcessManager {
    // Held to keep kill_on_drop armed for the run's lifetime
    _children: Vec<Child>,
    workers: Vec<Worker>,
}

impl ProcessManager {
    /// Spawn `count` children of the current executable in worker mode
    pub fn spawn_workers(count: usize) -> anyhow::Result<Self> {
        let exe = std::env::current_exe().context("failed to resolve current executable")?;
        debug!(count, exe = %exe.display(), "spawning worker processes");

        let mut children = Vec::with_capacity(count);
        let mut workers = Vec::with_capacity(count);
        for _ in 0..count {
            let mut child = Command::new(&exe)
                .env(WORKER_ENV, "1")
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .spawn()
                .context("failed to spawn worker process")?;
            let socket = MessageSocket::from_child(&mut child)?;
            children.push(child);
            workers.push(Worker::new(socket));
        }

        Ok(Self {
            _children: children,
            workers,
        })
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}
