//! Worker creation
//!
//! The orchestrator requests worker creation through the [`WorkerSpawner`]
//! seam and only continues once the worker reports readiness. Two
//! implementations: one OS process per worker (readiness signalled by a
//! sentinel line on the child's stdout), and one detached task per worker
//! for single-process deployments.

use crate::error::SwarmError;
use crate::worker::WorkerBootstrap;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Line a worker prints on stdout once it has decoded its bootstrap and
/// is ready to receive further messages.
pub const READY_SENTINEL: &str = "SWARM_WORKER_READY";

/// How workers are hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardingMode {
    /// One OS process per worker group
    Processes,
    /// One detached tokio task per worker group
    Tasks,
}

impl FromStr for ShardingMode {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processes" => Ok(Self::Processes),
            "tasks" => Ok(Self::Tasks),
            other => Err(SwarmError::Config(format!(
                "SWARM_MODE must be \"processes\" or \"tasks\", got \"{other}\""
            ))),
        }
    }
}

impl std::fmt::Display for ShardingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processes => write!(f, "processes"),
            Self::Tasks => write!(f, "tasks"),
        }
    }
}

/// Everything a spawner needs to bring up one worker.
#[derive(Debug, Clone)]
pub struct SpawnDescriptor {
    /// Group index; workers are created and registered in this order
    pub index: usize,
    /// This group's shard IDs
    pub shard_ids: Vec<u64>,
    /// Total shard count across the deployment
    pub total_shards: u64,
    /// Executable the worker runs (ignored by task spawners)
    pub entry: PathBuf,
    pub mode: ShardingMode,
    /// Bootstrap environment, including both identities
    pub env: HashMap<String, String>,
}

/// A running worker, however it is hosted.
#[derive(Debug)]
pub enum SpawnedWorker {
    Process(Child),
    Task(JoinHandle<()>),
}

/// A spawned worker registered by the orchestrator.
#[derive(Debug)]
pub struct WorkerHandle {
    pub index: usize,
    /// The worker's composite identity, as handed to it at spawn time
    pub identity: String,
    pub shard_ids: Vec<u64>,
    worker: SpawnedWorker,
}

impl WorkerHandle {
    pub fn new(index: usize, identity: String, shard_ids: Vec<u64>, worker: SpawnedWorker) -> Self {
        Self {
            index,
            identity,
            shard_ids,
            worker,
        }
    }

    /// Wait for the worker to exit on its own.
    pub async fn wait(&mut self) {
        match &mut self.worker {
            SpawnedWorker::Process(child) => match child.wait().await {
                Ok(status) => info!(index = self.index, %status, "Worker exited"),
                Err(e) => warn!(index = self.index, error = %e, "Failed to wait on worker"),
            },
            SpawnedWorker::Task(handle) => {
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        warn!(index = self.index, error = %e, "Worker task failed");
                    }
                }
            }
        }
    }

    /// Terminate the worker.
    pub async fn shutdown(&mut self) {
        match &mut self.worker {
            SpawnedWorker::Process(child) => {
                if let Err(e) = child.kill().await {
                    warn!(index = self.index, error = %e, "Failed to kill worker");
                }
            }
            SpawnedWorker::Task(handle) => handle.abort(),
        }
    }
}

/// Worker creation seam: returns once the worker is ready for further
/// messages. Failures propagate to the orchestrator and abort the
/// remaining groups.
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self, descriptor: &SpawnDescriptor) -> Result<SpawnedWorker, SwarmError>;
}

/// Spawns one OS process per worker group.
///
/// The child inherits the descriptor environment and signals readiness by
/// printing [`READY_SENTINEL`] on stdout; output after the sentinel is
/// forwarded to the log.
pub struct ProcessSpawner {
    ready_timeout: Duration,
}

impl ProcessSpawner {
    pub fn new(ready_timeout: Duration) -> Self {
        Self { ready_timeout }
    }
}

impl Default for ProcessSpawner {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl WorkerSpawner for ProcessSpawner {
    async fn spawn(&self, descriptor: &SpawnDescriptor) -> Result<SpawnedWorker, SwarmError> {
        let index = descriptor.index;

        let mut child = Command::new(&descriptor.entry)
            .envs(&descriptor.env)
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SwarmError::WorkerSpawn {
                index,
                source: Box::new(e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| SwarmError::WorkerSpawn {
            index,
            source: "worker stdout unavailable".into(),
        })?;
        let mut lines = BufReader::new(stdout).lines();

        let wait_ready = async {
            loop {
                let line = lines.next_line().await.map_err(|e| SwarmError::WorkerSpawn {
                    index,
                    source: Box::new(e),
                })?;
                match line {
                    Some(line) if line.trim() == READY_SENTINEL => return Ok(()),
                    Some(line) => debug!(worker_index = index, line = %line, "Worker output"),
                    None => {
                        return Err(SwarmError::WorkerSpawn {
                            index,
                            source: "worker exited before signalling readiness".into(),
                        })
                    }
                }
            }
        };

        match tokio::time::timeout(self.ready_timeout, wait_ready).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(SwarmError::WorkerSpawn {
                    index,
                    source: "timed out waiting for worker readiness".into(),
                })
            }
        }

        // Keep draining the child's stdout so it never blocks on a full pipe.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(worker_index = index, line = %line, "Worker output");
            }
        });

        Ok(SpawnedWorker::Process(child))
    }
}

/// Runs each worker group as a detached task inside this process.
///
/// The entry closure receives the decoded bootstrap; readiness is
/// immediate since the task shares the parent's runtime.
pub struct TaskSpawner<F> {
    entry: F,
}

impl<F> TaskSpawner<F> {
    pub fn new(entry: F) -> Self {
        Self { entry }
    }
}

#[async_trait]
impl<F, Fut> WorkerSpawner for TaskSpawner<F>
where
    F: Fn(WorkerBootstrap) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn spawn(&self, descriptor: &SpawnDescriptor) -> Result<SpawnedWorker, SwarmError> {
        let bootstrap =
            WorkerBootstrap::from_env_map(&descriptor.env).map_err(|e| SwarmError::WorkerSpawn {
                index: descriptor.index,
                source: Box::new(e),
            })?;
        let handle = tokio::spawn((self.entry)(bootstrap));
        Ok(SpawnedWorker::Task(handle))
    }
}
