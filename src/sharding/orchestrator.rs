//! Worker orchestrator
//!
//! The top level of the two-tier bring-up: partitions the shard space
//! into per-worker groups and spawns one worker per group, staggering
//! creation so consecutive identify handshakes stay under the gateway's
//! session-start rate limit.

use crate::error::SwarmError;
use crate::gateway::api::GatewayApi;
use crate::metrics::SwarmMetrics;
use crate::sharding::resolve::{into_chunks, ShardSpec};
use crate::sharding::spawner::{ShardingMode, SpawnDescriptor, WorkerHandle, WorkerSpawner};
use crate::snowflake::{SnowflakeGenerator, ORCHESTRATOR_MARKER_ID};
use crate::worker::{WorkerBootstrap, ORCHESTRATOR_ID_ENV};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Where this code is running.
///
/// Exactly one orchestrator may exist per deployment, always in the
/// top-level context; spawned workers carry a marker that forbids
/// constructing another one inside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    TopLevel,
    Worker,
}

impl ExecutionContext {
    /// Detect the context from the orchestrator-identity marker, which is
    /// set only in the environment of spawned workers.
    pub fn detect() -> Self {
        if std::env::var_os(ORCHESTRATOR_ID_ENV).is_some() {
            Self::Worker
        } else {
            Self::TopLevel
        }
    }

    pub fn is_worker(&self) -> bool {
        matches!(self, Self::Worker)
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// The shard space to distribute
    pub shards: ShardSpec,
    /// Group size; zero behaves as 1
    pub shards_per_worker: usize,
    /// Executable spawned for each worker group
    pub entry: PathBuf,
    pub mode: ShardingMode,
}

/// Cooldown between consecutive worker creations.
///
/// The gateway rate-limits consecutive identify handshakes; delaying whole
/// workers by their group's worth of identify slots (plus one spare) bounds
/// the rate regardless of worker startup latency.
pub fn spawn_cooldown(group_size: usize) -> Duration {
    Duration::from_millis(group_size as u64 * 5000 + 5000)
}

/// Top-level worker orchestrator.
///
/// Owns the shard partitioning, the per-worker identities and the ordered
/// registry of running workers.
pub struct Orchestrator<S, G> {
    options: OrchestratorOptions,
    spawner: S,
    gateway: G,
    snowflake: Arc<SnowflakeGenerator>,
    /// Deployment-wide orchestrator identity, generated once and reused
    identity: String,
    workers: BTreeMap<usize, WorkerHandle>,
    metrics: Option<Arc<SwarmMetrics>>,
}

impl<S, G> Orchestrator<S, G>
where
    S: WorkerSpawner,
    G: GatewayApi,
{
    /// Build the orchestrator, refusing to run inside a worker context.
    pub fn new(
        context: ExecutionContext,
        options: OrchestratorOptions,
        spawner: S,
        gateway: G,
    ) -> Result<Self, SwarmError> {
        if context.is_worker() {
            return Err(SwarmError::OrchestrationLoop);
        }

        let snowflake = Arc::new(SnowflakeGenerator::new());
        let identity = snowflake.generate(ORCHESTRATOR_MARKER_ID, process_id())?;

        Ok(Self {
            options,
            spawner,
            gateway,
            snowflake,
            identity,
            workers: BTreeMap::new(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<SwarmMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// This deployment's orchestrator identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Running workers, ordered by group index.
    pub fn workers(&self) -> &BTreeMap<usize, WorkerHandle> {
        &self.workers
    }

    /// Partition the shard space and bring up one worker per group.
    ///
    /// Workers are created strictly in group order, each awaited to
    /// readiness and followed by a cooldown. A creation failure propagates
    /// immediately and aborts the remaining groups; workers already
    /// spawned keep running.
    pub async fn spawn(&mut self) -> Result<(), SwarmError> {
        let shard_ids = self.resolve_shard_ids().await?;
        let group_size = self.options.shards_per_worker.max(1);
        let total_shards = shard_ids.len() as u64;

        info!(
            total_shards,
            group_size,
            mode = %self.options.mode,
            orchestrator_id = %self.identity,
            "Spawning workers"
        );

        let groups: Vec<Vec<u64>> = into_chunks(&shard_ids, group_size)
            .map(<[u64]>::to_vec)
            .collect();

        for (index, group) in groups.into_iter().enumerate() {
            let worker_identity = self.snowflake.generate(index as u64, process_id())?;

            let bootstrap = WorkerBootstrap {
                orchestrator_id: self.identity.clone(),
                worker_id: worker_identity.clone(),
                index,
                shard_ids: group.clone(),
                total_shards,
            };

            let descriptor = SpawnDescriptor {
                index,
                shard_ids: group.clone(),
                total_shards,
                entry: self.options.entry.clone(),
                mode: self.options.mode,
                env: bootstrap.to_env(),
            };

            info!(index, shards = ?group, worker_id = %worker_identity, "Creating worker");

            let worker = self.spawner.spawn(&descriptor).await?;
            self.workers
                .insert(index, WorkerHandle::new(index, worker_identity, group, worker));

            if let Some(ref metrics) = self.metrics {
                metrics.record_worker_spawned(index);
            }

            // The configured group size bounds the cooldown even when the
            // final group is shorter.
            let cooldown = spawn_cooldown(group_size);
            info!(index, cooldown_ms = cooldown.as_millis() as u64, "Worker ready; cooling down");
            tokio::time::sleep(cooldown).await;
        }

        info!(workers = self.workers.len(), "All workers spawned");
        Ok(())
    }

    /// Wait for every worker to exit on its own.
    pub async fn wait_all(&mut self) {
        for worker in self.workers.values_mut() {
            worker.wait().await;
        }
    }

    /// Terminate all workers, in group order.
    pub async fn shutdown_all(&mut self) {
        for worker in self.workers.values_mut() {
            warn!(index = worker.index, "Shutting down worker");
            worker.shutdown().await;
        }
    }

    /// The concrete shard-ID list; consults the gateway only for `auto`.
    async fn resolve_shard_ids(&self) -> Result<Vec<u64>, SwarmError> {
        let recommended = if self.options.shards.is_auto() {
            self.gateway.gateway_info().await?.recommended_shards
        } else {
            0
        };
        Ok(self.options.shards.expand(recommended))
    }
}

fn process_id() -> u64 {
    u64::from(std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_scales_with_group_size() {
        assert_eq!(spawn_cooldown(1), Duration::from_millis(10_000));
        assert_eq!(spawn_cooldown(4), Duration::from_millis(25_000));
        assert_eq!(spawn_cooldown(25), Duration::from_millis(130_000));
    }

    #[test]
    fn top_level_context_is_not_a_worker() {
        assert!(!ExecutionContext::TopLevel.is_worker());
        assert!(ExecutionContext::Worker.is_worker());
    }
}
