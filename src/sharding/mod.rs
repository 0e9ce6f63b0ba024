//! Shard distribution
//!
//! Resolves shard specifications, partitions the shard space into
//! per-worker groups and orchestrates staggered worker bring-up.

pub mod orchestrator;
pub mod resolve;
pub mod spawner;

pub use orchestrator::{spawn_cooldown, ExecutionContext, Orchestrator, OrchestratorOptions};
pub use resolve::{into_chunks, ShardSpec};
pub use spawner::{
    ProcessSpawner, ShardingMode, SpawnDescriptor, SpawnedWorker, TaskSpawner, WorkerHandle,
    WorkerSpawner, READY_SENTINEL,
};
