//! Swarm Gateway - sharded gateway orchestrator
//!
//! One binary, two roles decided by the spawn environment:
//! - top-level: partitions the shard space and spawns one worker per
//!   group with a staggered cooldown
//! - worker: decodes its bootstrap, signals readiness, and drains its
//!   serial connection queue

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use swarm_gateway::config::GatewayConfig;
use swarm_gateway::gateway::api::HttpGatewayApi;
use swarm_gateway::metrics::SwarmMetrics;
use swarm_gateway::sharding::orchestrator::{ExecutionContext, Orchestrator};
use swarm_gateway::sharding::spawner::{ProcessSpawner, ShardingMode, TaskSpawner};
use swarm_gateway::worker::{self, WorkerBootstrap};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first to get log level
    let config = GatewayConfig::from_env()?;

    // Initialize tracing with configured log level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("swarm_gateway={}", config.log_level).parse()?)
                .add_directive("twilight_gateway=info".parse()?)
                .add_directive("twilight_http=warn".parse()?),
        )
        .json()
        .init();

    match WorkerBootstrap::from_process_env()? {
        Some(bootstrap) => run_worker(bootstrap, config).await,
        None => run_orchestrator(config).await,
    }
}

/// Worker role: the orchestrator marker is present in the environment.
async fn run_worker(bootstrap: WorkerBootstrap, config: GatewayConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        index = bootstrap.index,
        shards = bootstrap.shard_ids.len(),
        "Starting swarm gateway worker"
    );

    let metrics = Arc::new(SwarmMetrics::new());
    worker::run(bootstrap, config, Some(metrics)).await?;
    Ok(())
}

/// Top-level role: spawn one worker per shard group, then park until a
/// shutdown signal and take the workers down with us.
async fn run_orchestrator(config: GatewayConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        shards = %config.shards,
        shards_per_worker = config.shards_per_worker,
        mode = %config.mode,
        "Starting swarm gateway orchestrator"
    );

    let metrics = Arc::new(SwarmMetrics::new());
    let gateway = HttpGatewayApi::new(config.token.clone());
    let context = ExecutionContext::detect();
    let options = config.orchestrator_options();

    match config.mode {
        ShardingMode::Processes => {
            let mut orchestrator =
                Orchestrator::new(context, options, ProcessSpawner::default(), gateway)?
                    .with_metrics(Arc::clone(&metrics));
            orchestrator.spawn().await?;

            worker::shutdown_signal().await;
            info!("Shutdown signal received");
            orchestrator.shutdown_all().await;
        }
        ShardingMode::Tasks => {
            // Task-mode workers share this process; give them clones of the
            // one installed recorder.
            let worker_config = config.clone();
            let worker_metrics = Arc::clone(&metrics);
            let spawner = TaskSpawner::new(move |bootstrap: WorkerBootstrap| {
                let config = worker_config.clone();
                let metrics = Arc::clone(&worker_metrics);
                async move {
                    if let Err(e) = worker::run(bootstrap, config, Some(metrics)).await {
                        error!(error = %e, "Worker task failed");
                    }
                }
            });

            let mut orchestrator = Orchestrator::new(context, options, spawner, gateway)?
                .with_metrics(Arc::clone(&metrics));
            orchestrator.spawn().await?;

            worker::shutdown_signal().await;
            info!("Shutdown signal received");
            orchestrator.shutdown_all().await;
        }
    }

    info!("Orchestrator shutdown complete");
    Ok(())
}
