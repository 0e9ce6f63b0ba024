//! Worker-side runtime
//!
//! A spawned worker decodes its typed bootstrap from the environment the
//! orchestrator handed it, signals readiness to its parent, then drains
//! its connection queue and serves health endpoints until shutdown.

use crate::config::GatewayConfig;
use crate::error::SwarmError;
use crate::gateway::api::HttpGatewayApi;
use crate::gateway::connector::TwilightConnector;
use crate::gateway::queue::ConnectionQueue;
use crate::gateway::state::ShardState;
use crate::health::{self, AppState};
use crate::metrics::SwarmMetrics;
use crate::sharding::resolve::ShardSpec;
use crate::sharding::spawner::READY_SENTINEL;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Orchestrator identity handed to every spawned worker.
///
/// Doubles as the re-entrancy marker: its presence means this process is a
/// worker, and constructing an orchestrator here is a spawning loop.
pub const ORCHESTRATOR_ID_ENV: &str = "SWARM_ORCHESTRATOR_ID";
/// This worker's own composite identity.
pub const WORKER_ID_ENV: &str = "SWARM_WORKER_ID";
/// Zero-based group index.
pub const WORKER_INDEX_ENV: &str = "SWARM_WORKER_INDEX";
/// Comma-separated shard IDs owned by this worker.
pub const WORKER_SHARDS_ENV: &str = "SWARM_WORKER_SHARDS";
/// Total shard count across the deployment.
pub const TOTAL_SHARDS_ENV: &str = "SWARM_TOTAL_SHARDS";

/// Typed bootstrap parameters for one worker.
///
/// Environment variables are the transport between orchestrator and
/// worker; this struct is the single place they are encoded and decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerBootstrap {
    pub orchestrator_id: String,
    pub worker_id: String,
    pub index: usize,
    pub shard_ids: Vec<u64>,
    pub total_shards: u64,
}

impl WorkerBootstrap {
    /// Encode into the spawn environment.
    pub fn to_env(&self) -> HashMap<String, String> {
        let shard_ids: Vec<String> = self.shard_ids.iter().map(u64::to_string).collect();
        HashMap::from([
            (ORCHESTRATOR_ID_ENV.to_string(), self.orchestrator_id.clone()),
            (WORKER_ID_ENV.to_string(), self.worker_id.clone()),
            (WORKER_INDEX_ENV.to_string(), self.index.to_string()),
            (WORKER_SHARDS_ENV.to_string(), shard_ids.join(",")),
            (TOTAL_SHARDS_ENV.to_string(), self.total_shards.to_string()),
        ])
    }

    /// Decode from an explicit environment map (task-mode workers).
    pub fn from_env_map(env: &HashMap<String, String>) -> Result<Self, SwarmError> {
        Self::from_lookup(|key| env.get(key).cloned())
    }

    /// Decode from this process's environment.
    ///
    /// Returns `Ok(None)` when the orchestrator marker is absent, i.e.
    /// this process is the top-level context.
    pub fn from_process_env() -> Result<Option<Self>, SwarmError> {
        if std::env::var_os(ORCHESTRATOR_ID_ENV).is_none() {
            return Ok(None);
        }
        Self::from_lookup(|key| std::env::var(key).ok()).map(Some)
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, SwarmError> {
        let orchestrator_id = required(&get, ORCHESTRATOR_ID_ENV)?;
        let worker_id = required(&get, WORKER_ID_ENV)?;
        let index = required(&get, WORKER_INDEX_ENV)?
            .parse()
            .map_err(|e| SwarmError::Config(format!("{WORKER_INDEX_ENV} must be a number: {e}")))?;
        let shard_ids = parse_shard_list(&required(&get, WORKER_SHARDS_ENV)?)?;
        let total_shards = required(&get, TOTAL_SHARDS_ENV)?
            .parse()
            .map_err(|e| SwarmError::Config(format!("{TOTAL_SHARDS_ENV} must be a number: {e}")))?;

        Ok(Self {
            orchestrator_id,
            worker_id,
            index,
            shard_ids,
            total_shards,
        })
    }
}

fn required(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, SwarmError> {
    get(key).ok_or_else(|| {
        SwarmError::Config(format!("{key} must be set in a worker environment"))
    })
}

fn parse_shard_list(raw: &str) -> Result<Vec<u64>, SwarmError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|part| {
            part.trim().parse::<u64>().map_err(|_| {
                SwarmError::Config(format!(
                    "invalid shard ID \"{part}\" in {WORKER_SHARDS_ENV}"
                ))
            })
        })
        .collect()
}

/// Run one worker to completion: health server up, readiness signalled,
/// connection queue drained, then park until a shutdown signal.
pub async fn run(
    bootstrap: WorkerBootstrap,
    config: GatewayConfig,
    metrics: Option<Arc<SwarmMetrics>>,
) -> Result<(), SwarmError> {
    info!(
        index = bootstrap.index,
        worker_id = %bootstrap.worker_id,
        orchestrator_id = %bootstrap.orchestrator_id,
        shards = ?bootstrap.shard_ids,
        total_shards = bootstrap.total_shards,
        "Worker starting"
    );

    let state = ShardState::new(
        bootstrap.index,
        bootstrap.shard_ids.iter().copied(),
        bootstrap.total_shards,
    );

    // Offset the port by the group index so co-located workers don't collide.
    let port = config.http_port.wrapping_add(bootstrap.index as u16);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let router = health::router(AppState {
        shard_state: state.clone(),
        metrics: metrics.clone(),
    });
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SwarmError::Config(format!("cannot bind health endpoint {addr}: {e}")))?;
    info!(port, "Starting worker HTTP server");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "Worker HTTP server error");
        }
    });

    let api = HttpGatewayApi::new(config.token.clone());
    let connector = TwilightConnector::new(
        config.token.clone(),
        GatewayConfig::intents(),
        state.clone(),
        metrics.clone(),
    );
    let mut queue = ConnectionQueue::new(
        api,
        connector,
        ShardSpec::List(bootstrap.shard_ids.clone()),
        Some(bootstrap.total_shards),
        state.clone(),
        metrics,
    );

    // The parent's spawn loop resumes (and its cooldown clock starts)
    // once it reads this line.
    println!("{READY_SENTINEL}");

    let drained = queue.connect().await?;
    if !drained {
        warn!(index = bootstrap.index, "No shards assigned to this worker");
    }

    info!(
        connected = state.connected_shards(),
        failed = state.failed_shards(),
        "Worker bring-up complete"
    );

    shutdown_signal().await;
    info!(index = bootstrap.index, "Worker shutting down");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
