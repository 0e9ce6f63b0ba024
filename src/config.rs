//! Gateway configuration module
//!
//! Handles loading configuration from environment variables.

use crate::error::SwarmError;
use crate::sharding::orchestrator::OrchestratorOptions;
use crate::sharding::resolve::ShardSpec;
use crate::sharding::spawner::ShardingMode;
use std::env;
use std::path::PathBuf;
use twilight_gateway::Intents;

/// Swarm gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway bot token
    pub token: String,

    /// Shard specification: a count, an explicit ID list, or `auto`
    pub shards: ShardSpec,

    /// Shards hosted per worker (group size)
    pub shards_per_worker: usize,

    /// How workers are hosted
    pub mode: ShardingMode,

    /// Executable spawned for each worker; defaults to this binary
    pub worker_entry: PathBuf,

    /// Base health/metrics HTTP port; workers offset it by group index
    pub http_port: u16,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, SwarmError> {
        dotenvy::dotenv().ok();

        let token = env::var("SWARM_TOKEN")
            .or_else(|_| env::var("DISCORD_TOKEN"))
            .map_err(|_| {
                SwarmError::Config("SWARM_TOKEN or DISCORD_TOKEN must be set".to_string())
            })?;

        let shards = env::var("SWARM_SHARDS")
            .unwrap_or_else(|_| "auto".to_string())
            .parse()?;

        let shards_per_worker = env::var("SWARM_SHARDS_PER_WORKER")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .map_err(|e| {
                SwarmError::Config(format!("SWARM_SHARDS_PER_WORKER must be a valid number: {e}"))
            })?;

        let mode = env::var("SWARM_MODE")
            .unwrap_or_else(|_| "processes".to_string())
            .parse()?;

        let worker_entry = match env::var_os("SWARM_WORKER_EXEC") {
            Some(path) => PathBuf::from(path),
            None => env::current_exe().map_err(|e| {
                SwarmError::Config(format!("cannot resolve worker executable: {e}"))
            })?,
        };

        let http_port = env::var("HTTP_PORT")
            .unwrap_or_else(|_| "9090".to_string())
            .parse()
            .map_err(|e| SwarmError::Config(format!("HTTP_PORT must be a valid port number: {e}")))?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            token,
            shards,
            shards_per_worker,
            mode,
            worker_entry,
            http_port,
            log_level,
        })
    }

    /// The orchestrator's view of this configuration.
    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            shards: self.shards.clone(),
            shards_per_worker: self.shards_per_worker,
            entry: self.worker_entry.clone(),
            mode: self.mode,
        }
    }

    /// Configured gateway intents.
    ///
    /// Minimal set: guild lifecycle and member events.
    pub fn intents() -> Intents {
        Intents::GUILDS | Intents::GUILD_MEMBERS
    }
}
