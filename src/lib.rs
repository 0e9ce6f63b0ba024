//! Swarm gateway
//!
//! Distributes the shards of one logical gateway connection across
//! isolated workers. A top-level orchestrator partitions the shard space
//! and spawns one worker per group with a staggered cooldown; inside each
//! worker a serial connection queue performs the identify handshakes one
//! at a time, since the gateway allows a single in-flight handshake per
//! deployment. Composite snowflake identities tag inter-worker messages
//! with timestamp, worker and shard provenance.

pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod metrics;
pub mod sharding;
pub mod snowflake;
pub mod worker;

pub use config::GatewayConfig;
pub use error::SwarmError;
pub use gateway::{ConnectionQueue, GatewayApi, GatewayInfo, ShardConnector, ShardPhase, ShardState};
pub use sharding::{ExecutionContext, Orchestrator, ShardSpec, ShardingMode, WorkerSpawner};
pub use snowflake::{DeconstructedSnowflake, SnowflakeGenerator};
pub use worker::WorkerBootstrap;
