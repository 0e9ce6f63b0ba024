//! Prometheus metrics module
//!
//! Counters and gauges for worker spawning and shard bring-up.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;

/// Swarm metrics collector
#[derive(Clone)]
pub struct SwarmMetrics {
    handle: Arc<PrometheusHandle>,
}

impl SwarmMetrics {
    /// Initialize metrics and return handle
    pub fn new() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        Self::register_metrics();

        Self {
            handle: Arc::new(handle),
        }
    }

    /// Register metric descriptions
    fn register_metrics() {
        describe_counter!(
            "swarm_workers_spawned_total",
            Unit::Count,
            "Workers spawned by the orchestrator"
        );
        describe_counter!(
            "swarm_shard_connects_total",
            Unit::Count,
            "Successful shard identify handshakes"
        );
        describe_counter!(
            "swarm_shard_connect_failures_total",
            Unit::Count,
            "Failed shard identify handshakes"
        );
        describe_counter!(
            "swarm_events_received_total",
            Unit::Count,
            "Gateway events received across connected shards"
        );
        describe_counter!(
            "swarm_errors_total",
            Unit::Count,
            "Errors by error_type label"
        );

        describe_histogram!(
            "swarm_identify_duration_seconds",
            Unit::Seconds,
            "Time from dequeue to a shard reaching ready"
        );

        describe_gauge!(
            "swarm_shards_connected",
            Unit::Count,
            "Shards currently connected in this worker"
        );
        describe_gauge!(
            "swarm_guilds_total",
            Unit::Count,
            "Total guilds across connected shards"
        );
        describe_gauge!(
            "swarm_last_heartbeat_timestamp",
            Unit::Count,
            "Unix timestamp of the last heartbeat ack per shard"
        );
    }

    /// Record a worker spawned by the orchestrator
    pub fn record_worker_spawned(&self, index: usize) {
        counter!(
            "swarm_workers_spawned_total",
            "worker_index" => index.to_string()
        )
        .increment(1);
    }

    /// Record a successful identify
    pub fn record_identify_success(&self, shard_id: u64, duration: Duration) {
        counter!(
            "swarm_shard_connects_total",
            "shard_id" => shard_id.to_string()
        )
        .increment(1);

        histogram!(
            "swarm_identify_duration_seconds",
            "shard_id" => shard_id.to_string()
        )
        .record(duration.as_secs_f64());
    }

    /// Record a failed identify
    pub fn record_identify_failure(&self, shard_id: u64) {
        counter!(
            "swarm_shard_connect_failures_total",
            "shard_id" => shard_id.to_string()
        )
        .increment(1);
    }

    /// Record a gateway event received
    pub fn record_event(&self, shard_id: u64, event_type: &'static str) {
        counter!(
            "swarm_events_received_total",
            "shard_id" => shard_id.to_string(),
            "event_type" => event_type
        )
        .increment(1);
    }

    /// Record a domain error
    pub fn record_error(&self, error_type: &'static str) {
        counter!(
            "swarm_errors_total",
            "error_type" => error_type
        )
        .increment(1);
    }

    /// Record heartbeat
    pub fn record_heartbeat(&self, shard_id: u64) {
        gauge!(
            "swarm_last_heartbeat_timestamp",
            "shard_id" => shard_id.to_string()
        )
        .set(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_secs() as f64,
        );
    }

    /// Set guild count for a shard
    pub fn set_guilds(&self, shard_id: u64, count: u64) {
        gauge!(
            "swarm_guilds_total",
            "shard_id" => shard_id.to_string()
        )
        .set(count as f64);
    }

    /// Set connected shard count for this worker
    pub fn set_shards_connected(&self, worker_index: usize, count: usize) {
        gauge!(
            "swarm_shards_connected",
            "worker_index" => worker_index.to_string()
        )
        .set(count as f64);
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
