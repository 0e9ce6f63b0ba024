//! Per-shard connection state tracking
//!
//! Shared view of each shard's bring-up phase inside one worker, consumed
//! by the health endpoints and the connection queue.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Bring-up phase of a single shard connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardPhase {
    /// Waiting in the connection queue
    Queued,
    /// Identify handshake in flight
    Connecting,
    /// Handshake succeeded; event stream running
    Connected,
    /// Event stream dropped after a successful handshake
    Disconnected,
    /// Handshake failed; the queue moved on
    Failed,
}

impl ShardPhase {
    /// True once the shard has an active event stream.
    pub fn is_connected(&self) -> bool {
        matches!(self, ShardPhase::Connected)
    }

    /// True when the queue has finished with this shard, either way.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ShardPhase::Connected | ShardPhase::Disconnected | ShardPhase::Failed
        )
    }
}

/// State for a single shard
#[derive(Debug)]
pub struct ShardEntry {
    pub phase: ShardPhase,
    pub guilds: u64,
    pub events_received: AtomicU64,
    pub last_heartbeat: Option<Instant>,
    pub connected_at: Option<Instant>,
}

impl Default for ShardEntry {
    fn default() -> Self {
        Self {
            phase: ShardPhase::Queued,
            guilds: 0,
            events_received: AtomicU64::new(0),
            last_heartbeat: None,
            connected_at: None,
        }
    }
}

/// Shared state across all shards hosted by one worker
#[derive(Debug, Clone)]
pub struct ShardState {
    inner: Arc<ShardStateInner>,
}

#[derive(Debug)]
struct ShardStateInner {
    worker_index: usize,
    shards: DashMap<u64, ShardEntry>,
    total_shards: u64,
}

impl ShardState {
    /// Create a tracker seeded with this worker's shard IDs, all Queued.
    pub fn new(
        worker_index: usize,
        shard_ids: impl Iterator<Item = u64>,
        total_shards: u64,
    ) -> Self {
        let shards = DashMap::new();
        for shard_id in shard_ids {
            shards.insert(shard_id, ShardEntry::default());
        }

        Self {
            inner: Arc::new(ShardStateInner {
                worker_index,
                shards,
                total_shards,
            }),
        }
    }

    /// Get this worker's group index
    pub fn worker_index(&self) -> usize {
        self.inner.worker_index
    }

    /// Get total shards across the deployment
    pub fn total_shards(&self) -> u64 {
        self.inner.total_shards
    }

    /// Ensure an entry exists for `shard_id`, Queued if new.
    pub fn register(&self, shard_id: u64) {
        self.inner.shards.entry(shard_id).or_default();
    }

    /// Update shard phase
    pub fn set_phase(&self, shard_id: u64, phase: ShardPhase) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            entry.phase = phase;
            if phase == ShardPhase::Connected && entry.connected_at.is_none() {
                entry.connected_at = Some(Instant::now());
            }
        }
    }

    /// Update shard guild count
    pub fn set_guilds(&self, shard_id: u64, count: u64) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            entry.guilds = count;
        }
    }

    /// Increment event received counter
    pub fn record_event(&self, shard_id: u64) {
        if let Some(entry) = self.inner.shards.get(&shard_id) {
            entry.events_received.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record heartbeat
    pub fn record_heartbeat(&self, shard_id: u64) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            entry.last_heartbeat = Some(Instant::now());
        }
    }

    /// Get phase for a specific shard
    pub fn phase(&self, shard_id: u64) -> Option<ShardPhase> {
        self.inner.shards.get(&shard_id).map(|e| e.phase)
    }

    /// Get total events received across all shards
    pub fn total_events_received(&self) -> u64 {
        self.inner
            .shards
            .iter()
            .map(|e| e.events_received.load(Ordering::Relaxed))
            .sum()
    }

    /// Get total guilds across all shards
    pub fn total_guilds(&self) -> u64 {
        self.inner.shards.iter().map(|e| e.guilds).sum()
    }

    /// Get count of connected shards
    pub fn connected_shards(&self) -> usize {
        self.inner
            .shards
            .iter()
            .filter(|e| e.phase.is_connected())
            .count()
    }

    /// Get count of shards whose handshake failed
    pub fn failed_shards(&self) -> usize {
        self.inner
            .shards
            .iter()
            .filter(|e| e.phase == ShardPhase::Failed)
            .count()
    }

    /// Get total shard count hosted by this worker
    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }

    /// Check if the worker is ready (at least one shard connected)
    pub fn is_ready(&self) -> bool {
        self.connected_shards() > 0
    }

    /// Check if every hosted shard is connected
    pub fn is_healthy(&self) -> bool {
        self.connected_shards() == self.shard_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shards_start_queued() {
        let state = ShardState::new(0, [0u64, 1, 2].into_iter(), 3);
        assert_eq!(state.shard_count(), 3);
        assert_eq!(state.phase(1), Some(ShardPhase::Queued));
        assert!(!state.is_ready());
    }

    #[test]
    fn phase_transitions_track_readiness() {
        let state = ShardState::new(0, [0u64, 1].into_iter(), 2);

        state.set_phase(0, ShardPhase::Connecting);
        assert!(!state.is_ready());

        state.set_phase(0, ShardPhase::Connected);
        assert!(state.is_ready());
        assert!(!state.is_healthy());

        state.set_phase(1, ShardPhase::Failed);
        assert_eq!(state.failed_shards(), 1);
        assert!(!state.is_healthy());
    }

    #[test]
    fn register_is_idempotent() {
        let state = ShardState::new(0, std::iter::empty(), 0);
        state.register(4);
        state.set_phase(4, ShardPhase::Connected);
        state.register(4);
        assert_eq!(state.phase(4), Some(ShardPhase::Connected));
    }

    #[test]
    fn settled_covers_terminal_phases() {
        assert!(ShardPhase::Connected.is_settled());
        assert!(ShardPhase::Failed.is_settled());
        assert!(ShardPhase::Disconnected.is_settled());
        assert!(!ShardPhase::Queued.is_settled());
        assert!(!ShardPhase::Connecting.is_settled());
    }
}
