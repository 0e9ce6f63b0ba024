//! Serial shard connection queue
//!
//! The gateway allows one in-flight identify per deployment, so each
//! worker drains its shard connections strictly one at a time. A failed
//! handshake is reported and the loop moves on; it never takes the other
//! shards down with it.

use crate::error::SwarmError;
use crate::gateway::api::{GatewayApi, GatewayInfo};
use crate::gateway::connector::ShardConnector;
use crate::gateway::state::{ShardPhase, ShardState};
use crate::metrics::SwarmMetrics;
use crate::sharding::resolve::ShardSpec;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Per-worker connection queue.
///
/// Owns this worker's shard spec (independently resolvable), fetches the
/// gateway descriptor once per queue lifetime, and hands each shard to
/// the connector in order.
pub struct ConnectionQueue<A, C> {
    api: A,
    connector: C,
    spec: ShardSpec,
    total_shards: Option<u64>,
    state: ShardState,
    metrics: Option<Arc<SwarmMetrics>>,
    descriptor: Option<GatewayInfo>,
}

impl<A, C> ConnectionQueue<A, C>
where
    A: GatewayApi,
    C: ShardConnector,
{
    pub fn new(
        api: A,
        connector: C,
        spec: ShardSpec,
        total_shards: Option<u64>,
        state: ShardState,
        metrics: Option<Arc<SwarmMetrics>>,
    ) -> Self {
        Self {
            api,
            connector,
            spec,
            total_shards,
            state,
            metrics,
            descriptor: None,
        }
    }

    /// The cached gateway descriptor, fetched on first use.
    pub async fn descriptor(&mut self) -> Result<&GatewayInfo, SwarmError> {
        if self.descriptor.is_none() {
            self.descriptor = Some(self.api.gateway_info().await?);
        }
        // the write above makes this infallible
        Ok(self.descriptor.as_ref().unwrap())
    }

    /// Resolve this worker's shards and drain them serially.
    ///
    /// Returns `Ok(false)` immediately when no shards resolve, `Ok(true)`
    /// once the queue is fully drained. Per-shard handshake failures are
    /// absorbed; descriptor fetch failures are fatal.
    pub async fn connect(&mut self) -> Result<bool, SwarmError> {
        let descriptor = self.descriptor().await?.clone();

        let ids = self.spec.expand(descriptor.recommended_shards);
        let total = self.total_shards.unwrap_or(ids.len() as u64);

        for &shard_id in &ids {
            self.state.register(shard_id);
        }

        let mut queue: VecDeque<u64> = ids.into();
        if queue.is_empty() {
            return Ok(false);
        }

        info!(
            shards = queue.len(),
            total_shards = total,
            sessions_remaining = descriptor.session_start.remaining,
            "Draining connection queue"
        );

        // Strictly serial: exactly one identify in flight at any moment.
        while let Some(shard_id) = queue.pop_front() {
            self.state.set_phase(shard_id, ShardPhase::Connecting);
            let started = Instant::now();

            match self.connector.identify(shard_id, total, &descriptor).await {
                Ok(()) => {
                    self.state.set_phase(shard_id, ShardPhase::Connected);
                    if let Some(ref metrics) = self.metrics {
                        metrics.record_identify_success(shard_id, started.elapsed());
                        metrics.set_shards_connected(
                            self.state.worker_index(),
                            self.state.connected_shards(),
                        );
                    }
                }
                Err(err) => {
                    warn!(shard_id, error = %err, "Shard handshake failed; continuing");
                    self.state.set_phase(shard_id, ShardPhase::Failed);
                    if let Some(ref metrics) = self.metrics {
                        metrics.record_identify_failure(shard_id);
                        metrics.record_error(err.error_type_label());
                    }
                }
            }
        }

        info!(
            connected = self.state.connected_shards(),
            failed = self.state.failed_shards(),
            "Connection queue drained"
        );

        Ok(true)
    }

    /// Shared state view, for health endpoints.
    pub fn state(&self) -> ShardState {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::api::SessionStartBudget;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn test_info() -> GatewayInfo {
        GatewayInfo {
            recommended_shards: 2,
            url: "wss://gateway.example".to_string(),
            session_start: SessionStartBudget {
                total: 1000,
                remaining: 999,
                reset_after_ms: 0,
                max_concurrency: 1,
            },
        }
    }

    #[derive(Default)]
    struct FakeApi {
        fetches: AtomicUsize,
        unauthorized: bool,
    }

    impl FakeApi {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn unauthorized() -> Arc<Self> {
            Arc::new(Self {
                unauthorized: true,
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl GatewayApi for Arc<FakeApi> {
        async fn gateway_info(&self) -> Result<GatewayInfo, SwarmError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.unauthorized {
                return Err(SwarmError::Unauthorized);
            }
            Ok(test_info())
        }
    }

    /// Records handshakes and tracks how many are in flight at once.
    #[derive(Default)]
    struct FakeConnector {
        attempts: Mutex<Vec<u64>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_shards: Vec<u64>,
    }

    impl FakeConnector {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn failing(fail_shards: Vec<u64>) -> Arc<Self> {
            Arc::new(Self {
                fail_shards,
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl ShardConnector for Arc<FakeConnector> {
        async fn identify(
            &self,
            shard_id: u64,
            _total_shards: u64,
            _gateway: &GatewayInfo,
        ) -> Result<(), SwarmError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            // Yield so overlapping handshakes would be observable.
            tokio::task::yield_now().await;

            self.attempts.lock().unwrap().push(shard_id);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_shards.contains(&shard_id) {
                return Err(SwarmError::ShardConnect {
                    shard_id,
                    source: "handshake rejected".into(),
                });
            }
            Ok(())
        }
    }

    fn queue(
        api: &Arc<FakeApi>,
        connector: &Arc<FakeConnector>,
        spec: ShardSpec,
    ) -> ConnectionQueue<Arc<FakeApi>, Arc<FakeConnector>> {
        let state = ShardState::new(0, std::iter::empty(), 0);
        ConnectionQueue::new(Arc::clone(api), Arc::clone(connector), spec, None, state, None)
    }

    #[tokio::test]
    async fn drains_in_order_with_one_handshake_in_flight() {
        let api = FakeApi::new();
        let connector = FakeConnector::new();
        let mut queue = queue(&api, &connector, ShardSpec::List(vec![3, 1, 4, 1, 5]));

        let drained = queue.connect().await.unwrap();

        assert!(drained);
        assert_eq!(*connector.attempts.lock().unwrap(), vec![3, 1, 4, 1, 5]);
        assert_eq!(connector.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_failing_shard_does_not_block_the_rest() {
        let api = FakeApi::new();
        let connector = FakeConnector::failing(vec![1]);
        let mut queue = queue(&api, &connector, ShardSpec::Count(4));

        let drained = queue.connect().await.unwrap();

        assert!(drained);
        assert_eq!(*connector.attempts.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(queue.state().phase(1), Some(ShardPhase::Failed));
        assert_eq!(queue.state().phase(2), Some(ShardPhase::Connected));
        assert_eq!(queue.state().connected_shards(), 3);
    }

    #[tokio::test]
    async fn empty_queue_returns_false() {
        let api = FakeApi::new();
        let connector = FakeConnector::new();
        let mut queue = queue(&api, &connector, ShardSpec::Count(0));

        assert!(!queue.connect().await.unwrap());
        assert!(connector.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn descriptor_is_fetched_once_per_queue_lifetime() {
        let api = FakeApi::new();
        let connector = FakeConnector::new();
        let mut queue = queue(&api, &connector, ShardSpec::Count(1));

        queue.connect().await.unwrap();
        queue.connect().await.unwrap();

        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn auto_spec_uses_the_recommended_count() {
        let api = FakeApi::new();
        let connector = FakeConnector::new();
        let mut queue = queue(&api, &connector, ShardSpec::Auto);

        queue.connect().await.unwrap();

        // test_info() recommends 2 shards
        assert_eq!(*connector.attempts.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn unauthorized_descriptor_fetch_is_fatal() {
        let api = FakeApi::unauthorized();
        let connector = FakeConnector::new();
        let mut queue = queue(&api, &connector, ShardSpec::Count(3));

        let err = queue.connect().await.unwrap_err();
        assert!(matches!(err, SwarmError::Unauthorized));
        assert!(connector.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bootstrap_total_overrides_resolved_length() {
        let api = FakeApi::new();
        let connector = FakeConnector::new();
        let state = ShardState::new(1, std::iter::empty(), 10);
        let mut queue = ConnectionQueue::new(
            Arc::clone(&api),
            Arc::clone(&connector),
            ShardSpec::List(vec![8, 9]),
            Some(10),
            state,
            None,
        );

        queue.connect().await.unwrap();
        assert_eq!(*connector.attempts.lock().unwrap(), vec![8, 9]);
    }
}
