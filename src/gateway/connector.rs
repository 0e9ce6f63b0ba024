//! Shard identify handshake
//!
//! The connection queue drives shards through this seam one at a time.
//! The concrete implementation rides on twilight-gateway: it builds a
//! shard, waits for the gateway's ready dispatch, then moves the event
//! stream into a background task so the queue can move on.

use crate::error::SwarmError;
use crate::gateway::api::GatewayInfo;
use crate::gateway::state::{ShardPhase, ShardState};
use crate::metrics::SwarmMetrics;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use twilight_gateway::{Config, EventTypeFlags, Intents, Shard, StreamExt as _};
use twilight_model::gateway::{event::Event, ShardId};

/// One identify attempt. Resolves on success, rejects on failure; the
/// caller decides what a failure means for the rest of the queue.
#[async_trait]
pub trait ShardConnector: Send + Sync {
    async fn identify(
        &self,
        shard_id: u64,
        total_shards: u64,
        gateway: &GatewayInfo,
    ) -> Result<(), SwarmError>;
}

/// Identify through twilight-gateway.
pub struct TwilightConnector {
    token: String,
    intents: Intents,
    state: ShardState,
    metrics: Option<Arc<SwarmMetrics>>,
}

impl TwilightConnector {
    pub fn new(
        token: String,
        intents: Intents,
        state: ShardState,
        metrics: Option<Arc<SwarmMetrics>>,
    ) -> Self {
        Self {
            token,
            intents,
            state,
            metrics,
        }
    }
}

#[async_trait]
impl ShardConnector for TwilightConnector {
    async fn identify(
        &self,
        shard_id: u64,
        total_shards: u64,
        gateway: &GatewayInfo,
    ) -> Result<(), SwarmError> {
        let shard_id_u32 = u32::try_from(shard_id).map_err(|_| SwarmError::IdentityOverflow {
            field: "shard_id",
            value: shard_id,
        })?;
        let total_shards_u32 =
            u32::try_from(total_shards).map_err(|_| SwarmError::IdentityOverflow {
                field: "total_shards",
                value: total_shards,
            })?;

        debug!(shard_id, total_shards, url = %gateway.url, "Starting identify");

        let config = Config::new(self.token.clone(), self.intents);
        let mut shard = Shard::with_config(ShardId::new(shard_id_u32, total_shards_u32), config);

        loop {
            match shard.next_event(EventTypeFlags::all()).await {
                Some(Ok(Event::Ready(ready))) => {
                    info!(
                        shard_id,
                        guilds = ready.guilds.len(),
                        session_id = %ready.session_id,
                        "Shard ready"
                    );
                    self.state.set_guilds(shard_id, ready.guilds.len() as u64);
                    if let Some(ref metrics) = self.metrics {
                        metrics.set_guilds(shard_id, ready.guilds.len() as u64);
                    }

                    let state = self.state.clone();
                    let metrics = self.metrics.clone();
                    tokio::spawn(drive_shard(shard, state, metrics));
                    return Ok(());
                }
                Some(Ok(event)) => {
                    debug!(shard_id, kind = ?event.kind(), "Pre-ready event");
                }
                Some(Err(source)) => {
                    return Err(SwarmError::ShardConnect {
                        shard_id,
                        source: Box::new(source),
                    });
                }
                None => {
                    return Err(SwarmError::ShardConnect {
                        shard_id,
                        source: "gateway stream closed before ready".into(),
                    });
                }
            }
        }
    }
}

/// Drive a connected shard's event stream until it ends.
///
/// Connected shards run independently and concurrently; this loop only
/// keeps liveness state current. A circuit breaker gives up after too
/// many consecutive receive errors without a successful event.
async fn drive_shard(mut shard: Shard, state: ShardState, metrics: Option<Arc<SwarmMetrics>>) {
    let shard_id: u64 = shard.id().number().into();

    const MAX_CONSECUTIVE_ERRORS: u32 = 10;
    let mut consecutive_errors: u32 = 0;

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => {
                consecutive_errors = 0;
                event
            }
            Err(source) => {
                consecutive_errors += 1;
                warn!(
                    shard_id,
                    error = %source,
                    consecutive = consecutive_errors,
                    "Error receiving event"
                );

                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    state.set_phase(shard_id, ShardPhase::Disconnected);
                    if let Some(ref metrics) = metrics {
                        metrics.record_error("shard_stream");
                    }
                    error!(
                        shard_id,
                        consecutive = consecutive_errors,
                        "Shard gave up: consecutive error threshold exceeded"
                    );
                    return;
                }
                continue;
            }
        };

        state.record_event(shard_id);
        if let Some(ref metrics) = metrics {
            metrics.record_event(shard_id, event_label(&event));
        }

        match &event {
            Event::Resumed => {
                state.set_phase(shard_id, ShardPhase::Connected);
                info!(shard_id, "Shard resumed");
            }
            Event::GatewayHeartbeatAck => {
                state.record_heartbeat(shard_id);
                if let Some(ref metrics) = metrics {
                    metrics.record_heartbeat(shard_id);
                }
            }
            Event::GuildCreate(guild) => {
                // Approximate count, suitable for observability only.
                let current = state.total_guilds();
                state.set_guilds(shard_id, current + 1);
                debug!(shard_id, guild_id = %guild.id(), "Guild joined");
            }
            Event::GuildDelete(guild) => {
                if guild.unavailable != Some(true) {
                    let current = state.total_guilds();
                    if current > 0 {
                        state.set_guilds(shard_id, current - 1);
                    }
                }
                debug!(shard_id, guild_id = %guild.id, "Guild left");
            }
            _ => {}
        }
    }

    state.set_phase(shard_id, ShardPhase::Disconnected);
    info!(shard_id, "Shard event stream ended");
}

/// Static label for the event-type metrics dimension.
fn event_label(event: &Event) -> &'static str {
    match event {
        Event::GuildCreate(_) => "guild_create",
        Event::GuildDelete(_) => "guild_delete",
        Event::GuildUpdate(_) => "guild_update",
        Event::MemberAdd(_) => "member_add",
        Event::MemberRemove(_) => "member_remove",
        Event::MemberUpdate(_) => "member_update",
        Event::InteractionCreate(_) => "interaction_create",
        Event::Ready(_) => "ready",
        Event::Resumed => "resumed",
        Event::GatewayHeartbeatAck => "heartbeat_ack",
        _ => "other",
    }
}
