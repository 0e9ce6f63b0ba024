//! Gateway connection machinery
//!
//! The worker-side half: descriptor fetch, the serial identify queue and
//! per-shard connection state.

pub mod api;
pub mod connector;
pub mod queue;
pub mod state;

pub use api::{GatewayApi, GatewayInfo, HttpGatewayApi, SessionStartBudget};
pub use connector::{ShardConnector, TwilightConnector};
pub use queue::ConnectionQueue;
pub use state::{ShardPhase, ShardState};
