//! Gateway descriptor fetch
//!
//! The provider lookup behind `auto` shard counts and the connection
//! queue's session-start budget. A 401 is surfaced as its own error
//! variant; everything else is a transport failure.

use crate::error::SwarmError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use twilight_http::error::ErrorType;
use twilight_http::Client;

/// Session-start budget reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStartBudget {
    pub total: u64,
    pub remaining: u64,
    pub reset_after_ms: u64,
    pub max_concurrency: u64,
}

/// Gateway descriptor: recommended shard count, connect URL and
/// session-start budget. Fetched once per connection-queue lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayInfo {
    pub recommended_shards: u64,
    pub url: String,
    pub session_start: SessionStartBudget,
}

/// Provider lookup seam, mockable in tests.
#[async_trait]
pub trait GatewayApi: Send + Sync {
    async fn gateway_info(&self) -> Result<GatewayInfo, SwarmError>;
}

/// Forward the seam through a shared handle so callers can retain an
/// `Arc` to the implementation while still satisfying the `GatewayApi`
/// bound.
#[async_trait]
impl<T: GatewayApi + ?Sized> GatewayApi for Arc<T> {
    async fn gateway_info(&self) -> Result<GatewayInfo, SwarmError> {
        (**self).gateway_info().await
    }
}

/// Gateway descriptor fetch over the Discord REST API.
pub struct HttpGatewayApi {
    http: Client,
}

impl HttpGatewayApi {
    pub fn new(token: String) -> Self {
        Self {
            http: Client::new(token),
        }
    }
}

#[async_trait]
impl GatewayApi for HttpGatewayApi {
    async fn gateway_info(&self) -> Result<GatewayInfo, SwarmError> {
        let response = self
            .http
            .gateway()
            .authed()
            .await
            .map_err(map_http_error)?;

        let info = response.model().await.map_err(|e| SwarmError::Transport {
            source: Box::new(e),
        })?;

        let limit = info.session_start_limit;
        let descriptor = GatewayInfo {
            recommended_shards: u64::from(info.shards),
            url: info.url,
            session_start: SessionStartBudget {
                total: u64::from(limit.total),
                remaining: u64::from(limit.remaining),
                reset_after_ms: u64::from(limit.reset_after),
                max_concurrency: u64::from(limit.max_concurrency),
            },
        };

        debug!(
            recommended_shards = descriptor.recommended_shards,
            url = %descriptor.url,
            sessions_remaining = descriptor.session_start.remaining,
            "Fetched gateway descriptor"
        );

        Ok(descriptor)
    }
}

/// An unauthorized credential is fatal and distinguishable; any other
/// HTTP failure is a transport error.
fn map_http_error(err: twilight_http::Error) -> SwarmError {
    if let ErrorType::Response { status, .. } = err.kind() {
        if status.get() == 401 {
            return SwarmError::Unauthorized;
        }
    }
    SwarmError::Transport {
        source: Box::new(err),
    }
}
