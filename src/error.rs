//! Domain error types for the swarm gateway
//!
//! Structured thiserror types for navigable diagnostics and compile-time
//! exhaustive handling.
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All application code returns Result<T, SwarmError>.

use thiserror::Error;

/// Swarm gateway domain errors
///
/// Every variant carries structured context fields for diagnostics.
/// On-call engineers can pattern-match on the variant to understand
/// the failure mode without parsing error message strings.
#[derive(Error, Debug)]
pub enum SwarmError {
    /// Configuration error (malformed shard spec, missing env, bad value)
    #[error("configuration error: {0}")]
    Config(String),

    /// Orchestrator constructed inside a spawned worker context
    #[error("spawning loop detected: orchestrator constructed inside a worker; aborting")]
    OrchestrationLoop,

    /// Identity field exceeds the 32 bits the snowflake layout allows
    #[error("cannot encode identity: {field} {value} takes more than 32 bits")]
    IdentityOverflow { field: &'static str, value: u64 },

    /// Identity string is not a decimal 128-bit unsigned integer
    #[error("malformed identity '{input}': not a decimal 128-bit integer")]
    MalformedIdentity { input: String },

    /// Gateway rejected the credential (HTTP 401)
    #[error("gateway rejected the provided credential")]
    Unauthorized,

    /// Any other gateway communication failure
    #[error("gateway request failed")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Worker creation failed; remaining groups are aborted
    #[error("failed to spawn worker {index}")]
    WorkerSpawn {
        index: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Single shard handshake failed; absorbed by the connection queue
    #[error("shard {shard_id} failed to connect")]
    ShardConnect {
        shard_id: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl SwarmError {
    /// Returns a static label string suitable for Prometheus metrics.
    ///
    /// Used as the `error_type` label on `swarm_errors_total`, enabling
    /// per-error-type monitoring and alerting.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::OrchestrationLoop => "orchestration_loop",
            Self::IdentityOverflow { .. } => "identity_overflow",
            Self::MalformedIdentity { .. } => "malformed_identity",
            Self::Unauthorized => "unauthorized",
            Self::Transport { .. } => "transport",
            Self::WorkerSpawn { .. } => "worker_spawn",
            Self::ShardConnect { .. } => "shard_connect",
        }
    }

    /// True for the one locally-absorbed category: a per-shard handshake
    /// failure never aborts the draining loop.
    pub fn is_per_shard(&self) -> bool {
        matches!(self, Self::ShardConnect { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_source() -> Box<dyn std::error::Error + Send + Sync> {
        Box::new(std::io::Error::new(std::io::ErrorKind::Other, "test"))
    }

    #[test]
    fn every_variant_has_distinct_error_type_label() {
        let labels = [
            SwarmError::Config("test".to_string()).error_type_label(),
            SwarmError::OrchestrationLoop.error_type_label(),
            SwarmError::IdentityOverflow { field: "shard_id", value: u64::MAX }
                .error_type_label(),
            SwarmError::MalformedIdentity { input: "abc".to_string() }.error_type_label(),
            SwarmError::Unauthorized.error_type_label(),
            SwarmError::Transport { source: test_source() }.error_type_label(),
            SwarmError::WorkerSpawn {
                index: 0,
                source: test_source(),
            }
            .error_type_label(),
            SwarmError::ShardConnect {
                shard_id: 0,
                source: test_source(),
            }
            .error_type_label(),
        ];

        // All labels are unique
        let mut unique = labels.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(labels.len(), unique.len(), "Duplicate error_type_label found");
    }

    #[test]
    fn error_messages_contain_context() {
        let err = SwarmError::IdentityOverflow {
            field: "worker_id",
            value: u64::MAX,
        };
        let msg = err.to_string();
        assert!(msg.contains("worker_id"), "message should name the field");
        assert!(msg.contains(&u64::MAX.to_string()));

        let err = SwarmError::ShardConnect {
            shard_id: 7,
            source: test_source(),
        };
        assert!(err.to_string().contains("shard 7"));

        let err = SwarmError::WorkerSpawn {
            index: 2,
            source: test_source(),
        };
        assert!(err.to_string().contains("worker 2"));
    }

    #[test]
    fn only_shard_connect_is_absorbed_locally() {
        assert!(SwarmError::ShardConnect {
            shard_id: 0,
            source: test_source()
        }
        .is_per_shard());

        assert!(!SwarmError::Unauthorized.is_per_shard());
        assert!(!SwarmError::OrchestrationLoop.is_per_shard());
        assert!(!SwarmError::Config("x".to_string()).is_per_shard());
    }

    #[test]
    fn config_error_preserves_message() {
        let err = SwarmError::Config("SWARM_TOKEN must be set".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: SWARM_TOKEN must be set"
        );
    }
}
