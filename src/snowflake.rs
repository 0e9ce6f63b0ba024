//! Composite snowflake identities
//!
//! Tags inter-worker messages with timestamp, worker and shard provenance
//! packed into one sortable 128-bit integer, so any recipient can attribute
//! and order messages without a shared registry.
//!
//! Layout, most significant bits first:
//!
//! ```text
//!  128                                       86               54               22              0
//!  | ms since epoch (42 bits)                | worker (32)    | shard (32)     | increment (22)|
//! ```
//!
//! The wire form is the decimal string of the `u128`; it round-trips through
//! `FromStr`/`Display` without precision loss.

use crate::error::SwarmError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Reference epoch for the timestamp field: 2021-01-01T00:00:00Z.
pub const EPOCH_MS: u64 = 1_609_459_200_000;

/// Shard-ID field value reserved for orchestrator-owned identities.
pub const ORCHESTRATOR_MARKER_ID: u64 = 1_111_111_111;

/// The increment wraps to 0 once it would reach this value, so a single
/// process emits 4,194,302 distinct increments per reset cycle.
pub const INCREMENT_WRAP: u64 = 4_194_302;

const TIMESTAMP_SHIFT: u32 = 86;
const WORKER_SHIFT: u32 = 54;
const SHARD_SHIFT: u32 = 22;
const FIELD_MASK: u128 = 0xFFFF_FFFF;
const INCREMENT_MASK: u128 = 0x3F_FFFF;

/// A snowflake broken back into its packed fields.
///
/// Produced by [`SnowflakeGenerator::deconstruct`]; the timestamp is absolute
/// milliseconds since the Unix epoch (the reference epoch already re-added).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeconstructedSnowflake {
    pub timestamp: u64,
    pub worker_id: u64,
    pub shard_id: u64,
    pub increment: u64,
}

impl DeconstructedSnowflake {
    /// Wall-clock view of the timestamp field, derived on access.
    pub fn date(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.timestamp)
    }
}

/// Snowflake generator owning the process-wide increment counter.
///
/// The counter is an atomic compare-exchange wrap, so a single generator
/// instance can be shared across tasks and threads. It resets only on
/// process restart; identities generated across a restart within the same
/// millisecond could theoretically collide, which is accepted.
#[derive(Debug)]
pub struct SnowflakeGenerator {
    increment: AtomicU64,
}

impl Default for SnowflakeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SnowflakeGenerator {
    pub fn new() -> Self {
        Self {
            increment: AtomicU64::new(0),
        }
    }

    /// Restores a generator with a preloaded increment, e.g. to reproduce
    /// counter states near the wrap boundary.
    pub fn from_increment(increment: u64) -> Self {
        Self {
            increment: AtomicU64::new(increment % INCREMENT_WRAP),
        }
    }

    /// Generate an identity for `(shard_id, worker_id)` at the current time.
    pub fn generate(&self, shard_id: u64, worker_id: u64) -> Result<String, SwarmError> {
        self.generate_at(shard_id, worker_id, now_ms())
    }

    /// Generate an identity at an explicit millisecond timestamp.
    ///
    /// Timestamps before the reference epoch clamp the offset to zero.
    pub fn generate_at(
        &self,
        shard_id: u64,
        worker_id: u64,
        timestamp_ms: u64,
    ) -> Result<String, SwarmError> {
        if shard_id > u64::from(u32::MAX) {
            return Err(SwarmError::IdentityOverflow {
                field: "shard_id",
                value: shard_id,
            });
        }
        if worker_id > u64::from(u32::MAX) {
            return Err(SwarmError::IdentityOverflow {
                field: "worker_id",
                value: worker_id,
            });
        }

        let offset = timestamp_ms.saturating_sub(EPOCH_MS);
        let increment = self.next_increment();

        let raw = (u128::from(offset) << TIMESTAMP_SHIFT)
            | (u128::from(worker_id) << WORKER_SHIFT)
            | (u128::from(shard_id) << SHARD_SHIFT)
            | u128::from(increment);

        Ok(raw.to_string())
    }

    /// Timestamp-only identity: a sortable placeholder usable before worker
    /// and shard provenance is known. Worker, shard and increment are zero.
    pub fn generate_partial() -> String {
        Self::generate_partial_at(now_ms())
    }

    /// Timestamp-only identity at an explicit millisecond timestamp.
    pub fn generate_partial_at(timestamp_ms: u64) -> String {
        let offset = timestamp_ms.saturating_sub(EPOCH_MS);
        (u128::from(offset) << TIMESTAMP_SHIFT).to_string()
    }

    /// Exact inverse of [`Self::generate_at`], modulo increment wraparound.
    pub fn deconstruct(identity: &str) -> Result<DeconstructedSnowflake, SwarmError> {
        let raw: u128 = identity
            .parse()
            .map_err(|_| SwarmError::MalformedIdentity {
                input: identity.to_string(),
            })?;

        Ok(DeconstructedSnowflake {
            timestamp: (raw >> TIMESTAMP_SHIFT) as u64 + EPOCH_MS,
            worker_id: ((raw >> WORKER_SHIFT) & FIELD_MASK) as u64,
            shard_id: ((raw >> SHARD_SHIFT) & FIELD_MASK) as u64,
            increment: (raw & INCREMENT_MASK) as u64,
        })
    }

    /// Atomic increment-and-wrap; returns the value appended to the identity.
    fn next_increment(&self) -> u64 {
        let mut current = self.increment.load(Ordering::Relaxed);
        loop {
            let next = (current + 1) % INCREMENT_WRAP;
            match self.increment.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Milliseconds since the Unix epoch.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: u64 = EPOCH_MS + 14_584_553_498; // an arbitrary post-epoch instant

    #[test]
    fn deconstruct_inverts_generate() {
        let gen = SnowflakeGenerator::new();
        let id = gen.generate_at(99, 11, TS).unwrap();
        let parts = SnowflakeGenerator::deconstruct(&id).unwrap();

        assert_eq!(parts.timestamp, TS);
        assert_eq!(parts.worker_id, 11);
        assert_eq!(parts.shard_id, 99);
        assert_eq!(parts.increment, 0);
    }

    #[test]
    fn roundtrip_at_field_extremes() {
        let gen = SnowflakeGenerator::new();
        let max_id = u64::from(u32::MAX);
        let id = gen.generate_at(max_id, max_id, TS).unwrap();
        let parts = SnowflakeGenerator::deconstruct(&id).unwrap();

        assert_eq!(parts.shard_id, max_id);
        assert_eq!(parts.worker_id, max_id);
        assert_eq!(parts.timestamp, TS);
    }

    #[test]
    fn consecutive_identities_in_one_millisecond_are_distinct() {
        let gen = SnowflakeGenerator::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(gen.generate_at(3, 4, TS).unwrap()));
        }
    }

    #[test]
    fn increment_wraps_to_zero() {
        let gen = SnowflakeGenerator::from_increment(INCREMENT_WRAP - 1);

        let last = gen.generate_at(0, 0, TS).unwrap();
        let wrapped = gen.generate_at(0, 0, TS).unwrap();

        let last = SnowflakeGenerator::deconstruct(&last).unwrap();
        let wrapped = SnowflakeGenerator::deconstruct(&wrapped).unwrap();

        assert_eq!(last.increment, INCREMENT_WRAP - 1);
        assert_eq!(wrapped.increment, 0);
    }

    #[test]
    fn rejects_ids_wider_than_32_bits() {
        let gen = SnowflakeGenerator::new();
        let too_wide = u64::from(u32::MAX) + 1;

        let err = gen.generate_at(too_wide, 0, TS).unwrap_err();
        assert!(matches!(
            err,
            SwarmError::IdentityOverflow { field: "shard_id", .. }
        ));

        let err = gen.generate_at(0, too_wide, TS).unwrap_err();
        assert!(matches!(
            err,
            SwarmError::IdentityOverflow { field: "worker_id", .. }
        ));
    }

    #[test]
    fn orchestrator_marker_fits_the_shard_field() {
        let gen = SnowflakeGenerator::new();
        let id = gen.generate_at(ORCHESTRATOR_MARKER_ID, 1234, TS).unwrap();
        let parts = SnowflakeGenerator::deconstruct(&id).unwrap();
        assert_eq!(parts.shard_id, ORCHESTRATOR_MARKER_ID);
        assert_eq!(parts.worker_id, 1234);
    }

    #[test]
    fn partial_identity_has_zero_provenance_and_sorts_by_time() {
        let earlier = SnowflakeGenerator::generate_partial_at(TS);
        let later = SnowflakeGenerator::generate_partial_at(TS + 1);

        let parts = SnowflakeGenerator::deconstruct(&earlier).unwrap();
        assert_eq!(parts.timestamp, TS);
        assert_eq!(parts.worker_id, 0);
        assert_eq!(parts.shard_id, 0);
        assert_eq!(parts.increment, 0);

        // Numeric order; the decimal strings also compare correctly once
        // parsed, which is how recipients sort them.
        let earlier: u128 = earlier.parse().unwrap();
        let later: u128 = later.parse().unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn identities_exceed_64_bits_and_survive_the_string_roundtrip() {
        let gen = SnowflakeGenerator::new();
        let id = gen.generate_at(1, 1, TS).unwrap();
        let raw: u128 = id.parse().unwrap();

        assert!(raw > u128::from(u64::MAX));
        assert_eq!(raw.to_string(), id);
    }

    #[test]
    fn pre_epoch_timestamps_clamp_to_the_epoch() {
        let gen = SnowflakeGenerator::new();
        let id = gen.generate_at(5, 6, 0).unwrap();
        let parts = SnowflakeGenerator::deconstruct(&id).unwrap();
        assert_eq!(parts.timestamp, EPOCH_MS);
        assert_eq!(parts.shard_id, 5);
    }

    #[test]
    fn malformed_identity_is_rejected() {
        for input in ["", "abc", "-5", "12.5", "99999999999999999999999999999999999999999"] {
            let err = SnowflakeGenerator::deconstruct(input).unwrap_err();
            assert!(matches!(err, SwarmError::MalformedIdentity { .. }), "{input}");
        }
    }

    #[test]
    fn date_view_matches_timestamp() {
        let parts = DeconstructedSnowflake {
            timestamp: TS,
            worker_id: 0,
            shard_id: 0,
            increment: 0,
        };
        assert_eq!(parts.date(), UNIX_EPOCH + Duration::from_millis(TS));
    }
}
