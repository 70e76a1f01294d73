//! Configuration for deal making and the replication loops.

use crate::error::{ReplicationError, ReplicationResult};
use crate::types::{ChainEpoch, EPOCHS_IN_DAY, EPOCHS_IN_YEAR};
use bale_core::{PackConfig, GIB};
use std::time::Duration;

/// Parameters of every deal proposed by the dealer.
#[derive(Debug, Clone)]
pub struct DealConfig {
    /// Epochs between the current head and the deal start.
    pub start_delay: ChainEpoch,
    /// Deal length in epochs.
    pub duration: ChainEpoch,
    /// Whether deals use datacap.
    pub verified: bool,
    /// Whether the data is delivered out of band.
    pub offline: bool,
    /// Ask providers not to keep an unsealed copy.
    pub remove_unsealed_copy: bool,
    /// Ask providers not to announce to the indexer.
    pub skip_ipni_announce: bool,
}

impl Default for DealConfig {
    fn default() -> Self {
        Self {
            start_delay: 4 * EPOCHS_IN_DAY,
            duration: EPOCHS_IN_YEAR,
            verified: true,
            offline: true,
            remove_unsealed_copy: false,
            skip_ipni_announce: false,
        }
    }
}

impl DealConfig {
    /// Creates the default deal configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the start delay in epochs.
    #[must_use]
    pub const fn with_start_delay(mut self, epochs: ChainEpoch) -> Self {
        self.start_delay = epochs;
        self
    }

    /// Sets the deal duration in epochs.
    #[must_use]
    pub const fn with_duration(mut self, epochs: ChainEpoch) -> Self {
        self.duration = epochs;
        self
    }

    /// Sets whether deals are verified.
    #[must_use]
    pub const fn with_verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    /// Sets whether deals are offline.
    #[must_use]
    pub const fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Sets the remove-unsealed-copy flag.
    #[must_use]
    pub const fn with_remove_unsealed_copy(mut self, remove: bool) -> Self {
        self.remove_unsealed_copy = remove;
        self
    }

    /// Sets the skip-IPNI-announce flag.
    #[must_use]
    pub const fn with_skip_ipni_announce(mut self, skip: bool) -> Self {
        self.skip_ipni_announce = skip;
        self
    }
}

/// What the replication cycle does with replicas whose verification keeps
/// failing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownReplicaPolicy {
    /// Count them as healthy; never re-replicate because of them.
    #[default]
    Ignore,
    /// Count them as unhealthy once verification has failed continuously
    /// for longer than the grace period.
    ReplicateAfter(Duration),
}

/// Configuration of the replication engine.
#[derive(Debug, Clone)]
pub struct ReplicatorConfig {
    /// Period of the replication loop.
    pub replication_interval: Duration,
    /// Period of the verification loop.
    pub verification_interval: Duration,
    /// Capacity of pieces built per cycle.
    pub piece_capacity: u64,
    /// Pieces built per cycle.
    pub max_pieces_per_cycle: usize,
    /// Healthy replicas a segment needs before it is left alone.
    pub min_healthy_replicas: usize,
    /// Handling of replicas whose verification is failing.
    pub unknown_policy: UnknownReplicaPolicy,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            replication_interval: Duration::from_secs(60 * 60),
            verification_interval: Duration::from_secs(60 * 60),
            piece_capacity: 32 * GIB,
            max_pieces_per_cycle: 1,
            min_healthy_replicas: 1,
            unknown_policy: UnknownReplicaPolicy::Ignore,
        }
    }
}

impl ReplicatorConfig {
    /// Creates the default replicator configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the replication loop period.
    #[must_use]
    pub const fn with_replication_interval(mut self, interval: Duration) -> Self {
        self.replication_interval = interval;
        self
    }

    /// Sets the verification loop period.
    #[must_use]
    pub const fn with_verification_interval(mut self, interval: Duration) -> Self {
        self.verification_interval = interval;
        self
    }

    /// Sets the piece capacity.
    #[must_use]
    pub const fn with_piece_capacity(mut self, capacity: u64) -> Self {
        self.piece_capacity = capacity;
        self
    }

    /// Sets the number of pieces built per cycle.
    #[must_use]
    pub const fn with_max_pieces_per_cycle(mut self, pieces: usize) -> Self {
        self.max_pieces_per_cycle = pieces;
        self
    }

    /// Sets the healthy replica target.
    #[must_use]
    pub const fn with_min_healthy_replicas(mut self, replicas: usize) -> Self {
        self.min_healthy_replicas = replicas;
        self
    }

    /// Sets the unknown-replica policy.
    #[must_use]
    pub const fn with_unknown_policy(mut self, policy: UnknownReplicaPolicy) -> Self {
        self.unknown_policy = policy;
        self
    }

    /// Packing parameters for one cycle.
    #[must_use]
    pub fn pack_config(&self) -> PackConfig {
        PackConfig::new()
            .capacity(self.piece_capacity)
            .max_pieces(self.max_pieces_per_cycle)
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::InvalidConfig`] for zero intervals, a zero
    /// replica target, or an invalid piece capacity.
    pub fn validate(&self) -> ReplicationResult<()> {
        if self.replication_interval.is_zero() || self.verification_interval.is_zero() {
            return Err(ReplicationError::invalid_config("intervals must be non-zero"));
        }
        if self.min_healthy_replicas == 0 {
            return Err(ReplicationError::invalid_config(
                "min_healthy_replicas must be at least 1",
            ));
        }
        self.pack_config().validate()?;
        Ok(())
    }
}
