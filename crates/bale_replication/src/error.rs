//! Error types for deal making and replication.

use crate::types::Address;
use bale_codec::Cid;
use bale_core::CoreError;
use thiserror::Error;

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors that can occur while making deals or tracking replicas.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// Segmentation, packing or storage failure.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Proposal encoding failure.
    #[error("codec error: {0}")]
    Codec(#[from] bale_codec::CodecError),

    /// The deal window is shorter than the market allows.
    #[error("deal duration must be at least {min} epochs, got {duration}")]
    DealTooShort {
        /// Requested duration in epochs.
        duration: i64,
        /// Minimum duration in epochs.
        min: i64,
    },

    /// The chain client failed.
    #[error("chain error: {message}")]
    Chain {
        /// Error message.
        message: String,
    },

    /// Talking to a storage provider failed.
    #[error("provider {provider}: {message}")]
    Provider {
        /// Provider address.
        provider: Address,
        /// Error message.
        message: String,
    },

    /// The wallet could not sign or resolve the client address.
    #[error("wallet error: {message}")]
    Wallet {
        /// Error message.
        message: String,
    },

    /// No offload descriptor could be produced for a piece.
    #[error("offload error: {message}")]
    Offload {
        /// Error message.
        message: String,
    },

    /// The provider refused the proposal.
    #[error("deal was not accepted by {provider}: {reason}")]
    DealRejected {
        /// Provider address.
        provider: Address,
        /// Reason stated by the provider.
        reason: String,
    },

    /// The on-chain deal differs from the proposal that was signed.
    #[error("on-chain proposal does not match: {field} expected {expected}, got {actual}")]
    ProposalMismatch {
        /// Mismatching proposal field.
        field: &'static str,
        /// Value in the signed proposal.
        expected: String,
        /// Value found on chain.
        actual: String,
    },

    /// No replicas are tracked for the segment.
    #[error("no replicas tracked for {0}")]
    ReplicasNotFound(Cid),

    /// Configuration values are inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// The operation observed cancellation.
    #[error("operation cancelled")]
    Cancelled,
}

impl ReplicationError {
    /// Creates a chain error.
    pub fn chain(message: impl Into<String>) -> Self {
        Self::Chain {
            message: message.into(),
        }
    }

    /// Creates a provider error.
    pub fn provider(provider: &Address, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.clone(),
            message: message.into(),
        }
    }

    /// Creates a wallet error.
    pub fn wallet(message: impl Into<String>) -> Self {
        Self::Wallet {
            message: message.into(),
        }
    }

    /// Creates an offload error.
    pub fn offload(message: impl Into<String>) -> Self {
        Self::Offload {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Core(CoreError::Cancelled))
    }

    /// Returns true if this error is a typed miss rather than a failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ReplicasNotFound(_) => true,
            Self::Core(err) => err.is_not_found(),
            _ => false,
        }
    }

    /// Returns true for failures of an external collaborator.
    pub fn is_collaborator(&self) -> bool {
        matches!(
            self,
            Self::Chain { .. }
                | Self::Provider { .. }
                | Self::Wallet { .. }
                | Self::Offload { .. }
                | Self::DealRejected { .. }
        )
    }
}
