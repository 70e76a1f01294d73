//! Replicas and their health.

use crate::error::ReplicationError;
use crate::types::{
    epoch_to_time, Address, ChainEpoch, DealProposal, DealRequest, MarketDeal, ProviderDealStatus,
};
use bale_codec::Cid;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

/// Health of one replica, derived from its last verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaStatus {
    /// The provider accepted the deal; it is not yet confirmed on chain.
    Accepted,
    /// The deal was slashed.
    Slashed,
    /// The deal has ended.
    Expired,
    /// The deal is on chain but its sector is not yet proven.
    Published,
    /// The deal is on chain in a proven sector.
    Active,
}

impl ReplicaStatus {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Slashed => "slashed",
            Self::Expired => "expired",
            Self::Published => "published",
            Self::Active => "active",
        }
    }

    /// Whether the deal can no longer hold the data.
    #[must_use]
    pub const fn is_lost(self) -> bool {
        matches!(self, Self::Slashed | Self::Expired)
    }
}

impl fmt::Display for ReplicaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One deal backing one or more segments.
#[derive(Debug, Clone)]
pub struct Replica {
    /// The deal as proposed and signed.
    pub deal: DealRequest,
    /// Status last reported by the provider.
    pub last_provider_status: Option<ProviderDealStatus>,
    /// Market state last read from chain.
    pub last_chain_status: Option<MarketDeal>,
    /// When verification last ran.
    pub last_checked: Option<SystemTime>,
    /// Error from the last verification.
    pub last_error: Option<Arc<ReplicationError>>,
    /// Start of the current run of failed verifications.
    pub failing_since: Option<SystemTime>,
}

impl Replica {
    /// A freshly accepted, never verified replica.
    #[must_use]
    pub fn new(deal: DealRequest) -> Self {
        Self {
            deal,
            last_provider_status: None,
            last_chain_status: None,
            last_checked: None,
            last_error: None,
            failing_since: None,
        }
    }

    /// Deal identifier.
    #[must_use]
    pub fn deal_uuid(&self) -> Uuid {
        self.deal.deal_uuid
    }

    /// Provider storing the replica.
    #[must_use]
    pub fn provider(&self) -> &Address {
        &self.deal.proposal().provider
    }

    /// Commitment of the piece the deal stores.
    #[must_use]
    pub fn piece_cid(&self) -> &Cid {
        &self.deal.proposal().piece_cid
    }

    /// Whether the on-chain proposal matches the signed one. False when no
    /// chain status is known.
    #[must_use]
    pub fn matches_proposal_on_chain(&self) -> bool {
        self.last_chain_status
            .as_ref()
            .is_some_and(|deal| verify_proposals_match(self.deal.proposal(), &deal.proposal).is_ok())
    }

    /// Status at chain height `head`.
    ///
    /// In priority order: missing provider or chain status, or an on-chain
    /// proposal that does not match, is `Accepted`; then `Slashed`,
    /// `Expired`, `Published` and `Active`. Verification errors do not
    /// change the status; see [`Replica::is_unresolved`].
    #[must_use]
    pub fn status(&self, head: ChainEpoch) -> ReplicaStatus {
        if self.last_provider_status.is_none() {
            return ReplicaStatus::Accepted;
        }
        let Some(chain) = &self.last_chain_status else {
            return ReplicaStatus::Accepted;
        };
        if !self.matches_proposal_on_chain() {
            return ReplicaStatus::Accepted;
        }
        if chain.state.slash_epoch > 0 {
            ReplicaStatus::Slashed
        } else if chain.proposal.end_epoch < head {
            ReplicaStatus::Expired
        } else if chain.state.sector_start_epoch <= 0 {
            ReplicaStatus::Published
        } else {
            ReplicaStatus::Active
        }
    }

    /// Whether the last verification ended in an error, leaving the status
    /// as whatever was learned before the failure.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.last_error.is_some()
    }

    /// Wall time at which the deal ends.
    #[must_use]
    pub fn expiration(&self, genesis: SystemTime) -> SystemTime {
        epoch_to_time(genesis, self.deal.proposal().end_epoch)
    }

    /// Clears the results of the previous verification.
    pub(crate) fn reset_checks(&mut self, now: SystemTime) {
        self.last_checked = Some(now);
        self.last_provider_status = None;
        self.last_chain_status = None;
        self.last_error = None;
    }

    /// Records a verification failure.
    pub(crate) fn fail(&mut self, err: ReplicationError, now: SystemTime) {
        self.last_error = Some(Arc::new(err));
        self.failing_since.get_or_insert(now);
    }

    /// Copies verification results from `checked`.
    pub(crate) fn apply_check(&mut self, checked: &Replica) {
        self.last_checked = checked.last_checked;
        self.last_provider_status.clone_from(&checked.last_provider_status);
        self.last_chain_status.clone_from(&checked.last_chain_status);
        self.last_error.clone_from(&checked.last_error);
        self.failing_since = checked.failing_since;
    }
}

/// Compares a signed proposal with its on-chain record.
///
/// # Errors
///
/// Returns [`ReplicationError::ProposalMismatch`] naming the first differing
/// field among provider, piece CID, client, start and end epoch.
pub fn verify_proposals_match(
    original: &DealProposal,
    on_chain: &DealProposal,
) -> Result<(), ReplicationError> {
    fn mismatch(
        field: &'static str,
        expected: impl ToString,
        actual: impl ToString,
    ) -> ReplicationError {
        ReplicationError::ProposalMismatch {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    if original.provider != on_chain.provider {
        return Err(mismatch("provider", &original.provider, &on_chain.provider));
    }
    if original.piece_cid != on_chain.piece_cid {
        return Err(mismatch("piece CID", &original.piece_cid, &on_chain.piece_cid));
    }
    if original.client != on_chain.client {
        return Err(mismatch("client", &original.client, &on_chain.client));
    }
    if original.start_epoch != on_chain.start_epoch {
        return Err(mismatch("start epoch", original.start_epoch, on_chain.start_epoch));
    }
    if original.end_epoch != on_chain.end_epoch {
        return Err(mismatch("end epoch", original.end_epoch, on_chain.end_epoch));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{
        ClientDealProposal, MarketDealState, Signature, TokenAmount, Transfer, MIN_DEAL_DURATION,
    };
    use bale_core::PaddedPieceSize;
    use std::time::Duration;

    pub(crate) fn deal(provider: &str) -> DealRequest {
        let piece_cid = Cid::piece_commitment(&[3u8; 32]);
        DealRequest {
            deal_uuid: Uuid::new_v4(),
            is_offline: true,
            client_deal_proposal: ClientDealProposal {
                proposal: DealProposal {
                    piece_cid: piece_cid.clone(),
                    piece_size: PaddedPieceSize::new(1 << 20).unwrap(),
                    verified_deal: true,
                    client: Address::new("f1client"),
                    provider: Address::new(provider),
                    label: piece_cid.to_string(),
                    start_epoch: 1_000,
                    end_epoch: 1_000 + MIN_DEAL_DURATION,
                    storage_price_per_epoch: TokenAmount::ZERO,
                    provider_collateral: TokenAmount::ZERO,
                    client_collateral: TokenAmount::ZERO,
                },
                client_signature: Signature {
                    kind: 1,
                    data: vec![0; 32],
                },
            },
            deal_data_root: piece_cid,
            transfer: Transfer {
                kind: "http".into(),
                params: b"{}".to_vec(),
                size: 100,
            },
            remove_unsealed_copy: false,
            skip_ipni_announce: false,
        }
    }

    fn published(replica: &Replica, state: MarketDealState) -> Replica {
        let mut replica = replica.clone();
        replica.last_provider_status = Some(ProviderDealStatus {
            deal_uuid: replica.deal_uuid(),
            status: "Published".into(),
            publish_cid: Some(Cid::raw_sha256(b"publish")),
            chain_deal_id: 7,
        });
        replica.last_chain_status = Some(MarketDeal {
            proposal: replica.deal.proposal().clone(),
            state,
        });
        replica
    }

    const UNSET: MarketDealState = MarketDealState {
        sector_start_epoch: -1,
        last_updated_epoch: -1,
        slash_epoch: -1,
    };

    #[test]
    fn fresh_replica_is_accepted() {
        assert_eq!(Replica::new(deal("f01000")).status(0), ReplicaStatus::Accepted);
    }

    #[test]
    fn failed_first_check_stays_accepted() {
        let mut replica = Replica::new(deal("f01000"));
        assert!(!replica.is_unresolved());

        let now = SystemTime::now();
        replica.reset_checks(now);
        replica.fail(ReplicationError::chain("connection reset"), now);
        assert_eq!(replica.status(0), ReplicaStatus::Accepted);
        assert!(replica.is_unresolved());
        assert_eq!(replica.failing_since, Some(now));
    }

    #[test]
    fn provider_status_without_chain_is_accepted() {
        let mut replica = Replica::new(deal("f01000"));
        replica.last_provider_status = Some(ProviderDealStatus {
            deal_uuid: replica.deal_uuid(),
            status: "Transferring".into(),
            publish_cid: None,
            chain_deal_id: 0,
        });
        assert_eq!(replica.status(0), ReplicaStatus::Accepted);
    }

    #[test]
    fn published_then_active() {
        let replica = Replica::new(deal("f01000"));
        assert_eq!(published(&replica, UNSET).status(2_000), ReplicaStatus::Published);

        let active = MarketDealState {
            sector_start_epoch: 1_500,
            ..UNSET
        };
        assert_eq!(published(&replica, active).status(2_000), ReplicaStatus::Active);
    }

    #[test]
    fn expired_after_end_epoch() {
        let replica = published(
            &Replica::new(deal("f01000")),
            MarketDealState {
                sector_start_epoch: 1_500,
                ..UNSET
            },
        );
        let end = replica.deal.proposal().end_epoch;
        assert_eq!(replica.status(end), ReplicaStatus::Active);
        assert_eq!(replica.status(end + 1), ReplicaStatus::Expired);
    }

    #[test]
    fn slashed_takes_priority() {
        let replica = published(
            &Replica::new(deal("f01000")),
            MarketDealState {
                sector_start_epoch: 1_500,
                last_updated_epoch: 1_600,
                slash_epoch: 1_700,
            },
        );
        let end = replica.deal.proposal().end_epoch;
        assert_eq!(replica.status(2_000), ReplicaStatus::Slashed);
        assert_eq!(replica.status(end + 10), ReplicaStatus::Slashed);
    }

    #[test]
    fn mismatch_is_never_published_or_active() {
        let mut replica = published(
            &Replica::new(deal("f01000")),
            MarketDealState {
                sector_start_epoch: 1_500,
                ..UNSET
            },
        );
        if let Some(chain) = replica.last_chain_status.as_mut() {
            chain.proposal.provider = Address::new("f09999");
        }
        assert!(!replica.matches_proposal_on_chain());
        assert_eq!(replica.status(2_000), ReplicaStatus::Accepted);
    }

    #[test]
    fn proposal_comparison_names_field() {
        let original = deal("f01000");
        let mut on_chain = original.proposal().clone();
        on_chain.end_epoch += 1;
        match verify_proposals_match(original.proposal(), &on_chain) {
            Err(ReplicationError::ProposalMismatch { field, .. }) => assert_eq!(field, "end epoch"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn expiration_from_genesis() {
        let replica = Replica::new(deal("f01000"));
        let genesis = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let end = replica.deal.proposal().end_epoch as u64;
        assert_eq!(
            replica.expiration(genesis),
            genesis + Duration::from_secs(end * 30)
        );
    }

    #[test]
    fn failing_since_is_sticky() {
        let mut replica = Replica::new(deal("f01000"));
        let first = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        replica.fail(ReplicationError::chain("down"), first);
        replica.reset_checks(first + Duration::from_secs(5));
        replica.fail(ReplicationError::chain("down"), first + Duration::from_secs(5));
        assert_eq!(replica.failing_since, Some(first));
    }

    #[test]
    fn status_names() {
        assert_eq!(ReplicaStatus::Published.to_string(), "published");
        assert_eq!(
            serde_json::to_string(&ReplicaStatus::Slashed).unwrap(),
            "\"slashed\""
        );
    }
}
