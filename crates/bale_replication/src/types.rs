//! Chain and market data exchanged with collaborators.

use bale_codec::{to_canonical_cbor, Cid, CodecResult, Value, CID_LINK_TAG};
use bale_core::PaddedPieceSize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Chain height, in epochs since genesis.
pub type ChainEpoch = i64;

/// Wall time covered by one epoch.
pub const EPOCH_DURATION_SECONDS: u64 = 30;

/// Epochs in one day.
pub const EPOCHS_IN_DAY: ChainEpoch = 2880;

/// Epochs in one year of 365 days.
pub const EPOCHS_IN_YEAR: ChainEpoch = 365 * EPOCHS_IN_DAY;

/// Shortest deal the market accepts: six 30-day months.
pub const MIN_DEAL_DURATION: ChainEpoch = 180 * EPOCHS_IN_DAY;

/// Protocol used to propose deals and query their status.
pub const STORAGE_MARKET_PROTOCOL: &str = "/fil/storage/mk/1.2.0";

/// Converts an epoch to wall time given the genesis time.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn epoch_to_time(genesis: SystemTime, epoch: ChainEpoch) -> SystemTime {
    let secs = epoch.max(0) as u64 * EPOCH_DURATION_SECONDS;
    genesis + Duration::from_secs(secs)
}

/// An actor address in its text form, e.g. `f01234`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps an address string.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The address text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount of the native token, in atto units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TokenAmount(u128);

impl TokenAmount {
    /// Zero tokens.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from atto units.
    #[must_use]
    pub const fn from_atto(atto: u128) -> Self {
        Self(atto)
    }

    /// The amount in atto units.
    #[must_use]
    pub const fn atto(self) -> u128 {
        self.0
    }

    /// Multiplies, saturating at the maximum.
    #[must_use]
    pub const fn saturating_mul(self, factor: u128) -> Self {
        Self(self.0.saturating_mul(factor))
    }

    /// Big-integer byte form: empty for zero, else a sign byte and the
    /// big-endian magnitude.
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        if self.0 == 0 {
            return Vec::new();
        }
        let be = self.0.to_be_bytes();
        let skip = be.iter().take_while(|b| **b == 0).count();
        let mut out = Vec::with_capacity(1 + be.len() - skip);
        out.push(0);
        out.extend_from_slice(&be[skip..]);
        out
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signature produced by the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Signature scheme (1 = secp256k1, 2 = BLS).
    pub kind: u8,
    /// Signature bytes.
    pub data: Vec<u8>,
}

impl Signature {
    /// Type-prefixed byte form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.push(self.kind);
        out.extend_from_slice(&self.data);
        out
    }
}

/// Network identity of a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Peer identifier.
    pub id: String,
    /// Dialable addresses.
    pub addrs: Vec<String>,
}

/// Provider collateral range accepted by the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralBounds {
    /// Lowest acceptable collateral.
    pub min: TokenAmount,
    /// Highest acceptable collateral.
    pub max: TokenAmount,
}

/// Market deal proposal, as signed by the client and stored on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealProposal {
    /// Commitment of the piece being stored.
    pub piece_cid: Cid,
    /// Padded size of the piece.
    pub piece_size: PaddedPieceSize,
    /// Whether the deal uses datacap.
    pub verified_deal: bool,
    /// Paying client.
    pub client: Address,
    /// Storing provider.
    pub provider: Address,
    /// Free-form label.
    pub label: String,
    /// First epoch of the deal.
    pub start_epoch: ChainEpoch,
    /// Epoch at which the deal ends.
    pub end_epoch: ChainEpoch,
    /// Price per epoch.
    pub storage_price_per_epoch: TokenAmount,
    /// Collateral locked by the provider.
    pub provider_collateral: TokenAmount,
    /// Collateral locked by the client.
    pub client_collateral: TokenAmount,
}

impl DealProposal {
    /// Number of epochs the deal runs for.
    #[must_use]
    pub fn duration(&self) -> ChainEpoch {
        self.end_epoch - self.start_epoch
    }

    /// Canonical CBOR encoding; this is what the client signs.
    ///
    /// # Errors
    ///
    /// Propagates encoder failures.
    pub fn to_cbor(&self) -> CodecResult<Vec<u8>> {
        let mut cid = vec![0u8];
        self.piece_cid.write_bytes(&mut cid);
        let value = Value::map(vec![
            (
                Value::text("PieceCID"),
                Value::Tag(CID_LINK_TAG, Box::new(Value::Bytes(cid))),
            ),
            (Value::text("PieceSize"), Value::unsigned(self.piece_size.get())),
            (Value::text("VerifiedDeal"), Value::Bool(self.verified_deal)),
            (Value::text("Client"), Value::text(self.client.as_str())),
            (Value::text("Provider"), Value::text(self.provider.as_str())),
            (Value::text("Label"), Value::text(self.label.as_str())),
            (Value::text("StartEpoch"), Value::Integer(self.start_epoch)),
            (Value::text("EndEpoch"), Value::Integer(self.end_epoch)),
            (
                Value::text("StoragePricePerEpoch"),
                Value::Bytes(self.storage_price_per_epoch.to_bytes()),
            ),
            (
                Value::text("ProviderCollateral"),
                Value::Bytes(self.provider_collateral.to_bytes()),
            ),
            (
                Value::text("ClientCollateral"),
                Value::Bytes(self.client_collateral.to_bytes()),
            ),
        ]);
        to_canonical_cbor(&value)
    }
}

/// A proposal together with the client's signature over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientDealProposal {
    /// The proposal.
    pub proposal: DealProposal,
    /// Signature over [`DealProposal::to_cbor`].
    pub client_signature: Signature,
}

/// How the provider obtains the piece bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Transport kind, e.g. `http`.
    pub kind: String,
    /// Transport parameters as JSON.
    pub params: Vec<u8>,
    /// Bytes to transfer.
    pub size: u64,
}

/// JSON parameters of an HTTP transfer.
#[derive(Debug, Clone, Serialize)]
pub struct HttpTransferParams {
    /// Where to fetch the piece.
    #[serde(rename = "URL")]
    pub url: String,
    /// Headers to send with the request.
    #[serde(rename = "Headers")]
    pub headers: BTreeMap<String, String>,
}

/// Where a provider can fetch a piece from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffloadTarget {
    /// Transport kind, e.g. `http`.
    pub kind: String,
    /// Location of the piece bytes.
    pub url: String,
    /// Headers required to fetch it.
    pub headers: BTreeMap<String, String>,
}

/// A deal as proposed to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealRequest {
    /// Client-chosen deal identifier.
    pub deal_uuid: Uuid,
    /// Whether the data is delivered out of band.
    pub is_offline: bool,
    /// Signed proposal.
    pub client_deal_proposal: ClientDealProposal,
    /// Root of the deal data.
    pub deal_data_root: Cid,
    /// Data transfer description.
    pub transfer: Transfer,
    /// Ask the provider not to keep an unsealed copy.
    pub remove_unsealed_copy: bool,
    /// Ask the provider not to announce to the indexer.
    pub skip_ipni_announce: bool,
}

impl DealRequest {
    /// The signed proposal.
    #[must_use]
    pub fn proposal(&self) -> &DealProposal {
        &self.client_deal_proposal.proposal
    }
}

/// Provider answer to a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealResponse {
    /// Whether the provider accepted the deal.
    pub accepted: bool,
    /// Reason when not accepted.
    pub message: String,
}

/// Deal status as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDealStatus {
    /// Deal identifier.
    pub deal_uuid: Uuid,
    /// Provider-side checkpoint, free form.
    pub status: String,
    /// Publish message, once the deal is on chain.
    pub publish_cid: Option<Cid>,
    /// On-chain deal id, meaningful once published.
    pub chain_deal_id: u64,
}

/// On-chain deal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarketDealState {
    /// Epoch the sector holding the deal was proven, or -1.
    pub sector_start_epoch: ChainEpoch,
    /// Epoch of the last payment update, or -1.
    pub last_updated_epoch: ChainEpoch,
    /// Epoch the deal was slashed, or -1.
    pub slash_epoch: ChainEpoch,
}

/// A deal as stored by the market actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDeal {
    /// Proposal recorded on chain.
    pub proposal: DealProposal,
    /// Current deal state.
    pub state: MarketDealState,
}
