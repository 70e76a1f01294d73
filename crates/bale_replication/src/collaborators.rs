//! Boundaries to the wallet, the chain, storage providers and data transfer,
//! plus the pluggable deal policies.
//!
//! Everything here is an interface; [`crate::mock`] holds in-memory
//! implementations.

use crate::error::{ReplicationError, ReplicationResult};
use crate::types::{
    Address, ChainEpoch, CollateralBounds, DealRequest, DealResponse, MarketDeal, OffloadTarget,
    PeerInfo, ProviderDealStatus, Signature, TokenAmount,
};
use async_trait::async_trait;
use bale_core::{CancellationToken, PaddedPieceSize, Piece, GIB};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::SystemTime;
use uuid::Uuid;

/// Signs on behalf of the client.
///
/// Signing must be deterministic per key and free of side effects.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Signs `payload`.
    async fn sign(&self, payload: &[u8]) -> ReplicationResult<Signature>;

    /// The client address.
    async fn address(&self) -> ReplicationResult<Address>;
}

/// Read access to chain state.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain height.
    async fn chain_head(&self) -> ReplicationResult<ChainEpoch>;

    /// Network identity of a provider.
    async fn state_miner_info(&self, provider: &Address) -> ReplicationResult<PeerInfo>;

    /// Collateral range for a deal of `size`.
    async fn state_deal_provider_collateral_bounds(
        &self,
        size: PaddedPieceSize,
        verified: bool,
    ) -> ReplicationResult<CollateralBounds>;

    /// Market state of a published deal.
    async fn state_market_storage_deal(&self, deal_id: u64) -> ReplicationResult<MarketDeal>;

    /// Wall time of the genesis block.
    async fn chain_get_genesis(&self) -> ReplicationResult<SystemTime>;
}

/// Storage-market protocol client.
#[async_trait]
pub trait DealClient: Send + Sync {
    /// Opens a connection to a provider.
    async fn connect(&self, peer: &PeerInfo) -> ReplicationResult<()>;

    /// Whether a connected provider speaks `protocol`.
    async fn supports_protocol(&self, peer: &PeerInfo, protocol: &str) -> ReplicationResult<bool>;

    /// Submits a proposal.
    async fn propose_deal(
        &self,
        peer: &PeerInfo,
        request: &DealRequest,
    ) -> ReplicationResult<DealResponse>;

    /// Queries a deal; `signature` is the client's signature over the UUID bytes.
    async fn deal_status(
        &self,
        peer: &PeerInfo,
        deal_uuid: Uuid,
        signature: &Signature,
    ) -> ReplicationResult<ProviderDealStatus>;

    /// Transfer kinds a provider accepts.
    async fn query_transports(&self, peer: &PeerInfo) -> ReplicationResult<Vec<String>>;
}

/// Makes piece bytes available to providers.
pub trait Offloader: Send + Sync {
    /// Describes where the bytes of `piece` can be fetched.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Offload`] if the piece cannot be offered.
    fn offload(&self, piece: &Piece) -> ReplicationResult<OffloadTarget>;
}

/// Offers pieces over HTTP at `<base>/piece/<cid>`.
#[derive(Debug, Clone)]
pub struct HttpOffloader {
    base_url: String,
    headers: BTreeMap<String, String>,
}

impl HttpOffloader {
    /// Serves pieces under `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Adds a header every fetch must send.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl Offloader for HttpOffloader {
    fn offload(&self, piece: &Piece) -> ReplicationResult<OffloadTarget> {
        let base = self.base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(ReplicationError::offload("no base URL configured"));
        }
        Ok(OffloadTarget {
            kind: "http".to_string(),
            url: format!("{base}/piece/{}", piece.cid()),
            headers: self.headers.clone(),
        })
    }
}

/// Chooses the providers a piece should be replicated to.
#[async_trait]
pub trait ProviderSelector: Send + Sync {
    /// Providers for `piece`; an empty list skips the piece.
    async fn select(&self, piece: &Piece) -> ReplicationResult<Vec<Address>>;
}

/// Always selects the same providers.
#[derive(Debug, Clone, Default)]
pub struct StaticProviders(pub Vec<Address>);

#[async_trait]
impl ProviderSelector for StaticProviders {
    async fn select(&self, _piece: &Piece) -> ReplicationResult<Vec<Address>> {
        Ok(self.0.clone())
    }
}

/// Picks provider collateral within the market bounds.
pub trait CollateralPolicy: Send + Sync {
    /// Collateral for a deal given the accepted range.
    fn pick(&self, bounds: CollateralBounds) -> TokenAmount;
}

/// Picks the lowest acceptable collateral.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimumCollateral;

impl CollateralPolicy for MinimumCollateral {
    fn pick(&self, bounds: CollateralBounds) -> TokenAmount {
        bounds.min
    }
}

/// Picks the storage price per epoch.
pub trait PricePolicy: Send + Sync {
    /// Price for a piece of `size` stored from `start` to `end`.
    fn price(&self, size: PaddedPieceSize, start: ChainEpoch, end: ChainEpoch) -> TokenAmount;
}

/// Prices by whole GiB: the largest of a per-GiB price, a per-GiB-epoch
/// price over the deal duration, and a flat per-deal price.
#[derive(Debug, Clone, Copy, Default)]
pub struct GibPricing {
    /// Price per GiB.
    pub per_gib: TokenAmount,
    /// Price per GiB per epoch.
    pub per_gib_epoch: TokenAmount,
    /// Flat price per deal.
    pub per_deal: TokenAmount,
}

impl PricePolicy for GibPricing {
    #[allow(clippy::cast_sign_loss)]
    fn price(&self, size: PaddedPieceSize, start: ChainEpoch, end: ChainEpoch) -> TokenAmount {
        let gib = u128::from(size.get() / GIB);
        let epochs = (end - start).max(0) as u128;
        let per_gib = self.per_gib.saturating_mul(gib);
        let per_gib_epoch = self.per_gib_epoch.saturating_mul(gib.saturating_mul(epochs));
        per_gib.max(per_gib_epoch).max(self.per_deal)
    }
}

/// Runs a collaborator call unless `cancel` fires first.
pub(crate) async fn guarded<T, F>(cancel: &CancellationToken, call: F) -> ReplicationResult<T>
where
    F: Future<Output = ReplicationResult<T>>,
{
    cancel
        .run_until_cancelled(call)
        .await
        .unwrap_or(Err(ReplicationError::Cancelled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gib_pricing_takes_maximum() {
        let size = PaddedPieceSize::new(32 * GIB).unwrap();
        let pricing = GibPricing {
            per_gib: TokenAmount::from_atto(10),
            per_gib_epoch: TokenAmount::from_atto(1),
            per_deal: TokenAmount::from_atto(5),
        };
        assert_eq!(pricing.price(size, 0, 100), TokenAmount::from_atto(3200));
        assert_eq!(pricing.price(size, 0, 5), TokenAmount::from_atto(320));

        let flat = GibPricing {
            per_deal: TokenAmount::from_atto(1_000_000),
            ..GibPricing::default()
        };
        assert_eq!(flat.price(size, 0, 100), TokenAmount::from_atto(1_000_000));
    }

    #[test]
    fn sub_gib_pieces_price_at_zero_gib() {
        let size = PaddedPieceSize::new(1 << 20).unwrap();
        let pricing = GibPricing {
            per_gib: TokenAmount::from_atto(10),
            ..GibPricing::default()
        };
        assert_eq!(pricing.price(size, 0, 100), TokenAmount::ZERO);
    }

    #[test]
    fn minimum_collateral() {
        let bounds = CollateralBounds {
            min: TokenAmount::from_atto(3),
            max: TokenAmount::from_atto(9),
        };
        assert_eq!(MinimumCollateral.pick(bounds), TokenAmount::from_atto(3));
    }

    #[tokio::test]
    async fn guarded_observes_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result: ReplicationResult<()> =
            guarded(&token, std::future::pending::<ReplicationResult<()>>()).await;
        assert!(matches!(result, Err(ReplicationError::Cancelled)));

        let live = CancellationToken::new();
        assert_eq!(guarded(&live, async { Ok(7) }).await.unwrap(), 7);
    }
}
