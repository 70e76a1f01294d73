//! Turning a piece and a provider into an accepted storage deal.

use crate::collaborators::{
    guarded, ChainClient, CollateralPolicy, DealClient, Offloader, PricePolicy, Wallet,
};
use crate::config::DealConfig;
use crate::error::{ReplicationError, ReplicationResult};
use crate::types::{
    Address, ClientDealProposal, DealProposal, DealRequest, HttpTransferParams, TokenAmount,
    Transfer, MIN_DEAL_DURATION, STORAGE_MARKET_PROTOCOL,
};
use async_trait::async_trait;
use bale_core::{CancellationToken, Piece};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument, Span};
use uuid::Uuid;

/// Makes storage deals for pieces.
#[async_trait]
pub trait Dealer: Send + Sync {
    /// Proposes `piece` to `provider` and returns the accepted deal.
    ///
    /// # Errors
    ///
    /// - [`ReplicationError::DealTooShort`] before any network call if the
    ///   configured duration is below [`MIN_DEAL_DURATION`]
    /// - [`ReplicationError::DealRejected`] if the provider declines
    /// - collaborator errors, and [`ReplicationError::Cancelled`]
    async fn deal(
        &self,
        piece: &Piece,
        provider: &Address,
        cancel: &CancellationToken,
    ) -> ReplicationResult<DealRequest>;
}

/// Dealer speaking storage market protocol 1.2.0.
pub struct MarketDealer {
    wallet: Arc<dyn Wallet>,
    chain: Arc<dyn ChainClient>,
    client: Arc<dyn DealClient>,
    offloader: Arc<dyn Offloader>,
    collateral: Arc<dyn CollateralPolicy>,
    price: Arc<dyn PricePolicy>,
    config: DealConfig,
    span: Span,
}

impl MarketDealer {
    /// Creates a dealer over the given collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wallet: Arc<dyn Wallet>,
        chain: Arc<dyn ChainClient>,
        client: Arc<dyn DealClient>,
        offloader: Arc<dyn Offloader>,
        collateral: Arc<dyn CollateralPolicy>,
        price: Arc<dyn PricePolicy>,
        config: DealConfig,
        span: Span,
    ) -> Self {
        Self {
            wallet,
            chain,
            client,
            offloader,
            collateral,
            price,
            config,
            span,
        }
    }

    /// The deal parameters in use.
    pub fn config(&self) -> &DealConfig {
        &self.config
    }

    async fn make_deal(
        &self,
        piece: &Piece,
        provider: &Address,
        cancel: &CancellationToken,
    ) -> ReplicationResult<DealRequest> {
        if self.config.duration < MIN_DEAL_DURATION {
            return Err(ReplicationError::DealTooShort {
                duration: self.config.duration,
                min: MIN_DEAL_DURATION,
            });
        }

        let client = guarded(cancel, self.wallet.address()).await?;
        let peer = guarded(cancel, self.chain.state_miner_info(provider)).await?;
        guarded(cancel, self.client.connect(&peer)).await?;
        if !guarded(
            cancel,
            self.client.supports_protocol(&peer, STORAGE_MARKET_PROTOCOL),
        )
        .await?
        {
            return Err(ReplicationError::provider(
                provider,
                format!("does not support {STORAGE_MARKET_PROTOCOL}"),
            ));
        }

        let head = guarded(cancel, self.chain.chain_head()).await?;
        let start_epoch = head + self.config.start_delay;
        let end_epoch = start_epoch + self.config.duration;

        let bounds = guarded(
            cancel,
            self.chain
                .state_deal_provider_collateral_bounds(piece.size(), self.config.verified),
        )
        .await?;

        let proposal = DealProposal {
            piece_cid: piece.cid().clone(),
            piece_size: piece.size(),
            verified_deal: self.config.verified,
            client,
            provider: provider.clone(),
            label: piece.cid().to_string(),
            start_epoch,
            end_epoch,
            storage_price_per_epoch: self.price.price(piece.size(), start_epoch, end_epoch),
            provider_collateral: self.collateral.pick(bounds),
            client_collateral: TokenAmount::ZERO,
        };
        let client_signature = guarded(cancel, self.wallet.sign(&proposal.to_cbor()?)).await?;

        let target = self.offloader.offload(piece)?;
        if !self.config.offline {
            let transports = guarded(cancel, self.client.query_transports(&peer)).await?;
            if !transports.iter().any(|t| *t == target.kind) {
                return Err(ReplicationError::provider(
                    provider,
                    format!("does not accept {} transfers", target.kind),
                ));
            }
        }
        let params = serde_json::to_vec(&HttpTransferParams {
            url: target.url,
            headers: target.headers,
        })
        .map_err(|e| ReplicationError::offload(e.to_string()))?;

        let request = DealRequest {
            deal_uuid: Uuid::new_v4(),
            is_offline: self.config.offline,
            client_deal_proposal: ClientDealProposal {
                proposal,
                client_signature,
            },
            deal_data_root: piece.cid().clone(),
            transfer: Transfer {
                kind: target.kind,
                params,
                size: piece.total_segmented_size,
            },
            remove_unsealed_copy: self.config.remove_unsealed_copy,
            skip_ipni_announce: self.config.skip_ipni_announce,
        };

        debug!(deal = %request.deal_uuid, start_epoch, end_epoch, "submitting proposal");
        let response = guarded(cancel, self.client.propose_deal(&peer, &request)).await?;
        if !response.accepted {
            return Err(ReplicationError::DealRejected {
                provider: provider.clone(),
                reason: response.message,
            });
        }
        Ok(request)
    }
}

#[async_trait]
impl Dealer for MarketDealer {
    async fn deal(
        &self,
        piece: &Piece,
        provider: &Address,
        cancel: &CancellationToken,
    ) -> ReplicationResult<DealRequest> {
        let span = self.span.clone();
        async {
            match self.make_deal(piece, provider, cancel).await {
                Ok(request) => {
                    info!(
                        piece = %piece.cid(),
                        %provider,
                        deal = %request.deal_uuid,
                        "deal accepted"
                    );
                    Ok(request)
                }
                Err(err) => {
                    warn!(piece = %piece.cid(), %provider, error = %err, "deal failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{GibPricing, HttpOffloader, MinimumCollateral};
    use crate::mock::{MockChain, MockDealClient, MockWallet};
    use crate::types::CollateralBounds;
    use bale_core::{pack, piece_commitment, PackConfig, Segment};
    use std::time::UNIX_EPOCH;

    struct Harness {
        chain: Arc<MockChain>,
        client: Arc<MockDealClient>,
        provider: Address,
    }

    fn harness() -> Harness {
        let chain = Arc::new(MockChain::new(1000));
        let provider = Address::new("f01000");
        chain.add_miner(&provider);
        chain.set_bounds(CollateralBounds {
            min: TokenAmount::from_atto(11),
            max: TokenAmount::from_atto(99),
        });
        Harness {
            chain,
            client: Arc::new(MockDealClient::new()),
            provider,
        }
    }

    fn dealer(h: &Harness, config: DealConfig) -> MarketDealer {
        MarketDealer::new(
            Arc::new(MockWallet::new("f1client")),
            h.chain.clone(),
            h.client.clone(),
            Arc::new(HttpOffloader::new("https://pieces.example.net/")),
            Arc::new(MinimumCollateral),
            Arc::new(GibPricing::default()),
            config,
            Span::none(),
        )
    }

    fn piece() -> Piece {
        let info = piece_commitment(b"some client data").unwrap();
        let segment = Arc::new(Segment {
            locator: Segment::locator_for(&info.cid),
            info,
            raw_size: 16,
            segmented_size: 16 + 37,
            created_at: UNIX_EPOCH,
        });
        let config = PackConfig::new().capacity(1024).max_pieces(1);
        pack(vec![segment], &config).unwrap().pieces.remove(0)
    }

    #[tokio::test]
    async fn builds_and_submits_proposal() {
        let h = harness();
        let dealer = dealer(&h, DealConfig::default());
        let piece = piece();
        let request = dealer
            .deal(&piece, &h.provider, &CancellationToken::new())
            .await
            .unwrap();

        let proposal = request.proposal();
        assert_eq!(proposal.start_epoch, 1000 + 11_520);
        assert_eq!(proposal.duration(), 1_051_200);
        assert_eq!(proposal.provider_collateral, TokenAmount::from_atto(11));
        assert_eq!(proposal.piece_cid, *piece.cid());
        assert_eq!(proposal.label, piece.cid().to_string());
        assert!(request.is_offline);
        assert_eq!(request.transfer.size, piece.total_segmented_size);

        let params: serde_json::Value = serde_json::from_slice(&request.transfer.params).unwrap();
        assert_eq!(
            params["URL"],
            format!("https://pieces.example.net/piece/{}", piece.cid())
        );
        assert_eq!(h.client.proposals().len(), 1);
    }

    #[tokio::test]
    async fn short_duration_fails_before_network() {
        let h = harness();
        let dealer = dealer(&h, DealConfig::default().with_duration(MIN_DEAL_DURATION - 1));
        let err = dealer
            .deal(&piece(), &h.provider, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicationError::DealTooShort { .. }));
        assert_eq!(h.chain.calls(), 0);
        assert_eq!(h.client.calls(), 0);
    }

    #[tokio::test]
    async fn rejection_carries_reason() {
        let h = harness();
        h.client.reject_with("no capacity");
        let err = dealer(&h, DealConfig::default())
            .deal(&piece(), &h.provider, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ReplicationError::DealRejected { provider, reason } => {
                assert_eq!(provider, h.provider);
                assert_eq!(reason, "no capacity");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn online_deal_requires_transport() {
        let h = harness();
        h.client.set_transports(vec!["libp2p".into()]);
        let err = dealer(&h, DealConfig::default().with_offline(false))
            .deal(&piece(), &h.provider, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Provider { .. }));
        assert!(h.client.proposals().is_empty());
    }

    #[tokio::test]
    async fn missing_protocol() {
        let h = harness();
        h.client.set_protocols(Vec::new());
        let err = dealer(&h, DealConfig::default())
            .deal(&piece(), &h.provider, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Provider { .. }));
    }

    #[tokio::test]
    async fn cancelled_before_first_call() {
        let h = harness();
        let token = CancellationToken::new();
        token.cancel();
        let err = dealer(&h, DealConfig::default())
            .deal(&piece(), &h.provider, &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
