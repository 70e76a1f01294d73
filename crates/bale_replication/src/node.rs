//! A complete node: segmentation, packing, deal making and verification
//! over one blob store and one set of collaborators.

use crate::collaborators::{
    guarded, ChainClient, CollateralPolicy, DealClient, GibPricing, MinimumCollateral, Offloader,
    PricePolicy, ProviderSelector, Wallet,
};
use crate::config::{DealConfig, ReplicatorConfig};
use crate::dealer::MarketDealer;
use crate::engine::{EngineContext, ReplicationEngine, Replicator};
use crate::error::ReplicationResult;
use crate::replica::{Replica, ReplicaStatus};
use crate::types::Address;
use async_trait::async_trait;
use bale_codec::Cid;
use bale_core::{
    ArchiveSegmentor, CancellationToken, Lifecycle, Retriever, Segment, Segmentor, SegmentorConfig,
};
use bale_storage::{BlobReader, BlobStore};
use serde::Serialize;
use std::io::Read;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{info, info_span, Span};

/// Settings for every component of a [`Node`].
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Chunking and size limits.
    pub segmentor: SegmentorConfig,
    /// Deal parameters.
    pub deal: DealConfig,
    /// Loop intervals, packing and health thresholds.
    pub replicator: ReplicatorConfig,
}

impl NodeConfig {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the segmentor settings.
    #[must_use]
    pub fn with_segmentor(mut self, config: SegmentorConfig) -> Self {
        self.segmentor = config;
        self
    }

    /// Replaces the deal settings.
    #[must_use]
    pub fn with_deal(mut self, config: DealConfig) -> Self {
        self.deal = config;
        self
    }

    /// Replaces the replicator settings.
    #[must_use]
    pub fn with_replicator(mut self, config: ReplicatorConfig) -> Self {
        self.replicator = config;
        self
    }
}

/// External services a node talks to, plus its deal policies.
pub struct Collaborators {
    /// Client wallet.
    pub wallet: Arc<dyn Wallet>,
    /// Chain state.
    pub chain: Arc<dyn ChainClient>,
    /// Provider protocol client.
    pub client: Arc<dyn DealClient>,
    /// Where providers fetch piece bytes.
    pub offloader: Arc<dyn Offloader>,
    /// Provider choice per piece.
    pub selector: Arc<dyn ProviderSelector>,
    /// Collateral choice; defaults to [`MinimumCollateral`].
    pub collateral: Arc<dyn CollateralPolicy>,
    /// Price choice; defaults to free [`GibPricing`].
    pub price: Arc<dyn PricePolicy>,
}

impl Collaborators {
    /// Collaborators with the default deal policies.
    pub fn new(
        wallet: Arc<dyn Wallet>,
        chain: Arc<dyn ChainClient>,
        client: Arc<dyn DealClient>,
        offloader: Arc<dyn Offloader>,
        selector: Arc<dyn ProviderSelector>,
    ) -> Self {
        Self {
            wallet,
            chain,
            client,
            offloader,
            selector,
            collateral: Arc::new(MinimumCollateral),
            price: Arc::new(GibPricing::default()),
        }
    }

    /// Replaces the collateral policy.
    #[must_use]
    pub fn with_collateral(mut self, policy: Arc<dyn CollateralPolicy>) -> Self {
        self.collateral = policy;
        self
    }

    /// Replaces the price policy.
    #[must_use]
    pub fn with_price(mut self, policy: Arc<dyn PricePolicy>) -> Self {
        self.price = policy;
        self
    }
}

/// A segment and the state of its replicas.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentDescription {
    /// Segment CID.
    pub cid: String,
    /// Client bytes before framing.
    pub raw_size: u64,
    /// Archive bytes after framing.
    pub segmented_size: u64,
    /// When the segment was stored.
    pub created_at: SystemTime,
    /// One entry per tracked deal.
    pub replicas: Vec<ReplicaView>,
}

/// What a caller needs to know about one replica.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicaView {
    /// Storage provider.
    pub provider: Address,
    /// Status at the current chain head.
    pub status: ReplicaStatus,
    /// Last verification time.
    pub last_verified: Option<SystemTime>,
    /// When the deal ends.
    pub expiration: SystemTime,
    /// Outcome of the last failed verification.
    pub last_error: Option<String>,
}

impl ReplicaView {
    fn new(replica: &Replica, head: i64, genesis: SystemTime) -> Self {
        Self {
            provider: replica.provider().clone(),
            status: replica.status(head),
            last_verified: replica.last_checked,
            expiration: replica.expiration(genesis),
            last_error: replica.last_error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Segmentor and replication engine wired to shared collaborators.
pub struct Node {
    segmentor: Arc<ArchiveSegmentor>,
    engine: ReplicationEngine,
    chain: Arc<dyn ChainClient>,
    span: Span,
}

impl Node {
    /// Opens the segment index in `store` and builds the engine.
    ///
    /// # Errors
    ///
    /// Fails for invalid configuration or an unreadable segment manifest.
    pub fn open(
        store: Arc<dyn BlobStore>,
        config: NodeConfig,
        collaborators: Collaborators,
    ) -> ReplicationResult<Self> {
        let span = info_span!("node");
        let segmentor = Arc::new(ArchiveSegmentor::open(
            store,
            config.segmentor,
            info_span!(parent: &span, "segmentor"),
        )?);
        let dealer = Arc::new(MarketDealer::new(
            Arc::clone(&collaborators.wallet),
            Arc::clone(&collaborators.chain),
            Arc::clone(&collaborators.client),
            collaborators.offloader,
            collaborators.collateral,
            collaborators.price,
            config.deal,
            info_span!(parent: &span, "dealer"),
        ));
        let engine = ReplicationEngine::new(
            EngineContext {
                segmentor: segmentor.clone(),
                dealer,
                chain: Arc::clone(&collaborators.chain),
                client: collaborators.client,
                wallet: collaborators.wallet,
                selector: collaborators.selector,
            },
            config.replicator,
            info_span!(parent: &span, "replicator"),
        )?;
        Ok(Self {
            segmentor,
            engine,
            chain: collaborators.chain,
            span,
        })
    }

    /// Segments `input` into a new stored segment.
    ///
    /// # Errors
    ///
    /// See [`Segmentor::segment`].
    pub fn segment(
        &self,
        input: &mut dyn Read,
        cancel: &CancellationToken,
    ) -> ReplicationResult<Arc<Segment>> {
        Ok(self.segmentor.segment(input, cancel)?)
    }

    /// Looks up a stored segment.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for unknown CIDs.
    pub fn get_segment(&self, cid: &Cid) -> ReplicationResult<Arc<Segment>> {
        Ok(self.segmentor.get_segment(cid)?)
    }

    /// All stored segments, ordered by CID.
    ///
    /// # Errors
    ///
    /// Propagates segmentor failures.
    pub fn list_segments(&self) -> ReplicationResult<Vec<Arc<Segment>>> {
        Ok(self.segmentor.list_segments()?)
    }

    /// Opens the archive bytes of a segment.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for unknown CIDs.
    pub fn retrieve(&self, cid: &Cid) -> ReplicationResult<BlobReader> {
        Ok(self.segmentor.retrieve(cid)?)
    }

    /// Replicas backing a segment.
    ///
    /// # Errors
    ///
    /// See [`Replicator::replicas`].
    pub fn replicas(&self, cid: &Cid) -> ReplicationResult<Vec<Replica>> {
        self.engine.replicas(cid)
    }

    /// A segment with a view of each of its replicas at the current head.
    ///
    /// # Errors
    ///
    /// Fails for unknown segments or if the chain cannot be reached.
    pub async fn describe(&self, cid: &Cid) -> ReplicationResult<SegmentDescription> {
        let segment = self.get_segment(cid)?;
        let replicas = match self.engine.replicas(cid) {
            Ok(replicas) => replicas,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => return Err(err),
        };

        let mut views = Vec::with_capacity(replicas.len());
        if !replicas.is_empty() {
            let cancel = self.engine.cancellation_token();
            let genesis = guarded(&cancel, self.chain.chain_get_genesis()).await?;
            let head = guarded(&cancel, self.chain.chain_head()).await?;
            views.extend(replicas.iter().map(|r| ReplicaView::new(r, head, genesis)));
        }

        Ok(SegmentDescription {
            cid: segment.cid().to_string(),
            raw_size: segment.raw_size,
            segmented_size: segment.segmented_size,
            created_at: segment.created_at,
            replicas: views,
        })
    }

    /// The segmentor.
    pub fn segmentor(&self) -> &ArchiveSegmentor {
        &self.segmentor
    }

    /// The replication engine.
    pub fn engine(&self) -> &ReplicationEngine {
        &self.engine
    }
}

#[async_trait]
impl Lifecycle for Node {
    type Error = crate::error::ReplicationError;

    async fn start(&self) -> ReplicationResult<()> {
        self.segmentor.start().await?;
        self.engine.start().await?;
        self.span.in_scope(|| info!("node started"));
        Ok(())
    }

    async fn shutdown(&self) -> ReplicationResult<()> {
        self.engine.shutdown().await?;
        self.segmentor.shutdown().await?;
        self.span.in_scope(|| info!("node stopped"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{HttpOffloader, StaticProviders};
    use crate::mock::{MockChain, MockDealClient, MockWallet};
    use bale_storage::InMemoryStore;
    use std::io::Read as _;

    fn node() -> (Node, Arc<MockChain>) {
        let chain = Arc::new(MockChain::new(500));
        let provider = Address::new("f01234");
        chain.add_miner(&provider);
        let collaborators = Collaborators::new(
            Arc::new(MockWallet::new("f1client")),
            chain.clone(),
            Arc::new(MockDealClient::new()),
            Arc::new(HttpOffloader::new("http://localhost:8080")),
            Arc::new(StaticProviders(vec![provider])),
        );
        let config = NodeConfig::new()
            .with_replicator(ReplicatorConfig::new().with_piece_capacity(1 << 20));
        let node = Node::open(Arc::new(InMemoryStore::new()), config, collaborators).unwrap();
        (node, chain)
    }

    #[tokio::test]
    async fn describe_without_replicas() {
        let (node, _) = node();
        let segment = node
            .segment(&mut &b"describe me"[..], &CancellationToken::new())
            .unwrap();
        let description = node.describe(segment.cid()).await.unwrap();
        assert_eq!(description.raw_size, 11);
        assert!(description.replicas.is_empty());
        assert!(node.replicas(segment.cid()).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn describe_after_replication() {
        let (node, _) = node();
        let segment = node
            .segment(&mut &b"replicate me"[..], &CancellationToken::new())
            .unwrap();
        node.engine().replicate_once().await.unwrap();

        let description = node.describe(segment.cid()).await.unwrap();
        assert_eq!(description.replicas.len(), 1);
        let view = &description.replicas[0];
        assert_eq!(view.provider, Address::new("f01234"));
        assert_eq!(view.status, ReplicaStatus::Accepted);
        assert!(view.last_verified.is_none());
        assert!(view.expiration > SystemTime::UNIX_EPOCH);

        let json = serde_json::to_value(&description).unwrap();
        assert_eq!(json["replicas"][0]["status"], "accepted");
    }

    #[tokio::test]
    async fn retrieve_returns_archive_bytes() {
        let (node, _) = node();
        let segment = node
            .segment(&mut &b"archive"[..], &CancellationToken::new())
            .unwrap();
        let mut bytes = Vec::new();
        node.retrieve(segment.cid())
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        assert_eq!(bytes.len() as u64, segment.segmented_size);
        assert_eq!(node.list_segments().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lifecycle_round_trip() {
        let (node, _) = node();
        node.start().await.unwrap();
        node.shutdown().await.unwrap();
        assert!(node.engine().cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn unknown_segment() {
        let (node, _) = node();
        let missing = Cid::raw_sha256(b"missing");
        assert!(node.describe(&missing).await.unwrap_err().is_not_found());
    }
}
