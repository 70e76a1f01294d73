//! In-memory collaborators for tests and local runs.

use crate::collaborators::{ChainClient, DealClient, Wallet};
use crate::error::{ReplicationError, ReplicationResult};
use crate::types::{
    Address, ChainEpoch, CollateralBounds, DealRequest, DealResponse, MarketDeal, PeerInfo,
    ProviderDealStatus, Signature, TokenAmount, STORAGE_MARKET_PROTOCOL,
};
use async_trait::async_trait;
use bale_core::PaddedPieceSize;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::SystemTime;
use uuid::Uuid;

/// A wallet that signs with SHA-256 over a fixed key.
#[derive(Debug)]
pub struct MockWallet {
    address: Address,
    key: Vec<u8>,
    failing: AtomicBool,
}

impl MockWallet {
    /// Creates a wallet for `address`.
    pub fn new(address: impl Into<String>) -> Self {
        let address = Address::new(address);
        Self {
            key: address.as_str().as_bytes().to_vec(),
            address,
            failing: AtomicBool::new(false),
        }
    }

    /// Makes every call fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> ReplicationResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ReplicationError::wallet("wallet locked"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Wallet for MockWallet {
    async fn sign(&self, payload: &[u8]) -> ReplicationResult<Signature> {
        self.check()?;
        let mut hasher = Sha256::new();
        hasher.update(&self.key);
        hasher.update(payload);
        Ok(Signature {
            kind: 1,
            data: hasher.finalize().to_vec(),
        })
    }

    async fn address(&self) -> ReplicationResult<Address> {
        self.check()?;
        Ok(self.address.clone())
    }
}

#[derive(Debug)]
struct ChainState {
    head: ChainEpoch,
    genesis: SystemTime,
    miners: HashMap<Address, PeerInfo>,
    bounds: CollateralBounds,
    deals: HashMap<u64, MarketDeal>,
    head_available: bool,
}

/// A chain whose state is set directly by the test.
#[derive(Debug)]
pub struct MockChain {
    state: Mutex<ChainState>,
    calls: AtomicUsize,
}

impl MockChain {
    /// Creates a chain at `head` with genesis at the Unix epoch.
    pub fn new(head: ChainEpoch) -> Self {
        Self {
            state: Mutex::new(ChainState {
                head,
                genesis: SystemTime::UNIX_EPOCH,
                miners: HashMap::new(),
                bounds: CollateralBounds {
                    min: TokenAmount::ZERO,
                    max: TokenAmount::ZERO,
                },
                deals: HashMap::new(),
                head_available: true,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Moves the chain head.
    pub fn set_head(&self, head: ChainEpoch) {
        self.state.lock().head = head;
    }

    /// Makes `chain_head` fail while `available` is false.
    pub fn set_head_available(&self, available: bool) {
        self.state.lock().head_available = available;
    }

    /// Sets the genesis time.
    pub fn set_genesis(&self, genesis: SystemTime) {
        self.state.lock().genesis = genesis;
    }

    /// Registers a provider; its peer id is derived from the address.
    pub fn add_miner(&self, provider: &Address) -> PeerInfo {
        let peer = PeerInfo {
            id: format!("peer-{provider}"),
            addrs: vec![format!("/dns/{provider}.example/tcp/24001")],
        };
        self.state.lock().miners.insert(provider.clone(), peer.clone());
        peer
    }

    /// Sets the collateral bounds.
    pub fn set_bounds(&self, bounds: CollateralBounds) {
        self.state.lock().bounds = bounds;
    }

    /// Publishes a market deal.
    pub fn set_deal(&self, deal_id: u64, deal: MarketDeal) {
        self.state.lock().deals.insert(deal_id, deal);
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_head(&self) -> ReplicationResult<ChainEpoch> {
        self.record();
        let state = self.state.lock();
        if state.head_available {
            Ok(state.head)
        } else {
            Err(ReplicationError::chain("head unavailable"))
        }
    }

    async fn state_miner_info(&self, provider: &Address) -> ReplicationResult<PeerInfo> {
        self.record();
        self.state
            .lock()
            .miners
            .get(provider)
            .cloned()
            .ok_or_else(|| ReplicationError::chain(format!("actor not found: {provider}")))
    }

    async fn state_deal_provider_collateral_bounds(
        &self,
        _size: PaddedPieceSize,
        _verified: bool,
    ) -> ReplicationResult<CollateralBounds> {
        self.record();
        Ok(self.state.lock().bounds)
    }

    async fn state_market_storage_deal(&self, deal_id: u64) -> ReplicationResult<MarketDeal> {
        self.record();
        self.state
            .lock()
            .deals
            .get(&deal_id)
            .cloned()
            .ok_or_else(|| ReplicationError::chain(format!("deal {deal_id} not found")))
    }

    async fn chain_get_genesis(&self) -> ReplicationResult<SystemTime> {
        self.record();
        Ok(self.state.lock().genesis)
    }
}

#[derive(Debug)]
struct ProviderState {
    rejection: Option<String>,
    protocols: Vec<String>,
    transports: Vec<String>,
    statuses: HashMap<Uuid, ProviderDealStatus>,
    proposals: Vec<(PeerInfo, DealRequest)>,
    reachable: bool,
}

/// A set of providers that accept every deal unless told otherwise.
#[derive(Debug)]
pub struct MockDealClient {
    state: Mutex<ProviderState>,
    calls: AtomicUsize,
}

impl Default for MockDealClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDealClient {
    /// Creates reachable providers speaking the storage-market protocol
    /// over HTTP.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProviderState {
                rejection: None,
                protocols: vec![STORAGE_MARKET_PROTOCOL.to_string()],
                transports: vec!["http".to_string()],
                statuses: HashMap::new(),
                proposals: Vec::new(),
                reachable: true,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Rejects future proposals with `reason`.
    pub fn reject_with(&self, reason: impl Into<String>) {
        self.state.lock().rejection = Some(reason.into());
    }

    /// Sets the protocols providers advertise.
    pub fn set_protocols(&self, protocols: Vec<String>) {
        self.state.lock().protocols = protocols;
    }

    /// Sets the transfer kinds providers accept.
    pub fn set_transports(&self, transports: Vec<String>) {
        self.state.lock().transports = transports;
    }

    /// Makes connections fail while `reachable` is false.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// Sets the status reported for a deal.
    pub fn set_status(&self, status: ProviderDealStatus) {
        self.state.lock().statuses.insert(status.deal_uuid, status);
    }

    /// Proposals accepted so far, with the peer they went to.
    pub fn proposals(&self) -> Vec<(PeerInfo, DealRequest)> {
        self.state.lock().proposals.clone()
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DealClient for MockDealClient {
    async fn connect(&self, peer: &PeerInfo) -> ReplicationResult<()> {
        self.record();
        if self.state.lock().reachable {
            Ok(())
        } else {
            Err(ReplicationError::Provider {
                provider: Address::new(peer.id.clone()),
                message: "connection refused".into(),
            })
        }
    }

    async fn supports_protocol(&self, _peer: &PeerInfo, protocol: &str) -> ReplicationResult<bool> {
        self.record();
        Ok(self.state.lock().protocols.iter().any(|p| p == protocol))
    }

    async fn propose_deal(
        &self,
        peer: &PeerInfo,
        request: &DealRequest,
    ) -> ReplicationResult<DealResponse> {
        self.record();
        let mut state = self.state.lock();
        if let Some(reason) = state.rejection.clone() {
            return Ok(DealResponse {
                accepted: false,
                message: reason,
            });
        }
        state.proposals.push((peer.clone(), request.clone()));
        Ok(DealResponse {
            accepted: true,
            message: String::new(),
        })
    }

    async fn deal_status(
        &self,
        peer: &PeerInfo,
        deal_uuid: Uuid,
        _signature: &Signature,
    ) -> ReplicationResult<ProviderDealStatus> {
        self.record();
        let state = self.state.lock();
        if let Some(status) = state.statuses.get(&deal_uuid) {
            return Ok(status.clone());
        }
        if state.proposals.iter().any(|(_, r)| r.deal_uuid == deal_uuid) {
            return Ok(ProviderDealStatus {
                deal_uuid,
                status: "Accepted".into(),
                publish_cid: None,
                chain_deal_id: 0,
            });
        }
        Err(ReplicationError::Provider {
            provider: Address::new(peer.id.clone()),
            message: format!("unknown deal {deal_uuid}"),
        })
    }

    async fn query_transports(&self, _peer: &PeerInfo) -> ReplicationResult<Vec<String>> {
        self.record();
        Ok(self.state.lock().transports.clone())
    }
}
