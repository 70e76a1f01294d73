//! End-to-end tests of a node over an on-disk store with in-memory
//! collaborators.

use bale_codec::Cid;
use bale_core::{CancellationToken, Lifecycle};
use bale_replication::mock::{MockChain, MockDealClient, MockWallet};
use bale_replication::{
    Address, Collaborators, DealRequest, HttpOffloader, MarketDeal, MarketDealState, Node,
    NodeConfig, ProviderDealStatus, ReplicaStatus, ReplicatorConfig, Replicator, StaticProviders,
};
use bale_storage::{BlobStore, FileStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct World {
    chain: Arc<MockChain>,
    client: Arc<MockDealClient>,
    providers: Vec<Address>,
}

impl World {
    fn new(providers: &[&str]) -> Self {
        let chain = Arc::new(MockChain::new(1_000));
        let providers: Vec<Address> = providers.iter().map(|p| Address::new(*p)).collect();
        for provider in &providers {
            chain.add_miner(provider);
        }
        Self {
            chain,
            client: Arc::new(MockDealClient::new()),
            providers,
        }
    }

    fn node(&self, dir: &TempDir, replicator: ReplicatorConfig) -> Node {
        let store: Arc<dyn BlobStore> = Arc::new(FileStore::open(dir.path()).unwrap());
        let collaborators = Collaborators::new(
            Arc::new(MockWallet::new("f1client")),
            self.chain.clone(),
            self.client.clone(),
            Arc::new(
                HttpOffloader::new("https://pieces.example.net")
                    .with_header("Authorization", "Bearer t"),
            ),
            Arc::new(StaticProviders(self.providers.clone())),
        );
        Node::open(store, NodeConfig::new().with_replicator(replicator), collaborators).unwrap()
    }

    fn publish(&self, deal: &DealRequest, deal_id: u64, state: MarketDealState) {
        self.client.set_status(ProviderDealStatus {
            deal_uuid: deal.deal_uuid,
            status: "Published".into(),
            publish_cid: Some(Cid::raw_sha256(deal.deal_uuid.as_bytes())),
            chain_deal_id: deal_id,
        });
        self.chain.set_deal(
            deal_id,
            MarketDeal {
                proposal: deal.proposal().clone(),
                state,
            },
        );
    }
}

fn small_pieces() -> ReplicatorConfig {
    ReplicatorConfig::new().with_piece_capacity(1 << 20)
}

#[tokio::test]
async fn segments_are_replicated_to_every_provider() {
    let dir = TempDir::new().unwrap();
    let world = World::new(&["f01000", "f02000"]);
    let node = world.node(&dir, small_pieces());
    let token = CancellationToken::new();

    let a = node.segment(&mut &[1u8; 3000][..], &token).unwrap();
    let b = node.segment(&mut &[2u8; 5000][..], &token).unwrap();

    let summary = node.engine().replicate_once().await.unwrap();
    assert_eq!(summary.pieces, 1);
    assert_eq!(summary.deals_made, 2);

    for cid in [a.cid(), b.cid()] {
        let replicas = node.replicas(cid).unwrap();
        let mut providers: Vec<_> = replicas.iter().map(|r| r.provider().clone()).collect();
        providers.sort();
        assert_eq!(providers, world.providers);
    }

    let proposals = world.client.proposals();
    let params: serde_json::Value =
        serde_json::from_slice(&proposals[0].1.transfer.params).unwrap();
    assert_eq!(params["Headers"]["Authorization"], "Bearer t");
    assert_eq!(proposals[0].1.proposal().piece_cid, proposals[1].1.proposal().piece_cid);
}

#[tokio::test]
async fn deals_progress_to_active_and_then_expire() {
    let dir = TempDir::new().unwrap();
    let world = World::new(&["f01000"]);
    let node = world.node(&dir, small_pieces());
    let segment = node
        .segment(&mut &b"long lived data"[..], &CancellationToken::new())
        .unwrap();
    node.engine().replicate_once().await.unwrap();
    let deal = world.client.proposals()[0].1.clone();

    world.publish(
        &deal,
        9,
        MarketDealState {
            sector_start_epoch: 2_000,
            last_updated_epoch: 2_000,
            slash_epoch: -1,
        },
    );
    node.engine().verify_once().await.unwrap();

    world.chain.set_head(3_000);
    let description = node.describe(segment.cid()).await.unwrap();
    assert_eq!(description.replicas[0].status, ReplicaStatus::Active);
    assert!(description.replicas[0].last_verified.is_some());
    assert!(description.replicas[0].last_error.is_none());

    world.chain.set_head(deal.proposal().end_epoch + 1);
    let description = node.describe(segment.cid()).await.unwrap();
    assert_eq!(description.replicas[0].status, ReplicaStatus::Expired);

    let summary = node.engine().replicate_once().await.unwrap();
    assert_eq!(summary.deals_made, 1);
    assert_eq!(node.replicas(segment.cid()).unwrap().len(), 2);
}

#[tokio::test]
async fn segments_survive_restart_but_replicas_do_not() {
    let dir = TempDir::new().unwrap();
    let world = World::new(&["f01000"]);
    let cid = {
        let node = world.node(&dir, small_pieces());
        let segment = node
            .segment(&mut &b"persisted"[..], &CancellationToken::new())
            .unwrap();
        node.engine().replicate_once().await.unwrap();
        assert!(node.replicas(segment.cid()).is_ok());
        segment.cid().clone()
    };

    let node = world.node(&dir, small_pieces());
    assert_eq!(node.get_segment(&cid).unwrap().raw_size, 9);
    assert!(node.replicas(&cid).unwrap_err().is_not_found());
    assert_eq!(node.engine().stats().replication_cycles, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn background_loops_replicate_and_verify() {
    let dir = TempDir::new().unwrap();
    let world = World::new(&["f01000"]);
    let node = world.node(
        &dir,
        small_pieces()
            .with_replication_interval(Duration::from_millis(20))
            .with_verification_interval(Duration::from_millis(20)),
    );
    let segment = node
        .segment(&mut &b"background"[..], &CancellationToken::new())
        .unwrap();
    node.start().await.unwrap();

    let mut verified = false;
    for _ in 0..250 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Ok(replicas) = node.replicas(segment.cid()) {
            if replicas.iter().any(|r| r.last_checked.is_some()) {
                verified = true;
                break;
            }
        }
    }
    node.shutdown().await.unwrap();

    assert!(verified);
    assert_eq!(world.client.proposals().len(), 1);
    let stats = node.engine().stats();
    assert!(stats.replication_cycles >= 1);
    assert!(stats.verification_cycles >= 1);
}
