//! # Bale Replication
//!
//! Storage deals and replica tracking for Bale segments.
//!
//! This crate provides:
//! - The [`Dealer`] capability and [`MarketDealer`], which turns a packed
//!   piece into a signed storage deal proposal
//! - The [`ReplicationEngine`], running the replication and verification
//!   loops over an in-memory replica index
//! - Replica health ([`Replica::status`]) derived from provider and chain state
//! - Collaborator traits for the wallet, chain, providers and data offload,
//!   with in-memory implementations in [`mock`]
//! - [`Node`], which wires everything over one blob store
//!
//! ## Usage
//!
//! ```
//! use bale_core::CancellationToken;
//! use bale_replication::mock::{MockChain, MockDealClient, MockWallet};
//! use bale_replication::{
//!     Address, Collaborators, HttpOffloader, Node, NodeConfig, StaticProviders,
//! };
//! use bale_storage::InMemoryStore;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let chain = Arc::new(MockChain::new(100));
//! let provider = Address::new("f01000");
//! chain.add_miner(&provider);
//!
//! let node = Node::open(
//!     Arc::new(InMemoryStore::new()),
//!     NodeConfig::default(),
//!     Collaborators::new(
//!         Arc::new(MockWallet::new("f1client")),
//!         chain,
//!         Arc::new(MockDealClient::new()),
//!         Arc::new(HttpOffloader::new("https://pieces.example.net")),
//!         Arc::new(StaticProviders(vec![provider])),
//!     ),
//! )
//! .unwrap();
//!
//! let segment = node.segment(&mut &b"hello"[..], &CancellationToken::new()).unwrap();
//! node.engine().replicate_once().await.unwrap();
//! assert_eq!(node.replicas(segment.cid()).unwrap().len(), 1);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collaborators;
mod config;
mod dealer;
mod engine;
mod error;
pub mod mock;
mod node;
mod replica;
mod types;

pub use collaborators::{
    ChainClient, CollateralPolicy, DealClient, GibPricing, HttpOffloader, MinimumCollateral,
    Offloader, PricePolicy, ProviderSelector, StaticProviders, Wallet,
};
pub use config::{DealConfig, ReplicatorConfig, UnknownReplicaPolicy};
pub use dealer::{Dealer, MarketDealer};
pub use engine::{
    CycleSummary, EngineContext, ReplicationEngine, ReplicationStats, Replicator,
};
pub use error::{ReplicationError, ReplicationResult};
pub use node::{Collaborators, Node, NodeConfig, ReplicaView, SegmentDescription};
pub use replica::{verify_proposals_match, Replica, ReplicaStatus};
pub use types::{
    epoch_to_time, Address, ChainEpoch, ClientDealProposal, CollateralBounds, DealProposal,
    DealRequest, DealResponse, HttpTransferParams, MarketDeal, MarketDealState, OffloadTarget,
    PeerInfo, ProviderDealStatus, Signature, TokenAmount, Transfer, EPOCHS_IN_DAY, EPOCHS_IN_YEAR,
    EPOCH_DURATION_SECONDS, MIN_DEAL_DURATION, STORAGE_MARKET_PROTOCOL,
};
