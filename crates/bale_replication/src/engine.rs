//! The replication engine: two periodic loops over one replica index.
//!
//! ```text
//!            ┌──────────── replication loop ────────────┐
//! segments ──┤ classify ─▶ pack ─▶ select ─▶ deal ─▶ record
//!            └──────────────────────────────────────────┘
//!                                 │ replica index (RwLock)
//!            ┌──────────── verification loop ───────────┐
//! replicas ──┤ snapshot ─▶ provider status ─▶ chain deal ─▶ write back
//!            └──────────────────────────────────────────┘
//! ```
//!
//! Both loops share one [`CancellationToken`]. The index lock is only held
//! for in-memory work, never across a collaborator call. At most one
//! replication cycle and one verification cycle run at a time, whether
//! started by a loop or by a caller.

use crate::collaborators::{guarded, ChainClient, DealClient, ProviderSelector, Wallet};
use crate::config::{ReplicatorConfig, UnknownReplicaPolicy};
use crate::dealer::Dealer;
use crate::error::{ReplicationError, ReplicationResult};
use crate::replica::{verify_proposals_match, Replica};
use crate::types::{ChainEpoch, DealRequest};
use async_trait::async_trait;
use bale_codec::Cid;
use bale_core::{pack, CancellationToken, Lifecycle, Piece, Segment, Segmentor};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn, Instrument, Span};
use uuid::Uuid;

/// Read access to tracked replicas.
pub trait Replicator: Send + Sync {
    /// Replicas backing a segment, ordered by deal UUID.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::ReplicasNotFound`] if none are tracked.
    fn replicas(&self, cid: &Cid) -> ReplicationResult<Vec<Replica>>;

    /// Counters since the engine was created.
    fn stats(&self) -> ReplicationStats;
}

/// Engine counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    /// Replication cycles that ran to completion.
    pub replication_cycles: u64,
    /// Verification cycles that ran to completion.
    pub verification_cycles: u64,
    /// Cycles abandoned early, e.g. because the chain head was unavailable.
    pub skipped_cycles: u64,
    /// Deals accepted by providers.
    pub deals_made: u64,
    /// Deal attempts that failed.
    pub deals_failed: u64,
    /// Deal verifications performed.
    pub deals_checked: u64,
    /// Deal verifications that ended in an error.
    pub check_errors: u64,
}

/// What one replication cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Segments found under-replicated.
    pub under_replicated: usize,
    /// Pieces built from them.
    pub pieces: usize,
    /// Deals made.
    pub deals_made: usize,
    /// Deal attempts that failed.
    pub deals_failed: usize,
}

/// Collaborators the engine drives.
pub struct EngineContext {
    /// Source of segments to replicate.
    pub segmentor: Arc<dyn Segmentor>,
    /// Maker of deals.
    pub dealer: Arc<dyn Dealer>,
    /// Chain state.
    pub chain: Arc<dyn ChainClient>,
    /// Provider protocol client.
    pub client: Arc<dyn DealClient>,
    /// Signs deal status requests.
    pub wallet: Arc<dyn Wallet>,
    /// Picks providers per piece.
    pub selector: Arc<dyn ProviderSelector>,
}

type ReplicaIndex = HashMap<Cid, HashMap<Uuid, Replica>>;

struct Shared {
    ctx: EngineContext,
    config: ReplicatorConfig,
    replicas: RwLock<ReplicaIndex>,
    stats: Mutex<ReplicationStats>,
    replication_cycle: tokio::sync::Mutex<()>,
    verification_cycle: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    span: Span,
}

/// Tracks replicas and keeps every segment replicated.
///
/// The replica index lives in memory only; it does not survive a restart.
pub struct ReplicationEngine {
    shared: Arc<Shared>,
    tasks: TaskTracker,
    started: Mutex<bool>,
}

impl ReplicationEngine {
    /// Creates an engine; loops do not run until [`Lifecycle::start`].
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::InvalidConfig`] for unusable settings.
    pub fn new(ctx: EngineContext, config: ReplicatorConfig, span: Span) -> ReplicationResult<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                ctx,
                config,
                replicas: RwLock::new(HashMap::new()),
                stats: Mutex::new(ReplicationStats::default()),
                replication_cycle: tokio::sync::Mutex::new(()),
                verification_cycle: tokio::sync::Mutex::new(()),
                cancel: CancellationToken::new(),
                span,
            }),
            tasks: TaskTracker::new(),
            started: Mutex::new(false),
        })
    }

    /// Token that stops both loops.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// The active configuration.
    pub fn config(&self) -> &ReplicatorConfig {
        &self.shared.config
    }

    /// Runs one replication cycle now, after any cycle already in progress.
    ///
    /// # Errors
    ///
    /// Fails if segments cannot be listed, the chain head is unavailable, or
    /// the engine is cancelled. Failures for one piece or provider are
    /// logged and skipped.
    pub async fn replicate_once(&self) -> ReplicationResult<CycleSummary> {
        self.shared.replicate_once().await
    }

    /// Runs one verification cycle now, after any cycle already in
    /// progress, and returns the number of deals checked.
    ///
    /// # Errors
    ///
    /// Only fails on cancellation; per-deal failures land on the replica.
    pub async fn verify_once(&self) -> ReplicationResult<usize> {
        self.shared.verify_once().await
    }

    /// Number of segments with at least one tracked replica.
    pub fn tracked_segments(&self) -> usize {
        self.shared.replicas.read().len()
    }

    /// Drops slashed and expired replicas not verified since `before`.
    ///
    /// Returns the number of replica entries removed.
    pub fn prune_replicas(&self, before: SystemTime, head: ChainEpoch) -> usize {
        let mut index = self.shared.replicas.write();
        let mut removed = 0;
        for replicas in index.values_mut() {
            let len = replicas.len();
            replicas.retain(|_, r| {
                !(r.status(head).is_lost() && r.last_checked.map_or(true, |t| t < before))
            });
            removed += len - replicas.len();
        }
        index.retain(|_, replicas| !replicas.is_empty());
        removed
    }
}

impl Replicator for ReplicationEngine {
    fn replicas(&self, cid: &Cid) -> ReplicationResult<Vec<Replica>> {
        let index = self.shared.replicas.read();
        let mut replicas: Vec<Replica> = index
            .get(cid)
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default();
        if replicas.is_empty() {
            return Err(ReplicationError::ReplicasNotFound(cid.clone()));
        }
        replicas.sort_by_key(Replica::deal_uuid);
        Ok(replicas)
    }

    fn stats(&self) -> ReplicationStats {
        self.shared.stats.lock().clone()
    }
}

#[async_trait]
impl Lifecycle for ReplicationEngine {
    type Error = ReplicationError;

    async fn start(&self) -> ReplicationResult<()> {
        let mut started = self.started.lock();
        if *started || self.shared.cancel.is_cancelled() {
            return Ok(());
        }
        *started = true;
        for kind in [LoopKind::Replication, LoopKind::Verification] {
            let shared = Arc::clone(&self.shared);
            let span = shared.span.clone();
            self.tasks.spawn(run_loop(shared, kind).instrument(span));
        }
        self.shared.span.in_scope(|| {
            info!(
                replication_interval = ?self.shared.config.replication_interval,
                verification_interval = ?self.shared.config.verification_interval,
                "replication engine started"
            );
        });
        Ok(())
    }

    async fn shutdown(&self) -> ReplicationResult<()> {
        self.shared.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.shared
            .span
            .in_scope(|| info!("replication engine stopped"));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum LoopKind {
    Replication,
    Verification,
}

async fn run_loop(shared: Arc<Shared>, kind: LoopKind) {
    let period = match kind {
        LoopKind::Replication => shared.config.replication_interval,
        LoopKind::Verification => shared.config.verification_interval,
    };
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let result = match kind {
            LoopKind::Replication => shared.replicate_once().await.map(drop),
            LoopKind::Verification => shared.verify_once().await.map(drop),
        };
        match result {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => break,
            Err(err) => {
                shared.stats.lock().skipped_cycles += 1;
                warn!(?kind, error = %err, "cycle skipped");
            }
        }
    }
    debug!(?kind, "loop stopped");
}

impl Shared {
    async fn replicate_once(&self) -> ReplicationResult<CycleSummary> {
        let _cycle = self
            .cancel
            .run_until_cancelled(self.replication_cycle.lock())
            .await
            .ok_or(ReplicationError::Cancelled)?;
        self.run_replication().await
    }

    async fn verify_once(&self) -> ReplicationResult<usize> {
        let _cycle = self
            .cancel
            .run_until_cancelled(self.verification_cycle.lock())
            .await
            .ok_or(ReplicationError::Cancelled)?;
        self.run_verification().await
    }

    async fn run_replication(&self) -> ReplicationResult<CycleSummary> {
        let cancel = &self.cancel;
        let segments = self.ctx.segmentor.list_segments()?;
        let head = guarded(cancel, self.ctx.chain.chain_head()).await?;
        let now = SystemTime::now();

        let under_replicated: Vec<Arc<Segment>> = {
            let index = self.replicas.read();
            segments
                .into_iter()
                .filter(|s| self.needs_replica(index.get(s.cid()), head, now))
                .collect()
        };

        let mut summary = CycleSummary {
            under_replicated: under_replicated.len(),
            ..CycleSummary::default()
        };
        if !under_replicated.is_empty() {
            let outcome = pack(under_replicated, &self.config.pack_config())?;
            summary.pieces = outcome.pieces.len();
            if !outcome.leftover.is_empty() {
                debug!(leftover = outcome.leftover.len(), "segments deferred to a later cycle");
            }
            for piece in &outcome.pieces {
                self.replicate_piece(piece, &mut summary).await?;
            }
        }

        {
            let mut stats = self.stats.lock();
            stats.replication_cycles += 1;
            stats.deals_made += summary.deals_made as u64;
            stats.deals_failed += summary.deals_failed as u64;
        }
        info!(
            head,
            under_replicated = summary.under_replicated,
            pieces = summary.pieces,
            deals_made = summary.deals_made,
            deals_failed = summary.deals_failed,
            "replication cycle complete"
        );
        Ok(summary)
    }

    async fn replicate_piece(&self, piece: &Piece, summary: &mut CycleSummary) -> ReplicationResult<()> {
        let cancel = &self.cancel;
        let providers = match guarded(cancel, self.ctx.selector.select(piece)).await {
            Ok(providers) => providers,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                warn!(piece = %piece.cid(), error = %err, "provider selection failed");
                return Ok(());
            }
        };
        if providers.is_empty() {
            debug!(piece = %piece.cid(), "no providers selected");
            return Ok(());
        }

        for provider in &providers {
            match self.ctx.dealer.deal(piece, provider, cancel).await {
                Ok(deal) => {
                    self.record(piece, &deal);
                    summary.deals_made += 1;
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    summary.deals_failed += 1;
                    debug!(piece = %piece.cid(), %provider, error = %err, "skipping provider");
                }
            }
        }
        Ok(())
    }

    fn record(&self, piece: &Piece, deal: &DealRequest) {
        let mut index = self.replicas.write();
        for segment in &piece.segments {
            index
                .entry(segment.cid().clone())
                .or_default()
                .insert(deal.deal_uuid, Replica::new(deal.clone()));
        }
    }

    /// Whether a segment with these replicas needs another one. Stops as
    /// soon as enough healthy replicas are seen.
    fn needs_replica(
        &self,
        replicas: Option<&HashMap<Uuid, Replica>>,
        head: ChainEpoch,
        now: SystemTime,
    ) -> bool {
        let Some(replicas) = replicas else {
            return true;
        };
        let mut healthy = 0;
        for replica in replicas.values() {
            if self.is_healthy(replica, head, now) {
                healthy += 1;
                if healthy >= self.config.min_healthy_replicas {
                    return false;
                }
            }
        }
        true
    }

    fn is_healthy(&self, replica: &Replica, head: ChainEpoch, now: SystemTime) -> bool {
        if replica.status(head).is_lost() {
            return false;
        }
        if !replica.is_unresolved() {
            return true;
        }
        match self.config.unknown_policy {
            UnknownReplicaPolicy::Ignore => true,
            UnknownReplicaPolicy::ReplicateAfter(grace) => {
                let failing_for = replica
                    .failing_since
                    .and_then(|since| now.duration_since(since).ok())
                    .unwrap_or(Duration::ZERO);
                failing_for < grace
            }
        }
    }

    async fn run_verification(&self) -> ReplicationResult<usize> {
        let to_check: Vec<Replica> = {
            let index = self.replicas.read();
            let mut unique: HashMap<Uuid, Replica> = HashMap::new();
            for replicas in index.values() {
                for (id, replica) in replicas {
                    unique.entry(*id).or_insert_with(|| replica.clone());
                }
            }
            unique.into_values().collect()
        };

        let mut checked: HashMap<Uuid, Replica> = HashMap::with_capacity(to_check.len());
        let mut errors = 0u64;
        for mut replica in to_check {
            if self.cancel.is_cancelled() {
                return Err(ReplicationError::Cancelled);
            }
            let now = SystemTime::now();
            replica.reset_checks(now);
            match self.check(&mut replica).await {
                Ok(()) => replica.failing_since = None,
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    errors += 1;
                    warn!(
                        deal = %replica.deal_uuid(),
                        provider = %replica.provider(),
                        error = %err,
                        "deal verification failed"
                    );
                    replica.fail(err, now);
                }
            }
            checked.insert(replica.deal_uuid(), replica);
        }

        {
            let mut index = self.replicas.write();
            for replicas in index.values_mut() {
                for (id, replica) in replicas.iter_mut() {
                    if let Some(result) = checked.get(id) {
                        replica.apply_check(result);
                    }
                }
            }
        }
        {
            let mut stats = self.stats.lock();
            stats.verification_cycles += 1;
            stats.deals_checked += checked.len() as u64;
            stats.check_errors += errors;
        }
        info!(deals = checked.len(), errors, "verification cycle complete");
        Ok(checked.len())
    }

    /// Refreshes provider and chain status of one deal.
    async fn check(&self, replica: &mut Replica) -> ReplicationResult<()> {
        let cancel = &self.cancel;
        let uuid = replica.deal_uuid();
        let peer = guarded(cancel, self.ctx.chain.state_miner_info(replica.provider())).await?;
        guarded(cancel, self.ctx.client.connect(&peer)).await?;
        let signature = guarded(cancel, self.ctx.wallet.sign(uuid.as_bytes())).await?;
        let status = guarded(cancel, self.ctx.client.deal_status(&peer, uuid, &signature)).await?;

        let published = status.publish_cid.is_some();
        let deal_id = status.chain_deal_id;
        replica.last_provider_status = Some(status);
        if !published {
            return Ok(());
        }

        let market = guarded(cancel, self.ctx.chain.state_market_storage_deal(deal_id)).await?;
        let matched = verify_proposals_match(replica.deal.proposal(), &market.proposal);
        replica.last_chain_status = Some(market);
        matched
    }
}
